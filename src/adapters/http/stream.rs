//! Durable stream HTTP endpoint with SSE live tail.
//!
//! Offset-based reads serve history; `live=true` upgrades to a
//! `text/event-stream` fed by a 100 ms polling subscription over the event
//! log. `offset` equals the event's `sequence`, so a client that records the
//! last offset it saw can reconnect without gaps or duplicates.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::get,
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domain::models::Event;
use crate::services::event_store::{EventFilter, EventStore};

/// Configuration for the stream server.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Live subscription polling cadence.
    pub poll_interval_ms: u64,
    /// Events fetched per poll.
    pub poll_batch: u32,
    /// Cap on history reads.
    pub max_limit: u32,
    pub default_limit: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9444,
            enable_cors: true,
            poll_interval_ms: 100,
            poll_batch: 100,
            max_limit: 1000,
            default_limit: 100,
        }
    }
}

/// Shared state for the stream server.
pub struct StreamState {
    pub store: EventStore,
    pub config: StreamConfig,
}

/// Durable stream HTTP server.
pub struct StreamServer {
    state: Arc<StreamState>,
}

impl StreamServer {
    pub fn new(store: EventStore, config: StreamConfig) -> Self {
        Self { state: Arc::new(StreamState { store, config }) }
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/streams/{project_key}", get(stream_events))
            .route("/streams/{project_key}/stats", get(stream_stats))
            .route("/health", get(health_check))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.state.config.enable_cors {
            router = router.layer(
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
            );
        }
        router
    }

    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr =
            format!("{}:{}", self.state.config.host, self.state.config.port).parse()?;
        let router = self.router();

        tracing::info!("stream server listening on {}", addr);
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }

    /// Serve until `shutdown` resolves; live subscriptions are dropped with
    /// their connections, so stopping leaks no pollers.
    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr =
            format!("{}:{}", self.state.config.host, self.state.config.port).parse()?;
        let router = self.router();

        tracing::info!("stream server listening on {}", addr);
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    offset: Option<String>,
    limit: Option<String>,
    live: Option<String>,
}

/// One wire frame: `offset` is the event's sequence, `data` the event
/// itself, `timestamp` milliseconds since epoch.
#[derive(Debug, Serialize)]
struct StreamFrame {
    offset: i64,
    data: serde_json::Value,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    project_key: String,
    total_events: i64,
    latest_sequence: i64,
    events_by_type: Vec<TypeCount>,
}

#[derive(Debug, Serialize)]
struct TypeCount {
    event_type: String,
    count: i64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    latest_sequence: i64,
}

fn frame(event: &Event) -> StreamFrame {
    StreamFrame {
        offset: event.sequence,
        data: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
        timestamp: event.timestamp_ms,
    }
}

/// A malformed `offset` defaults to 0 rather than erroring; resumption from
/// the start is always safe.
fn parse_offset(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.parse::<i64>().ok()).unwrap_or(0).max(0)
}

async fn stream_events(
    State(state): State<Arc<StreamState>>,
    Path(project_key): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let live = query.live.as_deref() == Some("true");

    if live {
        let start = match query.offset.as_deref() {
            // Explicit offset: resume strictly after it.
            Some(raw) => parse_offset(Some(raw)),
            // No offset: start at the current head, history not replayed.
            None => state
                .store
                .latest_sequence(Some(&project_key))
                .await
                .map_err(internal_error)?,
        };
        let sse = live_stream(state, project_key, start);
        return Ok((
            [(header::CACHE_CONTROL, "no-cache"), (header::CONNECTION, "keep-alive")],
            sse,
        )
            .into_response());
    }

    let offset = parse_offset(query.offset.as_deref());
    let limit = query
        .limit
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(state.config.default_limit)
        .min(state.config.max_limit);

    let events = state
        .store
        .read(EventFilter::new().project_key(project_key).after_sequence(offset).limit(limit))
        .await
        .map_err(internal_error)?;

    let frames: Vec<StreamFrame> = events.iter().map(frame).collect();
    Ok(Json(frames).into_response())
}

/// Live SSE tail: a `: connected` comment to flush headers, then one data
/// frame per event. Dropping the response ends the polling loop.
fn live_stream(
    state: Arc<StreamState>,
    project_key: String,
    start: i64,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    struct PollState {
        store: EventStore,
        project_key: String,
        last_sequence: i64,
        batch: u32,
        pending: VecDeque<Event>,
        interval: tokio::time::Interval,
    }

    let mut interval =
        tokio::time::interval(Duration::from_millis(state.config.poll_interval_ms.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let poll = PollState {
        store: state.store.clone(),
        project_key,
        last_sequence: start,
        batch: state.config.poll_batch,
        pending: VecDeque::new(),
        interval,
    };

    let connected = stream::once(async { Ok(SseEvent::default().comment("connected")) });
    let events = stream::unfold(poll, |mut poll| async move {
        loop {
            if let Some(event) = poll.pending.pop_front() {
                let body = serde_json::to_string(&frame(&event)).unwrap_or_default();
                let sse = SseEvent::default().id(event.sequence.to_string()).data(body);
                return Some((Ok::<_, Infallible>(sse), poll));
            }

            poll.interval.tick().await;
            let filter = EventFilter::new()
                .project_key(poll.project_key.clone())
                .after_sequence(poll.last_sequence)
                .limit(poll.batch);
            match poll.store.read(filter).await {
                Ok(events) => {
                    if let Some(last) = events.last() {
                        poll.last_sequence = last.sequence;
                    }
                    poll.pending.extend(events);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "stream poll failed; retrying");
                }
            }
        }
    });

    Sse::new(connected.chain(events)).keep_alive(KeepAlive::default())
}

async fn stream_stats(
    State(state): State<Arc<StreamState>>,
    Path(project_key): Path<String>,
) -> Result<Json<StatsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let total_events = state.store.count(Some(&project_key)).await.map_err(internal_error)?;
    let latest_sequence =
        state.store.latest_sequence(Some(&project_key)).await.map_err(internal_error)?;
    let events_by_type = state
        .store
        .counts_by_type(Some(&project_key))
        .await
        .map_err(internal_error)?
        .into_iter()
        .map(|(event_type, count)| TypeCount { event_type, count })
        .collect();

    Ok(Json(StatsResponse { project_key, total_events, latest_sequence, events_by_type }))
}

async fn health_check(
    State(state): State<Arc<StreamState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<ErrorResponse>)> {
    let latest_sequence = state.store.latest_sequence(None).await.map_err(internal_error)?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        service: "hivemind-stream".to_string(),
        latest_sequence,
    }))
}

fn internal_error(err: crate::domain::errors::CoreError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: err.to_string(), code: err.kind.as_str().to_uppercase() }),
    )
}
