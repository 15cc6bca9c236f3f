//! Hivemind - event-sourced coordination kernel for multi-agent coding
//! sessions, with:
//! - Durable append-only event log with atomic projections
//! - Inter-agent messaging with importance-first inboxes
//! - Advisory file reservations with glob conflict arbitration
//! - Bead (work item) graph with dependency blocking and ready-queries
//! - Semantic memory with vector search, FTS fallback, and decay
//! - Deterministic replay, JSONL git-sync, and an SSE stream endpoint

pub mod adapters;
pub mod config;
pub mod domain;
pub mod services;

pub use config::CoreConfig;
pub use domain::{CoreError, CoreResult, ErrorKind};
pub use services::{
    BeadService, EventFilter, EventStore, MemoryService, MessagingService, ReplayService,
    ReservationService,
};
