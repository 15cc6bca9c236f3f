//! Embedder port.
//!
//! Embedding generation is an external collaborator (an Ollama-style HTTP
//! service in production). The kernel only depends on this trait; when no
//! embedder is wired in, [`NullEmbedder`] makes vector operations fail with
//! a distinguishable `Unavailable` so memory search can fall back to FTS.

use async_trait::async_trait;

use crate::domain::errors::{CoreError, CoreResult};

/// Result of an embedder health probe.
#[derive(Debug, Clone)]
pub struct EmbedderHealth {
    pub ok: bool,
    pub model: String,
}

/// Produces 1024-dimension float vectors for memory content.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;

    async fn health_check(&self) -> CoreResult<EmbedderHealth>;
}

/// Embedder stand-in for deployments without a vector backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEmbedder;

#[async_trait]
impl Embedder for NullEmbedder {
    async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
        Err(CoreError::unavailable("no embedder configured"))
    }

    async fn health_check(&self) -> CoreResult<EmbedderHealth> {
        Ok(EmbedderHealth { ok: false, model: "none".to_string() })
    }
}
