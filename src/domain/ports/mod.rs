//! Ports: trait seams between the kernel and its adapters.

pub mod embedder;
pub mod storage;

pub use embedder::{Embedder, EmbedderHealth, NullEmbedder};
pub use storage::{
    blob_to_embedding, embedding_to_blob, with_tx, BackendKind, FtsHit, SqlRow, SqlValue,
    StorageAdapter, StorageTx, VectorHit,
};
