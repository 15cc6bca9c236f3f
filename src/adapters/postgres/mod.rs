//! Postgres storage backend. Compiled behind the `postgres` feature.

pub mod adapter;
pub mod connection;

pub use adapter::PostgresAdapter;
pub use connection::{create_pool, verify_connection, PoolConfig};
