//! SQLite storage backend.

pub mod adapter;
pub mod connection;

pub use adapter::SqliteAdapter;
pub use connection::{create_pool, create_test_pool, project_database_path, verify_connection, PoolConfig};
