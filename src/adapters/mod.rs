//! Adapters: concrete storage backends and the HTTP stream endpoint.

pub mod adapter_cache;
pub mod http;
pub mod migrations;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;

pub use adapter_cache::{adapter_for_project, reset_memory_cache};
pub use migrations::{run_migrations, Migration};
pub use sqlite::SqliteAdapter;
