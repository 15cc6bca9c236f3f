//! SQLite database connection pool management.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::domain::errors::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

pub async fn create_pool(database_url: &str, config: Option<PoolConfig>) -> CoreResult<SqlitePool> {
    let config = config.unwrap_or_default();
    ensure_database_directory(database_url)?;

    let connect_options = SqliteConnectOptions::from_str(database_url)
        .map_err(|_| CoreError::invalid(format!("invalid database URL: {database_url}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| CoreError::unavailable(format!("failed to create pool: {e}")))?;

    Ok(pool)
}

pub async fn create_test_pool() -> CoreResult<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|_| CoreError::invalid("invalid database URL: sqlite::memory:"))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .shared_cache(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .map_err(|e| CoreError::unavailable(format!("failed to create pool: {e}")))
}

fn ensure_database_directory(database_url: &str) -> CoreResult<()> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::unavailable(format!("failed to create directory: {e}")))?;
        }
    }
    Ok(())
}

pub async fn verify_connection(pool: &SqlitePool) -> CoreResult<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| CoreError::unavailable(format!("connection failed: {e}")))?;
    Ok(())
}

/// Deterministic per-project database path: a sanitised directory stem plus
/// a short hash of the project's absolute path to avoid collisions between
/// identically named projects.
pub fn project_database_path(state_dir: &Path, project_path: &Path) -> PathBuf {
    use sha2::{Digest, Sha256};

    let canonical = project_path.to_string_lossy();
    let digest = Sha256::digest(canonical.as_bytes());
    let short_hash = hex::encode(&digest[..4]);

    let stem: String = project_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();

    state_dir.join(format!("{stem}-{short_hash}")).join("hive.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await.unwrap();
        verify_connection(&pool).await.unwrap();
    }

    #[test]
    fn test_project_database_path_is_stable_and_collision_free() {
        let state = Path::new("/tmp/hivemind");
        let a = project_database_path(state, Path::new("/home/user/proj"));
        let b = project_database_path(state, Path::new("/home/user/proj"));
        let c = project_database_path(state, Path::new("/srv/other/proj"));
        assert_eq!(a, b);
        // Same stem, different absolute path: hash suffix keeps them apart.
        assert_ne!(a, c);
        assert!(a.ends_with("hive.db"));
    }

    #[test]
    fn test_path_stem_is_sanitised() {
        let state = Path::new("/tmp/hivemind");
        let path = project_database_path(state, Path::new("/home/user/my proj!"));
        let dir = path.parent().unwrap().file_name().unwrap().to_string_lossy();
        assert!(dir.starts_with("my-proj-"));
    }
}
