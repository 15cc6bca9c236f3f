//! Process-wide adapter cache keyed by project path.
//!
//! Opening a project's database is lazy and idempotent: concurrent first
//! opens may both build a pool, but exactly one lands in the cache and
//! later callers share it. The cache holds the only cross-call mutable
//! state in the crate besides the legacy-import flag.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::adapters::migrations::run_migrations;
use crate::adapters::sqlite::{create_pool, project_database_path, SqliteAdapter};
use crate::config::CoreConfig;
use crate::domain::errors::{CoreError, CoreResult};

static CACHE: OnceLock<Mutex<HashMap<PathBuf, Arc<SqliteAdapter>>>> = OnceLock::new();

fn cache() -> &'static Mutex<HashMap<PathBuf, Arc<SqliteAdapter>>> {
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The shared adapter for a project, creating and migrating its database on
/// first use.
pub async fn adapter_for_project(
    config: &CoreConfig,
    project_path: &Path,
) -> CoreResult<Arc<SqliteAdapter>> {
    let db_path = project_database_path(&config.state_dir, project_path);

    if let Some(adapter) = lookup(&db_path)? {
        return Ok(adapter);
    }

    let url = format!("sqlite://{}", db_path.display());
    let pool = create_pool(&url, None).await?;
    let adapter = Arc::new(SqliteAdapter::new(pool));
    run_migrations(adapter.as_ref()).await?;

    let mut guard = cache()
        .lock()
        .map_err(|_| CoreError::transient("adapter cache lock poisoned"))?;
    // A racing open may have won; keep the first entry so every caller
    // shares one pool.
    Ok(guard.entry(db_path).or_insert(adapter).clone())
}

fn lookup(db_path: &Path) -> CoreResult<Option<Arc<SqliteAdapter>>> {
    let guard = cache()
        .lock()
        .map_err(|_| CoreError::transient("adapter cache lock poisoned"))?;
    Ok(guard.get(db_path).cloned())
}

/// Test hook: drop every cached adapter so the next open starts fresh.
pub fn reset_memory_cache() {
    if let Ok(mut guard) = cache().lock() {
        guard.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_shares_adapters_per_project() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig { state_dir: dir.path().to_path_buf(), ..Default::default() };
        let project = dir.path().join("proj");

        reset_memory_cache();
        let first = adapter_for_project(&config, &project).await.unwrap();
        let second = adapter_for_project(&config, &project).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = adapter_for_project(&config, &dir.path().join("other")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));

        reset_memory_cache();
        let fresh = adapter_for_project(&config, &project).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
    }
}
