//! Versioned, transactional forward migrations.
//!
//! Migrations are keyed by a monotonically increasing integer version that is
//! unique across every feature domain sharing the schema. All pending
//! versions are applied inside a single transaction; any failure aborts the
//! whole run. DDL is idempotent (`IF NOT EXISTS`) so re-running a recorded
//! version is harmless.

use std::collections::HashSet;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::ports::storage::{BackendKind, SqlValue, StorageAdapter};

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// The SQLite migration set. Version numbers are shared with the Postgres
/// set; the two lists must stay in lockstep.
pub fn sqlite_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Event log",
            sql: include_str!("../../migrations/sqlite/001_event_log.sql"),
        },
        Migration {
            version: 2,
            description: "Agent, message, and reservation projections",
            sql: include_str!("../../migrations/sqlite/002_coordination_views.sql"),
        },
        Migration {
            version: 3,
            description: "Bead graph projections",
            sql: include_str!("../../migrations/sqlite/003_bead_graph.sql"),
        },
        Migration {
            version: 4,
            description: "Semantic memory",
            sql: include_str!("../../migrations/sqlite/004_memory.sql"),
        },
    ]
}

#[cfg(feature = "postgres")]
pub fn postgres_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Event log",
            sql: include_str!("../../migrations/postgres/001_event_log.sql"),
        },
        Migration {
            version: 2,
            description: "Agent, message, and reservation projections",
            sql: include_str!("../../migrations/postgres/002_coordination_views.sql"),
        },
        Migration {
            version: 3,
            description: "Bead graph projections",
            sql: include_str!("../../migrations/postgres/003_bead_graph.sql"),
        },
        Migration {
            version: 4,
            description: "Semantic memory",
            sql: include_str!("../../migrations/postgres/004_memory.sql"),
        },
    ]
}

/// The migration set for an adapter's backend.
pub fn migrations_for(backend: BackendKind) -> Vec<Migration> {
    match backend {
        BackendKind::Sqlite => sqlite_migrations(),
        #[cfg(feature = "postgres")]
        BackendKind::Postgres => postgres_migrations(),
        #[cfg(not(feature = "postgres"))]
        BackendKind::Postgres => Vec::new(),
    }
}

/// Apply every migration not yet recorded in `schema_versions`. Returns the
/// number applied.
pub async fn run_migrations(adapter: &dyn StorageAdapter) -> CoreResult<usize> {
    let migrations = migrations_for(adapter.backend());
    run_migration_list(adapter, &migrations).await
}

pub async fn run_migration_list(
    adapter: &dyn StorageAdapter,
    migrations: &[Migration],
) -> CoreResult<usize> {
    validate_versions(migrations)?;

    let mut tx = adapter.begin().await?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            description TEXT,
            applied_at TEXT NOT NULL
        )",
    )
    .await
    .map_err(|e| CoreError::fatal(format!("failed to ensure schema_versions: {e}")))?;

    let rows = tx
        .query("SELECT version FROM schema_versions", &[])
        .await
        .map_err(|e| CoreError::fatal(format!("failed to read schema versions: {e}")))?;
    let mut applied: HashSet<i64> = HashSet::new();
    for row in &rows {
        applied.insert(row.integer("version")?);
    }

    let mut count = 0;
    for migration in migrations {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        tx.execute_batch(migration.sql).await.map_err(|e| {
            CoreError::fatal(format!(
                "migration {} ({}) failed: {e}",
                migration.version, migration.description
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_versions (version, description, applied_at) VALUES (?, ?, ?)",
            &[
                SqlValue::Integer(migration.version),
                SqlValue::from(migration.description),
                // The column is TEXT on both dialects; bind a string.
                SqlValue::Text(chrono::Utc::now().to_rfc3339()),
            ],
        )
        .await
        .map_err(|e| {
            CoreError::fatal(format!(
                "failed to record migration {}: {e}",
                migration.version
            ))
        })?;
        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}

/// A version collision between two feature domains is a hard bug.
fn validate_versions(migrations: &[Migration]) -> CoreResult<()> {
    let mut seen = HashSet::new();
    let mut last = 0;
    for migration in migrations {
        if !seen.insert(migration.version) {
            return Err(CoreError::fatal(format!(
                "schema version collision: {} claimed twice",
                migration.version
            )));
        }
        if migration.version <= last {
            return Err(CoreError::fatal(format!(
                "schema versions out of order at {}",
                migration.version
            )));
        }
        last = migration.version;
    }
    Ok(())
}
