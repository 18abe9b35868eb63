// Migration Runner: same idempotent, version-tracked
// approach as `infra-sqlite`'s runner, rewritten against `PgPool`.

use sqlx::PgPool;
use tracing::info;

struct Migration {
    version: i64,
    name: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create jobs and schema_migrations tables",
        up: include_str!("../migrations/001_create_jobs.sql"),
    },
    Migration {
        version: 2,
        name: "indexes for fetch/stage/rescue/prune",
        up: include_str!("../migrations/002_indexes.sql"),
    },
    Migration {
        version: 3,
        name: "insert-notification trigger",
        up: include_str!("../migrations/003_notify_insert.sql"),
    },
];

pub async fn run_migrations(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    ensure_migrations_table(pool).await?;
    let current = current_version(pool).await?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        info!(version = migration.version, name = migration.name, "applying migration");
        apply(pool, migration).await?;
    }
    Ok(())
}

/// Reverses migrations strictly above `target_version`. As with the SQLite
/// adapter, no per-migration `down` script is authored; a rollback below
/// version 1 drops the table outright and lets the next `run_migrations`
/// recreate it.
pub async fn rollback(pool: &PgPool, target_version: i64) -> Result<(), Box<dyn std::error::Error>> {
    let current = current_version(pool).await?;
    if target_version >= current {
        return Ok(());
    }
    if target_version < 1 {
        sqlx::query("DROP TABLE IF EXISTS jobs").execute(pool).await?;
    }
    sqlx::query("DELETE FROM schema_migrations WHERE version > $1")
        .bind(target_version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn ensure_migrations_table(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn current_version(pool: &PgPool) -> Result<i64, Box<dyn std::error::Error>> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn apply(pool: &PgPool, migration: &Migration) -> Result<(), Box<dyn std::error::Error>> {
    let mut tx = pool.begin().await?;
    // Migration bodies may contain PL/pgSQL function definitions with their
    // own internal `;`, so these run over the simple query protocol
    // (`raw_sql`) rather than as a single prepared statement.
    sqlx::raw_sql(migration.up).execute(&mut *tx).await?;
    sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
