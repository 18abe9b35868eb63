// Migration Runner, same idempotent version-tracked shape
// as the SQLite and PostgreSQL runners, rewritten against `MySqlPool`.
// MySQL's DDL statements implicitly commit, so unlike the other two
// adapters a migration here is not atomic with its `schema_migrations`
// bookkeeping row; accepted because `CREATE TABLE IF NOT EXISTS` /
// `CREATE INDEX` are themselves idempotent and safe to re-run on a crash
// between the DDL and the bookkeeping insert.

use sqlx::MySqlPool;
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
];

pub async fn run_migrations(pool: &MySqlPool) -> Result<(), Box<dyn std::error::Error>> {
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

pub async fn rollback(pool: &MySqlPool, target_version: i64) -> Result<(), Box<dyn std::error::Error>> {
    let current = current_version(pool).await?;
    if target_version >= current {
        return Ok(());
    }
    if target_version < 1 {
        sqlx::query("DROP TABLE IF EXISTS jobs").execute(pool).await?;
    }
    sqlx::query("DELETE FROM schema_migrations WHERE version > ?")
        .bind(target_version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn ensure_migrations_table(pool: &MySqlPool) -> Result<(), Box<dyn std::error::Error>> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn current_version(pool: &MySqlPool) -> Result<i64, Box<dyn std::error::Error>> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn apply(pool: &MySqlPool, migration: &Migration) -> Result<(), Box<dyn std::error::Error>> {
    for statement in migration.up.split(';') {
        let clean: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        if !clean.is_empty() {
            sqlx::query(&clean).execute(pool).await?;
        }
    }
    sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;
    Ok(())
}
