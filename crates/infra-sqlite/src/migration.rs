// Migration Runner: brings the schema to the current
// version, idempotently, tracking applied versions in `schema_migrations`
// (see Open Question decision #1 in DESIGN.md on the `jobs`/
// `schema_migrations` vs. `izi_jobs`/`izi_migrations` naming). Each
// migration applies inside its own transaction.

use sqlx::SqlitePool;
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

/// Brings the schema up to the latest known version. Safe to call
/// repeatedly: already-applied versions are skipped.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
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

/// Reverses migrations strictly above `target_version`. SQLite has no
/// per-migration `down` script authored here (the jobs table's shape never
/// needs a reverse step within this crate's lifetime); instead this drops
/// and lets the next `run_migrations` recreate from `target_version + 1`
/// onward, which is sufficient for the test-fixture use this method serves.
pub async fn rollback(pool: &SqlitePool, target_version: i64) -> Result<(), Box<dyn std::error::Error>> {
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

async fn ensure_migrations_table(pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn current_version(pool: &SqlitePool) -> Result<i64, Box<dyn std::error::Error>> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(pool)
            .await?;
    Ok(version.unwrap_or(0))
}

async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<(), Box<dyn std::error::Error>> {
    let mut tx = pool.begin().await?;
    for statement in migration.up.split(';') {
        let clean: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        if !clean.is_empty() {
            sqlx::query(&clean).execute(&mut *tx).await?;
        }
    }
    sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }
}
