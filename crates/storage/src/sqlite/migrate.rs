use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Schema versions in order; each runs in its own transaction.
pub(super) const MIGRATIONS: &[(i64, &[&str])] = &[(
    1,
    &[r"
        CREATE TABLE IF NOT EXISTS secure_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "],
)];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
        ",
    )
    .execute(pool)
    .await?;

    let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    let latest = latest.unwrap_or(0);

    for &(version, statements) in MIGRATIONS.iter().filter(|(v, _)| *v > latest) {
        apply(pool, version, statements)
            .await
            .map_err(|source| SqliteInitError::Migration { version, source })?;
    }
    Ok(())
}

async fn apply(pool: &SqlitePool, version: i64, statements: &[&str]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
        .bind(version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}
