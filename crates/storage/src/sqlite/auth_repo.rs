use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use prep_core::model::{AuthState, UserProfile};
use sqlx::{Row, Sqlite, Transaction};

use crate::repository::{
    AuthStateRepository, StorageError, auth_from_entries, entries_from_auth, keys,
};

use super::SqliteRepository;

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

async fn upsert(
    tx: &mut Transaction<'_, Sqlite>,
    key: &str,
    value: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO secure_store (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        ",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(conn)?;
    Ok(())
}

async fn delete(tx: &mut Transaction<'_, Sqlite>, key: &str) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM secure_store WHERE key = ?1")
        .bind(key)
        .execute(&mut **tx)
        .await
        .map_err(conn)?;
    Ok(())
}

#[async_trait]
impl AuthStateRepository for SqliteRepository {
    async fn load_auth(&self) -> Result<Option<AuthState>, StorageError> {
        let rows = sqlx::query("SELECT key, value FROM secure_store")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut entries = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("key").map_err(ser)?;
            let value: String = row.try_get("value").map_err(ser)?;
            entries.insert(key, value);
        }

        auth_from_entries(&entries)
    }

    async fn save_auth(&self, state: &AuthState) -> Result<(), StorageError> {
        let entries = entries_from_auth(state)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for key in keys::ALL {
            delete(&mut tx, key).await?;
        }
        for (key, value) in &entries {
            upsert(&mut tx, key, value).await?;
        }
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn save_access_token(&self, access: &str) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        delete(&mut tx, keys::LEGACY_ACCESS_TOKEN).await?;
        upsert(&mut tx, keys::ACCESS_TOKEN, access).await?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn save_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        let raw = serde_json::to_string(user).map_err(ser)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;
        upsert(&mut tx, keys::USER, &raw).await?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn clear_auth(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for key in keys::ALL {
            delete(&mut tx, key).await?;
        }
        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
