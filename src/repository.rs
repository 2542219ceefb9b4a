use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, query_builder::QueryBuilder};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Collection, Record, RecordDraft, RecordFilter, RecordPatch, RecordRow, RecordUpdate,
    UpdatedRecordRow, User,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository Trait
///
/// Persistence contract for every collection plus the account table. Handlers only see this trait,
/// so the Postgres implementation and the in-memory one are interchangeable.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Records ---
    /// Newest first, restricted by `filter`.
    async fn list(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, RepositoryError>;
    async fn get(&self, collection: Collection, id: Uuid)
    -> Result<Option<Record>, RepositoryError>;
    async fn insert(
        &self,
        collection: Collection,
        draft: RecordDraft,
    ) -> Result<Record, RepositoryError>;
    /// Merges `patch` into the stored record. `None` when the record does not exist. When the
    /// patch carries media, the key it replaced is reported back.
    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: RecordPatch,
    ) -> Result<Option<RecordUpdate>, RepositoryError>;
    /// Removes and returns the record. `None` when it does not exist.
    async fn delete(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Record>, RepositoryError>;

    // --- Accounts ---
    async fn find_user(&self, username: &str) -> Result<Option<User>, RepositoryError>;
    /// Inserts the user, or refreshes hash and role of the existing account with the same username.
    async fn upsert_user(&self, user: User) -> Result<User, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// Document-style storage on Postgres: one table per collection, declared fields kept in a JSONB
/// `data` column next to the media reference.
pub struct PostgresRepository {
    pool: PgPool,
}

const RECORD_COLUMNS: &str = "id, url, media_key, data, created_at, updated_at";

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the collection tables and the account table when missing.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for collection in Collection::ALL {
            let table = collection.table();
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id UUID PRIMARY KEY,
                    url TEXT,
                    media_key TEXT,
                    data JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                )"
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {table}_created_at_idx ON {table} (created_at DESC)"
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// Filters run against the JSONB document with bound parameters only.
    async fn list(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, RepositoryError> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {RECORD_COLUMNS} FROM {} WHERE TRUE", collection.table()));

        for (field, value) in &filter.equals {
            builder.push(" AND data ->> ");
            builder.push_bind(field.clone());
            builder.push(" = ");
            builder.push_bind(value.clone());
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn get(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Record>, RepositoryError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM {} WHERE id = $1",
            collection.table()
        );
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Record::from))
    }

    async fn insert(
        &self,
        collection: Collection,
        draft: RecordDraft,
    ) -> Result<Record, RepositoryError> {
        let sql = format!(
            "INSERT INTO {} (id, url, media_key, data, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING {RECORD_COLUMNS}",
            collection.table()
        );
        let (url, media_key) = match draft.media {
            Some(media) => (Some(media.url), Some(media.key)),
            None => (None, None),
        };
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(url)
            .bind(media_key)
            .bind(sqlx::types::Json(draft.fields))
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    /// `data || $2` merges the patch over the stored document; COALESCE keeps the old media
    /// reference when no new attachment was supplied. The `previous` CTE locks the row so the
    /// displaced key is the one this statement overwrote.
    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: RecordPatch,
    ) -> Result<Option<RecordUpdate>, RepositoryError> {
        let table = collection.table();
        let sql = format!(
            "WITH previous AS (
                SELECT id, media_key FROM {table} WHERE id = $1 FOR UPDATE
             )
             UPDATE {table} AS t SET
                data = t.data || $2,
                url = COALESCE($3, t.url),
                media_key = COALESCE($4, t.media_key),
                updated_at = $5
             FROM previous
             WHERE t.id = previous.id
             RETURNING t.id, t.url, t.media_key, t.data, t.created_at, t.updated_at,
                previous.media_key AS previous_media_key"
        );
        let replaces_media = patch.media.is_some();
        let (url, media_key) = match patch.media {
            Some(media) => (Some(media.url), Some(media.key)),
            None => (None, None),
        };
        let updated = sqlx::query_as::<_, UpdatedRecordRow>(&sql)
            .bind(id)
            .bind(sqlx::types::Json(patch.fields))
            .bind(url)
            .bind(media_key)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        Ok(updated.map(|updated| RecordUpdate {
            record: updated.row.into(),
            replaced_media_key: updated.previous_media_key.filter(|_| replaces_media),
        }))
    }

    async fn delete(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Record>, RepositoryError> {
        let sql = format!(
            "DELETE FROM {} WHERE id = $1 RETURNING {RECORD_COLUMNS}",
            collection.table()
        );
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Record::from))
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, role FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn upsert_user(&self, user: User) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, username, password_hash, role)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (username)
               DO UPDATE SET password_hash = EXCLUDED.password_hash, role = EXCLUDED.role
               RETURNING id, username, password_hash, role"#,
        )
        .bind(user.id)
        .bind(user.username)
        .bind(user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
}

/// InMemoryRepository
///
/// Process-local implementation used by the test suites.
#[derive(Default)]
pub struct InMemoryRepository {
    records: RwLock<HashMap<Collection, Vec<Record>>>,
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all collections.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, RepositoryError> {
        let records = self.records.read().await;
        let mut found: Vec<Record> = records
            .get(&collection)
            .map(|list| list.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn get(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Record>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .get(&collection)
            .and_then(|list| list.iter().find(|r| r.id == id).cloned()))
    }

    async fn insert(
        &self,
        collection: Collection,
        draft: RecordDraft,
    ) -> Result<Record, RepositoryError> {
        let now = Utc::now();
        let (url, media_key) = match draft.media {
            Some(media) => (Some(media.url), Some(media.key)),
            None => (None, None),
        };
        let record = Record {
            id: Uuid::new_v4(),
            url,
            media_key,
            created_at: now,
            updated_at: now,
            fields: draft.fields,
        };
        self.records
            .write()
            .await
            .entry(collection)
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: RecordPatch,
    ) -> Result<Option<RecordUpdate>, RepositoryError> {
        let mut records = self.records.write().await;
        let Some(record) = records
            .get_mut(&collection)
            .and_then(|list| list.iter_mut().find(|r| r.id == id))
        else {
            return Ok(None);
        };

        for (name, value) in patch.fields {
            record.fields.insert(name, value);
        }
        let mut replaced_media_key = None;
        if let Some(media) = patch.media {
            record.url = Some(media.url);
            replaced_media_key = record.media_key.replace(media.key);
        }
        record.updated_at = Utc::now();
        Ok(Some(RecordUpdate {
            record: record.clone(),
            replaced_media_key,
        }))
    }

    async fn delete(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Record>, RepositoryError> {
        let mut records = self.records.write().await;
        let Some(list) = records.get_mut(&collection) else {
            return Ok(None);
        };
        Ok(list
            .iter()
            .position(|r| r.id == id)
            .map(|index| list.remove(index)))
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn upsert_user(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let stored = match users.get(&user.username) {
            Some(existing) => User {
                id: existing.id,
                ..user
            },
            None => user,
        };
        users.insert(stored.username.clone(), stored.clone());
        Ok(stored)
    }
}
