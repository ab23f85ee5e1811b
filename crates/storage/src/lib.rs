use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use shared::{
    domain::{
        DonationRequest, Location, RequestId, RequestRow, RequestSnapshot, RequestStatus, Role,
        UserId, UserProfile,
    },
    error::StoreError,
};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// The live request store plus the profile store, backed by one sqlite
/// database. Every successful request mutation publishes the entire new
/// snapshot (never a delta) to all subscribers.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    snapshots: broadcast::Sender<RequestSnapshot>,
    publish_lock: Arc<Mutex<()>>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        init_schema(&pool).await?;
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Ok(Self {
            pool,
            snapshots,
            publish_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Full ordered sequence of all requests, in insertion (rowid) order.
    pub async fn snapshot(&self) -> std::result::Result<RequestSnapshot, StoreError> {
        let rows = sqlx::query(
            "SELECT id, title, description, food_type, food_quantity, food_weight,
                    expiration_date, pickup_date_time, location_lat, location_lng, location_raw,
                    donated_by, delivered_by, received_by, status, time
             FROM donation_requests
             ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(RequestRow {
                    request_id: RequestId::new(row.get::<String, _>(0)),
                    request: request_from_row(&row)?,
                })
            })
            .collect()
    }

    /// New subscribers pair this with an immediate [`Storage::snapshot`] call
    /// to observe the current state before the first pushed change.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestSnapshot> {
        self.snapshots.subscribe()
    }

    /// Inserts under a freshly generated key and returns it.
    pub async fn create_request(
        &self,
        record: &DonationRequest,
    ) -> std::result::Result<RequestId, StoreError> {
        let request_id = RequestId::new(Uuid::new_v4().to_string());
        let (lat, lng, raw) = location_columns(&record.location);
        sqlx::query(
            "INSERT INTO donation_requests
                 (id, title, description, food_type, food_quantity, food_weight,
                  expiration_date, pickup_date_time, location_lat, location_lng, location_raw,
                  donated_by, delivered_by, received_by, status, time)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(request_id.as_str())
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.food_type)
        .bind(&record.food_quantity)
        .bind(&record.food_weight)
        .bind(&record.expiration_date)
        .bind(&record.pickup_date_time)
        .bind(lat)
        .bind(lng)
        .bind(raw)
        .bind(record.donated_by.as_str())
        .bind(record.delivered_by.as_str())
        .bind(record.received_by.as_str())
        .bind(record.status.as_str())
        .bind(&record.time)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        self.publish_snapshot().await?;
        Ok(request_id)
    }

    /// Unconditional full-record overwrite. Kept for seeding and migration
    /// paths; lifecycle transitions go through
    /// [`Storage::overwrite_request_if_status`] instead.
    pub async fn overwrite_request(
        &self,
        request_id: &RequestId,
        record: &DonationRequest,
    ) -> std::result::Result<(), StoreError> {
        let (lat, lng, raw) = location_columns(&record.location);
        let result = sqlx::query(
            "UPDATE donation_requests SET
                 title = ?, description = ?, food_type = ?, food_quantity = ?, food_weight = ?,
                 expiration_date = ?, pickup_date_time = ?, location_lat = ?, location_lng = ?,
                 location_raw = ?, donated_by = ?, delivered_by = ?, received_by = ?,
                 status = ?, time = ?
             WHERE id = ?",
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.food_type)
        .bind(&record.food_quantity)
        .bind(&record.food_weight)
        .bind(&record.expiration_date)
        .bind(&record.pickup_date_time)
        .bind(lat)
        .bind(lng)
        .bind(raw)
        .bind(record.donated_by.as_str())
        .bind(record.delivered_by.as_str())
        .bind(record.received_by.as_str())
        .bind(record.status.as_str())
        .bind(&record.time)
        .bind(request_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(request_id.clone()));
        }

        self.publish_snapshot().await?;
        Ok(())
    }

    /// Full-record overwrite conditional on the stored status still matching
    /// `expected`. On mismatch nothing is written and the error carries the
    /// actual current status so the caller can retry or refresh.
    pub async fn overwrite_request_if_status(
        &self,
        request_id: &RequestId,
        expected: RequestStatus,
        record: &DonationRequest,
    ) -> std::result::Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let (lat, lng, raw) = location_columns(&record.location);
        let result = sqlx::query(
            "UPDATE donation_requests SET
                 title = ?, description = ?, food_type = ?, food_quantity = ?, food_weight = ?,
                 expiration_date = ?, pickup_date_time = ?, location_lat = ?, location_lng = ?,
                 location_raw = ?, donated_by = ?, delivered_by = ?, received_by = ?,
                 status = ?, time = ?
             WHERE id = ? AND status = ?",
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.food_type)
        .bind(&record.food_quantity)
        .bind(&record.food_weight)
        .bind(&record.expiration_date)
        .bind(&record.pickup_date_time)
        .bind(lat)
        .bind(lng)
        .bind(raw)
        .bind(record.donated_by.as_str())
        .bind(record.delivered_by.as_str())
        .bind(record.received_by.as_str())
        .bind(record.status.as_str())
        .bind(&record.time)
        .bind(request_id.as_str())
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            let row = sqlx::query("SELECT status FROM donation_requests WHERE id = ?")
                .bind(request_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
            tx.rollback().await.map_err(StoreError::backend)?;

            return match row {
                None => Err(StoreError::NotFound(request_id.clone())),
                Some(row) => {
                    let stored: String = row.get(0);
                    let actual = RequestStatus::parse(&stored).ok_or_else(|| {
                        StoreError::Backend(format!(
                            "request {request_id} holds invalid status '{stored}'"
                        ))
                    })?;
                    Err(StoreError::PreconditionFailed {
                        request_id: request_id.clone(),
                        expected,
                        actual,
                    })
                }
            };
        }

        tx.commit().await.map_err(StoreError::backend)?;
        self.publish_snapshot().await?;
        Ok(())
    }

    pub async fn put_profile(
        &self,
        user_id: &UserId,
        profile: &UserProfile,
    ) -> std::result::Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, account_type, first_name) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 account_type = excluded.account_type, first_name = excluded.first_name",
        )
        .bind(user_id.as_str())
        .bind(profile.account_type.map(Role::as_str))
        .bind(profile.first_name.as_deref())
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    /// Missing rows and unrecognized `account_type` values both come back as
    /// unset fields rather than errors; an unset role gates every transition.
    pub async fn profile(
        &self,
        user_id: &UserId,
    ) -> std::result::Result<Option<UserProfile>, StoreError> {
        let row = sqlx::query("SELECT account_type, first_name FROM users WHERE id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        Ok(row.map(|row| UserProfile {
            account_type: row
                .get::<Option<String>, _>(0)
                .as_deref()
                .and_then(Role::parse),
            first_name: row.get::<Option<String>, _>(1),
        }))
    }

    /// Reads every top-level record once and returns `(key, document)` pairs
    /// with the key spliced in as `_id`, users first, each set in insertion
    /// order. Input for the one-shot migration into a document store.
    pub async fn export_documents(&self) -> Result<Vec<(String, serde_json::Value)>> {
        let mut documents = Vec::new();

        let users = sqlx::query("SELECT id, account_type, first_name FROM users ORDER BY rowid ASC")
            .fetch_all(&self.pool)
            .await?;
        for row in users {
            let id: String = row.get(0);
            let doc = serde_json::json!({
                "_id": id,
                "account_type": row.get::<Option<String>, _>(1),
                "first_name": row.get::<Option<String>, _>(2),
            });
            documents.push((id, doc));
        }

        for row in self.snapshot().await? {
            let mut doc = serde_json::to_value(&row.request)
                .context("failed to encode donation request document")?;
            doc["_id"] = serde_json::Value::String(row.request_id.as_str().to_string());
            documents.push((row.request_id.0, doc));
        }

        Ok(documents)
    }

    async fn publish_snapshot(&self) -> std::result::Result<(), StoreError> {
        // Read and send under one lock so two writers cannot interleave and
        // deliver an older snapshot after a newer one.
        let _guard = self.publish_lock.lock().await;
        let snapshot = self.snapshot().await?;
        // Nobody listening is fine.
        let _ = self.snapshots.send(snapshot);
        Ok(())
    }
}

/// Bulk-insert target for the one-shot migration: a flat table of JSON
/// documents keyed by their source identifier.
#[derive(Clone)]
pub struct DocumentStore {
    pool: Pool<Sqlite>,
}

impl DocumentStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS documents (id TEXT PRIMARY KEY, doc TEXT NOT NULL)")
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }

    /// Inserts all documents in one transaction; any failure rolls the whole
    /// batch back.
    pub async fn insert_many(&self, documents: &[(String, serde_json::Value)]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for (id, doc) in documents {
            sqlx::query("INSERT INTO documents (id, doc) VALUES (?, ?)")
                .bind(id)
                .bind(doc.to_string())
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to insert document '{id}'"))?;
        }
        tx.commit().await?;
        Ok(documents.len() as u64)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn get(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT doc FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            serde_json::from_str(&row.get::<String, _>(0))
                .with_context(|| format!("document '{id}' holds invalid JSON"))
        })
        .transpose()
    }
}

async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donation_requests (
            id               TEXT PRIMARY KEY,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL,
            food_type        TEXT NOT NULL,
            food_quantity    TEXT NOT NULL,
            food_weight      TEXT NOT NULL,
            expiration_date  TEXT NOT NULL,
            pickup_date_time TEXT NOT NULL,
            location_lat     TEXT,
            location_lng     TEXT,
            location_raw     TEXT,
            donated_by       TEXT NOT NULL,
            delivered_by     TEXT NOT NULL,
            received_by      TEXT NOT NULL,
            status           TEXT NOT NULL,
            time             TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to ensure donation_requests table exists")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id           TEXT PRIMARY KEY,
            account_type TEXT,
            first_name   TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to ensure users table exists")?;

    Ok(())
}

fn request_from_row(row: &SqliteRow) -> std::result::Result<DonationRequest, StoreError> {
    let stored_status: String = row.get(14);
    let status = RequestStatus::parse(&stored_status).ok_or_else(|| {
        StoreError::Backend(format!("stored request holds invalid status '{stored_status}'"))
    })?;

    let location = match (
        row.get::<Option<String>, _>(8),
        row.get::<Option<String>, _>(9),
    ) {
        (Some(lat), Some(lng)) => Location::Coordinates { lat, lng },
        _ => Location::Raw(row.get::<Option<String>, _>(10).unwrap_or_default()),
    };

    Ok(DonationRequest {
        title: row.get(1),
        description: row.get(2),
        food_type: row.get(3),
        food_quantity: row.get(4),
        food_weight: row.get(5),
        expiration_date: row.get(6),
        pickup_date_time: row.get(7),
        location,
        donated_by: UserId::new(row.get::<String, _>(11)),
        delivered_by: UserId::new(row.get::<String, _>(12)),
        received_by: UserId::new(row.get::<String, _>(13)),
        status,
        time: row.get(15),
    })
}

fn location_columns(location: &Location) -> (Option<&str>, Option<&str>, Option<&str>) {
    match location {
        Location::Coordinates { lat, lng } => (Some(lat.as_str()), Some(lng.as_str()), None),
        Location::Raw(raw) => (None, None, Some(raw.as_str())),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create parent directory '{}' for database url '{database_url}'",
                parent.display()
            )
        })?;
    }

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
