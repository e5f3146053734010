//! Call record repository implementation
//!
//! PostgreSQL-backed storage for call records. Updates are a compare-and-swap
//! on the row version, and a row that already reached a terminal status is
//! never overwritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{CallRecord, CallStatus, Recording},
    traits::CallRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

const CALL_COLUMNS: &str = r#"
    id, contact_id, destination, campaign_tag, message, status, attempts,
    duration_seconds, cost, provider_call_id, scheduled_at, started_at,
    ended_at, error_detail, recording_url, recording_duration_seconds,
    created_at, updated_at, version
"#;

/// Status strings of every terminal state, as stored
const TERMINAL_STATUSES: [&str; 5] = ["completed", "failed", "no_answer", "busy", "canceled"];

/// PostgreSQL implementation of CallRepository
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    /// Create a new call repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse call status from string
    fn parse_status(s: &str) -> CallStatus {
        CallStatus::from_str(s).unwrap_or_else(|| {
            warn!("Unknown call status in database: {}", s);
            CallStatus::Failed
        })
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    #[instrument(skip(self, record), fields(call_id = %record.id))]
    async fn insert(&self, record: &CallRecord) -> AppResult<CallRecord> {
        debug!("Inserting call record for contact {}", record.contact_id);

        let sql = format!(
            r#"
            INSERT INTO call_records (
                id, contact_id, destination, campaign_tag, message, status, attempts,
                duration_seconds, cost, provider_call_id, scheduled_at, started_at,
                ended_at, error_detail, recording_url, recording_duration_seconds,
                created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {}
            "#,
            CALL_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .bind(record.id)
            .bind(record.contact_id)
            .bind(&record.destination)
            .bind(&record.campaign_tag)
            .bind(&record.message)
            .bind(record.status.as_str())
            .bind(record.attempts)
            .bind(record.duration_seconds)
            .bind(record.cost)
            .bind(&record.provider_call_id)
            .bind(record.scheduled_at)
            .bind(record.started_at)
            .bind(record.ended_at)
            .bind(&record.error_detail)
            .bind(record.recording.as_ref().map(|r| r.url.clone()))
            .bind(record.recording.as_ref().and_then(|r| r.duration_seconds))
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error inserting call record: {}", e);
                AppError::Database(format!("Failed to insert call record: {}", e))
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallRecord>> {
        debug!("Finding call record by id: {}", id);

        let sql = format!("SELECT {} FROM call_records WHERE id = $1", CALL_COLUMNS);
        let result = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call record {}: {}", id, e);
                AppError::Database(format!("Failed to find call record: {}", e))
            })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_provider_call_id(&self, provider_call_id: &str) -> AppResult<Option<CallRecord>> {
        let sql = format!(
            "SELECT {} FROM call_records WHERE provider_call_id = $1",
            CALL_COLUMNS
        );
        let result = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .bind(provider_call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call by provider id {}: {}", provider_call_id, e);
                AppError::Database(format!("Failed to find call record: {}", e))
            })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, record), fields(call_id = %record.id, status = %record.status))]
    async fn update(&self, record: &mut CallRecord) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_records
            SET status = $2,
                attempts = $3,
                duration_seconds = $4,
                cost = $5,
                provider_call_id = $6,
                started_at = $7,
                ended_at = $8,
                error_detail = $9,
                recording_url = $10,
                recording_duration_seconds = $11,
                updated_at = $12,
                version = version + 1
            WHERE id = $1
              AND version = $13
              AND status <> ALL($14)
            "#,
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(record.attempts)
        .bind(record.duration_seconds)
        .bind(record.cost)
        .bind(&record.provider_call_id)
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(&record.error_detail)
        .bind(record.recording.as_ref().map(|r| r.url.clone()))
        .bind(record.recording.as_ref().and_then(|r| r.duration_seconds))
        .bind(record.updated_at)
        .bind(record.version)
        .bind(&TERMINAL_STATUSES[..])
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating call record {}: {}", record.id, e);
            AppError::Database(format!("Failed to update call record: {}", e))
        })?;

        let written = result.rows_affected() == 1;
        if written {
            record.version += 1;
        } else {
            debug!(
                "Call record {} not written: missing, terminal or newer than version {}",
                record.id, record.version
            );
        }
        Ok(written)
    }

    #[instrument(skip(self))]
    async fn list_unplaced(&self) -> AppResult<Vec<CallRecord>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM call_records
            WHERE provider_call_id IS NULL
              AND status IN ('pending', 'queued')
            ORDER BY created_at ASC
            "#,
            CALL_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing unplaced call records: {}", e);
                AppError::Database(format!("Failed to list unplaced call records: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        status: Option<CallStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CallRecord>, i64)> {
        let status = status.map(|s| s.as_str());

        let sql = format!(
            r#"
            SELECT {}
            FROM call_records
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            CALL_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing call records: {}", e);
                AppError::Database(format!("Failed to list call records: {}", e))
            })?;

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM call_records WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting call records: {}", e);
            AppError::Database(format!("Failed to count call records: {}", e))
        })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: Uuid,
    contact_id: Uuid,
    destination: String,
    campaign_tag: Option<String>,
    message: Option<String>,
    status: String,
    attempts: i32,
    duration_seconds: Option<i32>,
    cost: Option<Decimal>,
    provider_call_id: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    error_detail: Option<String>,
    recording_url: Option<String>,
    recording_duration_seconds: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i32,
}

impl From<CallRow> for CallRecord {
    fn from(row: CallRow) -> Self {
        Self {
            id: row.id,
            contact_id: row.contact_id,
            destination: row.destination,
            campaign_tag: row.campaign_tag,
            message: row.message,
            status: PgCallRepository::parse_status(&row.status),
            attempts: row.attempts,
            duration_seconds: row.duration_seconds,
            cost: row.cost,
            provider_call_id: row.provider_call_id,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            error_detail: row.error_detail,
            recording: row.recording_url.map(|url| Recording {
                url,
                duration_seconds: row.recording_duration_seconds,
            }),
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}
