//! Contact repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{Contact, ContactStatus},
    traits::ContactRepository,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of ContactRepository
pub struct PgContactRepository {
    pool: PgPool,
}

impl PgContactRepository {
    /// Create a new contact repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_write_error(phone: &str, e: sqlx::Error) -> AppError {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return AppError::AlreadyExists(format!("contact {}", phone));
            }
        }
        error!("Database error writing contact {}: {}", phone, e);
        AppError::Database(format!("Failed to write contact: {}", e))
    }
}

#[async_trait]
impl ContactRepository for PgContactRepository {
    #[instrument(skip(self, contact), fields(phone = %contact.phone_number))]
    async fn insert(&self, contact: &Contact) -> AppResult<Contact> {
        let row = sqlx::query_as::<sqlx::Postgres, ContactRow>(
            r#"
            INSERT INTO contacts (id, phone_number, name, campaign_tag, tags, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, phone_number, name, campaign_tag, tags, status, created_at, updated_at
            "#,
        )
        .bind(contact.id)
        .bind(&contact.phone_number)
        .bind(&contact.name)
        .bind(&contact.campaign_tag)
        .bind(contact.tags.iter().cloned().collect::<Vec<_>>())
        .bind(contact.status.to_string())
        .bind(contact.created_at)
        .bind(contact.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(&contact.phone_number, e))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Contact>> {
        let result = sqlx::query_as::<sqlx::Postgres, ContactRow>(
            r#"
            SELECT id, phone_number, name, campaign_tag, tags, status, created_at, updated_at
            FROM contacts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding contact {}: {}", id, e);
            AppError::Database(format!("Failed to find contact: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_phone(&self, phone_number: &str) -> AppResult<Option<Contact>> {
        debug!("Finding contact by phone: {}", phone_number);

        let result = sqlx::query_as::<sqlx::Postgres, ContactRow>(
            r#"
            SELECT id, phone_number, name, campaign_tag, tags, status, created_at, updated_at
            FROM contacts
            WHERE phone_number = $1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding contact by phone: {}", e);
            AppError::Database(format!("Failed to find contact: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, contact), fields(contact_id = %contact.id))]
    async fn update(&self, contact: &Contact) -> AppResult<Contact> {
        let row = sqlx::query_as::<sqlx::Postgres, ContactRow>(
            r#"
            UPDATE contacts
            SET name = $2,
                campaign_tag = $3,
                tags = $4,
                status = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING id, phone_number, name, campaign_tag, tags, status, created_at, updated_at
            "#,
        )
        .bind(contact.id)
        .bind(&contact.name)
        .bind(&contact.campaign_tag)
        .bind(contact.tags.iter().cloned().collect::<Vec<_>>())
        .bind(contact.status.to_string())
        .bind(contact.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(&contact.phone_number, e))?
        .ok_or_else(|| AppError::ContactNotFound(contact.id.to_string()))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        // call_records rows go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting contact {}: {}", id, e);
                AppError::Database(format!("Failed to delete contact: {}", e))
            })?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Deleted contact {}", id);
        }
        Ok(deleted)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn set_status(&self, ids: &[Uuid], status: ContactStatus) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE contacts
            SET status = $2, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(status.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating contact status: {}", e);
            AppError::Database(format!("Failed to update contact status: {}", e))
        })?;

        Ok(result.rows_affected())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    id: Uuid,
    phone_number: String,
    name: Option<String>,
    campaign_tag: Option<String>,
    tags: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            phone_number: row.phone_number,
            name: row.name,
            campaign_tag: row.campaign_tag,
            tags: row.tags.into_iter().collect(),
            status: ContactStatus::from_str(&row.status).unwrap_or(ContactStatus::Inactive),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
