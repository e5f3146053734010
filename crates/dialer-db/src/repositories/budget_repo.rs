//! Budget ledger repository implementation
//!
//! Every mutation locks the ledger row with `SELECT ... FOR UPDATE`, applies
//! the pure ledger operation, and writes the row back before committing. The
//! lazy reset and the check or add that follows it share that one critical
//! section.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dialer_core::{
    models::BudgetLedger,
    traits::{BudgetRepository, LedgerOp},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of BudgetRepository
pub struct PgBudgetRepository {
    pool: PgPool,
}

impl PgBudgetRepository {
    /// Create a new budget repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BudgetRepository for PgBudgetRepository {
    #[instrument(skip(self, ledger), fields(name = %ledger.name()))]
    async fn ensure(&self, ledger: &BudgetLedger) -> AppResult<BudgetLedger> {
        sqlx::query(
            r#"
            INSERT INTO budget_ledgers (
                name, daily_limit, monthly_limit,
                current_daily_spend, current_monthly_spend, last_reset_date, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(ledger.name())
        .bind(ledger.daily_limit())
        .bind(ledger.monthly_limit())
        .bind(ledger.current_daily_spend())
        .bind(ledger.current_monthly_spend())
        .bind(ledger.last_reset_date())
        .bind(ledger.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating budget ledger: {}", e);
            AppError::Database(format!("Failed to create budget ledger: {}", e))
        })?;

        self.get(ledger.name())
            .await?
            .ok_or_else(|| AppError::Internal(format!("budget ledger {} vanished", ledger.name())))
    }

    #[instrument(skip(self))]
    async fn get(&self, name: &str) -> AppResult<Option<BudgetLedger>> {
        let row = sqlx::query_as::<sqlx::Postgres, LedgerRow>(
            r#"
            SELECT name, daily_limit, monthly_limit,
                   current_daily_spend, current_monthly_spend, last_reset_date, updated_at
            FROM budget_ledgers
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error loading budget ledger {}: {}", name, e);
            AppError::Database(format!("Failed to load budget ledger: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, op))]
    async fn modify(&self, name: &str, op: LedgerOp<'_>) -> AppResult<BudgetLedger> {
        // Start transaction
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock ledger row
        let mut ledger: BudgetLedger = sqlx::query_as::<sqlx::Postgres, LedgerRow>(
            r#"
            SELECT name, daily_limit, monthly_limit,
                   current_daily_spend, current_monthly_spend, last_reset_date, updated_at
            FROM budget_ledgers
            WHERE name = $1
            FOR UPDATE
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to lock budget ledger: {}", e);
            AppError::Database(format!("Failed to lock budget ledger: {}", e))
        })?
        .ok_or_else(|| AppError::Internal(format!("budget ledger {} not found", name)))?
        .into();

        // Dropping the transaction on error rolls it back
        op(&mut ledger)?;

        sqlx::query(
            r#"
            UPDATE budget_ledgers
            SET daily_limit = $2,
                monthly_limit = $3,
                current_daily_spend = $4,
                current_monthly_spend = $5,
                last_reset_date = $6,
                updated_at = $7
            WHERE name = $1
            "#,
        )
        .bind(ledger.name())
        .bind(ledger.daily_limit())
        .bind(ledger.monthly_limit())
        .bind(ledger.current_daily_spend())
        .bind(ledger.current_monthly_spend())
        .bind(ledger.last_reset_date())
        .bind(ledger.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to update budget ledger: {}", e);
            AppError::Database(format!("Failed to update budget ledger: {}", e))
        })?;

        // Commit transaction
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            "Budget ledger {} now at daily {} / monthly {}",
            name,
            ledger.current_daily_spend(),
            ledger.current_monthly_spend()
        );

        Ok(ledger)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    name: String,
    daily_limit: Decimal,
    monthly_limit: Decimal,
    current_daily_spend: Decimal,
    current_monthly_spend: Decimal,
    last_reset_date: NaiveDate,
    updated_at: DateTime<Utc>,
}

impl From<LedgerRow> for BudgetLedger {
    fn from(row: LedgerRow) -> Self {
        BudgetLedger::from_parts(
            row.name,
            row.daily_limit,
            row.monthly_limit,
            row.current_daily_spend,
            row.current_monthly_spend,
            row.last_reset_date,
            row.updated_at,
        )
    }
}
