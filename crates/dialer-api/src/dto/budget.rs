//! Budget DTOs

use chrono::{DateTime, NaiveDate, Utc};
use dialer_core::models::{BudgetLedger, Remaining};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Ledger snapshot with what is left in each period
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetResponse {
    pub name: String,
    pub daily_limit: Decimal,
    pub monthly_limit: Decimal,
    pub current_daily_spend: Decimal,
    pub current_monthly_spend: Decimal,
    pub daily_remaining: Remaining,
    pub monthly_remaining: Remaining,
    pub last_reset_date: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

impl From<BudgetLedger> for BudgetResponse {
    fn from(ledger: BudgetLedger) -> Self {
        Self {
            name: ledger.name().to_string(),
            daily_limit: ledger.daily_limit(),
            monthly_limit: ledger.monthly_limit(),
            current_daily_spend: ledger.current_daily_spend(),
            current_monthly_spend: ledger.current_monthly_spend(),
            daily_remaining: ledger.daily_remaining(),
            monthly_remaining: ledger.monthly_remaining(),
            last_reset_date: ledger.last_reset_date(),
            updated_at: ledger.updated_at(),
        }
    }
}

/// New limits; zero means unlimited
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetLimitsRequest {
    #[validate(custom(function = "non_negative"))]
    pub daily_limit: Decimal,

    #[validate(custom(function = "non_negative"))]
    pub monthly_limit: Decimal,
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("negative_limit"));
    }
    Ok(())
}
