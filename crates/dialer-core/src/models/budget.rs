//! Budget ledger model
//!
//! Daily and monthly spend caps with calendar-based lazy resets. The ledger
//! is pure state and arithmetic; persistence and locking belong to the
//! repository, which runs every mutation below inside one critical section.

use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Name of the singleton ledger used when none is configured
pub const DEFAULT_LEDGER_NAME: &str = "default";

/// Remaining allowance for one period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// The period's limit is zero
    Unlimited,
    Amount(Decimal),
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Unlimited => write!(f, "unlimited"),
            Remaining::Amount(amount) => write!(f, "{}", amount),
        }
    }
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Remaining::Unlimited => serializer.serialize_str("unlimited"),
            Remaining::Amount(amount) => Serialize::serialize(amount, serializer),
        }
    }
}

/// Budget ledger entity
///
/// Fields are private so that running totals only change through the
/// operations below, each of which applies the lazy reset first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLedger {
    name: String,
    daily_limit: Decimal,
    monthly_limit: Decimal,
    current_daily_spend: Decimal,
    current_monthly_spend: Decimal,
    last_reset_date: NaiveDate,
    updated_at: DateTime<Utc>,
}

impl BudgetLedger {
    /// Create an empty ledger; a zero limit means unlimited
    pub fn new(
        name: impl Into<String>,
        daily_limit: Decimal,
        monthly_limit: Decimal,
        today: NaiveDate,
    ) -> AppResult<Self> {
        Self::check_limits(daily_limit, monthly_limit)?;
        Ok(Self {
            name: name.into(),
            daily_limit,
            monthly_limit,
            current_daily_spend: Decimal::ZERO,
            current_monthly_spend: Decimal::ZERO,
            last_reset_date: today,
            updated_at: Utc::now(),
        })
    }

    /// Rebuild a ledger from storage
    pub fn from_parts(
        name: String,
        daily_limit: Decimal,
        monthly_limit: Decimal,
        current_daily_spend: Decimal,
        current_monthly_spend: Decimal,
        last_reset_date: NaiveDate,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            daily_limit,
            monthly_limit,
            current_daily_spend,
            current_monthly_spend,
            last_reset_date,
            updated_at,
        }
    }

    fn check_limits(daily_limit: Decimal, monthly_limit: Decimal) -> AppResult<()> {
        if daily_limit.is_sign_negative() || monthly_limit.is_sign_negative() {
            return Err(AppError::Validation(
                "budget limits must be zero (unlimited) or positive".to_string(),
            ));
        }
        Ok(())
    }

    // ==================== Accessors ====================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn daily_limit(&self) -> Decimal {
        self.daily_limit
    }

    pub fn monthly_limit(&self) -> Decimal {
        self.monthly_limit
    }

    pub fn current_daily_spend(&self) -> Decimal {
        self.current_daily_spend
    }

    pub fn current_monthly_spend(&self) -> Decimal {
        self.current_monthly_spend
    }

    pub fn last_reset_date(&self) -> NaiveDate {
        self.last_reset_date
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ==================== Operations ====================

    /// Lazy calendar reset
    ///
    /// Zeroes the daily total when the day changed and, independently, the
    /// monthly total when the month changed. Returns whether anything reset.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date == today {
            return false;
        }

        self.current_daily_spend = Decimal::ZERO;
        if (self.last_reset_date.year(), self.last_reset_date.month())
            != (today.year(), today.month())
        {
            self.current_monthly_spend = Decimal::ZERO;
        }
        self.last_reset_date = today;
        self.updated_at = Utc::now();
        true
    }

    /// Whether `cost` fits both caps without resetting first
    pub fn fits(&self, cost: Decimal) -> bool {
        let daily_ok = self.daily_limit.is_zero() || self.current_daily_spend + cost <= self.daily_limit;
        let monthly_ok =
            self.monthly_limit.is_zero() || self.current_monthly_spend + cost <= self.monthly_limit;
        daily_ok && monthly_ok
    }

    /// Reset if the calendar moved, then check both caps
    pub fn can_afford(&mut self, cost: Decimal, today: NaiveDate) -> bool {
        self.roll_over(today);
        self.fits(cost)
    }

    /// Reset if the calendar moved, then add `cost` to both running totals
    pub fn add_spend(&mut self, cost: Decimal, today: NaiveDate) -> AppResult<()> {
        if cost.is_sign_negative() {
            return Err(AppError::Validation(format!(
                "spend must not be negative, got {}",
                cost
            )));
        }

        self.roll_over(today);
        self.current_daily_spend += cost;
        self.current_monthly_spend += cost;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Reset if the calendar moved, then debit `cost` only if it fits both caps
    ///
    /// Check and debit happen on the same state, so two reservations made
    /// under one lock can never both squeeze into the last of the allowance.
    pub fn reserve(&mut self, cost: Decimal, today: NaiveDate) -> AppResult<()> {
        self.roll_over(today);
        if !self.fits(cost) {
            return Err(AppError::BudgetExceeded {
                estimated: cost.to_string(),
                daily_remaining: self.daily_remaining().to_string(),
                monthly_remaining: self.monthly_remaining().to_string(),
            });
        }
        self.add_spend(cost, today)
    }

    /// Give back `cost` reserved on `reserved_on`
    ///
    /// A total that has reset since the reservation is left alone. Totals
    /// never go below zero.
    pub fn release(&mut self, cost: Decimal, reserved_on: NaiveDate, today: NaiveDate) -> AppResult<()> {
        if cost.is_sign_negative() {
            return Err(AppError::Validation(format!(
                "released amount must not be negative, got {}",
                cost
            )));
        }

        self.roll_over(today);
        if reserved_on == today {
            self.current_daily_spend = (self.current_daily_spend - cost).max(Decimal::ZERO);
        }
        if (reserved_on.year(), reserved_on.month()) == (today.year(), today.month()) {
            self.current_monthly_spend = (self.current_monthly_spend - cost).max(Decimal::ZERO);
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace both limits
    pub fn set_limits(&mut self, daily_limit: Decimal, monthly_limit: Decimal) -> AppResult<()> {
        Self::check_limits(daily_limit, monthly_limit)?;
        self.daily_limit = daily_limit;
        self.monthly_limit = monthly_limit;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn daily_remaining(&self) -> Remaining {
        Self::remaining(self.daily_limit, self.current_daily_spend)
    }

    pub fn monthly_remaining(&self) -> Remaining {
        Self::remaining(self.monthly_limit, self.current_monthly_spend)
    }

    fn remaining(limit: Decimal, spend: Decimal) -> Remaining {
        if limit.is_zero() {
            Remaining::Unlimited
        } else if spend >= limit {
            Remaining::Amount(Decimal::ZERO)
        } else {
            Remaining::Amount(limit - spend)
        }
    }
}
