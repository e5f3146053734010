//! Budget ledger service
//!
//! Thin async front for one named [`BudgetLedger`]. Every operation goes
//! through [`BudgetRepository::modify`], so the lazy calendar reset and the
//! check or spend after it always run inside the same row lock.

use chrono::{NaiveDate, Utc};
use dialer_core::{
    models::{BudgetLedger, Remaining},
    traits::BudgetRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Amount debited ahead of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub amount: Decimal,
    pub reserved_on: NaiveDate,
}

/// Spend-cap enforcement for the dialer
pub struct BudgetLedgerService {
    repo: Arc<dyn BudgetRepository>,
    name: String,
}

impl BudgetLedgerService {
    /// Open the named ledger, creating it with the given limits if missing
    ///
    /// Limits of an existing ledger are left alone; use [`Self::set_limits`].
    pub async fn open(
        repo: Arc<dyn BudgetRepository>,
        name: &str,
        daily_limit: Decimal,
        monthly_limit: Decimal,
    ) -> AppResult<Self> {
        let seed = BudgetLedger::new(name, daily_limit, monthly_limit, Self::today())?;
        let ledger = repo.ensure(&seed).await?;
        info!(
            "Budget ledger '{}' ready: daily limit {}, monthly limit {}",
            name,
            ledger.daily_limit(),
            ledger.monthly_limit()
        );

        Ok(Self {
            repo,
            name: name.to_string(),
        })
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `cost` fits under both caps right now
    #[instrument(skip(self))]
    pub async fn can_afford(&self, cost: Decimal) -> AppResult<bool> {
        let today = Self::today();
        let ledger = self
            .repo
            .modify(&self.name, &|l: &mut BudgetLedger| -> AppResult<()> {
                l.roll_over(today);
                Ok(())
            })
            .await?;
        Ok(ledger.fits(cost))
    }

    /// Debit `cost` if it fits both caps, in one critical section
    ///
    /// Fails with `BudgetExceeded` carrying the remaining amounts, leaving the
    /// ledger untouched. Hand the returned reservation to [`Self::release`]
    /// if the call it pays for is never placed.
    #[instrument(skip(self))]
    pub async fn reserve(&self, cost: Decimal) -> AppResult<Reservation> {
        let today = Self::today();
        match self
            .repo
            .modify(&self.name, &|l: &mut BudgetLedger| l.reserve(cost, today))
            .await
        {
            Ok(_) => Ok(Reservation {
                amount: cost,
                reserved_on: today,
            }),
            Err(e @ AppError::BudgetExceeded { .. }) => {
                warn!("Budget '{}' cannot cover {}: {}", self.name, cost, e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Refund a reservation whose call was never placed
    #[instrument(skip(self))]
    pub async fn release(&self, reservation: &Reservation) -> AppResult<BudgetLedger> {
        let today = Self::today();
        let (amount, reserved_on) = (reservation.amount, reservation.reserved_on);
        let ledger = self
            .repo
            .modify(&self.name, &|l: &mut BudgetLedger| {
                l.release(amount, reserved_on, today)
            })
            .await?;
        debug!("Budget '{}' released {}", self.name, amount);
        Ok(ledger)
    }

    /// Add `cost` to both running totals
    #[instrument(skip(self))]
    pub async fn add_spend(&self, cost: Decimal) -> AppResult<BudgetLedger> {
        let today = Self::today();
        self.repo
            .modify(&self.name, &|l: &mut BudgetLedger| l.add_spend(cost, today))
            .await
    }

    /// Current state after applying any pending reset
    pub async fn snapshot(&self) -> AppResult<BudgetLedger> {
        let today = Self::today();
        self.repo
            .modify(&self.name, &|l: &mut BudgetLedger| -> AppResult<()> {
                l.roll_over(today);
                Ok(())
            })
            .await
    }

    pub async fn daily_remaining(&self) -> AppResult<Remaining> {
        Ok(self.snapshot().await?.daily_remaining())
    }

    pub async fn monthly_remaining(&self) -> AppResult<Remaining> {
        Ok(self.snapshot().await?.monthly_remaining())
    }

    /// Replace both limits; zero means unlimited
    #[instrument(skip(self))]
    pub async fn set_limits(&self, daily_limit: Decimal, monthly_limit: Decimal) -> AppResult<BudgetLedger> {
        let today = Self::today();
        let ledger = self
            .repo
            .modify(&self.name, &|l: &mut BudgetLedger| {
                l.roll_over(today);
                l.set_limits(daily_limit, monthly_limit)
            })
            .await?;

        info!(
            "Budget '{}' limits set: daily {}, monthly {}",
            self.name, daily_limit, monthly_limit
        );
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialer_core::models::DEFAULT_LEDGER_NAME;
    use dialer_core::traits::LedgerOp;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    /// Single-ledger repository guarded by one mutex
    struct MockBudgetRepository {
        ledger: Mutex<Option<BudgetLedger>>,
    }

    impl MockBudgetRepository {
        fn new() -> Self {
            Self {
                ledger: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl BudgetRepository for MockBudgetRepository {
        async fn ensure(&self, ledger: &BudgetLedger) -> AppResult<BudgetLedger> {
            let mut slot = self.ledger.lock();
            Ok(slot.get_or_insert_with(|| ledger.clone()).clone())
        }

        async fn get(&self, _name: &str) -> AppResult<Option<BudgetLedger>> {
            Ok(self.ledger.lock().clone())
        }

        async fn modify(&self, _name: &str, op: LedgerOp<'_>) -> AppResult<BudgetLedger> {
            let mut slot = self.ledger.lock();
            let stored = slot
                .as_mut()
                .ok_or_else(|| AppError::Internal("no ledger".into()))?;
            let mut ledger = stored.clone();
            op(&mut ledger)?;
            *stored = ledger.clone();
            Ok(ledger)
        }
    }

    async fn service(daily: Decimal, monthly: Decimal) -> BudgetLedgerService {
        BudgetLedgerService::open(
            Arc::new(MockBudgetRepository::new()),
            DEFAULT_LEDGER_NAME,
            daily,
            monthly,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_unlimited_budget() {
        let svc = service(Decimal::ZERO, Decimal::ZERO).await;
        svc.add_spend(dec!(500)).await.unwrap();
        assert!(svc.can_afford(dec!(1000)).await.unwrap());
        assert_eq!(svc.daily_remaining().await.unwrap(), Remaining::Unlimited);
    }

    #[tokio::test]
    async fn test_boundary_at_95_cents() {
        let svc = service(dec!(1.00), Decimal::ZERO).await;
        svc.add_spend(dec!(0.95)).await.unwrap();

        assert!(svc.can_afford(dec!(0.04)).await.unwrap());
        assert!(!svc.can_afford(dec!(0.06)).await.unwrap());
    }

    #[tokio::test]
    async fn test_reserve_reports_remaining() {
        let svc = service(dec!(0.01), Decimal::ZERO).await;
        svc.add_spend(dec!(0.01)).await.unwrap();

        let err = svc.reserve(dec!(0.013)).await.unwrap_err();
        match err {
            AppError::BudgetExceeded {
                estimated,
                daily_remaining,
                monthly_remaining,
            } => {
                assert_eq!(estimated, "0.013");
                assert_eq!(daily_remaining, "0");
                assert_eq!(monthly_remaining, "unlimited");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(svc.snapshot().await.unwrap().current_daily_spend(), dec!(0.01));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_stay_under_cap() {
        let svc = Arc::new(service(dec!(0.02), Decimal::ZERO).await);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move { svc.reserve(dec!(0.013)).await.is_ok() }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 1);
        assert_eq!(svc.snapshot().await.unwrap().current_daily_spend(), dec!(0.013));
    }

    #[tokio::test]
    async fn test_release_refunds_reservation() {
        let svc = service(dec!(0.02), Decimal::ZERO).await;
        let reservation = svc.reserve(dec!(0.013)).await.unwrap();
        assert!(!svc.can_afford(dec!(0.013)).await.unwrap());

        svc.release(&reservation).await.unwrap();
        assert_eq!(svc.snapshot().await.unwrap().current_daily_spend(), Decimal::ZERO);
        assert!(svc.can_afford(dec!(0.013)).await.unwrap());
    }

    #[tokio::test]
    async fn test_existing_limits_survive_reopen() {
        let repo = Arc::new(MockBudgetRepository::new());
        let first = BudgetLedgerService::open(repo.clone(), "default", dec!(5), dec!(50))
            .await
            .unwrap();
        first.set_limits(dec!(7), dec!(70)).await.unwrap();

        let second = BudgetLedgerService::open(repo, "default", dec!(5), dec!(50))
            .await
            .unwrap();
        let snapshot = second.snapshot().await.unwrap();
        assert_eq!(snapshot.daily_limit(), dec!(7));
        assert_eq!(snapshot.monthly_limit(), dec!(70));
    }

    #[tokio::test]
    async fn test_negative_limits_rejected() {
        let svc = service(dec!(1), dec!(1)).await;
        assert!(svc.set_limits(dec!(-1), dec!(1)).await.is_err());
        assert_eq!(svc.snapshot().await.unwrap().daily_limit(), dec!(1));
    }
}
