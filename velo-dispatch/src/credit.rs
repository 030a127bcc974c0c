use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use velo_core::models::{CashSubmission, Driver, SubmissionStatus};
use velo_core::repository::{CashSubmissionRepository, DriverRepository};

/// Result of evaluating a driver's cash position against their limit
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct CreditEvaluation {
    pub exceeded: bool,
    /// New work: blocked on the raw balance alone.
    pub can_accept_orders: bool,
    /// In-flight work: allowed while either the raw or the effective
    /// balance is within the limit.
    pub can_update_orders: bool,
    /// Balance minus cash submissions still awaiting approval.
    pub effective_cash_at_hand: Decimal,
}

impl CreditEvaluation {
    /// The verdict when the driver or their submissions cannot be read.
    pub fn fail_closed() -> Self {
        Self {
            exceeded: true,
            can_accept_orders: false,
            can_update_orders: false,
            effective_cash_at_hand: Decimal::ZERO,
        }
    }
}

fn over_limit(balance: Decimal, credit_limit: Decimal) -> bool {
    if credit_limit > Decimal::ZERO {
        balance > credit_limit
    } else {
        // no configured limit: any positive balance blocks
        balance > Decimal::ZERO
    }
}

/// Pure evaluation over an already-loaded driver and their submissions.
pub fn evaluate(driver: &Driver, submissions: &[CashSubmission]) -> CreditEvaluation {
    let pending_total: Decimal = submissions
        .iter()
        .filter(|s| s.status == SubmissionStatus::Pending)
        .map(|s| s.amount)
        .sum();
    let effective = driver.cash_at_hand - pending_total;
    let exceeded = over_limit(driver.cash_at_hand, driver.credit_limit);
    CreditEvaluation {
        exceeded,
        can_accept_orders: !exceeded,
        can_update_orders: !exceeded || !over_limit(effective, driver.credit_limit),
        effective_cash_at_hand: effective,
    }
}

/// Loads driver state and answers whether they may take or progress
/// work. Lookup failures deny rather than allow.
pub struct CreditGate {
    drivers: Arc<dyn DriverRepository>,
    submissions: Arc<dyn CashSubmissionRepository>,
}

impl CreditGate {
    pub fn new(
        drivers: Arc<dyn DriverRepository>,
        submissions: Arc<dyn CashSubmissionRepository>,
    ) -> Self {
        Self {
            drivers,
            submissions,
        }
    }

    pub async fn check(&self, driver_id: Uuid) -> CreditEvaluation {
        match self.load(driver_id).await {
            Ok(evaluation) => evaluation,
            Err(err) => {
                tracing::warn!(%driver_id, error = %err, "credit check failed, denying");
                CreditEvaluation::fail_closed()
            }
        }
    }

    /// Variant for callers that already hold the driver record.
    pub async fn check_driver(&self, driver: &Driver) -> CreditEvaluation {
        match self.submissions.list_pending_submissions(driver.id).await {
            Ok(pending) => evaluate(driver, &pending),
            Err(err) => {
                tracing::warn!(driver_id = %driver.id, error = %err, "credit check failed, denying");
                CreditEvaluation::fail_closed()
            }
        }
    }

    async fn load(
        &self,
        driver_id: Uuid,
    ) -> Result<CreditEvaluation, Box<dyn std::error::Error + Send + Sync>> {
        let driver = self
            .drivers
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| format!("driver {driver_id} not found"))?;
        let pending = self.submissions.list_pending_submissions(driver_id).await?;
        Ok(evaluate(&driver, &pending))
    }
}
