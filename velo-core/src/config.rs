use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How driver pay is derived from the delivery fee
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverPayMode {
    Flat,
    Percentage,
}

/// Settlement rules resolved once at startup and passed explicitly into
/// every ledger run, so a single request never sees two rule sets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementConfig {
    pub driver_pay_enabled: bool,
    pub driver_pay_mode: DriverPayMode,
    /// Flat amount per delivery when mode is `flat`.
    pub driver_pay_amount: Decimal,
    /// Share of the delivery fee (0..=100) when mode is `percentage`.
    pub driver_pay_percentage: Decimal,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            driver_pay_enabled: true,
            driver_pay_mode: DriverPayMode::Percentage,
            driver_pay_amount: Decimal::ZERO,
            driver_pay_percentage: Decimal::new(30, 0),
        }
    }
}

impl SettlementConfig {
    /// Driver pay for one delivery, clamped to `0..=delivery_fee` so the
    /// merchant share can never go negative.
    pub fn driver_pay_for(&self, delivery_fee: Decimal) -> Decimal {
        if !self.driver_pay_enabled || delivery_fee <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let raw = match self.driver_pay_mode {
            DriverPayMode::Flat => self.driver_pay_amount,
            DriverPayMode::Percentage => {
                delivery_fee * self.driver_pay_percentage / Decimal::ONE_HUNDRED
            }
        };
        raw.clamp(Decimal::ZERO, delivery_fee)
    }

    /// What remains of the delivery fee after driver pay.
    pub fn merchant_share_for(&self, delivery_fee: Decimal) -> Decimal {
        if delivery_fee <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        delivery_fee - self.driver_pay_for(delivery_fee)
    }
}
