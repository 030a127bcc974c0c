use async_trait::async_trait;
use rust_decimal::Decimal;

use velo_core::models::Order;

/// Downstream stock adjustment, invoked once per completed order.
/// Failures are logged by the caller and never roll back the completion.
#[async_trait]
pub trait InventoryHook: Send + Sync {
    async fn order_completed(
        &self,
        order: &Order,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Default hook: records the decrement intent and succeeds.
pub struct LoggingInventoryHook;

#[async_trait]
impl InventoryHook for LoggingInventoryHook {
    async fn order_completed(
        &self,
        order: &Order,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for item in &order.items {
            tracing::info!(
                order_id = %order.id,
                item = %item.name,
                quantity = item.quantity,
                "inventory decrement"
            );
        }
        Ok(())
    }
}

/// Resolves a street address to coordinates when the branch snapshot
/// has none. `Ok(None)` means the address could not be resolved.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(
        &self,
        address: &str,
    ) -> Result<Option<(f64, f64)>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Geocoder used when no provider is configured; never resolves.
pub struct NullGeocoder;

#[async_trait]
impl Geocoder for NullGeocoder {
    async fn geocode(
        &self,
        _address: &str,
    ) -> Result<Option<(f64, f64)>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(None)
    }
}

/// The money split settlement works from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinancialBreakdown {
    pub items_total: Decimal,
    pub delivery_fee: Decimal,
    pub tip_amount: Decimal,
}

impl FinancialBreakdown {
    /// Cash a pay-on-delivery driver owes: the collected total minus the
    /// tip they keep and the pay they earned.
    pub fn cash_owed(&self, total_amount: Decimal, driver_pay: Decimal) -> Decimal {
        (total_amount - self.tip_amount - driver_pay).max(Decimal::ZERO)
    }
}

/// Source of the per-order money split. The default derives it from the
/// order's own fields; deployments with an invoicing service substitute
/// their own provider.
#[async_trait]
pub trait BreakdownProvider: Send + Sync {
    async fn breakdown(
        &self,
        order: &Order,
    ) -> Result<FinancialBreakdown, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct OrderFieldsBreakdown;

#[async_trait]
impl BreakdownProvider for OrderFieldsBreakdown {
    async fn breakdown(
        &self,
        order: &Order,
    ) -> Result<FinancialBreakdown, Box<dyn std::error::Error + Send + Sync>> {
        Ok(FinancialBreakdown {
            items_total: order.items_total(),
            delivery_fee: order.delivery_fee,
            tip_amount: order.tip_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;
    use velo_core::models::{Branch, NewOrder, OrderItem, PaymentType};

    #[tokio::test]
    async fn breakdown_reads_order_fields() {
        let order = Order::new(NewOrder {
            customer_id: "cust-1".to_string(),
            branch: Branch {
                id: Uuid::new_v4(),
                name: "East".to_string(),
                address: "5 Olaya St".to_string(),
                latitude: None,
                longitude: None,
            },
            items: vec![OrderItem::new("Combo".to_string(), 1, dec!(500.00))],
            payment_type: PaymentType::PayOnDelivery,
            delivery_fee: dec!(200.00),
            tip_amount: dec!(10.00),
            total_amount: None,
        });
        let split = OrderFieldsBreakdown.breakdown(&order).await.unwrap();
        assert_eq!(split.items_total, dec!(500.00));
        assert_eq!(split.delivery_fee, dec!(200.00));
        assert_eq!(split.tip_amount, dec!(10.00));
        assert_eq!(split.cash_owed(order.total_amount, dec!(60.00)), dec!(640.00));
    }

    #[test]
    fn cash_owed_never_goes_negative() {
        let split = FinancialBreakdown {
            items_total: Decimal::ZERO,
            delivery_fee: dec!(50.00),
            tip_amount: dec!(40.00),
        };
        assert_eq!(split.cash_owed(dec!(50.00), dec!(60.00)), Decimal::ZERO);
    }
}
