use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use velo_core::config::SettlementConfig;
use velo_core::error::{DispatchError, DispatchResult};
use velo_core::events::{self, OutboxEvent};
use velo_core::models::{
    DriverStatus, Order, OrderStatus, PartyTag, PaymentStatus, PaymentType, Transaction,
    TransactionParty, TransactionStatus, TransactionType, HOLD_DRIVER_ID,
};
use velo_core::repository::{
    DriverRepository, OrderRepository, OutboxRepository, TransactionRepository,
};

use crate::assignment::AssignmentSelector;
use crate::credit::CreditGate;
use crate::hooks::InventoryHook;
use crate::locks::OrderLocks;
use crate::settlement::{SettlementLedger, SettlementTrigger};

/// Who is asking for a transition. Driver actors go through the credit
/// gate and the cancellation fail-safe; admins do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Driver(Uuid),
    Admin,
}

/// A committed transition plus any non-fatal settlement warning. The
/// warning never implies the transition failed.
#[derive(Debug)]
pub struct TransitionResult {
    pub order: Order,
    pub settlement_warning: Option<String>,
}

/// Owns the order lifecycle: driver responses, forward transitions, the
/// cancellation flow and payment confirmation, each one a single
/// critical section per order.
pub struct OrderLifecycle {
    orders: Arc<dyn OrderRepository>,
    drivers: Arc<dyn DriverRepository>,
    transactions: Arc<dyn TransactionRepository>,
    outbox: Arc<dyn OutboxRepository>,
    gate: Arc<CreditGate>,
    selector: Arc<AssignmentSelector>,
    ledger: Arc<SettlementLedger>,
    inventory: Arc<dyn InventoryHook>,
    locks: Arc<OrderLocks>,
    settlement_config: SettlementConfig,
}

impl OrderLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        drivers: Arc<dyn DriverRepository>,
        transactions: Arc<dyn TransactionRepository>,
        outbox: Arc<dyn OutboxRepository>,
        gate: Arc<CreditGate>,
        selector: Arc<AssignmentSelector>,
        ledger: Arc<SettlementLedger>,
        inventory: Arc<dyn InventoryHook>,
        locks: Arc<OrderLocks>,
        settlement_config: SettlementConfig,
    ) -> Self {
        Self {
            orders,
            drivers,
            transactions,
            outbox,
            gate,
            selector,
            ledger,
            inventory,
            locks,
            settlement_config,
        }
    }

    pub fn settlement_config(&self) -> &SettlementConfig {
        &self.settlement_config
    }

    /// Driver takes the order: sets the acceptance flag and advances
    /// `pending → confirmed` in one step.
    pub async fn accept_order(&self, order_id: Uuid, driver_id: Uuid) -> DispatchResult<Order> {
        let guard = self.locks.acquire(order_id).await;
        let mut order = self.load(order_id).await?;
        self.ensure_assigned(&order, driver_id)?;
        self.ensure_no_pending_cancellation(driver_id).await?;
        if !self.gate.check(driver_id).await.can_accept_orders {
            return Err(DispatchError::CreditLimitExceeded(driver_id));
        }
        if order.status != OrderStatus::Pending {
            return Err(DispatchError::invalid_transition(
                order.status,
                OrderStatus::Confirmed,
            ));
        }

        order.driver_accepted = Some(true);
        order.status = OrderStatus::Confirmed;
        order.touch();
        self.orders
            .save_order(&order)
            .await
            .map_err(DispatchError::storage)?;
        drop(guard);

        self.mark_driver_on_delivery(driver_id).await;
        self.emit(OutboxEvent::driver_response(&order, driver_id, true))
            .await;
        self.emit(OutboxEvent::order_snapshot(
            events::ORDER_STATUS_UPDATED,
            &order,
        ))
        .await;
        tracing::info!(%order_id, %driver_id, "order accepted");
        Ok(order)
    }

    /// Driver declines the order: clears the assignment and returns the
    /// order to the pool, status unchanged.
    pub async fn reject_order(&self, order_id: Uuid, driver_id: Uuid) -> DispatchResult<Order> {
        let guard = self.locks.acquire(order_id).await;
        let mut order = self.load(order_id).await?;
        self.ensure_assigned(&order, driver_id)?;
        if order.status != OrderStatus::Pending {
            return Err(DispatchError::invalid_transition(
                order.status,
                OrderStatus::Pending,
            ));
        }

        order.driver_id = None;
        order.driver_accepted = Some(false);
        order.touch();
        self.orders
            .save_order(&order)
            .await
            .map_err(DispatchError::storage)?;
        drop(guard);

        self.selector.release_if_idle(driver_id).await;
        self.emit(OutboxEvent::driver_response(&order, driver_id, false))
            .await;
        tracing::info!(%order_id, %driver_id, "order rejected");
        Ok(order)
    }

    /// Moves the order one step forward along the flow, or to
    /// `cancelled` for admin actors. Status is committed before any side
    /// effect runs; settlement problems come back as a warning only.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: Actor,
    ) -> DispatchResult<TransitionResult> {
        let guard = self.locks.acquire(order_id).await;
        let mut order = self.load(order_id).await?;

        if let Actor::Driver(driver_id) = actor {
            self.ensure_assigned(&order, driver_id)?;
            self.ensure_no_pending_cancellation(driver_id).await?;
            if !self.gate.check(driver_id).await.can_update_orders {
                return Err(DispatchError::CreditLimitExceeded(driver_id));
            }
        }

        let from = order.status;
        let landed = plan_transition(&order, target, actor == Actor::Admin)?;
        order.status = landed;
        order.touch();
        self.orders
            .save_order(&order)
            .await
            .map_err(DispatchError::storage)?;
        drop(guard);
        tracing::info!(%order_id, from = %from, to = %landed, requested = %target, "order status updated");

        let settlement_warning = match landed {
            OrderStatus::Completed => self.completed_side_effects(&order).await,
            OrderStatus::Cancelled => {
                if let Some(driver_id) = order.driver_id {
                    self.selector.release_if_idle(driver_id).await;
                }
                None
            }
            _ => None,
        };
        self.emit(OutboxEvent::order_snapshot(
            events::ORDER_STATUS_UPDATED,
            &order,
        ))
        .await;

        let order = self.reload(order_id).await.unwrap_or(order);
        Ok(TransitionResult {
            order,
            settlement_warning,
        })
    }

    /// Driver asks to cancel: the order moves to `cancelled` immediately
    /// but stays reversible until an admin decides.
    pub async fn request_cancellation(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> DispatchResult<Order> {
        let guard = self.locks.acquire(order_id).await;
        let mut order = self.load(order_id).await?;
        self.ensure_assigned(&order, driver_id)?;
        if matches!(
            order.status,
            OrderStatus::Cancelled | OrderStatus::Completed | OrderStatus::Delivered
        ) {
            return Err(DispatchError::invalid_transition(
                order.status,
                OrderStatus::Cancelled,
            ));
        }
        if order.has_pending_cancellation() {
            return Err(DispatchError::CancellationPending(format!(
                "order {order_id} already has an undecided cancellation request"
            )));
        }

        order.cancellation_requested = Some(true);
        order.cancellation_approved = None;
        order.status_before_cancellation = Some(order.status);
        order.status = OrderStatus::Cancelled;
        order.touch();
        self.orders
            .save_order(&order)
            .await
            .map_err(DispatchError::storage)?;
        drop(guard);

        self.selector.release_if_idle(driver_id).await;
        self.emit(OutboxEvent::order_snapshot(
            events::ORDER_STATUS_UPDATED,
            &order,
        ))
        .await;
        tracing::info!(%order_id, %driver_id, "cancellation requested");
        Ok(order)
    }

    /// Admin resolves a pending cancellation. Denial restores the status
    /// the order held when the request was made.
    pub async fn decide_cancellation(
        &self,
        order_id: Uuid,
        approve: bool,
    ) -> DispatchResult<Order> {
        let guard = self.locks.acquire(order_id).await;
        let mut order = self.load(order_id).await?;
        if !order.has_pending_cancellation() {
            return Err(DispatchError::Validation(format!(
                "order {order_id} has no cancellation awaiting a decision"
            )));
        }

        if approve {
            order.cancellation_approved = Some(true);
        } else {
            order.cancellation_approved = Some(false);
            let restored = order.status_before_cancellation.take().unwrap_or({
                if order.driver_accepted == Some(true) {
                    OrderStatus::Confirmed
                } else {
                    OrderStatus::Pending
                }
            });
            order.status = restored;
        }
        order.touch();
        self.orders
            .save_order(&order)
            .await
            .map_err(DispatchError::storage)?;
        drop(guard);

        if approve {
            if let Some(driver_id) = order.driver_id {
                self.selector.release_if_idle(driver_id).await;
            }
        } else if let Some(driver_id) = order.driver_id {
            // the order is live again, so its driver is carrying it
            if order.driver_accepted == Some(true) {
                self.mark_driver_on_delivery(driver_id).await;
            }
        }
        self.emit(OutboxEvent::order_snapshot(
            events::ORDER_STATUS_UPDATED,
            &order,
        ))
        .await;
        tracing::info!(%order_id, approve, "cancellation decided");
        Ok(order)
    }

    /// Payment gateway confirmed the charge. Marks the order paid,
    /// completes the live payment row, and runs the settlement stage the
    /// order's position calls for. Safe under duplicate delivery.
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        reference: Option<String>,
        tip_amount: Option<Decimal>,
    ) -> DispatchResult<TransitionResult> {
        let guard = self.locks.acquire(order_id).await;
        let mut order = self.load(order_id).await?;

        if let Some(tip) = tip_amount {
            if !order.tip_credited && tip >= Decimal::ZERO {
                order.tip_amount = tip;
            }
        }
        let newly_paid = order.payment_status != PaymentStatus::Paid;
        order.payment_status = PaymentStatus::Paid;
        self.complete_payment_row(&order, reference)
            .await
            .map_err(DispatchError::storage)?;

        let collapsed = order.status == OrderStatus::Delivered;
        if collapsed {
            // delivered + paid collapses to completed
            order.status = OrderStatus::Completed;
        }
        order.touch();
        self.orders
            .save_order(&order)
            .await
            .map_err(DispatchError::storage)?;
        drop(guard);

        let settlement_warning = if collapsed {
            self.completed_side_effects(&order).await
        } else {
            match order.status {
                OrderStatus::Completed => {
                    self.ledger
                        .run(
                            order.id,
                            &self.settlement_config,
                            SettlementTrigger::OrderCompleted,
                        )
                        .await
                        .warning()
                }
                OrderStatus::OutForDelivery => {
                    self.ledger
                        .run(
                            order.id,
                            &self.settlement_config,
                            SettlementTrigger::PaymentConfirmed,
                        )
                        .await
                        .warning()
                }
                _ => None,
            }
        };

        if newly_paid {
            self.emit(OutboxEvent::order_snapshot(
                events::PAYMENT_CONFIRMED,
                &order,
            ))
            .await;
        }
        if collapsed {
            self.emit(OutboxEvent::order_snapshot(
                events::ORDER_STATUS_UPDATED,
                &order,
            ))
            .await;
        }
        tracing::info!(%order_id, newly_paid, collapsed, "payment confirmed");

        let order = self.reload(order_id).await.unwrap_or(order);
        Ok(TransitionResult {
            order,
            settlement_warning,
        })
    }

    /// Payment gateway reported a failed charge. Ignored once the order
    /// has already been confirmed paid.
    pub async fn payment_failed(
        &self,
        order_id: Uuid,
        reference: Option<String>,
    ) -> DispatchResult<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(order_id).await?;
        if order.payment_status == PaymentStatus::Paid {
            tracing::warn!(%order_id, ?reference, "payment failure reported after confirmation, ignoring");
            return Ok(order);
        }

        order.payment_status = PaymentStatus::Unpaid;
        let rows = self
            .transactions
            .list_live_transactions(order.id, TransactionType::Payment, PartyTag::Merchant, None)
            .await
            .map_err(DispatchError::storage)?;
        for mut row in rows {
            row.mark_cancelled();
            self.transactions
                .save_transaction(&row)
                .await
                .map_err(DispatchError::storage)?;
        }
        order.touch();
        self.orders
            .save_order(&order)
            .await
            .map_err(DispatchError::storage)?;
        tracing::info!(%order_id, ?reference, "payment marked failed");
        Ok(order)
    }

    async fn completed_side_effects(&self, order: &Order) -> Option<String> {
        if let Err(err) = self.inventory.order_completed(order).await {
            tracing::warn!(order_id = %order.id, error = %err, "inventory hook failed");
        }
        let outcome = self
            .ledger
            .run(
                order.id,
                &self.settlement_config,
                SettlementTrigger::OrderCompleted,
            )
            .await;
        if let Some(driver_id) = order.driver_id {
            self.selector.release_if_idle(driver_id).await;
        }
        outcome.warning()
    }

    /// Keeps exactly one live payment row for the order and completes it.
    async fn complete_payment_row(
        &self,
        order: &Order,
        reference: Option<String>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let rows = self
            .transactions
            .list_live_transactions(order.id, TransactionType::Payment, PartyTag::Merchant, None)
            .await?;
        let mut iter = rows.into_iter();
        match iter.next() {
            Some(mut row) => {
                for mut extra in iter {
                    extra.mark_cancelled();
                    self.transactions.save_transaction(&extra).await?;
                }
                if row.status != TransactionStatus::Completed {
                    row.amount = order.total_amount;
                    row.notes = reference;
                    row.mark_completed(payment_receipt());
                    self.transactions.save_transaction(&row).await?;
                }
            }
            None => {
                let mut row = Transaction::new(
                    order.id,
                    TransactionType::Payment,
                    TransactionParty::Merchant,
                    order.total_amount,
                );
                row.notes = reference;
                row.mark_completed(payment_receipt());
                self.transactions.create_transaction(&row).await?;
            }
        }
        Ok(())
    }

    async fn mark_driver_on_delivery(&self, driver_id: Uuid) {
        if driver_id == HOLD_DRIVER_ID {
            return;
        }
        match self.drivers.get_driver(driver_id).await {
            Ok(Some(mut driver)) => {
                driver.status = DriverStatus::OnDelivery;
                driver.last_activity_at = Utc::now();
                if let Err(err) = self.drivers.save_driver(&driver).await {
                    tracing::warn!(%driver_id, error = %err, "driver status save failed");
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%driver_id, error = %err, "driver load failed");
            }
        }
    }

    fn ensure_assigned(&self, order: &Order, driver_id: Uuid) -> DispatchResult<()> {
        if order.driver_id != Some(driver_id) {
            return Err(DispatchError::NotAuthorized(format!(
                "driver {driver_id} is not assigned to order {}",
                order.id
            )));
        }
        Ok(())
    }

    /// One undecided cancellation anywhere blocks the driver everywhere.
    async fn ensure_no_pending_cancellation(&self, driver_id: Uuid) -> DispatchResult<()> {
        let blocked = self
            .orders
            .any_pending_cancellation(driver_id)
            .await
            .map_err(DispatchError::storage)?;
        if blocked {
            return Err(DispatchError::CancellationPending(format!(
                "driver {driver_id} has a cancellation request awaiting review"
            )));
        }
        Ok(())
    }

    async fn load(&self, order_id: Uuid) -> DispatchResult<Order> {
        self.orders
            .get_order(order_id)
            .await
            .map_err(DispatchError::storage)?
            .ok_or(DispatchError::OrderNotFound(order_id))
    }

    async fn reload(&self, order_id: Uuid) -> Option<Order> {
        self.orders.get_order(order_id).await.ok().flatten()
    }

    async fn emit(&self, event: OutboxEvent) {
        if let Err(err) = self.outbox.append_event(&event).await {
            tracing::warn!(event = %event.name, order_id = %event.order_id, error = %err, "failed to record event");
        }
    }
}

fn payment_receipt() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("PAY-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Validates a requested transition and returns the status the order
/// actually lands on (the delivered-and-paid collapse included).
fn plan_transition(order: &Order, target: OrderStatus, is_admin: bool) -> DispatchResult<OrderStatus> {
    let current = order.status;
    if current.is_terminal() {
        return Err(DispatchError::invalid_transition(current, target));
    }
    if target == OrderStatus::Cancelled {
        if is_admin {
            return Ok(OrderStatus::Cancelled);
        }
        // drivers cancel through the request/approve flow only
        return Err(DispatchError::invalid_transition(current, target));
    }
    match current.next_in_flow() {
        Some(next) if next == target => {
            if target == OrderStatus::Delivered {
                if order.payment_type == PaymentType::PayOnDelivery
                    && order.payment_status != PaymentStatus::Paid
                {
                    return Err(DispatchError::PaymentRequired(order.id));
                }
                if order.payment_status == PaymentStatus::Paid {
                    return Ok(OrderStatus::Completed);
                }
            }
            Ok(target)
        }
        _ => Err(DispatchError::invalid_transition(current, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use velo_core::config::DriverPayMode;
    use velo_core::models::{Branch, Driver, NewOrder, OrderItem};
    use velo_core::repository::WalletRepository;
    use velo_store::MemoryStore;

    struct CountingInventory(AtomicUsize);

    #[async_trait]
    impl InventoryHook for CountingInventory {
        async fn order_completed(
            &self,
            _order: &Order,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingInventory;

    #[async_trait]
    impl InventoryHook for FailingInventory {
        async fn order_completed(
            &self,
            _order: &Order,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("stock service down".into())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        lifecycle: Arc<OrderLifecycle>,
        inventory_calls: Arc<CountingInventory>,
    }

    fn harness() -> Harness {
        harness_with(SettlementConfig {
            driver_pay_enabled: true,
            driver_pay_mode: DriverPayMode::Percentage,
            driver_pay_amount: Decimal::ZERO,
            driver_pay_percentage: dec!(30),
        })
    }

    fn harness_with(config: SettlementConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(OrderLocks::new());
        let gate = Arc::new(CreditGate::new(store.clone(), store.clone()));
        let selector = Arc::new(AssignmentSelector::new(
            store.clone(),
            store.clone(),
            store.clone(),
            gate.clone(),
            Arc::new(crate::hooks::NullGeocoder),
            locks.clone(),
        ));
        let ledger = Arc::new(SettlementLedger::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(crate::hooks::OrderFieldsBreakdown),
            locks.clone(),
        ));
        let inventory_calls = Arc::new(CountingInventory(AtomicUsize::new(0)));
        let lifecycle = Arc::new(OrderLifecycle::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            gate,
            selector,
            ledger,
            inventory_calls.clone(),
            locks,
            config,
        ));
        Harness {
            store,
            lifecycle,
            inventory_calls,
        }
    }

    async fn seed_driver(harness: &Harness) -> Driver {
        let driver = Driver::new("Khalid".to_string(), "0500000004".to_string());
        harness.store.create_driver(&driver).await.unwrap();
        driver
    }

    async fn seed_order(
        harness: &Harness,
        driver: &Driver,
        payment_type: PaymentType,
    ) -> Order {
        let mut order = Order::new(NewOrder {
            customer_id: "cust-7".to_string(),
            branch: Branch {
                id: Uuid::new_v4(),
                name: "West".to_string(),
                address: "9 Corniche Rd".to_string(),
                latitude: None,
                longitude: None,
            },
            items: vec![OrderItem::new("Mixed Grill".to_string(), 1, dec!(500.00))],
            payment_type,
            delivery_fee: dec!(200.00),
            tip_amount: dec!(10.00),
            total_amount: None,
        });
        order.driver_id = Some(driver.id);
        harness.store.create_order(&order).await.unwrap();
        order
    }

    fn events_named(events: &[OutboxEvent], name: &str) -> usize {
        events.iter().filter(|e| e.name == name).count()
    }

    #[tokio::test]
    async fn accept_confirms_order_and_marks_driver_busy() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;

        let accepted = h.lifecycle.accept_order(order.id, driver.id).await.unwrap();
        assert_eq!(accepted.status, OrderStatus::Confirmed);
        assert_eq!(accepted.driver_accepted, Some(true));

        let after = h.store.get_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(after.status, DriverStatus::OnDelivery);

        let events = h.store.list_unpublished_events(10).await.unwrap();
        assert_eq!(events_named(&events, events::DRIVER_ORDER_RESPONSE), 1);
        assert_eq!(events_named(&events, events::ORDER_STATUS_UPDATED), 1);
    }

    #[tokio::test]
    async fn only_the_assigned_driver_may_respond() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let stranger = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;

        let err = h
            .lifecycle
            .accept_order(order.id, stranger.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotAuthorized(_)));
        let err = h
            .lifecycle
            .reject_order(order.id, stranger.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn over_limit_driver_cannot_accept() {
        let h = harness();
        let mut driver = seed_driver(&h).await;
        driver.cash_at_hand = dec!(1500);
        driver.credit_limit = dec!(1000);
        h.store.save_driver(&driver).await.unwrap();
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;

        let err = h
            .lifecycle
            .accept_order(order.id, driver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::CreditLimitExceeded(_)));
        let untouched = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, OrderStatus::Pending);
        assert_eq!(untouched.driver_accepted, None);
    }

    #[tokio::test]
    async fn reject_returns_the_order_to_the_pool() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;

        let rejected = h.lifecycle.reject_order(order.id, driver.id).await.unwrap();
        assert_eq!(rejected.status, OrderStatus::Pending);
        assert_eq!(rejected.driver_id, None);
        assert_eq!(rejected.driver_accepted, Some(false));

        let events = h.store.list_unpublished_events(10).await.unwrap();
        assert_eq!(events_named(&events, events::DRIVER_ORDER_RESPONSE), 1);
    }

    #[tokio::test]
    async fn accept_and_reject_cannot_both_win() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;

        let accept = {
            let lifecycle = h.lifecycle.clone();
            let id = order.id;
            let driver_id = driver.id;
            tokio::spawn(async move { lifecycle.accept_order(id, driver_id).await })
        };
        let reject = {
            let lifecycle = h.lifecycle.clone();
            let id = order.id;
            let driver_id = driver.id;
            tokio::spawn(async move { lifecycle.reject_order(id, driver_id).await })
        };
        let (accept, reject) = (accept.await.unwrap(), reject.await.unwrap());
        assert!(
            accept.is_ok() ^ reject.is_ok(),
            "exactly one response must win: accept={accept:?} reject={reject:?}"
        );

        let settled = h.store.get_order(order.id).await.unwrap().unwrap();
        if accept.is_ok() {
            assert_eq!(settled.status, OrderStatus::Confirmed);
            assert_eq!(settled.driver_accepted, Some(true));
            assert_eq!(settled.driver_id, Some(driver.id));
        } else {
            assert_eq!(settled.driver_id, None);
            assert_eq!(settled.driver_accepted, Some(false));
        }
    }

    #[tokio::test]
    async fn flow_moves_one_step_at_a_time() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();

        // skipping a step is rejected
        let err = h
            .lifecycle
            .update_status(order.id, OrderStatus::Delivered, Actor::Driver(driver.id))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));

        let moved = h
            .lifecycle
            .update_status(
                order.id,
                OrderStatus::OutForDelivery,
                Actor::Driver(driver.id),
            )
            .await
            .unwrap();
        assert_eq!(moved.order.status, OrderStatus::OutForDelivery);

        // moving backwards is rejected
        let err = h
            .lifecycle
            .update_status(order.id, OrderStatus::Confirmed, Actor::Driver(driver.id))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unpaid_pay_on_delivery_cannot_be_delivered() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayOnDelivery).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();
        h.lifecycle
            .update_status(
                order.id,
                OrderStatus::OutForDelivery,
                Actor::Driver(driver.id),
            )
            .await
            .unwrap();

        let err = h
            .lifecycle
            .update_status(order.id, OrderStatus::Delivered, Actor::Driver(driver.id))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::PaymentRequired(_)));

        h.lifecycle
            .confirm_payment(order.id, Some("PAY-REF-77".to_string()), None)
            .await
            .unwrap();
        let landed = h
            .lifecycle
            .update_status(order.id, OrderStatus::Delivered, Actor::Driver(driver.id))
            .await
            .unwrap();
        // delivered + paid collapses straight to completed
        assert_eq!(landed.order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn unpaid_pay_now_order_lands_on_delivered() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();
        h.lifecycle
            .update_status(
                order.id,
                OrderStatus::OutForDelivery,
                Actor::Driver(driver.id),
            )
            .await
            .unwrap();

        let landed = h
            .lifecycle
            .update_status(order.id, OrderStatus::Delivered, Actor::Driver(driver.id))
            .await
            .unwrap();
        assert_eq!(landed.order.status, OrderStatus::Delivered);

        let finished = h
            .lifecycle
            .update_status(order.id, OrderStatus::Completed, Actor::Admin)
            .await
            .unwrap();
        assert_eq!(finished.order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn completion_settles_credits_and_releases_the_driver() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();
        h.lifecycle
            .confirm_payment(order.id, Some("PAY-REF-1".to_string()), None)
            .await
            .unwrap();
        h.lifecycle
            .update_status(
                order.id,
                OrderStatus::OutForDelivery,
                Actor::Driver(driver.id),
            )
            .await
            .unwrap();
        let landed = h
            .lifecycle
            .update_status(order.id, OrderStatus::Delivered, Actor::Driver(driver.id))
            .await
            .unwrap();
        assert_eq!(landed.order.status, OrderStatus::Completed);
        assert!(landed.settlement_warning.is_none());

        let wallet = h
            .store
            .get_wallet_for_driver(driver.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wallet.total_delivery_pay, dec!(60));
        assert_eq!(wallet.total_tips_received, dec!(10));

        let released = h.store.get_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(released.status, DriverStatus::Active);
        assert_eq!(h.inventory_calls.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inventory_failure_does_not_block_completion() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();
        h.lifecycle.confirm_payment(order.id, None, None).await.unwrap();
        h.lifecycle
            .update_status(
                order.id,
                OrderStatus::OutForDelivery,
                Actor::Driver(driver.id),
            )
            .await
            .unwrap();

        // swap in a failing hook for the final step
        let failing = OrderLifecycle::new(
            h.store.clone(),
            h.store.clone(),
            h.store.clone(),
            h.store.clone(),
            Arc::new(CreditGate::new(h.store.clone(), h.store.clone())),
            Arc::new(AssignmentSelector::new(
                h.store.clone(),
                h.store.clone(),
                h.store.clone(),
                Arc::new(CreditGate::new(h.store.clone(), h.store.clone())),
                Arc::new(crate::hooks::NullGeocoder),
                Arc::new(OrderLocks::new()),
            )),
            Arc::new(SettlementLedger::new(
                h.store.clone(),
                h.store.clone(),
                h.store.clone(),
                h.store.clone(),
                Arc::new(crate::hooks::OrderFieldsBreakdown),
                Arc::new(OrderLocks::new()),
            )),
            Arc::new(FailingInventory),
            Arc::new(OrderLocks::new()),
            h.lifecycle.settlement_config().clone(),
        );
        let landed = failing
            .update_status(order.id, OrderStatus::Delivered, Actor::Driver(driver.id))
            .await
            .unwrap();
        assert_eq!(landed.order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn pending_cancellation_blocks_the_drivers_other_orders() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let first = seed_order(&h, &driver, PaymentType::PayNow).await;
        let second = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(first.id, driver.id).await.unwrap();
        h.lifecycle.accept_order(second.id, driver.id).await.unwrap();

        h.lifecycle
            .request_cancellation(first.id, driver.id)
            .await
            .unwrap();

        let err = h
            .lifecycle
            .update_status(
                second.id,
                OrderStatus::OutForDelivery,
                Actor::Driver(driver.id),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::CancellationPending(_)));

        // an admin decision lifts the block
        h.lifecycle.decide_cancellation(first.id, true).await.unwrap();
        let moved = h
            .lifecycle
            .update_status(
                second.id,
                OrderStatus::OutForDelivery,
                Actor::Driver(driver.id),
            )
            .await
            .unwrap();
        assert_eq!(moved.order.status, OrderStatus::OutForDelivery);
    }

    #[tokio::test]
    async fn cancellation_request_rules() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();

        let parked = h
            .lifecycle
            .request_cancellation(order.id, driver.id)
            .await
            .unwrap();
        assert_eq!(parked.status, OrderStatus::Cancelled);
        assert_eq!(parked.cancellation_requested, Some(true));
        assert_eq!(parked.status_before_cancellation, Some(OrderStatus::Confirmed));

        let err = h
            .lifecycle
            .request_cancellation(order.id, driver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::CancellationPending(_)));
    }

    #[tokio::test]
    async fn cancellation_cannot_start_after_delivery() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let mut order = seed_order(&h, &driver, PaymentType::PayNow).await;
        order.status = OrderStatus::Delivered;
        h.store.save_order(&order).await.unwrap();

        let err = h
            .lifecycle
            .request_cancellation(order.id, driver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn denied_cancellation_restores_the_prior_status() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();
        h.lifecycle
            .update_status(
                order.id,
                OrderStatus::OutForDelivery,
                Actor::Driver(driver.id),
            )
            .await
            .unwrap();
        h.lifecycle
            .request_cancellation(order.id, driver.id)
            .await
            .unwrap();

        let restored = h
            .lifecycle
            .decide_cancellation(order.id, false)
            .await
            .unwrap();
        assert_eq!(restored.status, OrderStatus::OutForDelivery);
        assert_eq!(restored.cancellation_approved, Some(false));
        assert!(!restored.has_pending_cancellation());

        let busy = h.store.get_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(busy.status, DriverStatus::OnDelivery);
    }

    #[tokio::test]
    async fn approved_cancellation_stays_cancelled_and_frees_the_driver() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();
        h.lifecycle
            .request_cancellation(order.id, driver.id)
            .await
            .unwrap();

        let decided = h
            .lifecycle
            .decide_cancellation(order.id, true)
            .await
            .unwrap();
        assert_eq!(decided.status, OrderStatus::Cancelled);
        assert_eq!(decided.cancellation_approved, Some(true));

        let freed = h.store.get_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(freed.status, DriverStatus::Active);

        let err = h
            .lifecycle
            .decide_cancellation(order.id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[tokio::test]
    async fn admin_may_cancel_directly_but_drivers_may_not() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();

        let err = h
            .lifecycle
            .update_status(order.id, OrderStatus::Cancelled, Actor::Driver(driver.id))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));

        let cancelled = h
            .lifecycle
            .update_status(order.id, OrderStatus::Cancelled, Actor::Admin)
            .await
            .unwrap();
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);

        // terminal orders accept nothing further
        let err = h
            .lifecycle
            .update_status(order.id, OrderStatus::Confirmed, Actor::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn duplicate_payment_confirmations_credit_once() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;
        h.lifecycle.accept_order(order.id, driver.id).await.unwrap();
        h.lifecycle
            .update_status(
                order.id,
                OrderStatus::OutForDelivery,
                Actor::Driver(driver.id),
            )
            .await
            .unwrap();

        h.lifecycle
            .confirm_payment(order.id, Some("PAY-REF-9".to_string()), None)
            .await
            .unwrap();
        h.lifecycle
            .confirm_payment(order.id, Some("PAY-REF-9".to_string()), None)
            .await
            .unwrap();

        let wallet = h
            .store
            .get_wallet_for_driver(driver.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wallet.total_delivery_pay, dec!(60));
        assert_eq!(wallet.total_delivery_pay_count, 1);

        let rows = h
            .store
            .list_live_transactions(order.id, TransactionType::Payment, PartyTag::Merchant, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TransactionStatus::Completed);

        let events = h.store.list_unpublished_events(50).await.unwrap();
        assert_eq!(events_named(&events, events::PAYMENT_CONFIRMED), 1);
    }

    #[tokio::test]
    async fn payment_confirmation_on_a_delivered_order_completes_it() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let mut order = seed_order(&h, &driver, PaymentType::PayNow).await;
        order.status = OrderStatus::Delivered;
        order.driver_accepted = Some(true);
        h.store.save_order(&order).await.unwrap();

        let result = h
            .lifecycle
            .confirm_payment(order.id, Some("PAY-REF-3".to_string()), Some(dec!(15.00)))
            .await
            .unwrap();
        assert_eq!(result.order.status, OrderStatus::Completed);
        assert_eq!(result.order.tip_amount, dec!(15.00));
        assert!(result.order.tip_credited);

        let wallet = h
            .store
            .get_wallet_for_driver(driver.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wallet.total_tips_received, dec!(15.00));
    }

    #[tokio::test]
    async fn payment_failure_is_recorded_until_a_confirmation_wins() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let order = seed_order(&h, &driver, PaymentType::PayNow).await;

        let failed = h
            .lifecycle
            .payment_failed(order.id, Some("PAY-REF-4".to_string()))
            .await
            .unwrap();
        assert_eq!(failed.payment_status, PaymentStatus::Unpaid);

        h.lifecycle
            .confirm_payment(order.id, Some("PAY-REF-4".to_string()), None)
            .await
            .unwrap();
        let ignored = h
            .lifecycle
            .payment_failed(order.id, Some("PAY-REF-4".to_string()))
            .await
            .unwrap();
        assert_eq!(ignored.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn missing_orders_surface_not_found() {
        let h = harness();
        let driver = seed_driver(&h).await;
        let err = h
            .lifecycle
            .accept_order(Uuid::new_v4(), driver.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::OrderNotFound(_)));
    }
}
