use std::sync::Arc;

use uuid::Uuid;

use velo_core::error::{DispatchError, DispatchResult};
use velo_core::events::{self, OutboxEvent};
use velo_core::models::{Driver, Order, HOLD_DRIVER_ID};
use velo_core::repository::{DriverRepository, OrderRepository, OutboxRepository};

use crate::credit::CreditGate;
use crate::hooks::Geocoder;
use crate::locks::OrderLocks;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lng) points in kilometers.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let d_lat = (to.0 - from.0).to_radians();
    let d_lng = (to.1 - from.1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.0.to_radians().cos() * to.0.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Picks a driver for an order from the active pool, nearest first, and
/// parks unassignable orders on the Hold Driver so no order ever carries
/// a dangling driver reference.
pub struct AssignmentSelector {
    orders: Arc<dyn OrderRepository>,
    drivers: Arc<dyn DriverRepository>,
    outbox: Arc<dyn OutboxRepository>,
    gate: Arc<CreditGate>,
    geocoder: Arc<dyn Geocoder>,
    locks: Arc<OrderLocks>,
}

impl AssignmentSelector {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        drivers: Arc<dyn DriverRepository>,
        outbox: Arc<dyn OutboxRepository>,
        gate: Arc<CreditGate>,
        geocoder: Arc<dyn Geocoder>,
        locks: Arc<OrderLocks>,
    ) -> Self {
        Self {
            orders,
            drivers,
            outbox,
            gate,
            geocoder,
            locks,
        }
    }

    /// Chooses a driver for the order. Never fails: any pool read error
    /// or empty pool resolves to the Hold Driver.
    pub async fn select_driver(&self, order: &Order) -> Driver {
        let pool = match self.drivers.list_active_drivers().await {
            Ok(pool) => pool,
            Err(err) => {
                tracing::error!(order_id = %order.id, error = %err, "driver pool read failed, parking on hold");
                return self.hold_driver().await;
            }
        };

        // 1. active pool, hold record excluded; 2. credit gate filter
        let mut candidates = Vec::new();
        for driver in pool {
            if driver.is_hold() {
                continue;
            }
            if self.gate.check_driver(&driver).await.can_accept_orders {
                candidates.push(driver);
            }
        }

        if candidates.is_empty() {
            tracing::info!(order_id = %order.id, "no qualified driver, parking on hold");
            return self.hold_driver().await;
        }
        if candidates.len() == 1 {
            return candidates.remove(0);
        }

        // 3. rank by distance to the pickup branch
        let target = match self.branch_location(order).await {
            Some(target) => target,
            None => {
                tracing::info!(order_id = %order.id, "no branch coordinates, taking first candidate");
                return candidates.remove(0);
            }
        };

        let mut best = 0;
        let mut best_distance = Self::candidate_distance(&candidates[0], target);
        for (idx, candidate) in candidates.iter().enumerate().skip(1) {
            let distance = Self::candidate_distance(candidate, target);
            if distance < best_distance {
                best = idx;
                best_distance = distance;
            }
        }
        candidates.remove(best)
    }

    /// Assigns (or reassigns) an order to the selected driver and records
    /// the assignment event.
    pub async fn assign(&self, order_id: Uuid) -> DispatchResult<Order> {
        let guard = self.locks.acquire(order_id).await;
        let mut order = self
            .orders
            .get_order(order_id)
            .await
            .map_err(DispatchError::storage)?
            .ok_or(DispatchError::OrderNotFound(order_id))?;
        if order.is_terminal() {
            return Err(DispatchError::Validation(format!(
                "order {order_id} is {} and cannot be assigned",
                order.status
            )));
        }

        let previous = order.driver_id;
        let driver = self.select_driver(&order).await;
        order.driver_id = Some(driver.id);
        order.driver_accepted = None;
        order.touch();
        self.orders
            .save_order(&order)
            .await
            .map_err(DispatchError::storage)?;
        drop(guard);

        if let Some(previous_id) = previous.filter(|id| Some(*id) != order.driver_id) {
            self.release_if_idle(previous_id).await;
        }

        let event = OutboxEvent::order_snapshot(events::ORDER_ASSIGNED, &order);
        if let Err(err) = self.outbox.append_event(&event).await {
            tracing::warn!(order_id = %order.id, error = %err, "failed to record assignment event");
        }
        tracing::info!(order_id = %order.id, driver_id = %driver.id, hold = driver.is_hold(), "order assigned");
        Ok(order)
    }

    /// Returns a driver to `active` once they have no live orders left,
    /// refreshing their activity timestamp either way. Best effort: a
    /// failure here never unwinds the transition that triggered it.
    pub async fn release_if_idle(&self, driver_id: Uuid) {
        if driver_id == HOLD_DRIVER_ID {
            return;
        }
        let active = match self.orders.count_active_for_driver(driver_id).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(%driver_id, error = %err, "active order count failed, leaving driver status");
                return;
            }
        };
        let mut driver = match self.drivers.get_driver(driver_id).await {
            Ok(Some(driver)) => driver,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(%driver_id, error = %err, "driver load failed during release");
                return;
            }
        };
        if active == 0 {
            driver.status = velo_core::models::DriverStatus::Active;
        }
        driver.last_activity_at = chrono::Utc::now();
        if let Err(err) = self.drivers.save_driver(&driver).await {
            tracing::warn!(%driver_id, error = %err, "driver release save failed");
        }
    }

    async fn branch_location(&self, order: &Order) -> Option<(f64, f64)> {
        if let (Some(lat), Some(lng)) = (order.branch.latitude, order.branch.longitude) {
            return Some((lat, lng));
        }
        match self.geocoder.geocode(&order.branch.address).await {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(order_id = %order.id, error = %err, "branch geocoding failed");
                None
            }
        }
    }

    fn candidate_distance(driver: &Driver, target: (f64, f64)) -> f64 {
        match driver.location() {
            Some(location) => haversine_km(location, target),
            // drivers with no known location rank behind everyone
            None => f64::INFINITY,
        }
    }

    async fn hold_driver(&self) -> Driver {
        match self.drivers.get_driver(HOLD_DRIVER_ID).await {
            Ok(Some(driver)) => driver,
            _ => Driver::hold_driver(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use velo_core::models::{Branch, CashSubmission, DriverStatus, NewOrder, OrderStatus, PaymentType};
    use velo_core::repository::CashSubmissionRepository;
    use velo_store::MemoryStore;

    fn selector(store: &Arc<MemoryStore>) -> AssignmentSelector {
        let gate = Arc::new(CreditGate::new(store.clone(), store.clone()));
        AssignmentSelector::new(
            store.clone(),
            store.clone(),
            store.clone(),
            gate,
            Arc::new(crate::hooks::NullGeocoder),
            Arc::new(OrderLocks::new()),
        )
    }

    async fn seed_order(store: &Arc<MemoryStore>, branch_coords: Option<(f64, f64)>) -> Order {
        let order = Order::new(NewOrder {
            customer_id: "cust-1".to_string(),
            branch: Branch {
                id: Uuid::new_v4(),
                name: "Central".to_string(),
                address: "7 King Fahd Rd".to_string(),
                latitude: branch_coords.map(|c| c.0),
                longitude: branch_coords.map(|c| c.1),
            },
            items: vec![],
            payment_type: PaymentType::PayNow,
            delivery_fee: dec!(20.00),
            tip_amount: rust_decimal::Decimal::ZERO,
            total_amount: Some(dec!(120.00)),
        });
        store.create_order(&order).await.unwrap();
        order
    }

    async fn seed_driver(
        store: &Arc<MemoryStore>,
        name: &str,
        location: Option<(f64, f64)>,
    ) -> Driver {
        let mut driver = Driver::new(name.to_string(), "0500000000".to_string());
        driver.latitude = location.map(|l| l.0);
        driver.longitude = location.map(|l| l.1);
        store.create_driver(&driver).await.unwrap();
        driver
    }

    #[test]
    fn haversine_matches_known_distances() {
        assert!(haversine_km((24.7136, 46.6753), (24.7136, 46.6753)) < 1e-9);
        // one degree of latitude is ~111.19 km
        let one_degree = haversine_km((0.0, 0.0), (1.0, 0.0));
        assert!((one_degree - 111.19).abs() < 0.1, "got {one_degree}");
    }

    #[tokio::test]
    async fn empty_pool_parks_on_hold_driver() {
        let store = Arc::new(MemoryStore::new());
        store.create_driver(&Driver::hold_driver()).await.unwrap();
        let order = seed_order(&store, None).await;
        let picked = selector(&store).select_driver(&order).await;
        assert!(picked.is_hold());
    }

    #[tokio::test]
    async fn gate_blocked_drivers_are_excluded() {
        let store = Arc::new(MemoryStore::new());
        store.create_driver(&Driver::hold_driver()).await.unwrap();
        let mut blocked = Driver::new("Blocked".to_string(), "0500000001".to_string());
        blocked.cash_at_hand = dec!(500);
        blocked.credit_limit = dec!(100);
        store.create_driver(&blocked).await.unwrap();
        let order = seed_order(&store, None).await;
        let picked = selector(&store).select_driver(&order).await;
        assert!(picked.is_hold());
    }

    #[tokio::test]
    async fn single_candidate_is_taken_without_ranking() {
        let store = Arc::new(MemoryStore::new());
        let only = seed_driver(&store, "Only", None).await;
        let order = seed_order(&store, Some((24.7, 46.7))).await;
        let picked = selector(&store).select_driver(&order).await;
        assert_eq!(picked.id, only.id);
    }

    #[tokio::test]
    async fn nearest_driver_wins_and_unlocated_sort_last() {
        let store = Arc::new(MemoryStore::new());
        let _far = seed_driver(&store, "Far", Some((25.5, 47.5))).await;
        let near = seed_driver(&store, "Near", Some((24.72, 46.68))).await;
        let _lost = seed_driver(&store, "Lost", None).await;
        let order = seed_order(&store, Some((24.7136, 46.6753))).await;
        let picked = selector(&store).select_driver(&order).await;
        assert_eq!(picked.id, near.id);
    }

    #[tokio::test]
    async fn missing_branch_coordinates_fall_back_to_pool_order() {
        let store = Arc::new(MemoryStore::new());
        let first = seed_driver(&store, "First", Some((25.5, 47.5))).await;
        let _second = seed_driver(&store, "Second", Some((24.72, 46.68))).await;
        let order = seed_order(&store, None).await;
        let picked = selector(&store).select_driver(&order).await;
        assert_eq!(picked.id, first.id);
    }

    struct BrokenDrivers;

    #[async_trait]
    impl DriverRepository for BrokenDrivers {
        async fn create_driver(
            &self,
            _driver: &Driver,
        ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
            Err("drivers offline".into())
        }

        async fn get_driver(
            &self,
            _id: Uuid,
        ) -> Result<Option<Driver>, Box<dyn std::error::Error + Send + Sync>> {
            Err("drivers offline".into())
        }

        async fn save_driver(
            &self,
            _driver: &Driver,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("drivers offline".into())
        }

        async fn list_active_drivers(
            &self,
        ) -> Result<Vec<Driver>, Box<dyn std::error::Error + Send + Sync>> {
            Err("drivers offline".into())
        }
    }

    struct NoSubmissions;

    #[async_trait]
    impl CashSubmissionRepository for NoSubmissions {
        async fn create_submission(
            &self,
            _submission: &CashSubmission,
        ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Uuid::new_v4())
        }

        async fn list_pending_submissions(
            &self,
            _driver_id: Uuid,
        ) -> Result<Vec<CashSubmission>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn pool_read_failure_parks_on_hold_driver() {
        let store = Arc::new(MemoryStore::new());
        let broken: Arc<dyn DriverRepository> = Arc::new(BrokenDrivers);
        let gate = Arc::new(CreditGate::new(broken.clone(), Arc::new(NoSubmissions)));
        let selector = AssignmentSelector::new(
            store.clone(),
            broken,
            store.clone(),
            gate,
            Arc::new(crate::hooks::NullGeocoder),
            Arc::new(OrderLocks::new()),
        );
        let order = seed_order(&store, None).await;
        let picked = selector.select_driver(&order).await;
        assert!(picked.is_hold());
    }

    #[tokio::test]
    async fn assign_writes_driver_and_resets_response() {
        let store = Arc::new(MemoryStore::new());
        let driver = seed_driver(&store, "Tariq", None).await;
        let mut order = seed_order(&store, None).await;
        order.driver_accepted = Some(false);
        store.save_order(&order).await.unwrap();

        let assigned = selector(&store).assign(order.id).await.unwrap();
        assert_eq!(assigned.driver_id, Some(driver.id));
        assert_eq!(assigned.driver_accepted, None);

        let events = store.list_unpublished_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, velo_core::events::ORDER_ASSIGNED);
    }

    #[tokio::test]
    async fn terminal_orders_cannot_be_assigned() {
        let store = Arc::new(MemoryStore::new());
        seed_driver(&store, "Tariq", None).await;
        let mut order = seed_order(&store, None).await;
        order.status = OrderStatus::Cancelled;
        store.save_order(&order).await.unwrap();
        let err = selector(&store).assign(order.id).await.unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[tokio::test]
    async fn release_flips_idle_drivers_back_to_active() {
        let store = Arc::new(MemoryStore::new());
        let mut driver = seed_driver(&store, "Busy", None).await;
        driver.status = DriverStatus::OnDelivery;
        store.save_driver(&driver).await.unwrap();

        // one live order keeps them on delivery
        let mut order = seed_order(&store, None).await;
        order.driver_id = Some(driver.id);
        order.status = OrderStatus::OutForDelivery;
        store.save_order(&order).await.unwrap();
        selector(&store).release_if_idle(driver.id).await;
        let busy = store.get_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(busy.status, DriverStatus::OnDelivery);

        order.status = OrderStatus::Completed;
        store.save_order(&order).await.unwrap();
        selector(&store).release_if_idle(driver.id).await;
        let idle = store.get_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(idle.status, DriverStatus::Active);
        assert!(idle.last_activity_at >= busy.last_activity_at);
    }

    #[tokio::test]
    async fn hold_driver_is_exempt_from_release() {
        let store = Arc::new(MemoryStore::new());
        let mut hold = Driver::hold_driver();
        hold.status = DriverStatus::OnDelivery;
        store.create_driver(&hold).await.unwrap();
        selector(&store).release_if_idle(HOLD_DRIVER_ID).await;
        let after = store.get_driver(HOLD_DRIVER_ID).await.unwrap().unwrap();
        assert_eq!(after.status, DriverStatus::OnDelivery);
    }
}
