use async_trait::async_trait;
use uuid::Uuid;

use crate::events::OutboxEvent;
use crate::models::{
    CashSubmission, Driver, DriverWallet, Order, OrderStatus, PartyTag, Transaction,
    TransactionType,
};

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(
        &self,
        order: &Order,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>>;

    async fn get_order(
        &self,
        id: Uuid,
    ) -> Result<Option<Order>, Box<dyn std::error::Error + Send + Sync>>;

    /// Persists every mutable field of the order row.
    async fn save_order(
        &self,
        order: &Order,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, Box<dyn std::error::Error + Send + Sync>>;

    /// Non-terminal orders currently assigned to the driver.
    async fn list_orders_for_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<Order>, Box<dyn std::error::Error + Send + Sync>>;

    async fn count_active_for_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;

    /// True when any order assigned to the driver has an undecided
    /// cancellation request.
    async fn any_pending_cancellation(
        &self,
        driver_id: Uuid,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Repository trait for driver records
#[async_trait]
pub trait DriverRepository: Send + Sync {
    async fn create_driver(
        &self,
        driver: &Driver,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>>;

    async fn get_driver(
        &self,
        id: Uuid,
    ) -> Result<Option<Driver>, Box<dyn std::error::Error + Send + Sync>>;

    async fn save_driver(
        &self,
        driver: &Driver,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Drivers with status `active`, the assignment candidate pool.
    async fn list_active_drivers(
        &self,
    ) -> Result<Vec<Driver>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Repository trait for ledger transactions
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>>;

    async fn save_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Live (non-cancelled) rows for one idempotency key, oldest first.
    /// `driver_id` narrows driver-party rows to a single driver.
    async fn list_live_transactions(
        &self,
        order_id: Uuid,
        transaction_type: TransactionType,
        party_tag: PartyTag,
        driver_id: Option<Uuid>,
    ) -> Result<Vec<Transaction>, Box<dyn std::error::Error + Send + Sync>>;

    async fn list_transactions_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<Transaction>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Repository trait for driver wallets
#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn get_wallet_for_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<Option<DriverWallet>, Box<dyn std::error::Error + Send + Sync>>;

    /// Fetches the driver's wallet, creating an empty one on first use.
    async fn get_or_create_wallet(
        &self,
        driver_id: Uuid,
    ) -> Result<DriverWallet, Box<dyn std::error::Error + Send + Sync>>;

    async fn save_wallet(
        &self,
        wallet: &DriverWallet,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Repository trait for driver cash submissions
#[async_trait]
pub trait CashSubmissionRepository: Send + Sync {
    async fn create_submission(
        &self,
        submission: &CashSubmission,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>>;

    async fn list_pending_submissions(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<CashSubmission>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Repository trait for the durable event outbox
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn append_event(
        &self,
        event: &OutboxEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Oldest unpublished events, bounded by `limit`.
    async fn list_unpublished_events(
        &self,
        limit: usize,
    ) -> Result<Vec<OutboxEvent>, Box<dyn std::error::Error + Send + Sync>>;

    async fn mark_event_published(
        &self,
        id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Repository trait for operational settings overlays
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(
        &self,
        key: &str,
    ) -> Result<Option<serde_json::Value>, Box<dyn std::error::Error + Send + Sync>>;
}
