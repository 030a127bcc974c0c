use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use velo_core::events::OutboxEvent;
use velo_core::models::{
    CashSubmission, Driver, DriverStatus, DriverWallet, Order, OrderStatus, PartyTag,
    SubmissionStatus, Transaction, TransactionType,
};
use velo_core::repository::{
    CashSubmissionRepository, DriverRepository, OrderRepository, OutboxRepository,
    SettingsRepository, TransactionRepository, WalletRepository,
};

/// In-memory implementation of every repository trait. Backs local
/// development without a database and the dispatch test suites.
#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<Uuid, Order>>,
    drivers: RwLock<HashMap<Uuid, Driver>>,
    wallets: RwLock<HashMap<Uuid, DriverWallet>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    submissions: RwLock<HashMap<Uuid, CashSubmission>>,
    events: RwLock<Vec<OutboxEvent>>,
    settings: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a settings key, mirroring a row in the settings table.
    pub async fn put_setting(&self, key: &str, value: serde_json::Value) {
        self.settings.write().await.insert(key.to_string(), value);
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create_order(
        &self,
        order: &Order,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(order.id)
    }

    async fn get_order(
        &self,
        id: Uuid,
    ) -> Result<Option<Order>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn save_order(
        &self,
        order: &Order,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, Box<dyn std::error::Error + Send + Sync>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| status.map(|s| o.status == s).unwrap_or(true))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_orders_for_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<Order>, Box<dyn std::error::Error + Send + Sync>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.driver_id == Some(driver_id) && !o.is_terminal())
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn count_active_for_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.driver_id == Some(driver_id) && !o.is_terminal())
            .count())
    }

    async fn any_pending_cancellation(
        &self,
        driver_id: Uuid,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .any(|o| o.driver_id == Some(driver_id) && o.has_pending_cancellation()))
    }
}

#[async_trait]
impl DriverRepository for MemoryStore {
    async fn create_driver(
        &self,
        driver: &Driver,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
        self.drivers.write().await.insert(driver.id, driver.clone());
        Ok(driver.id)
    }

    async fn get_driver(
        &self,
        id: Uuid,
    ) -> Result<Option<Driver>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.drivers.read().await.get(&id).cloned())
    }

    async fn save_driver(
        &self,
        driver: &Driver,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.drivers.write().await.insert(driver.id, driver.clone());
        Ok(())
    }

    async fn list_active_drivers(
        &self,
    ) -> Result<Vec<Driver>, Box<dyn std::error::Error + Send + Sync>> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .read()
            .await
            .values()
            .filter(|d| d.status == DriverStatus::Active)
            .cloned()
            .collect();
        drivers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(drivers)
    }
}

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn create_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
        self.transactions
            .write()
            .await
            .insert(transaction.id, transaction.clone());
        Ok(transaction.id)
    }

    async fn save_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.transactions
            .write()
            .await
            .insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn list_live_transactions(
        &self,
        order_id: Uuid,
        transaction_type: TransactionType,
        party_tag: PartyTag,
        driver_id: Option<Uuid>,
    ) -> Result<Vec<Transaction>, Box<dyn std::error::Error + Send + Sync>> {
        let mut rows: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| {
                t.order_id == order_id
                    && t.transaction_type == transaction_type
                    && t.party.tag() == party_tag
                    && t.is_live()
                    && driver_id.map(|d| t.party.driver_id() == Some(d)).unwrap_or(true)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn list_transactions_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<Transaction>, Box<dyn std::error::Error + Send + Sync>> {
        let mut rows: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl WalletRepository for MemoryStore {
    async fn get_wallet_for_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<Option<DriverWallet>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.wallets.read().await.get(&driver_id).cloned())
    }

    async fn get_or_create_wallet(
        &self,
        driver_id: Uuid,
    ) -> Result<DriverWallet, Box<dyn std::error::Error + Send + Sync>> {
        let mut wallets = self.wallets.write().await;
        Ok(wallets
            .entry(driver_id)
            .or_insert_with(|| DriverWallet::new(driver_id))
            .clone())
    }

    async fn save_wallet(
        &self,
        wallet: &DriverWallet,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.wallets
            .write()
            .await
            .insert(wallet.driver_id, wallet.clone());
        Ok(())
    }
}

#[async_trait]
impl CashSubmissionRepository for MemoryStore {
    async fn create_submission(
        &self,
        submission: &CashSubmission,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
        self.submissions
            .write()
            .await
            .insert(submission.id, submission.clone());
        Ok(submission.id)
    }

    async fn list_pending_submissions(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<CashSubmission>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .submissions
            .read()
            .await
            .values()
            .filter(|s| s.driver_id == driver_id && s.status == SubmissionStatus::Pending)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutboxRepository for MemoryStore {
    async fn append_event(
        &self,
        event: &OutboxEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn list_unpublished_events(
        &self,
        limit: usize,
    ) -> Result<Vec<OutboxEvent>, Box<dyn std::error::Error + Send + Sync>> {
        let events = self.events.read().await;
        let mut unpublished: Vec<OutboxEvent> = events
            .iter()
            .filter(|e| e.published_at.is_none())
            .cloned()
            .collect();
        unpublished.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        unpublished.truncate(limit);
        Ok(unpublished)
    }

    async fn mark_event_published(
        &self,
        id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut events = self.events.write().await;
        if let Some(event) = events.iter_mut().find(|e| e.id == id) {
            event.published_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get_setting(
        &self,
        key: &str,
    ) -> Result<Option<serde_json::Value>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.settings.read().await.get(key).cloned())
    }
}
