use std::sync::Arc;

use tokio::sync::broadcast;

use velo_core::config::SettlementConfig;
use velo_core::events::OutboxEvent;
use velo_core::models::Driver;
use velo_core::repository::{
    CashSubmissionRepository, DriverRepository, OrderRepository, OutboxRepository,
    SettingsRepository, TransactionRepository, WalletRepository,
};
use velo_dispatch::hooks::{
    BreakdownProvider, Geocoder, InventoryHook, LoggingInventoryHook, NullGeocoder,
    OrderFieldsBreakdown,
};
use velo_dispatch::{AssignmentSelector, CreditGate, OrderLifecycle, OrderLocks, SettlementLedger};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderRepository>,
    pub drivers: Arc<dyn DriverRepository>,
    pub wallets: Arc<dyn WalletRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub selector: Arc<AssignmentSelector>,
    pub ledger: Arc<SettlementLedger>,
    pub event_tx: broadcast::Sender<OutboxEvent>,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wires the dispatch services over one store that implements every
    /// repository trait, seeding the hold driver record if the backend
    /// does not carry it yet.
    pub async fn with_store<S>(store: Arc<S>, settlement: SettlementConfig, auth: AuthConfig) -> Self
    where
        S: OrderRepository
            + DriverRepository
            + TransactionRepository
            + WalletRepository
            + CashSubmissionRepository
            + OutboxRepository
            + SettingsRepository
            + 'static,
    {
        let orders: Arc<dyn OrderRepository> = store.clone();
        let drivers: Arc<dyn DriverRepository> = store.clone();
        let transactions: Arc<dyn TransactionRepository> = store.clone();
        let wallets: Arc<dyn WalletRepository> = store.clone();
        let submissions: Arc<dyn CashSubmissionRepository> = store.clone();
        let outbox: Arc<dyn OutboxRepository> = store.clone();

        match drivers.get_driver(velo_core::models::HOLD_DRIVER_ID).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(err) = drivers.create_driver(&Driver::hold_driver()).await {
                    tracing::warn!(error = %err, "failed to seed hold driver");
                }
            }
            Err(err) => tracing::warn!(error = %err, "hold driver lookup failed"),
        }

        let locks = Arc::new(OrderLocks::new());
        let gate = Arc::new(CreditGate::new(drivers.clone(), submissions));
        let geocoder: Arc<dyn Geocoder> = Arc::new(NullGeocoder);
        let selector = Arc::new(AssignmentSelector::new(
            orders.clone(),
            drivers.clone(),
            outbox.clone(),
            gate.clone(),
            geocoder,
            locks.clone(),
        ));
        let breakdown: Arc<dyn BreakdownProvider> = Arc::new(OrderFieldsBreakdown);
        let ledger = Arc::new(SettlementLedger::new(
            orders.clone(),
            drivers.clone(),
            transactions.clone(),
            wallets.clone(),
            breakdown,
            locks.clone(),
        ));
        let inventory: Arc<dyn InventoryHook> = Arc::new(LoggingInventoryHook);
        let lifecycle = Arc::new(OrderLifecycle::new(
            orders.clone(),
            drivers.clone(),
            transactions,
            outbox.clone(),
            gate,
            selector.clone(),
            ledger.clone(),
            inventory,
            locks,
            settlement,
        ));

        let (event_tx, _) = broadcast::channel(100);

        Self {
            orders,
            drivers,
            wallets,
            outbox,
            lifecycle,
            selector,
            ledger,
            event_tx,
            auth,
        }
    }
}
