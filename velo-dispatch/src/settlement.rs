use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use velo_core::config::SettlementConfig;
use velo_core::models::{
    Order, PartyTag, PaymentStatus, PaymentType, Transaction, TransactionParty,
    TransactionStatus, TransactionType, HOLD_DRIVER_ID,
};
use velo_core::repository::{
    DriverRepository, OrderRepository, TransactionRepository, WalletRepository,
};

use crate::hooks::BreakdownProvider;
use crate::locks::OrderLocks;

/// Why the ledger is being run for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementTrigger {
    /// Payment confirmed mid-flight: post fee rows and driver pay only.
    PaymentConfirmed,
    /// Order completed: the full run including tip, merchant crediting
    /// and cash settlement.
    OrderCompleted,
}

/// Result of one ledger run. A partial outcome never unwinds the status
/// transition that triggered it; operators re-run to repair.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Applied,
    Skipped(String),
    Partial { stage: String, message: String },
}

impl SettlementOutcome {
    pub fn warning(&self) -> Option<String> {
        match self {
            SettlementOutcome::Partial { stage, message } => {
                Some(format!("settlement stopped at {stage}: {message}"))
            }
            _ => None,
        }
    }
}

type StageError = (&'static str, Box<dyn std::error::Error + Send + Sync>);

fn stage<E: Into<Box<dyn std::error::Error + Send + Sync>>>(
    name: &'static str,
) -> impl FnOnce(E) -> StageError {
    move |err| (name, err.into())
}

/// Splits a delivery payment into merchant, driver-pay and tip portions
/// and applies them to wallets exactly once per order, no matter how many
/// times the triggering event is delivered.
pub struct SettlementLedger {
    orders: Arc<dyn OrderRepository>,
    drivers: Arc<dyn DriverRepository>,
    transactions: Arc<dyn TransactionRepository>,
    wallets: Arc<dyn WalletRepository>,
    breakdown: Arc<dyn BreakdownProvider>,
    locks: Arc<OrderLocks>,
}

impl SettlementLedger {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        drivers: Arc<dyn DriverRepository>,
        transactions: Arc<dyn TransactionRepository>,
        wallets: Arc<dyn WalletRepository>,
        breakdown: Arc<dyn BreakdownProvider>,
        locks: Arc<OrderLocks>,
    ) -> Self {
        Self {
            orders,
            drivers,
            transactions,
            wallets,
            breakdown,
            locks,
        }
    }

    /// Runs the ledger for one order under its lock. Every failure is
    /// caught here; callers receive an outcome, never an error.
    pub async fn run(
        &self,
        order_id: Uuid,
        config: &SettlementConfig,
        trigger: SettlementTrigger,
    ) -> SettlementOutcome {
        let _guard = self.locks.acquire(order_id).await;
        match self.apply(order_id, config, trigger).await {
            Ok(outcome) => {
                match &outcome {
                    SettlementOutcome::Applied => {
                        tracing::info!(%order_id, ?trigger, "settlement applied");
                    }
                    SettlementOutcome::Skipped(reason) => {
                        tracing::info!(%order_id, ?trigger, %reason, "settlement skipped");
                    }
                    SettlementOutcome::Partial { .. } => {}
                }
                outcome
            }
            Err((stage, err)) => {
                tracing::error!(%order_id, ?trigger, stage, error = %err, "settlement stage failed");
                SettlementOutcome::Partial {
                    stage: stage.to_string(),
                    message: err.to_string(),
                }
            }
        }
    }

    async fn apply(
        &self,
        order_id: Uuid,
        config: &SettlementConfig,
        trigger: SettlementTrigger,
    ) -> Result<SettlementOutcome, StageError> {
        let Some(mut order) = self
            .orders
            .get_order(order_id)
            .await
            .map_err(stage("load"))?
        else {
            return Ok(SettlementOutcome::Skipped("order not found".to_string()));
        };
        let Some(driver_id) = order.driver_id else {
            return Ok(SettlementOutcome::Skipped("no driver assigned".to_string()));
        };
        if driver_id == HOLD_DRIVER_ID {
            return Ok(SettlementOutcome::Skipped(
                "order parked on hold driver".to_string(),
            ));
        }

        // 1. money split; 2-3. configured driver pay and merchant share
        let split = self
            .breakdown
            .breakdown(&order)
            .await
            .map_err(stage("breakdown"))?;
        let driver_pay = config.driver_pay_for(split.delivery_fee);
        let merchant_amount = split.delivery_fee - driver_pay;

        let mut wallet = self
            .wallets
            .get_or_create_wallet(driver_id)
            .await
            .map_err(stage("wallet"))?;

        // 4. one live row per (order, type, party), extras repaired away
        let merchant_row = if split.delivery_fee > Decimal::ZERO {
            Some(
                self.upsert_fee_row(order_id, TransactionParty::Merchant, merchant_amount)
                    .await
                    .map_err(stage("merchant-row"))?,
            )
        } else {
            None
        };
        let driver_party = TransactionParty::Driver {
            driver_id,
            wallet_id: wallet.id,
        };
        let driver_row = if driver_pay > Decimal::ZERO {
            Some(
                self.upsert_fee_row(order_id, driver_party, driver_pay)
                    .await
                    .map_err(stage("driver-row"))?,
            )
        } else {
            None
        };

        if order.driver_pay_amount != Some(driver_pay) {
            order.driver_pay_amount = Some(driver_pay);
            order.touch();
            self.orders
                .save_order(&order)
                .await
                .map_err(stage("record-amount"))?;
        }

        let paid = order.payment_status == PaymentStatus::Paid;

        // 5. driver pay credit, once per order
        if let Some(mut row) = driver_row.filter(|r| paid && r.status != TransactionStatus::Completed)
        {
            row.mark_completed(new_receipt_number());
            self.transactions
                .save_transaction(&row)
                .await
                .map_err(stage("driver-pay-credit"))?;
            wallet.credit_delivery_pay(driver_pay);
            self.wallets
                .save_wallet(&wallet)
                .await
                .map_err(stage("driver-pay-credit"))?;
            order.driver_pay_credited = true;
            order.driver_pay_credited_at = Some(Utc::now());
            order.touch();
            self.orders
                .save_order(&order)
                .await
                .map_err(stage("driver-pay-credit"))?;
            tracing::info!(%order_id, %driver_id, %driver_pay, "driver pay credited");
        }

        if trigger == SettlementTrigger::OrderCompleted {
            // 6. tip and merchant crediting, deferred to completion
            if paid && split.tip_amount > Decimal::ZERO && !order.tip_credited {
                wallet.credit_tip(split.tip_amount);
                self.wallets
                    .save_wallet(&wallet)
                    .await
                    .map_err(stage("tip-credit"))?;
                order.tip_credited = true;
                order.tip_credited_at = Some(Utc::now());
                order.touch();
                self.orders
                    .save_order(&order)
                    .await
                    .map_err(stage("tip-credit"))?;
                tracing::info!(%order_id, %driver_id, tip = %split.tip_amount, "tip credited");
            }
            if let Some(mut row) =
                merchant_row.filter(|r| paid && r.status != TransactionStatus::Completed)
            {
                row.mark_completed(new_receipt_number());
                self.transactions
                    .save_transaction(&row)
                    .await
                    .map_err(stage("merchant-credit"))?;
            }

            // 7. the inverse flow: cash the driver collected for us
            if paid && order.payment_type == PaymentType::PayOnDelivery {
                self.settle_cash(&order, driver_id, &mut wallet, split.cash_owed(order.total_amount, driver_pay))
                    .await
                    .map_err(stage("cash-settlement"))?;
            }
        }

        Ok(SettlementOutcome::Applied)
    }

    /// Records the cash a pay-on-delivery driver owes the platform:
    /// wallet debit plus a matching bump of their cash at hand. The live
    /// cash row is the idempotency guard.
    async fn settle_cash(
        &self,
        order: &Order,
        driver_id: Uuid,
        wallet: &mut velo_core::models::DriverWallet,
        owed: Decimal,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if owed <= Decimal::ZERO {
            return Ok(());
        }
        let existing = self
            .transactions
            .list_live_transactions(
                order.id,
                TransactionType::CashSettlement,
                PartyTag::Driver,
                Some(driver_id),
            )
            .await?;
        if !existing.is_empty() {
            return Ok(());
        }
        let mut row = Transaction::new(
            order.id,
            TransactionType::CashSettlement,
            TransactionParty::Driver {
                driver_id,
                wallet_id: wallet.id,
            },
            owed,
        );
        row.notes = Some("cash collected on delivery".to_string());
        row.mark_completed(new_receipt_number());
        self.transactions.create_transaction(&row).await?;
        wallet.debit(owed);
        self.wallets.save_wallet(wallet).await?;
        if let Some(mut driver) = self.drivers.get_driver(driver_id).await? {
            driver.cash_at_hand += owed;
            self.drivers.save_driver(&driver).await?;
        }
        tracing::info!(order_id = %order.id, %driver_id, %owed, "cash settlement recorded");
        Ok(())
    }

    /// Finds the live delivery-pay row for the party, updates it in
    /// place, and cancels any extras. Rows already completed keep their
    /// settled amount.
    async fn upsert_fee_row(
        &self,
        order_id: Uuid,
        party: TransactionParty,
        amount: Decimal,
    ) -> Result<Transaction, Box<dyn std::error::Error + Send + Sync>> {
        let rows = self
            .transactions
            .list_live_transactions(order_id, TransactionType::DeliveryPay, party.tag(), None)
            .await?;

        let mut keeper: Option<Transaction> = None;
        for mut row in rows {
            let matches_party = match party {
                TransactionParty::Merchant => true,
                TransactionParty::Driver { driver_id, .. } => {
                    row.party.driver_id() == Some(driver_id)
                }
            };
            if matches_party && keeper.is_none() {
                keeper = Some(row);
            } else {
                // stale driver after reassignment, or a duplicate row
                row.mark_cancelled();
                self.transactions.save_transaction(&row).await?;
            }
        }

        match keeper {
            Some(mut row) => {
                if row.status != TransactionStatus::Completed && row.amount != amount {
                    row.amount = amount;
                    row.updated_at = Utc::now();
                    self.transactions.save_transaction(&row).await?;
                }
                Ok(row)
            }
            None => {
                let row = Transaction::new(order_id, TransactionType::DeliveryPay, party, amount);
                self.transactions.create_transaction(&row).await?;
                Ok(row)
            }
        }
    }
}

fn new_receipt_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("VELO-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}
