use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use velo_core::events::OutboxEvent;
use velo_core::models::{
    Branch, CashSubmission, Driver, DriverStatus, DriverWallet, Order, OrderItem, OrderStatus,
    PartyTag, PaymentStatus, PaymentType, SubmissionStatus, Transaction, TransactionParty,
    TransactionStatus, TransactionType,
};
use velo_core::repository::{
    CashSubmissionRepository, DriverRepository, OrderRepository, OutboxRepository,
    SettingsRepository, TransactionRepository, WalletRepository,
};

/// Postgres-backed implementation of every repository trait.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate(
        &self,
        row: OrderRow,
    ) -> Result<Order, Box<dyn std::error::Error + Send + Sync>> {
        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, name, quantity, unit_price FROM order_items WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let items = item_rows
            .into_iter()
            .map(|i| OrderItem {
                id: i.id,
                name: i.name,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect();

        row.into_order(items)
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: String,
    branch_id: Uuid,
    branch_name: String,
    branch_address: String,
    branch_latitude: Option<f64>,
    branch_longitude: Option<f64>,
    status: String,
    payment_type: String,
    payment_status: String,
    driver_id: Option<Uuid>,
    driver_accepted: Option<bool>,
    total_amount: Decimal,
    delivery_fee: Decimal,
    tip_amount: Decimal,
    driver_pay_amount: Option<Decimal>,
    cancellation_requested: Option<bool>,
    cancellation_approved: Option<bool>,
    status_before_cancellation: Option<String>,
    driver_pay_credited: bool,
    driver_pay_credited_at: Option<DateTime<Utc>>,
    tip_credited: bool,
    tip_credited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(
        self,
        items: Vec<OrderItem>,
    ) -> Result<Order, Box<dyn std::error::Error + Send + Sync>> {
        let status_before_cancellation = match self.status_before_cancellation {
            Some(ref s) => Some(parse_order_status(s)?),
            None => None,
        };
        Ok(Order {
            id: self.id,
            customer_id: self.customer_id,
            branch: Branch {
                id: self.branch_id,
                name: self.branch_name,
                address: self.branch_address,
                latitude: self.branch_latitude,
                longitude: self.branch_longitude,
            },
            items,
            status: parse_order_status(&self.status)?,
            payment_type: PaymentType::parse(&self.payment_type)
                .ok_or_else(|| unknown("payment type", &self.payment_type))?,
            payment_status: PaymentStatus::parse(&self.payment_status)
                .ok_or_else(|| unknown("payment status", &self.payment_status))?,
            driver_id: self.driver_id,
            driver_accepted: self.driver_accepted,
            total_amount: self.total_amount,
            delivery_fee: self.delivery_fee,
            tip_amount: self.tip_amount,
            driver_pay_amount: self.driver_pay_amount,
            cancellation_requested: self.cancellation_requested,
            cancellation_approved: self.cancellation_approved,
            status_before_cancellation,
            driver_pay_credited: self.driver_pay_credited,
            driver_pay_credited_at: self.driver_pay_credited_at,
            tip_credited: self.tip_credited,
            tip_credited_at: self.tip_credited_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    #[allow(dead_code)]
    order_id: Uuid,
    name: String,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(sqlx::FromRow)]
struct DriverRow {
    id: Uuid,
    name: String,
    phone: String,
    status: String,
    cash_at_hand: Decimal,
    credit_limit: Decimal,
    latitude: Option<f64>,
    longitude: Option<f64>,
    last_activity_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl DriverRow {
    fn into_driver(self) -> Result<Driver, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Driver {
            id: self.id,
            name: self.name,
            phone: self.phone,
            status: DriverStatus::parse(&self.status)
                .ok_or_else(|| unknown("driver status", &self.status))?,
            cash_at_hand: self.cash_at_hand,
            credit_limit: self.credit_limit,
            latitude: self.latitude,
            longitude: self.longitude,
            last_activity_at: self.last_activity_at,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    driver_id: Uuid,
    balance: Decimal,
    total_tips_received: Decimal,
    total_tips_count: i32,
    total_delivery_pay: Decimal,
    total_delivery_pay_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WalletRow {
    fn into_wallet(self) -> DriverWallet {
        DriverWallet {
            id: self.id,
            driver_id: self.driver_id,
            balance: self.balance,
            total_tips_received: self.total_tips_received,
            total_tips_count: self.total_tips_count,
            total_delivery_pay: self.total_delivery_pay,
            total_delivery_pay_count: self.total_delivery_pay_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    order_id: Uuid,
    transaction_type: String,
    party_tag: String,
    driver_id: Option<Uuid>,
    wallet_id: Option<Uuid>,
    amount: Decimal,
    status: String,
    payment_status: String,
    receipt_number: Option<String>,
    notes: Option<String>,
    transaction_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<Transaction, Box<dyn std::error::Error + Send + Sync>> {
        let party = match PartyTag::parse(&self.party_tag)
            .ok_or_else(|| unknown("party tag", &self.party_tag))?
        {
            PartyTag::Merchant => TransactionParty::Merchant,
            PartyTag::Driver => TransactionParty::Driver {
                driver_id: self.driver_id.ok_or("driver transaction row missing driver_id")?,
                wallet_id: self.wallet_id.ok_or("driver transaction row missing wallet_id")?,
            },
        };
        Ok(Transaction {
            id: self.id,
            order_id: self.order_id,
            transaction_type: TransactionType::parse(&self.transaction_type)
                .ok_or_else(|| unknown("transaction type", &self.transaction_type))?,
            party,
            amount: self.amount,
            status: TransactionStatus::parse(&self.status)
                .ok_or_else(|| unknown("transaction status", &self.status))?,
            payment_status: PaymentStatus::parse(&self.payment_status)
                .ok_or_else(|| unknown("payment status", &self.payment_status))?,
            receipt_number: self.receipt_number,
            notes: self.notes,
            transaction_date: self.transaction_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: Uuid,
    driver_id: Uuid,
    amount: Decimal,
    status: String,
    submitted_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    order_id: Uuid,
    payload: Value,
    created_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
}

fn parse_order_status(
    value: &str,
) -> Result<OrderStatus, Box<dyn std::error::Error + Send + Sync>> {
    OrderStatus::parse(value).ok_or_else(|| unknown("order status", value))
}

fn unknown(what: &str, value: &str) -> Box<dyn std::error::Error + Send + Sync> {
    format!("unknown {what} '{value}'").into()
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn create_order(
        &self,
        order: &Order,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, branch_id, branch_name, branch_address,
                branch_latitude, branch_longitude, status, payment_type,
                payment_status, driver_id, driver_accepted, total_amount,
                delivery_fee, tip_amount, driver_pay_amount,
                cancellation_requested, cancellation_approved,
                status_before_cancellation, driver_pay_credited,
                driver_pay_credited_at, tip_credited, tip_credited_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
            "#,
        )
        .bind(order.id)
        .bind(&order.customer_id)
        .bind(order.branch.id)
        .bind(&order.branch.name)
        .bind(&order.branch.address)
        .bind(order.branch.latitude)
        .bind(order.branch.longitude)
        .bind(order.status.as_str())
        .bind(order.payment_type.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.driver_id)
        .bind(order.driver_accepted)
        .bind(order.total_amount)
        .bind(order.delivery_fee)
        .bind(order.tip_amount)
        .bind(order.driver_pay_amount)
        .bind(order.cancellation_requested)
        .bind(order.cancellation_approved)
        .bind(order.status_before_cancellation.map(|s| s.as_str()))
        .bind(order.driver_pay_credited)
        .bind(order.driver_pay_credited_at)
        .bind(order.tip_credited)
        .bind(order.tip_credited_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.id)
            .bind(order.id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(order.id)
    }

    async fn get_order(
        &self,
        id: Uuid,
    ) -> Result<Option<Order>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn save_order(
        &self,
        order: &Order,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Items are immutable after creation; only the order row changes.
        sqlx::query(
            r#"
            UPDATE orders SET
                status = $2, payment_type = $3, payment_status = $4,
                driver_id = $5, driver_accepted = $6, total_amount = $7,
                delivery_fee = $8, tip_amount = $9, driver_pay_amount = $10,
                cancellation_requested = $11, cancellation_approved = $12,
                status_before_cancellation = $13, driver_pay_credited = $14,
                driver_pay_credited_at = $15, tip_credited = $16,
                tip_credited_at = $17, updated_at = $18
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.payment_type.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.driver_id)
        .bind(order.driver_accepted)
        .bind(order.total_amount)
        .bind(order.delivery_fee)
        .bind(order.tip_amount)
        .bind(order.driver_pay_amount)
        .bind(order.cancellation_requested)
        .bind(order.cancellation_approved)
        .bind(order.status_before_cancellation.map(|s| s.as_str()))
        .bind(order.driver_pay_credited)
        .bind(order.driver_pay_credited_at)
        .bind(order.tip_credited)
        .bind(order.tip_credited_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT * FROM orders WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }

    async fn list_orders_for_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<Order>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            r#"
            SELECT * FROM orders
            WHERE driver_id = $1 AND status NOT IN ('completed', 'cancelled')
            ORDER BY created_at DESC
            "#,
        )
        .bind(driver_id)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }

    async fn count_active_for_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE driver_id = $1 AND status NOT IN ('completed', 'cancelled')",
        )
        .bind(driver_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    async fn any_pending_cancellation(
        &self,
        driver_id: Uuid,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM orders
                WHERE driver_id = $1
                  AND cancellation_requested = TRUE
                  AND cancellation_approved IS NULL
            )
            "#,
        )
        .bind(driver_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl DriverRepository for PgStore {
    async fn create_driver(
        &self,
        driver: &Driver,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO drivers (id, name, phone, status, cash_at_hand, credit_limit,
                                 latitude, longitude, last_activity_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(driver.id)
        .bind(&driver.name)
        .bind(&driver.phone)
        .bind(driver.status.as_str())
        .bind(driver.cash_at_hand)
        .bind(driver.credit_limit)
        .bind(driver.latitude)
        .bind(driver.longitude)
        .bind(driver.last_activity_at)
        .bind(driver.created_at)
        .execute(&self.pool)
        .await?;
        Ok(driver.id)
    }

    async fn get_driver(
        &self,
        id: Uuid,
    ) -> Result<Option<Driver>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<DriverRow> = sqlx::query_as("SELECT * FROM drivers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(DriverRow::into_driver).transpose()
    }

    async fn save_driver(
        &self,
        driver: &Driver,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            UPDATE drivers SET
                name = $2, phone = $3, status = $4, cash_at_hand = $5,
                credit_limit = $6, latitude = $7, longitude = $8,
                last_activity_at = $9
            WHERE id = $1
            "#,
        )
        .bind(driver.id)
        .bind(&driver.name)
        .bind(&driver.phone)
        .bind(driver.status.as_str())
        .bind(driver.cash_at_hand)
        .bind(driver.credit_limit)
        .bind(driver.latitude)
        .bind(driver.longitude)
        .bind(driver.last_activity_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_active_drivers(
        &self,
    ) -> Result<Vec<Driver>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<DriverRow> =
            sqlx::query_as("SELECT * FROM drivers WHERE status = 'active' ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(DriverRow::into_driver).collect()
    }
}

#[async_trait]
impl TransactionRepository for PgStore {
    async fn create_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, order_id, transaction_type, party_tag, driver_id, wallet_id,
                amount, status, payment_status, receipt_number, notes,
                transaction_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.order_id)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.party.tag().as_str())
        .bind(transaction.party.driver_id())
        .bind(transaction.party.wallet_id())
        .bind(transaction.amount)
        .bind(transaction.status.as_str())
        .bind(transaction.payment_status.as_str())
        .bind(&transaction.receipt_number)
        .bind(&transaction.notes)
        .bind(transaction.transaction_date)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(transaction.id)
    }

    async fn save_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // The idempotency key parts (order, type, party) never change.
        sqlx::query(
            r#"
            UPDATE transactions SET
                amount = $2, status = $3, payment_status = $4,
                receipt_number = $5, notes = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.amount)
        .bind(transaction.status.as_str())
        .bind(transaction.payment_status.as_str())
        .bind(&transaction.receipt_number)
        .bind(&transaction.notes)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_live_transactions(
        &self,
        order_id: Uuid,
        transaction_type: TransactionType,
        party_tag: PartyTag,
        driver_id: Option<Uuid>,
    ) -> Result<Vec<Transaction>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT * FROM transactions
            WHERE order_id = $1
              AND transaction_type = $2
              AND party_tag = $3
              AND status <> 'cancelled'
              AND ($4::uuid IS NULL OR driver_id = $4)
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id)
        .bind(transaction_type.as_str())
        .bind(party_tag.as_str())
        .bind(driver_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }

    async fn list_transactions_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<Transaction>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            "SELECT * FROM transactions WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }
}

#[async_trait]
impl WalletRepository for PgStore {
    async fn get_wallet_for_driver(
        &self,
        driver_id: Uuid,
    ) -> Result<Option<DriverWallet>, Box<dyn std::error::Error + Send + Sync>> {
        let row: Option<WalletRow> =
            sqlx::query_as("SELECT * FROM driver_wallets WHERE driver_id = $1")
                .bind(driver_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(WalletRow::into_wallet))
    }

    async fn get_or_create_wallet(
        &self,
        driver_id: Uuid,
    ) -> Result<DriverWallet, Box<dyn std::error::Error + Send + Sync>> {
        let fresh = DriverWallet::new(driver_id);
        sqlx::query(
            r#"
            INSERT INTO driver_wallets (
                id, driver_id, balance, total_tips_received, total_tips_count,
                total_delivery_pay, total_delivery_pay_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (driver_id) DO NOTHING
            "#,
        )
        .bind(fresh.id)
        .bind(fresh.driver_id)
        .bind(fresh.balance)
        .bind(fresh.total_tips_received)
        .bind(fresh.total_tips_count)
        .bind(fresh.total_delivery_pay)
        .bind(fresh.total_delivery_pay_count)
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .execute(&self.pool)
        .await?;

        self.get_wallet_for_driver(driver_id)
            .await?
            .ok_or_else(|| "wallet row missing after insert".into())
    }

    async fn save_wallet(
        &self,
        wallet: &DriverWallet,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            UPDATE driver_wallets SET
                balance = $2, total_tips_received = $3, total_tips_count = $4,
                total_delivery_pay = $5, total_delivery_pay_count = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.balance)
        .bind(wallet.total_tips_received)
        .bind(wallet.total_tips_count)
        .bind(wallet.total_delivery_pay)
        .bind(wallet.total_delivery_pay_count)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CashSubmissionRepository for PgStore {
    async fn create_submission(
        &self,
        submission: &CashSubmission,
    ) -> Result<Uuid, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO cash_submissions (id, driver_id, amount, status, submitted_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(submission.id)
        .bind(submission.driver_id)
        .bind(submission.amount)
        .bind(submission.status.as_str())
        .bind(submission.submitted_at)
        .execute(&self.pool)
        .await?;
        Ok(submission.id)
    }

    async fn list_pending_submissions(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<CashSubmission>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<SubmissionRow> = sqlx::query_as(
            r#"
            SELECT * FROM cash_submissions
            WHERE driver_id = $1 AND status = 'pending'
            ORDER BY submitted_at ASC
            "#,
        )
        .bind(driver_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CashSubmission {
                    id: row.id,
                    driver_id: row.driver_id,
                    amount: row.amount,
                    status: SubmissionStatus::parse(&row.status)
                        .ok_or_else(|| unknown("submission status", &row.status))?,
                    submitted_at: row.submitted_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OutboxRepository for PgStore {
    async fn append_event(
        &self,
        event: &OutboxEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, name, order_id, payload, created_at, published_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(&event.name)
        .bind(event.order_id)
        .bind(&event.payload)
        .bind(event.created_at)
        .bind(event.published_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_unpublished_events(
        &self,
        limit: usize,
    ) -> Result<Vec<OutboxEvent>, Box<dyn std::error::Error + Send + Sync>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT * FROM outbox_events
            WHERE published_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OutboxEvent {
                id: row.id,
                name: row.name,
                order_id: row.order_id,
                payload: row.payload,
                created_at: row.created_at,
                published_at: row.published_at,
            })
            .collect())
    }

    async fn mark_event_published(
        &self,
        id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query("UPDATE outbox_events SET published_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for PgStore {
    async fn get_setting(
        &self,
        key: &str,
    ) -> Result<Option<Value>, Box<dyn std::error::Error + Send + Sync>> {
        let value: Option<Value> = sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }
}
