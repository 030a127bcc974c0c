use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved driver record that keeps unassignable orders visible in
/// dispatch queues. Seeded by migration, excluded from candidate pools.
pub const HOLD_DRIVER_ID: Uuid = Uuid::nil();

/// Order status in the delivery lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    OutForDelivery,
    Delivered,
    Completed,
    Cancelled,
}

/// The forward path an order walks, one step at a time. `Cancelled` is a
/// side branch reachable through the cancellation flow, never part of it.
pub const STATUS_FLOW: [OrderStatus; 5] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::OutForDelivery,
    OrderStatus::Delivered,
    OrderStatus::Completed,
];

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "out_for_delivery" => Some(OrderStatus::OutForDelivery),
            "delivered" => Some(OrderStatus::Delivered),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Position in the forward flow, `None` for the cancelled branch.
    pub fn flow_index(&self) -> Option<usize> {
        STATUS_FLOW.iter().position(|s| s == self)
    }

    /// Immediate successor in the forward flow.
    pub fn next_in_flow(&self) -> Option<OrderStatus> {
        let idx = self.flow_index()?;
        STATUS_FLOW.get(idx + 1).copied()
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the customer pays for the order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    PayNow,
    PayOnDelivery,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::PayNow => "pay_now",
            PaymentType::PayOnDelivery => "pay_on_delivery",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pay_now" => Some(PaymentType::PayNow),
            "pay_on_delivery" => Some(PaymentType::PayOnDelivery),
            _ => None,
        }
    }
}

/// Payment state tracked independently of the order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "unpaid" => Some(PaymentStatus::Unpaid),
            _ => None,
        }
    }
}

/// Pickup branch snapshot embedded in the order at ingestion time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// An individual line within an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn new(name: String, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            quantity,
            unit_price,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Inputs for creating an order; everything else starts at its default.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub branch: Branch,
    pub items: Vec<OrderItem>,
    pub payment_type: PaymentType,
    pub delivery_fee: Decimal,
    pub tip_amount: Decimal,
    /// Overrides the computed items + fee + tip total when set.
    pub total_amount: Option<Decimal>,
}

/// The single source of truth for a delivery order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub branch: Branch,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub payment_type: PaymentType,
    pub payment_status: PaymentStatus,
    pub driver_id: Option<Uuid>,
    /// None until the driver responds, then their accept/reject answer.
    pub driver_accepted: Option<bool>,
    pub total_amount: Decimal,
    pub delivery_fee: Decimal,
    pub tip_amount: Decimal,
    pub driver_pay_amount: Option<Decimal>,
    pub cancellation_requested: Option<bool>,
    pub cancellation_approved: Option<bool>,
    pub status_before_cancellation: Option<OrderStatus>,
    pub driver_pay_credited: bool,
    pub driver_pay_credited_at: Option<DateTime<Utc>>,
    pub tip_credited: bool,
    pub tip_credited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(input: NewOrder) -> Self {
        let now = Utc::now();
        let items_total: Decimal = input.items.iter().map(|i| i.line_total()).sum();
        let total = input
            .total_amount
            .unwrap_or(items_total + input.delivery_fee + input.tip_amount);
        Self {
            id: Uuid::new_v4(),
            customer_id: input.customer_id,
            branch: input.branch,
            items: input.items,
            status: OrderStatus::Pending,
            payment_type: input.payment_type,
            payment_status: PaymentStatus::Pending,
            driver_id: None,
            driver_accepted: None,
            total_amount: total,
            delivery_fee: input.delivery_fee,
            tip_amount: input.tip_amount,
            driver_pay_amount: None,
            cancellation_requested: None,
            cancellation_approved: None,
            status_before_cancellation: None,
            driver_pay_credited: false,
            driver_pay_credited_at: None,
            tip_credited: false,
            tip_credited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of item line totals, falling back to the stored total minus
    /// fee and tip for orders ingested without line detail.
    pub fn items_total(&self) -> Decimal {
        if self.items.is_empty() {
            (self.total_amount - self.delivery_fee - self.tip_amount).max(Decimal::ZERO)
        } else {
            self.items.iter().map(|i| i.line_total()).sum()
        }
    }

    /// A cancellation was requested and no admin decision recorded yet.
    pub fn has_pending_cancellation(&self) -> bool {
        self.cancellation_requested == Some(true) && self.cancellation_approved.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Driver availability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Active,
    OnDelivery,
    Suspended,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Active => "active",
            DriverStatus::OnDelivery => "on_delivery",
            DriverStatus::Suspended => "suspended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(DriverStatus::Active),
            "on_delivery" => Some(DriverStatus::OnDelivery),
            "suspended" => Some(DriverStatus::Suspended),
            _ => None,
        }
    }
}

/// A delivery driver and the cash position the credit gate evaluates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub status: DriverStatus,
    /// Undeposited cash collected from pay-on-delivery orders.
    pub cash_at_hand: Decimal,
    /// Maximum cash a driver may carry; zero or negative means any
    /// positive balance blocks them.
    pub credit_limit: Decimal,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(name: String, phone: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            phone,
            status: DriverStatus::Active,
            cash_at_hand: Decimal::ZERO,
            credit_limit: Decimal::ZERO,
            latitude: None,
            longitude: None,
            last_activity_at: now,
            created_at: now,
        }
    }

    /// The seeded fallback record orders park on when no real driver
    /// qualifies.
    pub fn hold_driver() -> Self {
        let now = Utc::now();
        Self {
            id: HOLD_DRIVER_ID,
            name: "Hold Driver".to_string(),
            phone: String::new(),
            status: DriverStatus::Active,
            cash_at_hand: Decimal::ZERO,
            credit_limit: Decimal::ZERO,
            latitude: None,
            longitude: None,
            last_activity_at: now,
            created_at: now,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.id == HOLD_DRIVER_ID
    }

    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// Earnings ledger for a driver, created lazily on first credit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverWallet {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub balance: Decimal,
    pub total_tips_received: Decimal,
    pub total_tips_count: i32,
    pub total_delivery_pay: Decimal,
    pub total_delivery_pay_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DriverWallet {
    pub fn new(driver_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            driver_id,
            balance: Decimal::ZERO,
            total_tips_received: Decimal::ZERO,
            total_tips_count: 0,
            total_delivery_pay: Decimal::ZERO,
            total_delivery_pay_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn credit_delivery_pay(&mut self, amount: Decimal) {
        self.balance += amount;
        self.total_delivery_pay += amount;
        self.total_delivery_pay_count += 1;
        self.updated_at = Utc::now();
    }

    pub fn credit_tip(&mut self, amount: Decimal) {
        self.balance += amount;
        self.total_tips_received += amount;
        self.total_tips_count += 1;
        self.updated_at = Utc::now();
    }

    pub fn debit(&mut self, amount: Decimal) {
        self.balance -= amount;
        self.updated_at = Utc::now();
    }
}

/// Ledger entry categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Payment,
    DeliveryPay,
    CashSettlement,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Payment => "payment",
            TransactionType::DeliveryPay => "delivery_pay",
            TransactionType::CashSettlement => "cash_settlement",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "payment" => Some(TransactionType::Payment),
            "delivery_pay" => Some(TransactionType::DeliveryPay),
            "cash_settlement" => Some(TransactionType::CashSettlement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Which side of the ledger a transaction belongs to. The driver variant
/// carries both identifiers so a row can be settled without a join.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionParty {
    Merchant,
    Driver { driver_id: Uuid, wallet_id: Uuid },
}

impl TransactionParty {
    pub fn tag(&self) -> PartyTag {
        match self {
            TransactionParty::Merchant => PartyTag::Merchant,
            TransactionParty::Driver { .. } => PartyTag::Driver,
        }
    }

    pub fn driver_id(&self) -> Option<Uuid> {
        match self {
            TransactionParty::Merchant => None,
            TransactionParty::Driver { driver_id, .. } => Some(*driver_id),
        }
    }

    pub fn wallet_id(&self) -> Option<Uuid> {
        match self {
            TransactionParty::Merchant => None,
            TransactionParty::Driver { wallet_id, .. } => Some(*wallet_id),
        }
    }
}

/// Party discriminant used in the idempotency key and storage columns
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartyTag {
    Merchant,
    Driver,
}

impl PartyTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyTag::Merchant => "merchant",
            PartyTag::Driver => "driver",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "merchant" => Some(PartyTag::Merchant),
            "driver" => Some(PartyTag::Driver),
            _ => None,
        }
    }
}

/// A financial ledger row. At most one non-cancelled row may exist per
/// (order, type, party) key; superseded rows are cancelled, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub transaction_type: TransactionType,
    pub party: TransactionParty,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub payment_status: PaymentStatus,
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        order_id: Uuid,
        transaction_type: TransactionType,
        party: TransactionParty,
        amount: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            transaction_type,
            party,
            amount,
            status: TransactionStatus::Pending,
            payment_status: PaymentStatus::Pending,
            receipt_number: None,
            notes: None,
            transaction_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status != TransactionStatus::Cancelled
    }

    pub fn mark_completed(&mut self, receipt_number: String) {
        self.status = TransactionStatus::Completed;
        self.payment_status = PaymentStatus::Paid;
        self.receipt_number = Some(receipt_number);
        self.updated_at = Utc::now();
    }

    pub fn mark_cancelled(&mut self) {
        self.status = TransactionStatus::Cancelled;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SubmissionStatus::Pending),
            "approved" => Some(SubmissionStatus::Approved),
            "rejected" => Some(SubmissionStatus::Rejected),
            _ => None,
        }
    }
}

/// Cash a driver has handed in that finance has not yet approved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashSubmission {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub amount: Decimal,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
}

impl CashSubmission {
    pub fn new(driver_id: Uuid, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver_id,
            amount,
            status: SubmissionStatus::Pending,
            submitted_at: Utc::now(),
        }
    }
}
