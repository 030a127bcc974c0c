use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use velo_core::models::{
    Branch, Order, OrderStatus, PaymentStatus, PaymentType,
};
use velo_dispatch::lifecycle::TransitionResult;
use velo_dispatch::Actor;

use crate::error::AppError;
use crate::middleware::auth::DriverClaims;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: String,
    pub branch: Branch,
    pub items: Vec<OrderItemResponse>,
    pub status: OrderStatus,
    pub payment_type: PaymentType,
    pub payment_status: PaymentStatus,
    pub driver_id: Option<Uuid>,
    pub driver_accepted: Option<bool>,
    pub total_amount: Decimal,
    pub delivery_fee: Decimal,
    pub tip_amount: Decimal,
    pub driver_pay_amount: Option<Decimal>,
    pub cancellation_requested: Option<bool>,
    pub cancellation_approved: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            branch: order.branch,
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    id: item.id,
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total(),
                })
                .collect(),
            status: order.status,
            payment_type: order.payment_type,
            payment_status: order.payment_status,
            driver_id: order.driver_id,
            driver_accepted: order.driver_accepted,
            total_amount: order.total_amount,
            delivery_fee: order.delivery_fee,
            tip_amount: order.tip_amount,
            driver_pay_amount: order.driver_pay_amount,
            cancellation_requested: order.cancellation_requested,
            cancellation_approved: order.cancellation_approved,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub order: OrderResponse,
    pub settlement_warning: Option<String>,
}

impl From<TransitionResult> for TransitionResponse {
    fn from(result: TransitionResult) -> Self {
        Self {
            order: OrderResponse::from(result.order),
            settlement_warning: result.settlement_warning,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub driver_id: Uuid,
    pub balance: Decimal,
    pub total_tips_received: Decimal,
    pub total_tips_count: i32,
    pub total_delivery_pay: Decimal,
    pub total_delivery_pay_count: i32,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/driver/orders
/// Live orders currently assigned to the calling driver
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<DriverClaims>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state
        .orders
        .list_orders_for_driver(claims.sub)
        .await
        .map_err(anyhow::Error::from_boxed)?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// POST /v1/driver/orders/{id}/accept
pub async fn accept_order(
    State(state): State<AppState>,
    Extension(claims): Extension<DriverClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .lifecycle
        .accept_order(order_id, claims.sub)
        .await
        .map_err(AppError::Dispatch)?;
    Ok(Json(OrderResponse::from(order)))
}

/// POST /v1/driver/orders/{id}/reject
pub async fn reject_order(
    State(state): State<AppState>,
    Extension(claims): Extension<DriverClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .lifecycle
        .reject_order(order_id, claims.sub)
        .await
        .map_err(AppError::Dispatch)?;
    Ok(Json(OrderResponse::from(order)))
}

/// POST /v1/driver/orders/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<DriverClaims>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let result = state
        .lifecycle
        .update_status(order_id, req.status, Actor::Driver(claims.sub))
        .await
        .map_err(AppError::Dispatch)?;
    Ok(Json(TransitionResponse::from(result)))
}

/// POST /v1/driver/orders/{id}/cancellation
pub async fn request_cancellation(
    State(state): State<AppState>,
    Extension(claims): Extension<DriverClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .lifecycle
        .request_cancellation(order_id, claims.sub)
        .await
        .map_err(AppError::Dispatch)?;
    Ok(Json(OrderResponse::from(order)))
}

/// GET /v1/driver/wallet
/// The caller's wallet; zeroed if nothing has been credited yet
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(claims): Extension<DriverClaims>,
) -> Result<Json<WalletResponse>, AppError> {
    let response = match state
        .wallets
        .get_wallet_for_driver(claims.sub)
        .await
        .map_err(anyhow::Error::from_boxed)?
    {
        Some(wallet) => WalletResponse {
            driver_id: wallet.driver_id,
            balance: wallet.balance,
            total_tips_received: wallet.total_tips_received,
            total_tips_count: wallet.total_tips_count,
            total_delivery_pay: wallet.total_delivery_pay,
            total_delivery_pay_count: wallet.total_delivery_pay_count,
        },
        None => WalletResponse {
            driver_id: claims.sub,
            balance: Decimal::ZERO,
            total_tips_received: Decimal::ZERO,
            total_tips_count: 0,
            total_delivery_pay: Decimal::ZERO,
            total_delivery_pay_count: 0,
        },
    };
    Ok(Json(response))
}
