use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use velo_core::error::DispatchError;
use velo_core::models::{Branch, NewOrder, Order, OrderItem, OrderStatus, PaymentType};
use velo_dispatch::{Actor, SettlementOutcome, SettlementTrigger};

use crate::driver::{OrderResponse, TransitionResponse, UpdateStatusRequest};
use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub branch: BranchRequest,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
    pub payment_type: PaymentType,
    pub delivery_fee: Decimal,
    #[serde(default)]
    pub tip_amount: Decimal,
    /// Overrides the computed total for orders ingested without line detail.
    pub total_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct BranchRequest {
    pub id: Option<Uuid>,
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CancellationDecisionRequest {
    pub approve: bool,
}

#[derive(Debug, Serialize)]
pub struct SettlementRerunResponse {
    pub order_id: Uuid,
    pub outcome: String,
    pub detail: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/admin/orders
/// Ingest an order from the external checkout flow and run assignment
pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    if req.delivery_fee < Decimal::ZERO || req.tip_amount < Decimal::ZERO {
        return Err(AppError::Dispatch(DispatchError::Validation(
            "delivery_fee and tip_amount must not be negative".to_string(),
        )));
    }

    let order = Order::new(NewOrder {
        customer_id: req.customer_id,
        branch: Branch {
            id: req.branch.id.unwrap_or_else(Uuid::new_v4),
            name: req.branch.name,
            address: req.branch.address,
            latitude: req.branch.latitude,
            longitude: req.branch.longitude,
        },
        items: req
            .items
            .into_iter()
            .map(|item| OrderItem::new(item.name, item.quantity, item.unit_price))
            .collect(),
        payment_type: req.payment_type,
        delivery_fee: req.delivery_fee,
        tip_amount: req.tip_amount,
        total_amount: req.total_amount,
    });

    let order_id = state
        .orders
        .create_order(&order)
        .await
        .map_err(anyhow::Error::from_boxed)?;
    let assigned = state
        .selector
        .assign(order_id)
        .await
        .map_err(AppError::Dispatch)?;
    Ok(Json(OrderResponse::from(assigned)))
}

/// GET /v1/admin/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state
        .orders
        .list_orders(query.status)
        .await
        .map_err(anyhow::Error::from_boxed)?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /v1/admin/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .orders
        .get_order(order_id)
        .await
        .map_err(anyhow::Error::from_boxed)?
        .ok_or(AppError::Dispatch(DispatchError::OrderNotFound(order_id)))?;
    Ok(Json(OrderResponse::from(order)))
}

/// POST /v1/admin/orders/{id}/assign
/// Re-runs the selector for an order (for example after a reject)
pub async fn assign_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .selector
        .assign(order_id)
        .await
        .map_err(AppError::Dispatch)?;
    Ok(Json(OrderResponse::from(order)))
}

/// POST /v1/admin/orders/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let result = state
        .lifecycle
        .update_status(order_id, req.status, Actor::Admin)
        .await
        .map_err(AppError::Dispatch)?;
    Ok(Json(TransitionResponse::from(result)))
}

/// POST /v1/admin/orders/{id}/cancellation/decision
pub async fn decide_cancellation(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<CancellationDecisionRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .lifecycle
        .decide_cancellation(order_id, req.approve)
        .await
        .map_err(AppError::Dispatch)?;
    Ok(Json(OrderResponse::from(order)))
}

/// POST /v1/admin/orders/{id}/settlement/rerun
/// Idempotently replays settlement for a historical order
pub async fn rerun_settlement(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<SettlementRerunResponse>, AppError> {
    let order = state
        .orders
        .get_order(order_id)
        .await
        .map_err(anyhow::Error::from_boxed)?
        .ok_or(AppError::Dispatch(DispatchError::OrderNotFound(order_id)))?;

    // Completed orders replay the full routine; anything earlier gets the
    // partial (payment-stage) run so tips are never credited prematurely.
    let trigger = if order.status == OrderStatus::Completed {
        SettlementTrigger::OrderCompleted
    } else {
        SettlementTrigger::PaymentConfirmed
    };

    let outcome = state
        .ledger
        .run(order_id, state.lifecycle.settlement_config(), trigger)
        .await;

    let (outcome, detail) = match outcome {
        SettlementOutcome::Applied => ("applied".to_string(), None),
        SettlementOutcome::Skipped(reason) => ("skipped".to_string(), Some(reason)),
        SettlementOutcome::Partial { stage, message } => (
            "partial".to_string(),
            Some(format!("stopped at {stage}: {message}")),
        ),
    };

    Ok(Json(SettlementRerunResponse {
        order_id,
        outcome,
        detail,
    }))
}
