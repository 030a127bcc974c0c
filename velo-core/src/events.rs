use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::Order;

pub const ORDER_STATUS_UPDATED: &str = "order-status-updated";
pub const DRIVER_ORDER_RESPONSE: &str = "driver-order-response";
pub const PAYMENT_CONFIRMED: &str = "payment-confirmed";
pub const ORDER_ASSIGNED: &str = "order-assigned";

/// A domain event recorded in the same store as the state change that
/// produced it. A relay publishes rows where `published_at` is unset, so
/// a consumer outage delays delivery instead of dropping it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub name: String,
    pub order_id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(name: &str, order_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            order_id,
            payload,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    /// Event whose payload is a full snapshot of the order.
    pub fn order_snapshot(name: &str, order: &Order) -> Self {
        let payload = serde_json::to_value(order).unwrap_or_else(|_| json!({ "id": order.id }));
        Self::new(name, order.id, json!({ "order": payload }))
    }

    /// Snapshot event carrying the driver's accept/reject answer.
    pub fn driver_response(order: &Order, driver_id: Uuid, accepted: bool) -> Self {
        let snapshot = serde_json::to_value(order).unwrap_or_else(|_| json!({ "id": order.id }));
        Self::new(
            DRIVER_ORDER_RESPONSE,
            order.id,
            json!({
                "order": snapshot,
                "driver_id": driver_id,
                "response": if accepted { "accepted" } else { "rejected" },
            }),
        )
    }
}
