use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use velo_core::error::DispatchError;

use crate::state::AppState;

fn webhook_status(err: &DispatchError) -> StatusCode {
    match err {
        // 404 stops provider retries for orders we will never know about
        DispatchError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: PaymentObject,
}

#[derive(Debug, Deserialize)]
pub struct PaymentObject {
    pub order_id: Uuid,
    pub reference: Option<String>,
    pub tip_amount: Option<Decimal>,
}

/// POST /v1/webhooks/payments
/// Receive payment status updates from the payment provider
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhook>,
) -> Result<StatusCode, StatusCode> {
    tracing::info!(
        "Received webhook: {} ({}) for order {}",
        payload.type_,
        payload.id,
        payload.data.object.order_id
    );

    let object = payload.data.object;
    match payload.type_.as_str() {
        "payment.confirmed" => {
            let result = state
                .lifecycle
                .confirm_payment(object.order_id, object.reference, object.tip_amount)
                .await
                .map_err(|err| {
                    tracing::error!(order_id = %object.order_id, error = %err, "payment confirmation failed");
                    webhook_status(&err)
                })?;
            if let Some(warning) = result.settlement_warning {
                tracing::warn!(order_id = %object.order_id, warning, "settlement warning on webhook");
            }
        }
        "payment.failed" => {
            state
                .lifecycle
                .payment_failed(object.order_id, object.reference)
                .await
                .map_err(|err| {
                    tracing::error!(order_id = %object.order_id, error = %err, "payment failure handling failed");
                    webhook_status(&err)
                })?;
        }
        other => {
            tracing::debug!(event = other, "ignoring unhandled webhook event");
        }
    }

    Ok(StatusCode::OK)
}
