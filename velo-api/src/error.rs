use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use velo_core::error::DispatchError;

#[derive(Debug)]
pub enum AppError {
    Dispatch(DispatchError),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AppError::Dispatch(err) => {
                let status = match &err {
                    DispatchError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                    DispatchError::InvalidTransition { .. }
                    | DispatchError::CancellationPending(_) => StatusCode::CONFLICT,
                    DispatchError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
                    DispatchError::CreditLimitExceeded(_) | DispatchError::NotAuthorized(_) => {
                        StatusCode::FORBIDDEN
                    }
                    DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
                    DispatchError::SettlementPartialFailure { .. } | DispatchError::Storage(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Internal Server Error: {}", err);
                    (status, err.kind(), "Internal Server Error".to_string())
                } else {
                    (status, err.kind(), err.to_string())
                }
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": { "kind": kind, "message": message },
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn dispatch_errors_map_to_their_status() {
        let id = Uuid::new_v4();
        let cases = [
            (AppError::Dispatch(DispatchError::OrderNotFound(id)), StatusCode::NOT_FOUND),
            (
                AppError::Dispatch(DispatchError::PaymentRequired(id)),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                AppError::Dispatch(DispatchError::CreditLimitExceeded(id)),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::Dispatch(DispatchError::CancellationPending("x".into())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Dispatch(DispatchError::Validation("x".into())),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn storage_errors_hide_the_message() {
        let response =
            AppError::Dispatch(DispatchError::Storage("connection refused".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
