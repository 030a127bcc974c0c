use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod driver;
pub mod error;
pub mod events;
pub mod middleware;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

use crate::middleware::auth::{admin_auth_middleware, driver_auth_middleware};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let driver_routes = Router::new()
        .route("/v1/driver/orders", get(driver::list_orders))
        .route("/v1/driver/orders/{id}/accept", post(driver::accept_order))
        .route("/v1/driver/orders/{id}/reject", post(driver::reject_order))
        .route("/v1/driver/orders/{id}/status", post(driver::update_status))
        .route(
            "/v1/driver/orders/{id}/cancellation",
            post(driver::request_cancellation),
        )
        .route("/v1/driver/wallet", get(driver::get_wallet))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            driver_auth_middleware,
        ));

    let admin_routes = Router::new()
        .route(
            "/v1/admin/orders",
            post(admin::create_order).get(admin::list_orders),
        )
        .route("/v1/admin/orders/{id}", get(admin::get_order))
        .route("/v1/admin/orders/{id}/assign", post(admin::assign_order))
        .route("/v1/admin/orders/{id}/status", post(admin::update_status))
        .route(
            "/v1/admin/orders/{id}/cancellation/decision",
            post(admin::decide_cancellation),
        )
        .route(
            "/v1/admin/orders/{id}/settlement/rerun",
            post(admin::rerun_settlement),
        )
        .route("/v1/admin/events/stream", get(events::event_stream))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    let webhook_routes =
        Router::new().route("/v1/webhooks/payments", post(webhooks::handle_payment_webhook));

    Router::new()
        .merge(driver_routes)
        .merge(admin_routes)
        .merge(webhook_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
