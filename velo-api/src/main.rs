use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use velo_api::{app, state::AuthConfig, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "velo_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = velo_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Velo API on port {}", config.server.port);

    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
    };

    let app_state = if config.database.url.is_empty() {
        // No database configured: run against the in-memory store. Data is
        // lost on restart, so this is only for local development.
        tracing::warn!("No database URL configured, using in-memory store");
        let store = Arc::new(velo_store::MemoryStore::default());
        AppState::with_store(store, config.settlement.to_config(), auth).await
    } else {
        let db = velo_store::DbClient::new(&config.database.url)
            .await
            .expect("Failed to connect to Postgres");
        db.migrate().await.expect("Failed to run migrations");

        // Settings rows override whatever the config files shipped.
        let rules = db
            .fetch_settlement_rules(config.settlement.clone())
            .await
            .expect("Failed to load settlement rules");

        let store = Arc::new(velo_store::PgStore::new(db.pool.clone()));
        AppState::with_store(store, rules.to_config(), auth).await
    };

    // Outbox Relay
    tokio::spawn(velo_api::worker::start_outbox_relay(
        app_state.outbox.clone(),
        app_state.event_tx.clone(),
        Duration::from_millis(500),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
