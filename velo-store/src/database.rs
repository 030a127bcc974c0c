use sqlx::{Pool, Postgres};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use serde_json::Value;
use tracing::info;

use crate::app_config::SettlementRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays the settlement rules stored in the settings table on top
    /// of the file-based defaults. Rows may wrap the value in
    /// `{"value": <x>}` or store it bare.
    pub async fn fetch_settlement_rules(
        &self,
        defaults: SettlementRules,
    ) -> Result<SettlementRules, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, Value)>("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;

        for (key, raw) in rows {
            let v = raw.get("value").unwrap_or(&raw);
            match key.as_str() {
                "driver_pay_per_delivery_enabled" => {
                    if let Some(b) = v.as_bool() {
                        rules.driver_pay_enabled = b;
                    }
                }
                "driver_pay_mode" => {
                    if let Some(s) = v.as_str() {
                        rules.driver_pay_mode = String::from(s);
                    }
                }
                "driver_pay_amount" => {
                    if let Some(f) = v.as_f64() {
                        rules.driver_pay_amount = f;
                    }
                }
                "driver_pay_percentage" => {
                    if let Some(f) = v.as_f64() {
                        rules.driver_pay_percentage = f;
                    }
                }
                _ => {}
            }
        }

        Ok(rules)
    }
}
