pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod repository;

pub use config::{DriverPayMode, SettlementConfig};
pub use error::{DispatchError, DispatchResult};
