//! Shared domain types and configuration for Parkalot.

mod app_config;
mod config;
mod error;
mod parking;

pub use app_config::{AppConfig, Environment, InferenceBackend};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::ConfigError;
pub use parking::{default_lot_name, Detection, Distance, DistanceEntry, LocationRecord, MergedResult};
