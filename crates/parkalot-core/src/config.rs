use crate::app_config::{AppConfig, Environment, InferenceBackend};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a
/// `HashMap` lookup instead of `set_var`/`remove_var`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("PARKALOT_ENV", "development"));

    let bind_addr = or_default("PARKALOT_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("PARKALOT_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("PARKALOT_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("PARKALOT_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("PARKALOT_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("PARKALOT_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    let db_probe_interval_secs = parse_u64("PARKALOT_DB_PROBE_INTERVAL_SECS", "30")?;
    let store_timeout_secs = parse_u64("PARKALOT_STORE_TIMEOUT_SECS", "10")?;

    let heartbeat_cron = or_default("PARKALOT_HEARTBEAT_CRON", "0 */30 * * * *");
    let refresh_cron = or_default("PARKALOT_REFRESH_CRON", "0 */2 * * * *");

    let use_test_images = parse_bool(&or_default("PARKALOT_USE_TEST_IMAGES", "false"))
        .ok_or_else(|| invalid("PARKALOT_USE_TEST_IMAGES", "expected true or false".into()))?;
    let test_images_dir = PathBuf::from(or_default("PARKALOT_TEST_IMAGES_DIR", "./test-images"));
    let images_dir = PathBuf::from(or_default("PARKALOT_IMAGES_DIR", "./images"));

    let confidence_threshold = or_default("PARKALOT_CONFIDENCE_THRESHOLD", "0.5")
        .parse::<f64>()
        .map_err(|e| invalid("PARKALOT_CONFIDENCE_THRESHOLD", e.to_string()))?;
    if !(0.0..=1.0).contains(&confidence_threshold) {
        return Err(invalid(
            "PARKALOT_CONFIDENCE_THRESHOLD",
            format!("{confidence_threshold} is outside 0.0..=1.0"),
        ));
    }

    let free_classes: Vec<String> = or_default("PARKALOT_FREE_CLASSES", "empty,free")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect();
    if free_classes.is_empty() {
        return Err(invalid(
            "PARKALOT_FREE_CLASSES",
            "at least one class is required".into(),
        ));
    }

    let inference_backend = match or_default("PARKALOT_INFERENCE_BACKEND", "stub").as_str() {
        "stub" => InferenceBackend::Stub,
        "http" => InferenceBackend::Http,
        other => {
            return Err(invalid(
                "PARKALOT_INFERENCE_BACKEND",
                format!("unknown backend \"{other}\" (expected stub or http)"),
            ))
        }
    };
    let inference_url = lookup("PARKALOT_INFERENCE_URL").ok();
    if inference_backend == InferenceBackend::Http && inference_url.is_none() {
        return Err(ConfigError::MissingEnvVar(
            "PARKALOT_INFERENCE_URL".to_string(),
        ));
    }
    let inference_api_key = lookup("PARKALOT_INFERENCE_API_KEY").ok();
    let inference_timeout_secs = parse_u64("PARKALOT_INFERENCE_TIMEOUT_SECS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        db_probe_interval_secs,
        store_timeout_secs,
        heartbeat_cron,
        refresh_cron,
        use_test_images,
        test_images_dir,
        images_dir,
        confidence_threshold,
        free_classes,
        inference_backend,
        inference_url,
        inference_api_key,
        inference_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}
