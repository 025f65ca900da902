use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Which inference adapter the refresh task drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceBackend {
    /// Deterministic detections derived from the image bytes.
    Stub,
    /// Remote detection endpoint at `inference_url`.
    Http,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub db_probe_interval_secs: u64,
    pub store_timeout_secs: u64,
    pub heartbeat_cron: String,
    pub refresh_cron: String,
    pub use_test_images: bool,
    pub test_images_dir: PathBuf,
    pub images_dir: PathBuf,
    pub confidence_threshold: f64,
    pub free_classes: Vec<String>,
    pub inference_backend: InferenceBackend,
    pub inference_url: Option<String>,
    pub inference_api_key: Option<String>,
    pub inference_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("db_probe_interval_secs", &self.db_probe_interval_secs)
            .field("store_timeout_secs", &self.store_timeout_secs)
            .field("heartbeat_cron", &self.heartbeat_cron)
            .field("refresh_cron", &self.refresh_cron)
            .field("use_test_images", &self.use_test_images)
            .field("test_images_dir", &self.test_images_dir)
            .field("images_dir", &self.images_dir)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("free_classes", &self.free_classes)
            .field("inference_backend", &self.inference_backend)
            .field("inference_url", &self.inference_url)
            .field(
                "inference_api_key",
                &self.inference_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("inference_timeout_secs", &self.inference_timeout_secs)
            .finish()
    }
}
