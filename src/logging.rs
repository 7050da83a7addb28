//! Tracing-based logging init. `RUST_LOG` takes precedence, otherwise a
//! filter string is built from a default level plus per-module overrides.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub default: String,
    pub modules: Vec<(String, String)>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            default: "info".to_string(),
            modules: Vec::new(),
        }
    }
}

pub fn init_with_config(config: &LoggingConfig) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let mut spec = config.default.clone();
        for (module, level) in &config.modules {
            spec.push_str(&format!(",{module}={level}"));
        }
        EnvFilter::new(spec)
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Convenience wrapper for the common case (defaults, no module overrides).
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

#[macro_export]
macro_rules! log_event {
    ($handler:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}", $handler, format!($($arg)*));
    };
}

#[macro_export]
macro_rules! debug_event {
    ($handler:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}", $handler, format!($($arg)*));
    };
}
