use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose logs are capped at `warn` unless `RUST_LOG` says otherwise.
const NOISY_TARGETS: &[&str] = &["redis", "deadpool", "redb", "tokio"];

/// Builds the filter used by [`init_basic_console_logging`].
///
/// `RUST_LOG` wins when set. Otherwise `level` applies to everything and the
/// storage and connection-pool crates are held at `warn`.
pub fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = level.to_string();
        for target in NOISY_TARGETS {
            directives.push_str(&format!(",{target}=warn"));
        }
        EnvFilter::new(directives)
    })
}

/// Initialize console logging.
///
/// # Configuration
///
/// - **Log Level**: Controlled by `LOG_LEVEL` environment variable (default: "info")
/// - **Filtering**: `RUST_LOG` overrides everything; otherwise noisy dependencies are held at warn
/// - **Format**: Compact format with ANSI colors, or JSON with the `json` feature
/// - **Target**: Shows module paths (e.g., "ugo_cache::embedded")
///
/// Calling it again after a global subscriber is installed has no effect.
pub fn init_basic_console_logging() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = build_env_filter(&log_level);

    #[cfg(feature = "json")]
    let console_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_filter(env_filter);

    #[cfg(not(feature = "json"))]
    let console_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .with_filter(env_filter);

    if tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already installed");
    }
}
