pub mod codebook;
pub mod config;
pub mod core;
pub mod db;
pub mod engine;
pub mod pipeline;
pub mod providers;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::env_flag;

fn log_level_from_env() -> &'static str {
    match std::env::var("NEWSCODE_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn log_filter() -> EnvFilter {
    let level = log_level_from_env();
    let directives = if env_flag("NEWSCODE_SQLX_DEBUG") {
        level.to_string()
    } else {
        format!("{level},sqlx::query=warn")
    };
    EnvFilter::new(directives)
}

/// Installs the global subscriber. Logs go to stderr so stdout stays clean for results.
pub fn init_tracing() {
    let filter = log_filter();
    let result = if env_flag("NEWSCODE_LOG_JSON") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("tracing already initialised: {err}");
    }
}
