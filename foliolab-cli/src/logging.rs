//! Log setup for the CLI.
//!
//! Logs always go to stderr so stdout stays clean for JSON results.
//! `RUST_LOG` overrides `--log-level` when set.

use clap::ValueEnum;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

pub fn init_logging(log_level: &str, format: LogFormat) {
    let subscriber = tracing_subscriber::registry().with(build_filter(log_level));

    match format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true);
            let _ = subscriber.with(fmt_layer).try_init();
        }
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false);
            let _ = subscriber.with(fmt_layer).try_init();
        }
    }

    tracing::debug!(log_level, ?format, "logging initialized");
}
