//! Tracing setup: human-readable logs on stderr, optional JSON-lines file.

mod json;

pub use json::{JsonLogLayer, JsonLogWriter, LOG_BUFFER};

use std::{path::Path, sync::Arc};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Guards that must be held to keep logging active.
pub struct TracingGuards {
    pub log_writer: Option<Arc<JsonLogWriter>>,
}

impl TracingGuards {
    /// Flushes the JSON log file, if any.
    pub fn finish(&self) -> eyre::Result<()> {
        match &self.log_writer {
            Some(writer) => writer.finish(),
            None => Ok(()),
        }
    }
}

fn verbosity_directives(verbosity: u8) -> String {
    let (global, local) = match verbosity {
        0 => ("warn", "info"),
        1 => ("warn", "debug"),
        2 => ("info", "trace"),
        _ => ("debug", "trace"),
    };
    format!("{global},evm_rpc_ingest={local}")
}

/// `RUST_LOG` wins; otherwise `-v` count picks the crate's level.
pub fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_directives(verbosity)))
}

/// Initialize the tracing subscriber. Stdout is left to block output.
pub fn init_tracing(verbosity: u8, log_path: Option<&Path>) -> TracingGuards {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter(verbosity));

    let mut open_error = None;
    let log_writer = log_path.and_then(|path| match JsonLogWriter::new(path, LOG_BUFFER) {
        Ok(writer) => Some(Arc::new(writer)),
        Err(err) => {
            open_error = Some(err);
            None
        }
    });
    let json_layer = log_writer
        .as_ref()
        .map(|writer| JsonLogLayer::new(Arc::clone(writer)).with_filter(env_filter(verbosity)));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(json_layer)
        .init();
    if let Some(err) = open_error {
        warn!(error = %err, "failed to initialize json log writer");
    }

    TracingGuards { log_writer }
}
