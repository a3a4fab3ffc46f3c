//! Logging setup for the command-line front end
//!
//! - Console logging on stderr (stdout carries model output)
//! - Optional JSON file logging, rotated daily

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the file writer alive; logs are flushed when dropped
pub struct Telemetry {
    _file_guard: Option<WorkerGuard>,
}

impl Telemetry {
    /// Install the global subscriber.
    ///
    /// `RUST_LOG` wins when set; otherwise `info` (or `debug` when verbose)
    /// with the HTTP stack kept quiet.
    pub fn init(verbose: bool, log_dir: Option<&Path>) -> anyhow::Result<Self> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));
        let console = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact();

        let file_guard = match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let appender = tracing_appender::rolling::daily(dir, "dmr_relay.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(console)
                    .with(fmt::layer().json().with_writer(writer))
                    .try_init()
                    .ok();
                Some(guard)
            }
            None => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(console)
                    .try_init()
                    .ok();
                None
            }
        };

        Ok(Self {
            _file_guard: file_guard,
        })
    }
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info,h2=info,rustls=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn,h2=warn,rustls=warn")
    }
}
