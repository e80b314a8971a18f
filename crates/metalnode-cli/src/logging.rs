//! Tracing subscriber setup
//!
//! Filter precedence: `--log-level`, then `RUST_LOG`, then the most verbose
//! `tools.logLevel` among the loaded documents, then `info`.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::commands::CommandErrorExt;
use crate::{GlobalArgs, Result};

const DEFAULT_LEVEL: &str = "info";

/// Pick the filter directive from the available sources
pub fn filter_directive(
    flag: Option<&str>,
    env: Option<&str>,
    documents: Option<&str>,
) -> String {
    flag.or(env.filter(|e| !e.trim().is_empty()))
        .or(documents)
        .unwrap_or(DEFAULT_LEVEL)
        .to_string()
}

/// Install the global subscriber
///
/// Logs go to stderr, or to `--log-file` without ANSI colours. Reports are
/// printed to stdout separately.
pub fn init(global: &GlobalArgs, document_level: Option<&str>) -> Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(global.log_level.as_deref(), env.as_deref(), document_level);
    let filter = EnvFilter::try_new(&directive).cmd_err()?;

    let registry = tracing_subscriber::registry().with(filter);
    match &global.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            registry
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
                .cmd_err()
        }
        None => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .cmd_err(),
    }
}
