use std::io::IsTerminal;
use std::str::FromStr;

use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::log::{LogFormat, LoggingConfig};

/// Installs the global subscriber. Every format writes to stderr so `collect`
/// can stream its artifact to stdout.
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::filter::ParseError> {
    let filter = EnvFilter::from_str(&config.filter_directive())?;
    let timer = UtcTime::rfc_3339();
    let is_terminal = std::io::stderr().is_terminal();
    let registry = tracing_subscriber::registry();

    match config.format {
        LogFormat::PrettyTree => registry
            .with(
                tracing_tree::HierarchicalLayer::new(2)
                    .with_ansi(is_terminal)
                    .with_bracketed_fields(true)
                    .with_deferred_spans(false)
                    .with_wraparound(25)
                    .with_indent_lines(true)
                    .with_timer(tracing_tree::time::Uptime::default())
                    .with_thread_names(false)
                    .with_thread_ids(false)
                    .with_targets(false),
            )
            .with(filter)
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_timer(timer),
            )
            .with(filter)
            .init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_ansi(is_terminal)
                    .with_timer(timer),
            )
            .with(filter)
            .init(),
    };

    Ok(())
}
