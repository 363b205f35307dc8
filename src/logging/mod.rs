use crate::config::LoggingLevel;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr; stdout carries rendered
/// manifests.
pub fn init(level: LoggingLevel) {
    let filter = EnvFilter::from_default_env();
    let filter = match format!("avp={}", level.as_filter()).parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
