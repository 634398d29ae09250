//! Structured logging setup.

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Plain-text subscriber writing to `writer`.
pub(crate) fn subscriber_with_writer<W>(
    filter: EnvFilter,
    writer: W,
) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .with_ansi(false)
        .finish()
}

/// Subscriber used before the config is read, so config warnings still reach stderr.
pub fn bootstrap_subscriber() -> impl Subscriber + Send + Sync + 'static {
    subscriber_with_writer(env_filter("info"), std::io::stderr)
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
///
/// Logs go to stderr so command output on stdout stays parseable.
pub fn init_logging(level: &str, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false);

    // a subscriber may already be installed (tests, embedding apps)
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
