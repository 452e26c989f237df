//! Tracing setup for the `sysmend` binary.

use tracing::{Level, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "SYSMEND_LOG";

/// `SYSMEND_LOG`, then `RUST_LOG`, then `level`.
fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Stderr writer keeps stdout free for command output.
fn output_layer<S>(json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        base.json().boxed()
    } else {
        base.boxed()
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(json: bool, level: Level) {
    let _ = tracing_subscriber::registry()
        .with(output_layer(json))
        .with(env_filter(level))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}
