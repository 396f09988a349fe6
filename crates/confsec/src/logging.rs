//! Logging configuration

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a stdout `tracing` subscriber
///
/// `level` is an `EnvFilter` directive such as `"debug"` or
/// `"confsec=trace,info"`; an unparsable directive falls back to `info`.
/// Only the first call has an effect, and nothing is installed when the
/// application already set a global subscriber.
pub fn init_logging(level: &str) {
    INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

        if fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already set");
        }
    });
}

/// Install a stdout `tracing` subscriber at `info` level
pub fn init_default_logging() {
    init_logging("info");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("not a [valid directive");
        init_logging("trace");
        init_default_logging();
        tracing::info!("logging initialized");
    }
}
