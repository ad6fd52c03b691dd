//! Diagnostic logging for the corral binary.
//!
//! Library code only emits `tracing` events; this module installs the
//! subscriber that prints them to stderr.

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `corral=debug`.
pub const LOG_ENV: &str = "CORRAL_LOG";

/// Default filter directive for a `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "corral=warn",
        1 => "corral=info",
        2 => "corral=debug",
        _ => "corral=trace",
    }
}

/// Install the stderr subscriber.
///
/// `CORRAL_LOG` takes precedence over `verbosity` when set and valid. Calling
/// this more than once is harmless.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_level() {
        assert_eq!(default_directive(0), "corral=warn");
        assert_eq!(default_directive(1), "corral=info");
        assert_eq!(default_directive(2), "corral=debug");
        assert_eq!(default_directive(7), "corral=trace");
    }

    #[test]
    fn test_default_directives_parse() {
        for verbosity in 0..4 {
            assert!(EnvFilter::try_new(default_directive(verbosity)).is_ok());
        }
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(0);
        init(2);
    }
}
