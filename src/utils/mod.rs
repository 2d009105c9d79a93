//! The `utils` module provides the pieces shared by every other module of
//! `popbench`: the error types and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::{BenchError, BenchResult, TransportError, TransportResult};

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info", false);
        logging::init("debug", false);
        logging::init("warn", true);
    }

    #[test]
    #[serial]
    fn quiet_overrides_rust_log() {
        temp_env::with_var("RUST_LOG", Some("info"), || {
            assert_eq!(logging::filter("info", true).to_string(), "error");
            assert_eq!(logging::filter("error", false).to_string(), "info");
        });
    }

    #[test]
    #[serial]
    fn level_is_used_without_rust_log() {
        temp_env::with_var_unset("RUST_LOG", || {
            assert_eq!(logging::filter("Warning", false).to_string(), "warn");
            assert_eq!(logging::filter("verbose", false).to_string(), "info");
        });
    }
}
