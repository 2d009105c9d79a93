use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the application.
///
/// `RUST_LOG` wins when it is set; otherwise `default_level` is used. `quiet`
/// overrides both and drops everything below `error` so only fatal problems
/// reach the terminal. Logs go to stderr, stdout is reserved for the report.
pub fn init(default_level: &str, quiet: bool) {
    // Use try_init so tests and libraries can call this multiple times without panicking
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level, quiet))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(crate) fn filter(default_level: &str, quiet: bool) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    let lvl = match default_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(lvl))
}
