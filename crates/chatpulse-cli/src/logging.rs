use tracing_subscriber::EnvFilter;

use chatpulse_core::config::LoggingConfig;

/// Filter directives used when `RUST_LOG` is unset. The configured level
/// wins over `--verbose`; per-crate filters are appended.
pub fn default_directives(config: Option<&LoggingConfig>, verbose: bool) -> String {
    let base = config
        .and_then(|c| c.level.clone())
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string());

    let mut directives = vec![base];
    if let Some(config) = config {
        directives.extend(config.filters.iter().cloned());
    }
    directives.join(",")
}

/// Install the global tracing subscriber.
pub fn init(config: Option<&LoggingConfig>, verbose: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(config, verbose))?,
    };
    let json = config.is_some_and(|c| c.format == "json");
    let stdout = config.is_some_and(|c| c.output == "stdout");

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).try_init(),
        (true, false) => builder.json().with_writer(std::io::stderr).try_init(),
        (false, true) => builder.with_writer(std::io::stdout).try_init(),
        (false, false) => builder.with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))
}
