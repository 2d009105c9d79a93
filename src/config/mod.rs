mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BenchSettings, BrokerSettings, OutputSettings, PartialBenchSettings, PartialBrokerSettings,
    PartialOutputSettings, Settings,
};

/// Prefix of the environment variables read by `load_config`, e.g.
/// `POPBENCH__BENCH__RATE=20`.
pub const ENV_PREFIX: &str = "POPBENCH";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the broker, bench and output configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Like `load_config`, with an extra (required) file layered between the
/// default file and the environment.
pub fn load_config_from(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder =
        Config::builder().add_source(File::with_name("config/default").required(false));
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    let builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
