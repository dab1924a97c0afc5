//! Configuration loading.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `config/default` file (any format the `config` crate understands, usually
//! TOML), then `RELAYSUB_`-prefixed environment variables using `__` between
//! nesting levels, e.g. `RELAYSUB_BROKER__QUEUE_CAPACITY=64`.

mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, LoggingSettings, PartialSettings, ServerSettings, Settings,
};

const DEFAULT_CONFIG_PATH: &str = "config/default";
const ENV_PREFIX: &str = "RELAYSUB";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    build(File::with_name(DEFAULT_CONFIG_PATH).required(false))
}

/// Same as [`load_config`] but reads an explicit file, which must exist.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    build(File::with_name(path).required(true))
}

fn build(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Settings, ConfigError> {
    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge_with_defaults())
}
