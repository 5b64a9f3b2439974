pub mod env_overrides;
pub mod log;

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, File, FileFormat, FileSourceFile};
use envconfig::Envconfig;
use hive_usage_sdk::agent::builder::{DEFAULT_MAX_SIZE, DEFAULT_SEND_INTERVAL};
use hive_usage_sdk::agent::sampling::SampleRate;
use hive_usage_sdk::sender::{DEFAULT_CLIENT_NAME, DEFAULT_HIVE_USAGE_ENDPOINT};
use serde::{Deserialize, Serialize};

use crate::config::env_overrides::{EnvVarOverrides, EnvVarOverridesError};
use crate::config::log::LoggingConfig;

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct UsageCliConfig {
    /// Logging of the CLI itself, written to stderr.
    #[serde(default)]
    pub log: LoggingConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub usage_reporting: UsageReportingConfig,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CollectorConfig {
    /// Narrows input object usage to the fields present in variable values,
    /// instead of marking every field of a variable's input type.
    ///
    /// Can also be set via the `HIVE_USAGE_PROCESS_VARIABLES` environment variable.
    #[serde(default)]
    pub process_variables: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UsageReportingConfig {
    /// For self-hosting, you can override `/usage` endpoint (defaults to `https://app.graphql-hive.com/usage`).
    ///
    /// Can also be set via the `HIVE_USAGE_ENDPOINT` environment variable.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Registry access token. Required by `report`.
    ///
    /// Can also be set via the `HIVE_ACCESS_TOKEN` environment variable.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Target slug (`org/project/target`) or UUID, required for organization access tokens.
    ///
    /// Can also be set via the `HIVE_TARGET` environment variable.
    #[serde(default)]
    pub target_id: Option<String>,

    /// Sample rate to determine sampling.
    /// 0% = never being sent
    /// 100% = always being sent
    /// Default: 100%
    #[serde(default)]
    pub sample_rate: SampleRate,

    /// A maximum number of operations to hold in a buffer before sending
    /// Default: 25
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Frequency of flushing the buffer to the server
    /// Default: 5 seconds
    #[serde(
        default = "default_flush_interval",
        deserialize_with = "humantime_serde::deserialize",
        serialize_with = "humantime_serde::serialize"
    )]
    pub flush_interval: Duration,

    /// Default: 5 seconds
    #[serde(
        default = "default_connect_timeout",
        deserialize_with = "humantime_serde::deserialize",
        serialize_with = "humantime_serde::serialize"
    )]
    pub connect_timeout: Duration,

    /// Default: 15 seconds
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "humantime_serde::deserialize",
        serialize_with = "humantime_serde::serialize"
    )]
    pub request_timeout: Duration,

    /// Accepts invalid SSL certificates
    /// Default: false
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Sent as `graphql-client-name` and in the user agent.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Sent as `graphql-client-version`, defaults to the CLI version.
    #[serde(default)]
    pub client_version: Option<String>,
}

impl Default for UsageReportingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            access_token: None,
            target_id: None,
            sample_rate: SampleRate::default(),
            buffer_size: default_buffer_size(),
            flush_interval: default_flush_interval(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            accept_invalid_certs: false,
            client_name: default_client_name(),
            client_version: None,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_HIVE_USAGE_ENDPOINT.to_string()
}

fn default_buffer_size() -> usize {
    DEFAULT_MAX_SIZE
}

fn default_flush_interval() -> Duration {
    DEFAULT_SEND_INTERVAL
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum UsageConfigError {
    #[error("Failed to load configuration: {0}")]
    ConfigLoadError(#[from] config::ConfigError),
    #[error("Failed to apply configuration overrides: {0}")]
    EnvVarOverridesError(#[from] EnvVarOverridesError),
    #[error("Failed to load the environment variables: {0}")]
    EnvVarLoadError(#[from] envconfig::Error),
}

static DEFAULT_FILE_NAMES: &[&str] = &[
    "usage.config.yaml",
    "usage.config.yml",
    "usage.config.json",
    "usage.config.json5",
];

/// Loads the configuration from `config_path`, or from the first default file
/// found in the working directory, then applies environment overrides.
pub fn load_config(config_path: Option<PathBuf>) -> Result<UsageCliConfig, UsageConfigError> {
    let env_overrides = EnvVarOverrides::init_from_env()?;

    load_config_with_overrides(config_path, env_overrides)
}

pub fn load_config_with_overrides(
    config_path: Option<PathBuf>,
    env_overrides: EnvVarOverrides,
) -> Result<UsageCliConfig, UsageConfigError> {
    let mut config = Config::builder();

    if let Some(path) = config_path {
        let as_file: File<FileSourceFile, _> = path.into();
        config = config.add_source(as_file.required(true));
    } else {
        for name in DEFAULT_FILE_NAMES {
            config = config.add_source(File::with_name(name).required(false));
        }
    }

    config = env_overrides.apply_overrides(config)?;

    Ok(config.build()?.try_deserialize::<UsageCliConfig>()?)
}

pub fn parse_yaml_config(config_raw: &str) -> Result<UsageCliConfig, UsageConfigError> {
    Ok(Config::builder()
        .add_source(File::from_str(config_raw, FileFormat::Yaml))
        .build()?
        .try_deserialize::<UsageCliConfig>()?)
}
