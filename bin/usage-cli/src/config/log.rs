use serde::{Deserialize, Serialize};

/// Crates whose events follow `level`. Everything else only logs warnings and errors,
/// unless `level` is `trace`.
const OWN_TARGETS: [&str; 2] = ["hive_usage_cli", "hive_usage_sdk"];

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Can also be set via the `LOG_LEVEL` environment variable.
    #[serde(default)]
    pub level: LogLevel,

    /// Can also be set via the `LOG_FORMAT` environment variable.
    #[serde(default)]
    pub format: LogFormat,

    /// A raw `EnvFilter` directive, replaces the one derived from `level`.
    ///
    /// Can also be set via the `LOG_FILTER` environment variable.
    #[serde(default)]
    pub filter: Option<String>,
}

impl LoggingConfig {
    pub fn filter_directive(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None => self.level.filter_directive(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn filter_directive(&self) -> String {
        let level = match self {
            LogLevel::Off => return "off".to_string(),
            LogLevel::Trace => return "trace".to_string(),
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };

        let mut directives: Vec<String> = OWN_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect();
        directives.push("warn".to_string());
        directives.join(",")
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    PrettyTree,
    Compact,
    Json,
}
