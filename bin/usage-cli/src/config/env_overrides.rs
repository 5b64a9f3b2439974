use config::{builder::BuilderState, ConfigBuilder, ConfigError};
use envconfig::Envconfig;
use tracing::debug;

#[derive(Envconfig)]
pub struct EnvVarOverrides {
    // Logger overrides, validated when the configuration is deserialized
    #[envconfig(from = "LOG_LEVEL")]
    pub log_level: Option<String>,
    #[envconfig(from = "LOG_FORMAT")]
    pub log_format: Option<String>,
    #[envconfig(from = "LOG_FILTER")]
    pub log_filter: Option<String>,

    // Collector overrides
    #[envconfig(from = "HIVE_USAGE_PROCESS_VARIABLES")]
    pub process_variables: Option<bool>,

    // Usage reporting overrides
    #[envconfig(from = "HIVE_ACCESS_TOKEN")]
    pub hive_access_token: Option<String>,
    #[envconfig(from = "HIVE_TARGET")]
    pub hive_target: Option<String>,
    #[envconfig(from = "HIVE_USAGE_ENDPOINT")]
    pub hive_usage_endpoint: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvVarOverridesError {
    #[error("Failed to override configuration: {0}")]
    FailedToOverrideConfig(#[from] ConfigError),
}

impl EnvVarOverrides {
    pub fn apply_overrides<T: BuilderState>(
        mut self,
        mut config: ConfigBuilder<T>,
    ) -> Result<ConfigBuilder<T>, EnvVarOverridesError> {
        if let Some(log_level) = self.log_level.take() {
            debug!("[config-override] 'log.level' = {}", log_level);
            config = config.set_override("log.level", log_level.to_lowercase())?;
        }
        if let Some(log_format) = self.log_format.take() {
            debug!("[config-override] 'log.format' = {}", log_format);
            config = config.set_override("log.format", log_format.to_lowercase())?;
        }
        if let Some(log_filter) = self.log_filter.take() {
            debug!("[config-override] 'log.filter' = {:?}", log_filter);
            config = config.set_override("log.filter", log_filter)?;
        }

        if let Some(process_variables) = self.process_variables.take() {
            debug!(
                "[config-override] 'collector.process_variables' = {}",
                process_variables
            );
            config = config.set_override("collector.process_variables", process_variables)?;
        }

        // the token itself is never logged
        if let Some(hive_access_token) = self.hive_access_token.take() {
            debug!("[config-override] 'usage_reporting.access_token' = <redacted>");
            config = config.set_override("usage_reporting.access_token", hive_access_token)?;
        }
        if let Some(hive_target) = self.hive_target.take() {
            debug!("[config-override] 'usage_reporting.target_id' = {}", hive_target);
            config = config.set_override("usage_reporting.target_id", hive_target)?;
        }
        if let Some(endpoint) = self.hive_usage_endpoint.take() {
            debug!("[config-override] 'usage_reporting.endpoint' = {}", endpoint);
            config = config.set_override("usage_reporting.endpoint", endpoint)?;
        }

        Ok(config)
    }
}
