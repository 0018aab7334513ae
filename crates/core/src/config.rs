use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ATTRIBUTION_EXPRESS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    /// Lookback window applied to models created without explicit settings.
    #[serde(default = "default_lookback_days")]
    pub default_lookback_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Emit a progress log line every N processed conversions.
    #[serde(default = "default_progress_log_interval")]
    pub progress_log_interval: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_lookback_days() -> u32 {
    30
}
fn default_progress_log_interval() -> usize {
    500
}
fn default_log_format() -> LogFormat {
    LogFormat::Json
}
fn default_log_filter() -> String {
    "attribution_express=info,attribution_engine=info".to_string()
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            default_lookback_days: default_lookback_days(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            progress_log_interval: default_progress_log_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            filter: default_log_filter(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            attribution: AttributionConfig::default(),
            report: ReportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ATTRIBUTION_EXPRESS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
