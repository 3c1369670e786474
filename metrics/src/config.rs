use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// The name of the service. Should be the same as the Cargo package name.
    pub service_name: String,
    /// The version of the service. Should be the same as the Cargo package version.
    pub version: String,
    /// How to print log lines to STDOUT
    pub log_format: LogFormat,
    /// Whether to color log lines. Ignored by the JSON format.
    pub ansi: bool,
}

/// Format of log events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogFormat {
    // Print log lines on multiple lines
    #[default]
    MultiLine,
    // Print log lines on a single line
    SingleLine,
    // Print logs a newline delimited JSON
    Json,
}

impl Config {
    pub fn with_service_name(mut self, name: String) -> Self {
        self.service_name = name;
        self
    }
    pub fn with_version(mut self, version: String) -> Self {
        self.version = version;
        self
    }
    pub fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            version: "unknown".to_string(),
            log_format: LogFormat::default(),
            ansi: true,
        }
    }
}
