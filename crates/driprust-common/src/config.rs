//! Configuration for DripRust

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Drip engine configuration
    #[serde(default)]
    pub drip: DripConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Drip engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DripConfig {
    /// Minutes to wait before re-evaluating a responded enrollment
    #[serde(default = "default_resume_check_minutes")]
    pub resume_check_minutes: i64,

    /// Base URL for registration links embedded in final-asset messages
    #[serde(default = "default_registration_base_url")]
    pub registration_base_url: String,

    /// Default quiet-hours window applied to tenants without an override
    #[serde(default)]
    pub quiet_hours: QuietHoursSettings,
}

impl Default for DripConfig {
    fn default() -> Self {
        Self {
            resume_check_minutes: default_resume_check_minutes(),
            registration_base_url: default_registration_base_url(),
            quiet_hours: QuietHoursSettings::default(),
        }
    }
}

fn default_resume_check_minutes() -> i64 {
    1440
}

fn default_registration_base_url() -> String {
    "https://app.driprust.example/register".to_string()
}

/// Quiet-hours window settings
///
/// Times are tenant-local wall clock; the offset maps them to UTC.
/// A window with `start == end` disables quiet hours entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHoursSettings {
    /// Local time at which quiet hours begin
    #[serde(default = "default_quiet_start")]
    pub start: NaiveTime,

    /// Local time at which quiet hours end
    #[serde(default = "default_quiet_end")]
    pub end: NaiveTime,

    /// Offset of tenant-local time from UTC, in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for QuietHoursSettings {
    fn default() -> Self {
        Self {
            start: default_quiet_start(),
            end: default_quiet_end(),
            utc_offset_minutes: 0,
        }
    }
}

fn default_quiet_start() -> NaiveTime {
    NaiveTime::from_hms_opt(21, 0, 0).unwrap_or_default()
}

fn default_quiet_end() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/driprust/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let drip = DripConfig::default();
        assert_eq!(drip.resume_check_minutes, 1440);

        let quiet = QuietHoursSettings::default();
        assert_eq!(quiet.start, NaiveTime::from_hms_opt(21, 0, 0).unwrap());
        assert_eq!(quiet.end, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(quiet.utc_offset_minutes, 0);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
url = "postgres://localhost/driprust"

[drip]
resume_check_minutes = 720
registration_base_url = "https://signup.example.com/r"

[drip.quiet_hours]
start = "20:30:00"
end = "09:00:00"
utc_offset_minutes = -300

[logging]
level = "debug"
format = "text"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/driprust");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.drip.resume_check_minutes, 720);
        assert_eq!(
            config.drip.quiet_hours.start,
            NaiveTime::from_hms_opt(20, 30, 0).unwrap()
        );
        assert_eq!(config.drip.quiet_hours.utc_offset_minutes, -300);
        assert_eq!(config.logging.level, "debug");
    }
}
