//! Process-wide `tracing` setup.

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// How log events are rendered on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Colour text output. Ignored for JSON. Default: false.
    pub ansi: bool,
    /// Include the emitting module path (`termlog_image::image`). Default: false.
    pub with_target: bool,
}

/// Install a global stderr subscriber for `config`.
///
/// Returns false when a global subscriber was already installed; that one is
/// left in place.
#[cfg(feature = "logging")]
pub fn init_logging(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(config.level.as_filter())
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Text => builder.with_ansi(config.ansi).try_init(),
        LogFormat::Json => builder.with_ansi(false).json().try_init(),
    };
    if installed.is_ok() {
        tracing::debug!(format = ?config.format, level = ?config.level, "logging initialised");
    }
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_filters() {
        assert_eq!(LogLevel::Error.as_filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel::Warn.as_filter(), LevelFilter::WARN);
        assert_eq!(LogLevel::Trace.as_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn names_are_lowercase() {
        let level: LogLevel = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(level, LogLevel::Debug);
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
    }

    #[test]
    fn config_defaults_to_plain_warn_text() {
        let config: LoggingConfig = serde_json::from_str(r#"{ "level": "info" }"#).unwrap();
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, LogLevel::Info);
        assert!(!config.ansi);
        assert!(!config.with_target);
    }

    #[cfg(feature = "logging")]
    #[test]
    fn second_init_keeps_first_subscriber() {
        init_logging(&LoggingConfig::default());
        assert!(!init_logging(&LoggingConfig {
            format: LogFormat::Json,
            level: LogLevel::Debug,
            ..LoggingConfig::default()
        }));
    }
}
