//! Configuration for a log buffer and the process's logging.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use termlog_buffer::{BufferError, LogBuffer, LogBufferConfig};

use crate::logging::LoggingConfig;

/// Errors raised while loading a [`TermlogConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config is not valid JSON or has unknown fields.
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The log buffer geometry is invalid.
    #[error("invalid log buffer config: {0}")]
    Buffer(#[from] BufferError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
///
/// ```json
/// {
///   "log_buffer": { "term_length": 65536, "partition_count": 4, "initial_term_id": 0 },
///   "logging": { "format": "json", "level": "debug" }
/// }
/// ```
///
/// Every field is optional and falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TermlogConfig {
    pub log_buffer: LogBufferConfig,
    pub logging: LoggingConfig,
}

impl TermlogConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.log_buffer.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Allocate a log buffer with the configured geometry.
    pub fn build_log_buffer(&self) -> Result<LogBuffer> {
        Ok(LogBuffer::new(&self.log_buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogFormat, LogLevel};

    #[test]
    fn empty_object_takes_defaults() {
        let config = TermlogConfig::from_json_str("{}").unwrap();
        assert_eq!(config, TermlogConfig::default());
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn parses_full_config() {
        let config = TermlogConfig::from_json_str(
            r#"{
                "log_buffer": { "term_length": 131072, "partition_count": 2, "initial_term_id": 7 },
                "logging": { "format": "json", "level": "trace" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.log_buffer.term_length, 131_072);
        assert_eq!(config.log_buffer.partition_count, 2);
        assert_eq!(config.log_buffer.initial_term_id, 7);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, LogLevel::Trace);

        let log = config.build_log_buffer().unwrap();
        assert_eq!(log.term_length(), 131_072);
        assert_eq!(log.initial_term_id(), 7);
    }

    #[test]
    fn rejects_bad_geometry() {
        let err = TermlogConfig::from_json_str(r#"{ "log_buffer": { "term_length": 1000 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Buffer(BufferError::InvalidTermLength { length: 1000, .. })
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = TermlogConfig::from_json_str(r#"{ "log_buffr": {} }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let path = std::env::temp_dir().join(format!(
            "termlog-missing-{}.json",
            std::process::id()
        ));
        let err = TermlogConfig::from_path(&path).unwrap_err();
        match err {
            ConfigError::Io { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("termlog-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "log_buffer": { "initial_term_id": 42 } }"#).unwrap();

        let config = TermlogConfig::from_path(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.log_buffer.initial_term_id, 42);
    }
}
