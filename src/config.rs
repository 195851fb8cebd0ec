// src/config.rs

//! Configuration loading utilities.
//!
//! The process builds one [`Config`] at start-up: file (or defaults),
//! then environment overrides, then validation.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "data/config.toml";

/// Load configuration from a TOML file.
///
/// An explicitly requested file must load; the default path falls back to
/// built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .map_err(|e| AppError::config(format!("Failed to load {path:?}: {e}"))),
        None => Ok(Config::load_or_default(DEFAULT_CONFIG_PATH)),
    }
}

/// Load, apply environment overrides and validate.
pub fn load_all(path: Option<&Path>) -> Result<Config> {
    let mut config = load_config(path)?;
    config.apply_env_overrides();
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid configuration: {e}")))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/config.toml"))).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [crawler]
            max_concurrent = 2

            [[sites]]
            name = "テスト"
            url = "https://example.com/feed.xml"
            region = "飯田市"
            type = "rss"
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.crawler.max_concurrent, 2);
        assert_eq!(config.sites.len(), 1);
        assert!(config.validate().is_ok());
    }
}
