use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;

use crate::error::Error;
use crate::hasher::ChecksumKind;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub root_paths: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// "sha1" or "md5". Only consulted when creating a new store; an
    /// existing store keeps the algorithm it was created with.
    #[serde(default = "default_checksum")]
    pub checksum: String,
}

fn default_db_path() -> String {
    "undup.db".to_string()
}

fn default_checksum() -> String {
    "sha1".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            root_paths: Vec::new(),
            ignore_patterns: Vec::new(),
            checksum: default_checksum(),
        }
    }
}

impl AppConfig {
    pub fn checksum_kind(&self) -> Result<ChecksumKind, Error> {
        self.checksum.parse()
    }
}

/// Load `Undup.toml` from the working directory when present, falling back
/// to defaults otherwise.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Undup").required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, "undup.db");
        assert_eq!(config.checksum_kind().unwrap(), ChecksumKind::Sha1);
        assert!(config.root_paths.is_empty());
    }

    #[test]
    fn unknown_checksum_is_rejected() {
        let config = AppConfig {
            checksum: "crc32".to_string(),
            ..AppConfig::default()
        };
        assert!(config.checksum_kind().is_err());
    }
}
