use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::mail_parser::TransactionMailParser;

pub const DEFAULT_DB_PATH: &str = "poolmail.db";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Settings for a processing run. Every field is optional so a file and the
/// command line can each supply part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub db_path: Option<PathBuf>,
    pub mail_dir: Option<PathBuf>,
    pub name_amount_regex: Option<String>,
    pub expected_subject: Option<String>,
    pub log_level: Option<String>,
}

impl ProcessorConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("read config {} failed: {e}", path.to_string_lossy()))?;
        serde_json::from_str(&raw)
            .map_err(|e| format!("parse config {} failed: {e}", path.to_string_lossy()))
    }

    /// Values set in `overrides` replace the ones held here.
    pub fn merged(self, overrides: ProcessorConfig) -> Self {
        Self {
            db_path: overrides.db_path.or(self.db_path),
            mail_dir: overrides.mail_dir.or(self.mail_dir),
            name_amount_regex: non_blank(overrides.name_amount_regex)
                .or(non_blank(self.name_amount_regex)),
            expected_subject: non_blank(overrides.expected_subject)
                .or(non_blank(self.expected_subject)),
            log_level: non_blank(overrides.log_level).or(non_blank(self.log_level)),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn build_parser(&self) -> Result<TransactionMailParser, ConfigError> {
        let regex = self
            .name_amount_regex
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or(ConfigError::MissingRegex)?;
        Ok(TransactionMailParser::new(regex)?)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
