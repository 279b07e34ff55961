//! Store-wide defaults.
//!
//! A [`StoreConfig`] seeds [`WriteOptions`](crate::store::WriteOptions) and
//! [`ReadOptions`](crate::store::ReadOptions). It can be built in code, read
//! from a JSON file, or taken from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `IRONSHARD_NUM_LOCALES` | `num_locales` |
//! | `IRONSHARD_STRICT_TYPES` | `strict_types` |
//! | `IRONSHARD_COMPRESSION` | `compression` |
//!
//! Unset variables keep their defaults.

use crate::error::{Result, StoreError};
use crate::io::compression::BlockFilter;
use crate::io::csv::DEFAULT_DELIMITER;
use crate::io::parquet::Compression;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_NUM_LOCALES: &str = "IRONSHARD_NUM_LOCALES";
pub const ENV_STRICT_TYPES: &str = "IRONSHARD_STRICT_TYPES";
pub const ENV_COMPRESSION: &str = "IRONSHARD_COMPRESSION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Shards per write.
    pub num_locales: usize,
    /// Reject width disagreements between shards.
    pub strict_types: bool,
    /// Skip unreadable shards instead of failing.
    pub allow_errors: bool,
    /// Parquet column codec for new files.
    pub compression: Compression,
    /// Hierarchical block filter for new blocks.
    pub block_filter: BlockFilter,
    /// Delimited text field separator.
    pub delimiter: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            num_locales: 1,
            strict_types: true,
            allow_errors: false,
            compression: Compression::default(),
            block_filter: BlockFilter::default(),
            delimiter: DEFAULT_DELIMITER.to_owned(),
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by the process environment.
    ///
    /// # Errors
    /// [`StoreError::InvalidArgument`] for unparsable values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup(variable)`.
    ///
    /// # Errors
    /// As for [`StoreConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_NUM_LOCALES) {
            cfg.num_locales = v
                .trim()
                .parse()
                .ok()
                .filter(|&n: &usize| n > 0)
                .ok_or_else(|| {
                    StoreError::invalid(format!("{ENV_NUM_LOCALES}={v:?} is not a positive integer"))
                })?;
        }
        if let Some(v) = lookup(ENV_STRICT_TYPES) {
            cfg.strict_types = parse_flag(&v).ok_or_else(|| {
                StoreError::invalid(format!("{ENV_STRICT_TYPES}={v:?} is not a boolean"))
            })?;
        }
        if let Some(v) = lookup(ENV_COMPRESSION) {
            cfg.compression = Compression::from_name(&v)?;
        }
        Ok(cfg)
    }

    /// Read a JSON config file; missing fields keep their defaults.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Format`] if it is not valid JSON for this type.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| StoreError::format(path, e))
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
