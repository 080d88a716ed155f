//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione di runtime del convertitore.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con i parametri di invocazione di ffmpeg
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Permette override parziali con validazione stretta dei nomi delle opzioni
//!
//! ## Parametri di configurazione:
//! - `ffmpeg_path`: Path esplicito dell'eseguibile ffmpeg (default: None = risolto automaticamente)
//! - `timeout_secs`: Timeout per le invocazioni bufferizzate, in secondi (default: 0 = nessun timeout)
//! - `max_buffer`: Byte massimi conservati per stream nelle invocazioni bufferizzate (default: 200 KiB)
//! - `json_output`: Emette eventi JSON invece di progress bar (default: false)
//!
//! ## Esempio:
//! ```rust
//! use media_converter::Config;
//!
//! let config = Config {
//!     timeout_secs: 30,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use crate::error::MediaError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default cap on buffered stdout/stderr, per stream
pub const DEFAULT_MAX_BUFFER: usize = 200 * 1024;

/// Runtime configuration for ffmpeg invocations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Explicit path to the ffmpeg executable
    pub ffmpeg_path: Option<PathBuf>,
    /// Timeout for buffered runs (probe, format listing); 0 disables it
    pub timeout_secs: u64,
    /// Maximum bytes kept per stream when output is buffered
    pub max_buffer: usize,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            timeout_secs: 0,
            max_buffer: DEFAULT_MAX_BUFFER,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_buffer == 0 {
            return Err(anyhow::anyhow!("max_buffer must be greater than 0"));
        }

        if let Some(ref path) = self.ffmpeg_path {
            if path.as_os_str().is_empty() {
                return Err(anyhow::anyhow!("ffmpeg_path can not be empty"));
            }
            if path.is_dir() {
                return Err(anyhow::anyhow!("ffmpeg_path is a directory: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Timeout as a `Duration`, `None` when disabled
    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_secs > 0).then(|| std::time::Duration::from_secs(self.timeout_secs))
    }

    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("media-converter").join("config.json"))
    }

    /// Applies a partial JSON object on top of this configuration.
    ///
    /// Unknown keys are rejected with `InvalidOptionName`.
    pub fn merge_overrides(self, overrides: &serde_json::Value) -> Result<Self, MediaError> {
        crate::utils::merge_options(self, overrides)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
