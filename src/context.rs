//! # FFmpeg Context
//!
//! Questo modulo sostituisce lo stato globale del processo (path del binario e
//! cache delle capabilities) con un oggetto condiviso, passato esplicitamente.
//!
//! ## Responsabilità:
//! - Conserva il path risolto dell'eseguibile ffmpeg e la `Config` di runtime
//! - Cache read-mostly delle `Capabilities`, scritta al massimo una volta per binario
//! - Inizializzazione esplicita (`init`) e invalidazione/refresh espliciti
//! - Probe delle capabilities in background al primo utilizzo
//!
//! ## Esempio:
//! ```rust,no_run
//! use media_converter::{Config, FfmpegContext};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let ctx = FfmpegContext::resolve(Config::default())?;
//! ctx.init().await;
//! println!("encoders: {:?}", ctx.capabilities_or_empty().encode);
//! # Ok(())
//! # }
//! ```

use crate::capabilities::{self, Capabilities};
use crate::config::Config;
use crate::tool_resolver::ToolPathResolver;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

/// Shared ffmpeg binary path plus its capabilities cache
#[derive(Debug)]
pub struct FfmpegContext {
    bin: PathBuf,
    config: Config,
    capabilities: RwLock<Option<Arc<Capabilities>>>,
    probing: AtomicBool,
}

impl FfmpegContext {
    /// Context for an already resolved binary
    pub fn new(bin: impl Into<PathBuf>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            bin: bin.into(),
            config,
            capabilities: RwLock::new(None),
            probing: AtomicBool::new(false),
        })
    }

    /// Resolves the binary from the configuration, environment or PATH
    pub fn resolve(config: Config) -> Result<Arc<Self>> {
        config.validate()?;
        let bin = ToolPathResolver::new()
            .resolve_ffmpeg(config.ffmpeg_path.as_deref())
            .ok_or_else(|| anyhow::anyhow!("ffmpeg executable not found, set FFMPEG_PATH or --ffmpeg"))?;
        info!("Using ffmpeg at {}", bin.display());
        Ok(Self::new(bin, config))
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cached capabilities, `None` until a probe succeeded
    pub fn capabilities(&self) -> Option<Arc<Capabilities>> {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cached capabilities, or an empty set that skips format checks
    pub fn capabilities_or_empty(&self) -> Arc<Capabilities> {
        self.capabilities().unwrap_or_default()
    }

    /// Probes the capabilities and logs a summary
    pub async fn init(&self) -> Option<Arc<Capabilities>> {
        let caps = self.refresh_capabilities().await?;
        info!(
            "ffmpeg supported info: {} encodes, {} decodes, modules: {}",
            caps.encode.len(),
            caps.decode.len(),
            caps.modules.join(" ")
        );
        Some(caps)
    }

    /// Re-runs the capabilities probe, replacing the cache on success.
    ///
    /// On failure the error is logged and the previous cache is kept.
    pub async fn refresh_capabilities(&self) -> Option<Arc<Capabilities>> {
        match capabilities::probe(self).await {
            Ok(caps) => {
                let caps = Arc::new(caps);
                *self.capabilities.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&caps));
                Some(caps)
            }
            Err(e) => {
                error!("Unable to init ffmpeg supported info: {} (code {})", e, e.code());
                self.capabilities()
            }
        }
    }

    /// Drops the cached capabilities
    pub fn invalidate(&self) {
        debug!("Invalidating capabilities cache");
        *self.capabilities.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Starts a capabilities probe on the runtime unless one is cached or running
    pub fn ensure_capabilities_in_background(self: &Arc<Self>) {
        if self.capabilities().is_some() || self.probing.swap(true, Ordering::AcqRel) {
            return;
        }

        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            ctx.refresh_capabilities().await;
            ctx.probing.store(false, Ordering::Release);
        });
    }
}
