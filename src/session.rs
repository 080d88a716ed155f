//! # Media Session
//!
//! Punto di ingresso per la selezione di un file e l'avvio delle conversioni.
//!
//! ## Responsabilità:
//! - Possiede un `FfmpegContext` condiviso
//! - Tiene al più un file selezionato e al più una conversione "corrente"
//! - Espone le operazioni dei preset sul file selezionato
//!
//! Ogni operazione senza file selezionato fallisce con `NoInputSelected`.
//! Avviare una nuova conversione sostituisce quella corrente senza
//! interromperla.

use crate::context::FfmpegContext;
use crate::error::{MediaError, Result};
use crate::file_manager::FileManager;
use crate::media::MediaFile;
use crate::presets::{self, ExtractFramesSettings};
use crate::process::{Conversion, RunningProcess};
use crate::watermark::WatermarkSettings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct MediaSession {
    ctx: Arc<FfmpegContext>,
    input: Option<MediaFile>,
    current: Option<RunningProcess>,
}

impl MediaSession {
    pub fn new(ctx: Arc<FfmpegContext>) -> Self {
        Self {
            ctx,
            input: None,
            current: None,
        }
    }

    pub fn context(&self) -> &Arc<FfmpegContext> {
        &self.ctx
    }

    /// Probes `path` and makes it the selected input
    pub async fn select_input(&mut self, path: &Path) -> Result<&MediaFile> {
        let media = MediaFile::open(&self.ctx, path).await?;
        info!("Selected {}", path.display());
        Ok(self.input.insert(media))
    }

    pub fn unselect_input(&mut self) {
        if self.input.take().is_some() {
            debug!("Input unselected");
        }
    }

    pub fn selected(&self) -> Option<&MediaFile> {
        self.input.as_ref()
    }

    /// Process of the latest conversion, finished or not
    pub fn current_conversion(&self) -> Option<&RunningProcess> {
        self.current.as_ref()
    }

    /// Aborts the latest conversion. Returns false if none was running.
    pub fn abort_current_conversion(&self) -> bool {
        self.current.as_ref().is_some_and(RunningProcess::abort)
    }

    fn require_input(&self) -> Result<&MediaFile> {
        self.input.as_ref().ok_or(MediaError::NoInputSelected)
    }

    fn track<T: Send + 'static>(&mut self, conversion: Conversion<T>) -> Conversion<T> {
        self.current = Some(conversion.process().clone());
        conversion
    }

    pub fn extract_audio_to_mp3(&mut self, destination: &Path) -> Result<Conversion<PathBuf>> {
        let conversion = presets::extract_sound_to_mp3(&self.ctx, self.require_input()?, destination)?;
        Ok(self.track(conversion))
    }

    /// Extracts frames into `folder`, resolving to the files it contains
    pub fn extract_frames_to_jpg(
        &mut self,
        folder: &Path,
        settings: &ExtractFramesSettings,
    ) -> Result<Conversion<Vec<PathBuf>>> {
        let conversion = presets::extract_frames_to_jpg(&self.ctx, self.require_input()?, folder, settings)?
            .map_output(|folder| FileManager::list_output_files(&folder));
        Ok(self.track(conversion))
    }

    pub fn add_watermark(
        &mut self,
        watermark: &Path,
        destination: Option<&Path>,
        settings: &WatermarkSettings,
    ) -> Result<Conversion<PathBuf>> {
        let conversion = presets::add_watermark(&self.ctx, self.require_input()?, watermark, destination, settings)?;
        Ok(self.track(conversion))
    }

    /// Generic conversion: `configure` sets options on a fresh copy of the input
    pub fn convert<F>(&mut self, destination: &Path, configure: F) -> Result<Conversion<PathBuf>>
    where
        F: FnOnce(&mut MediaFile) -> Result<()>,
    {
        let mut media = self.require_input()?.fresh();
        configure(&mut media)?;
        let conversion = media.save(&self.ctx, destination)?;
        Ok(self.track(conversion))
    }
}
