//! # Media Converter Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Probe dei file media tramite l'output testuale di ffmpeg
//! - Costruzione di comandi ffmpeg senza flag duplicati, con filtri e calcolo dimensioni
//! - Gestione del ciclo di vita del processo: progress live, abort e pulizia dell'output
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione di runtime e validazione
//! - `error`: Catalogo degli errori con codici numerici
//! - `tool_resolver` / `context`: Risoluzione del binario e cache delle capabilities
//! - `capabilities` / `probe`: Parsing dell'output di ffmpeg
//! - `dimension` / `watermark` / `command`: Costruzione del comando
//! - `process` / `progress`: Esecuzione, streaming e avanzamento
//! - `media` / `presets` / `session`: Descrittore del file e operazioni predefinite
//! - `file_manager` / `json_output`: Output su disco e messaggi JSON
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use media_converter::{Config, FfmpegContext, MediaSession};
//! use std::path::Path;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let ctx = FfmpegContext::resolve(Config::default())?;
//! ctx.init().await;
//!
//! let mut session = MediaSession::new(ctx);
//! session.select_input(Path::new("movie.mp4")).await?;
//! let conversion = session.extract_audio_to_mp3(Path::new("movie.mp3"))?;
//! let output = conversion.wait_with_progress(|p| println!("{:.0}%", p)).await?;
//! println!("saved {}", output.display());
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod command;
pub mod config;
pub mod context;
pub mod dimension;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod media;
pub mod presets;
pub mod probe;
pub mod process;
pub mod progress;
pub mod session;
pub mod tool_resolver;
pub mod utils;
pub mod watermark;

pub use capabilities::Capabilities;
pub use command::CommandPlan;
pub use config::Config;
pub use context::FfmpegContext;
pub use dimension::{DimensionResult, SizeSpec};
pub use error::{MediaError, Result};
pub use media::MediaFile;
pub use presets::ExtractFramesSettings;
pub use probe::MediaMetadata;
pub use process::{Conversion, ProcessState, RunningProcess};
pub use session::MediaSession;
pub use utils::TimeSpec;
pub use watermark::{WatermarkPosition, WatermarkSettings};
