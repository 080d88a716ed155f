//! # Media Converter - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (`RUST_LOG` o `--verbose`)
//! - Caricamento della configurazione e risoluzione del binario ffmpeg
//! - Esecuzione del sottocomando con progress bar o eventi JSON
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging
//! 3. Carica la `Config` (file JSON opzionale) e applica gli override della CLI
//! 4. Risolve ffmpeg, analizza il file e avvia la conversione
//! 5. Ctrl-C interrompe la conversione e rimuove l'output parziale
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-converter convert movie.avi movie.mp4 --vcodec libx264 --size 1280x? --verbose
//! media-converter extract-frames movie.mp4 frames/ --every-n-seconds 5
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use media_converter::file_manager::FileManager;
use media_converter::json_output::JsonMessage;
use media_converter::probe;
use media_converter::progress::ProgressManager;
use media_converter::{
    Config, Conversion, ExtractFramesSettings, FfmpegContext, MediaFile, MediaSession, TimeSpec, WatermarkPosition,
    WatermarkSettings,
};

#[derive(Parser)]
#[command(name = "media-converter")]
#[command(about = "Probe media files and convert them with ffmpeg")]
struct Cli {
    /// Path to the ffmpeg executable
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output progress and results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the metadata of a media file
    Probe { input: PathBuf },

    /// List the formats and modules supported by ffmpeg
    Formats,

    /// Convert a media file
    Convert(ConvertArgs),

    /// Extract the audio track to mp3
    ExtractAudio { input: PathBuf, output: PathBuf },

    /// Extract frames as jpg images
    ExtractFrames(FramesArgs),

    /// Overlay an image on a video
    Watermark(WatermarkArgs),
}

#[derive(Args)]
struct ConvertArgs {
    input: PathBuf,
    output: PathBuf,

    /// Output container format
    #[arg(long)]
    format: Option<String>,

    #[arg(long)]
    vcodec: Option<String>,

    /// Video bitrate in kb/s
    #[arg(long)]
    vbitrate: Option<u32>,

    #[arg(long)]
    framerate: Option<f64>,

    /// Start time (HH:MM:SS)
    #[arg(long)]
    start: Option<TimeSpec>,

    /// Duration (HH:MM:SS)
    #[arg(long)]
    duration: Option<TimeSpec>,

    /// Display aspect ratio, e.g. 16:9
    #[arg(long)]
    aspect: Option<String>,

    /// Output size: 640x?, ?x480, 50% or 1280x720
    #[arg(long)]
    size: Option<String>,

    #[arg(long)]
    keep_pixel_aspect: bool,

    /// Pad to the aspect ratio of the new size
    #[arg(long)]
    keep_aspect: bool,

    /// Padding color used with --keep-aspect
    #[arg(long)]
    padding: Option<String>,

    #[arg(long)]
    acodec: Option<String>,

    /// Audio sample rate in Hz
    #[arg(long)]
    frequency: Option<u32>,

    /// 1 (mono) or 2 (stereo)
    #[arg(long)]
    channels: Option<u32>,

    /// Audio bitrate in kb/s
    #[arg(long)]
    abitrate: Option<u32>,

    #[arg(long)]
    aquality: Option<u32>,

    #[arg(long)]
    no_audio: bool,

    #[arg(long)]
    no_video: bool,
}

#[derive(Args)]
struct FramesArgs {
    input: PathBuf,
    folder: PathBuf,

    #[arg(long)]
    start: Option<TimeSpec>,

    #[arg(long)]
    duration: Option<TimeSpec>,

    #[arg(long)]
    frame_rate: Option<f64>,

    #[arg(long)]
    size: Option<String>,

    /// Total number of frames
    #[arg(long)]
    number: Option<u32>,

    #[arg(long)]
    every_n_frames: Option<u32>,

    #[arg(long)]
    every_n_seconds: Option<f64>,

    #[arg(long)]
    every_n_percentage: Option<f64>,

    /// File name, supports %t %s %x %y
    #[arg(long)]
    file_name: Option<String>,

    /// Extra settings as a JSON object
    #[arg(long)]
    options: Option<String>,
}

#[derive(Args)]
struct WatermarkArgs {
    input: PathBuf,
    image: PathBuf,

    #[arg(short, long)]
    output: Option<PathBuf>,

    /// NE, NC, NW, SE, SC, SW, C, CE or CW
    #[arg(long, default_value = "SW")]
    position: WatermarkPosition,

    #[arg(long)]
    margin_north: Option<i64>,

    #[arg(long)]
    margin_south: Option<i64>,

    #[arg(long)]
    margin_east: Option<i64>,

    #[arg(long)]
    margin_west: Option<i64>,

    /// Extra settings as a JSON object
    #[arg(long)]
    options: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli).await?;
    let json = config.json_output;

    match run(cli.command, config).await {
        Err(e) if json => {
            JsonMessage::error(&e).emit();
            std::process::exit(1);
        }
        other => other,
    }
}

async fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().or_else(Config::default_path);
    let mut config = match path {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };

    if let Some(ref ffmpeg) = cli.ffmpeg {
        config.ffmpeg_path = Some(ffmpeg.clone());
    }
    config.json_output |= cli.json;
    config.validate()?;
    Ok(config)
}

async fn run(command: Command, config: Config) -> Result<()> {
    let json = config.json_output;
    let ctx = FfmpegContext::resolve(config)?;

    match command {
        Command::Probe { input } => {
            let metadata = probe::probe_file(&ctx, &input).await?;
            if json {
                JsonMessage::Probe {
                    path: input,
                    metadata: &metadata,
                }
                .emit();
            } else {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            }
        }

        Command::Formats => {
            let caps = ctx
                .init()
                .await
                .ok_or_else(|| anyhow::anyhow!("Unable to read the formats supported by {}", ctx.bin().display()))?;
            if json {
                JsonMessage::Capabilities { capabilities: &caps }.emit();
            } else {
                println!("Modules: {}", caps.modules.join(" "));
                println!("Encode:  {}", caps.encode.join(" "));
                println!("Decode:  {}", caps.decode.join(" "));
                println!("Codecs:  {}", caps.codecs.join(" "));
            }
        }

        Command::Convert(args) => {
            let mut session = open_session(&ctx, &args.input).await?;
            let conversion = session.convert(&args.output, |media| apply_convert_args(media, &args))?;
            let output = drive(conversion, &args.output, json).await?;
            report(vec![output], json).await;
        }

        Command::ExtractAudio { input, output } => {
            let mut session = open_session(&ctx, &input).await?;
            let conversion = session.extract_audio_to_mp3(&output)?;
            let output = drive(conversion, &output, json).await?;
            report(vec![output], json).await;
        }

        Command::ExtractFrames(args) => {
            let settings = frames_settings(&args)?;
            let mut session = open_session(&ctx, &args.input).await?;
            let conversion = session.extract_frames_to_jpg(&args.folder, &settings)?;
            let frames = drive(conversion, &args.folder, json).await?;
            report(frames, json).await;
        }

        Command::Watermark(args) => {
            let settings = watermark_settings(&args)?;
            let mut session = open_session(&ctx, &args.input).await?;
            let conversion = session.add_watermark(&args.image, args.output.as_deref(), &settings)?;
            let label = args.output.clone().unwrap_or_else(|| args.input.clone());
            let output = drive(conversion, &label, json).await?;
            report(vec![output], json).await;
        }
    }

    Ok(())
}

/// Probes the capabilities, then selects `input`
async fn open_session(ctx: &Arc<FfmpegContext>, input: &Path) -> Result<MediaSession> {
    if ctx.init().await.is_none() {
        warn!("Format and codec checks are disabled");
    }
    let mut session = MediaSession::new(Arc::clone(ctx));
    let media = session.select_input(input).await?;
    debug!("Probed {}: {:?}", input.display(), media.metadata().duration);
    Ok(session)
}

fn apply_convert_args(media: &mut MediaFile, args: &ConvertArgs) -> media_converter::Result<()> {
    if args.no_video {
        media.disable_video();
    }
    if args.no_audio {
        media.disable_audio();
    }
    if let Some(ref format) = args.format {
        media.set_video_format(format)?;
    }
    if let Some(ref codec) = args.vcodec {
        media.set_video_codec(codec)?;
    }
    if let Some(bitrate) = args.vbitrate {
        media.set_video_bitrate(bitrate);
    }
    if let Some(framerate) = args.framerate {
        media.set_video_framerate(framerate);
    }
    if let Some(start) = args.start {
        media.set_start_time(start);
    }
    if let Some(duration) = args.duration {
        media.set_duration(duration);
    }
    if let Some(ref aspect) = args.aspect {
        media.set_video_aspect(aspect);
    }
    if let Some(ref size) = args.size {
        media.set_video_size(size, args.keep_pixel_aspect, args.keep_aspect, args.padding.as_deref())?;
    }
    if let Some(ref codec) = args.acodec {
        media.set_audio_codec(codec)?;
    }
    if let Some(frequency) = args.frequency {
        media.set_audio_frequency(frequency);
    }
    if let Some(channels) = args.channels {
        media.set_audio_channels(channels)?;
    }
    if let Some(bitrate) = args.abitrate {
        media.set_audio_bitrate(bitrate);
    }
    if let Some(quality) = args.aquality {
        media.set_audio_quality(quality);
    }
    Ok(())
}

/// Flags merged with `--options`, which wins on shared keys
fn overrides_with_options(
    flags: Vec<(&str, Option<serde_json::Value>)>,
    options: Option<&str>,
) -> Result<serde_json::Value> {
    let mut overrides = serde_json::Map::new();
    for (key, value) in flags {
        if let Some(value) = value {
            overrides.insert(key.to_string(), value);
        }
    }

    if let Some(options) = options {
        match serde_json::from_str(options)? {
            serde_json::Value::Object(extra) => overrides.extend(extra),
            _ => anyhow::bail!("--options must be a JSON object"),
        }
    }
    Ok(serde_json::Value::Object(overrides))
}

fn watermark_settings(args: &WatermarkArgs) -> Result<WatermarkSettings> {
    let flags = vec![
        ("position", Some(json!(args.position.to_string()))),
        ("margin_north", args.margin_north.map(|v| json!(v))),
        ("margin_south", args.margin_south.map(|v| json!(v))),
        ("margin_east", args.margin_east.map(|v| json!(v))),
        ("margin_west", args.margin_west.map(|v| json!(v))),
    ];
    let overrides = overrides_with_options(flags, args.options.as_deref())?;
    Ok(WatermarkSettings::from_overrides(&overrides)?)
}

/// Flags first, then `--options` on top
fn frames_settings(args: &FramesArgs) -> Result<ExtractFramesSettings> {
    let flags = vec![
        ("start_time", args.start.map(|t| json!(t.seconds()))),
        ("duration_time", args.duration.map(|t| json!(t.seconds()))),
        ("frame_rate", args.frame_rate.map(|v| json!(v))),
        ("size", args.size.as_ref().map(|v| json!(v))),
        ("number", args.number.map(|v| json!(v))),
        ("every_n_frames", args.every_n_frames.map(|v| json!(v))),
        ("every_n_seconds", args.every_n_seconds.map(|v| json!(v))),
        ("every_n_percentage", args.every_n_percentage.map(|v| json!(v))),
        ("file_name", args.file_name.as_ref().map(|v| json!(v))),
    ];
    let overrides = overrides_with_options(flags, args.options.as_deref())?;
    Ok(ExtractFramesSettings::from_overrides(&overrides)?)
}

/// Waits for the conversion showing progress; Ctrl-C aborts it
async fn drive<T: Send + 'static>(conversion: Conversion<T>, label: &Path, json: bool) -> Result<T> {
    let process = conversion.process().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && process.abort() {
            warn!("Interrupted, conversion aborted");
        }
    });

    let progress = if json {
        None
    } else {
        Some(ProgressManager::new(&label.display().to_string()))
    };

    let result = conversion
        .wait_with_progress(|percent| match progress {
            Some(ref bar) => bar.set_percent(percent),
            None => JsonMessage::progress(percent).emit(),
        })
        .await;
    interrupt.abort();

    if let Some(ref bar) = progress {
        match result {
            Ok(_) => bar.finish("done"),
            Err(ref e) => bar.abandon(&e.to_string()),
        }
    }
    Ok(result?)
}

async fn report(outputs: Vec<PathBuf>, json: bool) {
    if json {
        JsonMessage::complete(outputs).emit();
        return;
    }

    for output in &outputs {
        match FileManager::get_file_info(output).await {
            Ok((size, _)) => info!("Saved {} ({})", output.display(), FileManager::format_size(size)),
            Err(_) => info!("Saved {}", output.display()),
        }
    }
}
