//! # Presets Module
//!
//! Operazioni predefinite costruite sopra `MediaFile`.
//!
//! ## Responsabilità:
//! - Tabelle di dimensioni, rapporti e canali audio comuni
//! - Estrazione dell'audio in mp3
//! - Estrazione dei frame in jpg con modalità di campionamento esclusive
//! - Applicazione di un watermark
//!
//! I preset lavorano sempre su una copia "fresca" del descrittore: il
//! `MediaFile` del chiamante non viene modificato.

use crate::command::CommandPlan;
use crate::context::FfmpegContext;
use crate::dimension::DimensionResult;
use crate::error::{MediaError, Result};
use crate::media::{MediaFile, MONO, STEREO};
use crate::process::Conversion;
use crate::utils::{ensure_dir, merge_options, TimeSpec};
use crate::watermark::WatermarkSettings;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

static NAME_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%[a-zA-Z]").unwrap());

/// Named frame sizes
pub const SIZES: &[(&str, &str)] = &[
    ("SQCIF", "128x96"),
    ("QCIF", "176x144"),
    ("CIF", "352x288"),
    ("4CIF", "704x576"),
    ("QQVGA", "160x120"),
    ("QVGA", "320x240"),
    ("VGA", "640x480"),
    ("SVGA", "800x600"),
    ("XGA", "1024x768"),
    ("UXGA", "1600x1200"),
    ("QXGA", "2048x1536"),
    ("SXGA", "1280x1024"),
    ("QSXGA", "2560x2048"),
    ("HSXGA", "5120x4096"),
    ("WVGA", "852x480"),
    ("WXGA", "1366x768"),
    ("WSXGA", "1600x1024"),
    ("WUXGA", "1920x1200"),
    ("WOXGA", "2560x1600"),
    ("WQSXGA", "3200x2048"),
    ("WQUXGA", "3840x2400"),
    ("WHSXGA", "6400x4096"),
    ("WHUXGA", "7680x4800"),
    ("CGA", "320x200"),
    ("EGA", "640x350"),
    ("HD480", "852x480"),
    ("HD720", "1280x720"),
    ("HD1080", "1920x1080"),
];

/// Common display ratios
pub const RATIOS: &[(&str, f64)] = &[("4:3", 1.33), ("3:2", 1.5), ("14:9", 1.56), ("16:9", 1.78), ("21:9", 2.33)];

pub const AUDIO_CHANNELS: &[(&str, u32)] = &[("mono", MONO), ("stereo", STEREO)];

/// `WxH` of a named size, case-insensitive
pub fn named_size(name: &str) -> Option<&'static str> {
    SIZES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, size)| *size)
}

pub fn audio_channel(name: &str) -> Option<u32> {
    AUDIO_CHANNELS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, channels)| *channels)
}

/// Destination of an mp3 extraction: same folder and stem, `.mp3` extension
pub fn mp3_destination(destination: &Path) -> PathBuf {
    destination.with_extension("mp3")
}

fn mp3_descriptor(media: &MediaFile) -> Result<MediaFile> {
    let mut mp3 = media.fresh();
    mp3.disable_video()
        .set_audio_frequency(44100)
        .set_audio_channels(STEREO)?
        .set_audio_bitrate(192)
        .set_audio_codec("mp3")?;
    Ok(mp3)
}

/// Extracts the audio track to a 44.1 kHz stereo 192 kb mp3.
///
/// An existing file at `destination` is removed first.
pub fn extract_sound_to_mp3(ctx: &FfmpegContext, media: &MediaFile, destination: &Path) -> Result<Conversion<PathBuf>> {
    if destination.is_file() {
        std::fs::remove_file(destination)?;
    }

    let mp3 = mp3_descriptor(media)?;
    let final_path = mp3_destination(destination);
    info!("Extracting audio of {} to {}", media.file_path().display(), final_path.display());
    mp3.save(ctx, &final_path)
}

/// Settings of a frame extraction.
///
/// Only one of `number`, `every_n_frames`, `every_n_seconds` and
/// `every_n_percentage` may be set. Zero counts as unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractFramesSettings {
    pub start_time: Option<TimeSpec>,
    pub duration_time: Option<TimeSpec>,
    pub frame_rate: Option<f64>,
    /// Defaults to the probed resolution
    pub size: Option<String>,
    pub number: Option<u32>,
    pub every_n_frames: Option<u32>,
    pub every_n_seconds: Option<f64>,
    pub every_n_percentage: Option<f64>,
    pub keep_pixel_aspect_ratio: bool,
    pub keep_aspect_ratio: bool,
    pub padding_color: Option<String>,
    /// Supports `%t` (timestamp), `%s` (size), `%x` and `%y`
    pub file_name: Option<String>,
}

impl Default for ExtractFramesSettings {
    fn default() -> Self {
        Self {
            start_time: None,
            duration_time: None,
            frame_rate: None,
            size: None,
            number: None,
            every_n_frames: None,
            every_n_seconds: None,
            every_n_percentage: None,
            keep_pixel_aspect_ratio: true,
            keep_aspect_ratio: true,
            padding_color: Some("black".to_string()),
            file_name: None,
        }
    }
}

/// Which frames get extracted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingMode {
    Count(u32),
    EveryNFrames(u32),
    EveryNSeconds(f64),
    EveryNPercentage(f64),
}

impl ExtractFramesSettings {
    /// Defaults overridden by the keys of `overrides`; unknown keys fail
    pub fn from_overrides(overrides: &serde_json::Value) -> Result<Self> {
        merge_options(Self::default(), overrides)
    }

    /// The single sampling mode, if any
    pub fn sampling(&self) -> Result<Option<SamplingMode>> {
        if let Some(percentage) = self.every_n_percentage {
            if percentage > 100.0 {
                return Err(MediaError::InvalidOptionValue {
                    name: "every_n_percentage".to_string(),
                    reason: format!("{} is greater than 100", percentage),
                });
            }
        }

        let modes: Vec<SamplingMode> = [
            self.number.filter(|n| *n > 0).map(SamplingMode::Count),
            self.every_n_frames.filter(|n| *n > 0).map(SamplingMode::EveryNFrames),
            self.every_n_seconds.filter(|s| *s > 0.0).map(SamplingMode::EveryNSeconds),
            self.every_n_percentage.filter(|p| *p > 0.0).map(SamplingMode::EveryNPercentage),
        ]
        .into_iter()
        .flatten()
        .collect();

        match modes.as_slice() {
            [] => Ok(None),
            [mode] => Ok(Some(*mode)),
            _ => Err(MediaError::AmbiguousSampling),
        }
    }
}

/// Frame file name pattern, with tokens substituted and `_%d.jpg` appended
fn frame_file_name(media: &MediaFile, name: Option<&str>, dims: &DimensionResult) -> String {
    let base = match name {
        Some(name) => NAME_TOKEN_RE
            .replace_all(name, |caps: &Captures| match &caps[0] {
                "%t" => SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis().to_string())
                    .unwrap_or_default(),
                "%s" => dims.size_arg(),
                "%x" => dims.width.to_string(),
                "%y" => dims.height.to_string(),
                _ => String::new(),
            })
            .into_owned(),
        None => media
            .file_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let stem = Path::new(&base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}_%d.jpg", stem)
}

/// Builds the frame extraction plan and creates `folder`
pub fn extract_frames_plan(
    bin: &Path,
    media: &MediaFile,
    folder: &Path,
    settings: &ExtractFramesSettings,
) -> Result<CommandPlan> {
    let sampling = settings.sampling()?;
    if matches!(sampling, Some(SamplingMode::EveryNPercentage(_))) && media.metadata().duration.seconds == 0 {
        return Err(MediaError::InvalidOptionValue {
            name: "every_n_percentage".to_string(),
            reason: "the input duration is unknown".to_string(),
        });
    }

    let size = match settings.size {
        Some(ref size) => size.clone(),
        None => {
            let resolution = media.metadata().video.resolution;
            if resolution.is_empty() {
                return Err(MediaError::ResolutionSquareNotDefined);
            }
            format!("{}x{}", resolution.w, resolution.h)
        }
    };

    let mut sized = media.fresh();
    sized.set_video_size(
        &size,
        settings.keep_pixel_aspect_ratio,
        settings.keep_aspect_ratio,
        settings.padding_color.as_deref(),
    )?;
    let dims = sized.calculate_new_dimension()?;
    let file_name = frame_file_name(media, settings.file_name.as_deref(), &dims);

    ensure_dir(folder)?;

    let mut plan = CommandPlan::new(bin);
    plan.add_input(media.file_path().to_string_lossy());
    if let Some(start) = settings.start_time {
        plan.add_arg("-ss", start.seconds())?;
    }
    if let Some(duration) = settings.duration_time {
        plan.add_arg("-t", duration.seconds())?;
    }
    if let Some(rate) = settings.frame_rate.filter(|r| *r > 0.0) {
        plan.add_arg("-r", rate)?;
    }
    plan.add_arg("-s", dims.size_arg())?;
    if let Some(filter) = dims.pad_filter(settings.padding_color.as_deref()) {
        plan.add_filter(filter);
    }
    if let Some(ref aspect) = dims.aspect {
        plan.add_arg("-aspect", &aspect.label)?;
    }

    match sampling {
        Some(SamplingMode::Count(n)) => {
            plan.add_arg("-vframes", n)?;
        }
        Some(SamplingMode::EveryNFrames(n)) => {
            plan.add_arg("-vsync", 0)?;
            plan.add_filter(format!("select=not(mod(n\\,{}))", n));
        }
        Some(SamplingMode::EveryNSeconds(s)) => {
            plan.add_arg("-vsync", 0)?;
            plan.add_filter(format!("select=not(mod(t\\,{}))", s));
        }
        Some(SamplingMode::EveryNPercentage(p)) => {
            let interval = media.metadata().duration.seconds as f64 / 100.0 * p;
            plan.add_arg("-vsync", 0)?;
            plan.add_filter(format!("select=not(mod(t\\,{}))", interval));
        }
        None => {}
    }

    plan.set_output(folder.join(file_name));
    Ok(plan)
}

/// Extracts frames into `folder`. The conversion resolves to the folder.
pub fn extract_frames_to_jpg(
    ctx: &FfmpegContext,
    media: &MediaFile,
    folder: &Path,
    settings: &ExtractFramesSettings,
) -> Result<Conversion<PathBuf>> {
    let plan = extract_frames_plan(ctx.bin(), media, folder, settings)?;
    debug!("Extracting frames of {} into {}", media.file_path().display(), folder.display());
    plan.execute(folder, media.metadata().duration.seconds)
}

/// `<dir>/<stem>_watermark_<watermark stem>.<ext>`
pub fn watermark_destination(input: &Path, watermark: &Path) -> PathBuf {
    let stem = |p: &Path| p.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let mut name = format!("{}_watermark_{}", stem(input), stem(watermark));
    if let Some(ext) = input.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    input.with_file_name(name)
}

/// Overlays `watermark` on the video
pub fn add_watermark(
    ctx: &FfmpegContext,
    media: &MediaFile,
    watermark: &Path,
    destination: Option<&Path>,
    settings: &WatermarkSettings,
) -> Result<Conversion<PathBuf>> {
    let mut marked = media.fresh();
    marked.set_watermark(watermark, settings)?;

    let destination = destination
        .map(Path::to_path_buf)
        .unwrap_or_else(|| watermark_destination(media.file_path(), watermark));
    info!("Adding watermark {} to {}", watermark.display(), destination.display());

    marked.save_with(ctx, &destination, |plan| {
        plan.add_arg("-strict", -2)?;
        Ok(())
    })
}
