//! # Media File Descriptor
//!
//! Questo modulo definisce `MediaFile`, il descrittore di un file selezionato.
//!
//! ## Struttura:
//! - Tripla immutabile (path, capabilities, metadata) condivisa tramite `Arc`
//! - Livello mutabile `ProcessingOptions` con le operazioni richieste
//!
//! Clonare un `MediaFile` copia solo le opzioni: metadata e capabilities
//! restano condivisi, quindi operazioni configurate in parallelo non si
//! influenzano a vicenda.
//!
//! ## Rendering:
//! Le opzioni vengono tradotte in un `CommandPlan` in ordine fisso: input,
//! watermark, opzioni video, filtri, dimensione, opzioni audio, hook del
//! chiamante, output.

use crate::capabilities::Capabilities;
use crate::command::CommandPlan;
use crate::context::FfmpegContext;
use crate::dimension::{self, DimensionResult, SizeSpec};
use crate::error::{MediaError, Result};
use crate::probe::{self, MediaMetadata};
use crate::process::Conversion;
use crate::utils::TimeSpec;
use crate::watermark::{Watermark, WatermarkSettings};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::debug;

static ASPECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+):(\d+)").unwrap());

pub const MONO: u32 = 1;
pub const STEREO: u32 = 2;

/// Requested output size and padding policy
#[derive(Debug, Clone, PartialEq)]
pub struct SizeOptions {
    pub spec: SizeSpec,
    pub keep_pixel_aspect: bool,
    pub keep_aspect: bool,
    pub padding_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoOptions {
    pub disabled: bool,
    pub format: Option<String>,
    pub codec: Option<String>,
    /// kb/s
    pub bitrate: Option<u32>,
    pub framerate: Option<f64>,
    pub start_time: Option<TimeSpec>,
    pub duration: Option<TimeSpec>,
    /// `x:y`
    pub aspect: Option<String>,
    pub size: Option<SizeOptions>,
    pub watermark: Option<Watermark>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioOptions {
    pub disabled: bool,
    pub codec: Option<String>,
    /// Hz
    pub frequency: Option<u32>,
    pub channels: Option<u32>,
    /// kb/s
    pub bitrate: Option<u32>,
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingOptions {
    pub video: VideoOptions,
    pub audio: AudioOptions,
}

/// A probed input file plus the operations requested on it
#[derive(Debug, Clone)]
pub struct MediaFile {
    file_path: Arc<PathBuf>,
    capabilities: Arc<Capabilities>,
    metadata: Arc<MediaMetadata>,
    options: ProcessingOptions,
}

impl MediaFile {
    pub fn new(file_path: impl Into<PathBuf>, capabilities: Arc<Capabilities>, metadata: Arc<MediaMetadata>) -> Self {
        Self {
            file_path: Arc::new(file_path.into()),
            capabilities,
            metadata,
            options: ProcessingOptions::default(),
        }
    }

    /// Probes `path` and wraps the result with the context's capabilities
    pub async fn open(ctx: &Arc<FfmpegContext>, path: &Path) -> Result<Self> {
        let metadata = probe::probe_file(ctx, path).await?;
        Ok(Self::new(path, ctx.capabilities_or_empty(), Arc::new(metadata)))
    }

    /// Same file, capabilities and metadata, with no options set
    pub fn fresh(&self) -> Self {
        Self {
            file_path: Arc::clone(&self.file_path),
            capabilities: Arc::clone(&self.capabilities),
            metadata: Arc::clone(&self.metadata),
            options: ProcessingOptions::default(),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn metadata(&self) -> &MediaMetadata {
        &self.metadata
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    pub fn disable_audio(&mut self) -> &mut Self {
        self.options.audio.disabled = true;
        self
    }

    pub fn disable_video(&mut self) -> &mut Self {
        self.options.video.disabled = true;
        self
    }

    /// Output container, must be encodable by the binary
    pub fn set_video_format(&mut self, format: &str) -> Result<&mut Self> {
        self.capabilities.check_supported_format(format)?;
        self.options.video.format = Some(format.to_string());
        Ok(self)
    }

    pub fn set_video_codec(&mut self, codec: &str) -> Result<&mut Self> {
        self.capabilities.check_supported_codec(codec)?;
        self.options.video.codec = Some(codec.to_string());
        Ok(self)
    }

    /// Video bitrate in kb/s
    pub fn set_video_bitrate(&mut self, bitrate: u32) -> &mut Self {
        self.options.video.bitrate = Some(bitrate);
        self
    }

    pub fn set_video_framerate(&mut self, framerate: f64) -> &mut Self {
        self.options.video.framerate = Some(framerate);
        self
    }

    pub fn set_start_time(&mut self, time: TimeSpec) -> &mut Self {
        self.options.video.start_time = Some(time);
        self
    }

    pub fn set_duration(&mut self, duration: TimeSpec) -> &mut Self {
        self.options.video.duration = Some(duration);
        self
    }

    /// Display aspect as `x:y`. Malformed values fall back to the probed aspect.
    pub fn set_video_aspect(&mut self, aspect: &str) -> &mut Self {
        let requested = ASPECT_RE
            .captures(aspect)
            .filter(|c| c[2].parse::<u64>().is_ok_and(|y| y > 0))
            .map(|c| format!("{}:{}", &c[1], &c[2]));

        self.options.video.aspect = requested.or_else(|| self.metadata.video.aspect.as_ref().map(|a| a.label.clone()));
        self
    }

    /// Output size, e.g. `640x?`, `?x480`, `50%` or `1280x720`
    pub fn set_video_size(
        &mut self,
        size: &str,
        keep_pixel_aspect: bool,
        keep_aspect: bool,
        padding_color: Option<&str>,
    ) -> Result<&mut Self> {
        let spec: SizeSpec = size.parse()?;
        self.options.video.size = Some(SizeOptions {
            spec,
            keep_pixel_aspect,
            keep_aspect,
            padding_color: padding_color.map(str::to_string),
        });
        Ok(self)
    }

    pub fn set_watermark(&mut self, path: &Path, settings: &WatermarkSettings) -> Result<&mut Self> {
        self.options.video.watermark = Some(Watermark::new(path, settings)?);
        Ok(self)
    }

    /// Audio codec; `mp3` becomes `libmp3lame` when that module is built in
    pub fn set_audio_codec(&mut self, codec: &str) -> Result<&mut Self> {
        let codec = if codec == "mp3" && self.capabilities.has_module("libmp3lame") {
            "libmp3lame"
        } else {
            codec
        };
        self.capabilities.check_supported_codec(codec)?;
        self.options.audio.codec = Some(codec.to_string());
        Ok(self)
    }

    /// Sample rate in Hz
    pub fn set_audio_frequency(&mut self, frequency: u32) -> &mut Self {
        self.options.audio.frequency = Some(frequency);
        self
    }

    /// Only mono (1) and stereo (2) are accepted
    pub fn set_audio_channels(&mut self, channels: u32) -> Result<&mut Self> {
        if channels != MONO && channels != STEREO {
            return Err(MediaError::AudioChannelInvalid(channels.to_string()));
        }
        self.options.audio.channels = Some(channels);
        Ok(self)
    }

    /// Audio bitrate in kb/s
    pub fn set_audio_bitrate(&mut self, bitrate: u32) -> &mut Self {
        self.options.audio.bitrate = Some(bitrate);
        self
    }

    pub fn set_audio_quality(&mut self, quality: u32) -> &mut Self {
        self.options.audio.quality = Some(quality);
        self
    }

    /// Output size for the configured size option
    pub fn calculate_new_dimension(&self) -> Result<DimensionResult> {
        let size = self
            .options
            .video
            .size
            .as_ref()
            .ok_or_else(|| MediaError::SizeFormat(String::new()))?;
        dimension::calculate(size.spec, &self.metadata.video, size.keep_pixel_aspect, size.keep_aspect)
    }

    /// Renders the options into a plan writing to `destination`.
    ///
    /// `customize` runs last, before the output is appended.
    pub fn to_plan<F>(&self, bin: &Path, destination: &Path, customize: F) -> Result<CommandPlan>
    where
        F: FnOnce(&mut CommandPlan) -> Result<()>,
    {
        let mut plan = CommandPlan::new(bin);
        plan.add_input(self.file_path.to_string_lossy());

        let video = &self.options.video;
        if let Some(ref watermark) = video.watermark {
            if !video.disabled {
                plan.add_input(watermark.path.to_string_lossy());
            }
        }

        if video.disabled {
            plan.add_flag("-vn")?;
        } else {
            if let Some(ref format) = video.format {
                plan.add_arg("-f", format)?;
            }
            if let Some(ref codec) = video.codec {
                plan.add_arg("-vcodec", codec)?;
            }
            if let Some(bitrate) = video.bitrate {
                plan.add_arg("-b:v", format!("{}k", bitrate))?;
            }
            if let Some(framerate) = video.framerate {
                plan.add_arg("-r", framerate)?;
            }
            if let Some(start) = video.start_time {
                plan.add_arg("-ss", start.seconds())?;
            }
            if let Some(duration) = video.duration {
                plan.add_arg("-t", duration.seconds())?;
            }
            if let Some(ref aspect) = video.aspect {
                plan.add_arg("-aspect", aspect)?;
            }
            if let Some(ref watermark) = video.watermark {
                plan.add_filter(watermark.filter());
            }
            if let Some(ref size) = video.size {
                let dims = self.calculate_new_dimension()?;
                if let Some(ref aspect) = dims.aspect {
                    plan.add_filter(dimension::pad_filter(aspect, size.padding_color.as_deref()));
                    plan.add_arg("-aspect", &aspect.label)?;
                }
                plan.add_arg("-s", dims.size_arg())?;
            }
        }

        let audio = &self.options.audio;
        if audio.disabled {
            plan.add_flag("-an")?;
        } else {
            if let Some(ref codec) = audio.codec {
                plan.add_arg("-acodec", codec)?;
            }
            if let Some(frequency) = audio.frequency {
                plan.add_arg("-ar", frequency)?;
            }
            if let Some(channels) = audio.channels {
                plan.add_arg("-ac", channels)?;
            }
            if let Some(quality) = audio.quality {
                plan.add_arg("-aq", quality)?;
            }
            if let Some(bitrate) = audio.bitrate {
                plan.add_arg("-ab", format!("{}k", bitrate))?;
            }
        }

        customize(&mut plan)?;
        plan.set_output(destination);
        Ok(plan)
    }

    /// Starts the conversion to `destination`
    pub fn save(&self, ctx: &FfmpegContext, destination: &Path) -> Result<Conversion<PathBuf>> {
        self.save_with(ctx, destination, |_| Ok(()))
    }

    /// Like `save`, letting `customize` add extra commands to the plan
    pub fn save_with<F>(&self, ctx: &FfmpegContext, destination: &Path, customize: F) -> Result<Conversion<PathBuf>>
    where
        F: FnOnce(&mut CommandPlan) -> Result<()>,
    {
        let plan = self.to_plan(ctx.bin(), destination, customize)?;
        debug!("Saving {} to {}", self.file_path.display(), destination.display());
        plan.execute(destination, self.metadata.duration.seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROBE: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'movie.mp4':
  Duration: 00:01:00.00, start: 0.000000, bitrate: 900 kb/s
    Stream #0:0(und): Video: h264 (High), yuv420p, 1280x720 [SAR 1:1 DAR 16:9], 800 kb/s, 25 fps
    Stream #0:1(und): Audio: aac (LC), 44100 Hz, stereo, fltp, 96 kb/s
";

    fn media(caps: Capabilities) -> MediaFile {
        MediaFile::new("movie.mp4", Arc::new(caps), Arc::new(MediaMetadata::parse(PROBE)))
    }

    fn render(media: &MediaFile) -> Vec<String> {
        media
            .to_plan(Path::new("ffmpeg"), Path::new("out.mp4"), |_| Ok(()))
            .unwrap()
            .render()
            .unwrap()
    }

    #[test]
    fn test_no_options_renders_input_and_output() {
        assert_eq!(render(&media(Capabilities::default())), vec!["ffmpeg", "-i", "movie.mp4", "-y", "out.mp4"]);
    }

    #[test]
    fn test_full_render_order() {
        let mut m = media(Capabilities::default());
        m.set_video_codec("libx264").unwrap();
        m.set_video_bitrate(1200).set_video_framerate(30.0);
        m.set_start_time(TimeSpec::from_seconds(5)).set_duration(TimeSpec::from_seconds(10));
        m.set_video_size("640x?", false, false, None).unwrap();
        m.set_audio_codec("aac").unwrap();
        m.set_audio_frequency(48000).set_audio_channels(1).unwrap();
        m.set_audio_quality(4).set_audio_bitrate(128);

        assert_eq!(
            render(&m),
            vec![
                "ffmpeg", "-i", "movie.mp4", "-vcodec", "libx264", "-b:v", "1200k", "-r", "30", "-ss", "5", "-t", "10",
                "-s", "640x360", "-acodec", "aac", "-ar", "48000", "-ac", "1", "-aq", "4", "-ab", "128k", "-y",
                "out.mp4",
            ]
        );
    }

    #[test]
    fn test_disabled_streams() {
        let mut m = media(Capabilities::default());
        m.disable_video().disable_audio();
        m.set_video_codec("libx264").unwrap();
        assert_eq!(render(&m), vec!["ffmpeg", "-i", "movie.mp4", "-vn", "-an", "-y", "out.mp4"]);
    }

    #[test]
    fn test_size_with_padding() {
        let mut m = media(Capabilities::default());
        m.set_video_size("640x480", false, true, Some("white")).unwrap();
        let argv = render(&m);
        let filter_at = argv.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(
            argv[filter_at + 1],
            "scale=iw*sar:ih, pad=max(iw\\,ih*(4/3)):ow/(4/3):(ow-iw)/2:(oh-ih)/2:white"
        );
        assert!(argv.windows(2).any(|w| w == ["-aspect", "4:3"]));
        assert!(argv.windows(2).any(|w| w == ["-s", "640x480"]));
    }

    #[test]
    fn test_conflicting_aspect_is_duplicate() {
        let mut m = media(Capabilities::default());
        m.set_video_aspect("4:3");
        m.set_video_size("640x480", false, true, None).unwrap();
        let err = m.to_plan(Path::new("ffmpeg"), Path::new("out.mp4"), |_| Ok(())).unwrap_err();
        assert_eq!(err.code(), 112);
    }

    #[test]
    fn test_aspect_fallback_to_metadata() {
        let mut m = media(Capabilities::default());
        m.set_video_aspect("wide");
        assert_eq!(m.options().video.aspect.as_deref(), Some("16:9"));
        m.set_video_aspect("21:9");
        assert_eq!(m.options().video.aspect.as_deref(), Some("21:9"));
    }

    #[test]
    fn test_setter_validation() {
        let caps = Capabilities {
            modules: vec!["libmp3lame".into()],
            encode: vec!["mp3".into(), "mp4".into()],
            decode: vec![],
            codecs: vec!["libx264".into(), "libmp3lame".into()],
        };
        let mut m = media(caps);
        assert_eq!(m.set_audio_channels(6).unwrap_err().code(), 105);
        assert_eq!(m.set_video_format("flv").unwrap_err().code(), 104);
        assert_eq!(m.set_video_codec("vp9").unwrap_err().code(), 113);
        assert_eq!(m.set_video_size("big", true, true, None).unwrap_err().code(), 110);

        m.set_audio_codec("mp3").unwrap();
        assert_eq!(m.options().audio.codec.as_deref(), Some("libmp3lame"));
    }

    #[test]
    fn test_clone_shares_metadata_not_options() {
        let mut original = media(Capabilities::default());
        original.set_video_bitrate(500);

        let mut copy = original.clone();
        copy.set_video_bitrate(900).disable_audio();

        assert_eq!(original.options().video.bitrate, Some(500));
        assert!(!original.options().audio.disabled);
        assert!(Arc::ptr_eq(&original.metadata, &copy.metadata));
        assert_eq!(original.fresh().options(), &ProcessingOptions::default());
    }

    #[test]
    fn test_customize_hook_and_watermark() {
        let temp_dir = TempDir::new().unwrap();
        let logo = temp_dir.path().join("logo.png");
        std::fs::write(&logo, b"png").unwrap();

        let mut m = media(Capabilities::default());
        m.set_watermark(&logo, &WatermarkSettings::default()).unwrap();
        let plan = m
            .to_plan(Path::new("ffmpeg"), Path::new("out.mp4"), |plan| {
                plan.add_arg("-strict", -2)?;
                Ok(())
            })
            .unwrap();
        let argv = plan.render().unwrap();

        assert_eq!(argv[3], "-i");
        assert_eq!(argv[4], logo.to_string_lossy());
        assert!(argv.windows(2).any(|w| w == ["-strict", "-2"]));
        assert!(plan.filters()[0].starts_with("overlay="));
    }

    #[test]
    fn test_dimension_requires_size() {
        let m = media(Capabilities::default());
        assert_eq!(m.calculate_new_dimension().unwrap_err().code(), 110);
    }
}
