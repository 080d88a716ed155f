//! # Media Probe Module
//!
//! Questo modulo ricava i metadati di un file media dall'output testuale di
//! `ffmpeg -i <file>`.
//!
//! ## Responsabilità:
//! - Validazione del path di input prima dello spawn (vuoto, non UTF-8, inesistente)
//! - Esecuzione bufferizzata di ffmpeg in modalità informativa
//! - Parsing tramite una tabella di regex indipendenti: un campo assente
//!   produce `None`/zero senza far fallire l'intero probe
//! - Derivazione di aspect ratio, pixel aspect ratio e risoluzione "square"
//! - Avvio del probe delle capabilities in background al primo utilizzo
//!
//! ## Fallimenti:
//! ffmpeg senza file di output esce con codice 1, quindi un'uscita non-zero è
//! tollerata. Un processo terminato da segnale (o dal timeout) invece fallisce.

use crate::context::FfmpegContext;
use crate::error::{MediaError, Result};
use crate::process;
use crate::utils::{parse_timestamp_seconds, reduce_ratio};
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::debug;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).unwrap());
    };
}

pattern!(FILENAME_RE, r"from '(.*)'");
pattern!(TITLE_RE, r"(INAM|title)\s+:\s(.+)");
pattern!(ARTIST_RE, r"artist\s+:\s(.+)");
pattern!(ALBUM_RE, r"album\s+:\s(.+)");
pattern!(TRACK_RE, r"track\s+:\s(.+)");
pattern!(DATE_RE, r"date\s+:\s(.+)");
pattern!(SYNCHED_RE, r"start: 0\.000000");
pattern!(DURATION_RE, r"Duration: (\d+:\d{2}:\d{2}\.\d+)");
pattern!(ROTATE_RE, r"rotate\s+:\s(\d{2,3})");

pattern!(CONTAINER_RE, r"Input #0, ([a-zA-Z0-9]+),");
pattern!(VIDEO_BITRATE_RE, r"bitrate: (\d+) kb/s");
pattern!(VIDEO_STREAM_RE, r"Stream #(\d+[:.]\d+)[^:\n]*: Video");
pattern!(VIDEO_CODEC_RE, r"Video: (\w+)");
pattern!(RESOLUTION_RE, r"\b(\d{2,5})x(\d{2,5})\b");
pattern!(PIXEL_RE, r"[SP]AR (\d+):(\d+)");
pattern!(ASPECT_RE, r"DAR (\d+):(\d+)");
pattern!(FPS_RE, r"([\d.]+) (?:fps|tb\(r\))");

pattern!(AUDIO_STREAM_RE, r"Stream #(\d+[:.]\d+)[^:\n]*: Audio");
pattern!(AUDIO_CODEC_RE, r"Audio: (\w+)");
pattern!(SAMPLE_RATE_RE, r"(?i)(\d+) Hz");
pattern!(CHANNELS_RE, r"Audio:.*?\d+ Hz, ([^,\r\n]+)");
pattern!(AUDIO_BITRATE_RE, r"Audio:.* (\d+) kb/s");

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaDuration {
    /// Duration as printed by ffmpeg, e.g. `00:02:10.00`
    pub raw: String,
    /// Whole seconds, fraction discarded
    pub seconds: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub w: u32,
    pub h: u32,
}

impl Resolution {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aspect {
    pub x: u64,
    pub y: u64,
    /// `x:y`
    pub label: String,
    pub value: f64,
}

impl Aspect {
    fn new(x: u64, y: u64) -> Option<Self> {
        (y != 0).then(|| Self {
            x,
            y,
            label: format!("{}:{}", x, y),
            value: x as f64 / y as f64,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoInfo {
    pub container: Option<String>,
    /// kb/s
    pub bitrate: u64,
    /// Stream specifier, e.g. `0:0`
    pub stream: Option<String>,
    pub codec: Option<String>,
    pub resolution: Resolution,
    /// Resolution with square pixels, only when the pixel aspect is not 1:1
    pub resolution_square: Option<Resolution>,
    pub aspect: Option<Aspect>,
    pub pixel_string: String,
    pub pixel: f64,
    pub rotate: u32,
    pub fps: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Channels {
    /// Layout label, e.g. `stereo` or `5.1(side)`
    pub raw: Option<String>,
    /// 2 for stereo, 1 for mono, 0 for any other layout
    pub value: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioInfo {
    pub codec: Option<String>,
    /// kb/s
    pub bitrate: Option<u64>,
    pub sample_rate: u32,
    pub stream: Option<String>,
    pub channels: Channels,
}

/// Everything the probe could read about one media file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaMetadata {
    pub filename: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<String>,
    pub date: Option<String>,
    pub synched: bool,
    pub duration: MediaDuration,
    pub video: VideoInfo,
    pub audio: AudioInfo,
}

fn capture(re: &Regex, text: &str, group: usize) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(group))
        .map(|m| m.as_str().trim_end().to_string())
        .filter(|s| !s.is_empty())
}

fn capture_num<T: std::str::FromStr>(re: &Regex, text: &str, group: usize) -> Option<T> {
    capture(re, text, group).and_then(|s| s.parse().ok())
}

fn ratio_pair(re: &Regex, text: &str) -> Option<(u64, u64)> {
    let caps = re.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

impl MediaMetadata {
    /// Parses the combined stdout and stderr of `ffmpeg -i <file>`
    pub fn parse(text: &str) -> Self {
        let duration = capture(&DURATION_RE, text, 1)
            .map(|raw| MediaDuration {
                seconds: parse_timestamp_seconds(&raw).unwrap_or(0),
                raw,
            })
            .unwrap_or_default();

        let resolution = RESOLUTION_RE
            .captures(text)
            .and_then(|c| Some(Resolution::new(c[1].parse().ok()?, c[2].parse().ok()?)))
            .unwrap_or_default();

        let mut video = VideoInfo {
            container: capture(&CONTAINER_RE, text, 1),
            bitrate: capture_num(&VIDEO_BITRATE_RE, text, 1).unwrap_or(0),
            stream: capture(&VIDEO_STREAM_RE, text, 1),
            codec: capture(&VIDEO_CODEC_RE, text, 1),
            resolution,
            rotate: capture_num(&ROTATE_RE, text, 1).unwrap_or(0),
            fps: capture_num(&FPS_RE, text, 1).unwrap_or(0.0),
            ..Default::default()
        };
        derive_geometry(&mut video, text);

        let raw_channels = capture(&CHANNELS_RE, text, 1);
        let channels = Channels {
            value: raw_channels.as_deref().map(|raw| match raw {
                "stereo" => 2,
                "mono" => 1,
                _ => 0,
            }),
            raw: raw_channels,
        };

        let audio = AudioInfo {
            codec: capture(&AUDIO_CODEC_RE, text, 1),
            bitrate: capture_num(&AUDIO_BITRATE_RE, text, 1),
            sample_rate: capture_num(&SAMPLE_RATE_RE, text, 1).unwrap_or(0),
            stream: capture(&AUDIO_STREAM_RE, text, 1),
            channels,
        };

        Self {
            filename: capture(&FILENAME_RE, text, 1),
            title: capture(&TITLE_RE, text, 2),
            artist: capture(&ARTIST_RE, text, 1),
            album: capture(&ALBUM_RE, text, 1),
            track: capture(&TRACK_RE, text, 1),
            date: capture(&DATE_RE, text, 1),
            synched: SYNCHED_RE.is_match(text),
            duration,
            video,
            audio,
        }
    }
}

/// Fills aspect, pixel aspect and square resolution
fn derive_geometry(video: &mut VideoInfo, text: &str) {
    let res = video.resolution;

    video.aspect = match ratio_pair(&ASPECT_RE, text) {
        Some((x, y)) => Aspect::new(x, y),
        None if res.w > 0 => reduce_ratio(res.w as u64, res.h as u64).and_then(|(x, y)| Aspect::new(x, y)),
        None => None,
    };

    match ratio_pair(&PIXEL_RE, text) {
        Some((num, den)) => {
            video.pixel_string = format!("{}:{}", num, den);
            video.pixel = if den == 0 { 0.0 } else { num as f64 / den as f64 };
        }
        None if res.w != 0 => {
            video.pixel_string = "1:1".to_string();
            video.pixel = 1.0;
        }
        None => {
            video.pixel_string = String::new();
            video.pixel = 0.0;
        }
    }

    let pixel = video.pixel;
    if pixel != 0.0 && pixel != 1.0 {
        video.resolution_square = Some(if pixel > 1.0 {
            Resolution::new((res.w as f64 * pixel).round() as u32, res.h)
        } else {
            Resolution::new(res.w, (res.h as f64 / pixel).round() as u32)
        });
    }
}

/// Validates `path` for use as an input file.
///
/// Returns the path as text, trimmed.
pub fn validate_input_path(path: &Path) -> Result<String> {
    let text = path
        .to_str()
        .ok_or_else(|| MediaError::InvalidInputPath(path.to_string_lossy().into_owned()))?
        .trim();

    if text.is_empty() {
        return Err(MediaError::EmptyInputPath);
    }
    if !Path::new(text).exists() {
        return Err(MediaError::FileNotFound);
    }
    Ok(text.to_string())
}

/// Probes `path` with the context's ffmpeg binary.
///
/// The first call for a context also starts a capabilities probe in the
/// background.
pub async fn probe_file(ctx: &Arc<FfmpegContext>, path: &Path) -> Result<MediaMetadata> {
    let input = validate_input_path(path)?;
    ctx.ensure_capabilities_in_background();

    let argv = vec![ctx.bin().to_string_lossy().into_owned(), "-i".to_string(), input];
    let output = process::run_buffered(&argv, ctx.config()).await?;

    if output.killed() {
        return Err(MediaError::ProcessExit {
            code: output.exit.code,
            signal: output.exit.signal,
        });
    }

    let metadata = MediaMetadata::parse(&output.combined());
    debug!(
        "Probed {}: {}s, {}x{}",
        path.display(),
        metadata.duration.seconds,
        metadata.video.resolution.w,
        metadata.video.resolution.h
    );
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    const MOVIE_OUTPUT: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from '/videos/holiday.mp4':\r
  Metadata:\r
    major_brand     : isom\r
    title           : Summer Holiday\r
    artist          : Jane Doe\r
    album           : Trips\r
    date            : 2021\r
  Duration: 00:02:10.00, start: 0.000000, bitrate: 1205 kb/s\r
    Stream #0:0(und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1920x1080 [SAR 1:1 DAR 16:9], 1071 kb/s, 29.97 fps, 29.97 tbr, 30k tbn (default)\r
    Metadata:\r
      rotate          : 90\r
    Stream #0:1(und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 128 kb/s (default)\r
At least one output file must be specified\r
";

    #[test]
    fn test_parse_tags_and_timing() {
        let meta = MediaMetadata::parse(MOVIE_OUTPUT);
        assert_eq!(meta.filename.as_deref(), Some("/videos/holiday.mp4"));
        assert_eq!(meta.title.as_deref(), Some("Summer Holiday"));
        assert_eq!(meta.artist.as_deref(), Some("Jane Doe"));
        assert_eq!(meta.album.as_deref(), Some("Trips"));
        assert_eq!(meta.date.as_deref(), Some("2021"));
        assert_eq!(meta.track, None);
        assert!(meta.synched);
        assert_eq!(meta.duration.raw, "00:02:10.00");
        assert_eq!(meta.duration.seconds, 130);
    }

    #[test]
    fn test_parse_video_stream() {
        let video = MediaMetadata::parse(MOVIE_OUTPUT).video;
        assert_eq!(video.container.as_deref(), Some("mov"));
        assert_eq!(video.bitrate, 1205);
        assert_eq!(video.stream.as_deref(), Some("0:0"));
        assert_eq!(video.codec.as_deref(), Some("h264"));
        assert_eq!(video.resolution, Resolution::new(1920, 1080));
        assert_eq!(video.aspect.as_ref().map(|a| a.label.as_str()), Some("16:9"));
        assert_eq!(video.pixel_string, "1:1");
        assert_eq!(video.pixel, 1.0);
        assert_eq!(video.resolution_square, None);
        assert_eq!(video.rotate, 90);
        assert_eq!(video.fps, 29.97);
    }

    #[test]
    fn test_parse_audio_stream() {
        let audio = MediaMetadata::parse(MOVIE_OUTPUT).audio;
        assert_eq!(audio.codec.as_deref(), Some("aac"));
        assert_eq!(audio.bitrate, Some(128));
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.stream.as_deref(), Some("0:1"));
        assert_eq!(audio.channels.raw.as_deref(), Some("stereo"));
        assert_eq!(audio.channels.value, Some(2));
    }

    #[test]
    fn test_aspect_derived_from_resolution() {
        let meta = MediaMetadata::parse("  Duration: 00:02:10.00, start\n  Stream #0:0: Video: mpeg4, 1920x1080, 25 fps\n");
        assert_eq!(meta.duration.seconds, 130);
        assert_eq!(meta.video.resolution, Resolution::new(1920, 1080));
        let aspect = meta.video.aspect.unwrap();
        assert_eq!((aspect.x, aspect.y), (16, 9));
        assert_eq!(aspect.label, "16:9");
        assert!(!meta.synched);
    }

    #[test]
    fn test_square_resolution_for_anamorphic_pixels() {
        let wide = MediaMetadata::parse("Video: mpeg2video, yuv420p, 720x576 [SAR 16:15 DAR 4:3], 25 fps");
        assert_eq!(wide.video.pixel_string, "16:15");
        assert_eq!(wide.video.resolution_square, Some(Resolution::new(768, 576)));
        assert_eq!(wide.video.aspect.unwrap().label, "4:3");

        let tall = MediaMetadata::parse("Video: mpeg2video, 720x480 [SAR 8:9 DAR 4:3]");
        assert_eq!(tall.video.resolution_square, Some(Resolution::new(720, 540)));
    }

    #[test]
    fn test_audio_only_file() {
        let meta = MediaMetadata::parse(
            "Input #0, mp3, from 'song.mp3':\n  Duration: 00:03:05.12, start: 0.025057, bitrate: 320 kb/s\n    Stream #0:0: Audio: mp3, 44100 Hz, mono, fltp, 320 kb/s\n",
        );
        assert_eq!(meta.video.resolution, Resolution::default());
        assert!(meta.video.aspect.is_none());
        assert_eq!(meta.video.pixel_string, "");
        assert_eq!(meta.video.pixel, 0.0);
        assert_eq!(meta.audio.channels.value, Some(1));
        assert_eq!(meta.duration.seconds, 185);
    }

    #[test]
    fn test_unknown_channel_layout() {
        let meta = MediaMetadata::parse("Stream #0:1: Audio: ac3, 48000 Hz, 5.1(side), fltp, 448 kb/s");
        assert_eq!(meta.audio.channels.raw.as_deref(), Some("5.1(side)"));
        assert_eq!(meta.audio.channels.value, Some(0));
    }

    #[test]
    fn test_empty_output() {
        let meta = MediaMetadata::parse("");
        assert_eq!(meta, MediaMetadata::default());
        assert_eq!(meta.audio.channels.value, None);
    }

    #[test]
    fn test_validate_input_path() {
        assert_eq!(validate_input_path(Path::new("")).unwrap_err().code(), 100);
        assert_eq!(validate_input_path(Path::new("   ")).unwrap_err().code(), 100);
        assert_eq!(validate_input_path(Path::new("/no/such/file.mp4")).unwrap_err().code(), 103);

        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("clip.mp4");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(validate_input_path(&file).unwrap(), file.to_str().unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_tolerates_non_zero_exit() {
        let temp_dir = TempDir::new().unwrap();
        let fake = temp_dir.path().join("fake-ffmpeg");
        let input = temp_dir.path().join("clip.mp4");
        std::fs::write(&input, b"").unwrap();
        std::fs::write(
            &fake,
            "#!/bin/sh\necho '  Duration: 00:00:42.10, start: 0.000000, bitrate: 10 kb/s' >&2\necho '    Stream #0:0: Video: h264, yuv420p, 640x480, 25 fps' >&2\nexit 1\n",
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let ctx = FfmpegContext::new(&fake, Config::default());
        let mut attempt = probe_file(&ctx, &input).await;
        for _ in 0..5 {
            // ETXTBSY: another test forked while the script was still open for writing
            if !matches!(&attempt, Err(MediaError::Io(e)) if e.raw_os_error() == Some(26)) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            attempt = probe_file(&ctx, &input).await;
        }
        let meta = attempt.unwrap();
        assert_eq!(meta.duration.seconds, 42);
        assert_eq!(meta.video.aspect.unwrap().label, "4:3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_killed_ffmpeg_is_a_hard_failure() {
        let temp_dir = TempDir::new().unwrap();
        let fake = temp_dir.path().join("fake-ffmpeg");
        let input = temp_dir.path().join("clip.mp4");
        std::fs::write(&input, b"").unwrap();
        std::fs::write(
            &fake,
            "#!/bin/sh\necho '  Duration: 00:00:42.10, start: 0.000000, bitrate: 10 kb/s' >&2\nkill -9 $$\n",
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let ctx = FfmpegContext::new(&fake, Config::default());
        let mut attempt = probe_file(&ctx, &input).await;
        for _ in 0..5 {
            if !matches!(&attempt, Err(MediaError::Io(e)) if e.raw_os_error() == Some(26)) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            attempt = probe_file(&ctx, &input).await;
        }
        match attempt {
            Err(err @ MediaError::ProcessExit { .. }) => {
                assert_eq!(err.code(), 116);
                assert!(matches!(err, MediaError::ProcessExit { signal: Some(9), .. }));
            }
            other => panic!("expected a process exit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_missing_file_fails_before_spawn() {
        let ctx = FfmpegContext::new("/nonexistent/ffmpeg", Config::default());
        let err = probe_file(&ctx, Path::new("/no/such/clip.mp4")).await.unwrap_err();
        assert_eq!(err.code(), 103);
    }
}
