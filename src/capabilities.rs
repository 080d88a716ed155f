//! Supported modules, formats and encoders of the configured ffmpeg build.

use crate::context::FfmpegContext;
use crate::error::{MediaError, Result};
use crate::process;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};

static CONFIGURATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"configuration:(.*)").unwrap());
static MODULE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"--enable-([a-zA-Z0-9\-]+)").unwrap());
static FORMAT_ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(DE|D|E)\s+(?:d\s+)?([\w,\-]+)(?:\s|$)").unwrap());
static ENCODER_ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[VAS][F.][S.][X.][B.][D.]\s+([\w\-]+)").unwrap());

/// Modules, encodable and decodable formats of one ffmpeg binary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub modules: Vec<String>,
    pub encode: Vec<String>,
    pub decode: Vec<String>,
    /// Encoder names from `ffmpeg -encoders`
    #[serde(default)]
    pub codecs: Vec<String>,
}

impl Capabilities {
    /// Parses the text printed by `ffmpeg -formats` (banner included)
    pub fn parse(text: &str) -> Self {
        let mut caps = Self::default();

        if let Some(line) = CONFIGURATION_RE.captures(text) {
            caps.modules = MODULE_RE
                .captures_iter(&line[1])
                .map(|m| m[1].to_string())
                .collect();
        }

        for row in FORMAT_ROW_RE.captures_iter(text) {
            let (decode, encode) = match &row[1] {
                "DE" => (true, true),
                "D" => (true, false),
                _ => (false, true),
            };
            // muxers like "matroska,webm" list several names on one row
            for name in row[2].split(',').filter(|n| !n.is_empty()) {
                if decode {
                    caps.decode.push(name.to_string());
                }
                if encode {
                    caps.encode.push(name.to_string());
                }
            }
        }

        caps
    }

    /// Encoder names from the text printed by `ffmpeg -encoders`
    pub fn parse_encoders(text: &str) -> Vec<String> {
        ENCODER_ROW_RE
            .captures_iter(text)
            .map(|row| row[1].to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.encode.is_empty() && self.decode.is_empty() && self.codecs.is_empty()
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.iter().any(|m| m == module)
    }

    pub fn can_encode(&self, name: &str) -> bool {
        self.encode.iter().any(|e| e == name)
    }

    pub fn can_decode(&self, name: &str) -> bool {
        self.decode.iter().any(|d| d == name)
    }

    /// Fails with `FormatNotSupported` unless `format` is encodable.
    ///
    /// An empty set (binary not probed yet, or probe failed) accepts anything.
    pub fn check_supported_format(&self, format: &str) -> Result<()> {
        if self.encode.is_empty() {
            warn!("Capabilities unknown, format \"{}\" not verified", format);
            return Ok(());
        }
        if !self.can_encode(format) {
            return Err(MediaError::FormatNotSupported(format.to_string()));
        }
        Ok(())
    }

    pub fn has_encoder(&self, codec: &str) -> bool {
        self.codecs.iter().any(|c| c == codec)
    }

    /// Fails with `CodecNotSupported` unless `codec` is a known encoder.
    ///
    /// Without an encoder list anything is accepted.
    pub fn check_supported_codec(&self, codec: &str) -> Result<()> {
        if self.codecs.is_empty() {
            warn!("Encoders unknown, codec \"{}\" not verified", codec);
            return Ok(());
        }
        if !self.has_encoder(codec) {
            return Err(MediaError::CodecNotSupported(codec.to_string()));
        }
        Ok(())
    }
}

/// Runs `ffmpeg -formats`, then `ffmpeg -encoders`, and parses their output.
///
/// A failing encoder listing leaves `codecs` empty.
pub async fn probe(ctx: &FfmpegContext) -> Result<Capabilities> {
    let bin = ctx.bin().to_string_lossy().into_owned();

    let output = process::run_buffered(&[bin.clone(), "-formats".to_string()], ctx.config()).await?;
    output.check()?;
    let mut caps = Capabilities::parse(&output.combined());

    match process::run_buffered(&[bin, "-encoders".to_string()], ctx.config()).await {
        Ok(encoders) if encoders.exit.success() => caps.codecs = Capabilities::parse_encoders(&encoders.stdout),
        Ok(encoders) => warn!("ffmpeg -encoders exited with {:?}", encoders.exit.code),
        Err(e) => warn!("Unable to list ffmpeg encoders: {}", e),
    }

    debug!(
        "Parsed capabilities: {} modules, {} muxers, {} demuxers, {} encoders",
        caps.modules.len(),
        caps.encode.len(),
        caps.decode.len(),
        caps.codecs.len()
    );
    Ok(caps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMATS_OUTPUT: &str = "\
ffmpeg version 4.4.2 Copyright (c) 2000-2021 the FFmpeg developers
  configuration: --prefix=/usr --enable-gpl --enable-libmp3lame --enable-libx264 --disable-doc
File formats:
 D. = Demuxing supported
 .E = Muxing supported
 --
 D  aac             raw ADTS AAC (Advanced Audio Coding)
 DE avi             AVI (Audio Video Interleaved)
  E ipod            iPod H.264 MP4 (MPEG-4 Part 14)
 DE matroska,webm   Matroska / WebM
 DE mp3             MP3 (MPEG audio layer 3)
  E mp4             MP4 (MPEG-4 Part 14)
";

    #[test]
    fn test_parse_modules() {
        let caps = Capabilities::parse(FORMATS_OUTPUT);
        assert_eq!(caps.modules, vec!["gpl", "libmp3lame", "libx264"]);
        assert!(caps.has_module("libmp3lame"));
        assert!(!caps.has_module("doc"));
    }

    #[test]
    fn test_parse_format_rows() {
        let caps = Capabilities::parse(FORMATS_OUTPUT);
        assert_eq!(caps.decode, vec!["aac", "avi", "matroska", "webm", "mp3"]);
        assert_eq!(caps.encode, vec!["avi", "ipod", "matroska", "webm", "mp3", "mp4"]);
        assert!(caps.can_decode("aac") && !caps.can_encode("aac"));
    }

    const ENCODERS_OUTPUT: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codec h264)
 V....D mpeg4                MPEG-4 part 2
 A....D aac                  AAC (Advanced Audio Coding)
 A....D libmp3lame           libmp3lame MP3 (MPEG audio layer 3) (codec mp3)
 S..... srt                  SubRip subtitle
";

    #[test]
    fn test_parse_encoders() {
        let codecs = Capabilities::parse_encoders(ENCODERS_OUTPUT);
        assert_eq!(codecs, vec!["libx264", "mpeg4", "aac", "libmp3lame", "srt"]);
    }

    #[test]
    fn test_check_supported() {
        let mut caps = Capabilities::parse(FORMATS_OUTPUT);
        assert!(caps.check_supported_format("mp4").is_ok());
        assert_eq!(caps.check_supported_format("flv").unwrap_err().code(), 104);

        // no encoder list yet
        assert!(caps.check_supported_codec("h265").is_ok());

        caps.codecs = Capabilities::parse_encoders(ENCODERS_OUTPUT);
        assert!(caps.check_supported_codec("aac").is_ok());
        assert_eq!(caps.check_supported_codec("h265").unwrap_err().code(), 113);
    }

    #[test]
    fn test_empty_capabilities_accept_everything() {
        let caps = Capabilities::default();
        assert!(caps.is_empty());
        assert!(caps.check_supported_format("anything").is_ok());
        assert!(caps.check_supported_codec("anything").is_ok());
    }

    #[test]
    fn test_header_rows_are_ignored() {
        let caps = Capabilities::parse(" D. = Demuxing supported\n .E = Muxing supported\n");
        assert!(caps.is_empty());
    }
}
