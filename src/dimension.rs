//! # Dimension Calculator Module
//!
//! Questo modulo calcola la risoluzione di output a partire da una
//! specifica dichiarativa della dimensione.
//!
//! ## Specifiche supportate:
//! - `"<N>x?"`: larghezza fissa, altezza derivata dall'aspect ratio
//! - `"?x<N>"`: altezza fissa, larghezza derivata
//! - `"<N>%"`: entrambe le dimensioni scalate rispetto alla risoluzione di riferimento
//! - `"<W>x<H>"`: valori letterali
//!
//! ## Regole:
//! - Larghezza e altezza finali sono sempre pari (decremento di uno se dispari)
//! - La risoluzione di riferimento è quella "square" se richiesto e disponibile,
//!   altrimenti quella rilevata dal probe
//! - Con `keep_aspect` viene ricalcolata la coppia ridotta `x:y` usata dai
//!   filtri di padding

use crate::error::{MediaError, Result};
use crate::probe::{Resolution, VideoInfo};
use crate::utils::reduce_ratio;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static FIXED_WIDTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)x\?$").unwrap());
static FIXED_HEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\?x(\d+)$").unwrap());
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)%$").unwrap());
static EXACT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)x(\d+)$").unwrap());

/// Declarative output size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    FixedWidth(u32),
    FixedHeight(u32),
    Percent(u32),
    Exact(u32, u32),
}

impl FromStr for SizeSpec {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let err = || MediaError::SizeFormat(s.to_string());
        let num = |m: &str| m.parse::<u32>().map_err(|_| err());

        if let Some(c) = FIXED_WIDTH_RE.captures(text) {
            Ok(SizeSpec::FixedWidth(num(&c[1])?))
        } else if let Some(c) = FIXED_HEIGHT_RE.captures(text) {
            Ok(SizeSpec::FixedHeight(num(&c[1])?))
        } else if let Some(c) = PERCENT_RE.captures(text) {
            Ok(SizeSpec::Percent(num(&c[1])?))
        } else if let Some(c) = EXACT_RE.captures(text) {
            Ok(SizeSpec::Exact(num(&c[1])?, num(&c[2])?))
        } else {
            Err(err())
        }
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeSpec::FixedWidth(w) => write!(f, "{}x?", w),
            SizeSpec::FixedHeight(h) => write!(f, "?x{}", h),
            SizeSpec::Percent(p) => write!(f, "{}%", p),
            SizeSpec::Exact(w, h) => write!(f, "{}x{}", w, h),
        }
    }
}

/// Reduced aspect pair of the computed size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectPair {
    pub x: u64,
    pub y: u64,
    /// `x:y`
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionResult {
    pub width: u32,
    pub height: u32,
    pub aspect: Option<AspectPair>,
}

impl DimensionResult {
    /// `WxH`, the argument of `-s`
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Scale and pad filter, present only when an aspect pair was computed
    pub fn pad_filter(&self, padding_color: Option<&str>) -> Option<String> {
        self.aspect.as_ref().map(|aspect| pad_filter(aspect, padding_color))
    }
}

/// `scale` correcting the pixel aspect, then `pad` to the `x:y` frame
pub fn pad_filter(aspect: &AspectPair, padding_color: Option<&str>) -> String {
    let ratio = format!("({}/{})", aspect.x, aspect.y);
    let mut filter = format!(
        "scale=iw*sar:ih, pad=max(iw\\,ih*{ratio}):ow/{ratio}:(ow-iw)/2:(oh-ih)/2",
        ratio = ratio
    );
    if let Some(color) = padding_color {
        filter.push(':');
        filter.push_str(color);
    }
    filter
}

/// Resolution the size specification is computed against
pub fn reference_resolution(video: &VideoInfo, keep_pixel_aspect: bool) -> Resolution {
    match video.resolution_square {
        Some(square) if keep_pixel_aspect => square,
        _ => video.resolution,
    }
}

/// Computes the output size for `spec` against the probed `video` stream
pub fn calculate(spec: SizeSpec, video: &VideoInfo, keep_pixel_aspect: bool, keep_aspect: bool) -> Result<DimensionResult> {
    let reference = reference_resolution(video, keep_pixel_aspect);
    let require_reference = || {
        if reference.is_empty() {
            Err(MediaError::ResolutionSquareNotDefined)
        } else {
            Ok(reference)
        }
    };
    let scaled = |value: f64| value.round() as u32;

    let (mut width, mut height) = match spec {
        SizeSpec::FixedWidth(w) => {
            let h = match video.aspect {
                Some(ref a) if a.x > 0 => scaled(w as f64 / a.x as f64 * a.y as f64),
                _ => {
                    let r = require_reference()?;
                    scaled(r.h as f64 * w as f64 / r.w as f64)
                }
            };
            (w, h)
        }
        SizeSpec::FixedHeight(h) => {
            let w = match video.aspect {
                Some(ref a) if a.y > 0 => scaled(h as f64 / a.y as f64 * a.x as f64),
                _ => {
                    let r = require_reference()?;
                    scaled(r.w as f64 * h as f64 / r.h as f64)
                }
            };
            (w, h)
        }
        SizeSpec::Percent(p) => {
            let r = require_reference()?;
            let ratio = p as f64 / 100.0;
            (scaled(r.w as f64 * ratio), scaled(r.h as f64 * ratio))
        }
        SizeSpec::Exact(w, h) => (w, h),
    };

    // most encoders reject odd dimensions
    width -= width % 2;
    height -= height % 2;

    let aspect = if keep_aspect && width > 0 && height > 0 {
        reduce_ratio(width as u64, height as u64).map(|(x, y)| AspectPair {
            x,
            y,
            label: format!("{}:{}", x, y),
        })
    } else {
        None
    };

    Ok(DimensionResult { width, height, aspect })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MediaMetadata;

    fn video(text: &str) -> VideoInfo {
        MediaMetadata::parse(text).video
    }

    #[test]
    fn test_parse_size_spec() {
        assert_eq!("640x?".parse::<SizeSpec>().unwrap(), SizeSpec::FixedWidth(640));
        assert_eq!("?x480".parse::<SizeSpec>().unwrap(), SizeSpec::FixedHeight(480));
        assert_eq!("50%".parse::<SizeSpec>().unwrap(), SizeSpec::Percent(50));
        assert_eq!("1280x720".parse::<SizeSpec>().unwrap(), SizeSpec::Exact(1280, 720));
        assert_eq!(SizeSpec::FixedWidth(640).to_string(), "640x?");

        for bad in ["", "?x?", "640", "640x", "axb", "12.5%"] {
            assert_eq!(bad.parse::<SizeSpec>().unwrap_err().code(), 110, "{}", bad);
        }
    }

    #[test]
    fn test_fixed_width_uses_metadata_aspect() {
        let v = video("Video: h264, 1920x1080 [SAR 1:1 DAR 16:9]");
        let result = calculate(SizeSpec::FixedWidth(640), &v, false, false).unwrap();
        assert_eq!((result.width, result.height), (640, 360));
        assert!(result.aspect.is_none());
    }

    #[test]
    fn test_dimensions_are_forced_even() {
        let v = video("Video: h264, 1921x1081");
        let result = calculate(SizeSpec::FixedWidth(640), &v, false, true).unwrap();
        assert_eq!(result.width % 2, 0);
        assert_eq!(result.height % 2, 0);

        let v = video("Video: h264, 640x480");
        let result = calculate(SizeSpec::FixedWidth(100), &v, false, false).unwrap();
        // 100 / 4 * 3 = 75
        assert_eq!((result.width, result.height), (100, 74));

        let result = calculate(SizeSpec::Exact(641, 363), &v, false, false).unwrap();
        assert_eq!(result.size_arg(), "640x362");
    }

    #[test]
    fn test_fixed_height_and_percent() {
        let v = video("Video: h264, 1280x720");
        let result = calculate(SizeSpec::FixedHeight(360), &v, false, false).unwrap();
        assert_eq!((result.width, result.height), (640, 360));

        let result = calculate(SizeSpec::Percent(25), &v, false, false).unwrap();
        assert_eq!((result.width, result.height), (320, 180));
    }

    #[test]
    fn test_keep_pixel_aspect_uses_square_resolution() {
        let v = video("Video: mpeg2video, 720x576 [SAR 16:15 DAR 4:3]");
        let result = calculate(SizeSpec::Percent(50), &v, true, false).unwrap();
        assert_eq!((result.width, result.height), (384, 288));

        let result = calculate(SizeSpec::Percent(50), &v, false, false).unwrap();
        assert_eq!((result.width, result.height), (360, 288));
    }

    #[test]
    fn test_keep_aspect_emits_reduced_pair() {
        let v = video("Video: h264, 1280x720");
        let result = calculate(SizeSpec::Exact(640, 480), &v, false, true).unwrap();
        let aspect = result.aspect.clone().unwrap();
        assert_eq!((aspect.x, aspect.y), (4, 3));
        assert_eq!(aspect.label, "4:3");
        assert_eq!(
            result.pad_filter(Some("black")).unwrap(),
            "scale=iw*sar:ih, pad=max(iw\\,ih*(4/3)):ow/(4/3):(ow-iw)/2:(oh-ih)/2:black"
        );
        assert_eq!(
            result.pad_filter(None).unwrap(),
            "scale=iw*sar:ih, pad=max(iw\\,ih*(4/3)):ow/(4/3):(ow-iw)/2:(oh-ih)/2"
        );
    }

    #[test]
    fn test_missing_reference_fails() {
        let v = VideoInfo::default();
        assert_eq!(
            calculate(SizeSpec::Percent(50), &v, true, true).unwrap_err().code(),
            111
        );
        assert_eq!(
            calculate(SizeSpec::FixedHeight(200), &v, false, false).unwrap_err().code(),
            111
        );
        // literal sizes need no reference
        let result = calculate(SizeSpec::Exact(320, 240), &v, true, true).unwrap();
        assert_eq!(result.aspect.unwrap().label, "4:3");
    }
}
