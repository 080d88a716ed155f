//! Watermark anchors and the `overlay` filter expression.

use crate::error::{MediaError, Result};
use crate::utils::merge_options;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Anchor of the watermark inside the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum WatermarkPosition {
    NE,
    NC,
    NW,
    SE,
    SC,
    #[default]
    SW,
    C,
    CE,
    CW,
}

impl WatermarkPosition {
    pub const ALL: [WatermarkPosition; 9] = [
        WatermarkPosition::NE,
        WatermarkPosition::NC,
        WatermarkPosition::NW,
        WatermarkPosition::SE,
        WatermarkPosition::SC,
        WatermarkPosition::SW,
        WatermarkPosition::C,
        WatermarkPosition::CE,
        WatermarkPosition::CW,
    ];

    /// Base `x:y` offsets before margins are applied
    fn base(self) -> (&'static str, &'static str) {
        use WatermarkPosition::*;

        let x = match self {
            NE | SE | CE => "0",
            NC | SC | C => "main_w/2-overlay_w/2",
            NW | SW | CW => "main_w-overlay_w",
        };
        let y = match self {
            NE | NC | NW => "0",
            SE | SC | SW => "main_h-overlay_h",
            C | CE | CW => "main_h/2-overlay_h/2",
        };
        (x, y)
    }
}

impl FromStr for WatermarkPosition {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        WatermarkPosition::ALL
            .into_iter()
            .find(|p| p.to_string() == s)
            .ok_or_else(|| MediaError::InvalidWatermarkPosition(s.to_string()))
    }
}

impl TryFrom<String> for WatermarkPosition {
    type Error = MediaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for WatermarkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Margins treat anything that is not an integer as missing
fn lenient_margin<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<i64>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    })
}

/// Placement of a watermark. Missing or non-numeric margins count as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSettings {
    pub position: WatermarkPosition,
    #[serde(deserialize_with = "lenient_margin")]
    pub margin_north: Option<i64>,
    #[serde(deserialize_with = "lenient_margin")]
    pub margin_south: Option<i64>,
    #[serde(deserialize_with = "lenient_margin")]
    pub margin_east: Option<i64>,
    #[serde(deserialize_with = "lenient_margin")]
    pub margin_west: Option<i64>,
}

impl WatermarkSettings {
    pub fn at(position: WatermarkPosition) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Defaults overridden by the keys of `overrides`.
    ///
    /// A bad `position` fails with `InvalidWatermarkPosition`, other bad keys
    /// with the option errors.
    pub fn from_overrides(overrides: &serde_json::Value) -> Result<Self> {
        if let Some(position) = overrides.get("position") {
            match position.as_str() {
                Some(text) => {
                    text.parse::<WatermarkPosition>()?;
                }
                None => return Err(MediaError::InvalidWatermarkPosition(position.to_string())),
            }
        }
        merge_options(Self::default(), overrides)
    }

    /// `x:y` argument of the `overlay` filter
    pub fn overlay_expression(&self) -> String {
        let (x, y) = self.position.base();
        let m = |v: Option<i64>| v.unwrap_or(0);
        format!(
            "{}{}{}:{}{}{}",
            x,
            signed(m(self.margin_east), false),
            signed(m(self.margin_west), true),
            y,
            signed(m(self.margin_north), false),
            signed(m(self.margin_south), true),
        )
    }
}

/// Margin with its sign; `inverse` flips it for the far edge. Zero is `+0`.
fn signed(value: i64, inverse: bool) -> String {
    let plus = match value.signum() {
        0 => true,
        1 => !inverse,
        _ => inverse,
    };
    format!("{}{}", if plus { '+' } else { '-' }, value.unsigned_abs())
}

/// A watermark image plus its overlay expression
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub path: PathBuf,
    pub overlay: String,
}

impl Watermark {
    /// Fails with `InvalidWatermark` unless `path` is an existing image file
    pub fn new(path: &Path, settings: &WatermarkSettings) -> Result<Self> {
        if !path.is_file() || image::ImageFormat::from_path(path).is_err() {
            return Err(MediaError::InvalidWatermark(path.display().to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            overlay: settings.overlay_expression(),
        })
    }

    /// Filter-graph fragment for the overlay
    pub fn filter(&self) -> String {
        format!("overlay={}", self.overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_south_west_with_zero_margins() {
        let settings = WatermarkSettings::at(WatermarkPosition::SW);
        assert_eq!(settings.overlay_expression(), "main_w-overlay_w+0+0:main_h-overlay_h+0+0");
    }

    #[test]
    fn test_margin_signs() {
        let settings = WatermarkSettings {
            position: WatermarkPosition::NE,
            margin_north: Some(10),
            margin_south: Some(5),
            margin_east: Some(-3),
            margin_west: Some(-7),
        };
        assert_eq!(settings.overlay_expression(), "0-3+7:0+10-5");
    }

    #[test]
    fn test_every_position_has_an_expression() {
        let centre = WatermarkSettings::at(WatermarkPosition::C).overlay_expression();
        assert_eq!(centre, "main_w/2-overlay_w/2+0+0:main_h/2-overlay_h/2+0+0");

        for position in WatermarkPosition::ALL {
            let parsed: WatermarkPosition = position.to_string().parse().unwrap();
            assert_eq!(parsed, position);
        }
    }

    #[test]
    fn test_invalid_position() {
        let err = "NORTH".parse::<WatermarkPosition>().unwrap_err();
        assert_eq!(err.code(), 109);
        assert!(serde_json::from_value::<WatermarkSettings>(json!({ "position": "XX" })).is_err());
    }

    #[test]
    fn test_overrides_report_position_code() {
        let err = WatermarkSettings::from_overrides(&json!({ "position": "XX" })).unwrap_err();
        assert_eq!(err.code(), 109);
        let err = WatermarkSettings::from_overrides(&json!({ "position": 3 })).unwrap_err();
        assert_eq!(err.code(), 109);

        let message = serde_json::from_value::<WatermarkPosition>(json!("XX")).unwrap_err().to_string();
        assert!(message.contains("Invalid watermark position"), "{}", message);

        let settings = WatermarkSettings::from_overrides(&json!({ "position": "NE", "margin_east": 8 })).unwrap();
        assert_eq!(settings.position, WatermarkPosition::NE);
        assert_eq!(settings.margin_east, Some(8));
        assert_eq!(WatermarkSettings::from_overrides(&json!({ "colour": "red" })).unwrap_err().code(), 102);
    }

    #[test]
    fn test_non_numeric_margins_become_zero() {
        let settings: WatermarkSettings = serde_json::from_value(json!({
            "position": "SE",
            "margin_north": "ten",
            "margin_east": null,
            "margin_west": 4
        }))
        .unwrap();
        assert_eq!(settings.margin_north, None);
        assert_eq!(settings.margin_west, Some(4));
        assert_eq!(settings.overlay_expression(), "0+0-4:main_h-overlay_h+0+0");
    }

    #[test]
    fn test_watermark_file_checks() {
        let temp_dir = TempDir::new().unwrap();
        let settings = WatermarkSettings::default();

        let missing = temp_dir.path().join("logo.png");
        assert_eq!(Watermark::new(&missing, &settings).unwrap_err().code(), 108);

        let not_image = temp_dir.path().join("notes.txt");
        std::fs::write(&not_image, b"hello").unwrap();
        assert_eq!(Watermark::new(&not_image, &settings).unwrap_err().code(), 108);

        std::fs::write(&missing, b"png").unwrap();
        let watermark = Watermark::new(&missing, &settings).unwrap();
        assert_eq!(watermark.filter(), "overlay=main_w-overlay_w+0+0:main_h-overlay_h+0+0");
    }
}
