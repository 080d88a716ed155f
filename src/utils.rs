//! # Utility Functions Module
//!
//! This module provides the small helpers shared by the probe, the command
//! builder and the presets: argument vectors, time parsing, integer ratios,
//! directory creation and strict option merging.

use crate::error::{MediaError, Result};
use regex::Regex;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+):(\d{2}):(\d{2})(?:\.(\d+))?").unwrap());

static HMS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+):(\d{2}):(\d{2})").unwrap());

/// Converts a vector of string-like items to Vec<String>.
///
/// # Example
/// ```rust
/// use media_converter::utils::to_string_vec;
///
/// let quality = 85;
/// let args = to_string_vec(["-q:v", &quality.to_string(), "-y"]);
/// assert_eq!(args, vec!["-q:v", "85", "-y"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Macro for even more convenient argument building.
///
/// # Example
/// ```rust
/// use media_converter::args;
///
/// let rate = 44100;
/// let args = args!["-ar", rate, "-ac", 2];
/// assert_eq!(args, vec!["-ar", "44100", "-ac", "2"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$(::std::string::ToString::to_string(&$item)),*])
    };
}

/// Parses an ffmpeg timestamp (`HH:MM:SS.frac`) into whole seconds.
///
/// The fractional part is discarded: `"00:01:30.500"` is 90 seconds.
pub fn parse_timestamp_seconds(text: &str) -> Result<u64> {
    let caps = TIMESTAMP_RE
        .captures(text)
        .ok_or_else(|| MediaError::TimeNotValid(text.to_string()))?;

    let field = |i: usize| caps[i].parse::<u64>().map_err(|_| MediaError::TimeNotValid(text.to_string()));
    hms_to_seconds(field(1)?, field(2)?, field(3)?).ok_or_else(|| MediaError::TimeNotValid(text.to_string()))
}

/// `None` when the total does not fit in `u64`
fn hms_to_seconds(hours: u64, minutes: u64, seconds: u64) -> Option<u64> {
    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

/// Greatest common divisor, `gcd(a, 0) == a`
pub fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Reduces `x:y` by their gcd. Returns `None` when both are zero.
pub fn reduce_ratio(x: u64, y: u64) -> Option<(u64, u64)> {
    match gcd(x, y) {
        0 => None,
        g => Some((x / g, y / g)),
    }
}

/// Position of `value` inside `items`
pub fn position_of<T: PartialEq>(value: &T, items: &[T]) -> Option<usize> {
    items.iter().position(|item| item == value)
}

/// Creates `dir` and every missing parent, like `mkdir -p`.
///
/// Existing directories are fine. A path that exists but is not a directory,
/// or any filesystem error, fails with the `Mkdir` error.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        tracing::warn!("Failed to create {}: {}", dir.display(), e);
        MediaError::Mkdir(dir.display().to_string())
    })
}

/// Shallow merge of `overrides` into `base`.
///
/// Every key of `overrides` must already be a field of `base`, otherwise the
/// merge fails with `InvalidOptionName`. A null or empty object leaves `base`
/// untouched.
pub fn merge_options<T>(base: T, overrides: &serde_json::Value) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let overrides = match overrides {
        serde_json::Value::Null => return Ok(base),
        serde_json::Value::Object(map) if map.is_empty() => return Ok(base),
        serde_json::Value::Object(map) => map,
        other => {
            return Err(MediaError::InvalidOptionValue {
                name: "<root>".to_string(),
                reason: format!("expected an object, got {}", other),
            })
        }
    };

    let mut merged = match serde_json::to_value(&base) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => {
            return Err(MediaError::InvalidOptionValue {
                name: "<root>".to_string(),
                reason: "base options are not an object".to_string(),
            })
        }
    };

    for (key, value) in overrides {
        if !merged.contains_key(key) {
            return Err(MediaError::InvalidOptionName(key.clone()));
        }
        merged.insert(key.clone(), value.clone());
    }

    serde_json::from_value(serde_json::Value::Object(merged)).map_err(|e| MediaError::InvalidOptionValue {
        name: "<merged>".to_string(),
        reason: e.to_string(),
    })
}

/// A start time or a duration, kept as whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(into = "u64")]
pub struct TimeSpec {
    seconds: u64,
}

impl TimeSpec {
    pub fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    /// `None` on overflow
    pub fn from_hms(hours: u64, minutes: u64, seconds: u64) -> Option<Self> {
        hms_to_seconds(hours, minutes, seconds).map(Self::from_seconds)
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }
}

impl From<TimeSpec> for u64 {
    fn from(time: TimeSpec) -> u64 {
        time.seconds
    }
}

impl FromStr for TimeSpec {
    type Err = MediaError;

    /// Accepts any text containing `H:MM:SS`
    fn from_str(s: &str) -> Result<Self> {
        let caps = HMS_RE.captures(s).ok_or_else(|| MediaError::TimeNotValid(s.to_string()))?;
        let field = |i: usize| caps[i].parse::<u64>().map_err(|_| MediaError::TimeNotValid(s.to_string()));
        Self::from_hms(field(1)?, field(2)?, field(3)?).ok_or_else(|| MediaError::TimeNotValid(s.to_string()))
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = (self.seconds / 3600, (self.seconds % 3600) / 60, self.seconds % 60);
        write!(f, "{:02}:{:02}:{:02}", h, m, s)
    }
}

impl<'de> Deserialize<'de> for TimeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(TimeSpec::from_seconds(seconds)),
            Raw::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}
