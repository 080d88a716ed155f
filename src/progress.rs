//! # Progress Tracking Module
//!
//! Questo modulo gestisce il progresso delle conversioni.
//!
//! ## Responsabilità:
//! - `ProgressTracker`: estrae il marker `time=HH:MM:SS.frac` dai chunk di
//!   output di ffmpeg e lo converte in percentuale della durata totale
//! - `ProgressManager`: progress bar visuale con `indicatif` per la CLI
//! - Spinner per operazioni indeterminate (probe, lista formati)
//!
//! ## Calcolo:
//! `percent = elapsed / total * 100`, senza smoothing né clamping: marker
//! duplicati o fuori ordine producono semplicemente un nuovo valore.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:42] [=====================>------------------] 52% movie.mp3
//! ```

use crate::utils::parse_timestamp_seconds;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static TIME_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d+:\d{2}:\d{2}\.\d+)").unwrap());

/// Turns ffmpeg output chunks into completion percentages
#[derive(Debug, Clone, Copy)]
pub struct ProgressTracker {
    total_seconds: u64,
}

impl ProgressTracker {
    pub fn new(total_seconds: u64) -> Self {
        Self { total_seconds }
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    /// Percentage for the first `time=` marker in `chunk`.
    ///
    /// `None` when the chunk has no marker or the total duration is unknown.
    pub fn feed(&self, chunk: &str) -> Option<f64> {
        if self.total_seconds == 0 {
            return None;
        }
        let caps = TIME_MARKER_RE.captures(chunk)?;
        let elapsed = parse_timestamp_seconds(&caps[1]).ok()?;
        Some(elapsed as f64 / self.total_seconds as f64 * 100.0)
    }
}

/// Manages the terminal progress bar for a conversion
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new percentage progress bar
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(100);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );

        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Move the bar to `percent`, clamped to the bar length
    pub fn set_percent(&self, percent: f64) {
        self.bar.set_position(percent.clamp(0.0, 100.0) as u64);
    }

    /// Set a custom message without moving the bar
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop the bar where it is
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}
