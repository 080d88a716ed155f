//! # Command Builder Module
//!
//! Questo modulo accumula gli argomenti di una invocazione di ffmpeg e la
//! esegue.
//!
//! ## Responsabilità:
//! - Input multipli (`-i`), flag con al massimo un argomento, frammenti di
//!   filter graph e un unico path di output
//! - Rifiuto dei flag duplicati (`DuplicateCommand`): impostazioni in
//!   conflitto aggiunte da step diversi emergono come errore
//! - Rendering nell'ordine `bin -i ... <flags> -filter_complex <f1, f2> -y <out>`
//! - Esecuzione tramite `process::start_conversion`, con progress tracker
//!
//! ## Esempio:
//! ```rust
//! use media_converter::CommandPlan;
//!
//! let mut plan = CommandPlan::new("ffmpeg");
//! plan.add_input("in.mp4");
//! plan.add_command("-an", None::<&str>).unwrap();
//! plan.set_output("out.mp4");
//! assert_eq!(plan.render().unwrap(), vec!["ffmpeg", "-i", "in.mp4", "-an", "-y", "out.mp4"]);
//! ```

use crate::error::{MediaError, Result};
use crate::process::{self, Conversion};
use crate::progress::ProgressTracker;
use crate::utils::position_of;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ordered ffmpeg command line under construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandPlan {
    bin: PathBuf,
    inputs: Vec<String>,
    commands: Vec<String>,
    flag_names: Vec<String>,
    filters: Vec<String>,
    output: Option<String>,
}

impl CommandPlan {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            ..Default::default()
        }
    }

    pub fn add_input(&mut self, input: impl Into<String>) -> &mut Self {
        self.inputs.push(input.into());
        self
    }

    /// Adds `name` with an optional argument. Each name may appear once.
    pub fn add_command<A: ToString>(&mut self, name: &str, argument: Option<A>) -> Result<&mut Self> {
        if position_of(&name.to_string(), &self.flag_names).is_some() {
            return Err(MediaError::DuplicateCommand(name.to_string()));
        }

        self.flag_names.push(name.to_string());
        self.commands.push(name.to_string());
        if let Some(argument) = argument {
            self.commands.push(argument.to_string());
        }
        Ok(self)
    }

    /// Adds a flag with one argument
    pub fn add_arg(&mut self, name: &str, argument: impl ToString) -> Result<&mut Self> {
        self.add_command(name, Some(argument))
    }

    /// Adds a flag without argument
    pub fn add_flag(&mut self, name: &str) -> Result<&mut Self> {
        self.add_command(name, None::<String>)
    }

    pub fn add_filter(&mut self, filter: impl Into<String>) -> &mut Self {
        self.filters.push(filter.into());
        self
    }

    pub fn set_output(&mut self, output: impl AsRef<Path>) -> &mut Self {
        self.output = Some(output.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.flag_names.iter().any(|f| f == name)
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// Full argument vector, binary first
    pub fn render(&self) -> Result<Vec<String>> {
        let output = self.output.as_ref().ok_or(MediaError::OutputNotSpecified)?;

        let mut argv = Vec::with_capacity(self.inputs.len() * 2 + self.commands.len() + 5);
        argv.push(self.bin.to_string_lossy().into_owned());
        for input in &self.inputs {
            argv.push("-i".to_string());
            argv.push(input.clone());
        }
        argv.extend(self.commands.iter().cloned());
        if !self.filters.is_empty() {
            argv.push("-filter_complex".to_string());
            argv.push(self.filters.join(", "));
        }
        argv.push("-y".to_string());
        argv.push(output.clone());
        Ok(argv)
    }

    /// Rendered command line for logs and display
    pub fn command_line(&self) -> Result<String> {
        Ok(self
            .render()?
            .iter()
            .map(|arg| if arg.contains(' ') { format!("\"{}\"", arg) } else { arg.clone() })
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Spawns the plan. The conversion resolves to `expected_output` if
    /// ffmpeg exits cleanly and that path exists afterwards.
    pub fn execute(&self, expected_output: impl Into<PathBuf>, total_seconds: u64) -> Result<Conversion<PathBuf>> {
        let argv = self.render()?;
        debug!("ffmpeg exec started (cmd: {})", self.command_line()?);
        process::start_conversion(&argv, expected_output.into(), ProgressTracker::new(total_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_order() {
        let mut plan = CommandPlan::new("/usr/bin/ffmpeg");
        plan.add_input("movie.mp4").add_input("logo.png");
        plan.add_arg("-vcodec", "libx264").unwrap();
        plan.add_flag("-an").unwrap();
        plan.add_filter("overlay=0+0+0:0+0+0").add_filter("select=not(mod(n\\,10))");
        plan.set_output("out.mp4");

        assert_eq!(
            plan.render().unwrap(),
            vec![
                "/usr/bin/ffmpeg",
                "-i",
                "movie.mp4",
                "-i",
                "logo.png",
                "-vcodec",
                "libx264",
                "-an",
                "-filter_complex",
                "overlay=0+0+0:0+0+0, select=not(mod(n\\,10))",
                "-y",
                "out.mp4",
            ]
        );
    }

    #[test]
    fn test_duplicate_flag() {
        let mut plan = CommandPlan::new("ffmpeg");
        plan.add_arg("-s", "640x480").unwrap();
        let err = plan.add_arg("-s", "320x240").unwrap_err();
        assert_eq!(err.code(), 112);
        assert!(plan.has_command("-s"));

        plan.set_output("out.mp4");
        assert_eq!(plan.render().unwrap().iter().filter(|a| *a == "-s").count(), 1);
    }

    #[test]
    fn test_argument_is_not_a_flag_name() {
        let mut plan = CommandPlan::new("ffmpeg");
        plan.add_arg("-metadata", "-an").unwrap();
        assert!(plan.add_flag("-an").is_ok());
    }

    #[test]
    fn test_output_required() {
        let mut plan = CommandPlan::new("ffmpeg");
        plan.add_input("in.mp4");
        assert_eq!(plan.render().unwrap_err().code(), 115);
        assert_eq!(plan.execute("out.mp4", 0).unwrap_err().code(), 115);

        plan.set_output("final.mkv");
        let argv = plan.render().unwrap();
        assert_eq!(&argv[argv.len() - 2..], ["-y", "final.mkv"]);
        assert_eq!(argv.iter().filter(|a| *a == "final.mkv").count(), 1);
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let mut plan = CommandPlan::new("ffmpeg");
        plan.add_input("my movie.mp4");
        plan.add_filter("scale=iw*sar:ih, pad=max(iw\\,ih*(4/3))");
        plan.set_output("out.mp4");
        assert_eq!(
            plan.command_line().unwrap(),
            "ffmpeg -i \"my movie.mp4\" -filter_complex \"scale=iw*sar:ih, pad=max(iw\\,ih*(4/3))\" -y out.mp4"
        );
    }
}
