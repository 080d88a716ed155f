//! # Tool Path Resolver
//!
//! This module finds the ffmpeg executable in the different environments the
//! converter runs in:
//! - Explicit path from the configuration
//! - `FFMPEG_PATH` environment variable
//! - Bundled next to a packaged desktop app (`tools/<platform>/ffmpeg`)
//! - System PATH
//!
//! The conversion core never discovers the binary by itself: it receives the
//! resolved path through `FfmpegContext`.

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Archive name used by packaged desktop apps
const ARCHIVE_DIR: &str = "app.asar";
/// Real location of native binaries once the archive is unpacked
const UNPACKED_DIR: &str = "app.asar.unpacked";

/// Tool path resolver for different deployment environments
pub struct ToolPathResolver {
    /// Base directory where tools are bundled
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a new path resolver
    pub fn new() -> Self {
        Self {
            tools_dir: Self::detect_bundled_tools_dir(),
        }
    }

    /// Resolver with an explicit bundled tools directory
    pub fn with_tools_dir(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(tools_dir.into()),
        }
    }

    /// Detect the bundled tools directory
    fn detect_bundled_tools_dir() -> Option<PathBuf> {
        // Strategy 1: Check TOOLS_DIR environment variable (direct override)
        if let Ok(tools_dir) = env::var("TOOLS_DIR") {
            let tools_path = PathBuf::from(tools_dir);
            debug!("Checking TOOLS_DIR environment variable: {:?}", tools_path);
            if tools_path.exists() {
                return Some(tools_path);
            }
        }

        // Strategy 2: Look next to the executable
        if let Ok(exe_path) = env::current_exe() {
            if let Some(app_dir) = exe_path.parent() {
                let possible_paths = [
                    app_dir.join("resources").join("tools"),
                    app_dir.join("resources").join(UNPACKED_DIR).join("tools"),
                    app_dir.join("tools"),
                ];

                for path in &possible_paths {
                    debug!("Checking bundled path: {:?}", path);
                    if path.exists() {
                        return Some(path.clone());
                    }
                }
            }
        }

        debug!("No bundled tools directory found");
        None
    }

    /// Resolve the ffmpeg executable.
    ///
    /// `explicit` (from the configuration) wins, then `FFMPEG_PATH`, then the
    /// bundled copy, then the system PATH.
    pub fn resolve_ffmpeg(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            debug!("Using configured ffmpeg: {:?}", path);
            return Some(unpacked_path(path));
        }

        if let Some(path) = env::var_os("FFMPEG_PATH").filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            debug!("Using ffmpeg from FFMPEG_PATH: {:?}", path);
            return Some(unpacked_path(&path));
        }

        self.resolve_tool("ffmpeg")
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        if let Some(ref tools_dir) = self.tools_dir {
            let bundled_path = self.get_bundled_tool_path(tools_dir, tool_name);
            if bundled_path.exists() {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled_path);
                return Some(unpacked_path(&bundled_path));
            }
        }

        if let Some(system_path) = self.find_in_system_path(tool_name) {
            debug!("Using system tool: {} -> {:?}", tool_name, system_path);
            return Some(system_path);
        }

        warn!("Tool not found: {}", tool_name);
        None
    }

    /// Get the expected path for a bundled tool
    fn get_bundled_tool_path(&self, tools_dir: &Path, tool_name: &str) -> PathBuf {
        let platform = if cfg!(target_os = "windows") {
            "windows"
        } else if cfg!(target_os = "linux") {
            "linux"
        } else if cfg!(target_os = "macos") {
            "darwin"
        } else {
            env::consts::OS
        };

        tools_dir.join(platform).join(executable_name(tool_name))
    }

    /// Find tool in system PATH
    fn find_in_system_path(&self, tool_name: &str) -> Option<PathBuf> {
        let tool_with_ext = executable_name(tool_name);

        env::split_paths(&env::var_os("PATH")?)
            .map(|dir| dir.join(&tool_with_ext))
            .find(|path| path.is_file())
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn executable_name(tool_name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool_name)
    } else {
        tool_name.to_string()
    }
}

/// Points a path inside a packaged `app.asar` archive at the unpacked copy.
///
/// Only the last occurrence is rewritten, and paths already pointing into
/// `app.asar.unpacked` are left alone.
pub fn unpacked_path(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    match (text.rfind(ARCHIVE_DIR), text.rfind(UNPACKED_DIR)) {
        (Some(occ), unpacked) if unpacked != Some(occ) => {
            let mut fixed = String::with_capacity(text.len() + UNPACKED_DIR.len());
            fixed.push_str(&text[..occ]);
            fixed.push_str(UNPACKED_DIR);
            fixed.push_str(&text[occ + ARCHIVE_DIR.len()..]);
            PathBuf::from(fixed)
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unpacked_path() {
        assert_eq!(
            unpacked_path(Path::new("/app/resources/app.asar/node_modules/ffmpeg")),
            PathBuf::from("/app/resources/app.asar.unpacked/node_modules/ffmpeg")
        );
        assert_eq!(
            unpacked_path(Path::new("/app/resources/app.asar.unpacked/ffmpeg")),
            PathBuf::from("/app/resources/app.asar.unpacked/ffmpeg")
        );
        assert_eq!(unpacked_path(Path::new("/usr/bin/ffmpeg")), PathBuf::from("/usr/bin/ffmpeg"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let resolver = ToolPathResolver::with_tools_dir("/nonexistent");
        let resolved = resolver.resolve_ffmpeg(Some(Path::new("/opt/ffmpeg")));
        assert_eq!(resolved, Some(PathBuf::from("/opt/ffmpeg")));
    }

    #[test]
    fn test_bundled_tool_is_found() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = ToolPathResolver::with_tools_dir(temp_dir.path());
        let expected = resolver.get_bundled_tool_path(temp_dir.path(), "fake-tool-xyz");
        std::fs::create_dir_all(expected.parent().unwrap()).unwrap();
        std::fs::write(&expected, b"").unwrap();

        assert_eq!(resolver.resolve_tool("fake-tool-xyz"), Some(expected));
    }

    #[test]
    fn test_missing_tool() {
        let resolver = ToolPathResolver::with_tools_dir("/nonexistent");
        assert_eq!(resolver.resolve_tool("definitely-not-a-real-tool-1234"), None);
    }
}
