//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file prodotti dalle conversioni.
//!
//! ## Responsabilità:
//! - Elenco ordinato dei file generati in una cartella di output (frame estratti)
//! - Informazioni su dimensione e data di modifica di un output
//! - Formattazione human-readable delle dimensioni
//!
//! ## Esempio:
//! ```rust,no_run
//! use media_converter::file_manager::FileManager;
//! use std::path::Path;
//!
//! let frames = FileManager::list_output_files(Path::new("/tmp/frames"))?;
//! for frame in frames {
//!     println!("{}", frame.display());
//! }
//! # Ok::<(), media_converter::MediaError>(())
//! ```

use crate::error::{MediaError, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use walkdir::WalkDir;

/// Operations on conversion outputs
pub struct FileManager;

impl FileManager {
    /// Size in bytes and modification time (unix seconds) of a file
    pub async fn get_file_info(path: &Path) -> Result<(u64, u64)> {
        let metadata = fs::metadata(path).await?;
        let modified = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Ok((metadata.len(), modified))
    }

    /// Files directly inside `folder`, sorted by name.
    ///
    /// Fails with `NoOutputProduced` when the folder holds no file.
    pub fn list_output_files(folder: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        if files.is_empty() {
            return Err(MediaError::NoOutputProduced(folder.to_path_buf()));
        }
        files.sort();
        Ok(files)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_list_output_files_sorted_and_flat() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["clip_2.jpg", "clip_10.jpg", "clip_1.jpg"] {
            std::fs::write(temp_dir.path().join(name), b"jpg").unwrap();
        }
        std::fs::create_dir(temp_dir.path().join("nested")).unwrap();
        std::fs::write(temp_dir.path().join("nested").join("clip_3.jpg"), b"jpg").unwrap();

        let files = FileManager::list_output_files(temp_dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["clip_1.jpg", "clip_10.jpg", "clip_2.jpg"]);
    }

    #[test]
    fn test_empty_folder_is_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let err = assert_err!(FileManager::list_output_files(temp_dir.path()));
        assert_eq!(err.code(), 117);

        let missing = temp_dir.path().join("missing");
        assert_eq!(assert_err!(FileManager::list_output_files(&missing)).code(), 117);
    }

    #[tokio::test]
    async fn test_get_file_info() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("out.mp3");
        std::fs::write(&file, vec![0u8; 2048]).unwrap();

        let (size, modified) = assert_ok!(FileManager::get_file_info(&file).await);
        assert_eq!(size, 2048);
        assert!(modified > 0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1536), "1.50 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
