//! Image directory frame source.
//!
//! `ImageDirectory` enumerates frame identifiers from a local directory.
//! It only lists paths; pixels are read later, one frame at a time, by the loader.

use std::path::{Path, PathBuf};

use crate::error::{IntakeError, Result};
use crate::frame::FrameId;

/// Extensions accepted when no explicit whitelist is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Configuration for a directory source.
#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub path: PathBuf,
    /// Extension whitelist without the leading dot. Matched case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/images"),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Directory of still images.
#[derive(Clone, Debug)]
pub struct ImageDirectory {
    path: PathBuf,
    extensions: Vec<String>,
}

impl ImageDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        let extensions = config
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            path: config.path,
            extensions,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List matching regular files, sorted by path.
    ///
    /// Fails with `SourceUnavailable` when the directory does not exist.
    pub fn scan(&self) -> Result<Vec<FrameId>> {
        if !self.path.is_dir() {
            return Err(IntakeError::SourceUnavailable {
                path: self.path.clone(),
            });
        }
        let entries = std::fs::read_dir(&self.path).map_err(|_| IntakeError::SourceUnavailable {
            path: self.path.clone(),
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!(
                        "ImageDirectory: skipping unreadable entry in {}: {}",
                        self.path.display(),
                        err
                    );
                    continue;
                }
            };
            let path = entry.path();
            if !self.has_allowed_extension(&path) {
                continue;
            }
            // Follows symlinks, so a link to a regular file is accepted.
            if !path.is_file() {
                continue;
            }
            ids.push(FrameId::new(path));
        }
        ids.sort();
        Ok(ids)
    }

    /// Like [`scan`](Self::scan), but a missing directory yields an empty set.
    pub fn discover(&self) -> Vec<FrameId> {
        match self.scan() {
            Ok(ids) => {
                log::info!(
                    "ImageDirectory: discovered {} frames in {}",
                    ids.len(),
                    self.path.display()
                );
                ids
            }
            Err(err) => {
                log::warn!("ImageDirectory: {}; continuing with no frames", err);
                Vec::new()
            }
        }
    }

    fn has_allowed_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.extensions.iter().any(|allowed| *allowed == ext)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dir_source(path: &Path) -> ImageDirectory {
        ImageDirectory::new(DirectoryConfig {
            path: path.to_path_buf(),
            ..DirectoryConfig::default()
        })
    }

    #[test]
    fn scan_filters_extensions_case_insensitively() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["b.PNG", "a.jpg", "c.JpEg", "d.bmp", "notes.txt", "noext"] {
            fs::write(dir.path().join(name), b"x")?;
        }
        fs::create_dir(dir.path().join("nested.png"))?;

        let ids = dir_source(dir.path()).scan()?;
        let names: Vec<_> = ids
            .iter()
            .map(|id| id.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.JpEg", "d.bmp"]);
        Ok(())
    }

    #[test]
    fn scan_order_is_stable() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for i in 0..12 {
            fs::write(dir.path().join(format!("frame_{i:02}.png")), b"x")?;
        }
        let source = dir_source(dir.path());
        assert_eq!(source.scan()?, source.scan()?);
        Ok(())
    }

    #[test]
    fn missing_directory_is_unavailable_but_discover_is_empty() {
        let source = dir_source(Path::new("/definitely/not/here/frames"));
        assert!(matches!(
            source.scan(),
            Err(IntakeError::SourceUnavailable { .. })
        ));
        assert!(source.discover().is_empty());
    }

    #[test]
    fn custom_whitelist_accepts_leading_dots() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.png"), b"x")?;
        fs::write(dir.path().join("b.tif"), b"x")?;
        let source = ImageDirectory::new(DirectoryConfig {
            path: dir.path().to_path_buf(),
            extensions: vec![".TIF".to_string()],
        });
        let ids = source.scan()?;
        assert_eq!(ids, vec![FrameId::new(dir.path().join("b.tif"))]);
        Ok(())
    }
}
