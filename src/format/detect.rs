//! Format detection for OME-TIFF files.
//!
//! Detection is by file name only: the path must end with one of
//! [`OME_TIFF_SUFFIXES`], compared case-sensitively. Nothing is opened, so
//! a host can try many candidate readers cheaply. Content checks (TIFF
//! magic, OME-XML flag) happen when the file is actually read.

use std::path::{Path, PathBuf};

// =============================================================================
// PathInput
// =============================================================================

/// A single path or a list of paths handed over by the host.
///
/// Only the first path of a list is ever used; the rest are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathInput {
    Single(PathBuf),
    Many(Vec<PathBuf>),
}

impl PathInput {
    /// The path that will be read, `None` for an empty list.
    pub fn first(&self) -> Option<&Path> {
        match self {
            PathInput::Single(path) => Some(path),
            PathInput::Many(paths) => paths.first().map(PathBuf::as_path),
        }
    }
}

impl From<PathBuf> for PathInput {
    fn from(path: PathBuf) -> Self {
        PathInput::Single(path)
    }
}

impl From<&Path> for PathInput {
    fn from(path: &Path) -> Self {
        PathInput::Single(path.to_path_buf())
    }
}

impl From<&str> for PathInput {
    fn from(path: &str) -> Self {
        PathInput::Single(PathBuf::from(path))
    }
}

impl From<String> for PathInput {
    fn from(path: String) -> Self {
        PathInput::Single(PathBuf::from(path))
    }
}

impl<P: Into<PathBuf>> From<Vec<P>> for PathInput {
    fn from(paths: Vec<P>) -> Self {
        PathInput::Many(paths.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Suffix Detection
// =============================================================================

/// File name suffixes recognized as OME-TIFF.
pub const OME_TIFF_SUFFIXES: [&str; 4] = [".ome.tif", ".ome.tiff", ".ome_tif", ".ome_tiff"];

/// Check whether a path names an OME-TIFF file.
///
/// The check is on the full path string, so a bare `".ome.tif"` matches and
/// `"FILE.OME.TIF"` does not.
pub fn is_ome_tiff_path(path: &Path) -> bool {
    // Non-UTF-8 paths go through lossy conversion; the suffixes are ASCII
    let name = path.to_string_lossy();
    OME_TIFF_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

/// Resolve the path a host input refers to if it names an OME-TIFF file.
pub fn detect_ome_tiff(input: &PathInput) -> Option<&Path> {
    input.first().filter(|path| is_ome_tiff_path(path))
}

// =============================================================================
// Content Sniffing
// =============================================================================

/// Check whether an ImageDescription carries an OME-XML document.
///
/// Surrounding whitespace is ignored. The document must start with markup
/// and end by closing the `OME` root, with or without a namespace prefix.
pub fn is_ome_description(description: &str) -> bool {
    let trimmed = description.trim();
    trimmed.starts_with('<') && trimmed.ends_with("OME>")
}

// =============================================================================
// Tests
// =============================================================================
