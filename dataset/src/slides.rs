//! Whole-slide image discovery
//!
//! Walks a directory tree for slide files and indexes them by name (file name
//! without extension). Slide contents are never opened here.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Supported slide file extensions
pub const SLIDE_EXTENSIONS: &[&str] = &[
    "svs", "ndpi", "tiff", "tif", "vms", "vmu", "scn", "mrxs", "jpg", "jpeg", "png",
];

/// Errors that can occur when scanning for slides
#[derive(Debug, Error)]
pub enum SlideError {
    #[error("Slides directory not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Slides path is not a directory: {0:?}")]
    NotADirectory(PathBuf),
}

/// File name without its final extension
pub fn path_to_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Lowercase final extension, empty when there is none
pub fn path_to_ext(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Whether `path` has a slide file extension
pub fn is_slide(path: &Path) -> bool {
    SLIDE_EXTENSIONS.contains(&path_to_ext(path).as_str())
}

/// Slides found under a directory
#[derive(Debug, Clone, Default)]
pub struct SlideTree {
    /// Slide name -> first path seen
    pub slides: IndexMap<String, PathBuf>,
    /// Slide name -> every further path sharing that name, if any
    pub duplicates: Option<IndexMap<String, Vec<PathBuf>>>,
}

impl SlideTree {
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Slide paths in discovery order
    pub fn paths(&self) -> Vec<PathBuf> {
        self.slides.values().cloned().collect()
    }
}

/// Recursively search `root` for slides
///
/// Entries are visited in file-name order so the first path kept for a name
/// is deterministic; later paths with the same name are reported as
/// duplicates. Symlinked directories are not followed and unreadable entries
/// are skipped.
pub fn slide_directory_tree(root: &Path) -> Result<SlideTree, SlideError> {
    if !root.exists() {
        return Err(SlideError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(SlideError::NotADirectory(root.to_path_buf()));
    }

    let mut slides: IndexMap<String, PathBuf> = IndexMap::new();
    let mut duplicates: IndexMap<String, Vec<PathBuf>> = IndexMap::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };
        let path = entry.path();
        // Symlinks to files count; symlinks to directories are never walked
        let is_file = entry.file_type().is_file() || (entry.path_is_symlink() && path.is_file());
        if !is_file || !is_slide(path) {
            continue;
        }

        let name = path_to_name(path);
        if slides.contains_key(&name) {
            warn!("Duplicate slide '{}' at {:?}", name, path);
            duplicates.entry(name).or_default().push(path.to_path_buf());
        } else {
            debug!("Found slide: {} at {:?}", name, path);
            slides.insert(name, path.to_path_buf());
        }
    }

    info!("Found {} slides in {:?}", slides.len(), root);
    Ok(SlideTree {
        slides,
        duplicates: (!duplicates.is_empty()).then_some(duplicates),
    })
}
