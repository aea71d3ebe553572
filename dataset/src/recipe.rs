//! Dataset recipes
//!
//! A recipe records which slides (and optional ROI files) make up a dataset,
//! how tiles are to be extracted from them, and where the patient annotations
//! live. Recipes serialize to JSON so a dataset can be rebuilt elsewhere.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::slides::{path_to_ext, path_to_name};

const CHUNK_SIZE: usize = 4096;

/// Keys every tile extraction setting map must carry
const REQUIRED_TILE_KEYS: [&str; 2] = ["tile_px", "tile_um"];

/// Errors that can occur when building or loading a recipe
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Tile extraction settings must include 'tile_px' and 'tile_um'")]
    InvalidTileSettings,

    #[error("Checksum mismatch for slide '{name}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid recipe JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Where a single slide is loaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlideSource {
    Path {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    Tcga {
        tcga_uuid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
}

impl SlideSource {
    pub fn sha256(&self) -> Option<&str> {
        match self {
            SlideSource::Path { sha256, .. } | SlideSource::Tcga { sha256, .. } => {
                sha256.as_deref()
            }
        }
    }
}

/// Slides referenced by a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecipeSlides {
    /// Path to a single archive holding every slide
    Archive(String),
    /// Plain list of slide paths
    Paths(Vec<String>),
    /// Slide name -> source, with optional digests
    Entries(IndexMap<String, SlideSource>),
}

impl RecipeSlides {
    /// Number of slides, `None` for an archive
    pub fn count(&self) -> Option<usize> {
        match self {
            RecipeSlides::Archive(_) => None,
            RecipeSlides::Paths(paths) => Some(paths.len()),
            RecipeSlides::Entries(entries) => Some(entries.len()),
        }
    }
}

/// ROI files referenced by a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecipeRois {
    Archive(String),
    Paths(Vec<String>),
}

/// Outcome of [`Recipe::fetch_slides`]
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub loaded: Vec<PathBuf>,
    /// Names of slides that could not be loaded
    pub failed: Vec<String>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A reproducible dataset description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub uuid: String,
    pub slides: RecipeSlides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rois: Option<RecipeRois>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_tiles_kwargs: Option<Map<String, Value>>,
    /// Path to the patient annotations file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<String>,
}

impl Recipe {
    /// Create a recipe with a fresh id
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        slides: RecipeSlides,
        rois: Option<RecipeRois>,
        extract_tiles_kwargs: Option<Map<String, Value>>,
        annotations: Option<String>,
    ) -> Result<Self, RecipeError> {
        let recipe = Self {
            name: name.into(),
            description,
            uuid: Uuid::new_v4().simple().to_string(),
            slides,
            rois,
            extract_tiles_kwargs,
            annotations,
        };
        recipe.validate()?;
        Ok(recipe)
    }

    fn validate(&self) -> Result<(), RecipeError> {
        if let Some(kwargs) = &self.extract_tiles_kwargs
            && !REQUIRED_TILE_KEYS.iter().all(|key| kwargs.contains_key(*key))
        {
            return Err(RecipeError::InvalidTileSettings);
        }
        Ok(())
    }

    pub fn as_value(&self) -> Result<Value, RecipeError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Write the recipe as pretty-printed JSON
    pub fn to_json(&self, path: &Path) -> Result<(), RecipeError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Saved recipe '{}' to {:?}", self.name, path);
        Ok(())
    }

    /// Read and validate a recipe from JSON
    pub fn from_json(path: &Path) -> Result<Self, RecipeError> {
        let content = std::fs::read_to_string(path)?;
        let recipe: Recipe = serde_json::from_str(&content)?;
        recipe.validate()?;
        debug!("Loaded recipe '{}' from {:?}", recipe.name, path);
        Ok(recipe)
    }

    /// Copy every slide source into `dest_dir`
    ///
    /// Failures are logged and counted; only recipes without per-slide
    /// sources are rejected outright.
    pub fn fetch_slides(&self, dest_dir: &Path) -> Result<FetchReport, RecipeError> {
        let entries = match &self.slides {
            RecipeSlides::Entries(entries) => entries,
            RecipeSlides::Archive(_) => {
                return Err(RecipeError::Unsupported(
                    "fetching slides from an archive".to_string(),
                ));
            }
            RecipeSlides::Paths(_) => {
                return Err(RecipeError::Unsupported(
                    "fetching slides from a plain path list".to_string(),
                ));
            }
        };

        std::fs::create_dir_all(dest_dir)?;
        let mut report = FetchReport::default();
        for (name, source) in entries {
            match load_slide(dest_dir, name, source) {
                Ok(path) => report.loaded.push(path),
                Err(e) => {
                    error!("Failed to load slide '{}': {}", name, e);
                    report.failed.push(name.clone());
                }
            }
        }

        info!(
            "Fetched {} of {} slides for recipe '{}'",
            report.loaded.len(),
            entries.len(),
            self.name
        );
        Ok(report)
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Recipe: {}", self.name)?;
        if let Some(description) = &self.description {
            writeln!(f, "Description: {}", description)?;
        }
        writeln!(f, "UUID: {}", self.uuid)?;
        if let Some(kwargs) = &self.extract_tiles_kwargs {
            let settings: Vec<String> = kwargs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            writeln!(f, "Tile settings: {}", settings.join(", "))?;
        }
        if let Some(annotations) = &self.annotations {
            writeln!(f, "Annotations: {}", annotations)?;
        }
        match &self.slides {
            RecipeSlides::Archive(path) => write!(f, "Slides: archive {}", path)?,
            other => write!(f, "Slides: {}", other.count().unwrap_or(0))?,
        }
        match &self.rois {
            Some(RecipeRois::Archive(path)) => write!(f, "\nROIs: archive {}", path)?,
            Some(RecipeRois::Paths(paths)) => write!(f, "\nROIs: {}", paths.len())?,
            None => {}
        }
        Ok(())
    }
}

/// Build a recipe from slides on the local filesystem
///
/// With `checksum`, every slide is hashed and recorded under its name;
/// otherwise the paths are stored as given.
pub fn build_local_recipe(
    name: impl Into<String>,
    description: Option<String>,
    slide_paths: &[PathBuf],
    rois: Option<RecipeRois>,
    extract_tiles_kwargs: Option<Map<String, Value>>,
    annotations: Option<String>,
    checksum: bool,
) -> Result<Recipe, RecipeError> {
    let slides = if checksum {
        let mut entries = IndexMap::with_capacity(slide_paths.len());
        for path in slide_paths {
            let digest = self::checksum(path)?;
            debug!("Checksum for {:?}: {}", path, digest);
            entries.insert(
                path_to_name(path),
                SlideSource::Path {
                    path: path.to_string_lossy().into_owned(),
                    sha256: Some(digest),
                },
            );
        }
        RecipeSlides::Entries(entries)
    } else {
        RecipeSlides::Paths(
            slide_paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        )
    };

    Recipe::new(name, description, slides, rois, extract_tiles_kwargs, annotations)
}

/// Lowercase hex SHA-256 digest of a file
pub fn checksum(path: &Path) -> Result<String, RecipeError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn verify_checksum(name: &str, path: &Path, expected: &str) -> Result<(), RecipeError> {
    let actual = checksum(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(RecipeError::ChecksumMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Load one slide into `dest_dir`, verifying its digest when one is recorded
pub fn load_slide(dest_dir: &Path, name: &str, source: &SlideSource) -> Result<PathBuf, RecipeError> {
    match source {
        SlideSource::Path { path, sha256 } => {
            let src = std::fs::canonicalize(path)?;
            let ext = path_to_ext(Path::new(path));
            let file_name = if ext.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", name, ext)
            };
            let dest = dest_dir.join(&file_name);

            // Already in place: verify without touching the file
            if let Ok(existing) = std::fs::canonicalize(&dest)
                && existing == src
            {
                if let Some(expected) = sha256 {
                    verify_checksum(name, &src, expected)?;
                }
                debug!("Slide '{}' already at {:?}", name, dest);
                return Ok(dest);
            }

            // Copy beside the destination and only replace it once verified
            let partial = dest_dir.join(format!(".{}.part", file_name));
            std::fs::copy(&src, &partial)?;
            if let Some(expected) = sha256
                && let Err(e) = verify_checksum(name, &partial, expected)
            {
                let _ = std::fs::remove_file(&partial);
                return Err(e);
            }
            if let Err(e) = std::fs::rename(&partial, &dest) {
                let _ = std::fs::remove_file(&partial);
                return Err(e.into());
            }
            debug!("Loaded slide '{}' to {:?}", name, dest);
            Ok(dest)
        }
        SlideSource::Tcga { tcga_uuid, .. } => Err(RecipeError::Unsupported(format!(
            "downloading TCGA slide {}",
            tcga_uuid
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tile_kwargs() -> Map<String, Value> {
        let mut kwargs = Map::new();
        kwargs.insert("tile_px".into(), Value::from(299));
        kwargs.insert("tile_um".into(), Value::from(302));
        kwargs
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir); // Clean up if exists
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_checksum_known_digest() {
        let dir = temp_dir("slidecohort_test_recipe_checksum");
        let file = dir.join("abc.txt");
        fs::write(&file, b"abc").unwrap();

        assert_eq!(
            checksum(&file).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_tile_settings() {
        let mut kwargs = Map::new();
        kwargs.insert("tile_px".into(), Value::from(299));
        let result = Recipe::new(
            "r",
            None,
            RecipeSlides::Paths(vec![]),
            None,
            Some(kwargs),
            None,
        );
        assert!(matches!(result, Err(RecipeError::InvalidTileSettings)));
    }

    #[test]
    fn test_build_local_recipe_with_checksums() {
        let dir = temp_dir("slidecohort_test_recipe_build");
        let slide = dir.join("S1.svs");
        fs::write(&slide, b"slide-bytes").unwrap();

        let recipe = build_local_recipe(
            "demo",
            Some("two slides".into()),
            &[slide.clone()],
            None,
            Some(tile_kwargs()),
            Some("annotations.json".into()),
            true,
        )
        .unwrap();

        assert_eq!(recipe.uuid.len(), 32);
        assert!(recipe.uuid.chars().all(|c| c.is_ascii_hexdigit()));
        match &recipe.slides {
            RecipeSlides::Entries(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(
                    entries["S1"].sha256(),
                    Some(checksum(&slide).unwrap().as_str())
                );
            }
            other => panic!("expected entries, got {:?}", other),
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_json_roundtrip_via_file() {
        let dir = temp_dir("slidecohort_test_recipe_json");
        let path = dir.join("recipe.json");
        let recipe = build_local_recipe(
            "demo",
            None,
            &[PathBuf::from("/data/a.svs"), PathBuf::from("/data/b.ndpi")],
            Some(RecipeRois::Archive("rois.zip".into())),
            Some(tile_kwargs()),
            None,
            false,
        )
        .unwrap();

        recipe.to_json(&path).unwrap();
        let loaded = Recipe::from_json(&path).unwrap();
        assert_eq!(loaded, recipe);
        assert_eq!(loaded.slides.count(), Some(2));

        let value = recipe.as_value().unwrap();
        assert_eq!(value["rois"], Value::from("rois.zip"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_slide_source_untagged() {
        let json = r#"{"a": {"path": "/x/a.svs"}, "b": {"tcga_uuid": "1234", "sha256": "ff"}}"#;
        let slides: RecipeSlides = serde_json::from_str(json).unwrap();
        let RecipeSlides::Entries(entries) = slides else {
            panic!("expected entries");
        };
        assert!(matches!(entries["a"], SlideSource::Path { .. }));
        assert!(matches!(entries["b"], SlideSource::Tcga { .. }));
        assert_eq!(entries["b"].sha256(), Some("ff"));
    }

    #[test]
    fn test_load_slide_checksum_mismatch_removes_copy() {
        let dir = temp_dir("slidecohort_test_recipe_mismatch");
        let src = dir.join("src.svs");
        fs::write(&src, b"content").unwrap();
        let dest_dir = dir.join("out");
        fs::create_dir_all(&dest_dir).unwrap();

        let source = SlideSource::Path {
            path: src.to_string_lossy().into_owned(),
            sha256: Some("00".repeat(32)),
        };
        let result = load_slide(&dest_dir, "S1", &source);
        assert!(matches!(result, Err(RecipeError::ChecksumMismatch { .. })));
        assert!(!dest_dir.join("S1.svs").exists());
        assert!(!dest_dir.join(".S1.svs.part").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_fetch_into_own_directory_keeps_slide() {
        let dir = temp_dir("slidecohort_test_recipe_in_place");
        let slide = dir.join("S1.svs");
        fs::write(&slide, b"slide-bytes").unwrap();

        let recipe = build_local_recipe("r", None, &[slide.clone()], None, None, None, true)
            .unwrap();
        let report = recipe.fetch_slides(&dir).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.loaded, vec![dir.join("S1.svs")]);
        assert_eq!(fs::read(&slide).unwrap(), b"slide-bytes");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_in_place_mismatch_leaves_slide() {
        let dir = temp_dir("slidecohort_test_recipe_in_place_mismatch");
        let slide = dir.join("S1.svs");
        fs::write(&slide, b"slide-bytes").unwrap();

        let source = SlideSource::Path {
            path: slide.to_string_lossy().into_owned(),
            sha256: Some("00".repeat(32)),
        };
        let result = load_slide(&dir, "S1", &source);
        assert!(matches!(result, Err(RecipeError::ChecksumMismatch { .. })));
        assert_eq!(fs::read(&slide).unwrap(), b"slide-bytes");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_copy_keeps_existing_destination() {
        let dir = temp_dir("slidecohort_test_recipe_keep_existing");
        let src = dir.join("src.svs");
        fs::write(&src, b"new-bytes").unwrap();
        let dest_dir = dir.join("out");
        fs::create_dir_all(&dest_dir).unwrap();
        fs::write(dest_dir.join("S1.svs"), b"old-bytes").unwrap();

        let source = SlideSource::Path {
            path: src.to_string_lossy().into_owned(),
            sha256: Some("00".repeat(32)),
        };
        assert!(load_slide(&dest_dir, "S1", &source).is_err());
        assert_eq!(fs::read(dest_dir.join("S1.svs")).unwrap(), b"old-bytes");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_fetch_slides_counts_failures() {
        let dir = temp_dir("slidecohort_test_recipe_fetch");
        let src = dir.join("good.svs");
        fs::write(&src, b"good").unwrap();

        let mut entries = IndexMap::new();
        entries.insert(
            "good".to_string(),
            SlideSource::Path {
                path: src.to_string_lossy().into_owned(),
                sha256: Some(checksum(&src).unwrap()),
            },
        );
        entries.insert(
            "remote".to_string(),
            SlideSource::Tcga {
                tcga_uuid: "abcd".into(),
                sha256: None,
            },
        );
        let recipe = Recipe::new("r", None, RecipeSlides::Entries(entries), None, None, None)
            .unwrap();

        let report = recipe.fetch_slides(&dir.join("fetched")).unwrap();
        assert_eq!(report.loaded, vec![dir.join("fetched").join("good.svs")]);
        assert_eq!(report.failed, vec!["remote".to_string()]);
        assert!(!report.is_complete());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_fetch_slides_archive_unsupported() {
        let recipe = Recipe::new(
            "r",
            None,
            RecipeSlides::Archive("slides.zip".into()),
            None,
            None,
            None,
        )
        .unwrap();
        let result = recipe.fetch_slides(Path::new("/tmp/unused"));
        assert!(matches!(result, Err(RecipeError::Unsupported(_))));
    }

    #[test]
    fn test_display_summary() {
        let recipe = Recipe::new(
            "demo",
            Some("desc".into()),
            RecipeSlides::Paths(vec!["a.svs".into()]),
            None,
            Some(tile_kwargs()),
            None,
        )
        .unwrap();
        let text = recipe.to_string();
        assert!(text.starts_with("Recipe: demo\nDescription: desc\n"));
        assert!(text.contains("tile_px=299"));
        assert!(text.ends_with("Slides: 1"));
    }
}
