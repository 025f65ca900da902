//! Resolves which image file represents a lot.
//!
//! Production images follow one fixed name, `lot-<id>.jpg`. Fixture images
//! were collected by hand and use a few naming variants, so fixture mode
//! probes a table of name patterns crossed with extensions and takes the
//! first file that exists.

use std::path::{Path, PathBuf};

use crate::adapter::ImageRef;
use crate::error::LocateError;

const PRODUCTION_EXTENSION: &str = "jpg";

/// Probed in order; the first pattern/extension pair that exists wins.
const FIXTURE_PATTERNS: [NamePattern; 3] = [
    NamePattern::Exact,
    NamePattern::Lowercase,
    NamePattern::Suffixed("A"),
];
const FIXTURE_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamePattern {
    /// `lot-<id>`
    Exact,
    /// `lot-<lowercased id>`
    Lowercase,
    /// `lot-<id><suffix>`
    Suffixed(&'static str),
}

impl NamePattern {
    fn stem(self, lot_id: &str) -> String {
        match self {
            NamePattern::Exact => format!("lot-{lot_id}"),
            NamePattern::Lowercase => format!("lot-{}", lot_id.to_lowercase()),
            NamePattern::Suffixed(suffix) => format!("lot-{lot_id}{suffix}"),
        }
    }
}

/// Ids are spliced into a file name, so they may not be empty or carry a
/// path separator.
fn check_lot_id(lot_id: &str) -> Result<(), LocateError> {
    if lot_id.is_empty() || lot_id.contains(['/', '\\', '\0']) {
        return Err(LocateError::InvalidId {
            lot_id: lot_id.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMode {
    /// Fixed `lot-<id>.jpg` naming, no probing.
    Production,
    /// Probe the fixture pattern table.
    Fixture,
}

#[derive(Debug, Clone)]
pub struct ImageLocator {
    mode: ImageMode,
    dir: PathBuf,
}

impl ImageLocator {
    #[must_use]
    pub fn new(mode: ImageMode, dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            dir: dir.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &parkalot_core::AppConfig) -> Self {
        if config.use_test_images {
            Self::new(ImageMode::Fixture, &config.test_images_dir)
        } else {
            Self::new(ImageMode::Production, &config.images_dir)
        }
    }

    #[must_use]
    pub fn mode(&self) -> ImageMode {
        self.mode
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every path this locator would consider for `lot_id`, in probe order.
    ///
    /// Duplicates are removed, so an id that is already lowercase is only
    /// probed once per extension. An id that cannot name a file has none.
    #[must_use]
    pub fn candidates(&self, lot_id: &str) -> Vec<PathBuf> {
        if check_lot_id(lot_id).is_err() {
            return Vec::new();
        }
        match self.mode {
            ImageMode::Production => {
                vec![self
                    .dir
                    .join(format!("lot-{lot_id}.{PRODUCTION_EXTENSION}"))]
            }
            ImageMode::Fixture => {
                let mut paths: Vec<PathBuf> =
                    Vec::with_capacity(FIXTURE_PATTERNS.len() * FIXTURE_EXTENSIONS.len());
                for pattern in FIXTURE_PATTERNS {
                    let stem = pattern.stem(lot_id);
                    for ext in FIXTURE_EXTENSIONS {
                        let path = self.dir.join(format!("{stem}.{ext}"));
                        if !paths.contains(&path) {
                            paths.push(path);
                        }
                    }
                }
                paths
            }
        }
    }

    /// Resolve the image for `lot_id`, probing the filesystem in fixture mode.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::InvalidId`] for an id that is empty or holds a
    /// path separator, and [`LocateError::NotFound`] listing every candidate
    /// tried when no fixture image exists.
    pub async fn locate(&self, lot_id: &str) -> Result<ImageRef, LocateError> {
        check_lot_id(lot_id)?;
        if self.mode == ImageMode::Production {
            return self.locate_with(lot_id, |_| true);
        }

        for path in self.candidates(lot_id) {
            let exists = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if exists {
                tracing::debug!(lot_id, path = %path.display(), "locator: found fixture image");
                return Ok(ImageRef::Path(path));
            }
        }

        Err(LocateError::NotFound {
            lot_id: lot_id.to_string(),
            tried: self.candidates(lot_id),
        })
    }

    /// Resolve using a caller-supplied existence check.
    ///
    /// Production mode ignores `exists` and returns the conventional path.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::InvalidId`] for an unusable id and
    /// [`LocateError::NotFound`] when no fixture candidate passes `exists`.
    pub fn locate_with(
        &self,
        lot_id: &str,
        exists: impl Fn(&Path) -> bool,
    ) -> Result<ImageRef, LocateError> {
        check_lot_id(lot_id)?;
        let candidates = self.candidates(lot_id);
        if self.mode == ImageMode::Production {
            return candidates
                .into_iter()
                .next()
                .map(ImageRef::Path)
                .ok_or_else(|| LocateError::NotFound {
                    lot_id: lot_id.to_string(),
                    tried: Vec::new(),
                });
        }

        match candidates.iter().position(|p| exists(p)) {
            Some(i) => Ok(ImageRef::Path(candidates[i].clone())),
            None => Err(LocateError::NotFound {
                lot_id: lot_id.to_string(),
                tried: candidates,
            }),
        }
    }
}
