//! File-backed persistence for calibration bounds.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use soilmon_traits::{CalibrationBounds, CalibrationStore};

/// On-disk record. Field names match the file layout deployed devices
/// already have: `left` is the dry bound, `right` the wet bound.
#[derive(Debug, Serialize, Deserialize)]
struct StoredBounds {
    left: u16,
    right: u16,
}

/// Calibration store backed by a single JSON file.
///
/// Saves go through a temp file and rename so a power cut mid-write leaves
/// the previous record intact. Missing or unreadable files load as
/// uncalibrated rather than erroring.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

impl CalibrationStore for JsonStore {
    fn load(
        &mut self,
    ) -> Result<Option<CalibrationBounds>, Box<dyn std::error::Error + Send + Sync>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "calibration file unreadable, treating device as uncalibrated"
                    );
                }
                return Ok(None);
            }
        };
        match serde_json::from_slice::<StoredBounds>(&bytes) {
            Ok(rec) => Ok(Some(CalibrationBounds {
                dry_raw: rec.left,
                wet_raw: rec.right,
            })),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "calibration file malformed, treating device as uncalibrated"
                );
                Ok(None)
            }
        }
    }

    fn save(
        &mut self,
        bounds: CalibrationBounds,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let rec = StoredBounds {
            left: bounds.dry_raw,
            right: bounds.wet_raw,
        };
        let bytes = serde_json::to_vec(&rec)?;
        write_atomic(&self.path, &bytes)?;
        tracing::debug!(
            path = %self.path.display(),
            dry_raw = bounds.dry_raw,
            wet_raw = bounds.wet_raw,
            "calibration saved"
        );
        Ok(())
    }

    fn delete(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Box::new(e)),
        }
    }
}
