use chrono::Utc;
use prediction_core::{CacheStorageError, PredictionSet};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File-backed store holding exactly one `PredictionSet`.
///
/// Reads fail soft to the empty set; writes replace the whole document via
/// a sibling temp file and rename, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct PredictionCache {
    path: PathBuf,
}

impl PredictionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted set. Missing, unreadable or corrupt storage yields
    /// the never-computed set.
    pub fn read(&self) -> PredictionSet {
        match self.try_read() {
            Ok(Some(set)) => set,
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "cache file not found, starting empty");
                PredictionSet::empty(Utc::now().naive_utc())
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to load cache, starting empty");
                PredictionSet::empty(Utc::now().naive_utc())
            }
        }
    }

    /// `Ok(None)` when nothing has been persisted yet.
    pub fn try_read(&self) -> Result<Option<PredictionSet>, CacheStorageError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Persist `set`, replacing prior content. Failures are logged, not raised.
    pub fn write(&self, set: &PredictionSet) {
        match self.try_write(set) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "cache saved"),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to save cache")
            }
        }
    }

    pub fn try_write(&self, set: &PredictionSet) -> Result<(), CacheStorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec(set)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| CacheStorageError::Persist(e.to_string()))?;
        Ok(())
    }
}
