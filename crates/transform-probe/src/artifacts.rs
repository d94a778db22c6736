//! Canary artifact provisioning.
//!
//! Each canary gets a fresh copy of its source fixture and an empty target
//! file in a scratch directory. Both are [`TempPath`]s and are removed when
//! the probe finishes with them.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempPath};
use tracing::debug;

use crate::error::StorageError;

/// Produces the files a canary transform reads and writes.
pub trait ArtifactProvider: Send + Sync {
    /// A fresh temporary copy of the named fixture.
    fn source_file(&self, name: &str) -> Result<TempPath, StorageError>;

    /// A fresh, empty temporary file for the transform output.
    fn target_file(&self, name: &str) -> Result<TempPath, StorageError>;
}

/// Copies fixtures from a directory (or from bytes bundled into the binary)
/// into a scratch directory.
#[derive(Debug, Clone)]
pub struct FixtureProvider {
    fixtures_dir: PathBuf,
    scratch_dir: PathBuf,
    bundled: HashMap<String, &'static [u8]>,
}

impl FixtureProvider {
    pub fn new(fixtures_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            fixtures_dir: fixtures_dir.into(),
            scratch_dir: scratch_dir.into(),
            bundled: HashMap::new(),
        }
    }

    /// Scratch files go to the system temporary directory.
    pub fn in_temp_dir(fixtures_dir: impl Into<PathBuf>) -> Self {
        Self::new(fixtures_dir, std::env::temp_dir())
    }

    /// Serve `name` from `bytes` instead of the fixtures directory.
    ///
    /// Typically used with `include_bytes!`.
    pub fn with_bundled(mut self, name: impl Into<String>, bytes: &'static [u8]) -> Self {
        self.bundled.insert(name.into(), bytes);
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    fn create(&self, role: &'static str, name: &str) -> Result<NamedTempFile, StorageError> {
        Builder::new()
            .prefix(&format!("{role}_"))
            .suffix(&format!("_{name}"))
            .tempfile_in(&self.scratch_dir)
            .map_err(|source| StorageError::CreateTemp {
                role,
                dir: self.scratch_dir.clone(),
                source,
            })
    }
}

impl ArtifactProvider for FixtureProvider {
    fn source_file(&self, name: &str) -> Result<TempPath, StorageError> {
        let mut file = self.create("source", name)?;
        let store_err = |source: std::io::Error| StorageError::StoreSource {
            name: name.to_string(),
            source,
        };

        match self.bundled.get(name) {
            Some(bytes) => file.write_all(bytes).map_err(store_err)?,
            None => {
                let mut fixture = File::open(self.fixtures_dir.join(name)).map_err(store_err)?;
                std::io::copy(&mut fixture, file.as_file_mut()).map_err(store_err)?;
            }
        }
        file.flush().map_err(store_err)?;

        let path = file.into_temp_path();
        debug!(source = %name, path = %path.display(), "canary source stored");
        Ok(path)
    }

    fn target_file(&self, name: &str) -> Result<TempPath, StorageError> {
        Ok(self.create("target", name)?.into_temp_path())
    }
}
