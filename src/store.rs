//! Persistence of the accepted bindings for the downstream configurator.
//!
//! The file holds a single JSON object mapping container name to
//! `{uuid, name, managed_ip, floating_ip}`.  Every write replaces the whole
//! file: content goes to a temp file beside the target and is renamed into
//! place, so a reader sees either the previous or the new state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::types::BindingSet;

#[derive(Debug, Error)]
pub enum PersistError {
    /// The file could not be written; the next cycle tries again.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The bindings could not be encoded. This never heals by retrying.
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file with `state`.
    pub fn persist(&self, state: &BindingSet) -> Result<(), PersistError> {
        let content = serde_json::to_vec(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
            }
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &content).map_err(|e| self.io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            self.io_error(&self.path, e)
        })?;

        debug!("Store work to json db: {:?}", state);
        Ok(())
    }

    /// Read back the last persisted state. A missing file is an empty state.
    pub fn load(&self) -> anyhow::Result<BindingSet> {
        match fs::read(&self.path) {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BindingSet::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: io::Error) -> PersistError {
        PersistError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
