// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::io::{read_bincode, read_json, write_bincode, write_json};
use crate::TensorError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const INDEX_FILE: &str = "checkpoint.json";

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("no checkpoint found in {}", .directory.display())]
    Missing { directory: PathBuf },
    #[error("checkpoint directory {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Bookkeeping persisted next to the checkpoint files. `all` is ordered
/// oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointIndex {
    pub counter: u64,
    pub latest: Option<String>,
    pub all: Vec<String>,
}

/// Numbered checkpoint files in one directory with bounded retention.
///
/// Each save writes `ckpt-<n>.bin` (bincode) and rewrites `checkpoint.json`.
/// When more than `max_to_keep` files exist the oldest are removed; a
/// `max_to_keep` of zero keeps everything.
#[derive(Clone, Debug)]
pub struct CheckpointManager {
    directory: PathBuf,
    max_to_keep: usize,
    index: CheckpointIndex,
}

impl CheckpointManager {
    /// Opens `directory`, creating it if needed and reading an existing index.
    pub fn open(directory: impl Into<PathBuf>, max_to_keep: usize) -> Result<Self, CheckpointError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| CheckpointError::Io {
            path: directory.clone(),
            source,
        })?;
        let index_path = directory.join(INDEX_FILE);
        let index = if index_path.exists() {
            read_json(&index_path)?
        } else {
            CheckpointIndex::default()
        };
        debug!(
            directory = %directory.display(),
            existing = index.all.len(),
            "opened checkpoint directory"
        );
        Ok(Self {
            directory,
            max_to_keep,
            index,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn index(&self) -> &CheckpointIndex {
        &self.index
    }

    /// Path of the most recent checkpoint, if one was written.
    pub fn latest(&self) -> Option<PathBuf> {
        self.index
            .latest
            .as_ref()
            .map(|name| self.directory.join(name))
    }

    /// Writes `payload` as the next numbered checkpoint and returns its path.
    pub fn save<T: Serialize>(&mut self, payload: &T) -> Result<PathBuf, CheckpointError> {
        self.index.counter += 1;
        let name = format!("ckpt-{}.bin", self.index.counter);
        let path = self.directory.join(&name);
        write_bincode(payload, &path)?;
        self.index.all.push(name.clone());
        self.index.latest = Some(name);

        if self.max_to_keep > 0 {
            while self.index.all.len() > self.max_to_keep {
                let stale = self.index.all.remove(0);
                let stale_path = self.directory.join(&stale);
                match fs::remove_file(&stale_path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(CheckpointError::Io {
                            path: stale_path,
                            source,
                        })
                    }
                }
                debug!(file = %stale, "removed stale checkpoint");
            }
        }

        write_json(&self.index, self.directory.join(INDEX_FILE))?;
        info!(path = %path.display(), "saved checkpoint");
        Ok(path)
    }

    /// Reads the most recent checkpoint payload.
    pub fn restore_latest<T: DeserializeOwned>(&self) -> Result<T, CheckpointError> {
        let Some(path) = self.latest() else {
            return Err(CheckpointError::Missing {
                directory: self.directory.clone(),
            });
        };
        if !path.exists() {
            return Err(CheckpointError::Missing {
                directory: self.directory.clone(),
            });
        }
        let payload = read_bincode(&path)?;
        info!(path = %path.display(), "restored checkpoint");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn restore_from_empty_directory_is_missing() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::open(dir.path().join("ckpts"), 5).unwrap();
        assert!(manager.latest().is_none());
        let err = manager.restore_latest::<Vec<f32>>().unwrap_err();
        assert!(matches!(err, CheckpointError::Missing { .. }));
    }

    #[test]
    fn keeps_only_the_newest_files() {
        let dir = tempdir().unwrap();
        let mut manager = CheckpointManager::open(dir.path(), 2).unwrap();
        for step in 0..4u32 {
            manager.save(&vec![step as f32; 3]).unwrap();
        }
        assert_eq!(manager.index().all, vec!["ckpt-3.bin", "ckpt-4.bin"]);
        assert!(!dir.path().join("ckpt-1.bin").exists());
        assert!(!dir.path().join("ckpt-2.bin").exists());
        let restored: Vec<f32> = manager.restore_latest().unwrap();
        assert_eq!(restored, vec![3.0; 3]);
    }

    #[test]
    fn reopening_continues_numbering() {
        let dir = tempdir().unwrap();
        {
            let mut manager = CheckpointManager::open(dir.path(), 5).unwrap();
            manager.save(&1u64).unwrap();
            manager.save(&2u64).unwrap();
        }
        let mut manager = CheckpointManager::open(dir.path(), 5).unwrap();
        assert_eq!(manager.restore_latest::<u64>().unwrap(), 2);
        let path = manager.save(&3u64).unwrap();
        assert!(path.ends_with("ckpt-3.bin"));
        assert_eq!(manager.index().all.len(), 3);
    }
}
