use std::io::Write;
use std::path::{Path, PathBuf};

use crate::index::INDEX_FORMAT_VERSION;
use crate::{Error, Result, Vault, VaultIndex};

/// Durable home of the vault snapshot: one JSON file in the cache directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn for_vault(vault: &Vault) -> Self {
        Self::at(vault.index_path())
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads the snapshot.
    ///
    /// Absent file -> `Error::IndexMissing`; anything unreadable, unparsable,
    /// from another format version or internally inconsistent ->
    /// `Error::IndexCorrupt`.
    pub fn load(&self) -> Result<VaultIndex> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::IndexMissing(self.path.clone()));
            }
            Err(err) => return Err(self.corrupt(err.to_string())),
        };

        let index: VaultIndex =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;
        if index.version != INDEX_FORMAT_VERSION {
            return Err(self.corrupt(format!(
                "unsupported format version {} (expected {INDEX_FORMAT_VERSION})",
                index.version
            )));
        }
        if !index.is_consistent() {
            return Err(self.corrupt("counters or backlinks disagree with notes".into()));
        }
        Ok(index)
    }

    /// Writes the snapshot atomically: temp file in the same directory, fsync, rename.
    pub fn save(&self, index: &VaultIndex) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::InvalidVaultPath("index path has no parent".into()))?;
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

        let mut bytes = serde_json::to_vec_pretty(index)?;
        bytes.push(b'\n');

        let file_name = self
            .path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "index".into());
        let temp_path = parent.join(format!("{file_name}.tmp-{}", std::process::id()));

        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()
        };
        if let Err(err) = write() {
            let _ = std::fs::remove_file(&temp_path);
            return Err(Error::io(&temp_path, err));
        }

        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            Error::io(&self.path, e)
        })?;
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "index snapshot saved");
        Ok(())
    }

    fn corrupt(&self, reason: String) -> Error {
        Error::IndexCorrupt {
            path: self.path.clone(),
            reason,
        }
    }
}
