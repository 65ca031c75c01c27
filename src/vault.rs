use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, VaultConfig};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VaultPath(PathBuf);

impl VaultPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Forward-slash form, stable across platforms.
    pub fn as_str_lossy(&self) -> String {
        self.0
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn file_stem(&self) -> &str {
        self.0.file_stem().and_then(|s| s.to_str()).unwrap_or("")
    }
}

impl TryFrom<&Path> for VaultPath {
    type Error = Error;

    fn try_from(value: &Path) -> Result<Self> {
        if value.as_os_str().is_empty() {
            return Err(Error::InvalidVaultPath("empty path".into()));
        }
        if value.is_absolute() {
            return Err(Error::InvalidVaultPath(
                "absolute paths are not allowed".into(),
            ));
        }

        let mut cleaned = PathBuf::new();
        for c in value.components() {
            match c {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(Error::InvalidVaultPath(
                        "absolute paths are not allowed".into(),
                    ));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(Error::InvalidVaultPath(
                        "path traversal is not allowed".into(),
                    ));
                }
                Component::Normal(part) => cleaned.push(part),
            }
        }

        if cleaned.as_os_str().is_empty() {
            return Err(Error::InvalidVaultPath("empty path".into()));
        }

        Ok(Self(cleaned))
    }
}

impl TryFrom<String> for VaultPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(Path::new(&value))
    }
}

impl From<VaultPath> for String {
    fn from(value: VaultPath) -> Self {
        value.as_str_lossy()
    }
}

impl std::fmt::Display for VaultPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str_lossy())
    }
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    cfg: VaultConfig,
}

impl Vault {
    /// Opens a vault using `VaultConfig::load` for its settings.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(Error::VaultNotFound(root));
        }
        let cfg = VaultConfig::load(&root)?;
        Self::with_config(root, cfg)
    }

    pub fn with_config(root: impl Into<PathBuf>, cfg: VaultConfig) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(Error::VaultNotFound(root));
        }
        let root = std::fs::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root, cfg })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &VaultConfig {
        &self.cfg
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(&self.cfg.cache_dir).join(&self.cfg.index_file)
    }

    pub fn to_abs(&self, rel: &VaultPath) -> PathBuf {
        self.root.join(rel.as_path())
    }

    pub fn to_rel(&self, abs: &Path) -> Result<VaultPath> {
        let abs = if abs.is_absolute() {
            abs.to_path_buf()
        } else {
            self.root.join(abs)
        };

        let abs = std::fs::canonicalize(&abs).unwrap_or(abs);
        if !abs.starts_with(&self.root) {
            return Err(Error::PathOutsideVault(abs));
        }
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| Error::PathOutsideVault(abs.clone()))?;
        VaultPath::try_from(rel)
    }

    pub fn is_ignored_rel(&self, rel: &Path) -> bool {
        rel.components().any(|c| {
            let Component::Normal(part) = c else {
                return false;
            };
            let s = part.to_string_lossy();
            self.cfg.ignore_dirs.iter().any(|d| d == &s)
        })
    }

    /// Whether a vault-relative path names an eligible note document.
    pub fn is_note_rel(&self, rel: &Path) -> bool {
        if rel.as_os_str().is_empty() || self.is_ignored_rel(rel) {
            return false;
        }

        // Hidden directories are skipped along with hidden/temporary files.
        let mut parts = rel.components().peekable();
        while let Some(Component::Normal(part)) = parts.next() {
            let s = part.to_string_lossy();
            let is_last = parts.peek().is_none();
            if s.starts_with('.') || (is_last && s.starts_with('~')) {
                return false;
            }
        }

        rel.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.cfg.note_extension))
    }
}
