use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("vault root does not exist: {0}")]
    VaultNotFound(PathBuf),

    #[error("invalid vault path: {0}")]
    InvalidVaultPath(String),

    #[error("path is outside vault: {0}")]
    PathOutsideVault(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config toml parse error in {path}: {message}")]
    ConfigToml { path: PathBuf, message: String },

    #[error("slug collision: '{slug}' is claimed by both {first} and {second}")]
    SlugCollision {
        slug: String,
        first: String,
        second: String,
    },

    #[error("index not found at {0}; rebuild required")]
    IndexMissing(PathBuf),

    #[error("index at {path} is corrupt ({reason}); rebuild required")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for store-level failures that a full rebuild repairs.
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, Self::IndexMissing(_) | Self::IndexCorrupt { .. })
    }
}
