use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Directory names to ignore anywhere in the path.
    pub ignore_dirs: Vec<String>,
    /// File extension (without dot) of note documents.
    pub note_extension: String,
    /// File extensions (without dot) that are considered attachments.
    pub attachment_extensions: Vec<String>,
    /// Debounce window for filesystem events.
    pub watch_debounce: Duration,
    /// Maximum number of documents extracted concurrently.
    pub extract_concurrency: usize,
    /// Upper bound for node degree reported in graph views.
    pub graph_degree_cap: usize,
    /// Cache directory (relative to vault root) holding the index snapshot.
    pub cache_dir: PathBuf,
    /// Snapshot file name inside `cache_dir`.
    pub index_file: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: vec![
                ".git".into(),
                ".vaultgraph".into(),
                "node_modules".into(),
                "target".into(),
                "build".into(),
                "out".into(),
            ],
            note_extension: "tex".into(),
            attachment_extensions: vec![
                "png".into(),
                "jpg".into(),
                "jpeg".into(),
                "gif".into(),
                "svg".into(),
                "pdf".into(),
                "eps".into(),
            ],
            watch_debounce: Duration::from_millis(400),
            extract_concurrency: 4,
            graph_degree_cap: 50,
            cache_dir: PathBuf::from(".vaultgraph"),
            index_file: "index.json".into(),
        }
    }
}

/// On-disk overrides; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    ignore_dirs: Option<Vec<String>>,
    note_extension: Option<String>,
    attachment_extensions: Option<Vec<String>>,
    watch_debounce_ms: Option<u64>,
    extract_concurrency: Option<usize>,
    graph_degree_cap: Option<usize>,
    index_file: Option<String>,
}

impl VaultConfig {
    /// Defaults overlaid with `<root>/.vaultgraph/config.toml` when present.
    pub fn load(root: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        let path = root.join(&cfg.cache_dir).join(CONFIG_FILE_NAME);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(cfg),
            Err(err) => return Err(Error::io(&path, err)),
        };
        let file: ConfigFile = toml::from_str(&text).map_err(|err| Error::ConfigToml {
            path: path.clone(),
            message: err.to_string(),
        })?;

        if let Some(v) = file.ignore_dirs {
            cfg.ignore_dirs = v;
        }
        if let Some(v) = file.note_extension {
            cfg.note_extension = v.trim_start_matches('.').to_string();
        }
        if let Some(v) = file.attachment_extensions {
            cfg.attachment_extensions = v;
        }
        if let Some(ms) = file.watch_debounce_ms {
            cfg.watch_debounce = Duration::from_millis(ms);
        }
        if let Some(n) = file.extract_concurrency {
            cfg.extract_concurrency = n.max(1);
        }
        if let Some(n) = file.graph_degree_cap {
            cfg.graph_degree_cap = n;
        }
        if let Some(v) = file.index_file {
            cfg.index_file = v;
        }
        Ok(cfg)
    }

    pub fn is_attachment_ext(&self, ext: &str) -> bool {
        self.attachment_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}
