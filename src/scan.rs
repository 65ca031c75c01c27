use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Vault, VaultPath};

/// A note file found on disk, with the stat data used for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDocument {
    pub path: VaultPath,
    pub mtime_ms: u64,
    pub size: u64,
}

/// Enumerates eligible note documents under the vault root, sorted by path.
///
/// A missing or unreadable root yields an empty list. Symbolic links are not
/// followed, so link cycles cannot trap the walk.
pub fn scan_documents(vault: &Vault) -> Vec<ScannedDocument> {
    walk_vault(vault, |rel| vault.is_note_rel(rel))
}

/// Enumerates attachment files (configured extensions) under the vault root.
pub fn scan_attachments(vault: &Vault) -> Vec<ScannedDocument> {
    walk_vault(vault, |rel| {
        rel.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| vault.config().is_attachment_ext(ext))
    })
}

fn walk_vault(vault: &Vault, keep: impl Fn(&Path) -> bool) -> Vec<ScannedDocument> {
    let root = vault.root();
    if !root.is_dir() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !vault.config().ignore_dirs.iter().any(|d| d == &name)
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        if !keep(rel) {
            continue;
        }
        let Ok(path) = VaultPath::try_from(rel) else {
            continue;
        };
        let (mtime_ms, size) = match entry.metadata() {
            Ok(meta) => (mtime_millis(meta.modified().ok()), meta.len()),
            Err(_) => (0, 0),
        };
        out.push(ScannedDocument {
            path,
            mtime_ms,
            size,
        });
    }

    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

pub(crate) fn mtime_millis(t: Option<SystemTime>) -> u64 {
    t.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
