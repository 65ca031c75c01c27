use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::scan::scan_attachments;
use crate::{DanglingReference, IndexWarning, Vault, VaultIndex, VaultPath};

/// An asset mention whose file could not be found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MissingAsset {
    pub slug: String,
    pub asset: String,
}

/// Vault-wide problems gathered from a snapshot and the files on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub dangling: Vec<DanglingReference>,
    pub warnings: Vec<IndexWarning>,
    pub orphans: Vec<String>,
    pub missing_assets: Vec<MissingAsset>,
    pub unreferenced_assets: Vec<VaultPath>,
}

impl HealthReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty()
            && self.warnings.is_empty()
            && self.missing_assets.is_empty()
            && self.unreferenced_assets.is_empty()
    }
}

pub fn health_report(index: &VaultIndex, vault: &Vault) -> HealthReport {
    let mut report = HealthReport {
        dangling: index.dangling().to_vec(),
        warnings: index.warnings().to_vec(),
        orphans: index.orphans().map(|n| n.slug.clone()).collect(),
        ..Default::default()
    };

    let mut used: BTreeSet<VaultPath> = BTreeSet::new();
    for note in index.notes() {
        let note_dir = vault
            .to_abs(&note.filename)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| vault.root().to_path_buf());

        for asset in &note.assets {
            match locate_asset(vault, &note_dir, asset) {
                Some(found) => {
                    if let Ok(rel) = vault.to_rel(&found) {
                        used.insert(rel);
                    }
                }
                None => report.missing_assets.push(MissingAsset {
                    slug: note.slug.clone(),
                    asset: asset.clone(),
                }),
            }
        }
    }

    report.unreferenced_assets = scan_attachments(vault)
        .into_iter()
        .map(|doc| doc.path)
        .filter(|p| !used.contains(p))
        .collect();
    report.missing_assets.sort();
    report
}

/// Looks next to the note first, then at the vault root. Identifiers without a
/// known attachment extension are also tried with each configured one.
fn locate_asset(vault: &Vault, note_dir: &Path, asset: &str) -> Option<PathBuf> {
    let cfg = vault.config();
    let mut names = vec![asset.to_string()];
    let known_ext = Path::new(asset)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| cfg.is_attachment_ext(e));
    if !known_ext {
        names.extend(
            cfg.attachment_extensions
                .iter()
                .map(|ext| format!("{asset}.{ext}")),
        );
    }

    [note_dir, vault.root()]
        .into_iter()
        .flat_map(|base| names.iter().map(move |n| base.join(n)))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VaultConfig;
    use crate::indexer::{RebuildOptions, build_index};

    #[tokio::test]
    async fn report_covers_links_orphans_and_assets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("ch1/figs")).unwrap();
        std::fs::write(
            root.join("ch1/a.tex"),
            "% title: A\n\\notelink{ghost}\n\\includegraphics{figs/plot}\n\\includegraphics{missing.png}\n",
        )
        .unwrap();
        std::fs::write(root.join("b.tex"), "% title: B\n\\includesvg[width=3cm]{logo.svg}\n")
            .unwrap();
        std::fs::write(root.join("ch1/figs/plot.png"), "png").unwrap();
        std::fs::write(root.join("logo.svg"), "<svg/>").unwrap();
        std::fs::write(root.join("stray.pdf"), "pdf").unwrap();

        let vault = Vault::with_config(root, VaultConfig::default()).unwrap();
        let (idx, _) = build_index(&vault, None, &RebuildOptions::default())
            .await
            .unwrap();
        let report = health_report(&idx, &vault);

        assert_eq!(report.dangling.len(), 1);
        assert_eq!(report.dangling[0].target, "ghost");
        assert_eq!(report.orphans, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            report.missing_assets,
            vec![MissingAsset {
                slug: "a".into(),
                asset: "missing.png".into()
            }]
        );
        let unreferenced: Vec<_> = report
            .unreferenced_assets
            .iter()
            .map(|p| p.as_str_lossy())
            .collect();
        assert_eq!(unreferenced, vec!["stray.pdf"]);
        assert!(!report.is_clean());
    }
}
