use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::graph::{NoteDraft, assemble};
use crate::parse::extract_document;
use crate::scan::{ScannedDocument, scan_documents};
use crate::{Error, IndexWarning, Result, Vault, VaultIndex, VaultPath};

/// Counters reported after a successful rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub total_notes: usize,
    pub total_connections: usize,
    /// Documents read and parsed during this rebuild.
    pub extracted: usize,
    /// Documents carried over unchanged from the previous snapshot.
    pub reused: usize,
    pub dangling: usize,
    pub warnings: usize,
}

impl RebuildSummary {
    fn new(index: &VaultIndex, extracted: usize, reused: usize) -> Self {
        Self {
            total_notes: index.len(),
            total_connections: index.total_connections(),
            extracted,
            reused,
            dangling: index.dangling().len(),
            warnings: index.warnings().len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildOptions {
    /// Re-read every document instead of reusing unchanged ones.
    pub force_full: bool,
    /// Paths known to have changed; never reused even if their content hash matches.
    pub changed: BTreeSet<VaultPath>,
}

impl RebuildOptions {
    pub fn full() -> Self {
        Self {
            force_full: true,
            changed: BTreeSet::new(),
        }
    }

    pub fn incremental(changed: BTreeSet<VaultPath>) -> Self {
        Self {
            force_full: false,
            changed,
        }
    }
}

/// Scans, extracts and assembles a fresh snapshot.
///
/// Every document is read on at most `extract_concurrency` blocking tasks;
/// each task returns its own draft and all drafts are merged once every task
/// finished. Without `force_full`, a document whose content hash matches its
/// record in `previous` (and that is not listed as changed) skips parsing.
/// Backlinks are always recomputed over the whole vault.
pub async fn build_index(
    vault: &Vault,
    previous: Option<&VaultIndex>,
    options: &RebuildOptions,
) -> Result<(VaultIndex, RebuildSummary)> {
    let scan_vault = vault.clone();
    let docs = tokio::task::spawn_blocking(move || scan_documents(&scan_vault))
        .await
        .map_err(|e| Error::Task(format!("scan task failed: {e}")))?;

    let previous_by_file: HashMap<&VaultPath, _> = match previous {
        Some(prev) if !options.force_full => prev.notes().map(|n| (&n.filename, n)).collect(),
        _ => HashMap::new(),
    };

    let jobs: Vec<_> = docs
        .into_iter()
        .map(|doc| {
            let candidate = match (previous, previous_by_file.get(&doc.path)) {
                (Some(prev), Some(record)) if !options.changed.contains(&doc.path) => {
                    Some(NoteDraft::from_previous(prev, record))
                }
                _ => None,
            };
            (doc, candidate)
        })
        .collect();
    let total = jobs.len();

    let (outcomes, warnings) = process_all(vault, jobs).await?;
    let mut drafts = Vec::with_capacity(outcomes.len());
    let (mut extracted, mut reused) = (0, 0);
    for outcome in outcomes {
        match outcome {
            Processed::Reused(draft) => {
                reused += 1;
                drafts.push(draft);
            }
            Processed::Extracted(draft) => {
                extracted += 1;
                drafts.push(draft);
            }
        }
    }

    let index = assemble(drafts, warnings, previous)?;
    let summary = RebuildSummary::new(&index, extracted, reused);
    info!(
        notes = summary.total_notes,
        connections = summary.total_connections,
        extracted = summary.extracted,
        reused = summary.reused,
        skipped = total - extracted - reused,
        dangling = summary.dangling,
        "index assembled"
    );
    Ok((index, summary))
}

enum Processed {
    Reused(NoteDraft),
    Extracted(NoteDraft),
}

type Job = (ScannedDocument, Option<NoteDraft>);

async fn process_all(
    vault: &Vault,
    jobs: Vec<Job>,
) -> Result<(Vec<Processed>, Vec<IndexWarning>)> {
    let limit = Arc::new(Semaphore::new(vault.config().extract_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (doc, candidate) in jobs {
        let permit = Arc::clone(&limit)
            .acquire_owned()
            .await
            .map_err(|e| Error::Task(format!("extraction pool closed: {e}")))?;
        let vault = vault.clone();
        tasks.spawn_blocking(move || {
            let _permit = permit;
            process_one(&vault, &doc, candidate)
        });
    }

    let mut outcomes = Vec::new();
    let mut warnings = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined.map_err(|e| Error::Task(format!("extraction task failed: {e}")))? {
            Ok(outcome) => outcomes.push(outcome),
            Err(warning) => {
                warn!(path = %warning.path, message = %warning.message, "document skipped");
                warnings.push(warning);
            }
        }
    }
    Ok((outcomes, warnings))
}

fn process_one(
    vault: &Vault,
    doc: &ScannedDocument,
    candidate: Option<NoteDraft>,
) -> std::result::Result<Processed, IndexWarning> {
    let abs = vault.to_abs(&doc.path);
    let warning = |message: String| IndexWarning {
        path: doc.path.clone(),
        message,
    };
    let bytes = std::fs::read(&abs).map_err(|err| warning(format!("unreadable: {err}")))?;
    let content_hash = hash_content(&bytes);

    if let Some(mut draft) = candidate.filter(|d| d.content_hash == content_hash) {
        debug!(path = %doc.path, "reusing unchanged document");
        draft.mtime_ms = doc.mtime_ms;
        draft.size = doc.size;
        return Ok(Processed::Reused(draft));
    }

    let text =
        String::from_utf8(bytes).map_err(|err| warning(format!("unreadable: {err}")))?;
    let extraction = extract_document(&text, &vault.config().note_extension);
    debug!(
        path = %doc.path,
        references = extraction.references.len(),
        assets = extraction.assets.len(),
        "document extracted"
    );
    Ok(Processed::Extracted(NoteDraft::from_extraction(
        doc,
        extraction,
        content_hash,
    )))
}

pub(crate) fn hash_content(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
