use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::parse::Extraction;
use crate::scan::ScannedDocument;
use crate::slug::SlugResolver;
use crate::{DanglingReference, IndexWarning, NoteRecord, Result, VaultIndex, VaultPath};

/// Per-document extraction result, before slugs are claimed and links resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub filename: VaultPath,
    pub title: String,
    pub date: String,
    pub tags: BTreeSet<String>,
    pub assets: Vec<String>,
    /// Candidate target slugs, resolved or not.
    pub references: BTreeSet<String>,
    pub mtime_ms: u64,
    pub size: u64,
    /// SHA-256 of the raw file bytes, hex encoded.
    pub content_hash: String,
}

/// Warning recorded for a document that references its own slug.
pub(crate) const SELF_REFERENCE_WARNING: &str = "reference to itself ignored";

impl NoteDraft {
    pub fn from_extraction(
        doc: &ScannedDocument,
        extraction: Extraction,
        content_hash: String,
    ) -> Self {
        let references = extraction.reference_targets();
        let title = extraction
            .title
            .unwrap_or_else(|| doc.path.file_stem().to_string());
        Self {
            filename: doc.path.clone(),
            title,
            date: extraction.date.unwrap_or_default(),
            tags: extraction.tags,
            assets: extraction.assets,
            references,
            mtime_ms: doc.mtime_ms,
            size: doc.size,
            content_hash,
        }
    }

    /// Rebuilds a draft from a previous snapshot, for documents that did not change.
    pub fn from_previous(index: &VaultIndex, record: &NoteRecord) -> Self {
        let mut references = record.outgoing_links.clone();
        references.extend(index.dangling_from(&record.slug).map(str::to_string));
        let self_reference = index
            .warnings()
            .iter()
            .any(|w| w.path == record.filename && w.message == SELF_REFERENCE_WARNING);
        if self_reference {
            references.insert(record.slug.clone());
        }
        Self {
            filename: record.filename.clone(),
            title: record.title.clone(),
            date: record.date.clone(),
            tags: record.tags.clone(),
            assets: record.assets.clone(),
            references,
            mtime_ms: record.mtime_ms,
            size: record.size,
            content_hash: record.content_hash.clone(),
        }
    }
}

/// Aggregates drafts into a complete snapshot.
///
/// Runs single-threaded over the full draft set. A slug collision aborts the
/// whole build; unknown targets become dangling references. A self reference
/// is neither an edge nor dangling and only leaves a warning.
pub fn assemble(
    mut drafts: Vec<NoteDraft>,
    mut warnings: Vec<IndexWarning>,
    previous: Option<&VaultIndex>,
) -> Result<VaultIndex> {
    drafts.sort_by(|a, b| a.filename.cmp(&b.filename));

    let mut resolver = SlugResolver::new();
    let mut claimed: Vec<(String, NoteDraft)> = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let slug = previous
            .and_then(|idx| idx.note_by_filename(&draft.filename))
            .filter(|prev| prev.title == draft.title)
            .map(|prev| prev.slug.clone())
            .unwrap_or_else(|| resolver.resolve(&draft.title, &draft.filename));
        resolver.claim(&slug, &draft.filename)?;
        claimed.push((slug, draft));
    }

    let known: BTreeSet<String> = claimed.iter().map(|(slug, _)| slug.clone()).collect();
    let mut notes: BTreeMap<String, NoteRecord> = BTreeMap::new();
    let mut dangling = Vec::new();

    for (slug, draft) in claimed {
        let mut outgoing = BTreeSet::new();
        for target in draft.references {
            if target == slug {
                warnings.push(IndexWarning {
                    path: draft.filename.clone(),
                    message: SELF_REFERENCE_WARNING.to_string(),
                });
                continue;
            }
            if known.contains(&target) {
                outgoing.insert(target);
            } else {
                dangling.push(DanglingReference {
                    source: slug.clone(),
                    target,
                    filename: draft.filename.clone(),
                });
            }
        }

        notes.insert(
            slug.clone(),
            NoteRecord {
                slug,
                title: draft.title,
                date: draft.date,
                tags: draft.tags,
                assets: draft.assets,
                outgoing_links: outgoing,
                backlinks: BTreeSet::new(),
                filename: draft.filename,
                mtime_ms: draft.mtime_ms,
                size: draft.size,
                content_hash: draft.content_hash,
            },
        );
    }

    let edges: Vec<(String, String)> = notes
        .values()
        .flat_map(|n| {
            n.outgoing_links
                .iter()
                .map(move |t| (n.slug.clone(), t.clone()))
        })
        .collect();
    for (source, target) in edges {
        if let Some(target) = notes.get_mut(&target) {
            target.backlinks.insert(source);
        }
    }

    Ok(VaultIndex::from_parts(notes, dangling, warnings))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    /// Distinct neighbours, capped for display.
    pub degree: usize,
}

/// Undirected edge; `source < target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

/// Read-only projection of the reference graph for visualization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphView {
    /// Keeps the `max_nodes` best-connected notes (all when zero).
    pub fn build(index: &VaultIndex, max_nodes: usize, degree_cap: usize) -> Self {
        let mut ranked: Vec<(&NoteRecord, usize)> = index
            .notes()
            .map(|n| (n, neighbours(n).len()))
            .collect();
        ranked.sort_by(|(a, da), (b, db)| db.cmp(da).then_with(|| a.slug.cmp(&b.slug)));
        if max_nodes > 0 {
            ranked.truncate(max_nodes);
        }

        let kept: BTreeSet<&str> = ranked.iter().map(|(n, _)| n.slug.as_str()).collect();
        let mut edges = BTreeSet::new();
        for (note, _) in &ranked {
            for other in note.outgoing_links.iter().chain(note.backlinks.iter()) {
                if !kept.contains(other.as_str()) {
                    continue;
                }
                let (source, target) = if note.slug < *other {
                    (note.slug.clone(), other.clone())
                } else {
                    (other.clone(), note.slug.clone())
                };
                edges.insert(GraphEdge { source, target });
            }
        }

        let mut nodes: Vec<GraphNode> = ranked
            .into_iter()
            .map(|(n, degree)| GraphNode {
                id: n.slug.clone(),
                title: n.title.clone(),
                degree: degree.min(degree_cap),
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            nodes,
            edges: edges.into_iter().collect(),
        }
    }
}

fn neighbours(note: &NoteRecord) -> BTreeSet<&str> {
    note.outgoing_links
        .iter()
        .chain(note.backlinks.iter())
        .map(String::as_str)
        .filter(|s| *s != note.slug)
        .collect()
}
