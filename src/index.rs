use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::GraphView;
use crate::VaultPath;

/// Snapshot format written by this version of the crate.
pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Attachment identifiers in order of first mention.
    #[serde(default)]
    pub assets: Vec<String>,
    /// Resolved targets only; unknown targets live in `VaultIndex::dangling`.
    #[serde(default)]
    pub outgoing_links: BTreeSet<String>,
    /// Computed from every other record's `outgoing_links`.
    #[serde(default)]
    pub backlinks: BTreeSet<String>,
    pub filename: VaultPath,
    #[serde(default)]
    pub mtime_ms: u64,
    #[serde(default)]
    pub size: u64,
    /// Hex SHA-256 of the file bytes this record was extracted from.
    #[serde(default)]
    pub content_hash: String,
}

/// A reference whose target slug matches no note.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DanglingReference {
    pub source: String,
    pub target: String,
    pub filename: VaultPath,
}

/// A document-level problem that did not stop the rebuild.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexWarning {
    pub path: VaultPath,
    pub message: String,
}

/// Immutable snapshot of the vault's notes and reference graph.
///
/// Consumers hold it behind an `Arc` and reload instead of mutating; every
/// change goes through a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultIndex {
    pub(crate) version: u32,
    generated_at: DateTime<Utc>,
    total_notes: usize,
    total_connections: usize,
    notes: BTreeMap<String, NoteRecord>,
    #[serde(default)]
    dangling: Vec<DanglingReference>,
    #[serde(default)]
    warnings: Vec<IndexWarning>,
}

impl VaultIndex {
    pub(crate) fn from_parts(
        notes: BTreeMap<String, NoteRecord>,
        mut dangling: Vec<DanglingReference>,
        mut warnings: Vec<IndexWarning>,
    ) -> Self {
        dangling.sort();
        dangling.dedup();
        warnings.sort();
        let total_connections = notes.values().map(|n| n.outgoing_links.len()).sum();
        Self {
            version: INDEX_FORMAT_VERSION,
            generated_at: Utc::now(),
            total_notes: notes.len(),
            total_connections,
            notes,
            dangling,
            warnings,
        }
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Number of resolved directed edges.
    pub fn total_connections(&self) -> usize {
        self.total_connections
    }

    pub fn note(&self, slug: &str) -> Option<&NoteRecord> {
        self.notes.get(slug)
    }

    pub fn notes(&self) -> impl Iterator<Item = &NoteRecord> {
        self.notes.values()
    }

    pub fn note_by_filename(&self, path: &VaultPath) -> Option<&NoteRecord> {
        self.notes.values().find(|n| &n.filename == path)
    }

    pub fn outgoing(&self, slug: &str) -> impl Iterator<Item = &str> {
        self.notes
            .get(slug)
            .into_iter()
            .flat_map(|n| n.outgoing_links.iter().map(String::as_str))
    }

    pub fn backlinks(&self, slug: &str) -> impl Iterator<Item = &str> {
        self.notes
            .get(slug)
            .into_iter()
            .flat_map(|n| n.backlinks.iter().map(String::as_str))
    }

    pub fn dangling(&self) -> &[DanglingReference] {
        &self.dangling
    }

    pub fn dangling_from<'a>(&'a self, slug: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.dangling
            .iter()
            .filter(move |d| d.source == slug)
            .map(|d| d.target.as_str())
    }

    pub fn warnings(&self) -> &[IndexWarning] {
        &self.warnings
    }

    /// Notes ordered newest first by their `date` metadata; undated notes last.
    pub fn notes_by_date(&self) -> Vec<&NoteRecord> {
        let mut out: Vec<_> = self.notes.values().collect();
        out.sort_by(|a, b| {
            a.date
                .is_empty()
                .cmp(&b.date.is_empty())
                .then_with(|| b.date.cmp(&a.date))
                .then_with(|| a.slug.cmp(&b.slug))
        });
        out
    }

    pub fn tag_counts(&self) -> BTreeMap<&str, usize> {
        let mut out = BTreeMap::new();
        for tag in self.notes.values().flat_map(|n| n.tags.iter()) {
            *out.entry(tag.as_str()).or_insert(0) += 1;
        }
        out
    }

    /// Every attachment identifier mentioned by any note.
    pub fn referenced_assets(&self) -> BTreeSet<&str> {
        self.notes
            .values()
            .flat_map(|n| n.assets.iter().map(String::as_str))
            .collect()
    }

    /// Notes with neither outgoing links nor backlinks.
    pub fn orphans(&self) -> impl Iterator<Item = &NoteRecord> {
        self.notes
            .values()
            .filter(|n| n.outgoing_links.is_empty() && n.backlinks.is_empty())
    }

    pub fn graph_view(&self, max_nodes: usize, degree_cap: usize) -> GraphView {
        GraphView::build(self, max_nodes, degree_cap)
    }

    /// Cached counters agree with the note map and every backlink is reciprocal.
    pub(crate) fn is_consistent(&self) -> bool {
        if self.total_notes != self.notes.len() {
            return false;
        }
        let edges: usize = self.notes.values().map(|n| n.outgoing_links.len()).sum();
        if edges != self.total_connections {
            return false;
        }
        self.notes.iter().all(|(slug, n)| {
            n.slug == *slug
                && n.outgoing_links.iter().all(|t| {
                    self.notes
                        .get(t)
                        .is_some_and(|target| target.backlinks.contains(slug))
                })
                && n.backlinks.iter().all(|s| {
                    self.notes
                        .get(s)
                        .is_some_and(|source| source.outgoing_links.contains(slug))
                })
        })
    }

    /// True when both snapshots hold the same content, ignoring `generated_at`.
    pub fn same_content(&self, other: &Self) -> bool {
        self.version == other.version
            && self.total_connections == other.total_connections
            && self.notes == other.notes
            && self.dangling == other.dangling
            && self.warnings == other.warnings
    }
}
