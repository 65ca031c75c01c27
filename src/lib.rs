mod config;
mod diagnostics;
mod error;
mod graph;
mod index;
mod indexer;
mod parse;
mod scan;
mod service;
mod slug;
mod store;
mod vault;
mod watch;

pub use crate::config::{CONFIG_FILE_NAME, VaultConfig};
pub use crate::diagnostics::{HealthReport, MissingAsset, health_report};
pub use crate::error::{Error, Result};
pub use crate::graph::{GraphEdge, GraphNode, GraphView, NoteDraft, assemble};
pub use crate::index::{
    DanglingReference, INDEX_FORMAT_VERSION, IndexWarning, NoteRecord, VaultIndex,
};
pub use crate::indexer::{RebuildOptions, RebuildSummary, build_index};
pub use crate::parse::{CONSTRUCTS, Construct, Extraction, Handler, Reference, extract_document};
pub use crate::scan::{ScannedDocument, scan_attachments, scan_documents};
pub use crate::service::{ReindexCause, VaultEvent, VaultService, WatchKind};
pub use crate::slug::{SlugResolver, reference_slug, slug_for_title, slugify};
pub use crate::store::IndexStore;
pub use crate::vault::{Vault, VaultPath};
pub use crate::watch::{Debouncer, WatchState};
