mod latex;

use std::collections::BTreeSet;

pub use latex::{CONSTRUCTS, Construct, Handler, extract_document};

/// Everything pulled out of one note's text, before slug resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub title: Option<String>,
    pub date: Option<String>,
    pub tags: BTreeSet<String>,
    /// Attachment identifiers in order of first appearance, deduplicated.
    pub assets: Vec<String>,
    pub references: Vec<Reference>,
}

impl Extraction {
    /// Distinct candidate target slugs.
    pub fn reference_targets(&self) -> BTreeSet<String> {
        self.references.iter().map(|r| r.target.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reference {
    /// Command name that produced the reference, e.g. `cite`.
    pub construct: &'static str,
    /// Candidate target slug.
    pub target: String,
    /// 1-based line number.
    pub line: u32,
}
