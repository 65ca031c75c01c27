use std::collections::HashMap;

use crate::{Error, Result, VaultPath};

/// Lowercase, hyphen-separated form of `s`, safe for URLs and file names.
pub fn slugify(s: &str) -> String {
    let mut out = String::new();
    let mut last_dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_dash = false;
        } else if (c.is_whitespace() || matches!(c, '-' | '_' | '/'))
            && !out.is_empty()
            && !last_dash
        {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Slug for a document title, falling back to the file stem and then `untitled`.
pub fn slug_for_title(title: &str, path: &VaultPath) -> String {
    let slug = slugify(title);
    if !slug.is_empty() {
        return slug;
    }
    let slug = slugify(path.file_stem());
    if !slug.is_empty() {
        return slug;
    }
    "untitled".to_string()
}

/// Normalizes a raw reference argument into a candidate target slug.
///
/// `notes/Graph Theory.tex` and `graph-theory` both map to `graph-theory`.
pub fn reference_slug(raw: &str, note_extension: &str) -> Option<String> {
    let s = raw.trim();
    let s = strip_extension(s, note_extension);
    let last = s.rsplit(['/', '\\']).next().unwrap_or(s);
    let slug = slugify(last);
    if slug.is_empty() { None } else { Some(slug) }
}

fn strip_extension<'a>(s: &'a str, ext: &str) -> &'a str {
    match s.rsplit_once('.') {
        Some((stem, e)) if !stem.is_empty() && e.eq_ignore_ascii_case(ext) => stem,
        _ => s,
    }
}

/// Tracks which document owns each slug within one rebuild pass.
#[derive(Debug, Default)]
pub struct SlugResolver {
    owners: HashMap<String, VaultPath>,
}

impl SlugResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic slug for `title`; does not claim it.
    pub fn resolve(&self, title: &str, path: &VaultPath) -> String {
        slug_for_title(title, path)
    }

    /// Claims `slug` for `path`, failing if another document already owns it.
    pub fn claim(&mut self, slug: &str, path: &VaultPath) -> Result<()> {
        match self.owners.get(slug) {
            Some(owner) if owner != path => Err(Error::SlugCollision {
                slug: slug.to_string(),
                first: owner.as_str_lossy(),
                second: path.as_str_lossy(),
            }),
            Some(_) => Ok(()),
            None => {
                self.owners.insert(slug.to_string(), path.clone());
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(s: &str) -> VaultPath {
        VaultPath::try_from(std::path::Path::new(s)).unwrap()
    }

    #[test]
    fn slugify_lowercases_and_strips_punctuation() {
        assert_eq!(slugify("Graph Theory"), "graph-theory");
        assert_eq!(slugify("  Hello,   World! "), "hello-world");
        assert_eq!(slugify("C++ & Rust: notes_v2"), "c-rust-notes-v2");
        assert_eq!(slugify("Éléments d'Analyse"), "éléments-danalyse");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn empty_title_falls_back_to_stem() {
        assert_eq!(slug_for_title("", &vp("notes/My Note.tex")), "my-note");
        assert_eq!(slug_for_title("!!!", &vp("notes/%%.tex")), "untitled");
    }

    #[test]
    fn reference_slug_strips_paths_and_extension() {
        assert_eq!(
            reference_slug("notes/Graph Theory.tex", "tex").as_deref(),
            Some("graph-theory")
        );
        assert_eq!(reference_slug("graph-theory", "tex").as_deref(), Some("graph-theory"));
        assert_eq!(reference_slug("eq:euler", "tex").as_deref(), Some("eqeuler"));
        assert_eq!(reference_slug("  ", "tex"), None);
    }

    #[test]
    fn resolver_rejects_second_owner() {
        let mut r = SlugResolver::new();
        r.claim("graph-theory", &vp("a.tex")).unwrap();
        r.claim("graph-theory", &vp("a.tex")).unwrap();
        let err = r.claim("graph-theory", &vp("b.tex")).unwrap_err();
        match err {
            Error::SlugCollision {
                slug,
                first,
                second,
            } => {
                assert_eq!(slug, "graph-theory");
                assert_eq!(first, "a.tex");
                assert_eq!(second, "b.tex");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(r.len(), 1);
    }
}
