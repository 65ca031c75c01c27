use std::sync::LazyLock;

use regex::Regex;

use super::{Extraction, Reference};
use crate::slug::reference_slug;

/// What a recognized command contributes to the extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// The argument names one target note.
    Reference,
    /// The argument is a comma-separated list of target notes.
    ReferenceList,
    /// The argument names an attachment.
    Asset,
}

#[derive(Debug, Clone, Copy)]
pub struct Construct {
    pub name: &'static str,
    /// Number of mandatory `{..}` groups; the handler reads the last one.
    pub arity: usize,
    pub handler: Handler,
}

impl Construct {
    const fn new(name: &'static str, arity: usize, handler: Handler) -> Self {
        Self {
            name,
            arity,
            handler,
        }
    }
}

pub const CONSTRUCTS: &[Construct] = &[
    Construct::new("input", 1, Handler::Reference),
    Construct::new("include", 1, Handler::Reference),
    Construct::new("ref", 1, Handler::Reference),
    Construct::new("cite", 1, Handler::ReferenceList),
    Construct::new("notelink", 1, Handler::Reference),
    Construct::new("includegraphics", 1, Handler::Asset),
    Construct::new("includesvg", 1, Handler::Asset),
];

const VERBATIM_ENVS: &[&str] = &["verbatim", "lstlisting", "minted"];

static METADATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*%+\s*(title|date|tags)\s*:(.*)$").expect("metadata pattern")
});

static COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\([A-Za-z]+)\*?").expect("command pattern"));

fn lookup(name: &str) -> Option<&'static Construct> {
    CONSTRUCTS.iter().find(|c| c.name == name)
}

/// Extracts metadata, references and asset mentions from a note.
///
/// Never fails: malformed lines and unclosed constructs are skipped.
pub fn extract_document(content: &str, note_extension: &str) -> Extraction {
    let mut out = Extraction::default();
    let mut verbatim: Option<&'static str> = None;

    for (ix, line) in content.lines().enumerate() {
        let line_no = (ix + 1) as u32;

        if let Some(env) = verbatim {
            if line.contains(&format!("\\end{{{env}}}")) {
                verbatim = None;
            }
            continue;
        }

        // `%` inside a verbatim body is literal, but not before `\begin`.
        let code = strip_comment(line);
        if let Some((env, start)) = VERBATIM_ENVS
            .iter()
            .find_map(|env| code.find(&format!("\\begin{{{env}}}")).map(|i| (*env, i)))
        {
            scan_constructs(&code[..start], line_no, note_extension, &mut out);
            if !line[start..].contains(&format!("\\end{{{env}}}")) {
                verbatim = Some(env);
            }
            continue;
        }

        if let Some(caps) = METADATA_RE.captures(line) {
            let value = caps[2].trim();
            if !value.is_empty() {
                apply_metadata(&mut out, &caps[1].to_ascii_lowercase(), value);
            }
            continue;
        }

        scan_constructs(code, line_no, note_extension, &mut out);
    }

    out
}

fn apply_metadata(out: &mut Extraction, field: &str, value: &str) {
    // Later lines overwrite earlier ones.
    match field {
        "title" => out.title = Some(value.to_string()),
        "date" => out.date = Some(value.to_string()),
        "tags" => {
            out.tags = value
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter_map(normalize_tag)
                .collect();
        }
        _ => {}
    }
}

fn normalize_tag(raw: &str) -> Option<String> {
    let s = raw.trim();
    let s = s.strip_prefix('#').unwrap_or(s).trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_lowercase())
    }
}

/// Cuts the line at the first `%` not escaped by an odd run of backslashes.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'%' {
            continue;
        }
        let backslashes = bytes[..i].iter().rev().take_while(|c| **c == b'\\').count();
        if backslashes % 2 == 0 {
            return &line[..i];
        }
    }
    line
}

fn scan_constructs(line: &str, line_no: u32, note_extension: &str, out: &mut Extraction) {
    for caps in COMMAND_RE.captures_iter(line) {
        let Some(construct) = lookup(&caps[1]) else {
            continue;
        };
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let Some(arg) = read_arguments(&line[whole.end()..], construct.arity) else {
            continue;
        };

        match construct.handler {
            Handler::Reference => {
                push_reference(out, construct, arg, line_no, note_extension);
            }
            Handler::ReferenceList => {
                for part in arg.split(',') {
                    push_reference(out, construct, part, line_no, note_extension);
                }
            }
            Handler::Asset => {
                let asset = arg.trim();
                if !asset.is_empty() && !out.assets.iter().any(|a| a == asset) {
                    out.assets.push(asset.to_string());
                }
            }
        }
    }
}

fn push_reference(
    out: &mut Extraction,
    construct: &Construct,
    raw: &str,
    line: u32,
    note_extension: &str,
) {
    if let Some(target) = reference_slug(raw, note_extension) {
        out.references.push(Reference {
            construct: construct.name,
            target,
            line,
        });
    }
}

/// Skips optional `[..]` groups, then reads `arity` balanced `{..}` groups and
/// returns the contents of the last one.
fn read_arguments(rest: &str, arity: usize) -> Option<&str> {
    let mut s = rest;
    let mut last = None;
    for _ in 0..arity {
        loop {
            s = s.trim_start();
            if s.starts_with('[') {
                let end = s.find(']')?;
                s = &s[end + 1..];
            } else {
                break;
            }
        }
        let (inner, tail) = read_group(s)?;
        last = Some(inner);
        s = tail;
    }
    last
}

fn read_group(s: &str) -> Option<(&str, &str)> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[1..i], &s[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(e: &Extraction) -> Vec<&str> {
        e.references.iter().map(|r| r.target.as_str()).collect()
    }

    #[test]
    fn metadata_lines_are_parsed() {
        let e = extract_document(
            "% title: Graph Theory\n%date: 2024-03-01\n% TAGS: Math, #Graphs  discrete\nBody\n",
            "tex",
        );
        assert_eq!(e.title.as_deref(), Some("Graph Theory"));
        assert_eq!(e.date.as_deref(), Some("2024-03-01"));
        let tags: Vec<_> = e.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["discrete", "graphs", "math"]);
    }

    #[test]
    fn duplicate_metadata_last_one_wins() {
        let e = extract_document("% title: First\n% title: Second\n% title:\n", "tex");
        assert_eq!(e.title.as_deref(), Some("Second"));
    }

    #[test]
    fn missing_metadata_stays_unset() {
        let e = extract_document("\\section{Intro}\n", "tex");
        assert_eq!(e.title, None);
        assert_eq!(e.date, None);
        assert!(e.tags.is_empty());
    }

    #[test]
    fn reference_constructs_are_collected_with_lines() {
        let e = extract_document(
            "See \\notelink{Graph Theory} and \\input{chapters/intro.tex}.\n\
             \\cite{euler, konig}\n\
             \\ref{sec-a} \\include{appendix}\n",
            "tex",
        );
        assert_eq!(
            targets(&e),
            vec!["graph-theory", "intro", "euler", "konig", "sec-a", "appendix"]
        );
        assert_eq!(e.references[0].construct, "notelink");
        assert_eq!(e.references[0].line, 1);
        assert_eq!(e.references[2].construct, "cite");
        assert_eq!(e.references[2].line, 2);
        assert_eq!(e.references[5].line, 3);
    }

    #[test]
    fn assets_are_deduplicated_in_first_seen_order() {
        let e = extract_document(
            "\\includegraphics[width=0.5\\textwidth]{fig/b.png}\n\
             \\includegraphics{fig/a.png}\n\
             \\includesvg{fig/b.png}\n",
            "tex",
        );
        assert_eq!(e.assets, vec!["fig/b.png", "fig/a.png"]);
        assert!(e.references.is_empty());
    }

    #[test]
    fn unknown_prefixed_and_unclosed_commands_are_ignored() {
        let e = extract_document(
            "\\inputs{nope} \\citep{nope2}\n\\notelink{broken\n\\cite*{ok}\n\\ref {spaced}\n",
            "tex",
        );
        assert_eq!(targets(&e), vec!["ok", "spaced"]);
    }

    #[test]
    fn comments_and_verbatim_are_skipped() {
        let e = extract_document(
            "\\notelink{a} % \\notelink{commented}\n\
             100\\% sure \\notelink{b}\n\
             \\begin{verbatim}\n\
             \\notelink{hidden}\n\
             \\end{verbatim}\n\
             \\notelink{c}\n",
            "tex",
        );
        assert_eq!(targets(&e), vec!["a", "b", "c"]);
    }

    #[test]
    fn commented_out_verbatim_begin_does_not_hide_later_lines() {
        let e = extract_document(
            "% see \\begin{verbatim} for examples\n\\notelink{after}\n",
            "tex",
        );
        assert_eq!(targets(&e), vec!["after"]);

        let e = extract_document(
            "\\notelink{before} \\begin{lstlisting} \\notelink{hidden}\n\\end{lstlisting}\n",
            "tex",
        );
        assert_eq!(targets(&e), vec!["before"]);
    }

    #[test]
    fn nested_braces_are_balanced() {
        let e = extract_document("\\notelink{Set {A} Theory}\n", "tex");
        assert_eq!(targets(&e), vec!["set-a-theory"]);
    }

    #[test]
    fn grammar_table_has_unique_names() {
        let mut names: Vec<_> = CONSTRUCTS.iter().map(|c| c.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), CONSTRUCTS.len());
    }
}
