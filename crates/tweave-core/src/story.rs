//! Story structure: passages, links, and the parse/render result types.
//!
//! The passage parser is syntactic only: it locates `::` headers, splits
//! tags, and captures the first inline image URL. Link and macro syntax
//! inside bodies is left untouched for the renderer.

use serde::Serialize;

use crate::error::{ErrorKind, ErrorRecord};
use crate::expr::ast::Span;
use crate::value::VarStore;

/// Reserved passage names. Exact and case-sensitive.
pub const STORY_INIT: &str = "StoryInit";
pub const TEST_SETUP: &str = "TestSetup";
pub const STORY_TITLE: &str = "StoryTitle";

/// A named section of the story, delimited by a `::` header line.
/// Immutable after parse.
#[derive(Debug, Clone)]
pub struct Passage {
    pub name: String,
    /// Tags in header order.
    pub tags: Vec<String>,
    /// The body as authored, pre-render. The `[img[…]]` marker (if any)
    /// stays here; the renderer strips it.
    pub raw_body: String,
    /// First `[img[URL]]` in the body, if present.
    pub image_url: Option<String>,
}

/// An assignment descriptor attached to a link: applied by the host only
/// when the link is chosen, never by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Setter {
    pub name: String,
    pub op: String,
    pub value: String,
}

impl Setter {
    /// The value literal coerced to a typed value, for hosts applying a
    /// chosen link's setters to their store.
    pub fn typed_value(&self) -> crate::value::Value {
        crate::value::Value::parse_literal(&self.value)
    }
}

/// A navigational link surfaced to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub display: String,
    pub target: String,
    pub setters: Vec<Setter>,
}

/// How far render goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Text passes through unexecuted; links are still surfaced.
    ParseOnly,
    /// Full execution (editor preview).
    #[default]
    Preview,
    /// Full execution (engine). Identical to `Preview` in the core; the
    /// distinction exists so hosts can route accordingly.
    Runtime,
}

/// Result of parsing a story source. Read-only once constructed.
#[derive(Debug)]
pub struct ParseResult {
    /// All passages in header order. Duplicate names are kept; lookup
    /// takes the last declaration.
    pub passages: Vec<Passage>,
    /// Bindings from the `StoryInit` passage.
    pub story_init_vars: VarStore,
    /// Bindings from the `TestSetup` three-pass resolution.
    pub test_setup_vars: VarStore,
    pub errors: Vec<ErrorRecord>,
}

impl ParseResult {
    /// Look up a passage by exact name. The last declaration with a given
    /// name wins.
    pub fn passage(&self, name: &str) -> Option<&Passage> {
        self.passages.iter().rev().find(|p| p.name == name)
    }
}

/// Result of rendering one passage.
#[derive(Debug)]
pub struct RenderResult {
    pub text: String,
    /// Links in the order their markers occur in the rendered output.
    pub links: Vec<Link>,
    /// Canonical keys written during this render, with their final values.
    pub variable_changes: VarStore,
    pub errors: Vec<ErrorRecord>,
}

/// Look up a passage by name, exact match first, then case-insensitive;
/// `<<display>>` targets are forgiving about casing.
pub(crate) fn find_passage<'a>(passages: &'a [Passage], name: &str) -> Option<&'a Passage> {
    passages
        .iter()
        .rev()
        .find(|p| p.name == name)
        .or_else(|| passages.iter().rev().find(|p| p.name.eq_ignore_ascii_case(name)))
}

/// Split a story source into passages. Errors (name-less headers,
/// unterminated tag brackets) are recorded and never fatal.
pub(crate) fn parse_document(source: &str, errors: &mut Vec<ErrorRecord>) -> Vec<Passage> {
    let mut passages = Vec::new();

    // Locate every header line: `::` at column zero.
    let mut headers: Vec<(usize, usize)> = Vec::new(); // (line_start, line_end)
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let content = content.strip_suffix('\r').unwrap_or(content);
        if content.starts_with("::") {
            headers.push((offset, offset + content.len()));
        }
        offset += line.len();
    }

    for (i, &(line_start, line_end)) in headers.iter().enumerate() {
        let header = &source[line_start..line_end];
        let body_start = (line_end + 1).min(source.len());
        let body_end = headers
            .get(i + 1)
            .map(|&(next_start, _)| next_start)
            .unwrap_or(source.len());
        let body = source.get(body_start..body_end).unwrap_or("");

        if let Some(passage) = parse_header(header, line_start, errors) {
            let (raw_body, image_url) = scan_body(body);
            passages.push(Passage {
                name: passage.0,
                tags: passage.1,
                raw_body,
                image_url,
            });
        }
    }

    passages
}

/// Parse one header line: `:: NAME` optionally followed by `[TAG …]`
/// (tags whitespace-separated). Returns `None` when the header has no
/// usable name.
fn parse_header(
    header: &str,
    line_start: usize,
    errors: &mut Vec<ErrorRecord>,
) -> Option<(String, Vec<String>)> {
    let span = Span::new(line_start, line_start + header.len());
    let rest = &header[2..];

    let (name_part, tags) = match rest.find('[') {
        Some(bracket) => {
            let name_part = &rest[..bracket];
            let after = &rest[bracket + 1..];
            let tags_str = match after.find(']') {
                Some(close) => &after[..close],
                None => {
                    errors.push(ErrorRecord::with_span(
                        ErrorKind::Structural,
                        format!("unterminated tag bracket in header `{}`", header.trim()),
                        span,
                    ));
                    after
                }
            };
            let tags = tags_str
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>();
            (name_part, tags)
        }
        None => (rest, Vec::new()),
    };

    let name = name_part.trim();
    if name.is_empty() {
        errors.push(ErrorRecord::with_span(
            ErrorKind::Structural,
            format!("passage header without a name: `{}`", header.trim()),
            span,
        ));
        return None;
    }

    Some((name.to_string(), tags))
}

/// Capture the first `[img[URL]]` marker; the marker itself stays in the
/// body for the renderer to strip.
fn scan_body(body: &str) -> (String, Option<String>) {
    let trimmed = body.trim();
    let image_url = trimmed.find("[img[").and_then(|start| {
        let url_start = start + "[img[".len();
        trimmed[url_start..]
            .find("]]")
            .map(|end| trimmed[url_start..url_start + end].to_string())
    });
    (trimmed.to_string(), image_url)
}
