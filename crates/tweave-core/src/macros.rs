//! Macro-site scanning and the macro name registry.
//!
//! A macro site is `<<name args>>`, optionally in the closing form
//! `<</name>>`. Argument capture runs to the `>>` delimiter at bracket
//! depth zero, skipping over string literals so a quoted `>>` never
//! terminates the macro early.

/// The conditional clause names that may appear between `<<if>>` and its
/// terminator.
pub(crate) fn is_clause(name: &str) -> bool {
    matches!(name, "elseif" | "else")
}

/// Terminators for `<<if>>`: the classic `<<endif>>` and the closing-tag
/// spelling `<</if>>`.
pub(crate) fn is_endif(site: &MacroSite<'_>) -> bool {
    (site.closing && site.name == "if") || (!site.closing && site.name == "endif")
}

/// Terminators for `<<nobr>>`.
pub(crate) fn is_endnobr(site: &MacroSite<'_>) -> bool {
    (site.closing && site.name == "nobr") || (!site.closing && site.name == "endnobr")
}

/// A scanned macro site within a passage body.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MacroSite<'a> {
    /// Offset of the opening `<<`.
    pub start: usize,
    /// Offset just past the closing `>>` (end of input if unterminated).
    pub end: usize,
    /// The macro name (empty when `<<` is not followed by a name).
    pub name: &'a str,
    /// Raw argument text between the name and `>>`, untrimmed.
    pub args: &'a str,
    /// Whether this is the `<</name>>` closing form.
    pub closing: bool,
    /// False when the `>>` delimiter was never found.
    pub terminated: bool,
}

/// Find the next macro site at or after `from`. Returns `None` when no
/// `<<` remains.
pub(crate) fn next_site(src: &str, from: usize) -> Option<MacroSite<'_>> {
    let rel = src.get(from..)?.find("<<")?;
    Some(site_at(src, from + rel))
}

/// Parse the macro site starting at `start` (which must point at `<<`).
pub(crate) fn site_at(src: &str, start: usize) -> MacroSite<'_> {
    let bytes = src.as_bytes();
    let mut pos = start + 2;

    let closing = pos < bytes.len() && bytes[pos] == b'/';
    if closing {
        pos += 1;
    }

    let name_start = pos;
    while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
        pos += 1;
    }
    let name = &src[name_start..pos];

    let args_start = pos;
    let (args_end, end, terminated) = capture_args(src, args_start);

    MacroSite {
        start,
        end,
        name,
        args: &src[args_start..args_end],
        closing,
        terminated,
    }
}

/// Scan from `from` to the terminating `>>` at bracket depth zero,
/// skipping string literals. Returns (args_end, site_end, terminated).
fn capture_args(src: &str, from: usize) -> (usize, usize, bool) {
    let bytes = src.as_bytes();
    let mut pos = from;
    let mut depth = 0i32;

    while pos < bytes.len() {
        match bytes[pos] {
            b'(' | b'[' | b'{' => {
                depth += 1;
                pos += 1;
            }
            b')' | b']' | b'}' => {
                depth -= 1;
                pos += 1;
            }
            b'>' if depth <= 0 && pos + 1 < bytes.len() && bytes[pos + 1] == b'>' => {
                return (pos, pos + 2, true);
            }
            quote @ (b'"' | b'\'') => {
                pos += 1;
                while pos < bytes.len() {
                    let c = bytes[pos];
                    pos += 1;
                    if c == b'\\' {
                        pos += 1;
                    } else if c == quote {
                        break;
                    }
                }
            }
            _ => pos += 1,
        }
    }

    (bytes.len(), bytes.len(), false)
}

/// Where a conditional clause ends and what follows it.
#[derive(Debug)]
pub(crate) enum ClauseEnd<'s> {
    ElseIf { cond: &'s str, resume: usize },
    Else { resume: usize },
    EndIf { resume: usize },
    Eof,
}

/// Find the end of the conditional clause starting at `from`, tracking
/// nested `<<if>>`/`<<endif>>` pairs so suppressed branches still match
/// up with their own terminators.
pub(crate) fn scan_clause(src: &str, from: usize) -> (usize, ClauseEnd<'_>) {
    let mut depth = 0u32;
    let mut pos = from;

    while let Some(site) = next_site(src, pos) {
        if site.name.is_empty() {
            pos = site.start + 2;
            continue;
        }
        if !site.terminated {
            break;
        }
        pos = site.end;

        if !site.closing && site.name == "if" {
            depth += 1;
            continue;
        }
        if is_endif(&site) {
            if depth == 0 {
                return (site.start, ClauseEnd::EndIf { resume: site.end });
            }
            depth -= 1;
            continue;
        }
        if depth == 0 && !site.closing && is_clause(site.name) {
            if site.name == "elseif" {
                return (
                    site.start,
                    ClauseEnd::ElseIf {
                        cond: site.args,
                        resume: site.end,
                    },
                );
            }
            return (site.start, ClauseEnd::Else { resume: site.end });
        }
    }

    (src.len(), ClauseEnd::Eof)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_simple_macro() {
        let site = next_site("text <<set $x = 1>> more", 0).unwrap();
        assert_eq!(site.start, 5);
        assert_eq!(site.name, "set");
        assert_eq!(site.args.trim(), "$x = 1");
        assert!(site.terminated);
        assert!(!site.closing);
        assert_eq!(&"text <<set $x = 1>> more"[site.end..], " more");
    }

    #[test]
    fn scans_closing_form() {
        let site = next_site("<</if>>", 0).unwrap();
        assert_eq!(site.name, "if");
        assert!(site.closing);
    }

    #[test]
    fn quoted_gt_gt_does_not_terminate() {
        let src = "<<print \"a >> b\">>";
        let site = next_site(src, 0).unwrap();
        assert_eq!(site.args.trim(), "\"a >> b\"");
        assert!(site.terminated);
        assert_eq!(site.end, src.len());
    }

    #[test]
    fn parenthesized_gt_gt_does_not_terminate() {
        let src = "<<if ($a > 1)>>";
        let site = next_site(src, 0).unwrap();
        assert_eq!(site.args.trim(), "($a > 1)");
        assert!(site.terminated);
    }

    #[test]
    fn unterminated_macro_runs_to_end() {
        let site = next_site("<<if $x", 0).unwrap();
        assert!(!site.terminated);
        assert_eq!(site.end, "<<if $x".len());
    }

    #[test]
    fn no_macro_returns_none() {
        assert!(next_site("plain text", 0).is_none());
    }

    #[test]
    fn empty_name_when_not_a_macro() {
        let site = next_site("<<3 + 4>>", 0).unwrap();
        assert!(site.name.is_empty());
    }

    #[test]
    fn clause_and_terminator_tables() {
        assert!(is_clause("elseif"));
        assert!(is_clause("else"));
        assert!(!is_clause("if"));

        assert!(is_endif(&site_at("<<endif>>", 0)));
        assert!(is_endif(&site_at("<</if>>", 0)));
        assert!(!is_endif(&site_at("<<if $x>>", 0)));

        assert!(is_endnobr(&site_at("<<endnobr>>", 0)));
        assert!(is_endnobr(&site_at("<</nobr>>", 0)));
    }

    #[test]
    fn scan_clause_finds_matching_terminator() {
        let src = "a<<if $x>>nested<<endif>>b<<endif>>rest";
        let (end, term) = scan_clause(src, 0);
        assert_eq!(&src[..end], "a<<if $x>>nested<<endif>>b");
        let ClauseEnd::EndIf { resume } = term else {
            panic!("expected EndIf");
        };
        assert_eq!(&src[resume..], "rest");
    }

    #[test]
    fn scan_clause_stops_at_top_level_else() {
        let src = "yes<<else>>no<<endif>>";
        let (end, term) = scan_clause(src, 0);
        assert_eq!(&src[..end], "yes");
        assert!(matches!(term, ClauseEnd::Else { .. }));
    }

    #[test]
    fn scan_clause_reports_eof_when_unterminated() {
        let (end, term) = scan_clause("no terminator here", 0);
        assert_eq!(end, "no terminator here".len());
        assert!(matches!(term, ClauseEnd::Eof));
    }
}
