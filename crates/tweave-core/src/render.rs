//! The macro interpreter.
//!
//! A streaming walker over a passage body: literal text passes through,
//! macro sites execute in textual order, links are surfaced, and
//! conditionals run as a two-state walk: the chosen branch executes,
//! suppressed branches are scanned for structure only so their nested
//! `<<if>>`/`<<endif>>` pairs still match up.

use crate::error::{ErrorKind, ErrorRecord};
use crate::expr::ast::Span;
use crate::expr::eval;
use crate::expr::lexer::ExprLexer;
use crate::expr::parser;
use crate::macros::{self, ClauseEnd, MacroSite};
use crate::rng::Entropy;
use crate::scope::VarScope;
use crate::story::{self, ExecutionMode, Link, Passage, RenderResult, Setter};
use crate::value::{Value, VarStore};

/// `display` recursion is bounded by the cycle stack; this cap is a
/// defensive backstop on top of it.
const MAX_DISPLAY_DEPTH: usize = 32;

/// Render one passage against the caller's variable store.
///
/// The store is mutated by `<<set>>` in textual order, including across
/// `display` boundaries. Always succeeds; errors accumulate in the result.
pub fn render_passage(
    passage: &Passage,
    vars: &mut VarStore,
    passages: &[Passage],
    mode: ExecutionMode,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    strict: bool,
) -> RenderResult {
    if mode == ExecutionMode::ParseOnly {
        // Structure only: the body passes through unexecuted, links are
        // still surfaced for static inspection.
        return RenderResult {
            text: passage.raw_body.clone(),
            links: extract_links(&passage.raw_body),
            variable_changes: VarStore::new(),
            errors: Vec::new(),
        };
    }

    let mut interp = Interp {
        passages,
        scope,
        vars,
        rng,
        strict,
        out: String::new(),
        nobr_buf: String::new(),
        nobr_depth: 0,
        links: Vec::new(),
        changes: VarStore::new(),
        errors: Vec::new(),
        display_stack: Vec::new(),
    };

    interp.exec_body(&passage.raw_body);

    if interp.nobr_depth > 0 {
        interp.errors.push(ErrorRecord::new(
            ErrorKind::UnmatchedMacro,
            "<<nobr>> without <<endnobr>>",
        ));
        interp.nobr_depth = 1;
        interp.close_nobr();
    }

    RenderResult {
        text: interp.out.trim().to_string(),
        links: interp.links,
        variable_changes: interp.changes,
        errors: interp.errors,
    }
}

/// Syntactic link extraction without rendering (parse-only mode and host
/// tooling).
pub fn extract_links(src: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut pos = 0;
    while let Some(rel) = src.get(pos..).and_then(|r| r.find("[[")) {
        let start = pos + rel;
        match parse_link_at(src, start) {
            Some(parsed) => {
                links.push(parsed.link);
                pos = parsed.end;
            }
            None => pos = start + 2,
        }
    }
    links
}

struct Interp<'a> {
    passages: &'a [Passage],
    scope: &'a VarScope,
    vars: &'a mut VarStore,
    rng: &'a mut dyn Entropy,
    strict: bool,
    out: String,
    nobr_buf: String,
    nobr_depth: u32,
    links: Vec<Link>,
    changes: VarStore,
    errors: Vec<ErrorRecord>,
    display_stack: Vec<String>,
}

impl<'a> Interp<'a> {
    fn exec_body(&mut self, src: &str) {
        let mut pos = 0;
        while pos < src.len() {
            let rest = &src[pos..];
            let next_macro = rest.find("<<");
            let next_link = rest.find("[[");
            let next_img = rest.find("[img[");
            let Some(next) = [next_macro, next_link, next_img]
                .into_iter()
                .flatten()
                .min()
            else {
                self.emit(rest);
                break;
            };

            if next > 0 {
                self.emit(&rest[..next]);
            }
            let abs = pos + next;

            if rest[next..].starts_with("<<") {
                pos = self.exec_macro(src, abs);
            } else if rest[next..].starts_with("[img[") {
                pos = self.skip_image(src, abs);
            } else {
                pos = self.exec_link(src, abs);
            }
        }
    }

    /// Execute the macro site at `start`; returns the position to resume
    /// scanning from.
    fn exec_macro(&mut self, src: &str, start: usize) -> usize {
        let site = macros::site_at(src, start);

        if site.name.is_empty() {
            // `<<` not opening a macro: literal text.
            self.emit("<<");
            return start + 2;
        }

        if !site.terminated {
            self.errors.push(ErrorRecord::with_span(
                ErrorKind::UnmatchedMacro,
                format!("<<{}>> without closing `>>`", site.name),
                Span::new(site.start, site.end),
            ));
            self.emit(&src[start..]);
            return src.len();
        }

        match (site.closing, site.name) {
            (false, "set") => {
                self.exec_set(&site);
                site.end
            }
            (false, "print") => {
                let value = self.eval_args(&site);
                let text = value.to_string();
                self.emit(&text);
                site.end
            }
            (false, "display") => {
                self.exec_display(&site);
                site.end
            }
            (false, "if") => self.exec_if(src, &site),
            (false, "nobr") => {
                self.nobr_depth += 1;
                site.end
            }
            (false, "endnobr") | (true, "nobr") => {
                if self.nobr_depth == 0 {
                    self.errors.push(ErrorRecord::with_span(
                        ErrorKind::UnmatchedMacro,
                        "<<endnobr>> without <<nobr>>",
                        Span::new(site.start, site.end),
                    ));
                } else {
                    self.close_nobr();
                }
                site.end
            }
            (false, "elseif" | "else" | "endif") | (true, "if") => {
                // Clause or terminator outside any conditional.
                self.errors.push(ErrorRecord::with_span(
                    ErrorKind::UnmatchedMacro,
                    format!("stray <<{}{}>>", if site.closing { "/" } else { "" }, site.name),
                    Span::new(site.start, site.end),
                ));
                site.end
            }
            _ => {
                // Unknown macro: leave it in the output verbatim so hosts
                // can layer their own vocabularies on top.
                self.emit(&src[site.start..site.end]);
                site.end
            }
        }
    }

    fn exec_set(&mut self, site: &MacroSite<'_>) {
        let mut lexer = ExprLexer::new(site.args, args_offset(site));
        match parser::parse_assignment(&mut lexer) {
            Ok(assign) => {
                let (key, value) = eval::execute_assignment(
                    &assign,
                    self.vars,
                    self.scope,
                    self.rng,
                    &mut self.errors,
                    self.strict,
                );
                self.changes.insert(key, value);
            }
            Err(message) => {
                self.errors.push(ErrorRecord::with_span(
                    ErrorKind::Expression,
                    message,
                    Span::new(site.start, site.end),
                ));
            }
        }
    }

    fn exec_display(&mut self, site: &MacroSite<'_>) {
        let name = unquote(site.args.trim());
        if name.is_empty() {
            self.errors.push(ErrorRecord::with_span(
                ErrorKind::Expression,
                "<<display>> needs a passage name",
                Span::new(site.start, site.end),
            ));
            return;
        }

        if self
            .display_stack
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
        {
            self.errors.push(ErrorRecord::with_span(
                ErrorKind::Cycle,
                format!(
                    "display cycle: {} -> {name}",
                    self.display_stack.join(" -> ")
                ),
                Span::new(site.start, site.end),
            ));
            self.emit(&format!("[cycle: {name}]"));
            return;
        }

        if self.display_stack.len() >= MAX_DISPLAY_DEPTH {
            self.errors.push(ErrorRecord::with_span(
                ErrorKind::Cycle,
                format!("display nesting deeper than {MAX_DISPLAY_DEPTH}"),
                Span::new(site.start, site.end),
            ));
            return;
        }

        let Some(target) = self.lookup_passage(name) else {
            self.errors.push(ErrorRecord::with_span(
                ErrorKind::MissingPassage,
                format!("<<display>> target not found: {name}"),
                Span::new(site.start, site.end),
            ));
            self.emit(&format!("[missing: {name}]"));
            return;
        };

        // The nested frame shares the store, link list, and nobr state.
        self.display_stack.push(target.name.clone());
        self.exec_body(&target.raw_body);
        self.display_stack.pop();
    }

    /// Run an `<<if>>` chain: the first truthy branch executes, the rest
    /// are scanned for structure only. Returns the resume position past
    /// the terminator.
    fn exec_if<'s>(&mut self, src: &'s str, open: &MacroSite<'s>) -> usize {
        let mut taken = false;
        let mut cond: Option<&'s str> = Some(open.args);
        let mut body_start = open.end;

        loop {
            let (body_end, term) = macros::scan_clause(src, body_start);

            let execute = !taken
                && match cond {
                    Some(c) => self.eval_condition(c),
                    None => true,
                };
            if execute {
                taken = true;
                self.exec_body(&src[body_start..body_end]);
            }

            match term {
                ClauseEnd::ElseIf { cond: c, resume } => {
                    cond = Some(c);
                    body_start = resume;
                }
                ClauseEnd::Else { resume } => {
                    cond = None;
                    body_start = resume;
                }
                ClauseEnd::EndIf { resume } => return resume,
                ClauseEnd::Eof => {
                    // Unterminated conditional: the live branch already
                    // rendered to end-of-passage as though <<endif>>
                    // occurred there.
                    self.errors.push(ErrorRecord::with_span(
                        ErrorKind::UnmatchedMacro,
                        "<<if>> without <<endif>>",
                        Span::new(open.start, open.end),
                    ));
                    return src.len();
                }
            }
        }
    }

    fn skip_image(&mut self, src: &str, start: usize) -> usize {
        let url_start = start + "[img[".len();
        match src[url_start..].find("]]") {
            // The URL was captured at parse time; the marker renders to
            // nothing.
            Some(rel) => url_start + rel + 2,
            None => {
                self.emit(&src[start..]);
                src.len()
            }
        }
    }

    fn exec_link(&mut self, src: &str, start: usize) -> usize {
        let Some(parsed) = parse_link_at(src, start) else {
            self.errors.push(ErrorRecord::with_span(
                ErrorKind::Structural,
                "unterminated link marker",
                Span::new(start, src.len()),
            ));
            self.emit(&src[start..]);
            return src.len();
        };
        for message in parsed.setter_errors {
            self.errors.push(ErrorRecord::with_span(
                ErrorKind::Structural,
                message,
                Span::new(start, parsed.end),
            ));
        }
        self.emit(&parsed.link.display);
        self.links.push(parsed.link);
        parsed.end
    }

    fn lookup_passage(&self, name: &str) -> Option<&'a Passage> {
        story::find_passage(self.passages, name)
    }

    fn eval_args(&mut self, site: &MacroSite<'_>) -> Value {
        let mut lexer = ExprLexer::new(site.args, args_offset(site));
        let expr = parser::parse_expr(&mut lexer);
        eval::Evaluator {
            vars: &*self.vars,
            scope: self.scope,
            rng: &mut *self.rng,
            errors: &mut self.errors,
            strict: self.strict,
        }
        .eval(&expr)
    }

    fn eval_condition(&mut self, cond_src: &str) -> bool {
        eval::evaluate_condition(
            cond_src,
            self.vars,
            self.scope,
            self.rng,
            &mut self.errors,
            self.strict,
        )
    }

    fn emit(&mut self, s: &str) {
        if self.nobr_depth > 0 {
            self.nobr_buf.push_str(s);
        } else {
            self.out.push_str(s);
        }
    }

    /// Close one nobr level; at the outermost close, collapse whitespace
    /// runs to single spaces (trimmed at the region edges) and flush.
    fn close_nobr(&mut self) {
        self.nobr_depth -= 1;
        if self.nobr_depth == 0 {
            let collapsed = self.nobr_buf.split_whitespace().collect::<Vec<_>>().join(" ");
            self.out.push_str(&collapsed);
            self.nobr_buf.clear();
        }
    }
}

/// The byte offset of a site's argument text within the scanned source.
fn args_offset(site: &MacroSite<'_>) -> usize {
    site.start + 2 + usize::from(site.closing) + site.name.len()
}

struct ParsedLink {
    link: Link,
    end: usize,
    setter_errors: Vec<String>,
}

/// Parse a `[[…]]` marker at `start`. The first `][`-separated part is
/// `DISPLAY|TARGET` (split on the first pipe); the remaining parts are
/// setter clauses. Returns `None` when the closing `]]` is missing.
fn parse_link_at(src: &str, start: usize) -> Option<ParsedLink> {
    let content_start = start + 2;
    let close_rel = src.get(content_start..)?.find("]]")?;
    let content = &src[content_start..content_start + close_rel];
    let end = content_start + close_rel + 2;

    let mut parts = content.split("][");
    let head = parts.next().unwrap_or("");
    let (display, target) = match head.find('|') {
        Some(pipe) => (head[..pipe].trim(), head[pipe + 1..].trim()),
        None => (head.trim(), head.trim()),
    };

    let mut setters = Vec::new();
    let mut setter_errors = Vec::new();
    for clause in parts {
        match parse_setter(clause) {
            Ok(setter) => setters.push(setter),
            Err(message) => setter_errors.push(message),
        }
    }

    Some(ParsedLink {
        link: Link {
            display: display.to_string(),
            target: target.to_string(),
            setters,
        },
        end,
        setter_errors,
    })
}

/// Parse one setter clause: `$NAME OP VALUE` with
/// `OP ∈ {=, to, +=, -=, *=, /=}`. The value is kept as its source
/// literal; the host evaluates it if the link is chosen.
fn parse_setter(clause: &str) -> Result<Setter, String> {
    let s = clause.trim();
    let rest = s
        .strip_prefix('$')
        .ok_or_else(|| format!("link setter must reference a $variable: `{s}`"))?;

    let name_end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() {
        return Err(format!("link setter has no variable name: `{s}`"));
    }

    let after = rest[name_end..].trim_start();
    let (op, value) = if let Some(v) = after.strip_prefix("+=") {
        ("+=", v)
    } else if let Some(v) = after.strip_prefix("-=") {
        ("-=", v)
    } else if let Some(v) = after.strip_prefix("*=") {
        ("*=", v)
    } else if let Some(v) = after.strip_prefix("/=") {
        ("/=", v)
    } else if let Some(v) = after.strip_prefix('=') {
        ("=", v)
    } else if let Some(v) = after
        .strip_prefix("to")
        .filter(|v| v.is_empty() || !v.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_'))
    {
        ("to", v)
    } else {
        return Err(format!("link setter has no assignment operator: `{s}`"));
    };

    Ok(Setter {
        name: name.to_string(),
        op: op.to_string(),
        value: value.trim().to_string(),
    })
}

fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if s.len() >= 2 {
        let (first, last) = (bytes[0], bytes[s.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}
