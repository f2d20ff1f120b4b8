//! Special-passage drivers: `StoryInit` seeding and the `TestSetup`
//! three-pass resolution.
//!
//! Both run at parse time over the passage body's macro structure without
//! rendering any text. `StoryInit` takes only top-level `<<set>>`s;
//! `TestSetup` additionally resolves conditional blocks against a draft
//! store so editors can derive a default variable scenario.

use crate::error::ErrorRecord;
use crate::expr::eval;
use crate::expr::lexer::ExprLexer;
use crate::expr::parser;
use crate::macros::{self, ClauseEnd, MacroSite};
use crate::rng::Entropy;
use crate::scope::VarScope;
use crate::story::Passage;
use crate::value::VarStore;

/// Extract `story_init_vars`: every top-level `<<set>>` (conditional
/// depth zero) executed in order against an empty store. Assignments
/// nested in conditionals are not extracted.
pub(crate) fn extract_story_init(
    passage: Option<&Passage>,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
) -> VarStore {
    let mut vars = VarStore::new();
    if let Some(passage) = passage {
        run_top_level_sets(&passage.raw_body, &mut vars, scope, rng, errors);
    }
    vars
}

/// Extract `test_setup_vars` with the three-pass algorithm:
/// 1. every top-level `<<set>>` into a draft store;
/// 2. conditional blocks resolved in order against the draft store, outer
///    before inner, executing the selected branch's assignments;
/// 3. the top-level `<<set>>`s again, so forward references to
///    branch-resolved variables settle.
pub(crate) fn extract_test_setup(
    passage: Option<&Passage>,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
) -> VarStore {
    let mut vars = VarStore::new();
    let Some(passage) = passage else {
        return vars;
    };
    let body = &passage.raw_body;

    run_top_level_sets(body, &mut vars, scope, rng, errors);
    resolve_conditionals(body, &mut vars, scope, rng, errors);
    run_top_level_sets(body, &mut vars, scope, rng, errors);

    vars
}

/// Execute every `<<set>>` at conditional depth zero, in textual order.
fn run_top_level_sets(
    body: &str,
    vars: &mut VarStore,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
) {
    let mut depth = 0u32;
    let mut pos = 0;
    while let Some(site) = macros::next_site(body, pos) {
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
        } else if macros::is_endif(&site) {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && !site.closing && site.name == "set" {
            run_set(&site, vars, scope, rng, errors);
        }
    }
}

/// Walk every top-level conditional block in order and resolve it.
fn resolve_conditionals(
    body: &str,
    vars: &mut VarStore,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
) {
    let mut pos = 0;
    while let Some(site) = macros::next_site(body, pos) {
        if site.name.is_empty() {
            pos = site.start + 2;
            continue;
        }
        if !site.terminated {
            break;
        }
        if !site.closing && site.name == "if" {
            pos = resolve_if_block(body, &site, vars, scope, rng, errors);
        } else {
            pos = site.end;
        }
    }
}

/// Resolve one conditional chain: evaluate clause conditions against the
/// current store, run the selected branch (its sets and nested
/// conditionals, in textual order), and skip the rest.
fn resolve_if_block(
    src: &str,
    open: &MacroSite<'_>,
    vars: &mut VarStore,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
) -> usize {
    let mut taken = false;
    let mut cond: Option<&str> = Some(open.args);
    let mut body_start = open.end;

    loop {
        let (body_end, term) = macros::scan_clause(src, body_start);

        let execute = !taken
            && match cond {
                Some(c) => eval::evaluate_condition(c, vars, scope, rng, errors, false),
                None => true,
            };
        if execute {
            taken = true;
            run_branch(&src[body_start..body_end], vars, scope, rng, errors);
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
            ClauseEnd::Eof => return src.len(),
        }
    }
}

/// Run a selected branch: its `<<set>>`s and nested conditionals,
/// interleaved in textual order.
fn run_branch(
    body: &str,
    vars: &mut VarStore,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
) {
    let mut pos = 0;
    while let Some(site) = macros::next_site(body, pos) {
        if site.name.is_empty() {
            pos = site.start + 2;
            continue;
        }
        if !site.terminated {
            break;
        }
        if !site.closing && site.name == "if" {
            pos = resolve_if_block(body, &site, vars, scope, rng, errors);
        } else {
            if !site.closing && site.name == "set" {
                run_set(&site, vars, scope, rng, errors);
            }
            pos = site.end;
        }
    }
}

fn run_set(
    site: &MacroSite<'_>,
    vars: &mut VarStore,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
) {
    let mut lexer = ExprLexer::new(site.args, 0);
    match parser::parse_assignment(&mut lexer) {
        Ok(assign) => {
            eval::execute_assignment(&assign, vars, scope, rng, errors, false);
        }
        Err(message) => {
            errors.push(ErrorRecord::new(crate::error::ErrorKind::Expression, message));
        }
    }
}
