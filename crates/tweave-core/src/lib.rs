//! Twee 1.x story engine: parse, evaluate, render.
//!
//! A story source is plain text broken into `::`-headed passages carrying
//! tags, `[[links]]`, and an inline macro language (`<<set>>`, `<<print>>`,
//! `<<if>>`, `<<display>>`, `<<nobr>>`). This crate parses a source string
//! into a structural [`ParseResult`] and renders individual passages
//! against a caller-owned variable store, surfacing the outbound links to
//! the host. Errors are collected into the results, never raised: a
//! broken passage must not take the rest of the story down with it.
//!
//! ```
//! let source = ":: Start\n<<set $gold = 10>>You have <<print $gold>> gold. [[Shop]]";
//! let result = tweave_core::parse(source);
//! let passage = result.passage("Start").unwrap();
//!
//! let mut vars = tweave_core::VarStore::new();
//! let rendered = tweave_core::render(
//!     passage,
//!     &mut vars,
//!     &result.passages,
//!     tweave_core::ExecutionMode::Runtime,
//! );
//! assert_eq!(rendered.text, "You have 10 gold. Shop");
//! assert_eq!(rendered.links[0].target, "Shop");
//! ```

pub mod error;
pub mod expr;
mod macros;
pub mod render;
pub mod rng;
pub mod scope;
mod special;
pub mod story;
pub mod value;

pub use error::{ErrorKind, ErrorRecord};
pub use scope::VarScope;
pub use story::{ExecutionMode, Link, ParseResult, Passage, RenderResult, Setter};
pub use value::{Value, VarStore};

use rng::{Entropy, OsEntropy, SeededEntropy};

/// Configured engine entry point: scope mode, strict-reference flag, and
/// the entropy source behind `either()`/`random()`.
///
/// The free functions below cover the common case (global scope, OS
/// entropy); hosts that need per-user scoping or reproducible runs build
/// a `Parser`.
pub struct Parser {
    scope: VarScope,
    strict: bool,
    rng: Box<dyn Entropy>,
}

impl Parser {
    pub fn new(scope: VarScope) -> Self {
        Self {
            scope,
            strict: false,
            rng: Box::new(OsEntropy::new()),
        }
    }

    /// Use a fixed entropy seed so `either()`/`random()` replay.
    pub fn with_seed(scope: VarScope, seed: u64) -> Self {
        Self {
            scope,
            strict: false,
            rng: Box::new(SeededEntropy::new(seed)),
        }
    }

    /// Record a reference error when an undefined variable is read.
    /// Reads still yield integer zero.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Parse a story source. Always succeeds; structural problems and
    /// special-passage evaluation errors accumulate in the result.
    pub fn parse(&mut self, source: &str) -> ParseResult {
        let mut errors = Vec::new();
        let passages = story::parse_document(source, &mut errors);

        let last_named = |name: &str| passages.iter().rev().find(|p| p.name == name);
        let story_init_vars = special::extract_story_init(
            last_named(story::STORY_INIT),
            &self.scope,
            self.rng.as_mut(),
            &mut errors,
        );
        let test_setup_vars = special::extract_test_setup(
            last_named(story::TEST_SETUP),
            &self.scope,
            self.rng.as_mut(),
            &mut errors,
        );

        ParseResult {
            passages,
            story_init_vars,
            test_setup_vars,
            errors,
        }
    }

    /// Render one passage against `vars`, which is mutated by `<<set>>`
    /// in textual order. Always succeeds; errors accumulate in the result.
    pub fn render(
        &mut self,
        passage: &Passage,
        vars: &mut VarStore,
        passages: &[Passage],
        mode: ExecutionMode,
    ) -> RenderResult {
        render::render_passage(
            passage,
            vars,
            passages,
            mode,
            &self.scope,
            self.rng.as_mut(),
            self.strict,
        )
    }

    /// Evaluate a standalone expression, returning the value and any
    /// errors it produced.
    pub fn evaluate(&mut self, expr: &str, vars: &VarStore) -> (Value, Vec<ErrorRecord>) {
        let mut errors = Vec::new();
        let value = expr::eval::evaluate(
            expr,
            vars,
            &self.scope,
            self.rng.as_mut(),
            &mut errors,
            self.strict,
        );
        (value, errors)
    }

    /// Evaluate a condition: the expression's value coerced by truthiness.
    pub fn evaluate_condition(&mut self, expr: &str, vars: &VarStore) -> bool {
        self.evaluate(expr, vars).0.truthy()
    }
}

/// Parse a story source under global scope.
pub fn parse(source: &str) -> ParseResult {
    Parser::new(VarScope::Global).parse(source)
}

/// Render one passage under global scope with OS entropy.
pub fn render(
    passage: &Passage,
    vars: &mut VarStore,
    passages: &[Passage],
    mode: ExecutionMode,
) -> RenderResult {
    Parser::new(VarScope::Global).render(passage, vars, passages, mode)
}

/// Evaluate a standalone expression under global scope. Malformed input
/// evaluates to integer zero.
pub fn evaluate_expression(expr: &str, vars: &VarStore) -> Value {
    Parser::new(VarScope::Global).evaluate(expr, vars).0
}

/// Evaluate a condition under global scope.
pub fn evaluate_condition(expr: &str, vars: &VarStore) -> bool {
    Parser::new(VarScope::Global).evaluate_condition(expr, vars)
}
