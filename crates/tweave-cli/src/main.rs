//! JSON command-line frontend for the story engine.
//!
//! Variables arrive on standard input as a JSON object; results are
//! emitted as JSON on standard output. Status lines go to stderr so
//! stdout stays machine-readable. Exit code is zero on successful
//! operation even when the document contains recoverable errors (they
//! appear in the JSON `errors` array); non-zero only on I/O failure or
//! invalid invocation.

use std::collections::BTreeMap;
use std::fs;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use serde::Serialize;

use tweave_core::story::STORY_TITLE;
use tweave_core::{
    ErrorRecord, ExecutionMode, ParseResult, Parser, Value, VarScope, VarStore,
};

#[derive(ClapParser)]
#[command(name = "tweave", about = "Twee 1.x story parser and renderer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a story file and print its structure as JSON.
    Parse {
        /// Story source file.
        file: PathBuf,
    },
    /// Render a passage; variables are read from stdin as a JSON object.
    Render {
        /// Story source file.
        file: PathBuf,
        /// Name of the passage to render.
        passage: String,
        /// Render mode.
        #[arg(long, value_enum, default_value = "preview")]
        mode: ModeArg,
        /// Fixed entropy seed for reproducible either()/random().
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Evaluate an expression; variables are read from stdin.
    Evaluate {
        /// The expression, e.g. '$HEALTH + 50'.
        expression: String,
        /// Fixed entropy seed for reproducible either()/random().
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print story metadata: title, passage list, special-passage vars.
    Info {
        /// Story source file.
        file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum ModeArg {
    /// Structure only; macros are not executed.
    ParseOnly,
    /// Full execution for editor preview.
    Preview,
    /// Full execution for the engine.
    Runtime,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::ParseOnly => ExecutionMode::ParseOnly,
            ModeArg::Preview => ExecutionMode::Preview,
            ModeArg::Runtime => ExecutionMode::Runtime,
        }
    }
}

// ---------------------------------------------------------------------------
// Input plumbing
// ---------------------------------------------------------------------------

fn load_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read story file: {}", path.display()))
}

/// Read the variable mapping from stdin when it is piped in; an attached
/// terminal means no variables.
fn stdin_vars() -> Result<VarStore> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(VarStore::new());
    }
    let mut buf = String::new();
    stdin
        .read_to_string(&mut buf)
        .context("failed to read variables from stdin")?;
    if buf.trim().is_empty() {
        return Ok(VarStore::new());
    }
    let json: serde_json::Value =
        serde_json::from_str(&buf).context("invalid JSON on stdin")?;
    json_to_vars(&json)
}

/// Convert a JSON object of scalars into a variable store.
fn json_to_vars(json: &serde_json::Value) -> Result<VarStore> {
    let serde_json::Value::Object(map) = json else {
        bail!("variables must be a JSON object");
    };
    let mut vars = VarStore::new();
    for (key, value) in map {
        let value = match value {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    bail!("variable {key:?} has an out-of-range number");
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => bail!("variable {key:?} has unsupported type: {other}"),
        };
        vars.insert(key.clone(), value);
    }
    Ok(vars)
}

fn make_parser(seed: Option<u64>) -> Parser {
    match seed {
        Some(seed) => Parser::with_seed(VarScope::Global, seed),
        None => Parser::new(VarScope::Global),
    }
}

/// Print a JSON error object and signal invalid invocation.
fn fail_json(error: impl Serialize) -> ExitCode {
    match serde_json::to_string_pretty(&error) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("[error] {e}"),
    }
    ExitCode::FAILURE
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct PassageJson<'a> {
    name: &'a str,
    tags: &'a [String],
    body: &'a str,
    image_url: Option<&'a str>,
}

fn passages_json(result: &ParseResult) -> BTreeMap<&str, PassageJson<'_>> {
    // Duplicate names collapse to the last declaration, matching lookup.
    result
        .passages
        .iter()
        .map(|p| {
            (
                p.name.as_str(),
                PassageJson {
                    name: &p.name,
                    tags: &p.tags,
                    body: &p.raw_body,
                    image_url: p.image_url.as_deref(),
                },
            )
        })
        .collect()
}

fn cmd_parse(file: &Path) -> Result<ExitCode> {
    let source = load_source(file)?;
    let result = tweave_core::parse(&source);
    eprintln!(
        "[parse] {} passage(s), {} error(s)",
        result.passages.len(),
        result.errors.len()
    );

    #[derive(Serialize)]
    struct Output<'a> {
        passages: BTreeMap<&'a str, PassageJson<'a>>,
        story_init_vars: &'a VarStore,
        test_setup_vars: &'a VarStore,
        errors: &'a [ErrorRecord],
        passage_count: usize,
    }
    let output = Output {
        passages: passages_json(&result),
        story_init_vars: &result.story_init_vars,
        test_setup_vars: &result.test_setup_vars,
        errors: &result.errors,
        passage_count: result.passages.len(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_render(file: &Path, passage: &str, mode: ModeArg, seed: Option<u64>) -> Result<ExitCode> {
    let mut vars = stdin_vars()?;
    let source = load_source(file)?;
    let mut parser = make_parser(seed);
    let result = parser.parse(&source);

    let Some(target) = result.passage(passage) else {
        #[derive(Serialize)]
        struct NotFound<'a> {
            error: String,
            available_passages: Vec<&'a str>,
        }
        return Ok(fail_json(NotFound {
            error: format!("passage not found: {passage}"),
            available_passages: result.passages.iter().map(|p| p.name.as_str()).collect(),
        }));
    };

    let rendered = parser.render(target, &mut vars, &result.passages, mode.into());
    eprintln!(
        "[render] {passage}: {} link(s), {} error(s)",
        rendered.links.len(),
        rendered.errors.len()
    );

    #[derive(Serialize)]
    struct Output<'a> {
        text: &'a str,
        links: &'a [tweave_core::Link],
        variable_changes: &'a VarStore,
        errors: &'a [ErrorRecord],
    }
    let output = Output {
        text: &rendered.text,
        links: &rendered.links,
        variable_changes: &rendered.variable_changes,
        errors: &rendered.errors,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_evaluate(expression: &str, seed: Option<u64>) -> Result<ExitCode> {
    let vars = stdin_vars()?;
    let mut parser = make_parser(seed);
    let (value, errors) = parser.evaluate(expression, &vars);

    #[derive(Serialize)]
    struct Output<'a> {
        result: &'a Value,
        expression: &'a str,
        errors: &'a [ErrorRecord],
    }
    let output = Output {
        result: &value,
        expression,
        errors: &errors,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_info(file: &Path) -> Result<ExitCode> {
    let source = load_source(file)?;
    let result = tweave_core::parse(&source);

    let title = result.passage(STORY_TITLE).map(|p| p.raw_body.trim());

    #[derive(Serialize)]
    struct Output<'a> {
        title: Option<&'a str>,
        passage_count: usize,
        story_init_vars: &'a VarStore,
        test_setup_vars: &'a VarStore,
        passages: Vec<&'a str>,
        errors: &'a [ErrorRecord],
    }
    let output = Output {
        title,
        passage_count: result.passages.len(),
        story_init_vars: &result.story_init_vars,
        test_setup_vars: &result.test_setup_vars,
        passages: result.passages.iter().map(|p| p.name.as_str()).collect(),
        errors: &result.errors,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Parse { file } => cmd_parse(file),
        Command::Render {
            file,
            passage,
            mode,
            seed,
        } => cmd_render(file, passage, *mode, *seed),
        Command::Evaluate { expression, seed } => cmd_evaluate(expression, *seed),
        Command::Info { file } => cmd_info(file),
    }
}
