//! Variable scope indirection.
//!
//! The DSL references variables as `$NAME`; the store the host hands us may
//! be keyed bare (editor mode) or per-user (`username_NAME`, engine mode).
//! The adapter owns that translation and nothing else. It is injected into
//! the parser/renderer at construction; there is no process-wide state.

use crate::value::{Value, VarStore};

/// Variable scoping strategy, configured once on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarScope {
    /// Bare keys: `$health` → `HEALTH`.
    Global,
    /// Per-user keys: `$health` with username `alice` → `alice_HEALTH`.
    /// The username's casing is preserved verbatim.
    Prefixed { username: String },
}

impl VarScope {
    /// The canonical store key for a `$NAME` reference. The name portion is
    /// uppercased; lookups remain case-insensitive against existing keys.
    pub fn key_for(&self, name: &str) -> String {
        match self {
            VarScope::Global => name.to_ascii_uppercase(),
            VarScope::Prefixed { username } => {
                format!("{username}_{}", name.to_ascii_uppercase())
            }
        }
    }

    /// Look up `$name` in the store. Tries the canonical key first, then a
    /// case-insensitive scan so caller-supplied keys in any casing are
    /// found. Returns `None` on a genuine miss (the evaluator substitutes
    /// integer zero).
    pub fn lookup<'a>(&self, vars: &'a VarStore, name: &str) -> Option<&'a Value> {
        let canonical = self.key_for(name);
        if let Some(v) = vars.get(&canonical) {
            return Some(v);
        }
        vars.iter()
            .find(|(key, _)| self.key_matches(key, name))
            .map(|(_, v)| v)
    }

    /// Write `$name`, storing at the canonical key. Case-variant duplicates
    /// of the same name are displaced so reads stay unambiguous. Returns
    /// the key written.
    pub fn write(&self, vars: &mut VarStore, name: &str, value: Value) -> String {
        let canonical = self.key_for(name);
        let stale: Vec<String> = vars
            .keys()
            .filter(|key| *key != &canonical && self.key_matches(key, name))
            .cloned()
            .collect();
        for key in stale {
            vars.remove(&key);
        }
        vars.insert(canonical.clone(), value);
        canonical
    }

    /// Whether an existing store key refers to the bare name `name` under
    /// this scope, ignoring case on the name portion.
    fn key_matches(&self, key: &str, name: &str) -> bool {
        match self {
            VarScope::Global => key.eq_ignore_ascii_case(name),
            VarScope::Prefixed { username } => {
                let prefix_len = username.len();
                key.len() > prefix_len
                    && key.starts_with(username.as_str())
                    && key.as_bytes()[prefix_len] == b'_'
                    && key[prefix_len + 1..].eq_ignore_ascii_case(name)
            }
        }
    }
}
