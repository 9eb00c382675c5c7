//! Shell variables
//!
//! A flat name → value store plus computed keys. `RANDOM` is generated on
//! every read. Line-local assignments (`X=1 cmd`) are exported in a scope
//! that is unwound when the command finishes.

use rand::Rng;
use std::collections::{BTreeMap, HashMap};

/// Key holding the last exit code
pub const STATUS: &str = "?";

/// Computed key: a fresh value in `0..32767` on every read
pub const RANDOM: &str = "RANDOM";

/// Is `name` usable as a variable name?
pub fn is_valid_name(name: &str) -> bool {
    name == STATUS
        || (!name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    /// Saved values to restore, innermost scope last
    scopes: Vec<Vec<(String, Option<String>)>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment seeded with `vars`
    pub fn with_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            scopes: Vec::new(),
        }
    }

    /// Stored or computed value; `None` if not set
    pub fn get(&self, key: &str) -> Option<String> {
        if key == RANDOM {
            return Some(rand::thread_rng().gen_range(0..32767).to_string());
        }
        self.vars.get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        key == RANDOM || self.vars.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn unset(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    /// Export line-local assignments until the matching [`pop_scope`]
    ///
    /// [`pop_scope`]: Environment::pop_scope
    pub fn push_scope(&mut self, assignments: &[(String, String)]) {
        let saved = assignments
            .iter()
            .map(|(name, value)| {
                let previous = self.vars.insert(name.clone(), value.clone());
                (name.clone(), previous)
            })
            .collect();
        self.scopes.push(saved);
    }

    /// Undo the innermost exported scope
    pub fn pop_scope(&mut self) {
        let Some(saved) = self.scopes.pop() else {
            return;
        };
        // Reverse order so a name assigned twice ends at its oldest value
        for (name, previous) in saved.into_iter().rev() {
            match previous {
                Some(value) => self.vars.insert(name, value),
                None => self.vars.remove(&name),
            };
        }
    }

    /// Replace `$NAME` and `${NAME}` references.
    ///
    /// Lookups try `locals` first, then the environment. Unknown names and
    /// an unterminated `${` are left as written.
    pub fn substitute(&self, text: &str, locals: &HashMap<String, String>) -> String {
        let lookup = |name: &str| locals.get(name).cloned().or_else(|| self.get(name));

        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < chars.len() {
            if chars[i] != '$' {
                out.push(chars[i]);
                i += 1;
                continue;
            }

            if chars.get(i + 1) == Some(&'{') {
                let Some(close) = chars[i + 2..].iter().position(|&c| c == '}') else {
                    out.extend(&chars[i..]);
                    break;
                };
                let end = i + 2 + close;
                let name: String = chars[i + 2..end].iter().collect();
                match lookup(&name) {
                    Some(value) => out.push_str(&value),
                    None => out.extend(&chars[i..=end]),
                }
                i = end + 1;
                continue;
            }

            let mut end = i + 1;
            if chars.get(end) == Some(&'?') {
                end += 1;
            } else {
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
            }
            if end == i + 1 {
                out.push('$');
                i += 1;
                continue;
            }

            let name: String = chars[i + 1..end].iter().collect();
            match lookup(&name) {
                Some(value) => out.push_str(&value),
                None => out.extend(&chars[i..end]),
            }
            i = end;
        }
        out
    }

    /// Stored variables sorted by name
    pub fn sorted(&self) -> BTreeMap<&str, &str> {
        self.vars
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// `KEY=VALUE` lines sorted by key
impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<String> = self
            .sorted()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        f.write_str(&lines.join("\n"))
    }
}
