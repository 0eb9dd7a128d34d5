// The profile's free-form custom command line

use std::collections::HashSet;

use super::options::OptionKey;
use super::Dialect;

const BUNDLE_SWITCHES: [&str; 2] = ["-x264opts", "-x264-params"];

/// A parsed custom command line: its tokens plus every option name it sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomLine {
    tokens: Vec<String>,
    names: HashSet<String>,
    bundle: Vec<String>,
}

impl CustomLine {
    pub fn parse(raw: &str) -> Self {
        let line = raw.replace(['\r', '\n'], " ");
        let line = line.trim();
        if line.is_empty() {
            return Self::default();
        }

        // Shell-style split keeps quoted values together
        let tokens = shlex::split(line)
            .unwrap_or_else(|| line.split_whitespace().map(str::to_string).collect());

        let mut names = HashSet::new();
        let mut bundle = Vec::new();
        let mut in_bundle = false;
        for token in &tokens {
            if in_bundle {
                in_bundle = false;
                for entry in token.split(':').filter(|e| !e.is_empty()) {
                    names.insert(key_of(entry).to_string());
                    bundle.push(entry.to_string());
                }
                continue;
            }
            if BUNDLE_SWITCHES.contains(&token.as_str()) {
                in_bundle = true;
                continue;
            }
            if let Some(name) = option_name(token) {
                names.insert(name.to_string());
            }
        }

        Self {
            tokens,
            names,
            bundle,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether the custom line already sets `key`, spelled the way `dialect`
    /// spells it.
    pub fn covers(&self, key: OptionKey, dialect: Dialect) -> bool {
        key.token_names(dialect)
            .iter()
            .any(|name| self.names.contains(*name))
    }

    /// All tokens, verbatim.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Tokens with any private-option bundle switch and its value removed.
    pub fn tokens_outside_bundle(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.tokens.len());
        let mut skip = false;
        for token in &self.tokens {
            if skip {
                skip = false;
                continue;
            }
            if BUNDLE_SWITCHES.contains(&token.as_str()) {
                skip = true;
                continue;
            }
            out.push(token.clone());
        }
        out
    }

    /// `key=value` entries given through `-x264opts` / `-x264-params`.
    pub fn bundle_entries(&self) -> &[String] {
        &self.bundle
    }
}

/// Bare option name of a `-x`, `--x` or `--x=value` token. Negative numbers
/// are values, not options.
fn option_name(token: &str) -> Option<&str> {
    let name = token.trim_start_matches('-');
    if name.len() == token.len() || name.is_empty() {
        return None;
    }
    if name.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    Some(key_of(name))
}

fn key_of(entry: &str) -> &str {
    entry.split('=').next().unwrap_or(entry)
}
