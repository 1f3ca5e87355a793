//! Collection variable resolution
//!
//! Replaces `{{name}}` placeholders with collection-scoped values and
//! normalizes the slashes of the result.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("valid placeholder pattern"));

static SCHEME_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(https?):/+").expect("valid scheme pattern"));

static SLASH_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/{2,}").expect("valid slash pattern"));

/// Variables declared at the top level of an imported collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableScope {
    values: HashMap<String, String>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Pairs sorted by key
    pub fn sorted(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Substitute every placeholder in `input`.
    ///
    /// Unbound placeholders are removed. `http(s):` followed by any number
    /// of slashes becomes exactly `scheme://`, and runs of slashes after the
    /// scheme prefix collapse to one. The result is trimmed.
    pub fn resolve(&self, input: &str) -> String {
        if input.is_empty() {
            return String::new();
        }

        let substituted = PLACEHOLDER.replace_all(input, |caps: &regex::Captures<'_>| {
            self.get(caps[1].trim()).unwrap_or_default().to_string()
        });

        let with_scheme = SCHEME_SLASHES.replace_all(&substituted, "$1://");

        let normalized = match with_scheme.split_once("://") {
            Some((scheme, rest)) => format!("{}://{}", scheme, SLASH_RUNS.replace_all(rest, "/")),
            None => SLASH_RUNS.replace_all(&with_scheme, "/").into_owned(),
        };

        normalized.trim().to_string()
    }

    /// Resolve an optional input; `None` yields an empty string
    pub fn resolve_opt(&self, input: Option<&str>) -> String {
        input.map(|s| self.resolve(s)).unwrap_or_default()
    }
}

/// True if `input` still contains a `{{...}}` placeholder
pub fn has_placeholder(input: &str) -> bool {
    PLACEHOLDER.is_match(input)
}
