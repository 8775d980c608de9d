use crate::error::MacroError;
use crate::statement::Selector;
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

/// Compiles glob and regex patterns once and keeps them for the lifetime of
/// the evaluator. One evaluator belongs to one engine.
#[derive(Debug, Default)]
pub struct WildcardEvaluator {
    wildcards: RefCell<HashMap<String, Regex>>,
    regexes: RefCell<HashMap<String, Regex>>,
}

/// `*` matches any run of characters, `?` exactly one; the whole input
/// must match.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

fn compile(pattern: &str, source: &str) -> Result<Regex, MacroError> {
    Regex::new(source).map_err(|e| MacroError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

impl WildcardEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_wildcard_match(&self, wildcard: &str, candidate: &str) -> Result<bool, MacroError> {
        Self::cached(&self.wildcards, wildcard, candidate, || {
            compile(wildcard, &wildcard_to_regex(wildcard))
        })
    }

    pub fn is_regex_match(&self, pattern: &str, candidate: &str) -> Result<bool, MacroError> {
        Self::cached(&self.regexes, pattern, candidate, || compile(pattern, pattern))
    }

    pub fn matches(&self, selector: &Selector, filename: &str) -> Result<bool, MacroError> {
        match selector {
            Selector::All => Ok(true),
            Selector::Filename(name) => Ok(name == filename),
            Selector::Wildcard(w) => self.is_wildcard_match(w, filename),
            Selector::Regex(r) => self.is_regex_match(r, filename),
        }
    }

    /// Number of compiled patterns held, wildcards plus regexes.
    pub fn compiled(&self) -> usize {
        self.wildcards.borrow().len() + self.regexes.borrow().len()
    }

    fn cached(
        cache: &RefCell<HashMap<String, Regex>>,
        key: &str,
        candidate: &str,
        build: impl FnOnce() -> Result<Regex, MacroError>,
    ) -> Result<bool, MacroError> {
        if let Some(re) = cache.borrow().get(key) {
            return Ok(re.is_match(candidate));
        }
        let re = build()?;
        let matched = re.is_match(candidate);
        cache.borrow_mut().insert(key.to_string(), re);
        Ok(matched)
    }
}
