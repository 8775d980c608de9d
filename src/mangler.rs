//! Filename manglers.
//!
//! A mangler is a pure `&str -> String` transform applied to source list
//! entries during list expansion. The registry is an explicit object handed
//! to the expander; names are matched case-insensitively.

use crate::report::Warning;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

pub type Mangler = Rc<dyn Fn(&str) -> String>;

/// `src/main.c` -> `src/main`. Only the final component's extension goes.
pub fn no_extension(input: &str) -> String {
    match Path::new(input).extension() {
        Some(ext) => input[..input.len() - ext.len() - 1].to_string(),
        None => input.to_string(),
    }
}

/// `src/sub/main.c` -> `src_sub_main_c`.
pub fn dir_to_filename(input: &str) -> String {
    input.replace(['\\', '/', '.'], "_")
}

#[derive(Clone)]
pub struct ManglerRegistry {
    entries: BTreeMap<String, Mangler>,
    failures: Rc<RefCell<Vec<Warning>>>,
}

impl Default for ManglerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManglerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManglerRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ManglerRegistry {
    /// A registry holding the built-in manglers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("no_extension", no_extension);
        registry.register("dir_to_filename", dir_to_filename);
        registry
    }

    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            failures: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Adds or replaces a mangler. Returns `true` if a mangler of that name
    /// already existed.
    pub fn register(&mut self, name: &str, mangler: impl Fn(&str) -> String + 'static) -> bool {
        self.entries
            .insert(name.to_ascii_lowercase(), Rc::new(mangler))
            .is_some()
    }

    /// Compiles a rhai snippet into a mangler. The snippet is the body of a
    /// function taking one string parameter named `param` and must evaluate
    /// to a string. A runtime failure leaves the input unchanged and is
    /// queued as a warning, see [`take_failures`](Self::take_failures).
    pub fn register_script(&mut self, name: &str, param: &str, script: &str) -> Result<bool, String> {
        let engine = rhai::Engine::new();
        let source = format!("fn mangle({}) {{\n{}\n}}", param, script);
        let ast = engine
            .compile(&source)
            .map_err(|e| format!("mangler '{}' does not compile: {}", name, e))?;

        let failures = Rc::clone(&self.failures);
        let mangler_name = name.to_string();
        Ok(self.register(name, move |input| {
            let mut scope = rhai::Scope::new();
            match engine.call_fn::<String>(&mut scope, &ast, "mangle", (input.to_string(),)) {
                Ok(out) => out,
                Err(e) => {
                    tracing::warn!(mangler = %mangler_name, input, error = %e, "script mangler failed");
                    failures.borrow_mut().push(Warning::ScriptFailed {
                        mangler: mangler_name.clone(),
                        message: e.to_string(),
                    });
                    input.to_string()
                }
            }
        }))
    }

    pub fn get(&self, name: &str) -> Option<Mangler> {
        self.entries.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Warnings raised by script manglers since the last call.
    pub fn take_failures(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.failures.borrow_mut())
    }
}
