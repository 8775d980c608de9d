//! Macro expansion.
//!
//! Two reference forms are recognised in statement text:
//!
//! - `${NAME}`: a constant, resolved through the configuration.
//! - `${prefix&([LIST].mangler.mangler)suffix}`: every entry of a source
//!   list, mangled left to right and wrapped in `prefix`/`suffix`, joined
//!   with single spaces.
//!
//! Constants are substituted until none remain, then one list reference is
//! rewritten, and the whole text is scanned again. Expansion stops when
//! neither form is left. Nesting is bounded by [`MAX_PASSES`]: at most that
//! many constant sweeps in a row, and at most that many list rewrites whose
//! output contains further references. Plain list rewrites always shrink
//! the text's reference count and are not limited.

use crate::config::{Configuration, SourceEntry};
use crate::deps::DependencySpec;
use crate::error::{ConfigError, MacroError};
use crate::mangler::{Mangler, ManglerRegistry};
use crate::statement::{
    CommonTool, DependencyRef, ManglingRule, ResolvedStatement, StandardStatement, Statement,
    ToolInvocation,
};
use crate::wildcard::WildcardEvaluator;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

pub const MAX_PASSES: usize = 64;

static SCALAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s*\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}").expect("scalar pattern")
});
static LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$\s*\{.*?\}").expect("list pattern"));
static LIST_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&\s*\(\s*\[\s*([A-Za-z0-9_]+)\s*\]\s*([A-Za-z0-9_.\s]*?)\s*\)")
        .expect("list reference pattern")
});
static BUILTIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s*\(\s*([A-Za-z_.]+)\s*\)").expect("builtin pattern")
});

/// Expands statements for one configuration. Manglers and the pattern cache
/// are borrowed so that several expanders can share them.
pub struct MacroExpander<'a> {
    config: &'a Configuration,
    manglers: &'a ManglerRegistry,
    wildcards: &'a WildcardEvaluator,
    root: PathBuf,
}

impl<'a> MacroExpander<'a> {
    pub fn new(
        config: &'a Configuration,
        manglers: &'a ManglerRegistry,
        wildcards: &'a WildcardEvaluator,
    ) -> Self {
        Self {
            config,
            manglers,
            wildcards,
            root: PathBuf::from("."),
        }
    }

    /// Directory that relative tool paths are resolved against.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn expand(&self, text: &str, platform: &str, target: &str) -> Result<String, MacroError> {
        let mut text = text.to_string();
        let mut sweeps = 0;
        let mut nested_lists = 0;
        loop {
            if SCALAR.is_match(&text) {
                sweeps += 1;
                if sweeps > MAX_PASSES {
                    return Err(MacroError::RecursionLimit(MAX_PASSES));
                }
                text = self.substitute_constants(&text, platform, target)?;
                continue;
            }
            sweeps = 0;
            let Some(span) = LIST.find(&text) else {
                return Ok(text);
            };
            let range = span.range();
            let replacement = self.expand_list(span.as_str(), platform, target)?;
            if SCALAR.is_match(&replacement) || LIST.is_match(&replacement) {
                nested_lists += 1;
                if nested_lists > MAX_PASSES {
                    return Err(MacroError::RecursionLimit(MAX_PASSES));
                }
            }
            text.replace_range(range, &replacement);
        }
    }

    fn substitute_constants(&self, text: &str, platform: &str, target: &str) -> Result<String, MacroError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in SCALAR.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            out.push_str(self.config.resolve_constant(platform, target, name.as_str())?);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn expand_list(&self, span: &str, platform: &str, target: &str) -> Result<String, MacroError> {
        let malformed = || MacroError::MalformedList(span.to_string());
        let inner = span
            .trim_start_matches('$')
            .trim_start()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(malformed)?
            .trim();

        let caps = LIST_REF.captures(inner).ok_or_else(malformed)?;
        let (Some(whole), Some(list), Some(chain)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            return Err(malformed());
        };
        let prefix = &inner[..whole.start()];
        let suffix = &inner[whole.end()..];
        let manglers = self.mangler_chain(chain.as_str())?;

        let expanded: Vec<String> = self
            .source_entries(platform, target, list.as_str())?
            .into_iter()
            .map(|entry| format!("{}{}{}", prefix, apply(&manglers, &entry.file), suffix))
            .collect();
        tracing::trace!(list = list.as_str(), entries = expanded.len(), "expanded list");
        Ok(expanded.join(" "))
    }

    fn mangler_chain(&self, chain: &str) -> Result<Vec<Mangler>, MacroError> {
        chain
            .split('.')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                self.manglers
                    .get(name)
                    .ok_or_else(|| MacroError::UnknownMangler(name.to_string()))
            })
            .collect()
    }

    /// Entries of a source list that take part in a build for `platform`.
    pub fn source_entries(
        &self,
        platform: &str,
        target: &str,
        list: &str,
    ) -> Result<Vec<&'a SourceEntry>, ConfigError> {
        let canonical = self.config.resolve_platform_name(platform, Some(target))?;
        let entries = self.config.resolve_source_list(platform, target, list)?;
        Ok(entries
            .iter()
            .filter(|entry| match &entry.platform {
                None => true,
                Some(p) => self
                    .config
                    .resolve_platform_name(p, Some(target))
                    .map_or(p == &canonical, |resolved| resolved == canonical),
            })
            .collect())
    }

    /// Replaces `$(filename.mangler...)` builtins in a mangling rule.
    fn expand_builtins(&self, text: &str, filename: &str) -> Result<String, MacroError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in BUILTIN.captures_iter(text) {
            let (Some(whole), Some(reference)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let reference = reference.as_str();
            let (head, chain) = reference.split_once('.').unwrap_or((reference, ""));
            if !head.eq_ignore_ascii_case("filename") {
                return Err(MacroError::UnknownBuiltin(reference.to_string()));
            }
            out.push_str(&text[last..whole.start()]);
            out.push_str(&apply(&self.mangler_chain(chain)?, filename));
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn apply_rules(
        &self,
        rules: &[ManglingRule],
        filename: &str,
        text: &mut String,
        combine: impl Fn(&str, &str) -> String,
    ) -> Result<(), MacroError> {
        for rule in rules {
            if self.wildcards.matches(&rule.when, filename)? {
                let produced = self.expand_builtins(&rule.text, filename)?;
                *text = combine(&produced, text);
            }
        }
        Ok(())
    }

    /// Expands a `common` step into one command line per source entry, each
    /// paired with the entry as its dependency.
    pub fn generate_common(
        &self,
        common: &CommonTool,
        platform: &str,
        target: &str,
    ) -> Result<Vec<(String, DependencySpec)>, MacroError> {
        let canonical = self.config.resolve_platform_name(platform, Some(target))?;
        let mut generated = Vec::new();
        for entry in self.source_entries(platform, target, &common.list)? {
            let filename = entry.file.as_str();
            let mut text = filename.to_string();
            self.apply_rules(&common.prefix, filename, &mut text, |p, t| format!("{} {}", p, t))?;
            self.apply_rules(&common.filename, filename, &mut text, |f, _| f.to_string())?;
            self.apply_rules(&common.suffix, filename, &mut text, |s, t| format!("{} {}", t, s))?;
            generated.push((
                format!("{} {}", common.tool.trim_end(), text),
                entry_dependency(entry, target, &canonical),
            ));
        }
        Ok(generated)
    }

    /// Binds dependency references to the (target, platform) scope.
    pub fn resolve_dependencies(
        &self,
        refs: &[DependencyRef],
        platform: &str,
        target: &str,
    ) -> Result<Vec<DependencySpec>, MacroError> {
        let canonical = self.config.resolve_platform_name(platform, Some(target))?;
        let mut specs = Vec::new();
        for dep in refs {
            match dep {
                DependencyRef::File(path) => specs.push(DependencySpec::file(
                    self.expand(path, platform, target)?,
                    target,
                    &canonical,
                )),
                DependencyRef::Directory(path) => specs.push(DependencySpec::directory(
                    self.expand(path, platform, target)?,
                    target,
                    &canonical,
                )),
                DependencyRef::List(name) => {
                    for path in self.config.resolve_dependency_list(platform, target, name)? {
                        let path = self.expand(path, platform, target)?;
                        specs.push(match path.strip_suffix('/') {
                            Some(dir) => DependencySpec::directory(dir, target, &canonical),
                            None => DependencySpec::file(path, target, &canonical),
                        });
                    }
                }
                DependencyRef::Inputs(list) => {
                    for entry in self.source_entries(platform, target, list)? {
                        specs.push(entry_dependency(entry, target, &canonical));
                    }
                }
            }
        }
        Ok(specs)
    }

    /// Looks up a tool and returns its absolute path. Values containing a
    /// path separator are taken relative to the root; bare names are
    /// searched on `PATH` and left as-is if not found.
    pub fn resolve_tool(&self, name: &str, platform: &str, target: &str) -> Result<PathBuf, MacroError> {
        let value = self.config.resolve_tool(platform, target, name)?;
        let value = self.expand(value, platform, target)?;
        let path = PathBuf::from(&value);
        if path.is_absolute() {
            return Ok(path);
        }
        if value.contains(['/', '\\']) {
            let joined = self.root.join(path);
            return Ok(std::path::absolute(&joined).unwrap_or(joined));
        }
        Ok(search_path(&value).unwrap_or(path))
    }

    fn resolve_invocation(
        &self,
        text: &str,
        dependencies: Vec<DependencySpec>,
        platform: &str,
        target: &str,
    ) -> Result<ToolInvocation, MacroError> {
        let expanded = self.expand(text, platform, target)?;
        let (tool, arguments) = StandardStatement::split_tool(&expanded);
        Ok(ToolInvocation {
            tool: self.resolve_tool(tool, platform, target)?,
            arguments: arguments.to_string(),
            dependencies,
        })
    }

    /// Fully resolves one statement; a `common` step yields one invocation
    /// per source entry.
    pub fn resolve_statement(
        &self,
        statement: &Statement,
        platform: &str,
        target: &str,
    ) -> Result<Vec<ResolvedStatement>, MacroError> {
        let expand_opt = |s: &Option<String>| -> Result<Option<String>, MacroError> {
            s.as_deref()
                .map(|s| self.expand(s, platform, target))
                .transpose()
        };
        Ok(match statement {
            Statement::Standard(standard) => {
                let deps = self.resolve_dependencies(&standard.dependencies, platform, target)?;
                vec![ResolvedStatement::Tool(self.resolve_invocation(
                    &standard.text,
                    deps,
                    platform,
                    target,
                )?)]
            }
            Statement::Common(common) => self
                .generate_common(common, platform, target)?
                .into_iter()
                .map(|(text, dep)| {
                    self.resolve_invocation(&text, vec![dep], platform, target)
                        .map(ResolvedStatement::Tool)
                })
                .collect::<Result<Vec<_>, _>>()?,
            Statement::File(file) => {
                let mut file = file.clone();
                file.path = self.expand(&file.path, platform, target)?;
                file.arg = expand_opt(&file.arg)?;
                file.body = expand_opt(&file.body)?;
                vec![ResolvedStatement::File(file)]
            }
            Statement::Directory(dir) => {
                let mut dir = dir.clone();
                dir.path = self.expand(&dir.path, platform, target)?;
                dir.arg = expand_opt(&dir.arg)?;
                vec![ResolvedStatement::Directory(dir)]
            }
        })
    }

    /// Resolves every statement of a target in declaration order.
    pub fn resolve_target(&self, target: &str, platform: &str) -> Result<Vec<ResolvedStatement>, MacroError> {
        let mut resolved = Vec::new();
        for statement in &self.config.target(target)?.statements {
            resolved.extend(self.resolve_statement(statement, platform, target)?);
        }
        tracing::debug!(name = target, platform, statements = resolved.len(), "resolved target");
        Ok(resolved)
    }
}

fn apply(manglers: &[Mangler], input: &str) -> String {
    manglers
        .iter()
        .fold(input.to_string(), |acc, mangler| mangler(&acc))
}

fn entry_dependency(entry: &SourceEntry, target: &str, platform: &str) -> DependencySpec {
    let mut spec = DependencySpec::file(entry.file.clone(), target, platform);
    for path in &entry.depends {
        spec.children.push(DependencySpec::file(path.clone(), target, platform));
    }
    for path in &entry.depends_dirs {
        spec.children
            .push(DependencySpec::directory(path.clone(), target, platform));
    }
    spec
}

fn search_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        let suffix = std::env::consts::EXE_SUFFIX;
        if !suffix.is_empty() {
            let with_suffix = dir.join(format!("{}{}", name, suffix));
            if with_suffix.is_file() {
                return Some(with_suffix);
            }
        }
        None
    })
}
