//! Build orchestration: description -> configuration -> resolved statements
//! -> execution, with the typed cache loaded once before and saved once
//! after.

use crate::cache::TypedCache;
use crate::config::DEFAULT_TARGET;
use crate::description;
use crate::error::{CacheError, EngineError};
use crate::exec::{Executor, RunSummary, TargetPlan};
use crate::expand::MacroExpander;
use crate::mangler::ManglerRegistry;
use crate::report::{Reporter, Warning};
use crate::snapshot;
use crate::wildcard::WildcardEvaluator;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub description: PathBuf,
    pub platform: String,
    /// Built in this order. Empty means the default target.
    pub targets: Vec<String>,
    pub dry_run: bool,
    /// Reuse resolved statements stored by a previous run of the same
    /// description.
    pub reuse_snapshots: bool,
    pub log: Option<PathBuf>,
    pub progress: bool,
    pub quiet: bool,
}

impl EngineOptions {
    pub fn new(description: impl Into<PathBuf>, platform: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            platform: platform.into(),
            targets: Vec::new(),
            dry_run: false,
            reuse_snapshots: true,
            log: None,
            progress: true,
            quiet: false,
        }
    }

    fn target_names(&self) -> Vec<String> {
        if self.targets.is_empty() {
            vec![DEFAULT_TARGET.to_string()]
        } else {
            self.targets.clone()
        }
    }

    /// Directory holding the description; relative paths resolve against it.
    pub fn root(&self) -> PathBuf {
        match self.description.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// `omake.toml` -> `omake.toml.cache`.
pub fn cache_path(description: &Path) -> PathBuf {
    let mut name = description.as_os_str().to_os_string();
    name.push(".cache");
    PathBuf::from(name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub run: RunSummary,
    pub errors: u64,
    pub warnings: u64,
    /// Statements came from the parse snapshot instead of the description.
    pub from_snapshot: bool,
}

impl BuildSummary {
    pub fn success(&self) -> bool {
        self.errors == 0
    }
}

/// Owns the collaborators that outlive a single build: the mangler registry
/// and the compiled-pattern cache.
#[derive(Debug, Default)]
pub struct Engine {
    manglers: ManglerRegistry,
    wildcards: WildcardEvaluator,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manglers(manglers: ManglerRegistry) -> Self {
        Self {
            manglers,
            wildcards: WildcardEvaluator::new(),
        }
    }

    pub fn manglers_mut(&mut self) -> &mut ManglerRegistry {
        &mut self.manglers
    }

    pub fn build(&mut self, options: &EngineOptions) -> Result<BuildSummary> {
        let mut reporter = Reporter::new(options.description.display().to_string());
        if let Some(log) = &options.log {
            reporter = reporter
                .with_log(log)
                .with_context(|| format!("Failed to create build log {}", log.display()))?;
        }
        if options.quiet {
            reporter = reporter.quiet();
        }

        let bytes = fs::read(&options.description)
            .with_context(|| format!("Failed to read {}", options.description.display()))?;
        let hash = snapshot::document_hash(&bytes);

        let cache_file = cache_path(&options.description);
        let mut cache = load_cache(&cache_file, &mut reporter)?;

        let requests: Vec<(String, String)> = options
            .target_names()
            .into_iter()
            .map(|t| (t, options.platform.clone()))
            .collect();

        let mut from_snapshot = false;
        let plans = match snapshot::load_all(&cache, &hash, &requests).filter(|_| options.reuse_snapshots) {
            Some(stored) => {
                from_snapshot = true;
                reporter.note("build description unchanged, using stored statements");
                requests
                    .into_iter()
                    .zip(stored)
                    .map(|((target, platform), statements)| TargetPlan {
                        target,
                        platform,
                        statements,
                    })
                    .collect()
            }
            None => {
                let text = String::from_utf8(bytes)
                    .with_context(|| format!("{} is not valid UTF-8", options.description.display()))?;
                snapshot::store_hash(&mut cache, &hash);
                self.resolve(&text, &requests, &options.root(), &mut cache, &mut reporter)
            }
        };

        let run = Executor::new(options.root(), &mut cache, &mut reporter)
            .dry_run(options.dry_run)
            .progress(options.progress && !options.quiet)
            .run(&plans);

        if let Err(e) = cache.save(&cache_file) {
            reporter.error(&EngineError::from(e));
        }
        reporter.flush();

        Ok(BuildSummary {
            run,
            errors: reporter.error_count(),
            warnings: reporter.warning_count(),
            from_snapshot,
        })
    }

    /// Parses the description and resolves every requested target. Failures
    /// are reported and leave the target out; successes are snapshotted.
    fn resolve(
        &self,
        text: &str,
        requests: &[(String, String)],
        root: &Path,
        cache: &mut TypedCache,
        reporter: &mut Reporter,
    ) -> Vec<TargetPlan> {
        let desc = match description::parse(text, reporter) {
            Ok(desc) => desc,
            Err(e) => {
                reporter.error(&e);
                return Vec::new();
            }
        };

        // Scripted manglers live for this build only.
        let mut manglers = self.manglers.clone();
        for script in &desc.manglers {
            match manglers.register_script(&script.name, &script.param, &script.script) {
                Ok(true) => reporter.warning(Warning::ManglerReplaced(script.name.clone())),
                Ok(false) => {}
                Err(message) => reporter.error(&EngineError::Description(message)),
            }
        }

        let expander = MacroExpander::new(&desc.config, &manglers, &self.wildcards).with_root(root);
        let mut plans = Vec::new();
        for (target, platform) in requests {
            match expander.resolve_target(target, platform) {
                Ok(statements) => {
                    if let Err(e) = snapshot::store(cache, target, platform, &statements) {
                        tracing::warn!(name = %target, error = %e, "could not store parse snapshot");
                    }
                    plans.push(TargetPlan {
                        target: target.clone(),
                        platform: platform.clone(),
                        statements,
                    });
                }
                Err(e) => reporter.error(&EngineError::from(e)),
            }
        }
        for warning in manglers.take_failures() {
            reporter.warning(warning);
        }
        plans
    }
}

/// Loads the cache side-car. Unreadable files are replaced by an empty
/// cache with a warning; a newer format version is fatal.
fn load_cache(path: &Path, reporter: &mut Reporter) -> Result<TypedCache> {
    match TypedCache::load(path) {
        Ok(cache) => {
            for name in cache.duplicates() {
                reporter.warning(Warning::DuplicateCacheEntry(name.clone()));
            }
            Ok(cache)
        }
        Err(e) if e.is_recoverable() => {
            reporter.warning(Warning::CacheDiscarded {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
            Ok(TypedCache::new())
        }
        Err(e @ CacheError::UnsupportedVersion { .. }) => {
            reporter.error(&EngineError::from(e));
            anyhow::bail!("Refusing to overwrite {}", path.display())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load cache {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_path_appends_suffix() {
        assert_eq!(cache_path(Path::new("proj/omake.toml")), PathBuf::from("proj/omake.toml.cache"));
    }

    #[test]
    fn test_root_of_bare_file_name() {
        let opts = EngineOptions::new("omake.toml", "LINUX");
        assert_eq!(opts.root(), PathBuf::from("."));
        assert_eq!(opts.target_names(), vec!["all".to_string()]);
    }
}
