//! Diagnostic reporting.
//!
//! The reporter is the single place that formats user-facing text. It keeps
//! the error/warning counters the executor consults before every target and
//! mirrors everything it prints into the build log.

use crate::error::EngineError;
use colored::*;
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Non-fatal conditions surfaced while loading or running a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    DuplicatePlatform(String),
    AliasShadowsPlatform(String),
    AliasToUnknownPlatform { alias: String, platform: String },
    ManglerReplaced(String),
    CacheDiscarded { path: PathBuf, reason: String },
    DuplicateCacheEntry(String),
    ScriptFailed { mangler: String, message: String },
}

impl Warning {
    pub fn code(&self) -> u32 {
        match self {
            Warning::DuplicatePlatform(_) => 5,
            Warning::AliasShadowsPlatform(_) => 6,
            Warning::AliasToUnknownPlatform { .. } => 2,
            Warning::ManglerReplaced(_) => 52,
            Warning::CacheDiscarded { .. } => 89,
            Warning::DuplicateCacheEntry(_) => 88,
            Warning::ScriptFailed { .. } => 47,
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::DuplicatePlatform(p) => write!(f, "platform '{}' is declared twice", p),
            Warning::AliasShadowsPlatform(a) => {
                write!(f, "alias '{}' has the name of a platform and is never used", a)
            }
            Warning::AliasToUnknownPlatform { alias, platform } => write!(
                f,
                "alias '{}' refers to '{}', which is not a declared platform",
                alias, platform
            ),
            Warning::ManglerReplaced(m) => write!(f, "mangler '{}' was redefined", m),
            Warning::CacheDiscarded { path, reason } => write!(
                f,
                "ignoring cache '{}': {}",
                path.display(),
                reason
            ),
            Warning::DuplicateCacheEntry(n) => {
                write!(f, "cache entry '{}' appears more than once, keeping the last", n)
            }
            Warning::ScriptFailed { mangler, message } => {
                write!(f, "mangler '{}' failed: {}", mangler, message)
            }
        }
    }
}

pub struct Reporter {
    source: String,
    errors: u64,
    warnings: u64,
    quiet: bool,
    log: Option<BufWriter<File>>,
    progress: Option<ProgressBar>,
}

impl Reporter {
    /// `source` prefixes every diagnostic, normally the build description path.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            errors: 0,
            warnings: 0,
            quiet: false,
            log: None,
            progress: None,
        }
    }

    /// Mirror all output into a freshly truncated log file.
    pub fn with_log(mut self, path: &Path) -> io::Result<Self> {
        self.log = Some(BufWriter::new(File::create(path)?));
        Ok(self)
    }

    /// Suppress console output; the log and the counters still work.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn error_count(&self) -> u64 {
        self.errors
    }

    pub fn warning_count(&self) -> u64 {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error(&mut self, err: &EngineError) {
        self.errors += 1;
        let plain = format!("{} error OM{}: {}", self.source, err.code(), err);
        let colored = format!(
            "{} {} {}: {}",
            "x".red(),
            self.source.dimmed(),
            format!("OM{}", err.code()).red().bold(),
            err
        );
        self.emit(&colored, &plain);
    }

    pub fn warning(&mut self, warning: Warning) {
        self.warnings += 1;
        let plain = format!(
            "{} warning OM{}: {}",
            self.source,
            warning.code(),
            warning
        );
        let colored = format!(
            "{} {} {}: {}",
            "!".yellow(),
            self.source.dimmed(),
            format!("OM{}", warning.code()).yellow(),
            warning
        );
        self.emit(&colored, &plain);
    }

    /// Informational line, e.g. a skipped statement or a Try-mode no-op.
    pub fn note(&mut self, message: &str) {
        let colored = format!("   {} {}", "•".blue(), message);
        self.emit(&colored, message);
    }

    /// A launched command line or a single line of captured tool output.
    pub fn line(&mut self, text: &str) {
        self.emit(text, text);
    }

    pub(crate) fn attach_progress(&mut self, pb: ProgressBar) {
        self.progress = Some(pb);
    }

    pub(crate) fn detach_progress(&mut self) -> Option<ProgressBar> {
        self.progress.take()
    }

    pub fn flush(&mut self) {
        if let Some(log) = self.log.as_mut()
            && let Err(e) = log.flush()
        {
            tracing::warn!(error = %e, "failed to flush build log");
        }
    }

    fn emit(&mut self, console: &str, plain: &str) {
        if !self.quiet {
            match &self.progress {
                Some(pb) if !pb.is_hidden() => pb.println(console),
                _ => println!("{}", console),
            }
        }
        if let Some(log) = self.log.as_mut()
            && let Err(e) = writeln!(log, "{}", plain)
        {
            tracing::warn!(error = %e, "failed to write build log");
            self.log = None;
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.flush();
    }
}
