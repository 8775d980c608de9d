//! Error taxonomy for the build engine.
//!
//! Every failure the engine can surface is one of the enums below. The
//! [`Reporter`](crate::report::Reporter) turns them into numbered `OMxx`
//! diagnostics and bumps the process-wide error counter.

use std::path::PathBuf;
use thiserror::Error;

/// What kind of named entry a configuration lookup was searching for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Constant,
    Tool,
    SourceList,
    DependencyList,
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyKind::Constant => write!(f, "constant"),
            KeyKind::Tool => write!(f, "tool"),
            KeyKind::SourceList => write!(f, "source list"),
            KeyKind::DependencyList => write!(f, "dependency list"),
        }
    }
}

/// Configuration resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("target '{0}' does not exist")]
    UnknownTarget(String),

    #[error("unable to resolve platform '{platform}' (target '{target}')")]
    UnresolvedPlatform { platform: String, target: String },

    #[error("alias '{alias}' points at undeclared platform '{platform}'")]
    UnresolvedAlias { alias: String, platform: String },

    #[error("{kind} '{name}' is not defined for platform '{platform}' in target '{target}'")]
    MissingKey {
        kind: KeyKind,
        name: String,
        platform: String,
        target: String,
    },
}

/// Macro expansion failures. Always fatal to the statement being expanded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("unknown mangler '{0}'")]
    UnknownMangler(String),

    #[error("malformed list expansion '{0}'")]
    MalformedList(String),

    #[error("unknown builtin '$({0})', only '$(filename...)' is supported")]
    UnknownBuiltin(String),

    #[error("invalid selector '{0}', expected all, filename(..), wildcard(..) or regex(..)")]
    InvalidSelector(String),

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("expansion did not settle after {0} passes (self-referential constant?)")]
    RecursionLimit(usize),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Cache file failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("'{0}' is not an omake cache file (bad magic)")]
    BadMagic(PathBuf),

    #[error("cache format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("cache file is truncated or corrupt: {0}")]
    Corrupt(String),

    #[error("no cache entry named '{0}'")]
    NotFound(String),

    #[error("cache entry '{name}' holds {found}, not {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Whether the engine may carry on as though no cache existed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CacheError::BadMagic(_) | CacheError::Corrupt(_))
    }
}

/// Everything the engine reports.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Macro(#[from] MacroError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("{operation}: {}", path.display())]
    Conflict { operation: String, path: PathBuf },

    #[error("'{tool}' exited with code {code:?}")]
    Tool { tool: String, code: Option<i32> },

    #[error("failed to launch '{tool}': {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid build description: {0}")]
    Description(String),

    #[error("errors were reported, aborting remaining targets")]
    Aborted,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable diagnostic number printed as `OMxx`.
    pub fn code(&self) -> u32 {
        match self {
            EngineError::Config(e) => config_code(e),
            EngineError::Macro(MacroError::Config(e)) => config_code(e),
            EngineError::Macro(MacroError::UnknownMangler(_)) => 40,
            EngineError::Macro(MacroError::UnknownBuiltin(_)) => 41,
            EngineError::Macro(MacroError::MalformedList(_)) => 42,
            EngineError::Macro(MacroError::InvalidSelector(_)) => 29,
            EngineError::Macro(MacroError::InvalidPattern { .. }) => 33,
            EngineError::Macro(MacroError::RecursionLimit(_)) => 43,
            EngineError::Cache(CacheError::UnsupportedVersion { .. }) => 90,
            EngineError::Cache(_) => 91,
            EngineError::Conflict { .. } => 60,
            EngineError::Tool { .. } => 53,
            EngineError::Launch { .. } => 52,
            EngineError::Description(_) => 16,
            EngineError::Aborted => 54,
            EngineError::Io { .. } => 61,
        }
    }
}

fn config_code(e: &ConfigError) -> u32 {
    match e {
        ConfigError::UnknownTarget(_) => 57,
        ConfigError::UnresolvedPlatform { .. } => 9,
        ConfigError::UnresolvedAlias { .. } => 2,
        ConfigError::MissingKey {
            kind: KeyKind::Tool,
            ..
        } => 56,
        ConfigError::MissingKey { .. } => 55,
    }
}
