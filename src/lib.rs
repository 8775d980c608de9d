//! # omake - make-style build engine
//!
//! omake reads a TOML build description (`omake.toml`), resolves it for one
//! platform and runs the resulting statements target by target.
//!
//! ## Features
//!
//! - **Layered configuration**: constants, tools and source lists resolved
//!   through target/platform scopes with aliases
//! - **List expansion**: `${prefix&([LIST].mangler)suffix}` macros with
//!   built-in and scripted manglers
//! - **Incremental builds**: tool statements are skipped when none of their
//!   dependencies changed since the last successful run
//! - **Parse snapshots**: an unchanged description is not parsed again
//!
//! ## Quick Start
//!
//! ```bash
//! # Build the default target for the given platform
//! omake build -p LINUX
//!
//! # Show what the cache remembers
//! omake cache list
//! ```
//!
//! ## Module Organization
//!
//! - [`description`] - TOML build description
//! - [`config`] - Scoped configuration store
//! - [`expand`] - Macro expansion and statement resolution
//! - [`exec`] - Statement execution
//! - [`engine`] - Build orchestration

/// Binary typed key/value cache persisted next to the description.
pub mod cache;

/// Platforms, aliases and per-target settings.
pub mod config;

/// Dependency fingerprints and the per-target dependency graph.
pub mod deps;

/// `omake.toml` parsing.
pub mod description;

/// Ties parsing, expansion, execution and the cache together.
pub mod engine;

/// Error types shared across the crate.
pub mod error;

/// Filesystem operations and tool processes.
pub mod exec;

/// Macro expansion.
pub mod expand;

/// Filename manglers.
pub mod mangler;

/// Diagnostics, counters and the build log.
pub mod report;

/// Resolved statements stored across runs.
pub mod snapshot;

/// Statement types.
pub mod statement;

/// Terminal tables.
pub mod ui;

/// Wildcard and regex filename matching.
pub mod wildcard;
