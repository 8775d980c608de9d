//! Statement execution.
//!
//! Targets run in the order given, statements in declaration order, one at
//! a time. The reporter's error counter is checked before every target:
//! once anything has failed, the remaining targets are abandoned.

pub mod fsops;
pub mod process;

use crate::cache::TypedCache;
use crate::deps::{DepId, DependencyGraph};
use crate::error::EngineError;
use crate::report::Reporter;
use crate::statement::ResolvedStatement;
use colored::*;
use fsops::Outcome;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// The resolved statements of one (target, platform) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPlan {
    pub target: String,
    pub platform: String,
    pub statements: Vec<ResolvedStatement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub targets_completed: usize,
    pub targets_failed: usize,
    /// Targets never started because an earlier error was reported.
    pub targets_abandoned: usize,
}

#[derive(Debug, Default)]
struct TargetStats {
    executed: usize,
    up_to_date: usize,
    skipped: usize,
}

pub struct Executor<'a> {
    root: PathBuf,
    cache: &'a mut TypedCache,
    reporter: &'a mut Reporter,
    dry_run: bool,
    progress: bool,
}

impl<'a> Executor<'a> {
    pub fn new(root: impl Into<PathBuf>, cache: &'a mut TypedCache, reporter: &'a mut Reporter) -> Self {
        Self {
            root: root.into(),
            cache,
            reporter,
            dry_run: false,
            progress: console::Term::stdout().is_term(),
        }
    }

    /// Print what would run without touching the filesystem or the cache.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&mut self, plans: &[TargetPlan]) -> RunSummary {
        let mut summary = RunSummary::default();
        for (i, plan) in plans.iter().enumerate() {
            if self.reporter.has_errors() {
                self.reporter.error(&EngineError::Aborted);
                summary.targets_abandoned = plans.len() - i;
                break;
            }
            tracing::info!(name = %plan.target, platform = %plan.platform, "building target");
            match self.run_target(plan) {
                Ok(stats) => {
                    summary.executed += stats.executed;
                    summary.up_to_date += stats.up_to_date;
                    summary.skipped += stats.skipped;
                    summary.targets_completed += 1;
                }
                Err(e) => {
                    self.reporter.error(&e);
                    summary.targets_failed += 1;
                }
            }
        }
        summary
    }

    fn progress_bar(&self, plan: &TargetPlan) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(plan.statements.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(format!("{} ({})", plan.target, plan.platform));
        pb
    }

    fn run_target(&mut self, plan: &TargetPlan) -> Result<TargetStats, EngineError> {
        let pb = self.progress_bar(plan);
        self.reporter.attach_progress(pb.clone());
        let result = self.run_statements(plan, &pb);
        if let Some(pb) = self.reporter.detach_progress() {
            pb.finish_and_clear();
        }
        result
    }

    fn run_statements(&mut self, plan: &TargetPlan, pb: &ProgressBar) -> Result<TargetStats, EngineError> {
        let mut graph = DependencyGraph::new(&self.root);
        let mut to_commit: Vec<DepId> = Vec::new();
        let mut stats = TargetStats::default();

        for statement in &plan.statements {
            match statement {
                ResolvedStatement::Tool(invocation) => {
                    let ids: Vec<DepId> = invocation
                        .dependencies
                        .iter()
                        .map(|dep| graph.add(dep))
                        .collect();
                    if !graph.any_modified(&ids, &*self.cache) {
                        self.reporter.note(&format!(
                            "{} {}",
                            "up to date:".dimmed(),
                            invocation.tool.display()
                        ));
                        stats.up_to_date += 1;
                    } else if self.dry_run {
                        self.reporter
                            .line(&format!("{} {}", invocation.tool.display(), invocation.arguments));
                        stats.executed += 1;
                    } else {
                        process::run_tool(invocation, &self.root, self.reporter)?;
                        to_commit.extend(ids);
                        stats.executed += 1;
                    }
                }
                ResolvedStatement::File(file) => {
                    let outcome = if self.dry_run {
                        self.reporter.line(&statement.to_string());
                        Outcome::Done
                    } else {
                        fsops::run_file(file, &self.root)?
                    };
                    self.record(outcome, &mut stats);
                }
                ResolvedStatement::Directory(dir) => {
                    let outcome = if self.dry_run {
                        self.reporter.line(&statement.to_string());
                        Outcome::Done
                    } else {
                        fsops::run_directory(dir, &self.root)?
                    };
                    self.record(outcome, &mut stats);
                }
            }
            pb.inc(1);
        }

        for id in to_commit {
            graph.commit(id, self.cache);
        }
        Ok(stats)
    }

    fn record(&mut self, outcome: Outcome, stats: &mut TargetStats) {
        match outcome {
            Outcome::Done => stats.executed += 1,
            Outcome::Skipped(message) => {
                self.reporter.note(&message);
                stats.skipped += 1;
            }
        }
    }
}
