//! File and directory statements.
//!
//! Every operation checks its conflict condition first (destination exists,
//! source missing) and then applies the statement's [`ConflictMode`]: Plain
//! fails the target, Try skips with a note, Force clears the way.

use crate::error::EngineError;
use crate::statement::{
    ConflictMode, DirAction, DirectoryStatement, FileAction, FileStatement,
};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// A Try-mode conflict; the message is logged as a note.
    Skipped(String),
}

/// What to do after a conflict was detected.
enum Resolution {
    Proceed,
    Stop(Outcome),
}

fn on_conflict(
    mode: ConflictMode,
    operation: &str,
    reason: &str,
    path: &Path,
) -> Result<Resolution, EngineError> {
    match mode {
        ConflictMode::Plain => Err(EngineError::Conflict {
            operation: format!("{}: {}", operation, reason),
            path: path.to_path_buf(),
        }),
        ConflictMode::Try => Ok(Resolution::Stop(Outcome::Skipped(format!(
            "{} skipped, {}: {}",
            operation,
            reason,
            path.display()
        )))),
        ConflictMode::Force => Ok(Resolution::Proceed),
    }
}

/// Conflict check for a missing source. Force cannot conjure a source, so
/// it fails like Plain.
fn require_source(mode: ConflictMode, operation: &str, source: &Path) -> Result<Option<Outcome>, EngineError> {
    if source.exists() {
        return Ok(None);
    }
    let mode = if mode == ConflictMode::Force {
        ConflictMode::Plain
    } else {
        mode
    };
    match on_conflict(mode, operation, "source does not exist", source)? {
        Resolution::Stop(outcome) => Ok(Some(outcome)),
        Resolution::Proceed => Ok(None),
    }
}

fn io_err(operation: &str, path: &Path) -> impl FnOnce(std::io::Error) -> EngineError {
    let context = format!("{} '{}'", operation, path.display());
    move |e| EngineError::io(context, e)
}

fn ensure_parent(path: &Path) -> Result<(), EngineError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err("create directory", parent))?;
    }
    Ok(())
}

fn second_path(root: &Path, path: &Path, arg: Option<&str>, rename: bool, operation: &str) -> Result<PathBuf, EngineError> {
    let arg = arg.ok_or_else(|| {
        EngineError::Description(format!("'{}' on '{}' needs a destination", operation, path.display()))
    })?;
    Ok(if rename {
        path.with_file_name(arg)
    } else {
        root.join(arg)
    })
}

/// Canonical form of a path that may not exist yet: the longest existing
/// ancestor is canonicalised and the rest appended.
fn resolved(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => resolved(parent).join(name),
        _ => path.to_path_buf(),
    }
}

/// Checks a copy, move or rename whose source and destination are the same
/// path, or whose destination lies inside the source directory. Neither can
/// be carried out, and Force must not clear a destination that is the source.
fn check_overlap(
    mode: ConflictMode,
    operation: &str,
    source: &Path,
    dest: &Path,
) -> Result<Option<Outcome>, EngineError> {
    let (source_abs, dest_abs) = (resolved(source), resolved(dest));
    if source_abs == dest_abs {
        let mode = if mode == ConflictMode::Force {
            ConflictMode::Try
        } else {
            mode
        };
        return match on_conflict(mode, operation, "source and destination are the same", dest)? {
            Resolution::Stop(outcome) => Ok(Some(outcome)),
            Resolution::Proceed => Ok(None),
        };
    }
    if source.is_dir() && dest_abs.starts_with(&source_abs) {
        return Err(EngineError::Conflict {
            operation: format!("{}: destination lies inside the source directory", operation),
            path: dest.to_path_buf(),
        });
    }
    Ok(None)
}

fn remove_any(path: &Path) -> Result<(), EngineError> {
    if path.is_dir() {
        fs::remove_dir_all(path).map_err(io_err("remove directory", path))
    } else {
        fs::remove_file(path).map_err(io_err("remove file", path))
    }
}

/// `fs::rename` with a copy fallback for cross-device moves.
fn move_path(from: &Path, to: &Path) -> Result<(), EngineError> {
    ensure_parent(to)?;
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    tracing::debug!(from = %from.display(), to = %to.display(), "rename failed, copying instead");
    if from.is_dir() {
        copy_tree(from, to)?;
        fs::remove_dir_all(from).map_err(io_err("remove directory", from))
    } else {
        fs::copy(from, to).map_err(io_err("copy file", from))?;
        fs::remove_file(from).map_err(io_err("remove file", from))
    }
}

/// Copies `from` into `to` depth-first, creating directories as needed and
/// overwriting files that already exist.
pub fn copy_tree(from: &Path, to: &Path) -> Result<(), EngineError> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            EngineError::io(format!("walk '{}'", path.display()), e.into())
        })?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(io_err("create directory", &dest))?;
        } else {
            fs::copy(entry.path(), &dest).map_err(io_err("copy file", entry.path()))?;
        }
    }
    Ok(())
}

pub fn run_file(statement: &FileStatement, root: &Path) -> Result<Outcome, EngineError> {
    let op = statement.op;
    let name = op.to_string();
    let path = root.join(&statement.path);
    let body = statement.body.as_deref().unwrap_or("");

    match op.action {
        FileAction::Create => {
            if path.exists() {
                match on_conflict(op.mode, &name, "file already exists", &path)? {
                    Resolution::Stop(outcome) => return Ok(outcome),
                    Resolution::Proceed => remove_any(&path)?,
                }
            }
            ensure_parent(&path)?;
            fs::write(&path, body).map_err(io_err("write", &path))?;
        }
        FileAction::Delete => {
            if !path.exists() {
                // Nothing to force on a missing file.
                let mode = if op.mode == ConflictMode::Force {
                    ConflictMode::Try
                } else {
                    op.mode
                };
                if let Resolution::Stop(outcome) = on_conflict(mode, &name, "file does not exist", &path)? {
                    return Ok(outcome);
                }
            }
            fs::remove_file(&path).map_err(io_err("remove file", &path))?;
        }
        FileAction::Copy | FileAction::Move | FileAction::Rename => {
            let rename = op.action == FileAction::Rename;
            let dest = second_path(root, &path, statement.arg.as_deref(), rename, &name)?;
            if let Some(outcome) = require_source(op.mode, &name, &path)? {
                return Ok(outcome);
            }
            if let Some(outcome) = check_overlap(op.mode, &name, &path, &dest)? {
                return Ok(outcome);
            }
            if dest.exists() {
                match on_conflict(op.mode, &name, "destination already exists", &dest)? {
                    Resolution::Stop(outcome) => return Ok(outcome),
                    Resolution::Proceed => remove_any(&dest)?,
                }
            }
            if op.action == FileAction::Copy {
                ensure_parent(&dest)?;
                fs::copy(&path, &dest).map_err(io_err("copy file", &path))?;
            } else {
                move_path(&path, &dest)?;
            }
        }
        FileAction::Append => {
            if !path.exists() {
                match on_conflict(op.mode, &name, "file does not exist", &path)? {
                    Resolution::Stop(outcome) => return Ok(outcome),
                    Resolution::Proceed => ensure_parent(&path)?,
                }
            }
            append(&path, body)?;
        }
        FileAction::CreateOrTruncate => {
            ensure_parent(&path)?;
            fs::write(&path, body).map_err(io_err("write", &path))?;
        }
        FileAction::CreateOrAppend => {
            ensure_parent(&path)?;
            append(&path, body)?;
        }
    }
    Ok(Outcome::Done)
}

fn append(path: &Path, body: &str) -> Result<(), EngineError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err("open", path))?;
    file.write_all(body.as_bytes()).map_err(io_err("append to", path))
}

pub fn run_directory(statement: &DirectoryStatement, root: &Path) -> Result<Outcome, EngineError> {
    let op = statement.op;
    let name = op.to_string();
    let path = root.join(&statement.path);

    match op.action {
        DirAction::Create => {
            if path.exists() {
                match on_conflict(op.mode, &name, "directory already exists", &path)? {
                    Resolution::Stop(outcome) => return Ok(outcome),
                    // Force recreates the directory empty.
                    Resolution::Proceed => remove_any(&path)?,
                }
            }
            fs::create_dir_all(&path).map_err(io_err("create directory", &path))?;
        }
        DirAction::Delete => {
            if !path.exists() {
                let mode = if op.mode == ConflictMode::Force {
                    ConflictMode::Try
                } else {
                    op.mode
                };
                if let Resolution::Stop(outcome) = on_conflict(mode, &name, "directory does not exist", &path)? {
                    return Ok(outcome);
                }
            }
            fs::remove_dir_all(&path).map_err(io_err("remove directory", &path))?;
        }
        DirAction::Copy => {
            let dest = second_path(root, &path, statement.arg.as_deref(), false, &name)?;
            if let Some(outcome) = require_source(op.mode, &name, &path)? {
                return Ok(outcome);
            }
            if let Some(outcome) = check_overlap(op.mode, &name, &path, &dest)? {
                return Ok(outcome);
            }
            // Force merges into an existing destination, overwriting files.
            if dest.exists()
                && let Resolution::Stop(outcome) =
                    on_conflict(op.mode, &name, "destination already exists", &dest)?
            {
                return Ok(outcome);
            }
            copy_tree(&path, &dest)?;
        }
        DirAction::Move | DirAction::Rename => {
            let rename = op.action == DirAction::Rename;
            let dest = second_path(root, &path, statement.arg.as_deref(), rename, &name)?;
            if let Some(outcome) = require_source(op.mode, &name, &path)? {
                return Ok(outcome);
            }
            if let Some(outcome) = check_overlap(op.mode, &name, &path, &dest)? {
                return Ok(outcome);
            }
            if dest.exists() {
                match on_conflict(op.mode, &name, "destination already exists", &dest)? {
                    Resolution::Stop(outcome) => return Ok(outcome),
                    Resolution::Proceed => remove_any(&dest)?,
                }
            }
            move_path(&path, &dest)?;
        }
    }
    Ok(Outcome::Done)
}
