//! Statement model.
//!
//! [`Statement`] is what the description loader produces: raw text with
//! macro references still in it. [`ResolvedStatement`] is what the executor
//! runs, and what the parse snapshot stores.

use crate::deps::DependencySpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictMode {
    /// Conflicts are errors that stop the target.
    Plain,
    /// Conflicts turn the operation into a logged no-op.
    Try,
    /// A pre-existing destination is removed first.
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileAction {
    Create,
    Delete,
    Copy,
    Move,
    Rename,
    Append,
    CreateOrTruncate,
    CreateOrAppend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirAction {
    Create,
    Delete,
    Copy,
    Move,
    Rename,
}

impl FileAction {
    const NAMES: [(&'static str, FileAction); 8] = [
        ("create", FileAction::Create),
        ("delete", FileAction::Delete),
        ("copy", FileAction::Copy),
        ("move", FileAction::Move),
        ("rename", FileAction::Rename),
        ("append", FileAction::Append),
        ("create_or_truncate", FileAction::CreateOrTruncate),
        ("create_or_append", FileAction::CreateOrAppend),
    ];

    /// Whether the operation writes a literal body.
    pub fn has_body(self) -> bool {
        matches!(
            self,
            FileAction::Create
                | FileAction::Append
                | FileAction::CreateOrTruncate
                | FileAction::CreateOrAppend
        )
    }

    /// Whether the operation needs a second path.
    pub fn takes_arg(self) -> bool {
        matches!(self, FileAction::Copy | FileAction::Move | FileAction::Rename)
    }
}

impl DirAction {
    const NAMES: [(&'static str, DirAction); 5] = [
        ("create", DirAction::Create),
        ("delete", DirAction::Delete),
        ("copy", DirAction::Copy),
        ("move", DirAction::Move),
        ("rename", DirAction::Rename),
    ];

    pub fn takes_arg(self) -> bool {
        matches!(self, DirAction::Copy | DirAction::Move | DirAction::Rename)
    }
}

/// Splits `try_copy` / `force_create` / `append` into mode and action name.
fn split_mode(kind: &str) -> (ConflictMode, &str) {
    if let Some(rest) = kind.strip_prefix("try_") {
        (ConflictMode::Try, rest)
    } else if let Some(rest) = kind.strip_prefix("force_") {
        (ConflictMode::Force, rest)
    } else {
        (ConflictMode::Plain, kind)
    }
}

fn mode_prefix(mode: ConflictMode) -> &'static str {
    match mode {
        ConflictMode::Plain => "",
        ConflictMode::Try => "try_",
        ConflictMode::Force => "force_",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOp {
    pub action: FileAction,
    pub mode: ConflictMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirOp {
    pub action: DirAction,
    pub mode: ConflictMode,
}

impl FromStr for FileOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let (mode, name) = split_mode(&lowered);
        let action = FileAction::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, a)| *a)
            .ok_or_else(|| format!("unknown file operation '{}'", s))?;
        // The truncate/append-or-create forms already define what happens
        // on every condition.
        if matches!(action, FileAction::CreateOrTruncate | FileAction::CreateOrAppend)
            && mode != ConflictMode::Plain
        {
            return Err(format!("'{}' does not take a try_/force_ prefix", name));
        }
        Ok(FileOp { action, mode })
    }
}

impl FromStr for DirOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let (mode, name) = split_mode(&lowered);
        DirAction::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, action)| DirOp {
                action: *action,
                mode,
            })
            .ok_or_else(|| format!("unknown directory operation '{}'", s))
    }
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = FileAction::NAMES
            .iter()
            .find(|(_, a)| *a == self.action)
            .map_or("?", |(n, _)| n);
        write!(f, "{}{}", mode_prefix(self.mode), name)
    }
}

impl fmt::Display for DirOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = DirAction::NAMES
            .iter()
            .find(|(_, a)| *a == self.action)
            .map_or("?", |(n, _)| n);
        write!(f, "{}{}_dir", mode_prefix(self.mode), name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatement {
    pub op: FileOp,
    pub path: String,
    pub arg: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryStatement {
    pub op: DirOp,
    pub path: String,
    pub arg: Option<String>,
}

/// A dependency as written in the description, before it is bound to a
/// (target, platform) scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyRef {
    File(String),
    Directory(String),
    /// A named dependency list.
    List(String),
    /// Every entry of a named source list, with the entry's own dependencies.
    Inputs(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardStatement {
    /// `tool arguments...`; the first whitespace-separated token names a tool.
    pub text: String,
    pub dependencies: Vec<DependencyRef>,
}

impl StandardStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on(mut self, dep: DependencyRef) -> Self {
        self.dependencies.push(dep);
        self
    }

    /// `(tool token, argument text)`, split at the first whitespace.
    pub fn split_tool(text: &str) -> (&str, &str) {
        let text = text.trim_start();
        match text.find(char::is_whitespace) {
            Some(i) => (&text[..i], text[i..].trim_start()),
            None => (text, ""),
        }
    }
}

/// Entry predicate for conditional mangling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    Filename(String),
    Wildcard(String),
    Regex(String),
}

impl FromStr for Selector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Selector::All);
        }
        let (head, rest) = s.split_once('(').ok_or_else(|| s.to_string())?;
        let inner = rest.strip_suffix(')').ok_or_else(|| s.to_string())?;
        match head.trim().to_ascii_lowercase().as_str() {
            "filename" => Ok(Selector::Filename(inner.to_string())),
            "wildcard" => Ok(Selector::Wildcard(inner.to_string())),
            "regex" => Ok(Selector::Regex(inner.to_string())),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManglingRule {
    /// May contain `$(filename.mangler...)` references.
    pub text: String,
    pub when: Selector,
}

/// A `common` step: one tool invocation per entry of a source list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonTool {
    /// `tool [fixed arguments]`.
    pub tool: String,
    pub list: String,
    pub prefix: Vec<ManglingRule>,
    pub filename: Vec<ManglingRule>,
    pub suffix: Vec<ManglingRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Standard(StandardStatement),
    File(FileStatement),
    Directory(DirectoryStatement),
    Common(CommonTool),
}

/// A tool resolved to a path, with its arguments still as one string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: PathBuf,
    pub arguments: String,
    pub dependencies: Vec<DependencySpec>,
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.tool.display(), self.arguments)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedStatement {
    Tool(ToolInvocation),
    File(FileStatement),
    Directory(DirectoryStatement),
}

impl fmt::Display for ResolvedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedStatement::Tool(t) => write!(f, "{}", t),
            ResolvedStatement::File(s) => {
                write!(f, "{} {}", s.op, s.path)?;
                if let Some(arg) = &s.arg {
                    write!(f, " -> {}", arg)?;
                }
                Ok(())
            }
            ResolvedStatement::Directory(s) => {
                write!(f, "{} {}", s.op, s.path)?;
                if let Some(arg) = &s.arg {
                    write!(f, " -> {}", arg)?;
                }
                Ok(())
            }
        }
    }
}
