//! TOML build descriptions.
//!
//! ```toml
//! platforms = ["LINUX", "WIN32"]
//! [aliases]
//! linux = "LINUX"
//! [constants]
//! OUT = "build"
//! [tools]
//! cc = "/usr/bin/cc"
//! [sources]
//! SRC = ["main.c", { file = "win.c", platform = "WIN32", depends = ["win.h"] }]
//! [platform.WIN32.tools]
//! cc = "C:/mingw/bin/gcc.exe"
//!
//! [[target.all.step]]
//! run = "cc -o ${OUT}/app ${&([SRC])}"
//! inputs = ["SRC"]
//! ```
//!
//! Every target table accepts the same scope keys as the top level plus an
//! ordered `step` array.

use crate::config::{Configuration, PlatformConfig, SourceEntry};
use crate::error::EngineError;
use crate::report::{Reporter, Warning};
use crate::statement::{
    CommonTool, DependencyRef, DirOp, DirectoryStatement, FileOp, FileStatement, ManglingRule,
    Selector, StandardStatement, Statement,
};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsDoc {
    #[serde(default)]
    constants: BTreeMap<String, String>,
    #[serde(default)]
    tools: BTreeMap<String, String>,
    #[serde(default)]
    sources: BTreeMap<String, Vec<SourceDoc>>,
    #[serde(default)]
    dependency_lists: BTreeMap<String, Vec<String>>,
}

/// One scope: the document root or a `[target.X]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScopeDoc {
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    #[serde(default)]
    constants: BTreeMap<String, String>,
    #[serde(default)]
    tools: BTreeMap<String, String>,
    #[serde(default)]
    sources: BTreeMap<String, Vec<SourceDoc>>,
    #[serde(default)]
    dependency_lists: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    platform: BTreeMap<String, SettingsDoc>,
    #[serde(default)]
    manglers: BTreeMap<String, ManglerDoc>,
    #[serde(default)]
    target: BTreeMap<String, ScopeDoc>,
    #[serde(default)]
    step: Vec<StepDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceDoc {
    File(String),
    Entry {
        file: String,
        #[serde(default)]
        platform: Option<String>,
        #[serde(default)]
        depends: Vec<String>,
        #[serde(default)]
        depends_dirs: Vec<String>,
    },
}

impl From<SourceDoc> for SourceEntry {
    fn from(doc: SourceDoc) -> Self {
        match doc {
            SourceDoc::File(file) => SourceEntry::new(file),
            SourceDoc::Entry {
                file,
                platform,
                depends,
                depends_dirs,
            } => SourceEntry {
                file,
                platform,
                depends,
                depends_dirs,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManglerDoc {
    #[serde(default = "default_param")]
    param: String,
    script: String,
}

fn default_param() -> String {
    "name".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepDoc {
    run: Option<String>,
    file: Option<String>,
    dir: Option<String>,
    common: Option<CommonDoc>,
    path: Option<String>,
    arg: Option<String>,
    body: Option<String>,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    depends_dirs: Vec<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommonDoc {
    tool: String,
    list: String,
    #[serde(default)]
    prefix: Vec<RuleDoc>,
    #[serde(default)]
    filename: Vec<RuleDoc>,
    #[serde(default)]
    suffix: Vec<RuleDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDoc {
    text: String,
    #[serde(default = "default_selector")]
    when: String,
}

fn default_selector() -> String {
    "all".to_string()
}

/// A mangler script declared in the description, compiled by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptMangler {
    pub name: String,
    pub param: String,
    pub script: String,
}

#[derive(Debug)]
pub struct Description {
    pub config: Configuration,
    pub manglers: Vec<ScriptMangler>,
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::Description(message.into())
}

/// Parses a description. Structural problems are errors; duplicate platforms
/// and dangling aliases are reported as warnings.
pub fn parse(text: &str, reporter: &mut Reporter) -> Result<Description, EngineError> {
    let doc: ScopeDoc = toml::from_str(text).map_err(|e| invalid(e.to_string()))?;
    if !doc.step.is_empty() {
        return Err(invalid("steps must belong to a target, e.g. [[target.all.step]]"));
    }

    let mut config = Configuration::new();
    let manglers = doc
        .manglers
        .iter()
        .map(|(name, m)| ScriptMangler {
            name: name.clone(),
            param: m.param.clone(),
            script: m.script.clone(),
        })
        .collect();

    let ScopeDoc {
        platforms,
        aliases,
        constants,
        tools,
        sources,
        dependency_lists,
        platform,
        target: targets,
        ..
    } = doc;
    let global = ScopeDoc {
        platforms,
        aliases,
        constants,
        tools,
        sources,
        dependency_lists,
        platform,
        ..Default::default()
    };
    load_scope(&mut config, None, global, reporter)?;

    for (name, mut scope) in targets {
        if !scope.target.is_empty() || !scope.manglers.is_empty() {
            return Err(invalid(format!(
                "target '{}' may not declare nested targets or manglers",
                name
            )));
        }
        config.target_mut(&name);
        let steps = std::mem::take(&mut scope.step);
        load_steps(&mut config, &name, steps)?;
        load_scope(&mut config, Some(&name), scope, reporter)?;
    }
    Ok(Description { config, manglers })
}

fn load_scope(
    config: &mut Configuration,
    target: Option<&str>,
    scope: ScopeDoc,
    reporter: &mut Reporter,
) -> Result<(), EngineError> {
    for platform in &scope.platforms {
        if !config.declare_platform(target, platform) {
            reporter.warning(Warning::DuplicatePlatform(platform.clone()));
        }
    }
    for (alias, platform) in &scope.aliases {
        let declared_here = scope.platforms.contains(platform);
        if !declared_here && !config.global.platforms.contains(platform) {
            reporter.warning(Warning::AliasToUnknownPlatform {
                alias: alias.clone(),
                platform: platform.clone(),
            });
        }
        if scope.platforms.contains(alias) {
            reporter.warning(Warning::AliasShadowsPlatform(alias.clone()));
        }
        config.declare_alias(target, alias, platform);
    }

    fill(
        config.settings_mut(target, None),
        SettingsDoc {
            constants: scope.constants,
            tools: scope.tools,
            sources: scope.sources,
            dependency_lists: scope.dependency_lists,
        },
    );
    for (platform, settings) in scope.platform {
        let canonical = config.resolve_platform_name(&platform, target).map_err(|_| {
            invalid(format!(
                "[platform.{}] overrides a platform that is not declared",
                platform
            ))
        })?;
        fill(config.settings_mut(target, Some(&canonical)), settings);
    }
    Ok(())
}

fn fill(settings: &mut PlatformConfig, doc: SettingsDoc) {
    settings.constants.extend(doc.constants);
    settings.tools.extend(doc.tools);
    settings.sources.extend(
        doc.sources
            .into_iter()
            .map(|(name, entries)| (name, entries.into_iter().map(SourceEntry::from).collect())),
    );
    settings.dependency_lists.extend(doc.dependency_lists);
}

fn load_steps(config: &mut Configuration, target: &str, steps: Vec<StepDoc>) -> Result<(), EngineError> {
    for (i, step) in steps.into_iter().enumerate() {
        let statement = step_to_statement(step)
            .map_err(|msg| invalid(format!("target '{}', step {}: {}", target, i + 1, msg)))?;
        config.push_statement(target, statement);
    }
    Ok(())
}

fn step_to_statement(step: StepDoc) -> Result<Statement, String> {
    let forms = [
        step.run.is_some(),
        step.file.is_some(),
        step.dir.is_some(),
        step.common.is_some(),
    ];
    if forms.iter().filter(|f| **f).count() != 1 {
        return Err("a step needs exactly one of run, file, dir or common".into());
    }
    let has_deps = !(step.depends.is_empty()
        && step.depends_dirs.is_empty()
        && step.depends_on.is_empty()
        && step.inputs.is_empty());

    if let Some(text) = step.run {
        if text.trim().is_empty() {
            return Err("empty run command".into());
        }
        let mut standard = StandardStatement::new(text);
        standard.dependencies.extend(step.depends.into_iter().map(DependencyRef::File));
        standard
            .dependencies
            .extend(step.depends_dirs.into_iter().map(DependencyRef::Directory));
        standard.dependencies.extend(step.depends_on.into_iter().map(DependencyRef::List));
        standard.dependencies.extend(step.inputs.into_iter().map(DependencyRef::Inputs));
        return Ok(Statement::Standard(standard));
    }
    if has_deps {
        return Err("dependencies are only allowed on run steps".into());
    }

    if let Some(common) = step.common {
        return Ok(Statement::Common(CommonTool {
            tool: common.tool,
            list: common.list,
            prefix: rules(common.prefix)?,
            filename: rules(common.filename)?,
            suffix: rules(common.suffix)?,
        }));
    }

    let path = step.path.ok_or("missing path")?;
    if let Some(kind) = step.file {
        let op: FileOp = kind.parse()?;
        if op.action.takes_arg() && step.arg.is_none() {
            return Err(format!("'{}' needs an arg", op));
        }
        if step.body.is_some() && !op.action.has_body() {
            return Err(format!("'{}' does not take a body", op));
        }
        return Ok(Statement::File(FileStatement {
            op,
            path,
            arg: step.arg,
            body: step.body,
        }));
    }
    if let Some(kind) = step.dir {
        let op: DirOp = kind.parse()?;
        if op.action.takes_arg() && step.arg.is_none() {
            return Err(format!("'{}' needs an arg", op));
        }
        if step.body.is_some() {
            return Err("directory steps do not take a body".into());
        }
        return Ok(Statement::Directory(DirectoryStatement {
            op,
            path,
            arg: step.arg,
        }));
    }
    Err("unreachable step form".into())
}

fn rules(docs: Vec<RuleDoc>) -> Result<Vec<ManglingRule>, String> {
    docs.into_iter()
        .map(|doc| -> Result<ManglingRule, String> {
            let when: Selector = doc
                .when
                .parse()
                .map_err(|s| format!("invalid selector '{}'", s))?;
            Ok(ManglingRule {
                text: doc.text,
                when,
            })
        })
        .collect()
}
