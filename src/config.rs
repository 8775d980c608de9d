//! Hierarchical build configuration.
//!
//! Platforms, aliases, constants, tools, source lists and dependency lists
//! live at two levels: the global scope and one scope per target. Each scope
//! additionally carries per-platform overrides. Every lookup walks the same
//! four levels, most specific first:
//!
//! 1. target + platform
//! 2. target
//! 3. global + platform
//! 4. global

use crate::error::{ConfigError, KeyKind};
use crate::statement::Statement;
use std::collections::BTreeMap;

/// The target that always exists.
pub const DEFAULT_TARGET: &str = "all";

/// One file of a source list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceEntry {
    pub file: String,
    /// When set, the entry only takes part in builds for this platform.
    pub platform: Option<String>,
    pub depends: Vec<String>,
    pub depends_dirs: Vec<String>,
}

impl SourceEntry {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }
}

pub type SourceList = Vec<SourceEntry>;

/// Named settings, either scope-wide or for a single platform.
#[derive(Debug, Clone, Default)]
pub struct PlatformConfig {
    pub constants: BTreeMap<String, String>,
    pub tools: BTreeMap<String, String>,
    pub sources: BTreeMap<String, SourceList>,
    pub dependency_lists: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub platforms: Vec<String>,
    pub aliases: BTreeMap<String, String>,
    pub per_platform: BTreeMap<String, PlatformConfig>,
    pub settings: PlatformConfig,
}

impl Scope {
    fn declares(&self, platform: &str) -> bool {
        self.platforms.iter().any(|p| p == platform)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetConfig {
    pub scope: Scope,
    /// Execution order is declaration order.
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub global: Scope,
    pub targets: BTreeMap<String, TargetConfig>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    pub fn new() -> Self {
        let mut targets = BTreeMap::new();
        targets.insert(DEFAULT_TARGET.to_string(), TargetConfig::default());
        Self {
            global: Scope::default(),
            targets,
        }
    }

    /// Returns the target, creating it on first reference.
    pub fn target_mut(&mut self, name: &str) -> &mut TargetConfig {
        self.targets.entry(name.to_string()).or_default()
    }

    pub fn target(&self, name: &str) -> Result<&TargetConfig, ConfigError> {
        self.targets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))
    }

    pub fn scope_mut(&mut self, target: Option<&str>) -> &mut Scope {
        match target {
            Some(t) => &mut self.target_mut(t).scope,
            None => &mut self.global,
        }
    }

    /// Declares a platform. Returns `false` if it was already declared in
    /// that scope. The platform's override table is created either way.
    pub fn declare_platform(&mut self, target: Option<&str>, name: &str) -> bool {
        let scope = self.scope_mut(target);
        scope.per_platform.entry(name.to_string()).or_default();
        if scope.declares(name) {
            return false;
        }
        scope.platforms.push(name.to_string());
        true
    }

    /// Returns `false` if the alias already existed; the first one is kept.
    pub fn declare_alias(&mut self, target: Option<&str>, alias: &str, platform: &str) -> bool {
        let scope = self.scope_mut(target);
        if scope.aliases.contains_key(alias) {
            return false;
        }
        scope.aliases.insert(alias.to_string(), platform.to_string());
        true
    }

    /// The settings table for `(target, platform)`; `None` means the
    /// scope-wide table.
    pub fn settings_mut(&mut self, target: Option<&str>, platform: Option<&str>) -> &mut PlatformConfig {
        let scope = self.scope_mut(target);
        match platform {
            Some(p) => scope.per_platform.entry(p.to_string()).or_default(),
            None => &mut scope.settings,
        }
    }

    pub fn push_statement(&mut self, target: &str, statement: Statement) {
        self.target_mut(target).statements.push(statement);
    }

    /// Maps a platform name or alias to its canonical name. Target scope is
    /// consulted before global scope.
    pub fn resolve_platform_name(&self, platform: &str, target: Option<&str>) -> Result<String, ConfigError> {
        let target_scope = match target {
            Some(t) => Some(&self.target(t)?.scope),
            None => None,
        };
        let is_declared = |name: &str| {
            target_scope.is_some_and(|s| s.declares(name)) || self.global.declares(name)
        };

        if let Some(scope) = target_scope {
            if scope.declares(platform) {
                return Ok(platform.to_string());
            }
            if let Some(canonical) = scope.aliases.get(platform) {
                return check_alias(platform, canonical, is_declared(canonical));
            }
        }
        if self.global.declares(platform) {
            return Ok(platform.to_string());
        }
        if let Some(canonical) = self.global.aliases.get(platform) {
            return check_alias(platform, canonical, is_declared(canonical));
        }
        Err(ConfigError::UnresolvedPlatform {
            platform: platform.to_string(),
            target: target.unwrap_or("<global>").to_string(),
        })
    }

    pub fn is_valid_platform(&self, platform: &str, target: Option<&str>) -> bool {
        self.resolve_platform_name(platform, target).is_ok()
    }

    pub fn resolve_constant(&self, platform: &str, target: &str, name: &str) -> Result<&str, ConfigError> {
        self.lookup(platform, target, name, KeyKind::Constant, |c| &c.constants)
            .map(String::as_str)
    }

    pub fn resolve_tool(&self, platform: &str, target: &str, name: &str) -> Result<&str, ConfigError> {
        self.lookup(platform, target, name, KeyKind::Tool, |c| &c.tools)
            .map(String::as_str)
    }

    pub fn resolve_source_list(&self, platform: &str, target: &str, name: &str) -> Result<&[SourceEntry], ConfigError> {
        self.lookup(platform, target, name, KeyKind::SourceList, |c| &c.sources)
            .map(Vec::as_slice)
    }

    pub fn resolve_dependency_list(&self, platform: &str, target: &str, name: &str) -> Result<&[String], ConfigError> {
        self.lookup(platform, target, name, KeyKind::DependencyList, |c| {
            &c.dependency_lists
        })
        .map(Vec::as_slice)
    }

    fn lookup<'a, T>(
        &'a self,
        platform: &str,
        target: &str,
        name: &str,
        kind: KeyKind,
        table: impl Fn(&'a PlatformConfig) -> &'a BTreeMap<String, T>,
    ) -> Result<&'a T, ConfigError> {
        let canonical = self.resolve_platform_name(platform, Some(target))?;
        let target_scope = &self.target(target)?.scope;

        let levels = [
            target_scope.per_platform.get(&canonical),
            Some(&target_scope.settings),
            self.global.per_platform.get(&canonical),
            Some(&self.global.settings),
        ];
        levels
            .into_iter()
            .flatten()
            .find_map(|config| table(config).get(name))
            .ok_or_else(|| ConfigError::MissingKey {
                kind,
                name: name.to_string(),
                platform: canonical.clone(),
                target: target.to_string(),
            })
    }
}

fn check_alias(alias: &str, canonical: &str, declared: bool) -> Result<String, ConfigError> {
    if declared {
        Ok(canonical.to_string())
    } else {
        Err(ConfigError::UnresolvedAlias {
            alias: alias.to_string(),
            platform: canonical.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layered() -> Configuration {
        let mut config = Configuration::new();
        config.declare_platform(None, "LINUX");
        config.declare_alias(None, "linux", "LINUX");
        config.target_mut("lib");

        config
            .settings_mut(None, None)
            .sources
            .insert("SRC".into(), vec![SourceEntry::new("global.c")]);
        config
            .settings_mut(None, Some("LINUX"))
            .sources
            .insert("SRC".into(), vec![SourceEntry::new("global_linux.c")]);
        config
            .settings_mut(Some("lib"), None)
            .sources
            .insert("SRC".into(), vec![SourceEntry::new("lib.c")]);
        config
            .settings_mut(Some("lib"), Some("LINUX"))
            .sources
            .insert("SRC".into(), vec![SourceEntry::new("lib_linux.c")]);
        config
    }

    fn first_file(config: &Configuration) -> String {
        config.resolve_source_list("linux", "lib", "SRC").unwrap()[0]
            .file
            .clone()
    }

    #[test]
    fn test_source_list_precedence_falls_through_each_level() {
        let mut config = layered();
        assert_eq!(first_file(&config), "lib_linux.c");

        config.settings_mut(Some("lib"), Some("LINUX")).sources.clear();
        assert_eq!(first_file(&config), "lib.c");

        config.settings_mut(Some("lib"), None).sources.clear();
        assert_eq!(first_file(&config), "global_linux.c");

        config.settings_mut(None, Some("LINUX")).sources.clear();
        assert_eq!(first_file(&config), "global.c");

        config.settings_mut(None, None).sources.clear();
        assert!(matches!(
            config.resolve_source_list("LINUX", "lib", "SRC"),
            Err(ConfigError::MissingKey {
                kind: KeyKind::SourceList,
                ..
            })
        ));
    }

    #[test]
    fn test_target_constant_beats_global() {
        let mut config = layered();
        config
            .settings_mut(None, None)
            .constants
            .insert("OPT".into(), "-O0".into());
        config
            .settings_mut(None, Some("LINUX"))
            .constants
            .insert("OPT".into(), "-O1".into());
        config
            .settings_mut(Some("lib"), None)
            .constants
            .insert("OPT".into(), "-O3".into());

        assert_eq!(config.resolve_constant("LINUX", "lib", "OPT").unwrap(), "-O3");
        assert_eq!(config.resolve_constant("LINUX", "all", "OPT").unwrap(), "-O1");
    }

    #[test]
    fn test_tool_resolution_uses_canonical_platform() {
        let mut config = layered();
        config
            .settings_mut(None, Some("LINUX"))
            .tools
            .insert("cc".into(), "/usr/bin/gcc".into());
        assert_eq!(config.resolve_tool("linux", "all", "cc").unwrap(), "/usr/bin/gcc");
        assert!(matches!(
            config.resolve_tool("linux", "all", "ld"),
            Err(ConfigError::MissingKey { kind: KeyKind::Tool, .. })
        ));
    }

    #[test]
    fn test_target_alias_shadows_global_alias() {
        let mut config = layered();
        config.declare_platform(Some("lib"), "LINUX_MUSL");
        config.declare_alias(Some("lib"), "linux", "LINUX_MUSL");

        assert_eq!(config.resolve_platform_name("linux", Some("lib")).unwrap(), "LINUX_MUSL");
        assert_eq!(config.resolve_platform_name("linux", Some("all")).unwrap(), "LINUX");
        assert_eq!(config.resolve_platform_name("linux", None).unwrap(), "LINUX");
        // A target-only platform is invisible to other targets.
        assert!(!config.is_valid_platform("LINUX_MUSL", Some("all")));
    }

    #[test]
    fn test_unresolved_platform_and_alias() {
        let mut config = layered();
        config.declare_alias(None, "mac", "DARWIN");

        assert!(matches!(
            config.resolve_platform_name("WIN32", None),
            Err(ConfigError::UnresolvedPlatform { .. })
        ));
        assert!(matches!(
            config.resolve_platform_name("mac", Some("all")),
            Err(ConfigError::UnresolvedAlias { .. })
        ));
        assert!(matches!(
            config.resolve_constant("LINUX", "nope", "X"),
            Err(ConfigError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_duplicate_declarations_are_reported() {
        let mut config = Configuration::new();
        assert!(config.declare_platform(None, "LINUX"));
        assert!(!config.declare_platform(None, "LINUX"));
        assert!(config.declare_alias(None, "l", "LINUX"));
        assert!(!config.declare_alias(None, "l", "OTHER"));
        assert_eq!(config.resolve_platform_name("l", None).unwrap(), "LINUX");
        assert!(config.targets.contains_key(DEFAULT_TARGET));
    }
}
