//! Modification tracking for statement dependencies.
//!
//! Dependencies form trees (a source file and the headers it includes, a
//! directory and the files under it). Nodes live in a flat arena and are
//! addressed by [`DepId`]; both the staleness check and the fingerprint
//! commit walk the tree with an explicit worklist.

use crate::cache::TypedCache;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    File,
    Directory,
}

impl DependencyKind {
    fn key_prefix(self) -> &'static str {
        match self {
            DependencyKind::File => "file",
            DependencyKind::Directory => "dir",
        }
    }
}

/// A dependency bound to the (target, platform) scope that declared it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub path: String,
    pub kind: DependencyKind,
    pub target: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DependencySpec>,
}

impl DependencySpec {
    pub fn file(path: impl Into<String>, target: &str, platform: &str) -> Self {
        Self {
            path: path.into(),
            kind: DependencyKind::File,
            target: target.to_string(),
            platform: platform.to_string(),
            children: Vec::new(),
        }
    }

    pub fn directory(path: impl Into<String>, target: &str, platform: &str) -> Self {
        Self {
            kind: DependencyKind::Directory,
            ..Self::file(path, target, platform)
        }
    }

    pub fn with_child(mut self, child: DependencySpec) -> Self {
        self.children.push(child);
        self
    }
}

/// Cache key holding the last-write time of a dependency.
pub fn fingerprint_key(kind: DependencyKind, path: &str, target: &str, platform: &str) -> String {
    format!("deps.{}:{}:{}:{}.mtime", kind.key_prefix(), path, target, platform)
}

/// Last-write time in nanoseconds since the Unix epoch, `None` if the path
/// is gone or the platform cannot report it.
pub fn last_write_time(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let nanos = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();
    i64::try_from(nanos).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(usize);

#[derive(Debug)]
struct Node {
    path: String,
    kind: DependencyKind,
    key: String,
    children: Vec<DepId>,
}

#[derive(Debug)]
pub struct DependencyGraph {
    root: PathBuf,
    nodes: Vec<Node>,
}

impl DependencyGraph {
    /// Relative dependency paths are resolved against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            nodes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Copies a dependency tree into the arena and returns its root node.
    pub fn add(&mut self, spec: &DependencySpec) -> DepId {
        let root = self.push_node(spec);
        let mut pending = vec![(root, spec)];
        while let Some((parent, spec)) = pending.pop() {
            for child in &spec.children {
                let id = self.push_node(child);
                self.nodes[parent.0].children.push(id);
                pending.push((id, child));
            }
        }
        root
    }

    fn push_node(&mut self, spec: &DependencySpec) -> DepId {
        let id = DepId(self.nodes.len());
        self.nodes.push(Node {
            path: spec.path.clone(),
            kind: spec.kind,
            key: fingerprint_key(spec.kind, &spec.path, &spec.target, &spec.platform),
            children: Vec::new(),
        });
        id
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// True if the node or anything below it changed since its fingerprint
    /// was last committed, or was never committed at all.
    pub fn modified(&self, id: DepId, cache: &TypedCache) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            let node = &self.nodes[id.0];
            let Some(current) = last_write_time(&self.resolve(&node.path)) else {
                tracing::debug!(path = %node.path, "dependency missing");
                return true;
            };
            match cache.get_i64(&node.key) {
                Ok(cached) if cached == current => pending.extend(node.children.iter().copied()),
                Ok(_) => {
                    tracing::debug!(path = %node.path, kind = ?node.kind, "dependency changed");
                    return true;
                }
                Err(_) => {
                    tracing::debug!(path = %node.path, "no fingerprint recorded");
                    return true;
                }
            }
        }
        false
    }

    /// Any of `ids` modified. An empty slice counts as modified so that
    /// statements without dependencies always run.
    pub fn any_modified(&self, ids: &[DepId], cache: &TypedCache) -> bool {
        ids.is_empty() || ids.iter().any(|id| self.modified(*id, cache))
    }

    /// Records the current last-write time of the node and its descendants.
    /// Paths that do not exist are skipped.
    pub fn commit(&self, id: DepId, cache: &mut TypedCache) {
        let mut visited = HashSet::new();
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            let node = &self.nodes[id.0];
            match last_write_time(&self.resolve(&node.path)) {
                Some(mtime) => {
                    cache.set_i64(node.key.clone(), mtime);
                }
                None => tracing::debug!(path = %node.path, "not committing missing dependency"),
            }
            pending.extend(node.children.iter().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn touch(path: &Path, secs: u64) {
        let file = File::options().write(true).create(true).truncate(false).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
    }

    #[test]
    fn test_unchanged_file_then_touched() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.c"), 1_000_000);

        let mut graph = DependencyGraph::new(dir.path());
        let id = graph.add(&DependencySpec::file("a.c", "all", "LINUX"));
        let mut cache = TypedCache::new();

        assert!(graph.modified(id, &cache), "never committed");
        graph.commit(id, &mut cache);
        assert!(!graph.modified(id, &cache));

        touch(&dir.path().join("a.c"), 2_000_000);
        assert!(graph.modified(id, &cache));
    }

    #[test]
    fn test_child_change_propagates() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.c"), 1_000);
        touch(&dir.path().join("a.h"), 1_000);

        let spec = DependencySpec::file("a.c", "all", "LINUX")
            .with_child(DependencySpec::file("a.h", "all", "LINUX"));
        let mut graph = DependencyGraph::new(dir.path());
        let id = graph.add(&spec);
        assert_eq!(graph.len(), 2);

        let mut cache = TypedCache::new();
        graph.commit(id, &mut cache);
        assert!(!graph.modified(id, &cache));

        touch(&dir.path().join("a.h"), 5_000);
        assert!(graph.modified(id, &cache));
    }

    #[test]
    fn test_missing_path_is_modified_and_not_committed() {
        let dir = TempDir::new().unwrap();
        let mut graph = DependencyGraph::new(dir.path());
        let id = graph.add(&DependencySpec::file("gone.c", "all", "LINUX"));
        let mut cache = TypedCache::new();

        graph.commit(id, &mut cache);
        assert!(cache.is_empty());
        assert!(graph.modified(id, &cache));
    }

    #[test]
    fn test_fingerprints_are_scoped() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.c"), 1_000);

        let mut graph = DependencyGraph::new(dir.path());
        let linux = graph.add(&DependencySpec::file("a.c", "all", "LINUX"));
        let win = graph.add(&DependencySpec::file("a.c", "all", "WIN32"));
        let mut cache = TypedCache::new();

        graph.commit(linux, &mut cache);
        assert!(!graph.modified(linux, &cache));
        assert!(graph.modified(win, &cache));
        assert!(cache.contains("deps.file:a.c:all:LINUX.mtime"));
    }

    #[test]
    fn test_directory_dependency() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();

        let mut graph = DependencyGraph::new(dir.path());
        let id = graph.add(&DependencySpec::directory("assets", "all", "LINUX"));
        let mut cache = TypedCache::new();
        graph.commit(id, &mut cache);

        assert!(cache.contains(&fingerprint_key(
            DependencyKind::Directory,
            "assets",
            "all",
            "LINUX"
        )));
        assert!(!graph.modified(id, &cache));
    }

    #[test]
    fn test_no_dependencies_always_runs() {
        let graph = DependencyGraph::new(".");
        assert!(graph.any_modified(&[], &TypedCache::new()));
    }

    #[test]
    fn test_deep_chain_uses_worklist() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("leaf"), 1_000);

        let mut spec = DependencySpec::file("leaf", "all", "LINUX");
        for _ in 0..2_000 {
            spec = DependencySpec::file("leaf", "all", "LINUX").with_child(spec);
        }
        let mut graph = DependencyGraph::new(dir.path());
        let id = graph.add(&spec);
        let mut cache = TypedCache::new();
        graph.commit(id, &mut cache);
        assert!(!graph.modified(id, &cache));
        assert_eq!(graph.len(), 2_001);
    }
}
