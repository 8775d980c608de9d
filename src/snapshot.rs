//! Parse snapshots.
//!
//! After a successful expansion the resolved statements of each
//! (target, platform) are stored in the cache together with a SHA-256 of
//! the build description. A later run with an identical description can
//! load them instead of parsing and expanding again.

use crate::cache::TypedCache;
use crate::statement::ResolvedStatement;
use sha2::{Digest, Sha256};

pub const DOCUMENT_HASH_KEY: &str = "omake.document.sha256";
const SNAPSHOT_PREFIX: &str = "omake.parse.";

pub fn document_hash(bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(bytes).to_vec()
}

/// `omake.parse.<len>:<target>.<len>:<platform>.<field>`. The length
/// prefixes keep one pair's keys from being a prefix of another's when names
/// contain dots.
fn key(target: &str, platform: &str, field: &str) -> String {
    format!(
        "{}{}:{}.{}:{}.{}",
        SNAPSHOT_PREFIX,
        target.len(),
        target,
        platform.len(),
        platform,
        field
    )
}

pub fn hash_matches(cache: &TypedCache, hash: &[u8]) -> bool {
    cache
        .get_blob(DOCUMENT_HASH_KEY)
        .is_ok_and(|stored| stored == hash)
}

/// Records the document hash. Snapshots taken for a different document are
/// dropped first.
pub fn store_hash(cache: &mut TypedCache, hash: &[u8]) {
    if hash_matches(cache, hash) {
        return;
    }
    let dropped = cache.remove_prefix(SNAPSHOT_PREFIX);
    if dropped > 0 {
        tracing::debug!(entries = dropped, "build description changed, dropping parse snapshots");
    }
    cache.set_blob(DOCUMENT_HASH_KEY, hash.to_vec());
}

pub fn store(
    cache: &mut TypedCache,
    target: &str,
    platform: &str,
    statements: &[ResolvedStatement],
) -> Result<(), serde_json::Error> {
    let encoded = statements
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    cache.remove_prefix(&key(target, platform, ""));
    for (i, json) in encoded.into_iter().enumerate() {
        cache.set_text(key(target, platform, &i.to_string()), json);
    }
    cache.set_u32(key(target, platform, "count"), statements.len() as u32);
    cache.set_bool(key(target, platform, "ok"), true);
    Ok(())
}

/// The stored statements, or `None` if there is no complete snapshot.
pub fn load(cache: &TypedCache, target: &str, platform: &str) -> Option<Vec<ResolvedStatement>> {
    if !cache.get_bool(&key(target, platform, "ok")).unwrap_or(false) {
        return None;
    }
    let count = cache.get_u32(&key(target, platform, "count")).ok()?;
    (0..count)
        .map(|i| {
            let json = cache.get_text(&key(target, platform, &i.to_string())).ok()?;
            match serde_json::from_str(&json) {
                Ok(statement) => Some(statement),
                Err(e) => {
                    tracing::debug!(name = target, platform, index = i, error = %e, "unreadable snapshot");
                    None
                }
            }
        })
        .collect()
}

/// Snapshots for every requested (target, platform), provided the document
/// is unchanged and each of them was recorded.
pub fn load_all(
    cache: &TypedCache,
    hash: &[u8],
    requests: &[(String, String)],
) -> Option<Vec<Vec<ResolvedStatement>>> {
    if !hash_matches(cache, hash) {
        return None;
    }
    requests
        .iter()
        .map(|(target, platform)| load(cache, target, platform))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::DependencySpec;
    use crate::statement::{ConflictMode, FileAction, FileOp, FileStatement, ToolInvocation};
    use std::path::PathBuf;

    fn statements() -> Vec<ResolvedStatement> {
        vec![
            ResolvedStatement::Tool(ToolInvocation {
                tool: PathBuf::from("/usr/bin/cc"),
                arguments: "-c a.c".into(),
                dependencies: vec![DependencySpec::file("a.c", "all", "LINUX")],
            }),
            ResolvedStatement::File(FileStatement {
                op: FileOp {
                    action: FileAction::Create,
                    mode: ConflictMode::Force,
                },
                path: "out/v.txt".into(),
                arg: None,
                body: Some("1.0\n".into()),
            }),
        ]
    }

    #[test]
    fn test_snapshot_reused_for_same_document() {
        let mut cache = TypedCache::new();
        let hash = document_hash(b"platforms = [\"LINUX\"]");
        store_hash(&mut cache, &hash);
        store(&mut cache, "all", "LINUX", &statements()).unwrap();

        let requests = vec![("all".to_string(), "LINUX".to_string())];
        let loaded = load_all(&cache, &hash, &requests).unwrap();
        assert_eq!(loaded, vec![statements()]);
    }

    #[test]
    fn test_changed_document_discards_snapshots() {
        let mut cache = TypedCache::new();
        let old = document_hash(b"old");
        store_hash(&mut cache, &old);
        store(&mut cache, "all", "LINUX", &statements()).unwrap();
        cache.set_i64("deps.file:a.c:all:LINUX.mtime", 1);

        let new = document_hash(b"new");
        let requests = vec![("all".to_string(), "LINUX".to_string())];
        assert!(load_all(&cache, &new, &requests).is_none());

        store_hash(&mut cache, &new);
        assert!(load(&cache, "all", "LINUX").is_none());
        // Fingerprints are not part of the snapshot.
        assert!(cache.contains("deps.file:a.c:all:LINUX.mtime"));
    }

    #[test]
    fn test_missing_pair_disables_reuse() {
        let mut cache = TypedCache::new();
        let hash = document_hash(b"doc");
        store_hash(&mut cache, &hash);
        store(&mut cache, "all", "LINUX", &statements()).unwrap();

        let requests = vec![
            ("all".to_string(), "LINUX".to_string()),
            ("all".to_string(), "WIN32".to_string()),
        ];
        assert!(load_all(&cache, &hash, &requests).is_none());
    }

    #[test]
    fn test_restore_shrinks_statement_list() {
        let mut cache = TypedCache::new();
        store(&mut cache, "all", "LINUX", &statements()).unwrap();
        store(&mut cache, "all", "LINUX", &statements()[..1]).unwrap();
        assert_eq!(load(&cache, "all", "LINUX").unwrap().len(), 1);
        assert!(!cache.contains(&key("all", "LINUX", "1")));
    }

    #[test]
    fn test_dotted_names_do_not_share_keys() {
        let mut cache = TypedCache::new();
        store(&mut cache, "all", "LINUX.64", &statements()).unwrap();
        store(&mut cache, "all.LINUX", "64", &statements()[..1]).unwrap();
        store(&mut cache, "all", "LINUX", &[]).unwrap();

        assert_eq!(load(&cache, "all", "LINUX.64").unwrap(), statements());
        assert_eq!(load(&cache, "all.LINUX", "64").unwrap().len(), 1);
        assert!(load(&cache, "all", "LINUX").unwrap().is_empty());
    }
}
