use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use filechooser_common::CloudNode;

use crate::backend::{SourceConfig, SourceKind};
use crate::session::{default_factory, BackendSession, ClientFactory};

/// Cache key: (source kind, credential identity)
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct SessionKey {
    pub kind: SourceKind,
    pub identity: String,
}

impl SessionKey {
    pub fn for_config(config: &SourceConfig) -> Self {
        Self {
            kind: config.kind(),
            identity: config.identity(),
        }
    }
}

struct CacheEntry {
    session: Arc<BackendSession>,
    root: CloudNode,
}

/// How `session_for` satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Created,
    Reused,
    /// Same identity, different secret: credentials were re-initialised and
    /// the tree restarted from a fresh master root.
    CredentialsChanged,
}

/// Backend sessions and their trees, one per (source, credential identity).
/// Switching back to a combination used earlier reuses its fetched tree.
pub struct SessionCache {
    entries: HashMap<SessionKey, CacheEntry>,
    factory: ClientFactory,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::with_factory(default_factory())
    }

    pub fn with_factory(factory: ClientFactory) -> Self {
        Self {
            entries: HashMap::new(),
            factory,
        }
    }

    pub fn session_for(&mut self, config: &SourceConfig) -> (SessionKey, Lookup) {
        let key = SessionKey::for_config(config);
        if let Some(entry) = self.entries.get_mut(&key) {
            if !entry.session.check_cred_changed(config) {
                return (key, Lookup::Reused);
            }
            info!(source = %key.kind, identity = %key.identity, "Credentials changed, resetting tree");
            entry.session.init_cred(config.clone());
            entry.root = CloudNode::make_root(None);
            return (key, Lookup::CredentialsChanged);
        }

        let session = BackendSession::with_factory(key.kind, self.factory.clone());
        session.init_cred(config.clone());
        info!(source = %key.kind, identity = %key.identity, "New backend session");
        self.entries.insert(
            key.clone(),
            CacheEntry {
                session: Arc::new(session),
                root: CloudNode::make_root(None),
            },
        );
        (key, Lookup::Created)
    }

    pub fn session(&self, key: &SessionKey) -> Option<Arc<BackendSession>> {
        self.entries.get(key).map(|e| e.session.clone())
    }

    pub fn get_master_root_for(&self, key: &SessionKey) -> Option<CloudNode> {
        self.entries.get(key).map(|e| e.root.clone())
    }

    /// Drop a session and its tree.
    pub fn invalidate(&mut self, key: &SessionKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::testing::{s3_config, FakeStore, Reachability};

    fn cache() -> SessionCache {
        let (factory, _) = FakeStore::factory(&[("bkt", &["a.txt"])], Reachability::Up);
        SessionCache::with_factory(factory)
    }

    #[test]
    fn test_reuse_same_identity() {
        let mut cache = cache();
        let (key, lookup) = cache.session_for(&s3_config("AKIA1", "secret"));
        assert_eq!(lookup, Lookup::Created);
        let root = cache.get_master_root_for(&key).unwrap();

        let (again, lookup) = cache.session_for(&s3_config("AKIA1", "secret"));
        assert_eq!(lookup, Lookup::Reused);
        assert_eq!(again, key);
        assert!(cache.get_master_root_for(&key).unwrap().ptr_eq(&root));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_identities_get_distinct_trees() {
        let mut cache = cache();
        let (k1, _) = cache.session_for(&s3_config("AKIA1", "secret"));
        let (k2, _) = cache.session_for(&s3_config("AKIA2", "secret"));
        assert_ne!(k1, k2);
        let r1 = cache.get_master_root_for(&k1).unwrap();
        let r2 = cache.get_master_root_for(&k2).unwrap();
        assert!(!r1.ptr_eq(&r2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_changed_secret_resets_tree() {
        let mut cache = cache();
        let (key, _) = cache.session_for(&s3_config("AKIA1", "secret"));
        let old_root = cache.get_master_root_for(&key).unwrap();

        let (same, lookup) = cache.session_for(&s3_config("AKIA1", "rotated"));
        assert_eq!(same, key);
        assert_eq!(lookup, Lookup::CredentialsChanged);
        assert!(!cache.get_master_root_for(&key).unwrap().ptr_eq(&old_root));
        assert_eq!(
            cache.session(&key).unwrap().state(),
            SessionState::CredentialsSet
        );
    }

    #[test]
    fn test_invalidate() {
        let mut cache = cache();
        let (key, _) = cache.session_for(&s3_config("AKIA1", "secret"));
        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert!(cache.get_master_root_for(&key).is_none());
        assert!(cache.is_empty());
    }
}
