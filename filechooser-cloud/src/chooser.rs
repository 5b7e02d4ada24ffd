//! Selection state for a chooser driven over the namespace tree.
//!
//! Holds the current `(source, directory node, filename)` per session and
//! turns user actions (open a source, pick an entry, jump to a path) into
//! tree walks and fetches.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use filechooser_common::{CloudBackend, CloudNode, CredentialStatus, IconSet, NameFilter};

use crate::backend::SourceConfig;
use crate::cache::{Lookup, SessionCache, SessionKey};
use crate::session::{BackendSession, SessionState};

#[derive(Debug, Clone)]
pub struct Selection {
    pub dir: CloudNode,
    pub filename: Option<String>,
}

pub struct Chooser {
    cache: SessionCache,
    selections: HashMap<SessionKey, Selection>,
    active: Option<SessionKey>,
    icons: Option<IconSet>,
    filter: Option<NameFilter>,
    only_dirs: bool,
}

impl Chooser {
    pub fn new(cache: SessionCache) -> Self {
        Self {
            cache,
            selections: HashMap::new(),
            active: None,
            icons: None,
            filter: None,
            only_dirs: false,
        }
    }

    /// `None` renders plain names with a trailing separator on directories.
    pub fn with_icons(mut self, icons: Option<IconSet>) -> Self {
        self.icons = icons;
        self
    }

    /// Directory-picking mode: files can be listed but never become the
    /// selected filename.
    pub fn with_only_dirs(mut self, only_dirs: bool) -> Self {
        self.only_dirs = only_dirs;
        self
    }

    pub fn with_filter(mut self, filter: Option<NameFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Switch to a storage source, validating credentials when needed.
    ///
    /// A source used before keeps its tree and position. After a credential
    /// change the tree starts over and the previous position is looked up
    /// again in the new tree.
    pub async fn open(&mut self, config: &SourceConfig) -> CredentialStatus {
        // Must be read before `session_for`: a tree reset drops the old ancestry.
        let previous = self
            .selections
            .get(&SessionKey::for_config(config))
            .map(|s| (s.dir.get_cloud_path_with_bucket(), s.filename.clone()));

        let (key, lookup) = self.cache.session_for(config);
        self.active = Some(key.clone());
        let (Some(session), Some(root)) = (
            self.cache.session(&key),
            self.cache.get_master_root_for(&key),
        ) else {
            return CredentialStatus::Invalid;
        };

        let status = if lookup == Lookup::Reused && session.state() == SessionState::Ready {
            CredentialStatus::Valid
        } else {
            session.validate_cred().await
        };
        info!(source = %key.kind, lookup = ?lookup, status = ?status, "Source opened");

        let selection = match (lookup, previous) {
            (Lookup::Reused, Some(_)) => return status,
            (Lookup::CredentialsChanged, Some((path, filename)))
                if status == CredentialStatus::Valid =>
            {
                match root.find_path(&path, Some(&*session), self.filter.as_ref()).await {
                    Some(dir) => {
                        debug!(path = %path, "Selection restored");
                        Selection { dir, filename }
                    }
                    None => Selection { dir: root, filename: None },
                }
            }
            _ => Selection { dir: root, filename: None },
        };
        self.selections.insert(key, selection);
        status
    }

    fn active(&self) -> Option<(Arc<BackendSession>, &Selection)> {
        let key = self.active.as_ref()?;
        Some((self.cache.session(key)?, self.selections.get(key)?))
    }

    fn active_mut(&mut self) -> Option<&mut Selection> {
        let key = self.active.as_ref()?;
        self.selections.get_mut(key)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.active().map(|(_, s)| s)
    }

    pub fn current_dir(&self) -> Option<CloudNode> {
        self.selection().map(|s| s.dir.clone())
    }

    /// Rendered entries of the current directory; `None` when the fetch
    /// failed (see `last_error`).
    pub async fn listing(&self) -> Option<Vec<(String, CloudNode)>> {
        let (session, selection) = self.active()?;
        selection
            .dir
            .get_dir_list(Some(&*session), self.icons.as_ref(), self.filter.as_ref())
            .await
    }

    /// `(breadcrumb path, short name)` for each ancestor of the current
    /// directory, master root first.
    pub fn breadcrumbs(&self) -> Vec<(String, String)> {
        self.selection()
            .map(|s| {
                s.dir
                    .get_path_list()
                    .into_iter()
                    .map(|(path, node)| (path, node.short_name().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pick an entry of the current listing by display string or raw name.
    /// Containers and dirup markers move the current directory; a file
    /// becomes the selected filename.
    pub async fn select(&mut self, entry: &str) -> Option<CloudNode> {
        let listing = self.listing().await?;
        let (_, node) = listing
            .into_iter()
            .find(|(display, node)| display == entry || node == entry)?;

        let only_dirs = self.only_dirs;
        let selection = self.active_mut()?;
        if node.is_file() {
            if only_dirs {
                return None;
            }
            selection.filename = node.filename().map(str::to_string);
            return Some(node);
        }
        let target = node.navigation_target()?;
        selection.dir = target.clone();
        selection.filename = None;
        Some(target)
    }

    /// Jump to an absolute path (`/bucket/dir[/file]`).
    pub async fn navigate(&mut self, path: &str) -> Option<CloudNode> {
        let key = self.active.clone()?;
        let session = self.cache.session(&key)?;
        let root = self.cache.get_master_root_for(&key)?;
        let node = root
            .find_path(path, Some(&*session), self.filter.as_ref())
            .await?;

        let only_dirs = self.only_dirs;
        let selection = self.active_mut()?;
        if node.is_file() {
            selection.dir = node.parent()?;
            selection.filename = node
                .filename()
                .filter(|_| !only_dirs)
                .map(str::to_string);
        } else {
            selection.dir = node.clone();
            selection.filename = None;
        }
        Some(node)
    }

    /// Absolute path of the selected file, or of the current directory.
    pub fn selected_path(&self) -> Option<String> {
        let selection = self.selection()?;
        let dir = selection.dir.get_cloud_path_with_bucket();
        Some(match &selection.filename {
            Some(name) => format!("{}/{}", dir, name),
            None => dir,
        })
    }

    pub fn selected_file(&self) -> Option<CloudNode> {
        let selection = self.selection()?;
        let name = selection.filename.as_deref()?;
        selection
            .dir
            .entries()
            .into_iter()
            .find(|n| n.is_file() && n == name)
    }

    /// Download the selected file.
    pub async fn read_selected(&self) -> Option<Bytes> {
        let (session, _) = self.active()?;
        let file = self.selected_file()?;
        file.fetch_object(&*session).await
    }

    pub fn last_error(&self) -> Option<String> {
        self.active().and_then(|(session, _)| session.last_error())
    }
}
