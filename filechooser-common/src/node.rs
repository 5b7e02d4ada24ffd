//! Lazily materialized namespace tree over an object store.
//!
//! Every entry (master root, dirup marker, bucket, directory, file) is the
//! same `CloudNode` type; its kind is derived from structure:
//!
//! - master root: no name, no parent. One per backend session.
//! - dirup marker: root marker with a parent. First child of every container.
//! - bucket: parent is the master root.
//! - directory: has a children sequence, or is a bucket, or is a dirup marker.
//!
//! The tree owns nodes top-down through `children`; parent links are weak.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::backend::{CloudBackend, ListingStyle};
use crate::filter::NameFilter;
use crate::path;
use crate::tree;

/// Display name of the master root.
pub const ROOT_DISPLAY: &str = "<root>";
/// Display name of a dirup marker.
pub const DIRUP_DISPLAY: &str = "..";
/// Breadcrumb path of the master root; see [`CloudNode::ui_fullpath`].
pub const MASTER_ROOT_PATH: &str = "//";

pub const DEFAULT_BUCKET_ICON: &str = "\u{1F5C4}";
pub const DEFAULT_DIR_ICON: &str = "\u{1F4C1}";
pub const DEFAULT_FILE_ICON: &str = "";

/// Icons used when rendering a listing. Bucket and directory icons go before
/// the name, the file icon after it. An empty icon renders the bare name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconSet {
    pub bucket: String,
    pub dir: String,
    pub file: String,
}

impl IconSet {
    /// Missing or empty icons fall back to the defaults.
    pub fn with_fallbacks(bucket: Option<&str>, dir: Option<&str>, file: Option<&str>) -> Self {
        fn pick(icon: Option<&str>, default: &str) -> String {
            icon.filter(|i| !i.is_empty()).unwrap_or(default).to_string()
        }
        Self {
            bucket: pick(bucket, DEFAULT_BUCKET_ICON),
            dir: pick(dir, DEFAULT_DIR_ICON),
            file: pick(file, DEFAULT_FILE_ICON),
        }
    }
}

impl Default for IconSet {
    fn default() -> Self {
        Self::with_fallbacks(None, None, None)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("'{0}' has no bucket ancestor")]
    NoBucket(String),
}

struct NodeInner {
    name: Option<String>,
    parent: Option<Weak<NodeInner>>,
    /// `None`: not a container. `Some` holding only the dirup marker: known
    /// container, not fetched yet.
    children: RefCell<Option<Vec<CloudNode>>>,
    root_marker: bool,
    fetched: Cell<bool>,
    sorted: Cell<bool>,
}

/// Handle to a node in the namespace tree. Cloning is cheap and shares the node.
#[derive(Clone)]
pub struct CloudNode(Rc<NodeInner>);

impl CloudNode {
    fn new(
        name: Option<String>,
        parent: Option<&CloudNode>,
        children: Option<Vec<CloudNode>>,
        root_marker: bool,
    ) -> Self {
        CloudNode(Rc::new(NodeInner {
            name,
            parent: parent.map(|p| Rc::downgrade(&p.0)),
            children: RefCell::new(children),
            root_marker,
            fetched: Cell::new(false),
            sorted: Cell::new(false),
        }))
    }

    /// Master root when `parent` is `None`, otherwise a dirup marker under `parent`.
    pub fn make_root(parent: Option<&CloudNode>) -> Self {
        let children = if parent.is_none() { Some(Vec::new()) } else { None };
        Self::new(None, parent, children, true)
    }

    pub fn make_leaf(name: impl Into<String>, parent: &CloudNode) -> Self {
        Self::new(Some(name.into()), Some(parent), None, false)
    }

    /// A container starts with exactly one child: its dirup marker.
    pub fn make_container(name: impl Into<String>, parent: &CloudNode) -> Self {
        let node = Self::new(Some(name.into()), Some(parent), Some(Vec::new()), false);
        let dirup = Self::make_root(Some(&node));
        node.push_child(dirup);
        node
    }

    pub fn ptr_eq(&self, other: &CloudNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn parent(&self) -> Option<CloudNode> {
        self.0.parent.as_ref()?.upgrade().map(CloudNode)
    }

    /// Snapshot of the children sequence, dirup marker included.
    pub fn children(&self) -> Option<Vec<CloudNode>> {
        self.0.children.borrow().clone()
    }

    /// Children without the dirup marker.
    pub fn entries(&self) -> Vec<CloudNode> {
        self.0
            .children
            .borrow()
            .iter()
            .flatten()
            .filter(|c| !c.is_root_marker())
            .cloned()
            .collect()
    }

    pub fn is_fetched(&self) -> bool {
        self.0.fetched.get()
    }

    pub(crate) fn mark_fetched(&self) {
        self.0.fetched.set(true);
    }

    pub fn is_leaf(&self) -> bool {
        !self.has_children()
    }

    pub fn has_children(&self) -> bool {
        self.0.children.borrow().is_some()
    }

    pub fn is_root_marker(&self) -> bool {
        self.0.root_marker
    }

    pub fn is_master_root(&self) -> bool {
        self.0.name.is_none() && self.0.parent.is_none()
    }

    pub fn is_dirup(&self) -> bool {
        self.0.root_marker && self.0.parent.is_some()
    }

    pub fn is_bucket(&self) -> bool {
        self.parent().map_or(false, |p| p.is_master_root())
    }

    pub fn is_dir(&self) -> bool {
        self.has_children() || self.is_bucket() || self.is_dirup()
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Raw name; `None` for root markers.
    pub fn filename(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn short_name(&self) -> &str {
        if self.is_master_root() {
            ROOT_DISPLAY
        } else if self.is_dirup() {
            DIRUP_DISPLAY
        } else {
            self.0.name.as_deref().unwrap_or_default()
        }
    }

    /// Name as shown in a listing. Without icons, directories get a
    /// trailing separator.
    pub fn display_name(&self, icons: Option<&IconSet>) -> String {
        let name = self.short_name();
        if self.is_root_marker() {
            return name.to_string();
        }
        let Some(icons) = icons else {
            return if self.is_dir() {
                format!("{}{}", name, path::SEPARATOR)
            } else {
                name.to_string()
            };
        };
        let (icon, before) = if self.is_bucket() {
            (&icons.bucket, true)
        } else if self.is_dir() {
            (&icons.dir, true)
        } else {
            (&icons.file, false)
        };
        match (icon.is_empty(), before) {
            (true, _) => name.to_string(),
            (false, true) => format!("{icon} {name}"),
            (false, false) => format!("{name} {icon}"),
        }
    }

    /// Where the UI goes when this node is picked: a dirup marker leads to
    /// the parent of its container, anything else to itself.
    pub fn navigation_target(&self) -> Option<CloudNode> {
        if self.is_dirup() {
            self.parent()?.parent()
        } else {
            Some(self.clone())
        }
    }

    pub fn get_bucket(&self) -> Result<String, NodeError> {
        let mut current = self.clone();
        loop {
            if current.is_bucket() {
                return Ok(current.0.name.clone().unwrap_or_default());
            }
            current = match current.parent() {
                Some(p) => p,
                None => return Err(NodeError::NoBucket(self.short_name().to_string())),
            };
        }
    }

    /// Root first, self last.
    pub fn get_ancestry(&self) -> Vec<CloudNode> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            chain.push(node);
        }
        chain.reverse();
        chain
    }

    fn path_names(&self) -> Vec<String> {
        self.get_ancestry()
            .iter()
            .filter_map(|n| n.0.name.clone())
            .collect()
    }

    /// `/bucket/dir/file`; the master root is `/`.
    pub fn get_cloud_path_with_bucket(&self) -> String {
        path::join_absolute(&self.path_names())
    }

    /// Path inside the bucket: `/dir/file`; a bucket itself is `/`.
    pub fn get_cloud_path(&self) -> String {
        path::join_absolute(&self.in_bucket_names())
    }

    fn in_bucket_names(&self) -> Vec<String> {
        let mut names = self.path_names();
        if !names.is_empty() {
            names.remove(0);
        }
        names
    }

    /// `(bucket, in-bucket path)` as passed to object calls.
    pub fn get_cloud_call_data(&self) -> Result<(String, String), NodeError> {
        Ok((self.get_bucket()?, self.get_cloud_path()))
    }

    /// Breadcrumb form of the path: `//` for the master root, then
    /// `//bucket/dir/..`. Accepted back by [`CloudNode::find_path`].
    pub fn ui_fullpath(&self) -> String {
        let Some(parent) = self.parent() else {
            return MASTER_ROOT_PATH.to_string();
        };
        let mut out = parent.ui_fullpath();
        if !out.ends_with(path::SEPARATOR) {
            out.push(path::SEPARATOR);
        }
        out.push_str(self.short_name());
        out
    }

    /// `(breadcrumb path, node)` for every ancestor, root first.
    pub fn get_path_list(&self) -> Vec<(String, CloudNode)> {
        self.get_ancestry()
            .into_iter()
            .map(|n| (n.ui_fullpath(), n))
            .collect()
    }

    /// Immediate child with this name. Dirup markers never match.
    pub fn find(&self, name: &str) -> Option<CloudNode> {
        self.find_where(name, |_| true)
    }

    pub fn find_container(&self, name: &str) -> Option<CloudNode> {
        self.find_where(name, CloudNode::has_children)
    }

    fn find_where(&self, name: &str, pred: impl Fn(&CloudNode) -> bool) -> Option<CloudNode> {
        self.0
            .children
            .borrow()
            .as_ref()?
            .iter()
            .find(|c| !c.is_root_marker() && *c == name && pred(c))
            .cloned()
    }

    /// Existing container child named `name`, or a new one.
    pub(crate) fn child_container(&self, name: &str) -> CloudNode {
        if let Some(existing) = self.find_container(name) {
            return existing;
        }
        let node = CloudNode::make_container(name, self);
        self.push_child(node.clone());
        node
    }

    /// Existing leaf child named `name`, or a new one.
    pub(crate) fn child_leaf(&self, name: &str) -> CloudNode {
        if let Some(existing) = self.find_where(name, CloudNode::is_leaf) {
            return existing;
        }
        let node = CloudNode::make_leaf(name, self);
        self.push_child(node.clone());
        node
    }

    fn push_child(&self, child: CloudNode) {
        self.0
            .children
            .borrow_mut()
            .get_or_insert_with(Vec::new)
            .push(child);
        self.0.sorted.set(false);
    }

    /// Display ordering: master root, dirup, buckets, containers, leaves;
    /// case-sensitive name within each class.
    pub fn display_cmp(&self, other: &CloudNode) -> Ordering {
        fn class(n: &CloudNode) -> (bool, bool, bool, bool) {
            (
                !n.is_master_root(),
                !n.is_dirup(),
                !n.is_bucket(),
                !n.has_children(),
            )
        }
        class(self)
            .cmp(&class(other))
            .then_with(|| self.0.name.cmp(&other.0.name))
    }

    fn sort_children(&self) {
        if self.0.sorted.get() {
            return;
        }
        if let Some(children) = self.0.children.borrow_mut().as_mut() {
            children.sort_by(|a, b| a.display_cmp(b));
        }
        self.0.sorted.set(true);
    }

    /// Fetch children from `backend` unless already fetched.
    ///
    /// Returns the children sequence, or `None` when the backend call failed
    /// (the text is on `backend.last_error()`) or the node is not a container.
    /// A failed fetch leaves the node unfetched so it can be retried.
    pub async fn fetch_children(
        &self,
        backend: Option<&dyn CloudBackend>,
        filter: Option<&NameFilter>,
    ) -> Option<Vec<CloudNode>> {
        let backend = match backend {
            Some(b) if !self.is_fetched() => b,
            _ => return self.children(),
        };

        if self.is_master_root() {
            let Some(names) = backend.get_buckets(None).await else {
                warn!(error = %backend.last_error().unwrap_or_default(), "Bucket listing failed");
                return None;
            };
            debug!(buckets = names.len(), "Fetched bucket list");
            for name in names.iter().filter(|n| !n.is_empty()) {
                self.child_container(name);
            }
            self.mark_fetched();
            return self.children();
        }

        if !self.is_dir() || self.is_dirup() {
            return self.children();
        }

        let bucket = match self.get_bucket() {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Container outside any bucket");
                return self.children();
            }
        };
        let prefix = path::listing_prefix(&self.in_bucket_names());
        debug!(bucket = %bucket, prefix = %prefix, "Fetching children");

        let keys = backend
            .get_objects(&bucket, &prefix)
            .await
            .map(|keys| relative_keys(keys, &prefix));
        if keys.is_none() {
            warn!(
                bucket = %bucket,
                prefix = %prefix,
                error = %backend.last_error().unwrap_or_default(),
                "Object listing failed"
            );
        }

        match backend.listing_style() {
            ListingStyle::Flat => tree::build_from_keys(self, keys, filter),
            ListingStyle::Hierarchical => tree::build_one_level(self, keys, filter),
        }
    }

    /// Fetch if needed, sort, and render `(display, node)` pairs.
    pub async fn get_dir_list(
        &self,
        backend: Option<&dyn CloudBackend>,
        icons: Option<&IconSet>,
        filter: Option<&NameFilter>,
    ) -> Option<Vec<(String, CloudNode)>> {
        self.fetch_children(backend, filter).await?;
        self.sort_children();
        let children = self.children()?;
        Some(
            children
                .into_iter()
                .map(|c| (c.display_name(icons), c))
                .collect(),
        )
    }

    /// Walk `path` down from this node, fetching on the way.
    /// `.` segments are ignored and `..` moves to the parent.
    pub async fn find_path(
        &self,
        path: &str,
        backend: Option<&dyn CloudBackend>,
        filter: Option<&NameFilter>,
    ) -> Option<CloudNode> {
        let mut current = self.clone();
        for segment in path::split_segments(path) {
            match segment {
                "." => {}
                ".." => current = current.parent()?,
                name => {
                    current.fetch_children(backend, filter).await;
                    current = current
                        .find_container(name)
                        .or_else(|| current.find(name))?;
                }
            }
        }
        Some(current)
    }

    /// Ancestry of the node at `path`, empty when the path does not resolve.
    pub async fn find_path_ancestry(
        &self,
        path: &str,
        backend: Option<&dyn CloudBackend>,
        filter: Option<&NameFilter>,
    ) -> Vec<CloudNode> {
        match self.find_path(path, backend, filter).await {
            Some(node) => node.get_ancestry(),
            None => Vec::new(),
        }
    }

    /// Download this node's object.
    pub async fn fetch_object(&self, backend: &dyn CloudBackend) -> Option<Bytes> {
        let (bucket, path) = match self.get_cloud_call_data() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Object outside any bucket");
                return None;
            }
        };
        let data = backend.get_object(&bucket, &path).await;
        if data.is_none() {
            warn!(
                bucket = %bucket,
                path = %path,
                error = %backend.last_error().unwrap_or_default(),
                "Object download failed"
            );
        }
        data
    }
}

fn relative_keys(keys: Vec<String>, prefix: &str) -> Vec<String> {
    keys.iter()
        .filter_map(|k| path::strip_listing_prefix(k, prefix))
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

impl PartialEq for CloudNode {
    fn eq(&self, other: &CloudNode) -> bool {
        self.0.name == other.0.name
    }
}

impl PartialEq<str> for CloudNode {
    fn eq(&self, other: &str) -> bool {
        self.0.name.as_deref() == Some(other)
    }
}

impl PartialEq<&str> for CloudNode {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl fmt::Debug for CloudNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudNode")
            .field("name", &self.short_name())
            .field("dir", &self.is_dir())
            .field("fetched", &self.is_fetched())
            .finish()
    }
}
