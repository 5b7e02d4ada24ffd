//! Builders that turn a listing response into child nodes.
//!
//! Flat stores return every key under a prefix in one response, so
//! [`build_from_keys`] materializes the whole subtree and marks every
//! container it creates as fetched. Hierarchical stores return one level per
//! call; [`build_one_level`] attaches that level and leaves the new
//! containers unfetched.

use std::collections::BTreeMap;

use crate::filter::{self, NameFilter};
use crate::node::CloudNode;
use crate::path::{self, SEPARATOR};

/// Parse flat keys (relative to `node`) into a nested tree under `node`.
///
/// `None` is the backend's failure sentinel and is forwarded untouched:
/// `node` stays unfetched. An empty list marks `node` fetched with no entries.
pub fn build_from_keys(
    node: &CloudNode,
    keys: Option<Vec<String>>,
    filter: Option<&NameFilter>,
) -> Option<Vec<CloudNode>> {
    let keys = keys?;
    populate(node, keys.iter().map(String::as_str), filter);
    node.children()
}

/// Attach one parsed group of keys under `node`, recursing into sub-groups.
///
/// Leaves that fail `filter` are dropped here. Existing children with the
/// same name are reused, so repeated calls never duplicate a node.
///
/// An empty segment inside a key (`a//b.txt`, `/abs.txt`) becomes a
/// container with an empty name, so the object stays reachable under its
/// exact key. Only a key that is empty as a whole is skipped.
pub fn populate<'a>(
    node: &CloudNode,
    keys: impl IntoIterator<Item = &'a str>,
    filter: Option<&NameFilter>,
) {
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for key in keys {
        match path::split_first(key) {
            ("", None) => {}
            (leaf, None) => {
                if filter::passes(filter, leaf) {
                    node.child_leaf(leaf);
                }
            }
            (head, Some(tail)) => groups.entry(head).or_default().push(tail),
        }
    }

    for (head, tails) in groups {
        let child = node.child_container(head);
        populate(&child, tails, filter);
    }

    node.mark_fetched();
}

/// Attach a single level of names (relative to `node`). Names ending in the
/// separator become unfetched containers; a bare separator is a container
/// with an empty name.
pub fn build_one_level(
    node: &CloudNode,
    names: Option<Vec<String>>,
    filter: Option<&NameFilter>,
) -> Option<Vec<CloudNode>> {
    let names = names?;
    for name in &names {
        match name.strip_suffix(SEPARATOR) {
            Some(dir) => {
                node.child_container(dir);
            }
            None => {
                if !name.is_empty() && filter::passes(filter, name) {
                    node.child_leaf(name);
                }
            }
        }
    }
    node.mark_fetched();
    node.children()
}
