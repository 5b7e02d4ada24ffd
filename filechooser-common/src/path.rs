//! Helpers for `/`-separated object paths.
//!
//! Object stores have no real directories; hierarchy is encoded as separators
//! inside key strings. Absolute paths used by the tree (`/bucket/a/b`) and the
//! prefixes handed to listing calls (`a/b/`) are both derived here.

pub const SEPARATOR: char = '/';

/// Non-empty segments of a path. Leading, trailing and doubled separators are ignored.
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// Join segments into an absolute path. No segments gives `/`.
pub fn join_absolute<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for seg in segments {
        out.push(SEPARATOR);
        out.push_str(seg.as_ref());
    }
    if out.is_empty() {
        out.push(SEPARATOR);
    }
    out
}

/// Split a key on its first separator: `"a/b/c"` → `("a", Some("b/c"))`.
pub fn split_first(key: &str) -> (&str, Option<&str>) {
    match key.split_once(SEPARATOR) {
        Some((head, tail)) => (head, Some(tail)),
        None => (key, None),
    }
}

/// Listing prefix for the in-bucket segments of a container.
/// `["logs", "2023"]` → `"logs/2023/"`, no segments → `""`.
///
/// Empty segments are kept: `["a", ""]` → `"a//"`, the prefix of `a//b.txt`.
pub fn listing_prefix<S: AsRef<str>>(segments: &[S]) -> String {
    let mut prefix = String::new();
    for seg in segments {
        prefix.push_str(seg.as_ref());
        prefix.push(SEPARATOR);
    }
    prefix
}

/// Object key for an in-bucket path: exactly one leading separator is
/// dropped, so `//abs.txt` is the key `/abs.txt`.
pub fn object_key(cloud_path: &str) -> &str {
    cloud_path.strip_prefix(SEPARATOR).unwrap_or(cloud_path)
}

/// Key relative to `prefix`, or `None` if the key lies outside it.
pub fn strip_listing_prefix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)
}
