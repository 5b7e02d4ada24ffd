//! In-memory backend for tree tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use bytes::Bytes;

use crate::backend::{CloudBackend, ListingStyle};
use crate::path;

pub(crate) struct MockBackend {
    style: ListingStyle,
    buckets: BTreeMap<String, Vec<String>>,
    failing: AtomicBool,
    bucket_calls: AtomicUsize,
    object_calls: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl MockBackend {
    fn new(style: ListingStyle, buckets: &[(&str, &[&str])]) -> Self {
        Self {
            style,
            buckets: buckets
                .iter()
                .map(|(b, keys)| (b.to_string(), keys.iter().map(|k| k.to_string()).collect()))
                .collect(),
            failing: AtomicBool::new(false),
            bucket_calls: AtomicUsize::new(0),
            object_calls: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub(crate) fn flat(buckets: &[(&str, &[&str])]) -> Self {
        Self::new(ListingStyle::Flat, buckets)
    }

    pub(crate) fn hierarchical(buckets: &[(&str, &[&str])]) -> Self {
        Self::new(ListingStyle::Hierarchical, buckets)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn bucket_calls(&self) -> usize {
        self.bucket_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn object_calls(&self) -> usize {
        self.object_calls.load(Ordering::SeqCst)
    }

    fn outcome<T>(&self, value: T) -> Option<T> {
        if self.failing.load(Ordering::SeqCst) {
            *self.last_error.lock().unwrap() = Some("simulated outage".to_string());
            None
        } else {
            *self.last_error.lock().unwrap() = None;
            Some(value)
        }
    }
}

#[async_trait::async_trait]
impl CloudBackend for MockBackend {
    async fn get_buckets(&self, _name_hint: Option<&str>) -> Option<Vec<String>> {
        self.bucket_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome(self.buckets.keys().cloned().collect())
    }

    async fn get_objects(&self, bucket: &str, prefix: &str) -> Option<Vec<String>> {
        self.object_calls.fetch_add(1, Ordering::SeqCst);
        let keys = self.buckets.get(bucket).cloned().unwrap_or_default();
        let under: Vec<String> = keys.into_iter().filter(|k| k.starts_with(prefix)).collect();
        let listed = match self.style {
            ListingStyle::Flat => under,
            ListingStyle::Hierarchical => {
                let mut level = BTreeSet::new();
                for key in &under {
                    let rest = &key[prefix.len()..];
                    match rest.split_once('/') {
                        Some((dir, _)) => level.insert(format!("{prefix}{dir}/")),
                        None => level.insert(key.clone()),
                    };
                }
                level.into_iter().collect()
            }
        };
        self.outcome(listed)
    }

    async fn get_object(&self, bucket: &str, path: &str) -> Option<Bytes> {
        let key = path::object_key(path);
        let found = self
            .buckets
            .get(bucket)
            .map_or(false, |keys| keys.iter().any(|k| k == key));
        if !found {
            *self.last_error.lock().unwrap() = Some(format!("no such key: {path}"));
            return None;
        }
        self.outcome(Bytes::from(format!("{bucket}:{path}")))
    }

    fn listing_style(&self) -> ListingStyle {
        self.style
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }
}
