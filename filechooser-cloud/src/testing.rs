//! In-memory store client and counting factory for session and chooser tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use filechooser_common::path::object_key;
use filechooser_common::{ListingStyle, StoreClient, StoreError};

use crate::backend::{S3Config, SourceConfig};
use crate::session::ClientFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reachability {
    Up,
    Denied,
    Unreachable,
}

pub(crate) struct FakeStore {
    buckets: BTreeMap<String, Vec<String>>,
    reachability: Reachability,
}

#[derive(Clone, Default)]
pub(crate) struct Builds(Arc<Mutex<(usize, Option<String>)>>);

impl Builds {
    pub(crate) fn count(&self) -> usize {
        self.0.lock().unwrap().0
    }

    pub(crate) fn last_secret(&self) -> Option<String> {
        self.0.lock().unwrap().1.clone()
    }
}

impl FakeStore {
    /// Factory producing flat fake stores, plus a handle counting builds.
    pub(crate) fn factory(
        buckets: &[(&str, &[&str])],
        reachability: Reachability,
    ) -> (ClientFactory, Builds) {
        let buckets: BTreeMap<String, Vec<String>> = buckets
            .iter()
            .map(|(b, keys)| (b.to_string(), keys.iter().map(|k| k.to_string()).collect()))
            .collect();
        let builds = Builds::default();
        let counter = builds.clone();
        let factory: ClientFactory = Arc::new(move |config: &SourceConfig| -> Result<Arc<dyn StoreClient>, StoreError> {
            let mut state = counter.0.lock().unwrap();
            state.0 += 1;
            state.1 = match config {
                SourceConfig::S3(c) => Some(c.secret_access_key.clone()),
                SourceConfig::Azure(c) => Some(c.account_key.clone()),
            };
            let store: Arc<dyn StoreClient> = Arc::new(FakeStore {
                buckets: buckets.clone(),
                reachability,
            });
            Ok(store)
        });
        (factory, builds)
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.reachability {
            Reachability::Up => Ok(()),
            Reachability::Denied => Err(StoreError::from_status(403, "InvalidAccessKeyId".to_string())),
            Reachability::Unreachable => {
                Err(StoreError::from_status(503, "Service Unavailable".to_string()))
            }
        }
    }
}

#[async_trait]
impl StoreClient for FakeStore {
    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self.buckets.keys().cloned().collect())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let keys = self
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::from_status(404, "NoSuchBucket".to_string()))?;
        Ok(keys.iter().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn get_object(&self, bucket: &str, path: &str) -> Result<Bytes, StoreError> {
        self.check()?;
        let key = object_key(path);
        let found = self
            .buckets
            .get(bucket)
            .map_or(false, |keys| keys.iter().any(|k| k == key));
        if !found {
            return Err(StoreError::from_status(404, "NoSuchKey".to_string()));
        }
        Ok(Bytes::from(format!("{bucket}/{key}")))
    }

    async fn check_identity(&self) -> Result<(), StoreError> {
        self.check()
    }

    fn listing_style(&self) -> ListingStyle {
        ListingStyle::Flat
    }
}

pub(crate) fn s3_config(access_key_id: &str, secret: &str) -> SourceConfig {
    SourceConfig::S3(S3Config {
        region: "us-east-1".to_string(),
        endpoint: None,
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret.to_string(),
    })
}
