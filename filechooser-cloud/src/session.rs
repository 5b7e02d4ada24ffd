//! Backend session: credentials, a lazily built store client, and the last
//! error text for one storage source.
//!
//! State machine: `Unauthenticated → init_cred → CredentialsSet →
//! validate_cred (valid) → Ready`. Any `init_cred` drops the cached client
//! and returns to `CredentialsSet`; data calls are refused until the new
//! credentials are validated. The node tree is not touched here: whether to
//! discard it on a credential change is the caller's decision.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use filechooser_common::{CloudBackend, CredentialStatus, ListingStyle, StoreClient, StoreError};

use crate::backend::{self, SourceConfig, SourceKind};

/// Builds a store client from credentials.
pub type ClientFactory =
    Arc<dyn Fn(&SourceConfig) -> Result<Arc<dyn StoreClient>, StoreError> + Send + Sync>;

pub fn default_factory() -> ClientFactory {
    Arc::new(backend::connect)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    CredentialsSet,
    Ready,
}

pub struct BackendSession {
    kind: SourceKind,
    credentials: Mutex<Option<SourceConfig>>,
    client: Mutex<Option<Arc<dyn StoreClient>>>,
    state: Mutex<SessionState>,
    last_error: Mutex<Option<String>>,
    factory: ClientFactory,
}

impl BackendSession {
    pub fn new(kind: SourceKind) -> Self {
        Self::with_factory(kind, default_factory())
    }

    pub fn with_factory(kind: SourceKind, factory: ClientFactory) -> Self {
        Self {
            kind,
            credentials: Mutex::new(None),
            client: Mutex::new(None),
            state: Mutex::new(SessionState::Unauthenticated),
            last_error: Mutex::new(None),
            factory,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Store new credentials and drop any cached client.
    pub fn init_cred(&self, params: SourceConfig) {
        if params.kind() != self.kind {
            self.record(format!(
                "{} credentials given to a {} session",
                params.kind(),
                self.kind
            ));
            return;
        }
        info!(source = %self.kind, identity = %params.identity(), "Credentials set");
        *self.credentials.lock().unwrap() = Some(params);
        *self.client.lock().unwrap() = None;
        *self.state.lock().unwrap() = SessionState::CredentialsSet;
    }

    /// True when `candidate` differs from the stored credentials.
    pub fn check_cred_changed(&self, candidate: &SourceConfig) -> bool {
        self.credentials.lock().unwrap().as_ref() != Some(candidate)
    }

    /// Run the store's identity check.
    pub async fn validate_cred(&self) -> CredentialStatus {
        if self.state() == SessionState::Unauthenticated {
            self.record(StoreError::NotConfigured);
            return CredentialStatus::Invalid;
        }
        let client = match self.client() {
            Ok(c) => c,
            Err(e) => {
                let status = e.credential_status();
                self.record(e);
                return status;
            }
        };
        match client.check_identity().await {
            Ok(()) => {
                *self.state.lock().unwrap() = SessionState::Ready;
                self.clear_error();
                info!(source = %self.kind, "Credentials validated");
                CredentialStatus::Valid
            }
            Err(e) => {
                let status = e.credential_status();
                *self.state.lock().unwrap() = SessionState::CredentialsSet;
                warn!(source = %self.kind, status = ?status, "Credential validation failed");
                self.record(e);
                status
            }
        }
    }

    /// Cached client, built on first use.
    fn client(&self) -> Result<Arc<dyn StoreClient>, StoreError> {
        let mut slot = self.client.lock().unwrap();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let credentials = self
            .credentials
            .lock()
            .unwrap()
            .clone()
            .ok_or(StoreError::NotConfigured)?;
        let client = (self.factory)(&credentials)?;
        debug!(source = %self.kind, "Store client built");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Client for a data call, or `None` with the reason recorded.
    fn ready_client(&self) -> Option<Arc<dyn StoreClient>> {
        if self.state() != SessionState::Ready {
            self.record("credentials have not been validated");
            return None;
        }
        match self.client() {
            Ok(c) => Some(c),
            Err(e) => {
                self.record(e);
                None
            }
        }
    }

    fn record(&self, error: impl fmt::Display) {
        let text = error.to_string();
        warn!(source = %self.kind, error = %text, "Backend call failed");
        *self.last_error.lock().unwrap() = Some(text);
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap() = None;
    }

    fn settle<T>(&self, result: Result<T, StoreError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.clear_error();
                Some(value)
            }
            Err(e) => {
                self.record(e);
                None
            }
        }
    }
}

#[async_trait]
impl CloudBackend for BackendSession {
    async fn get_buckets(&self, _name_hint: Option<&str>) -> Option<Vec<String>> {
        let client = self.ready_client()?;
        let result = client.list_buckets().await;
        self.settle(result)
    }

    async fn get_objects(&self, bucket: &str, prefix: &str) -> Option<Vec<String>> {
        let client = self.ready_client()?;
        let result = client.list_objects(bucket, prefix).await;
        self.settle(result)
    }

    async fn get_object(&self, bucket: &str, path: &str) -> Option<Bytes> {
        let client = self.ready_client()?;
        let result = client.get_object(bucket, path).await;
        self.settle(result)
    }

    fn listing_style(&self) -> ListingStyle {
        self.kind.listing_style()
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{s3_config, FakeStore, Reachability};

    #[tokio::test]
    async fn test_state_machine() {
        let (factory, builds) = FakeStore::factory(&[("bkt", &["a.txt"])], Reachability::Up);
        let session = BackendSession::with_factory(SourceKind::S3, factory);
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(session.validate_cred().await, CredentialStatus::Invalid);

        session.init_cred(s3_config("AKIA1", "secret"));
        assert_eq!(session.state(), SessionState::CredentialsSet);
        assert_eq!(builds.count(), 0);

        assert_eq!(session.validate_cred().await, CredentialStatus::Valid);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(builds.count(), 1);
        assert_eq!(session.get_buckets(None).await.unwrap(), vec!["bkt"]);
        assert_eq!(builds.count(), 1);
    }

    #[tokio::test]
    async fn test_data_calls_refused_before_validation() {
        let (factory, _builds) = FakeStore::factory(&[("bkt", &[])], Reachability::Up);
        let session = BackendSession::with_factory(SourceKind::S3, factory);
        session.init_cred(s3_config("AKIA1", "secret"));
        assert!(session.get_buckets(None).await.is_none());
        assert!(session.last_error().unwrap().contains("not been validated"));
    }

    #[tokio::test]
    async fn test_credential_change_rebuilds_client() {
        let (factory, builds) = FakeStore::factory(&[("bkt", &[])], Reachability::Up);
        let session = BackendSession::with_factory(SourceKind::S3, factory);
        session.init_cred(s3_config("AKIA1", "secret"));
        session.validate_cred().await;
        session.get_buckets(None).await.unwrap();
        assert_eq!(builds.count(), 1);

        let changed = s3_config("AKIA1", "rotated");
        assert!(session.check_cred_changed(&changed));
        session.init_cred(changed.clone());
        assert!(!session.check_cred_changed(&changed));
        assert_eq!(session.state(), SessionState::CredentialsSet);
        assert!(session.get_buckets(None).await.is_none());

        assert_eq!(session.validate_cred().await, CredentialStatus::Valid);
        assert_eq!(builds.count(), 2);
        assert!(builds.last_secret().as_deref() == Some("rotated"));
        assert!(session.get_buckets(None).await.is_some());
    }

    #[tokio::test]
    async fn test_invalid_versus_undetermined() {
        let (factory, _) = FakeStore::factory(&[], Reachability::Denied);
        let session = BackendSession::with_factory(SourceKind::S3, factory);
        session.init_cred(s3_config("AKIA1", "wrong"));
        assert_eq!(session.validate_cred().await, CredentialStatus::Invalid);
        assert_eq!(session.state(), SessionState::CredentialsSet);
        assert!(session.last_error().unwrap().contains("403"));

        let (factory, _) = FakeStore::factory(&[], Reachability::Unreachable);
        let session = BackendSession::with_factory(SourceKind::S3, factory);
        session.init_cred(s3_config("AKIA1", "secret"));
        assert_eq!(session.validate_cred().await, CredentialStatus::Undetermined);
        assert_eq!(session.state(), SessionState::CredentialsSet);
    }

    #[tokio::test]
    async fn test_factory_error_is_classified() {
        let session = BackendSession::new(SourceKind::S3);
        session.init_cred(s3_config("", ""));
        assert_eq!(session.validate_cred().await, CredentialStatus::Invalid);
        assert!(session.last_error().is_some());
    }

    #[test]
    fn test_mismatched_kind_rejected() {
        let session = BackendSession::new(SourceKind::Azure);
        session.init_cred(s3_config("AKIA1", "secret"));
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(session.last_error().is_some());
    }

    #[tokio::test]
    async fn test_failed_call_then_success_clears_error() {
        let (factory, _) = FakeStore::factory(&[("bkt", &["a"])], Reachability::Up);
        let session = BackendSession::with_factory(SourceKind::S3, factory);
        session.init_cred(s3_config("AKIA1", "secret"));
        session.validate_cred().await;
        assert!(session.get_object("bkt", "missing").await.is_none());
        assert!(session.last_error().is_some());
        assert_eq!(session.get_object("bkt", "a").await.unwrap(), Bytes::from("bkt/a"));
        assert!(session.last_error().is_none());
    }
}
