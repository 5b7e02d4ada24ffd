use bytes::Bytes;

/// How a store answers a prefix listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStyle {
    /// Every key under the prefix, hierarchy encoded as separators (S3).
    Flat,
    /// One level per call; sub-containers carry a trailing separator (Azure with a delimiter).
    Hierarchical,
}

/// Outcome of a credential check.
///
/// `Undetermined` covers connectivity problems: the caller must not report bad
/// credentials, but must not proceed either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    Invalid,
    Undetermined,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("access denied: HTTP {status} - {body}")]
    Denied { status: u16, body: String },
    #[error("request failed: HTTP {status} - {body}")]
    Status { status: u16, body: String },
    #[error("invalid credentials: {0}")]
    Config(String),
    #[error("no credentials configured")]
    NotConfigured,
}

impl StoreError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => StoreError::Denied { status, body },
            _ => StoreError::Status { status, body },
        }
    }

    /// The same mapping is used by every adapter.
    pub fn credential_status(&self) -> CredentialStatus {
        match self {
            StoreError::Denied { .. } | StoreError::Config(_) | StoreError::NotConfigured => {
                CredentialStatus::Invalid
            }
            StoreError::Http(_) | StoreError::Status { .. } => CredentialStatus::Undetermined,
        }
    }
}

/// Raw adapter over one object-store API.
///
/// Adapters only translate calls; the session layer owns credentials, error
/// text and the decision of whether a call may be made at all.
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync {
    /// List top-level buckets or containers.
    async fn list_buckets(&self) -> Result<Vec<String>, StoreError>;

    /// List keys under `prefix` in `bucket`. Keys are returned as the store
    /// names them, i.e. including the prefix.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Fetch one object's content.
    async fn get_object(&self, bucket: &str, path: &str) -> Result<Bytes, StoreError>;

    /// Cheapest authenticated call the store offers.
    async fn check_identity(&self) -> Result<(), StoreError>;

    fn listing_style(&self) -> ListingStyle;
}

/// What the namespace tree fetches through.
///
/// Failures never surface as errors: `None` is returned and `last_error`
/// holds the text. An empty vector is a legitimate empty result.
#[async_trait::async_trait]
pub trait CloudBackend: Send + Sync {
    async fn get_buckets(&self, name_hint: Option<&str>) -> Option<Vec<String>>;

    async fn get_objects(&self, bucket: &str, prefix: &str) -> Option<Vec<String>>;

    async fn get_object(&self, bucket: &str, path: &str) -> Option<Bytes>;

    fn listing_style(&self) -> ListingStyle;

    fn last_error(&self) -> Option<String>;
}
