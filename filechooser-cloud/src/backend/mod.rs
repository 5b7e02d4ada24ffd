pub mod azure;
pub mod s3;
pub mod xml;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use filechooser_common::{ListingStyle, StoreClient, StoreError};

use self::azure::AzureAdapter;
use self::s3::S3Adapter;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Which kind of object store a source points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    S3,
    Azure,
}

impl SourceKind {
    pub fn listing_style(self) -> ListingStyle {
        match self {
            SourceKind::S3 => ListingStyle::Flat,
            SourceKind::Azure => ListingStyle::Hierarchical,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::S3 => write!(f, "s3"),
            SourceKind::Azure => write!(f, "azure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>, // Custom endpoint for MinIO, B2 or other S3-compatible APIs
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AzureConfig {
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub account_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub connection_string: Option<String>,
}

/// Credentials and addressing for one storage source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    S3(S3Config),
    Azure(AzureConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceConfig::S3(_) => SourceKind::S3,
            SourceConfig::Azure(_) => SourceKind::Azure,
        }
    }

    /// Who the credentials belong to, without the secret. Two configs with
    /// the same identity but different secrets are a credential change.
    pub fn identity(&self) -> String {
        match self {
            SourceConfig::S3(c) => format!(
                "{}@{}",
                c.access_key_id,
                c.endpoint.as_deref().unwrap_or(&c.region)
            ),
            SourceConfig::Azure(c) => format!(
                "{}@{}",
                c.account_name,
                c.endpoint.as_deref().unwrap_or("blob.core.windows.net")
            ),
        }
    }

    /// Fill empty credential fields from the environment and expand an Azure
    /// connection string into its fields.
    pub fn resolve(self) -> Result<Self, StoreError> {
        match self {
            SourceConfig::S3(mut c) => {
                if c.access_key_id.is_empty() && c.secret_access_key.is_empty() {
                    c.access_key_id = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
                    c.secret_access_key =
                        std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
                }
                Ok(SourceConfig::S3(c))
            }
            SourceConfig::Azure(c) => {
                let conn = c
                    .connection_string
                    .clone()
                    .or_else(|| std::env::var("AZURE_STORAGE_CONNECTION_STRING").ok());
                match conn {
                    Some(conn) if c.account_name.is_empty() => {
                        let mut parsed = azure::parse_connection_string(&conn)?;
                        parsed.connection_string = c.connection_string;
                        Ok(SourceConfig::Azure(parsed))
                    }
                    _ => Ok(SourceConfig::Azure(c)),
                }
            }
        }
    }
}

/// Construct the store client for a source.
pub fn connect(config: &SourceConfig) -> Result<Arc<dyn StoreClient>, StoreError> {
    match config {
        SourceConfig::S3(c) => {
            if c.access_key_id.is_empty() || c.secret_access_key.is_empty() {
                return Err(StoreError::NotConfigured);
            }
            Ok(Arc::new(S3Adapter::new(c.clone())?))
        }
        SourceConfig::Azure(c) => {
            if c.account_name.is_empty() || c.account_key.is_empty() {
                return Err(StoreError::NotConfigured);
            }
            Ok(Arc::new(AzureAdapter::new(c.clone())?))
        }
    }
}

/// Extract the host part from a URL for use in signing.
pub(crate) fn url_host(url: &str) -> String {
    // Strip scheme and path, return just host[:port]
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    without_scheme.split('/').next().unwrap_or(without_scheme).to_string()
}

/// Split an endpoint URL into `scheme://host[:port]` and its path (no trailing slash).
pub(crate) fn split_endpoint(url: &str) -> (String, String) {
    let url = url.trim_end_matches('/');
    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[scheme_end..].find('/') {
        Some(i) => (
            url[..scheme_end + i].to_string(),
            url[scheme_end + i..].to_string(),
        ),
        None => (url.to_string(), String::new()),
    }
}

/// URI-encode each segment of an object key, keeping the separators.
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3(key: &str, secret: &str) -> SourceConfig {
        SourceConfig::S3(S3Config {
            region: "eu-west-1".to_string(),
            endpoint: None,
            access_key_id: key.to_string(),
            secret_access_key: secret.to_string(),
        })
    }

    #[test]
    fn test_identity_ignores_secret() {
        assert_eq!(s3("AKIA1", "one").identity(), s3("AKIA1", "two").identity());
        assert_ne!(s3("AKIA1", "one").identity(), s3("AKIA2", "one").identity());
        assert_eq!(s3("AKIA1", "one").identity(), "AKIA1@eu-west-1");
    }

    #[test]
    fn test_connect_requires_credentials() {
        assert!(matches!(connect(&s3("", "")), Err(StoreError::NotConfigured)));
        assert!(connect(&s3("AKIA1", "secret")).is_ok());
    }

    #[test]
    fn test_parse_source_config() {
        let config: SourceConfig = toml::from_str(
            r#"
kind = "s3"
endpoint = "http://localhost:9000"
access_key_id = "minio"
secret_access_key = "minio123"
"#,
        )
        .unwrap();
        assert_eq!(config.kind(), SourceKind::S3);
        match config {
            SourceConfig::S3(c) => {
                assert_eq!(c.region, "us-east-1");
                assert_eq!(c.endpoint.as_deref(), Some("http://localhost:9000"));
            }
            _ => panic!("expected s3"),
        }
    }

    #[test]
    fn test_resolve_connection_string() {
        let config = SourceConfig::Azure(AzureConfig {
            account_name: String::new(),
            account_key: String::new(),
            endpoint: None,
            connection_string: Some(
                "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net"
                    .to_string(),
            ),
        })
        .resolve()
        .unwrap();
        match config {
            SourceConfig::Azure(c) => {
                assert_eq!(c.account_name, "acct");
                assert_eq!(c.account_key, "a2V5");
                assert_eq!(c.endpoint.as_deref(), Some("https://acct.blob.core.windows.net"));
            }
            _ => panic!("expected azure"),
        }
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("https://s3.us-east-1.amazonaws.com/bucket"), "s3.us-east-1.amazonaws.com");
        assert_eq!(url_host("http://localhost:9000"), "localhost:9000");
    }

    #[test]
    fn test_split_endpoint() {
        assert_eq!(
            split_endpoint("http://127.0.0.1:10000/devstoreaccount1/"),
            ("http://127.0.0.1:10000".to_string(), "/devstoreaccount1".to_string())
        );
        assert_eq!(
            split_endpoint("https://acct.blob.core.windows.net"),
            ("https://acct.blob.core.windows.net".to_string(), String::new())
        );
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("logs/2023/a b.txt"), "logs/2023/a%20b.txt");
        assert_eq!(encode_key("plain"), "plain");
    }
}
