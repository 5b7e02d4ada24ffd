//! Azure Blob Storage backend adapter.
//!
//! Talks to the Blob REST API with reqwest and Shared Key authorization.
//! Listings use `delimiter=/`, so each call returns one level: virtual
//! directories come back as `BlobPrefix` names ending in `/`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use sha2::Sha256;
use tracing::debug;

use filechooser_common::path::object_key;
use filechooser_common::{ListingStyle, StoreClient, StoreError};

use super::xml;
use super::{encode_key, split_endpoint, AzureConfig, REQUEST_TIMEOUT};

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2021-08-06";

// Well-known Azurite development account.
const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

pub struct AzureAdapter {
    config: AzureConfig,
    key: Vec<u8>,
    client: Client,
}

impl AzureAdapter {
    pub fn new(config: AzureConfig) -> Result<Self, StoreError> {
        let key = STANDARD
            .decode(config.account_key.trim())
            .map_err(|e| StoreError::Config(format!("account key is not valid base64: {e}")))?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { config, key, client })
    }

    fn endpoint(&self) -> String {
        match &self.config.endpoint {
            Some(ep) => ep.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", self.config.account_name),
        }
    }

    /// Shared Key signature over the canonical request.
    fn sign(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        headers: &BTreeMap<String, String>,
    ) -> String {
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();

        let mut resource = format!("/{}{}", self.config.account_name, path);
        let mut params: Vec<(String, &str)> =
            query.iter().map(|(k, v)| (k.to_lowercase(), *v)).collect();
        params.sort();
        for (k, v) in params {
            resource.push_str(&format!("\n{}:{}", k, v));
        }

        // Verb, then eleven standard headers that are all empty for a GET.
        let string_to_sign = format!(
            "{}\n\n\n\n\n\n\n\n\n\n\n\n{}{}",
            method, canonical_headers, resource
        );

        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC key length ok");
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        format!("SharedKey {}:{}", self.config.account_name, signature)
    }

    /// Signed GET against `path` below the account endpoint.
    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        now: DateTime<Utc>,
    ) -> Result<Response, StoreError> {
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let (origin, base_path) = split_endpoint(&self.endpoint());
        let full_path = format!("{}{}", base_path, path);

        let mut headers = BTreeMap::new();
        headers.insert("x-ms-date".to_string(), date.clone());
        headers.insert("x-ms-version".to_string(), API_VERSION.to_string());

        let auth = self.sign("GET", &full_path, query, &headers);

        let resp = self
            .client
            .get(format!("{}{}", origin, full_path))
            .query(query)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .header("Authorization", &auth)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::from_status(status, body));
        }
        Ok(resp)
    }
}

/// Parse `AccountName=…;AccountKey=…;BlobEndpoint=…` into a config.
pub fn parse_connection_string(conn: &str) -> Result<AzureConfig, StoreError> {
    let fields: BTreeMap<&str, &str> = conn
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .collect();

    if fields.get("UseDevelopmentStorage").copied() == Some("true") {
        return Ok(AzureConfig {
            account_name: DEV_ACCOUNT.to_string(),
            account_key: DEV_KEY.to_string(),
            endpoint: Some(DEV_ENDPOINT.to_string()),
            connection_string: None,
        });
    }

    let account_name = fields
        .get("AccountName")
        .ok_or_else(|| StoreError::Config("connection string has no AccountName".to_string()))?
        .to_string();
    let account_key = fields
        .get("AccountKey")
        .ok_or_else(|| StoreError::Config("connection string has no AccountKey".to_string()))?
        .to_string();

    let endpoint = match (fields.get("BlobEndpoint"), fields.get("EndpointSuffix")) {
        (Some(ep), _) => Some(ep.to_string()),
        (None, Some(suffix)) => {
            let protocol = fields.get("DefaultEndpointsProtocol").unwrap_or(&"https");
            Some(format!("{}://{}.blob.{}", protocol, account_name, suffix))
        }
        (None, None) => None,
    };

    Ok(AzureConfig {
        account_name,
        account_key,
        endpoint,
        connection_string: None,
    })
}

#[async_trait]
impl StoreClient for AzureAdapter {
    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        let resp = self.get("/", &[("comp", "list")], Utc::now()).await?;
        let body = resp.text().await?;
        let containers = xml::nested_values(&body, "Container", "Name");
        debug!(count = containers.len(), "Azure container listing complete");
        Ok(containers)
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut query = vec![("restype", "container"), ("comp", "list"), ("delimiter", "/")];
        if !prefix.is_empty() {
            query.push(("prefix", prefix));
        }
        let path = format!("/{}", urlencoding::encode(bucket));
        let resp = self.get(&path, &query, Utc::now()).await?;
        let body = resp.text().await?;

        let mut names = xml::nested_values(&body, "BlobPrefix", "Name");
        names.extend(xml::nested_values(&body, "Blob", "Name"));
        debug!(container = %bucket, prefix = %prefix, count = names.len(), "Azure blob listing complete");
        Ok(names)
    }

    async fn get_object(&self, bucket: &str, path: &str) -> Result<Bytes, StoreError> {
        let blob = object_key(path);
        let path = format!("/{}/{}", urlencoding::encode(bucket), encode_key(blob));
        let resp = self.get(&path, &[], Utc::now()).await?;
        let data = resp.bytes().await?;
        debug!(container = %bucket, blob = %blob, size = data.len(), "Azure download complete");
        Ok(data)
    }

    async fn check_identity(&self) -> Result<(), StoreError> {
        self.get("/", &[("comp", "list"), ("maxresults", "1")], Utc::now())
            .await
            .map(|_| ())
    }

    fn listing_style(&self) -> ListingStyle {
        ListingStyle::Hierarchical
    }
}
