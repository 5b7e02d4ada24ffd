//! S3-compatible backend adapter.
//!
//! Handles AWS S3 and S3-compatible stores (MinIO, B2) with path-style
//! addressing. Uses reqwest with manual AWS Signature V4 signing so no SDK
//! dependency is needed. Listings are flat: one `ListObjectsV2` page
//! returns every key under the prefix.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use sha2::{Digest, Sha256};
use tracing::debug;

use filechooser_common::path::object_key;
use filechooser_common::{ListingStyle, StoreClient, StoreError};

use super::xml;
use super::{encode_key, url_host, S3Config, REQUEST_TIMEOUT};

type HmacSha256 = Hmac<Sha256>;

pub struct S3Adapter {
    config: S3Config,
    client: Client,
}

impl S3Adapter {
    pub fn new(config: S3Config) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        match &self.config.endpoint {
            Some(ep) => ep.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.config.region),
        }
    }

    /// Compute AWS Signature V4 for a request.
    #[allow(clippy::too_many_arguments)]
    fn sign(
        &self,
        method: &str,
        canonical_uri: &str,
        query: &str,
        headers: &BTreeMap<String, String>,
        body_hash: &str,
        date_time: &str,
        date: &str,
    ) -> String {
        // Canonical request
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();
        let signed_headers: String = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, query, canonical_headers, signed_headers, body_hash
        );

        // String to sign
        let cr_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let credential_scope = format!("{}/{}/s3/aws4_request", date, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            date_time, credential_scope, cr_hash
        );

        let signing_key =
            derive_signing_key(&self.config.secret_access_key, date, &self.config.region);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{},SignedHeaders={},Signature={}",
            self.config.access_key_id, credential_scope, signed_headers, signature
        )
    }

    /// Signed GET; non-success statuses become `StoreError`.
    async fn get(&self, canonical_uri: &str, query: &str, now: DateTime<Utc>) -> Result<Response, StoreError> {
        let date_time = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let endpoint = self.endpoint();
        let empty_hash = body_hash(b"");

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), url_host(&endpoint));
        headers.insert("x-amz-content-sha256".to_string(), empty_hash.clone());
        headers.insert("x-amz-date".to_string(), date_time.clone());

        let auth = self.sign("GET", canonical_uri, query, &headers, &empty_hash, &date_time, &date);

        let mut url = format!("{}{}", endpoint, canonical_uri);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }

        let resp = self
            .client
            .get(&url)
            .header("x-amz-date", &date_time)
            .header("x-amz-content-sha256", &empty_hash)
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

fn derive_signing_key(secret: &str, date: &str, region: &str) -> Vec<u8> {
    let key = format!("AWS4{}", secret);
    let k_date = hmac_sha256(key.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key length ok");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn body_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Path-style resource: `/bucket` or `/bucket/encoded/key`.
fn resource_path(bucket: &str, key: &str) -> String {
    let key = object_key(key);
    if key.is_empty() {
        format!("/{}", urlencoding::encode(bucket))
    } else {
        format!("/{}/{}", urlencoding::encode(bucket), encode_key(key))
    }
}

#[async_trait]
impl StoreClient for S3Adapter {
    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        let resp = self.get("/", "", Utc::now()).await?;
        let body = resp.text().await?;
        let buckets = xml::nested_values(&body, "Bucket", "Name");
        debug!(count = buckets.len(), "S3 bucket listing complete");
        Ok(buckets)
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let query = format!("list-type=2&prefix={}", urlencoding::encode(prefix));
        let resp = self.get(&resource_path(bucket, ""), &query, Utc::now()).await?;
        let body = resp.text().await?;
        let keys = xml::tag_values(&body, "Key");
        debug!(bucket = %bucket, prefix = %prefix, count = keys.len(), "S3 object listing complete");
        Ok(keys)
    }

    async fn get_object(&self, bucket: &str, path: &str) -> Result<Bytes, StoreError> {
        let resp = self.get(&resource_path(bucket, path), "", Utc::now()).await?;
        let data = resp.bytes().await?;
        debug!(bucket = %bucket, key = %path, size = data.len(), "S3 download complete");
        Ok(data)
    }

    async fn check_identity(&self) -> Result<(), StoreError> {
        self.list_buckets().await.map(|_| ())
    }

    fn listing_style(&self) -> ListingStyle {
        ListingStyle::Flat
    }
}
