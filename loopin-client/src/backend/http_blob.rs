use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use serde::Deserialize;

use crate::backend::BlobStore;
use crate::error::StoreError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ObjectMetadataDto {
    #[serde(rename = "downloadTokens", default)]
    download_tokens: Option<String>,
}

/// Blob store client: uploads media objects and resolves their durable
/// download URLs.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    base_url: String,
    auth_token: Arc<RwLock<Option<String>>>,
    client: Client,
}

impl HttpBlobStore {
    /// Creates a blob client for the given object-store base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: base_url.into(),
            auth_token: Arc::new(RwLock::new(None)),
            client,
        }
    }

    fn objects_endpoint(&self) -> String {
        format!("{}/o", self.base_url.trim_end_matches('/'))
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.objects_endpoint(), encode_object_name(path))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.auth_token.read().ok().and_then(|guard| guard.clone());
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn decode_error(response: reqwest::Response) -> StoreError {
        let status = response.status();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| format!("http status {status}"));
        StoreError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

/// Percent-encodes an object name for use as a single URL path segment
/// (slashes included).
fn encode_object_name(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            other => {
                encoded.push('%');
                encoded.push_str(&format!("{other:02X}"));
            }
        }
    }
    encoded
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    fn set_auth_token(&self, token: Option<&str>) {
        if let Ok(mut guard) = self.auth_token.write() {
            *guard = token.map(str::to_string);
        }
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let request = self
            .client
            .post(self.objects_endpoint())
            .query(&[("name", path)])
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes);

        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, StoreError> {
        let request = self.client.get(self.object_url(path));
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let metadata = response.json::<ObjectMetadataDto>().await?;
        let mut url = format!("{}?alt=media", self.object_url(path));
        if let Some(tokens) = metadata.download_tokens {
            // The metadata may carry several comma-separated tokens; any
            // of them is valid.
            if let Some(token) = tokens.split(',').next() {
                url.push_str("&token=");
                url.push_str(token);
            }
        }
        Ok(url)
    }
}
