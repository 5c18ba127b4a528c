use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, header};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::sse::SseParser;
use crate::backend::{RealtimeStore, StoreEvent, Subscription};
use crate::error::StoreError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SUBSCRIPTION_BUFFER: usize = 16;

#[derive(Debug, Deserialize)]
struct PushResponseDto {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    error: Option<String>,
}

/// REST client for the path-addressed realtime store.
///
/// Reads and writes go through `{base}/{path}.json`; subscriptions open a
/// `text/event-stream` request on the same endpoint and deliver a fresh
/// full snapshot on every change notification.
#[derive(Debug, Clone)]
pub struct HttpStore {
    base_url: String,
    // Shared across clones so the subscription driver picks up a token
    // set after the subscription was opened.
    auth_token: Arc<RwLock<Option<String>>>,
    request_timeout: Duration,
    client: Client,
}

impl HttpStore {
    /// Creates a store client with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeouts(base_url, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a store client with explicit connect/request timeouts.
    /// The request timeout applies to plain reads and writes only; the
    /// subscription stream stays open indefinitely.
    pub fn with_timeouts(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: base_url.into(),
            auth_token: Arc::new(RwLock::new(None)),
            request_timeout,
            client,
        }
    }

    fn token(&self) -> Option<String> {
        self.auth_token.read().ok().and_then(|guard| guard.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, self.endpoint(path))
            .timeout(self.request_timeout);
        if let Some(token) = self.token() {
            request = request.query(&[("auth", token)]);
        }
        request
    }

    async fn decode_error(response: reqwest::Response) -> StoreError {
        let status = response.status();
        let message = match response.json::<ErrorResponseDto>().await {
            Ok(body) => body
                .error
                .unwrap_or_else(|| format!("http status {status}")),
            Err(_) => format!("http status {status}"),
        };
        StoreError::Status {
            status: status.as_u16(),
            message,
        }
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(response)
    }

    /// Drives one subscription: reads change notifications off the event
    /// stream and republishes a full snapshot per change.
    async fn run_subscription(self, path: String, tx: mpsc::Sender<StoreEvent>) {
        let mut request = self
            .client
            .get(self.endpoint(&path))
            .header(header::ACCEPT, "text/event-stream");
        if let Some(token) = self.token() {
            request = request.query(&[("auth", token)]);
        }

        let response = match request.send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                let err = Self::decode_error(response).await;
                let _ = tx.send(StoreEvent::Lost(err.to_string())).await;
                return;
            }
            Err(err) => {
                let _ = tx.send(StoreEvent::Lost(err.to_string())).await;
                return;
            }
        };

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = tx.send(StoreEvent::Lost(err.to_string())).await;
                    return;
                }
            };

            for frame in parser.push(&chunk) {
                match frame.event.as_str() {
                    // The stream announces changes; the authoritative
                    // contract is a full snapshot per change, so re-read
                    // the whole path.
                    "put" | "patch" => {
                        let snapshot = match self.read(&path).await {
                            Ok(snapshot) => snapshot,
                            Err(err) => {
                                let _ = tx.send(StoreEvent::Lost(err.to_string())).await;
                                return;
                            }
                        };
                        if tx.send(StoreEvent::Snapshot(snapshot)).await.is_err() {
                            // Subscriber side torn down.
                            return;
                        }
                    }
                    "keep-alive" => {}
                    "cancel" | "auth_revoked" => {
                        warn!(path = %path, event = %frame.event, "subscription revoked");
                        let _ = tx
                            .send(StoreEvent::Lost(format!(
                                "subscription revoked: {}",
                                frame.event
                            )))
                            .await;
                        return;
                    }
                    other => debug!(path = %path, event = %other, "ignoring stream event"),
                }
            }
        }

        let _ = tx
            .send(StoreEvent::Lost("event stream ended".to_string()))
            .await;
    }
}

#[async_trait]
impl RealtimeStore for HttpStore {
    fn set_auth_token(&self, token: Option<&str>) {
        if let Ok(mut guard) = self.auth_token.write() {
            *guard = token.map(str::to_string);
        }
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let response = self.request(Method::GET, path).send().await?;
        let response = Self::expect_success(response).await?;
        let value = response.json::<Value>().await?;
        Ok(match value {
            Value::Null => None,
            value => Some(value),
        })
    }

    async fn write(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let response = self.request(Method::PUT, path).json(value).send().await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let response = self
            .request(Method::PATCH, path)
            .json(fields)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        let response = self.request(Method::POST, path).json(value).send().await?;
        let response = Self::expect_success(response).await?;
        let dto = response.json::<PushResponseDto>().await?;
        Ok(dto.name)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let (tx, mut subscription) = Subscription::channel(SUBSCRIPTION_BUFFER);
        let store = self.clone();
        let path = path.to_string();
        let driver = tokio::spawn(async move { store.run_subscription(path, tx).await });
        subscription.attach_driver(driver);
        Ok(subscription)
    }
}
