//! Contracts of the external backend services: authentication, the
//! path-addressed realtime store, and the blob store. Higher layers only
//! ever talk to these traits; the `Http*` types implement them against
//! the hosted service.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AuthError, StoreError};

mod http_auth;
mod http_blob;
mod http_store;
mod sse;

#[cfg(test)]
pub(crate) mod testing;

pub use http_auth::HttpAuth;
pub use http_blob::HttpBlobStore;
pub use http_store::HttpStore;

/// Result of a successful register or sign-in.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Opaque, stable account identifier.
    pub user_id: String,
    /// Bearer token for store access.
    pub id_token: String,
}

/// Email/password authentication service.
#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    /// Creates an account and returns its session.
    async fn register(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Signs into an existing account.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Ends the current session on the backend side, if it keeps one.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// One delivery on a subscription. Every snapshot is a full copy of the
/// subscribed path's contents, never a diff; `None` means the path is
/// empty.
#[derive(Debug)]
pub enum StoreEvent {
    /// Full snapshot of the subscribed path.
    Snapshot(Option<Value>),
    /// The subscription failed and will deliver nothing further.
    Lost(String),
}

/// Handle for a live subscription on a store path.
///
/// Dropping or closing the handle detaches the listener: the driver task
/// is aborted and no event is observable afterwards, including events
/// already buffered at teardown time.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<StoreEvent>,
    driver: Option<JoinHandle<()>>,
    closed: bool,
}

impl Subscription {
    /// Creates a subscription fed by the returned sender. Used by store
    /// implementations (and test fakes) to publish events.
    pub fn channel(capacity: usize) -> (mpsc::Sender<StoreEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                rx,
                driver: None,
                closed: false,
            },
        )
    }

    /// Ties the lifetime of a driver task to this handle; the task is
    /// aborted on `close` or drop.
    pub fn attach_driver(&mut self, driver: JoinHandle<()>) {
        self.driver = Some(driver);
    }

    /// Waits for the next event. Returns `None` once the subscription is
    /// closed or the sender side is gone.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Detaches the listener. Events that were still in flight are
    /// discarded.
    pub fn close(&mut self) {
        self.closed = true;
        self.rx.close();
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Path-addressed realtime structured store.
#[async_trait]
pub trait RealtimeStore: Send + Sync + 'static {
    /// Attaches (or clears) the session token sent with every subsequent
    /// call. Stores without an auth concept ignore it.
    fn set_auth_token(&self, _token: Option<&str>) {}

    /// Reads the value at `path`. `None` when the path is empty.
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the value at `path`.
    async fn write(&self, path: &str, value: &Value) -> Result<(), StoreError>;

    /// Merges `fields` into the record at `path`. Field-level
    /// last-write-wins.
    async fn update(&self, path: &str, fields: &Map<String, Value>) -> Result<(), StoreError>;

    /// Appends a new child under `path` and returns its store-assigned
    /// identifier.
    async fn push(&self, path: &str, value: &Value) -> Result<String, StoreError>;

    /// Opens a live subscription on `path`. The initial state arrives as
    /// the first snapshot.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;
}

/// Blob storage for media attachments.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Attaches (or clears) the session token sent with every subsequent
    /// call. Stores without an auth concept ignore it.
    fn set_auth_token(&self, _token: Option<&str>) {}

    /// Uploads `bytes` under `path`.
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str)
    -> Result<(), StoreError>;

    /// Resolves the durable download URL of a previously uploaded blob.
    async fn download_url(&self, path: &str) -> Result<String, StoreError>;
}
