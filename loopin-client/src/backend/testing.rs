//! Hand-written fakes for the backend traits, shared by the unit tests
//! of the session, feed and submission layers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use tokio::sync::{Notify, mpsc};

use crate::backend::{
    AuthBackend, AuthSession, BlobStore, RealtimeStore, StoreEvent, Subscription,
};
use crate::error::{AuthError, StoreError};

fn denied(path: &str) -> StoreError {
    StoreError::Status {
        status: 403,
        message: format!("permission denied at {path}"),
    }
}

#[derive(Clone)]
pub(crate) struct FakeAuth {
    pub(crate) user_id: String,
    pub(crate) register_calls: Arc<Mutex<Vec<(String, String)>>>,
    pub(crate) sign_in_calls: Arc<Mutex<Vec<(String, String)>>>,
    next_error: Arc<Mutex<Option<AuthError>>>,
}

impl FakeAuth {
    pub(crate) fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            register_calls: Arc::new(Mutex::new(Vec::new())),
            sign_in_calls: Arc::new(Mutex::new(Vec::new())),
            next_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes the next register/sign-in call fail with `err`.
    pub(crate) fn fail_next(&self, err: AuthError) {
        *self.next_error.lock().expect("next_error mutex poisoned") = Some(err);
    }

    fn session(&self) -> AuthSession {
        AuthSession {
            user_id: self.user_id.clone(),
            id_token: format!("token-{}", self.user_id),
        }
    }

    fn take_error(&self) -> Option<AuthError> {
        self.next_error
            .lock()
            .expect("next_error mutex poisoned")
            .take()
    }
}

#[async_trait]
impl AuthBackend for FakeAuth {
    async fn register(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.register_calls
            .lock()
            .expect("register_calls mutex poisoned")
            .push((email.to_string(), password.to_string()));
        match self.take_error() {
            Some(err) => Err(err),
            None => Ok(self.session()),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.sign_in_calls
            .lock()
            .expect("sign_in_calls mutex poisoned")
            .push((email.to_string(), password.to_string()));
        match self.take_error() {
            Some(err) => Err(err),
            None => Ok(self.session()),
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FakeStore {
    pub(crate) writes: Arc<Mutex<Vec<(String, Value)>>>,
    pub(crate) updates: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
    pub(crate) pushes: Arc<Mutex<Vec<(String, Value)>>>,
    auth_token: Arc<Mutex<Option<String>>>,
    fail_paths: Arc<Mutex<HashSet<String>>>,
    update_gate: Arc<Mutex<Option<Arc<Notify>>>>,
    subscribers: Arc<Mutex<Vec<(String, mpsc::Sender<StoreEvent>)>>>,
    fail_subscribe: Arc<Mutex<bool>>,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes writes/updates/pushes touching `path` fail.
    pub(crate) fn fail_writes_at(&self, path: &str) {
        self.fail_paths
            .lock()
            .expect("fail_paths mutex poisoned")
            .insert(path.to_string());
    }

    /// Makes every `subscribe` call fail.
    pub(crate) fn fail_subscriptions(&self) {
        *self
            .fail_subscribe
            .lock()
            .expect("fail_subscribe mutex poisoned") = true;
    }

    /// Blocks every `update` call until the returned handle is notified.
    pub(crate) fn gate_updates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self
            .update_gate
            .lock()
            .expect("update_gate mutex poisoned") = Some(Arc::clone(&gate));
        gate
    }

    /// Token last attached via the trait, if any.
    pub(crate) fn auth_token(&self) -> Option<String> {
        self.auth_token
            .lock()
            .expect("auth_token mutex poisoned")
            .clone()
    }

    /// Delivers an event to every subscriber of `path`.
    pub(crate) async fn emit(&self, path: &str, event: StoreEvent) {
        let senders: Vec<mpsc::Sender<StoreEvent>> = self
            .subscribers
            .lock()
            .expect("subscribers mutex poisoned")
            .iter()
            .filter(|(subscribed, _)| subscribed == path)
            .map(|(_, tx)| tx.clone())
            .collect();
        for tx in senders {
            let copy = match &event {
                StoreEvent::Snapshot(value) => StoreEvent::Snapshot(value.clone()),
                StoreEvent::Lost(message) => StoreEvent::Lost(message.clone()),
            };
            let _ = tx.send(copy).await;
        }
    }

    pub(crate) fn subscription_count(&self, path: &str) -> usize {
        self.subscribers
            .lock()
            .expect("subscribers mutex poisoned")
            .iter()
            .filter(|(subscribed, _)| subscribed == path)
            .count()
    }

    fn check_path(&self, path: &str) -> Result<(), StoreError> {
        if self
            .fail_paths
            .lock()
            .expect("fail_paths mutex poisoned")
            .contains(path)
        {
            return Err(denied(path));
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeStore for FakeStore {
    fn set_auth_token(&self, token: Option<&str>) {
        *self.auth_token.lock().expect("auth_token mutex poisoned") =
            token.map(str::to_string);
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.check_path(path)?;
        Ok(None)
    }

    async fn write(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        self.check_path(path)?;
        self.writes
            .lock()
            .expect("writes mutex poisoned")
            .push((path.to_string(), value.clone()));
        Ok(())
    }

    async fn update(&self, path: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let gate = self
            .update_gate
            .lock()
            .expect("update_gate mutex poisoned")
            .clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_path(path)?;
        self.updates
            .lock()
            .expect("updates mutex poisoned")
            .push((path.to_string(), fields.clone()));
        Ok(())
    }

    async fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        self.check_path(path)?;
        let mut pushes = self.pushes.lock().expect("pushes mutex poisoned");
        pushes.push((path.to_string(), value.clone()));
        Ok(format!("push-{}", pushes.len()))
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        if *self
            .fail_subscribe
            .lock()
            .expect("fail_subscribe mutex poisoned")
        {
            return Err(denied(path));
        }
        let (tx, subscription) = Subscription::channel(16);
        self.subscribers
            .lock()
            .expect("subscribers mutex poisoned")
            .push((path.to_string(), tx));
        Ok(subscription)
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeBlobs {
    pub(crate) uploads: Arc<Mutex<Vec<(String, usize, String)>>>,
    auth_token: Arc<Mutex<Option<String>>>,
    fail_uploads: Arc<Mutex<bool>>,
}

impl FakeBlobs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_uploads(&self) {
        *self
            .fail_uploads
            .lock()
            .expect("fail_uploads mutex poisoned") = true;
    }

    /// Token last attached via the trait, if any.
    pub(crate) fn auth_token(&self) -> Option<String> {
        self.auth_token
            .lock()
            .expect("auth_token mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl BlobStore for FakeBlobs {
    fn set_auth_token(&self, token: Option<&str>) {
        *self.auth_token.lock().expect("auth_token mutex poisoned") =
            token.map(str::to_string);
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        if *self
            .fail_uploads
            .lock()
            .expect("fail_uploads mutex poisoned")
        {
            return Err(denied(path));
        }
        self.uploads
            .lock()
            .expect("uploads mutex poisoned")
            .push((path.to_string(), bytes.len(), content_type.to_string()));
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, StoreError> {
        Ok(format!("https://blobs.example/{path}"))
    }
}
