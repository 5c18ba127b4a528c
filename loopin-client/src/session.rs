use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use validator::ValidateEmail;

use crate::backend::{RealtimeStore, StoreEvent};
use crate::error::{ClientError, ClientResult};
use crate::models::UserProfile;

/// Identity of the signed-in user plus a live view of their profile
/// record.
///
/// There is no ambient current-user singleton: every component that
/// needs the identity receives a `&SessionContext`. Profile updates are
/// pushed through the context's own single-record subscription on
/// `users/{uid}`.
#[derive(Debug)]
pub struct SessionContext {
    user_id: String,
    id_token: String,
    profile: watch::Receiver<UserProfile>,
    driver: Option<JoinHandle<()>>,
}

impl SessionContext {
    /// Opens the profile subscription for an authenticated user and
    /// returns the context. Fails with `Subscription` if the listener
    /// cannot be established.
    pub(crate) async fn establish<S: RealtimeStore>(
        store: &Arc<S>,
        user_id: String,
        id_token: String,
    ) -> ClientResult<Self> {
        let path = format!("users/{user_id}");
        let mut subscription = store
            .subscribe(&path)
            .await
            .map_err(ClientError::Subscription)?;

        let (tx, rx) = watch::channel(UserProfile::placeholder());
        let driver = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let profile = match event {
                    StoreEvent::Snapshot(Some(value)) => {
                        match serde_json::from_value::<UserProfile>(value) {
                            Ok(profile) => profile,
                            Err(err) => {
                                warn!(error = %err, "malformed user record, using placeholder");
                                UserProfile::placeholder()
                            }
                        }
                    }
                    StoreEvent::Snapshot(None) => {
                        debug!("no user record yet, using placeholder");
                        UserProfile::placeholder()
                    }
                    StoreEvent::Lost(message) => {
                        // Profile delivery degrades, it never errors out.
                        warn!(%message, "profile subscription lost");
                        let _ = tx.send(UserProfile::placeholder());
                        break;
                    }
                };
                if tx.send(profile).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            user_id,
            id_token,
            profile: rx,
            driver: Some(driver),
        })
    }

    /// Opaque identifier of the signed-in account.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Bearer token of the session, for persistence across runs.
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    /// Current profile snapshot.
    pub fn profile(&self) -> UserProfile {
        self.profile.borrow().clone()
    }

    /// Watch channel of profile updates, for consumers that want to be
    /// notified of changes.
    pub fn watch_profile(&self) -> watch::Receiver<UserProfile> {
        self.profile.clone()
    }

    /// Tears down the profile subscription and stops further updates.
    /// An update the driver had already dequeued may still land before
    /// the abort takes effect.
    pub fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.close();
    }
}

/// Validates a registration form. Returns the trimmed name and
/// normalized email; the password is length-checked but left untouched.
pub(crate) fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
) -> ClientResult<(String, String)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ClientError::Validation {
            field: "name",
            message: "Please enter your full name",
        });
    }
    let email = normalize_email(email)?;
    if password.is_empty() {
        return Err(ClientError::Validation {
            field: "password",
            message: "Please enter a password",
        });
    }
    if password.chars().count() < 8 {
        return Err(ClientError::Validation {
            field: "password",
            message: "Password must be at least 8 characters",
        });
    }
    Ok((name.to_string(), email))
}

/// Validates a sign-in form. Returns the normalized email.
pub(crate) fn validate_credentials(email: &str, password: &str) -> ClientResult<String> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ClientError::Validation {
            field: "credentials",
            message: "Please fill in all fields",
        });
    }
    normalize_email(email)
}

fn normalize_email(email: &str) -> ClientResult<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ClientError::Validation {
            field: "email",
            message: "Please enter your email",
        });
    }
    if !email.validate_email() {
        return Err(ClientError::Validation {
            field: "email",
            message: "Please enter a valid email",
        });
    }
    Ok(email.to_string())
}
