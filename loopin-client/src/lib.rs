//! Client library for the LoopIn community service.
//!
//! Provides a single entry point (`LoopInClient`) over three hosted
//! backends: email/password authentication, a path-addressed realtime
//! store and a blob store for media. The client exposes:
//! - session management (`register`/`sign_in`/`resume`/`sign_out`),
//! - live feeds that follow store snapshots (`my_complaints`,
//!   `community_feed`),
//! - submission pipelines for complaints, posts and profile images.
//!
//! All remote services sit behind traits, so the whole client can run
//! against in-process fakes in tests.
#![warn(missing_docs)]

pub mod backend;
mod error;
mod feed;
mod models;
mod session;
mod settings;
mod submit;

pub use error::{AuthError, ClientError, ClientResult, StoreError};
pub use feed::{ComplaintFeed, ComplaintList, FeedOrdering, FeedState, PostFeed};
pub use models::{Complaint, ComplaintStatus, MediaKind, MediaRef, Post, UserProfile};
pub use session::SessionContext;
pub use settings::Settings;
pub use submit::{ComplaintDraft, ImageAttachment, MediaAttachment, PostDraft};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use backend::{AuthBackend, BlobStore, HttpAuth, HttpBlobStore, HttpStore, RealtimeStore};

/// Unified client over the authentication, realtime-store and blob-store
/// backends.
#[derive(Debug, Clone)]
pub struct LoopInClient<A, S, B> {
    auth: Arc<A>,
    store: Arc<S>,
    blobs: Arc<B>,
}

impl LoopInClient<HttpAuth, HttpStore, HttpBlobStore> {
    /// Creates a client wired to the hosted HTTP backends described by
    /// `settings`.
    pub fn over_http(settings: &Settings) -> Self {
        let connect = Duration::from_secs(settings.connect_timeout_secs);
        let request = Duration::from_secs(settings.request_timeout_secs);
        Self::new(
            HttpAuth::new(&settings.auth_url, &settings.api_key),
            HttpStore::with_timeouts(&settings.database_url, connect, request),
            HttpBlobStore::new(&settings.storage_url),
        )
    }
}

impl<A, S, B> LoopInClient<A, S, B>
where
    A: AuthBackend,
    S: RealtimeStore,
    B: BlobStore,
{
    /// Creates a client over explicit backend implementations.
    pub fn new(auth: A, store: S, blobs: B) -> Self {
        Self {
            auth: Arc::new(auth),
            store: Arc::new(store),
            blobs: Arc::new(blobs),
        }
    }

    /// Registers a new account, creates its profile record and opens a
    /// session. The form is validated before any remote call.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> ClientResult<SessionContext> {
        let (name, email) = session::validate_registration(name, email, password)?;
        let auth_session = self.auth.register(&email, password).await?;
        self.attach_token(Some(&auth_session.id_token));

        let record = json!({
            "name": name,
            "email": email,
            "createdAt": Utc::now(),
        });
        self.store
            .write(&format!("users/{}", auth_session.user_id), &record)
            .await
            .map_err(ClientError::RemoteWrite)?;

        SessionContext::establish(&self.store, auth_session.user_id, auth_session.id_token).await
    }

    /// Signs into an existing account and opens a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<SessionContext> {
        let email = session::validate_credentials(email, password)?;
        let auth_session = self.auth.sign_in(&email, password).await?;
        self.attach_token(Some(&auth_session.id_token));
        SessionContext::establish(&self.store, auth_session.user_id, auth_session.id_token).await
    }

    /// Reopens a session from a persisted user id and token, without a
    /// fresh sign-in.
    pub async fn resume(&self, user_id: &str, id_token: &str) -> ClientResult<SessionContext> {
        self.attach_token(Some(id_token));
        SessionContext::establish(&self.store, user_id.to_string(), id_token.to_string()).await
    }

    /// Ends a session: tears down its profile subscription, drops the
    /// backends' token and notifies the auth backend.
    pub async fn sign_out(&self, mut session: SessionContext) -> ClientResult<()> {
        session.close();
        self.attach_token(None);
        self.auth.sign_out().await?;
        Ok(())
    }

    fn attach_token(&self, token: Option<&str>) {
        self.store.set_auth_token(token);
        self.blobs.set_auth_token(token);
    }

    /// Opens the live feed of the signed-in user's complaints.
    pub async fn my_complaints(
        &self,
        session: Option<&SessionContext>,
    ) -> ClientResult<ComplaintFeed> {
        ComplaintFeed::open(&self.store, session).await
    }

    /// Opens the live community feed with the given ordering. No session
    /// is required to read it.
    pub async fn community_feed(&self, ordering: FeedOrdering) -> ClientResult<PostFeed<S>> {
        PostFeed::open(&self.store, ordering).await
    }

    /// Submits a complaint. Returns the store-assigned complaint id.
    pub async fn submit_complaint(
        &self,
        session: Option<&SessionContext>,
        draft: &ComplaintDraft,
    ) -> ClientResult<String> {
        submit::submit_complaint(&self.store, &self.blobs, session, draft).await
    }

    /// Submits a community post. Returns the store-assigned post id.
    pub async fn submit_post(
        &self,
        session: Option<&SessionContext>,
        draft: &PostDraft,
    ) -> ClientResult<String> {
        submit::submit_post(&self.store, &self.blobs, session, draft).await
    }

    /// Uploads a new profile image and points the user record at it.
    /// Returns the image URL.
    pub async fn update_profile_image(
        &self,
        session: Option<&SessionContext>,
        image: &ImageAttachment,
    ) -> ClientResult<String> {
        submit::update_profile_image(&self.store, &self.blobs, session, image).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use super::{ClientError, ComplaintDraft, FeedOrdering, FeedState, LoopInClient, PostDraft};
    use crate::backend::StoreEvent;
    use crate::backend::testing::{FakeAuth, FakeBlobs, FakeStore};
    use crate::error::AuthError;

    fn client() -> (
        LoopInClient<FakeAuth, FakeStore, FakeBlobs>,
        Arc<FakeStore>,
    ) {
        let client = LoopInClient::new(FakeAuth::new("user-1"), FakeStore::new(), FakeBlobs::new());
        let store = Arc::clone(&client.store);
        (client, store)
    }

    #[tokio::test]
    async fn register_creates_the_profile_record_and_a_session() {
        let (client, store) = client();

        let session = client
            .register("  Sam  ", "sam@example.com", "long-enough")
            .await
            .expect("registration must succeed");
        assert_eq!(session.user_id(), "user-1");
        assert_eq!(session.id_token(), "token-user-1");

        let writes = store.writes.lock().expect("writes mutex").clone();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "users/user-1");
        assert_eq!(writes[0].1["name"], json!("Sam"));
        assert_eq!(writes[0].1["email"], json!("sam@example.com"));
        assert!(writes[0].1.get("createdAt").is_some());

        assert_eq!(store.subscription_count("users/user-1"), 1);
    }

    #[tokio::test]
    async fn invalid_registration_never_reaches_the_auth_backend() {
        let (client, _store) = client();

        let err = client
            .register("Sam", "not-an-email", "long-enough")
            .await
            .expect_err("email must be rejected");
        assert!(matches!(err, ClientError::Validation { field: "email", .. }));
        assert!(client.auth.register_calls.lock().expect("calls mutex").is_empty());
    }

    #[tokio::test]
    async fn auth_failures_surface_with_a_user_message() {
        let (client, _store) = client();
        client.auth.fail_next(AuthError::EmailAlreadyInUse);

        let err = client
            .register("Sam", "sam@example.com", "long-enough")
            .await
            .expect_err("registration must fail");
        assert_eq!(
            err.user_message(),
            "This email is already registered. Please sign in or use a different email."
        );
    }

    #[tokio::test]
    async fn session_token_reaches_both_backends() {
        let client = LoopInClient::new(FakeAuth::new("user-1"), FakeStore::new(), FakeBlobs::new());
        let store = Arc::clone(&client.store);
        let blobs = Arc::clone(&client.blobs);
        assert_eq!(store.auth_token(), None);

        let session = client
            .sign_in("sam@example.com", "secret")
            .await
            .expect("sign-in must succeed");
        assert_eq!(store.auth_token(), Some("token-user-1".to_string()));
        assert_eq!(blobs.auth_token(), Some("token-user-1".to_string()));

        client
            .sign_out(session)
            .await
            .expect("sign-out must succeed");
        assert_eq!(store.auth_token(), None);
        assert_eq!(blobs.auth_token(), None);

        client
            .resume("user-1", "restored-token")
            .await
            .expect("resume must succeed");
        assert_eq!(store.auth_token(), Some("restored-token".to_string()));
        assert_eq!(blobs.auth_token(), Some("restored-token".to_string()));
    }

    #[tokio::test]
    async fn sign_in_normalizes_the_email() {
        let (client, _store) = client();

        client
            .sign_in("  sam@example.com ", "secret")
            .await
            .expect("sign-in must succeed");

        let calls = client.auth.sign_in_calls.lock().expect("calls mutex").clone();
        assert_eq!(calls, vec![("sam@example.com".to_string(), "secret".to_string())]);
    }

    #[tokio::test]
    async fn submitted_complaints_round_trip_through_the_feed() {
        let (client, store) = client();
        let session = client
            .sign_in("sam@example.com", "secret")
            .await
            .expect("sign-in must succeed");

        let draft = ComplaintDraft {
            title: "Pothole".to_string(),
            address: "Main St".to_string(),
            description: "Large pothole".to_string(),
            media: None,
        };
        let id = client
            .submit_complaint(Some(&session), &draft)
            .await
            .expect("submission must succeed");

        let feed = client
            .my_complaints(Some(&session))
            .await
            .expect("feed must open");
        let mut rx = feed.watch();

        // Replay the written record as the collection snapshot.
        let record = store.pushes.lock().expect("pushes mutex")[0].1.clone();
        store
            .emit(
                "users/user-1/complaints",
                StoreEvent::Snapshot(Some(json!({id.clone(): record}))),
            )
            .await;

        timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("feed update must arrive")
            .expect("watch channel must stay open");
        let state = rx.borrow().clone();
        let FeedState::Loaded(list) = state else {
            panic!("expected loaded state");
        };
        assert_eq!(list.total, 1);
        let complaint = &list.complaints[0];
        assert_eq!(complaint.id, id);
        assert_eq!(complaint.title, "Pothole");
        assert_eq!(complaint.address, "Main St");
        assert_eq!(complaint.description, "Large pothole");
        assert_eq!(complaint.user_id, "user-1");
        assert!(complaint.media.is_none());
    }

    #[tokio::test]
    async fn posts_carry_the_current_profile_name() {
        let (client, store) = client();
        let session = client
            .sign_in("sam@example.com", "secret")
            .await
            .expect("sign-in must succeed");

        let mut rx = session.watch_profile();
        store
            .emit(
                "users/user-1",
                StoreEvent::Snapshot(Some(json!({"name": "Sam", "email": "sam@example.com"}))),
            )
            .await;
        timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("profile update must arrive")
            .expect("watch channel must stay open");

        client
            .submit_post(
                Some(&session),
                &PostDraft {
                    text: "hello".to_string(),
                    image: None,
                },
            )
            .await
            .expect("post must succeed");

        let pushes = store.pushes.lock().expect("pushes mutex").clone();
        assert_eq!(pushes[0].1["userName"], json!("Sam"));
    }

    #[tokio::test]
    async fn community_feed_opens_without_a_session() {
        let (client, store) = client();
        let feed = client
            .community_feed(FeedOrdering::Newest)
            .await
            .expect("feed must open");

        assert_eq!(store.subscription_count("posts"), 1);
        assert_eq!(feed.current(), FeedState::Loading);
    }

    #[tokio::test]
    async fn sign_out_tears_the_session_down() {
        let (client, store) = client();
        let session = client
            .sign_in("sam@example.com", "secret")
            .await
            .expect("sign-in must succeed");

        client
            .sign_out(session)
            .await
            .expect("sign-out must succeed");

        // Late snapshots land nowhere.
        store
            .emit(
                "users/user-1",
                StoreEvent::Snapshot(Some(json!({"name": "Late", "email": ""}))),
            )
            .await;
    }
}
