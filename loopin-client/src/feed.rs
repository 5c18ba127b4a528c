use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::backend::{RealtimeStore, StoreEvent, Subscription};
use crate::error::{ClientError, ClientResult};
use crate::models::{Complaint, ComplaintRecord, Post, PostRecord};
use crate::session::SessionContext;

/// State published by a live feed. `Failed` is distinct from an empty
/// `Loaded` so the presentation layer can tell "no items" from "could
/// not load".
#[derive(Debug, Clone, PartialEq)]
pub enum FeedState<T> {
    /// Subscription open, first snapshot not yet delivered.
    Loading,
    /// Latest snapshot, normalized and ordered.
    Loaded(T),
    /// The subscription failed; no further updates will arrive.
    Failed(String),
}

/// Normalized complaint collection plus its derived total.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplaintList {
    /// Complaints, newest first.
    pub complaints: Vec<Complaint>,
    /// Total number of complaints in the snapshot.
    pub total: usize,
}

/// Client-side ordering of the community feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedOrdering {
    /// Newest first (the default).
    #[default]
    Newest,
    /// Most liked first.
    Trending,
}

fn drive<T, F>(
    mut subscription: Subscription,
    tx: Arc<watch::Sender<FeedState<T>>>,
    decode: F,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: Fn(Option<Value>) -> T + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            match event {
                StoreEvent::Snapshot(value) => {
                    tx.send_replace(FeedState::Loaded(decode(value)));
                }
                StoreEvent::Lost(message) => {
                    tx.send_replace(FeedState::Failed(message));
                    break;
                }
            }
        }
    })
}

/// Decodes a collection snapshot into typed records, attaching the
/// store-assigned child key as the record id. Children that fail to
/// decode are skipped, not fatal.
fn decode_children<R, T, F>(value: Option<Value>, convert: F) -> Vec<T>
where
    R: serde::de::DeserializeOwned,
    F: Fn(R, String) -> T,
{
    let Some(Value::Object(children)) = value else {
        return Vec::new();
    };
    children
        .into_iter()
        .filter_map(|(id, raw)| match serde_json::from_value::<R>(raw) {
            Ok(record) => Some(convert(record, id)),
            Err(err) => {
                warn!(child = %id, error = %err, "skipping malformed record");
                None
            }
        })
        .collect()
}

fn decode_complaints(value: Option<Value>) -> ComplaintList {
    let mut complaints: Vec<Complaint> =
        decode_children(value, |record: ComplaintRecord, id| record.into_complaint(id));
    // Newest first; ties broken by store id so equal timestamps keep a
    // stable order.
    complaints.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    let total = complaints.len();
    ComplaintList { complaints, total }
}

fn decode_posts(value: Option<Value>, ordering: FeedOrdering) -> Vec<Post> {
    let mut posts: Vec<Post> = decode_children(value, |record: PostRecord, id| record.into_post(id));
    match ordering {
        FeedOrdering::Newest => posts.sort_by(|a, b| {
            // Records whose server timestamp has not resolved yet sort
            // as newest.
            let key = |post: &Post| post.timestamp.map_or(i64::MAX, |t| t.timestamp_millis());
            key(b).cmp(&key(a)).then_with(|| b.id.cmp(&a.id))
        }),
        FeedOrdering::Trending => {
            posts.sort_by(|a, b| b.likes.cmp(&a.likes).then_with(|| b.id.cmp(&a.id)))
        }
    }
    posts
}

/// Live view of the signed-in user's own complaints
/// (`users/{uid}/complaints`).
#[derive(Debug)]
pub struct ComplaintFeed {
    state: Arc<watch::Sender<FeedState<ComplaintList>>>,
    driver: Option<JoinHandle<()>>,
}

impl ComplaintFeed {
    /// Opens the user-scoped subscription. Without a session this fails
    /// immediately with `Unauthenticated` and performs no remote call.
    pub(crate) async fn open<S: RealtimeStore>(
        store: &Arc<S>,
        session: Option<&SessionContext>,
    ) -> ClientResult<Self> {
        let session = session.ok_or(ClientError::Unauthenticated)?;
        let path = format!("users/{}/complaints", session.user_id());
        let subscription = store
            .subscribe(&path)
            .await
            .map_err(ClientError::Subscription)?;

        let state = Arc::new(watch::channel(FeedState::Loading).0);
        let driver = drive(subscription, Arc::clone(&state), decode_complaints);
        Ok(Self {
            state,
            driver: Some(driver),
        })
    }

    /// Latest published state.
    pub fn current(&self) -> FeedState<ComplaintList> {
        self.state.borrow().clone()
    }

    /// Watch channel of state changes.
    pub fn watch(&self) -> watch::Receiver<FeedState<ComplaintList>> {
        self.state.subscribe()
    }

    /// Detaches the subscription and stops further snapshot delivery.
    /// Snapshots not yet dequeued by the driver are discarded; one the
    /// driver was already decoding may still be published before the
    /// abort lands.
    pub fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Drop for ComplaintFeed {
    fn drop(&mut self) {
        self.close();
    }
}

/// Live view of the global community feed (`posts`), with the optimistic
/// like mutator.
#[derive(Debug)]
pub struct PostFeed<S> {
    store: Arc<S>,
    state: Arc<watch::Sender<FeedState<Vec<Post>>>>,
    driver: Option<JoinHandle<()>>,
}

impl<S: RealtimeStore> PostFeed<S> {
    /// Opens the global subscription. The feed is public: no session is
    /// required to read it.
    pub(crate) async fn open(store: &Arc<S>, ordering: FeedOrdering) -> ClientResult<Self> {
        let subscription = store
            .subscribe("posts")
            .await
            .map_err(ClientError::Subscription)?;

        let state = Arc::new(watch::channel(FeedState::Loading).0);
        let driver = drive(subscription, Arc::clone(&state), move |value| {
            decode_posts(value, ordering)
        });
        Ok(Self {
            store: Arc::clone(store),
            state,
            driver: Some(driver),
        })
    }

    /// Latest published state.
    pub fn current(&self) -> FeedState<Vec<Post>> {
        self.state.borrow().clone()
    }

    /// Watch channel of state changes.
    pub fn watch(&self) -> watch::Receiver<FeedState<Vec<Post>>> {
        self.state.subscribe()
    }

    /// Likes a post: the local count is incremented before this returns,
    /// the remote field write runs in the background (last-write-wins).
    ///
    /// A failed remote write is logged, not rolled back; the next
    /// authoritative snapshot supersedes the optimistic value. The
    /// returned handle resolves when the remote write finished, for
    /// callers that need completion. `None` when the post is not in the
    /// current list.
    pub fn like(&self, post_id: &str) -> Option<JoinHandle<()>> {
        let mut liked = None;
        self.state.send_modify(|state| {
            if let FeedState::Loaded(posts) = state
                && let Some(post) = posts.iter_mut().find(|post| post.id == post_id)
            {
                post.likes += 1;
                liked = Some(post.likes);
            }
        });
        let likes = liked?;

        let store = Arc::clone(&self.store);
        let path = format!("posts/{post_id}");
        Some(tokio::spawn(async move {
            let mut fields = Map::new();
            fields.insert("likes".to_string(), json!(likes));
            if let Err(err) = store.update(&path, &fields).await {
                warn!(%path, error = %err, "like write failed; next snapshot will reconcile");
            }
        }))
    }

}

impl<S> PostFeed<S> {
    /// Detaches the subscription and stops further snapshot delivery;
    /// a snapshot the driver was already decoding may still be published
    /// before the abort lands. In-flight like writes are not cancelled.
    pub fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl<S> Drop for PostFeed<S> {
    fn drop(&mut self) {
        self.close();
    }
}
