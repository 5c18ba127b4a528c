use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::backend::{BlobStore, RealtimeStore};
use crate::error::{ClientError, ClientResult, StoreError};
use crate::models::{ComplaintRecord, ComplaintStatus, MediaKind};
use crate::session::SessionContext;

/// Media evidence attached to a complaint draft.
#[derive(Debug, Clone)]
pub struct MediaAttachment {
    /// Raw media bytes.
    pub bytes: Bytes,
    /// MIME type of the payload.
    pub content_type: String,
    /// Photo or video.
    pub kind: MediaKind,
    /// File extension preserved in the uploaded object name.
    pub file_extension: String,
}

/// Complaint form payload. Borrowed by the pipeline, so a failed attempt
/// leaves the draft intact for retry.
#[derive(Debug, Clone, Default)]
pub struct ComplaintDraft {
    /// Short summary. Required.
    pub title: String,
    /// Street address. Required.
    pub address: String,
    /// Free-form description. Required.
    pub description: String,
    /// Optional evidence.
    pub media: Option<MediaAttachment>,
}

/// Image attached to a post draft or a profile update.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    /// Raw image bytes.
    pub bytes: Bytes,
    /// MIME type of the payload.
    pub content_type: String,
}

/// Post form payload.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    /// Text body. Required.
    pub text: String,
    /// Optional image.
    pub image: Option<ImageAttachment>,
}

fn require_session(session: Option<&SessionContext>) -> ClientResult<&SessionContext> {
    session.ok_or(ClientError::Unauthenticated)
}

fn encode<T: serde::Serialize>(record: &T) -> ClientResult<Value> {
    serde_json::to_value(record).map_err(|err| ClientError::RemoteWrite(StoreError::Decode(err)))
}

/// Uploads an attachment and resolves its durable URL. Failures degrade:
/// the submission continues without media so a connectivity hiccup on
/// the attachment does not discard the typed content.
async fn upload_degraded<B: BlobStore>(
    blobs: &Arc<B>,
    path: String,
    bytes: Bytes,
    content_type: &str,
) -> Option<String> {
    let uploaded = blobs.upload(&path, bytes, content_type).await;
    let result = match uploaded {
        Ok(()) => blobs.download_url(&path).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(url) => Some(url),
        Err(err) => {
            warn!(%path, error = %err, "media upload failed, continuing without media");
            None
        }
    }
}

/// Submits a complaint: validate, check the session, upload the optional
/// media, write the record under `users/{uid}/complaints`. Returns the
/// store-assigned complaint id.
pub(crate) async fn submit_complaint<S: RealtimeStore, B: BlobStore>(
    store: &Arc<S>,
    blobs: &Arc<B>,
    session: Option<&SessionContext>,
    draft: &ComplaintDraft,
) -> ClientResult<String> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(ClientError::Validation {
            field: "title",
            message: "Please enter a title for your complaint",
        });
    }
    let address = draft.address.trim();
    if address.is_empty() {
        return Err(ClientError::Validation {
            field: "address",
            message: "Please enter an address",
        });
    }
    let description = draft.description.trim();
    if description.is_empty() {
        return Err(ClientError::Validation {
            field: "description",
            message: "Please enter a description",
        });
    }

    let session = require_session(session)?;

    let media = match &draft.media {
        Some(attachment) => {
            let path = format!(
                "complaints/{}.{}",
                Utc::now().timestamp_millis(),
                attachment.file_extension
            );
            upload_degraded(
                blobs,
                path,
                attachment.bytes.clone(),
                &attachment.content_type,
            )
            .await
            .map(|url| (url, attachment.kind))
        }
        None => None,
    };
    let (media_url, media_type) = match media {
        Some((url, kind)) => (Some(url), Some(kind)),
        None => (None, None),
    };

    let record = ComplaintRecord {
        title: title.to_string(),
        address: address.to_string(),
        description: description.to_string(),
        media_url,
        media_type,
        created_at: Utc::now(),
        status: ComplaintStatus::New,
        user_id: session.user_id().to_string(),
    };
    let value = encode(&record)?;

    let path = format!("users/{}/complaints", session.user_id());
    let id = store
        .push(&path, &value)
        .await
        .map_err(ClientError::RemoteWrite)?;
    info!(complaint = %id, "complaint submitted");
    Ok(id)
}

/// Submits a community post: validate, check the session, upload the
/// optional image, write the post to the global feed, then write the
/// back-reference under the user's own post list. Returns the
/// store-assigned post id.
///
/// If the back-reference write fails after the primary write succeeded
/// the attempt is reported as failed, but the primary record exists; a
/// "my posts" view can be reconstructed by filtering the global feed on
/// the owning uid.
pub(crate) async fn submit_post<S: RealtimeStore, B: BlobStore>(
    store: &Arc<S>,
    blobs: &Arc<B>,
    session: Option<&SessionContext>,
    draft: &PostDraft,
) -> ClientResult<String> {
    let text = draft.text.trim();
    if text.is_empty() {
        return Err(ClientError::Validation {
            field: "text",
            message: "Please enter some text for your post",
        });
    }

    let session = require_session(session)?;
    // Author name is denormalized into the post at write time and never
    // retroactively updated.
    let user_name = session.profile().name;

    let image_url = match &draft.image {
        Some(image) => {
            let path = format!(
                "post_images/{}_{}",
                session.user_id(),
                Utc::now().timestamp_millis()
            );
            upload_degraded(blobs, path, image.bytes.clone(), &image.content_type).await
        }
        None => None,
    };

    let value = json!({
        "uid": session.user_id(),
        "userName": user_name,
        "text": text,
        "imageUrl": image_url,
        // Resolved to the write time by the server.
        "timestamp": {".sv": "timestamp"},
        "likes": 0,
        "comments": 0
    });

    let id = store
        .push("posts", &value)
        .await
        .map_err(ClientError::RemoteWrite)?;

    let back_reference = format!("users/{}/posts/{id}", session.user_id());
    if let Err(err) = store.write(&back_reference, &json!(true)).await {
        warn!(post = %id, error = %err, "back-reference write failed after primary write");
        return Err(ClientError::RemoteWrite(err));
    }
    info!(post = %id, "post submitted");
    Ok(id)
}

/// Uploads a new profile image and patches the single `profileImage`
/// field on the user record. Returns the resolved URL. Unlike complaint
/// and post submission there is no text payload to salvage, so an upload
/// failure is terminal.
pub(crate) async fn update_profile_image<S: RealtimeStore, B: BlobStore>(
    store: &Arc<S>,
    blobs: &Arc<B>,
    session: Option<&SessionContext>,
    image: &ImageAttachment,
) -> ClientResult<String> {
    let session = require_session(session)?;

    let path = format!(
        "users/{}/profile_images/{}",
        session.user_id(),
        Utc::now().timestamp_millis()
    );
    blobs
        .upload(&path, image.bytes.clone(), &image.content_type)
        .await
        .map_err(ClientError::MediaUpload)?;
    let url = blobs
        .download_url(&path)
        .await
        .map_err(ClientError::MediaUpload)?;

    let mut fields = Map::new();
    fields.insert("profileImage".to_string(), json!(url));
    store
        .update(&format!("users/{}", session.user_id()), &fields)
        .await
        .map_err(ClientError::RemoteWrite)?;
    Ok(url)
}
