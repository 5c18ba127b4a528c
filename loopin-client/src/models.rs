use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Profile fields of the current account, as stored under `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name chosen at registration.
    pub name: String,
    /// Account email.
    pub email: String,
    /// Account creation time, if the record carries one.
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Profile image URL, if one has been uploaded.
    #[serde(rename = "profileImage", default)]
    pub profile_image: Option<String>,
}

impl UserProfile {
    /// Fallback profile used while the user record is missing or failed
    /// to load.
    pub fn placeholder() -> Self {
        Self {
            name: "Anonymous User".to_string(),
            email: String::new(),
            created_at: None,
            profile_image: None,
        }
    }
}

/// Kind of media attached to a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A still image.
    Photo,
    /// A video clip.
    Video,
}

/// Durable reference to an uploaded media object: URL plus kind, always
/// carried as a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Download URL resolved by the blob store.
    pub url: String,
    /// Photo or video.
    pub kind: MediaKind,
}

/// Review status of a complaint. Assigned `New` at submission; every
/// later transition is performed by an administrative process, never by
/// this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplaintStatus {
    /// Just submitted, not yet reviewed.
    New,
    /// Under review.
    InProgress,
    /// Review finished, accepted.
    Resolved,
    /// Review finished, declined.
    Rejected,
}

/// A complaint as read back from `users/{uid}/complaints/{id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Complaint {
    /// Store-assigned identifier.
    pub id: String,
    /// Owning user identifier.
    pub user_id: String,
    /// Short summary.
    pub title: String,
    /// Street address of the reported issue.
    pub address: String,
    /// Free-form description.
    pub description: String,
    /// Attached evidence, if the upload succeeded.
    pub media: Option<MediaRef>,
    /// Review status (read-only on this client).
    pub status: ComplaintStatus,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

/// A community post as read back from `posts/{id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    /// Store-assigned identifier.
    pub id: String,
    /// Owning user identifier.
    pub user_id: String,
    /// Author display name, denormalized at post-creation time and never
    /// retroactively updated.
    pub user_name: String,
    /// Text body.
    pub text: String,
    /// Attached image URL, if any.
    pub image_url: Option<String>,
    /// Server-assigned creation time. `None` only for records written
    /// before the server resolved the timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    /// Like count. Non-decreasing from this client's perspective.
    pub likes: u64,
    /// Comment count.
    pub comments: u64,
    /// Share count. Read-only; never written by this client.
    pub shares: u64,
}

/// Wire shape of a complaint record. Field names match the persisted
/// store layout exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ComplaintRecord {
    pub(crate) title: String,
    pub(crate) address: String,
    pub(crate) description: String,
    #[serde(rename = "mediaURL", default)]
    pub(crate) media_url: Option<String>,
    #[serde(rename = "mediaType", default)]
    pub(crate) media_type: Option<MediaKind>,
    #[serde(rename = "createdAt")]
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) status: ComplaintStatus,
    #[serde(rename = "userId")]
    pub(crate) user_id: String,
}

impl ComplaintRecord {
    pub(crate) fn into_complaint(self, id: String) -> Complaint {
        // URL and kind are meaningful only as a pair.
        let media = match (self.media_url, self.media_type) {
            (Some(url), Some(kind)) => Some(MediaRef { url, kind }),
            _ => None,
        };
        Complaint {
            id,
            user_id: self.user_id,
            title: self.title,
            address: self.address,
            description: self.description,
            media,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Wire shape of a post record.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PostRecord {
    pub(crate) uid: String,
    #[serde(rename = "userName")]
    pub(crate) user_name: String,
    pub(crate) text: String,
    #[serde(rename = "imageUrl", default)]
    pub(crate) image_url: Option<String>,
    /// Milliseconds since the epoch, assigned by the server.
    #[serde(default)]
    pub(crate) timestamp: Option<i64>,
    #[serde(default)]
    pub(crate) likes: u64,
    #[serde(default)]
    pub(crate) comments: u64,
    #[serde(default)]
    pub(crate) shares: u64,
}

impl PostRecord {
    pub(crate) fn into_post(self, id: String) -> Post {
        let timestamp = self
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        Post {
            id,
            user_id: self.uid,
            user_name: self.user_name,
            text: self.text,
            image_url: self.image_url,
            timestamp,
            likes: self.likes,
            comments: self.comments,
            shares: self.shares,
        }
    }
}
