use thiserror::Error;

#[derive(Debug, Error)]
/// Errors reported by the authentication backend.
pub enum AuthError {
    /// The email address is malformed.
    #[error("invalid email address")]
    InvalidEmail,

    /// No account exists for the given email.
    #[error("user not found")]
    UserNotFound,

    /// The password (or email/password pair) is wrong.
    #[error("wrong credential")]
    WrongCredential,

    /// The account has been disabled by an administrator.
    #[error("account disabled")]
    DisabledAccount,

    /// The backend is rate-limiting sign-in attempts.
    #[error("too many requests")]
    TooManyRequests,

    /// Registration attempted with an email that already has an account.
    #[error("email already in use")]
    EmailAlreadyInUse,

    /// The backend rejected the password as too weak.
    #[error("weak password")]
    WeakPassword,

    /// Any other backend failure, kept as an opaque message.
    #[error("auth error: {0}")]
    Other(String),
}

impl AuthError {
    /// Human-readable message suitable for direct display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "Invalid email address",
            Self::UserNotFound => "No account found with this email",
            Self::WrongCredential => "Incorrect email or password",
            Self::DisabledAccount => "This account has been disabled",
            Self::TooManyRequests => "Too many attempts. Try again later",
            Self::EmailAlreadyInUse => {
                "This email is already registered. Please sign in or use a different email."
            }
            Self::WeakPassword => "Password should be at least 6 characters.",
            Self::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

#[derive(Debug, Error)]
/// Errors from the realtime structured store or the blob store.
pub enum StoreError {
    /// Transport-level failure (`reqwest`).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status returned by the remote service.
    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The remote payload could not be decoded.
    #[error("failed to decode remote payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors surfaced by the client workflows.
///
/// The taxonomy separates failures that abort a submission
/// (`Validation`, `Unauthenticated`, `RemoteWrite`) from the ones the
/// pipeline degrades through (`MediaUpload`, logged and swallowed inside
/// complaint/post submission).
#[derive(Debug, Error)]
pub enum ClientError {
    /// A required form field failed local validation. Never reaches the
    /// remote layer.
    #[error("validation failed for '{field}': {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Display-ready explanation.
        message: &'static str,
    },

    /// No user session exists for a user-scoped operation.
    #[error("not signed in")]
    Unauthenticated,

    /// The authentication backend rejected the operation.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A media upload failed. Terminal only for profile-image updates;
    /// complaint and post submission degrade instead.
    #[error("media upload failed: {0}")]
    MediaUpload(StoreError),

    /// A structured write failed. Terminal for the attempt; the caller's
    /// payload is preserved for retry.
    #[error("remote write failed: {0}")]
    RemoteWrite(StoreError),

    /// A subscription could not be established or was lost.
    #[error("subscription failed: {0}")]
    Subscription(StoreError),
}

impl ClientError {
    /// Human-readable message suitable for direct display. Raw error
    /// codes never surface here.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => (*message).to_string(),
            Self::Unauthenticated => "You must be logged in to do this".to_string(),
            Self::Auth(err) => err.user_message().to_string(),
            Self::MediaUpload(_) => {
                "Sorry, we couldn't upload your photo. Please try again.".to_string()
            }
            Self::RemoteWrite(_) => "Failed to submit. Please try again.".to_string(),
            Self::Subscription(_) => "Could not load. Please try again later.".to_string(),
        }
    }
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::{AuthError, ClientError};

    #[test]
    fn validation_message_is_shown_verbatim() {
        let err = ClientError::Validation {
            field: "title",
            message: "Please enter a title for your complaint",
        };
        assert_eq!(
            err.user_message(),
            "Please enter a title for your complaint"
        );
    }

    #[test]
    fn auth_errors_map_to_account_messages() {
        let err = ClientError::Auth(AuthError::UserNotFound);
        assert_eq!(err.user_message(), "No account found with this email");

        let err = ClientError::Auth(AuthError::Other("ADMIN_ONLY_OPERATION".to_string()));
        assert_eq!(
            err.user_message(),
            "An unexpected error occurred. Please try again."
        );
    }
}
