use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::{AuthBackend, AuthSession};
use crate::error::AuthError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct CredentialsDto<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
struct SessionDto {
    #[serde(rename = "localId")]
    local_id: String,
    #[serde(rename = "idToken")]
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBodyDto {
    error: Option<ErrorDetailDto>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetailDto {
    message: Option<String>,
}

/// Email/password authentication against the identity REST endpoint.
#[derive(Debug, Clone)]
pub struct HttpAuth {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpAuth {
    /// Creates an auth client for the given identity endpoint and
    /// project API key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client,
        }
    }

    fn endpoint(&self, operation: &str) -> String {
        format!(
            "{}/accounts:{operation}",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn call(&self, operation: &str, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let payload = CredentialsDto {
            email,
            password,
            return_secure_token: true,
        };

        let response = self
            .client
            .post(self.endpoint(operation))
            .query(&[("key", &self.api_key)])
            .json(&payload)
            .send()
            .await
            .map_err(|err| AuthError::Other(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let dto = response
            .json::<SessionDto>()
            .await
            .map_err(|err| AuthError::Other(err.to_string()))?;
        Ok(AuthSession {
            user_id: dto.local_id,
            id_token: dto.id_token,
        })
    }

    async fn decode_error(response: reqwest::Response) -> AuthError {
        let status = response.status();
        let code = match response.json::<ErrorBodyDto>().await {
            Ok(body) => body
                .error
                .and_then(|detail| detail.message)
                .unwrap_or_else(|| format!("HTTP_{status}")),
            Err(_) => format!("HTTP_{status}"),
        };
        map_backend_code(&code)
    }
}

/// Maps the backend's error codes onto the `AuthError` taxonomy. Codes
/// may carry a trailing explanation ("WEAK_PASSWORD : ...").
fn map_backend_code(code: &str) -> AuthError {
    let bare = code.split(':').next().unwrap_or(code).trim();
    match bare {
        "EMAIL_EXISTS" => AuthError::EmailAlreadyInUse,
        "EMAIL_NOT_FOUND" => AuthError::UserNotFound,
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => AuthError::WrongCredential,
        "USER_DISABLED" => AuthError::DisabledAccount,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyRequests,
        "WEAK_PASSWORD" => AuthError::WeakPassword,
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail,
        _ => AuthError::Other(code.to_string()),
    }
}

#[async_trait]
impl AuthBackend for HttpAuth {
    async fn register(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.call("signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.call("signInWithPassword", email, password).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // The identity service keeps no server-side session; discarding
        // the token locally is all there is to do.
        Ok(())
    }
}
