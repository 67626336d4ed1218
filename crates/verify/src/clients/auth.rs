//! OAuth2 password-grant client for the authorization server.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::TokenSource;
use crate::error::{VerifyError, VerifyResult};

/// Default token endpoint, matching the Keycloak test realm.
pub const DEFAULT_AUTH_URL: &str =
    "http://localhost:9080/auth/realms/test/protocol/openid-connect/token";

/// Resource-owner credentials used for the password grant.
///
/// `Debug` output never includes the password.
#[derive(Clone)]
pub struct Credentials {
    /// OAuth client id.
    pub client_id: String,
    /// Resource owner user name.
    pub username: String,
    /// Resource owner password.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Stand-in printed where a secret would appear in `Debug` output.
pub(crate) const REDACTED: &str = "<redacted>";

impl Default for Credentials {
    fn default() -> Self {
        Self {
            client_id: "my-fhir-client".to_string(),
            username: "testuser".to_string(),
            password: "testpass".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Fetches bearer tokens from the token endpoint.
#[derive(Debug, Clone)]
pub struct AuthClient {
    token_url: String,
    credentials: Credentials,
    session: Client,
}

impl AuthClient {
    /// Creates a client for `token_url`.
    pub fn new(token_url: &str, credentials: Credentials, timeout: Duration) -> VerifyResult<Self> {
        let session = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            token_url: token_url.to_string(),
            credentials,
            session,
        })
    }
}

#[async_trait]
impl TokenSource for AuthClient {
    async fn get_auth_token(&self) -> VerifyResult<String> {
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("grant_type", "password"),
        ];

        let response = self
            .session
            .post(&self.token_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        let token: TokenResponse = response.json().await?;

        let access_token = token
            .access_token
            .ok_or_else(|| VerifyError::UnexpectedResponse {
                endpoint: self.token_url.clone(),
                message: "token response has no access_token".to_string(),
            })?;
        debug!(user = %self.credentials.username, "Fetched access token");
        Ok(access_token)
    }
}
