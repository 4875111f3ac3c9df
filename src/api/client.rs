//! API client for the remote user-directory REST service.
//!
//! The default service is the jsonplaceholder demo endpoint, which accepts
//! writes and echoes them back with a server-assigned id without persisting
//! anything. The client treats it as an opaque collaborator.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::Config;
use crate::models::{User, UserDraft};

use super::ApiError;

/// API client for the user directory.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client from configuration.
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the full user list.
    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let url = format!("{}/users", self.base_url);
        debug!(url = %url, "Fetching user list");

        let response = self.client.get(&url).send().await?;
        let response = Self::check_response(response).await?;

        // Decode strictly into the User shape; anything else is a decode
        // failure at the boundary, not an unchecked payload passed inward.
        let body = response.text().await?;
        let users: Vec<User> = serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("user list: {}", e)))?;

        debug!(count = users.len(), "Fetched user list");
        Ok(users)
    }

    /// Create a user, returning the canonical record with the
    /// server-assigned id.
    pub async fn create_user(&self, draft: &UserDraft) -> Result<User, ApiError> {
        let url = format!("{}/users", self.base_url);
        debug!(url = %url, name = %draft.name, "Creating user");

        let response = self.client.post(&url).json(draft).send().await?;
        let response = Self::check_response(response).await?;

        let body = response.text().await?;
        let user: User = serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("created user: {}", e)))?;

        debug!(id = user.id, "User created");
        Ok(user)
    }

    /// Check if a response is successful, mapping failures to the error
    /// taxonomy with the (truncated) body attached.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}
