use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Could not decode response: {0}")]
    Decode(String),

    #[error("Request rejected by service: {0}")]
    Validation(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data.
    /// Cuts on a char boundary; bodies are not guaranteed to be ASCII.
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut cut = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..cut],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400..=499 => ApiError::Validation(format!("Status {}: {}", status, truncated)),
            500..=599 => ApiError::Server(truncated),
            _ => ApiError::Decode(format!("Unexpected status {}: {}", status, truncated)),
        }
    }
}
