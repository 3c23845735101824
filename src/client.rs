//! HTTP client for the write path and the history bulk load.

use std::time::Duration;

use crate::error::ChatError;
use crate::message::Message;

/// Talks to a chat server rooted at `base_url`.
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the server's event stream.
    pub fn events_url(&self) -> String {
        format!("{}/events", self.base_url)
    }

    /// Submit a message as a form post.
    ///
    /// # Returns
    /// - `Ok(())` on a 2xx response.
    /// - `Err(ChatError::Connect)` when the server cannot be reached.
    /// - `Err(ChatError::Http)` on any other status, including 422 for a
    ///   message that failed validation.
    pub async fn post_message(&self, message: &Message) -> Result<(), ChatError> {
        let url = format!("{}/message", self.base_url);
        let resp = self
            .client
            .post(&url)
            .form(message)
            .send()
            .await
            .map_err(|e| ChatError::Connect {
                url: url.clone(),
                detail: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChatError::Http {
                status: resp.status().as_u16(),
                url,
            });
        }
        Ok(())
    }

    /// Fetch the stored message history.
    pub async fn load_history(&self) -> Result<Vec<Message>, ChatError> {
        let url = format!("{}/messages.json", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::Connect {
                url: url.clone(),
                detail: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChatError::Http {
                status: resp.status().as_u16(),
                url,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChatError::Stream(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
