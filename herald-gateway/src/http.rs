//! Generic JSON-over-HTTP transactional email API
//!
//! `POST {base_url}/emails` with a bearer API key:
//!
//! ```json
//! {"from": "...", "to": "...", "subject": "...", "html": "...", "text": "...",
//!  "tags": [{"name": "group_uuid", "value": "01J..."}]}
//! ```
//!
//! A 2xx response carries `{"id": "<provider message id>"}`.

use std::time::Duration;

use async_trait::async_trait;
use herald_common::ids::ProviderMessageId;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{EmailProvider, GatewayError, OutboundEmail};

/// Longest provider error body echoed into an error message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Clone)]
pub struct HttpProvider {
    name: String,
    endpoint: String,
    api_key: String,
    client: Client,
}

impl HttpProvider {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (e.g. no TLS backend).
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            name: name.into(),
            endpoint: format!("{}/emails", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Map a non-success status to an error kind.
fn classify(status: StatusCode, body: &str) -> GatewayError {
    let mut body = body.trim().to_string();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }

    let message = format!("HTTP {status}: {body}");

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        GatewayError::Transient(message)
    } else {
        GatewayError::Terminal(message)
    }
}

#[async_trait]
impl EmailProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        let body: SendResponse = response.json().await.map_err(|e| {
            GatewayError::Transient(format!("Unreadable provider response: {e}"))
        })?;

        if body.id.trim().is_empty() {
            return Err(GatewayError::Transient(
                "Provider response has an empty id".to_string(),
            ));
        }

        Ok(ProviderMessageId::new(body.id))
    }
}
