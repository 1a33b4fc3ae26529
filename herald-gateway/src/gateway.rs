use std::{sync::Arc, time::Instant};

use herald_common::{address, outgoing, send::Tag};

use crate::{
    EmailProvider, GatewayError,
    html::{ensure_document, text_fallback},
    provider::{OutboundEmail, SendReceipt},
};

/// Entry point for every outbound provider call.
///
/// Validates and prepares the message, then hands it to the configured
/// provider. Built explicitly and passed to whoever needs it.
#[derive(Debug, Clone)]
pub struct ProviderGateway {
    provider: Arc<dyn EmailProvider>,
    default_from: Option<String>,
}

impl ProviderGateway {
    pub fn new(provider: Arc<dyn EmailProvider>) -> Self {
        Self {
            provider,
            default_from: None,
        }
    }

    /// Sender used when a request does not name one.
    #[must_use]
    pub fn with_default_from(mut self, from: impl Into<String>) -> Self {
        self.default_from = Some(from.into());
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] if a field is empty or an address is
    /// malformed, otherwise whatever the provider reports.
    pub async fn send(
        &self,
        to: &str,
        from: Option<&str>,
        subject: &str,
        html: &str,
        text: Option<&str>,
        tags: &[Tag],
    ) -> Result<SendReceipt, GatewayError> {
        let from = from
            .or(self.default_from.as_deref())
            .ok_or_else(|| GatewayError::Validation("No sender address".to_string()))?;

        require_non_empty("to", to)?;
        require_non_empty("from", from)?;
        require_non_empty("subject", subject)?;
        require_non_empty("html", html)?;

        address::validate(to)
            .map_err(|e| GatewayError::Validation(format!("Invalid recipient {to:?}: {e}")))?;
        address::validate(mailbox(from))
            .map_err(|e| GatewayError::Validation(format!("Invalid sender {from:?}: {e}")))?;

        if let Some(tag) = tags.iter().find(|tag| tag.name.trim().is_empty()) {
            return Err(GatewayError::Validation(format!(
                "Tag with empty name (value {:?})",
                tag.value
            )));
        }

        let html = ensure_document(html);
        let text = text
            .filter(|text| !text.trim().is_empty())
            .map_or_else(|| text_fallback(&html), ToString::to_string);

        let email = OutboundEmail {
            from: from.to_string(),
            to: to.trim().to_string(),
            subject: subject.to_string(),
            html: html.into_owned(),
            text,
            tags: tags.to_vec(),
        };

        let provider = self.provider.name();
        let start = Instant::now();
        let result = self.provider.send(&email).await;

        match &result {
            Ok(message_id) => outgoing!(
                level = DEBUG,
                provider = %provider,
                message_id = %message_id,
                elapsed_ms = start.elapsed().as_millis(),
                "Provider accepted message"
            ),
            Err(e) => outgoing!(
                level = WARN,
                provider = %provider,
                kind = e.kind(),
                error = %e,
                "Provider call failed"
            ),
        }

        result.map(|message_id| SendReceipt {
            provider: provider.to_string(),
            message_id,
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        Err(GatewayError::Validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

/// The address part of `Display Name <addr>`, or the input as is.
fn mailbox(from: &str) -> &str {
    let from = from.trim();
    match (from.rfind('<'), from.ends_with('>')) {
        (Some(open), true) => &from[open + 1..from.len() - 1],
        _ => from,
    }
}
