use std::fmt::Debug;

use async_trait::async_trait;
use herald_common::{ids::ProviderMessageId, send::Tag};
use serde::Serialize;

use crate::GatewayError;

/// A fully prepared message, ready for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub tags: Vec<Tag>,
}

/// Proof of acceptance by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider: String,
    pub message_id: ProviderMessageId,
}

/// A transactional email API.
///
/// Implementations classify their own failures; they never panic.
#[async_trait]
pub trait EmailProvider: Send + Sync + Debug {
    /// Name recorded on delivery records and used to route webhooks.
    fn name(&self) -> &str;

    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, GatewayError>;
}
