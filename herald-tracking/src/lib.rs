//! Engagement tracking
//!
//! Provider callbacks are authenticated, normalized into
//! [`EngagementEvent`](herald_common::event::EngagementEvent)s and applied to
//! the suppression registry, the campaign statistics and the delivery records.

pub mod config;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod signature;
pub mod stats;
pub mod suppression;

pub use config::{ProviderWebhook, WebhookConfig};
pub use error::{AuthError, IngestError, NormalizeError, SuppressionError};
pub use ingest::{IngestOutcome, IngestionService, WebhookRequest};
pub use signature::SignatureVerifier;
pub use stats::{CampaignRates, CampaignStats, StatsAggregator};
pub use suppression::SuppressionRegistry;
