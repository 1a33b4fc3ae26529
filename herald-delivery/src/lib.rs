//! Durable send workflows
//!
//! This crate provides:
//! - The delivery activities a send is composed of (token, content, send,
//!   persist)
//! - Retry and timeout policies wrapped around every activity
//! - The [`Orchestrator`], which runs one persisted workflow per send and
//!   resumes unfinished ones after a restart

pub mod activities;
mod config;
mod error;
pub mod policy;
pub mod workflow;

pub use activities::{Activities, ContentRenderer, TokenSigner};
pub use config::DeliveryConfig;
pub use error::{ActivityError, WorkflowError};
pub use policy::{ActivityOptions, RetryPolicy};
pub use workflow::{
    CampaignCancellation, CampaignDispatch, CampaignRecipient, CampaignRequest, CancelOutcome,
    InvitationRequest, Orchestrator, WorkflowHandle,
};
