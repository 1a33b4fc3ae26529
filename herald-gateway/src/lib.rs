//! Provider gateway
//!
//! The only place outbound mail leaves the system. [`ProviderGateway`] checks
//! and prepares a message, then hands it to an [`EmailProvider`].

pub mod config;
pub mod error;
pub mod gateway;
pub mod html;
pub mod http;
pub mod mock;
pub mod provider;

pub use config::{GatewayConfig, ProviderConfig};
pub use error::GatewayError;
pub use gateway::ProviderGateway;
pub use http::HttpProvider;
pub use mock::{MockOutcome, MockProvider};
pub use provider::{EmailProvider, OutboundEmail, SendReceipt};
