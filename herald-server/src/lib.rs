//! HTTP surface for herald
//!
//! # Endpoints
//!
//! - **`POST /webhooks/{provider}`** - Signed provider callbacks
//! - **`/sends`**, **`/campaigns`**, **`/invitations`** - Start, inspect and cancel workflows
//! - **`/suppressions`** - List, add and lift suppressed addresses
//! - **`GET /campaigns/{correlator}/stats`** - Campaign engagement
//! - **`/health/live`**, **`/health/ready`** - Liveness and readiness probes
//!
//! # Usage
//!
//! ```rust,no_run
//! use herald_server::{ApiServer, AppState, ServerConfig};
//!
//! # async fn example(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
//! let server = ApiServer::new(&ServerConfig::default(), state).await?;
//!
//! // server.serve(shutdown_receiver).await?;
//! # Ok(())
//! # }
//! ```

mod checker;
mod config;
mod error;
pub mod routes;
mod server;

pub use checker::{HealthChecker, HealthStatus};
pub use config::ServerConfig;
pub use error::{ApiError, ServerError};
pub use routes::{AppState, router};
pub use server::ApiServer;
