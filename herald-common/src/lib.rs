pub mod address;
pub mod audit;
pub mod config;
pub mod event;
pub mod ids;
pub mod logging;
pub mod record;
pub mod send;
pub mod suppression;
pub mod workflow;

pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
