//! Delivery activities
//!
//! The steps a workflow is composed of. Each one can be invoked more than
//! once for the same workflow and converges on the same outcome:
//!
//! - [`token`]: sign a time-boxed action token (invitations)
//! - [`content`]: render the message
//! - [`send`]: hand the message to the provider, at most once per send id
//! - [`persist`]: record the workflow's outcome and campaign counters
//!
//! [`run_activity`] enforces the start-to-close and heartbeat timeouts around
//! an invocation.

pub mod content;
pub mod persist;
pub mod send;
pub mod token;

use std::{future::Future, sync::Arc};

use herald_gateway::ProviderGateway;
use herald_store::{DeliveryRecordStore, EventStore, WorkflowStore};
use herald_tracking::{StatsAggregator, SuppressionRegistry};
use tokio::{
    sync::watch,
    time::{Instant, sleep, sleep_until},
};

pub use content::{ContentRenderer, PreparedContent};
pub use persist::Completion;
pub use send::SendOutcome;
pub use token::{TokenClaims, TokenError, TokenSigner};

use crate::{ActivityError, policy::ActivityOptions};

/// Everything the activities run against.
#[derive(Debug, Clone)]
pub struct Activities {
    pub gateway: ProviderGateway,
    pub suppressions: SuppressionRegistry,
    pub workflows: Arc<dyn WorkflowStore>,
    pub deliveries: Arc<dyn DeliveryRecordStore>,
    pub events: Arc<dyn EventStore>,
    pub stats: Arc<StatsAggregator>,
    pub tokens: TokenSigner,
    pub content: ContentRenderer,
}

/// Handed to a running activity to prove it is still making progress.
#[derive(Debug)]
pub struct Heartbeat(watch::Sender<Instant>);

impl Heartbeat {
    pub fn beat(&self) {
        self.0.send_replace(Instant::now());
    }
}

/// Run one activity invocation under `options`.
///
/// Exceeding either timeout fails the invocation as
/// [`ActivityError::Transient`], so the retry policy gets another go.
///
/// # Errors
///
/// The activity's own error, or a timeout.
pub async fn run_activity<T, F, Fut>(
    name: &str,
    options: &ActivityOptions,
    activity: F,
) -> Result<T, ActivityError>
where
    F: FnOnce(Heartbeat) -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let (sender, mut heartbeats) = watch::channel(Instant::now());
    let future = activity(Heartbeat(sender));
    tokio::pin!(future);

    let deadline = sleep(options.start_to_close());
    tokio::pin!(deadline);

    let heartbeat_timeout = options.heartbeat_timeout();
    let mut heartbeat_deadline = Instant::now() + heartbeat_timeout;
    let mut heartbeats_open = true;

    loop {
        tokio::select! {
            result = &mut future => return result,
            () = &mut deadline => {
                return Err(ActivityError::Transient(format!(
                    "{name} did not finish within {}s",
                    options.start_to_close_secs
                )));
            }
            () = sleep_until(heartbeat_deadline) => {
                return Err(ActivityError::Transient(format!(
                    "{name} missed its heartbeat for {}s",
                    options.heartbeat_timeout_secs
                )));
            }
            changed = heartbeats.changed(), if heartbeats_open => match changed {
                Ok(()) => heartbeat_deadline = *heartbeats.borrow_and_update() + heartbeat_timeout,
                Err(_) => heartbeats_open = false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn options() -> ActivityOptions {
        ActivityOptions {
            start_to_close_secs: 300,
            heartbeat_timeout_secs: 60,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_activity_returns_result() {
        let result = run_activity("quick", &options(), |_| async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_activity_misses_heartbeat() {
        let start = Instant::now();
        let result: Result<(), _> = run_activity("hung", &options(), |_heartbeat| async {
            std::future::pending::<()>().await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ActivityError::Transient(_))));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_extend_until_start_to_close() {
        let start = Instant::now();
        let result: Result<(), _> = run_activity("chatty", &options(), |heartbeat| async move {
            for _ in 0..100 {
                heartbeat.beat();
                sleep(Duration::from_secs(30)).await;
            }
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("did not finish"), "{err}");
        assert_eq!(start.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_pass_through() {
        let result: Result<(), _> = run_activity("failing", &options(), |_| async {
            Err(ActivityError::Terminal("rejected".to_string()))
        })
        .await;

        assert_eq!(result, Err(ActivityError::Terminal("rejected".to_string())));
    }
}
