//! Scripted provider for tests and local development

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use herald_common::ids::ProviderMessageId;
use parking_lot::Mutex;

use crate::{EmailProvider, GatewayError, OutboundEmail};

/// What the mock does on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Accept with a generated message id
    Accept,
    AcceptWithId(String),
    Transient(String),
    Terminal(String),
    /// Never respond, as a hung connection would
    Hang,
    /// Wait, then behave like the inner outcome
    Delay(Duration, Box<MockOutcome>),
}

/// Records every call and replays scripted outcomes in order. Once the script
/// runs out every call is accepted.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<MockOutcome>>,
    calls: Mutex<Vec<OutboundEmail>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::named("mock")
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcome for the next unscripted call.
    pub fn push(&self, outcome: MockOutcome) {
        self.script.lock().push_back(outcome);
    }

    #[must_use]
    pub fn with_script(self, outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        self.script.lock().extend(outcomes);
        self
    }

    /// Every message handed to the provider so far.
    pub fn calls(&self) -> Vec<OutboundEmail> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    async fn play(outcome: MockOutcome) -> Result<ProviderMessageId, GatewayError> {
        let mut outcome = outcome;
        loop {
            match outcome {
                MockOutcome::Accept => {
                    return Ok(ProviderMessageId::new(format!("mock-{}", ulid::Ulid::new())));
                }
                MockOutcome::AcceptWithId(id) => return Ok(ProviderMessageId::new(id)),
                MockOutcome::Transient(reason) => return Err(GatewayError::Transient(reason)),
                MockOutcome::Terminal(reason) => return Err(GatewayError::Terminal(reason)),
                MockOutcome::Hang => std::future::pending::<()>().await,
                MockOutcome::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    outcome = *inner;
                }
            }
        }
    }
}

#[async_trait]
impl EmailProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, GatewayError> {
        self.calls.lock().push(email.clone());
        let outcome = self.script.lock().pop_front().unwrap_or(MockOutcome::Accept);
        Self::play(outcome).await
    }
}
