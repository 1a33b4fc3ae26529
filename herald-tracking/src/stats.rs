//! Per-campaign delivery statistics
//!
//! Each campaign keeps one set of recipient addresses per outcome. Counting
//! set members rather than events makes opens and clicks unique, and the
//! implications below keep the sets consistent whatever order events arrive
//! in:
//!
//! ```text
//! clicked => opened => sent
//! delivered | bounced | complained | suppressed => sent
//! ```

use std::collections::HashSet;

use dashmap::DashMap;
use herald_common::{
    address,
    event::{EngagementEvent, EventType},
    ids::BatchCorrelator,
};
use serde::Serialize;

#[derive(Debug, Default, Clone)]
struct Buckets {
    sent: HashSet<String>,
    delivered: HashSet<String>,
    opened: HashSet<String>,
    clicked: HashSet<String>,
    bounced: HashSet<String>,
    complained: HashSet<String>,
    suppressed: HashSet<String>,
    failed: HashSet<String>,
}

impl Buckets {
    fn record(&mut self, event_type: EventType, recipient: &str) {
        let insert = |set: &mut HashSet<String>| {
            if !set.contains(recipient) {
                set.insert(recipient.to_string());
            }
        };

        match event_type {
            EventType::Sent => insert(&mut self.sent),
            EventType::Delivered => insert(&mut self.delivered),
            EventType::Opened => insert(&mut self.opened),
            EventType::Clicked => {
                insert(&mut self.clicked);
                insert(&mut self.opened);
            }
            EventType::Bounced => insert(&mut self.bounced),
            EventType::Complained => insert(&mut self.complained),
            EventType::Suppressed => insert(&mut self.suppressed),
            EventType::Unsubscribed => return,
            // Never reached the provider
            EventType::Failed => {
                insert(&mut self.failed);
                return;
            }
        }

        insert(&mut self.sent);
    }
}

/// Rates as percentages with one decimal. `None` when the denominator is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRates {
    pub delivery_rate: Option<f64>,
    pub open_rate: Option<f64>,
    pub click_rate: Option<f64>,
    pub click_to_open_rate: Option<f64>,
    pub bounce_rate: Option<f64>,
    pub complaint_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStats {
    pub correlator: BatchCorrelator,
    pub sent: usize,
    pub delivered: usize,
    pub unique_opens: usize,
    pub unique_clicks: usize,
    pub bounced: usize,
    pub complained: usize,
    pub suppressed: usize,
    pub failed: usize,
    pub rates: CampaignRates,
}

#[allow(clippy::cast_precision_loss)]
fn percentage(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| (numerator as f64 * 1000.0 / denominator as f64).round() / 10.0)
}

impl CampaignStats {
    fn from_buckets(correlator: BatchCorrelator, buckets: &Buckets) -> Self {
        let sent = buckets.sent.len();
        let delivered = buckets.delivered.len();
        let unique_opens = buckets.opened.len();
        let unique_clicks = buckets.clicked.len();
        let bounced = buckets.bounced.len();
        let complained = buckets.complained.len();

        Self {
            correlator,
            sent,
            delivered,
            unique_opens,
            unique_clicks,
            bounced,
            complained,
            suppressed: buckets.suppressed.len(),
            failed: buckets.failed.len(),
            rates: CampaignRates {
                delivery_rate: percentage(delivered, sent),
                open_rate: percentage(unique_opens, delivered),
                click_rate: percentage(unique_clicks, delivered),
                click_to_open_rate: percentage(unique_clicks, unique_opens),
                bounce_rate: percentage(bounced, sent),
                complaint_rate: percentage(complained, sent),
            },
        }
    }
}

/// Campaign buckets, rebuilt from the event log at startup.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    campaigns: DashMap<BatchCorrelator, Buckets>,
}

impl StatsAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into its campaign. Events without a correlator are
    /// ignored. Returns whether a bucket was touched.
    pub fn apply(&self, event: &EngagementEvent) -> bool {
        let Some(correlator) = event.correlator else {
            return false;
        };
        if !event.event_type.is_handled() {
            return false;
        }

        self.campaigns
            .entry(correlator)
            .or_default()
            .record(event.event_type, &address::normalize(&event.recipient));
        true
    }

    /// Rebuild buckets from stored events, in order.
    pub fn replay<'a>(&self, events: impl IntoIterator<Item = &'a EngagementEvent>) -> usize {
        events.into_iter().filter(|event| self.apply(event)).count()
    }

    #[must_use]
    pub fn stats(&self, correlator: &BatchCorrelator) -> Option<CampaignStats> {
        self.campaigns
            .get(correlator)
            .map(|buckets| CampaignStats::from_buckets(*correlator, &buckets))
    }

    #[must_use]
    pub fn campaigns(&self) -> Vec<BatchCorrelator> {
        let mut campaigns: Vec<_> = self.campaigns.iter().map(|entry| *entry.key()).collect();
        campaigns.sort_unstable();
        campaigns
    }
}
