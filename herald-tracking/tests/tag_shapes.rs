//! Every tag shape a provider may use must decode to the same correlator.

use chrono::Utc;
use herald_common::ids::BatchCorrelator;
use herald_tracking::{
    StatsAggregator,
    normalize::{Normalized, normalize, tags},
};
use proptest::prelude::*;
use serde_json::{Value, json};

fn correlator_from(bits: u128) -> BatchCorrelator {
    ulid::Ulid::from(bits)
        .to_string()
        .parse()
        .expect("a ULID string parses")
}

fn shapes(correlator: &str) -> Vec<Value> {
    vec![
        json!([format!("group_uuid:{correlator}")]),
        json!([format!("group_uuid={correlator}")]),
        json!([correlator]),
        json!([{"name": "group_uuid", "value": correlator}]),
        json!({"group_uuid": correlator}),
    ]
}

proptest! {
    #[test]
    fn all_tag_shapes_agree(bits in any::<u128>(), other in "[a-z]{1,12}") {
        let correlator = correlator_from(bits);
        let text = correlator.to_string();

        for shape in shapes(&text) {
            let decoded = herald_tracking::normalize::correlator(&tags(&shape));
            prop_assert_eq!(decoded, Some(correlator), "shape {}", shape);
        }

        // Unrelated tags next to the correlator do not change the result
        let mixed = json!([format!("{other}:x"), {"name": "group_uuid", "value": text}]);
        prop_assert_eq!(
            herald_tracking::normalize::correlator(&tags(&mixed)),
            Some(correlator)
        );
    }

    #[test]
    fn unique_opens_never_exceed_sent(
        events in prop::collection::vec((0usize..3, 0usize..6), 0..60)
    ) {
        let stats = StatsAggregator::new();
        let campaign = BatchCorrelator::generate();

        for (i, (kind, recipient)) in events.iter().enumerate() {
            let event_type = ["delivered", "opened", "clicked"][*kind];
            let payload = json!({
                "type": event_type,
                "id": format!("evt-{i}"),
                "data": {
                    "to": format!("user{recipient}@example.com"),
                    "tags": {"group_uuid": campaign.to_string()},
                }
            });

            if let Ok(Normalized::Event(event)) = normalize("test", &payload, None, Utc::now()) {
                stats.apply(&event);
            }
        }

        if let Some(summary) = stats.stats(&campaign) {
            prop_assert!(summary.unique_opens <= summary.sent);
            prop_assert!(summary.unique_clicks <= summary.unique_opens);
            prop_assert!(summary.delivered <= summary.sent);
        }
    }
}
