mod support;

use chrono::{Duration, Utc};
use herald_common::{
    ids::{BatchCorrelator, SendId},
    record::DeliveryStatus,
    suppression::Classification,
    workflow::WorkflowState,
};
use herald_store::{DeliveryRecordStore, SuppressionStore, WorkflowStore};
use herald_tracking::{AuthError, IngestError, IngestOutcome, WebhookRequest};
use pretty_assertions::assert_eq;
use support::{Harness, PROVIDER, payload};

#[tokio::test]
async fn test_open_updates_delivery_record() {
    let harness = Harness::new();
    harness
        .seed_sent("s1", "user@example.com", "msg-1", None)
        .await;

    let outcome = harness
        .deliver(&payload("email.opened", "evt-1", "user@example.com", "msg-1"))
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Processed);

    let record = harness.deliveries.get(&SendId::new("s1")).await.unwrap().unwrap();
    assert_eq!(record.open_count, 1);
    assert!(record.first_opened_at.is_some());
    assert_eq!(record.status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn test_redelivered_bounce_is_applied_once() {
    let harness = Harness::new();
    harness
        .seed_sent("s1", "user@example.com", "msg-1", None)
        .await;
    let body = payload("email.bounced", "evt-1", "user@example.com", "msg-1");

    assert_eq!(harness.deliver(&body).await.unwrap(), IngestOutcome::Processed);
    let entry_once = harness
        .suppressions
        .get("user@example.com")
        .await
        .unwrap()
        .unwrap();
    let record_once = harness.deliveries.get(&SendId::new("s1")).await.unwrap();

    assert_eq!(harness.deliver(&body).await.unwrap(), IngestOutcome::Duplicate);
    let entry_twice = harness
        .suppressions
        .get("user@example.com")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entry_twice.count, 1);
    assert_eq!(entry_twice, entry_once);
    assert_eq!(harness.deliveries.get(&SendId::new("s1")).await.unwrap(), record_once);
    assert_eq!(harness.events.len(), 1);
}

#[tokio::test]
async fn test_bounce_then_complaint() {
    let harness = Harness::new();
    harness
        .seed_sent("s1", "user@example.com", "msg-1", None)
        .await;

    harness
        .deliver(&payload("email.bounced", "evt-1", "user@example.com", "msg-1"))
        .await
        .unwrap();
    harness
        .deliver(&payload("email.complained", "evt-2", "USER@example.com", "msg-1"))
        .await
        .unwrap();

    let entries = harness.registry.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].classification, Classification::Complaint);
    assert_eq!(entries[0].count, 2);
    assert_eq!(entries[0].tenant_id.as_ref().map(|t| t.as_str()), Some("t1"));
}

#[tokio::test]
async fn test_unparseable_body_changes_nothing() {
    let harness = Harness::new();

    let err = harness.deliver("{\"type\": \"email.bounced\",").await.unwrap_err();
    assert!(err.is_parse(), "{err}");

    let err = harness.deliver(r#"{"data": {"to": "a@example.com"}}"#).await.unwrap_err();
    assert!(err.is_parse(), "{err}");

    assert!(harness.events.is_empty());
    assert!(harness.suppressions.is_empty());
}

#[tokio::test]
async fn test_bad_signature_never_reaches_normalization() {
    let harness = Harness::new();
    let body = payload("email.bounced", "evt-1", "user@example.com", "msg-1");
    let now = Utc::now();
    let timestamp = now.timestamp().to_string();

    let err = harness
        .service
        .ingest(
            WebhookRequest {
                provider: PROVIDER,
                timestamp: Some(&timestamp),
                signature: Some("v1=deadbeef"),
                event_id: None,
                body: body.as_bytes(),
            },
            now,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Auth(AuthError::InvalidSignature)));
    assert!(harness.events.is_empty());
    assert!(harness.suppressions.is_empty());
}

#[tokio::test]
async fn test_stale_timestamp_is_rejected() {
    let harness = Harness::new();
    let body = payload("email.opened", "evt-1", "user@example.com", "msg-1");
    let sent = Utc::now() - Duration::minutes(10);

    // Signed ten minutes ago, received now
    let signature = herald_tracking::SignatureVerifier::new(support::SECRET, 300)
        .sign(sent.timestamp(), body.as_bytes())
        .unwrap();
    let timestamp = sent.timestamp().to_string();

    let err = harness
        .service
        .ingest(
            WebhookRequest {
                provider: PROVIDER,
                timestamp: Some(&timestamp),
                signature: Some(&signature),
                event_id: None,
                body: body.as_bytes(),
            },
            Utc::now(),
        )
        .await
        .unwrap_err();

    assert!(err.is_auth());
}

#[tokio::test]
async fn test_unknown_provider_is_rejected() {
    let harness = Harness::new();
    let err = harness
        .service
        .ingest(
            WebhookRequest {
                provider: "someone-else",
                timestamp: None,
                signature: None,
                event_id: None,
                body: b"{}",
            },
            Utc::now(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Auth(AuthError::UnknownProvider(_))));
}

#[tokio::test]
async fn test_untracked_event_is_skipped() {
    let harness = Harness::new();
    let outcome = harness
        .deliver(&payload("email.delivery_delayed", "evt-1", "user@example.com", "msg-1"))
        .await
        .unwrap();

    assert_eq!(outcome, IngestOutcome::Skipped);
    assert!(harness.events.is_empty());
}

#[tokio::test]
async fn test_event_before_record_is_deferred_then_applied() {
    let harness = Harness::new();
    let body = payload("email.opened", "evt-1", "user@example.com", "msg-1");

    assert_eq!(harness.deliver(&body).await.unwrap(), IngestOutcome::Deferred);
    assert_eq!(harness.events.len(), 1);

    harness
        .seed_sent("s1", "user@example.com", "msg-1", None)
        .await;

    // The redelivery only retries the record mutation
    assert_eq!(harness.deliver(&body).await.unwrap(), IngestOutcome::Duplicate);
    assert_eq!(harness.deliver(&body).await.unwrap(), IngestOutcome::Duplicate);

    let record = harness.deliveries.get(&SendId::new("s1")).await.unwrap().unwrap();
    assert_eq!(record.open_count, 1);
}

#[tokio::test]
async fn test_bounce_redelivered_after_failed_suppression_write() {
    let harness = Harness::with_failing_suppression_write();
    let body = payload("email.bounced", "evt-1", "user@example.com", "msg-1");

    let first = harness.deliver(&body).await;
    assert!(matches!(first, Err(IngestError::Suppression(_))));
    assert_eq!(harness.events.len(), 1);
    assert!(!harness.registry.is_suppressed("user@example.com").await.unwrap());

    // The provider retries after the error response
    assert_eq!(harness.deliver(&body).await.unwrap(), IngestOutcome::Deferred);
    assert!(harness.registry.is_suppressed("user@example.com").await.unwrap());

    let entry = harness
        .suppressions
        .get("user@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.count, 1);
    assert_eq!(entry.classification, Classification::Hard);

    // Applied now; a further redelivery does not count the bounce again
    assert_eq!(harness.deliver(&body).await.unwrap(), IngestOutcome::Deferred);
    let entry = harness
        .suppressions
        .get("user@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.count, 1);
}

#[tokio::test]
async fn test_send_id_tag_locates_record() {
    let harness = Harness::new();
    harness
        .seed_sent("s7", "user@example.com", "msg-7", None)
        .await;

    let body = serde_json::json!({
        "type": "clicked",
        "to": "user@example.com",
        "tags": {"send_id": "s7"},
    })
    .to_string();

    assert_eq!(harness.deliver(&body).await.unwrap(), IngestOutcome::Processed);
    let record = harness.deliveries.get(&SendId::new("s7")).await.unwrap().unwrap();
    assert_eq!(record.click_count, 1);
}

#[tokio::test]
async fn test_one_bucket_per_correlator() {
    let harness = Harness::new();
    let campaign = BatchCorrelator::generate();

    for (i, recipient) in ["a@example.com", "b@example.com"].iter().enumerate() {
        let body = serde_json::json!({
            "type": "email.opened",
            "id": format!("evt-{i}"),
            "data": {
                "to": [recipient],
                "tags": [{"name": "group_uuid", "value": campaign.to_string()}],
            }
        })
        .to_string();
        harness.deliver(&body).await.unwrap();
    }

    assert_eq!(harness.stats.campaigns(), vec![campaign]);
    let stats = harness.stats.stats(&campaign).unwrap();
    assert_eq!(stats.unique_opens, 2);
    assert_eq!(stats.sent, 2);
}

#[tokio::test]
async fn test_provider_outcome_is_mirrored_onto_workflow() {
    let harness = Harness::new();
    harness
        .seed_sent("s1", "user@example.com", "msg-1", None)
        .await;

    harness
        .deliver(&payload("email.bounced", "evt-1", "user@example.com", "msg-1"))
        .await
        .unwrap();
    let workflow = harness.workflows.get(&SendId::new("s1")).await.unwrap().unwrap();
    assert_eq!(workflow.state, WorkflowState::Bounced);
    assert_eq!(
        workflow.result.as_ref().map(|result| result.state.clone()),
        Some(WorkflowState::Bounced)
    );

    // A late delivery report does not move the workflow backwards
    harness
        .deliver(&payload("email.delivered", "evt-2", "user@example.com", "msg-1"))
        .await
        .unwrap();
    let workflow = harness.workflows.get(&SendId::new("s1")).await.unwrap().unwrap();
    assert_eq!(workflow.state, WorkflowState::Bounced);
}
