//! Provider payload normalization
//!
//! Providers disagree on almost every detail of their callbacks. This module
//! maps whatever arrives onto one [`EngagementEvent`]:
//!
//! - event fields at the top level or nested under `data`
//! - event types dotted (`email.opened`) or bare (`open`, `opened`)
//! - the recipient as a string, a list of strings, or a list of `{email}`
//! - tags as `name:value` / `name=value` strings or bare correlators, as
//!   `{name, value}` pairs, or as a flat `{name: value}` map
//!
//! An event without a provider event id is given one derived from its
//! content, so redeliveries of the same callback deduplicate.

use chrono::{DateTime, TimeZone, Utc};
use herald_common::{
    address,
    event::{EngagementEvent, EventType},
    ids::{BatchCorrelator, ProviderMessageId, SendId},
    send::SEND_ID_TAG,
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::NormalizeError;

const TYPE_KEYS: &[&str] = &["type", "event", "event_type", "eventType"];
const RECIPIENT_KEYS: &[&str] = &["to", "recipient", "email"];
const MESSAGE_ID_KEYS: &[&str] = &["email_id", "message_id", "messageId", "provider_message_id"];
const EVENT_ID_KEYS: &[&str] = &["event_id", "eventId"];
const TIMESTAMP_KEYS: &[&str] = &["created_at", "timestamp", "occurred_at"];
const TAG_KEYS: &[&str] = &["tags", "metadata"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Event(EngagementEvent),
    /// A well-formed callback for an event type that is not tracked.
    Skipped { event_type: String },
}

/// Map a raw event type name onto a known [`EventType`].
#[must_use]
pub fn event_type(raw: &str) -> Option<EventType> {
    let name = raw.rsplit('.').next().unwrap_or(raw).trim().to_ascii_lowercase();

    Some(match name.as_str() {
        "sent" | "send" | "processed" => EventType::Sent,
        "delivered" | "delivery" => EventType::Delivered,
        "opened" | "open" => EventType::Opened,
        "clicked" | "click" => EventType::Clicked,
        "bounced" | "bounce" => EventType::Bounced,
        "complained" | "complaint" | "spam_report" | "spamreport" => EventType::Complained,
        "suppressed" | "suppression" => EventType::Suppressed,
        "unsubscribed" | "unsubscribe" => EventType::Unsubscribed,
        _ => return None,
    })
}

/// Tags as `(name, value)` pairs, whichever shape they arrived in. A bare
/// correlator string becomes a `group_uuid` tag.
#[must_use]
pub fn tags(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Array(items) => items.iter().filter_map(tag_item).collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, value)| scalar(value).map(|value| (name.clone(), value)))
            .collect(),
        Value::String(s) => tag_string(s).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn tag_item(item: &Value) -> Option<(String, String)> {
    match item {
        Value::String(s) => tag_string(s),
        Value::Object(map) => {
            let name = map.get("name").and_then(Value::as_str)?;
            let value = map.get("value").and_then(scalar)?;
            Some((name.to_string(), value))
        }
        _ => None,
    }
}

fn tag_string(s: &str) -> Option<(String, String)> {
    let s = s.trim();
    if let Some((name, value)) = s.split_once([':', '=']) {
        return Some((name.trim().to_string(), value.trim().to_string()));
    }

    s.parse::<BatchCorrelator>()
        .ok()
        .map(|correlator| (BatchCorrelator::TAG.to_string(), correlator.to_string()))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The campaign correlator among `tags`, if any tag carries a valid one.
#[must_use]
pub fn correlator(tags: &[(String, String)]) -> Option<BatchCorrelator> {
    tags.iter()
        .filter(|(name, _)| BatchCorrelator::is_tag_name(name))
        .find_map(|(_, value)| value.parse().ok())
}

fn recipient(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items.iter().find_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map
                .get("email")
                .or_else(|| map.get("address"))
                .and_then(Value::as_str),
            _ => None,
        }),
        Value::Object(map) => map.get("email").and_then(Value::as_str),
        _ => None,
    }?;

    let email = address::normalize(raw);
    (!email.is_empty()).then_some(email)
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<i64>().ok().and_then(from_unix)),
        Value::Number(n) => n.as_i64().and_then(from_unix),
        _ => None,
    }
}

/// Unix seconds, or milliseconds for values too large to be seconds.
fn from_unix(value: i64) -> Option<DateTime<Utc>> {
    if value > 100_000_000_000 {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}

/// Field lookup across the nested `data` object and the top level.
struct Fields<'a> {
    root: &'a Map<String, Value>,
    data: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn new(root: &'a Map<String, Value>) -> Self {
        Self {
            root,
            data: root.get("data").and_then(Value::as_object),
        }
    }

    fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        self.data
            .into_iter()
            .chain(std::iter::once(self.root))
            .find_map(|map| keys.iter().find_map(|key| map.get(*key)))
            .filter(|value| !value.is_null())
    }

    fn str(&self, keys: &[&str]) -> Option<&'a str> {
        self.get(keys)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The provider message id. With a nested `data` object its `id` is the
    /// message id, and the top-level `id` belongs to the event.
    fn message_id(&self) -> Option<&'a str> {
        self.str(MESSAGE_ID_KEYS).or_else(|| {
            self.data
                .and_then(|data| data.get("id"))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        })
    }

    fn event_id(&self) -> Option<&'a str> {
        self.str(EVENT_ID_KEYS).or_else(|| {
            self.data
                .and(self.root.get("id"))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        })
    }

    fn bounce_hint(&self) -> Option<String> {
        self.get(&["bounce"])
            .and_then(|bounce| bounce.get("type"))
            .and_then(Value::as_str)
            .or_else(|| self.str(&["bounce_type", "bounceType", "bounce_classification"]))
            .map(ToString::to_string)
    }

    fn reason(&self) -> Option<String> {
        self.get(&["bounce"])
            .and_then(|bounce| bounce.get("message").or_else(|| bounce.get("subType")))
            .and_then(Value::as_str)
            .or_else(|| self.str(&["reason", "description", "diagnostic"]))
            .map(ToString::to_string)
    }
}

/// Stable id for a callback that carries none.
fn derived_event_id(
    event_type: EventType,
    message_id: Option<&str>,
    recipient: &str,
    timestamp: Option<&Value>,
) -> String {
    let timestamp = timestamp.map(ToString::to_string).unwrap_or_default();

    let mut hasher = Sha256::new();
    for part in [
        event_type.as_str(),
        message_id.unwrap_or_default(),
        recipient,
        timestamp.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    hex::encode(hasher.finalize())
}

/// Normalize one parsed callback.
///
/// `event_id` is the id from the transport (e.g. a `webhook-id` header) and
/// wins over anything in the body. `received_at` stands in for a missing or
/// unreadable event timestamp.
///
/// # Errors
///
/// [`NormalizeError`] if the payload is not an object, names no event type, or
/// a tracked event has no recipient.
pub fn normalize(
    provider: &str,
    payload: &Value,
    event_id: Option<&str>,
    received_at: DateTime<Utc>,
) -> Result<Normalized, NormalizeError> {
    let root = payload.as_object().ok_or(NormalizeError::NotAnObject)?;
    let fields = Fields::new(root);

    let raw_type = fields
        .str(TYPE_KEYS)
        .ok_or(NormalizeError::MissingEventType)?;

    let Some(event_type) = event_type(raw_type).filter(|t| t.is_handled()) else {
        return Ok(Normalized::Skipped {
            event_type: raw_type.to_string(),
        });
    };

    let recipient = fields
        .get(RECIPIENT_KEYS)
        .and_then(recipient)
        .ok_or_else(|| NormalizeError::MissingRecipient(event_type.to_string()))?;

    let tags = TAG_KEYS
        .iter()
        .filter_map(|key| fields.get(&[*key]))
        .flat_map(tags)
        .collect::<Vec<_>>();

    let message_id = fields.message_id();
    let raw_timestamp = fields.get(TIMESTAMP_KEYS);

    let event_id = event_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or_else(|| fields.event_id())
        .map_or_else(
            || derived_event_id(event_type, message_id, &recipient, raw_timestamp),
            ToString::to_string,
        );

    Ok(Normalized::Event(EngagementEvent {
        provider: provider.to_string(),
        event_id,
        event_type,
        occurred_at: raw_timestamp.and_then(timestamp).unwrap_or(received_at),
        provider_message_id: message_id.map(ProviderMessageId::new),
        correlator: correlator(&tags),
        send_id: tags
            .iter()
            .find(|(name, _)| name == SEND_ID_TAG)
            .map(|(_, value)| SendId::new(value.as_str())),
        bounce_hint: fields.bounce_hint(),
        reason: fields.reason(),
        recipient,
    }))
}

/// Parse and normalize a raw callback body.
///
/// # Errors
///
/// As [`normalize`], plus [`NormalizeError::Json`] for unreadable bodies.
pub fn normalize_body(
    provider: &str,
    body: &[u8],
    event_id: Option<&str>,
    received_at: DateTime<Utc>,
) -> Result<Normalized, NormalizeError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| NormalizeError::Json(e.to_string()))?;
    normalize(provider, &payload, event_id, received_at)
}
