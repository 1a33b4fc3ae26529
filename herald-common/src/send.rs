//! Send requests as submitted by callers

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BatchCorrelator, SendId, TenantId};

/// Tag name carrying the send id on outbound mail.
pub const SEND_ID_TAG: &str = "send_id";

/// Tag name carrying the tenant id on outbound mail.
pub const TENANT_ID_TAG: &str = "tenant_id";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A free-form `{name, value}` pair attached to outbound mail.
///
/// Providers echo tags back on every webhook, which is how events find their
/// way home to a send and a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Body of a message, either final or still to be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageContent {
    Rendered {
        html: String,
        #[serde(default)]
        text: Option<String>,
    },
    Template {
        html: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        variables: BTreeMap<String, String>,
    },
}

impl MessageContent {
    pub fn rendered(html: impl Into<String>) -> Self {
        Self::Rendered {
            html: html.into(),
            text: None,
        }
    }

    #[must_use]
    pub const fn is_template(&self) -> bool {
        matches!(self, Self::Template { .. })
    }

    /// Add a variable to a template. Rendered content is left as is.
    pub fn insert_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if let Self::Template { variables, .. } = self {
            variables.insert(name.into(), value.into());
        }
    }
}

/// One logical request to deliver one message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub id: SendId,
    pub tenant: TenantId,
    pub to: String,
    #[serde(default)]
    pub from: Option<String>,
    pub subject: String,
    pub content: MessageContent,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl SendRequest {
    /// The campaign correlator carried in this request's tags, if any.
    #[must_use]
    pub fn correlator(&self) -> Option<BatchCorrelator> {
        self.tags
            .iter()
            .find(|tag| BatchCorrelator::is_tag_name(&tag.name))
            .and_then(|tag| tag.value.parse().ok())
    }

    /// Set a tag, replacing any existing tag with the same name.
    pub fn set_tag(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(tag) = self.tags.iter_mut().find(|tag| tag.name == name) {
            tag.value = value;
        } else {
            self.tags.push(Tag::new(name, value));
        }
    }

    /// Tags sent to the provider: caller tags plus the correlation tags.
    #[must_use]
    pub fn outbound_tags(&self) -> Vec<Tag> {
        let mut tags = self.tags.clone();
        for (name, value) in [
            (SEND_ID_TAG, self.id.as_str()),
            (TENANT_ID_TAG, self.tenant.as_str()),
        ] {
            if !tags.iter().any(|tag| tag.name == name) {
                tags.push(Tag::new(name, value));
            }
        }
        tags
    }
}
