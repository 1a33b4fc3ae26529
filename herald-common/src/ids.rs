//! Identifier newtypes
//!
//! Wraps the various string and ULID identifiers that flow through the system
//! so a tenant id can never be passed where a send id is expected.

use std::{
    fmt::{self, Display},
    ops::Deref,
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            #[must_use]
            pub fn new(s: impl Into<Arc<str>>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Arc::from(s))
            }
        }
    };
}

string_id!(
    /// Caller supplied identifier of one logical send.
    ///
    /// The workflow driving a send is keyed by the same value, which is what
    /// makes starting a workflow idempotent.
    SendId
);

string_id!(
    /// Identifier of the tenant that requested a send.
    TenantId
);

string_id!(
    /// Message identifier assigned by the email provider on acceptance.
    ProviderMessageId
);

/// Workflows are keyed by the send they drive.
pub type WorkflowId = SendId;

/// Opaque identifier tying all per-recipient sends of one campaign together.
///
/// Minted fresh for every bulk dispatch, so a correlator is never shared by two
/// campaigns. ULIDs sort by creation time, which keeps listings stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchCorrelator(ulid::Ulid);

impl BatchCorrelator {
    /// Name of the provider tag that carries the correlator.
    pub const TAG: &'static str = "group_uuid";

    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.0
    }

    /// Whether a tag name refers to the correlator.
    ///
    /// Providers and older callers have used a few spellings over time.
    #[must_use]
    pub fn is_tag_name(name: &str) -> bool {
        matches!(
            name.trim().to_ascii_lowercase().as_str(),
            "group_uuid" | "groupuuid" | "group-uuid" | "group_id" | "campaign"
        )
    }
}

impl Display for BatchCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchCorrelator {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s.trim()).map(Self)
    }
}

/// Identifier of a single execution of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(ulid::Ulid);

impl RunId {
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
