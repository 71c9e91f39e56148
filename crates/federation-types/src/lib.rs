//! Shared data model for federated resources and their change notifications.
//!
//! A [`FederatedResource`] is keyed by its fully qualified domain name and is
//! always replaced wholesale on update. Changes observed on a peer arrive as
//! [`WatchEvent`] values tagged with the originating [`ProviderId`]. The event
//! kind is kept as text so that an unrecognised kind survives decoding and can
//! be rejected by the consumer instead of failing the whole stream.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// A named resource distributed between federation peers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FederatedResource {
    fqdn: String,
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

impl FederatedResource {
    /// Builds a resource with no attributes.
    #[must_use]
    pub fn new(fqdn: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds or replaces an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns a full copy of the resource carrying a different display name.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Fully qualified domain name; the resource's unique key.
    #[must_use]
    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Human-readable display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arbitrary string attributes in key order.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

/// Opaque name of the peer that authored a remotely observed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Wraps a provider name.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrows the provider name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The kind of change carried by a [`WatchEvent`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventKind {
    /// The resource did not previously exist on the provider.
    Created,
    /// The resource replaced an earlier version.
    Updated,
    /// The resource was removed.
    Deleted,
}

impl EventKind {
    /// Stable lowercase label used in logs and on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Raised when a watch event names a kind this build does not understand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised event kind '{kind}'")]
pub struct UnknownEventKind {
    /// The kind text as received.
    pub kind: String,
}

/// A single change notification received from, or published to, a peer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WatchEvent {
    kind: String,
    provider_id: ProviderId,
    resource: FederatedResource,
}

impl WatchEvent {
    /// Builds an event of a known kind.
    #[must_use]
    pub fn new(kind: EventKind, provider_id: ProviderId, resource: FederatedResource) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            provider_id,
            resource,
        }
    }

    /// Builds an event whose kind is arbitrary text.
    ///
    /// Used when relaying events verbatim and by tests exercising rejection
    /// of unrecognised kinds.
    #[must_use]
    pub fn with_raw_kind(
        kind: impl Into<String>,
        provider_id: ProviderId,
        resource: FederatedResource,
    ) -> Self {
        Self {
            kind: kind.into(),
            provider_id,
            resource,
        }
    }

    /// Parses the event kind.
    pub fn kind(&self) -> Result<EventKind, UnknownEventKind> {
        EventKind::from_str(&self.kind).map_err(|_| UnknownEventKind {
            kind: self.kind.clone(),
        })
    }

    /// Origin of the change.
    #[must_use]
    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Full state of the resource after the change.
    #[must_use]
    pub fn resource(&self) -> &FederatedResource {
        &self.resource
    }
}
