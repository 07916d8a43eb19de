//! Slug identifiers for tasks and task graphs.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 22 character URL-safe identifier, the encoding the scheduler expects for
/// task and task graph ids.
///
/// Backed by a random UUIDv4 so ids carry no ordering information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct SlugId(String);

impl SlugId {
    /// Generate a fresh random slug.
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Encode an existing UUID as a slug.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(URL_SAFE_NO_PAD.encode(uuid.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the slug back into the UUID it was generated from.
    #[cfg(test)]
    fn to_uuid(&self) -> Option<Uuid> {
        let bytes = URL_SAFE_NO_PAD.decode(&self.0).ok()?;
        Uuid::from_slice(&bytes).ok()
    }
}

impl Default for SlugId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SlugId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}
