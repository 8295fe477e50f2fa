use std::collections::BTreeMap;
use std::fmt;

/// Opaque identifier of the connected host (BlueZ device path or address)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle notifications delivered by the Bluetooth stack for the
/// registered profile.
#[derive(Debug)]
pub enum ProfileEvent<C> {
    /// The stack withdrew the profile
    Release,
    /// A host opened a link
    NewConnection {
        peer: PeerId,
        channel: C,
        properties: BTreeMap<String, String>,
    },
    /// The link to `peer` is being torn down
    RequestDisconnection { peer: PeerId },
}

/// Result of a non-blocking write that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The socket buffer is full; the report was dropped
    WouldBlock,
}
