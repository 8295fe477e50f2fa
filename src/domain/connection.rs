//! Connection Manager
//!
//! Tracks the single host link and owns its data channel. All transitions
//! happen on the dispatch thread, so no locking is involved.
//!
//! ```text
//!  Unregistered ──register──▶ Registered ──NewConnection──▶ Connected
//!                                 ▲                            │
//!                                 └── disconnect / broken ─────┘
//! ```

use crate::domain::models::{PeerId, SendOutcome};
use crate::domain::report::HidReport;
use crate::error::TransportError;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Data channel of a connected HID link
pub trait ReportChannel {
    /// Write one report without blocking.
    fn try_send(&mut self, report: &HidReport) -> Result<SendOutcome, TransportError>;

    /// Close the channel. Consumes the handle so it cannot be used again.
    fn close(self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unregistered,
    Registered,
    Connected,
}

/// The link to the current host
#[derive(Debug)]
pub struct Connection<C> {
    pub peer: PeerId,
    channel: C,
}

/// Owner of the current connection and its channel
#[derive(Debug)]
pub struct ConnectionManager<C: ReportChannel> {
    registered: bool,
    advertising: bool,
    connection: Option<Connection<C>>,
}

impl<C: ReportChannel> Default for ConnectionManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ReportChannel> ConnectionManager<C> {
    pub fn new() -> Self {
        Self {
            registered: false,
            advertising: false,
            connection: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match (self.registered, &self.connection) {
            (false, _) => ConnectionState::Unregistered,
            (true, None) => ConnectionState::Registered,
            (true, Some(_)) => ConnectionState::Connected,
        }
    }

    /// Whether the profile is currently advertised by the stack
    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn peer(&self) -> Option<&PeerId> {
        self.connection.as_ref().map(|c| &c.peer)
    }

    /// The profile was accepted by the Bluetooth stack.
    pub fn mark_registered(&mut self) {
        if !self.registered {
            info!("Profile registered, waiting for a host");
        }
        self.registered = true;
        self.advertising = true;
    }

    /// The stack withdrew the profile. An open link is left alone: the host
    /// may keep it even though the service is no longer discoverable.
    pub fn on_release(&mut self) {
        self.advertising = false;
        match &self.connection {
            Some(c) => info!("Profile released, keeping link to {}", c.peer),
            None => info!("Profile released"),
        }
    }

    /// A host connected. Any existing link is closed before the new one is
    /// adopted.
    pub fn on_new_connection(
        &mut self,
        peer: PeerId,
        channel: C,
        properties: &BTreeMap<String, String>,
    ) {
        if !self.registered {
            warn!("Ignoring connection from {} before registration", peer);
            channel.close();
            return;
        }

        info!("New connection from {} {:?}", peer, properties);

        if let Some(previous) = self.connection.take() {
            warn!("Replacing existing connection to {}", previous.peer);
            Self::close_connection(previous);
        }

        self.connection = Some(Connection { peer, channel });
    }

    /// The stack asked to tear down the link to `peer`. Stale requests for
    /// other peers are ignored.
    pub fn on_request_disconnection(&mut self, peer: &PeerId) {
        match &self.connection {
            Some(c) if &c.peer == peer => {
                if let Some(connection) = self.connection.take() {
                    info!("Disconnect requested by {}", peer);
                    Self::close_connection(connection);
                }
            }
            Some(c) => debug!(
                "Ignoring disconnect for {} (connected to {})",
                peer, c.peer
            ),
            None => debug!("Ignoring disconnect for {} (not connected)", peer),
        }
    }

    /// Channel of the current connection, if any
    pub fn current_channel_mut(&mut self) -> Option<&mut C> {
        self.connection.as_mut().map(|c| &mut c.channel)
    }

    /// A write on the current channel failed.
    pub fn mark_broken(&mut self) {
        if let Some(connection) = self.connection.take() {
            warn!("Link to {} is broken", connection.peer);
            Self::close_connection(connection);
        }
    }

    /// Close any open channel and forget the registration.
    pub fn shutdown(&mut self) {
        if let Some(connection) = self.connection.take() {
            Self::close_connection(connection);
        }
        self.registered = false;
        self.advertising = false;
    }

    fn close_connection(connection: Connection<C>) {
        debug!("Closing channel to {}", connection.peer);
        connection.channel.close();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MockChannel, SharedLog};
    use super::*;

    fn registered() -> (ConnectionManager<MockChannel>, SharedLog) {
        let mut manager = ConnectionManager::new();
        manager.mark_registered();
        (manager, SharedLog::default())
    }

    fn peer(n: u32) -> PeerId {
        PeerId::new(format!("/org/bluez/hci0/dev_00_00_00_00_00_0{}", n))
    }

    #[test]
    fn test_register_then_connect() {
        let mut manager: ConnectionManager<MockChannel> = ConnectionManager::new();
        let log = SharedLog::default();
        assert_eq!(manager.state(), ConnectionState::Unregistered);

        manager.mark_registered();
        assert_eq!(manager.state(), ConnectionState::Registered);
        assert!(manager.is_advertising());

        manager.on_new_connection(
            PeerId::new("/peer/0"),
            MockChannel::new(1, &log),
            &BTreeMap::new(),
        );
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.peer(), Some(&PeerId::new("/peer/0")));
        assert_eq!(manager.current_channel_mut().map(|c| c.id), Some(1));
    }

    #[test]
    fn test_connection_before_registration_is_closed() {
        let mut manager = ConnectionManager::new();
        let log = SharedLog::default();
        manager.on_new_connection(peer(0), MockChannel::new(1, &log), &BTreeMap::new());

        assert_eq!(manager.state(), ConnectionState::Unregistered);
        assert!(manager.current_channel_mut().is_none());
        assert_eq!(log.borrow().closes, vec![1]);
    }

    #[test]
    fn test_second_connection_replaces_first() {
        let (mut manager, log) = registered();
        manager.on_new_connection(peer(1), MockChannel::new(1, &log), &BTreeMap::new());
        assert!(log.borrow().closes.is_empty());

        manager.on_new_connection(peer(2), MockChannel::new(2, &log), &BTreeMap::new());
        assert_eq!(log.borrow().closes, vec![1]);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.peer(), Some(&peer(2)));
        assert_eq!(manager.current_channel_mut().map(|c| c.id), Some(2));
    }

    #[test]
    fn test_disconnect_matching_peer() {
        let (mut manager, log) = registered();
        manager.on_new_connection(peer(1), MockChannel::new(1, &log), &BTreeMap::new());

        manager.on_request_disconnection(&peer(1));
        assert_eq!(manager.state(), ConnectionState::Registered);
        assert!(manager.current_channel_mut().is_none());
        assert_eq!(log.borrow().closes, vec![1]);

        // duplicate notification
        manager.on_request_disconnection(&peer(1));
        assert_eq!(log.borrow().closes, vec![1]);
    }

    #[test]
    fn test_disconnect_for_other_peer_is_ignored() {
        let (mut manager, log) = registered();
        manager.on_new_connection(peer(1), MockChannel::new(1, &log), &BTreeMap::new());

        manager.on_request_disconnection(&peer(9));
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.peer(), Some(&peer(1)));
        assert!(log.borrow().closes.is_empty());
    }

    #[test]
    fn test_mark_broken_closes_once() {
        let (mut manager, log) = registered();
        manager.on_new_connection(peer(1), MockChannel::new(1, &log), &BTreeMap::new());

        manager.mark_broken();
        manager.mark_broken();
        manager.on_request_disconnection(&peer(1));
        manager.shutdown();

        assert_eq!(log.borrow().closes, vec![1]);
        assert!(manager.current_channel_mut().is_none());
        assert_eq!(manager.state(), ConnectionState::Unregistered);
    }

    #[test]
    fn test_release_keeps_link() {
        let (mut manager, log) = registered();
        manager.on_new_connection(peer(1), MockChannel::new(1, &log), &BTreeMap::new());

        manager.on_release();
        assert!(!manager.is_advertising());
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(log.borrow().closes.is_empty());
    }

    #[test]
    fn test_shutdown_closes_open_channel() {
        let (mut manager, log) = registered();
        manager.on_new_connection(peer(1), MockChannel::new(1, &log), &BTreeMap::new());

        manager.shutdown();
        assert_eq!(log.borrow().closes, vec![1]);
        assert_eq!(manager.state(), ConnectionState::Unregistered);
    }
}
