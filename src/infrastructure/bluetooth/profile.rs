//! Profile Registration
//!
//! Registers the HID service with BlueZ's ProfileManager and turns the
//! profile's lifecycle into [`ProfileEvent`]s on an mpsc queue:
//!
//! - each incoming `ConnectRequest` is accepted and sent as `NewConnection`
//! - the request's `closed()` future resolving (BlueZ called
//!   `Profile1.RequestDisconnection`) is sent as `RequestDisconnection`, and
//!   so is the device's `Connected` property dropping to false
//! - the default adapter disappearing is sent as `Release`
//!
//! bluer answers `Profile1.Release` itself and never surfaces it, so adapter
//! removal is the one withdrawal of the service this process can observe.
//!
//! The forwarding tasks never touch connection state themselves.

use crate::domain::models::{PeerId, ProfileEvent};
use crate::domain::settings::Settings;
use crate::error::RegistrationError;
use crate::infrastructure::bluetooth::channel::L2capChannel;
use crate::infrastructure::bluetooth::sdp;
use bluer::rfcomm::{Profile, ProfileHandle, Role};
use bluer::{Adapter, Address, Device, DeviceEvent, DeviceProperty, SessionEvent, Uuid};
use futures::{Stream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::future::{pending, Future};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

/// Human Interface Device service class
pub const HID_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001124_0000_1000_8000_00805f9b34fb);

pub type ChannelEvent = ProfileEvent<L2capChannel>;

/// Everything BlueZ needs to know about the advertised profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub uuid: Uuid,
    pub name: String,
    pub role: Role,
    pub require_authentication: bool,
    pub require_authorization: bool,
    pub service_record: String,
}

impl ProfileConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, RegistrationError> {
        Ok(Self {
            uuid: HID_SERVICE_UUID,
            name: settings.profile_name.clone(),
            role: Role::Server,
            require_authentication: settings.require_authentication,
            require_authorization: settings.require_authorization,
            service_record: sdp::load_service_record(settings.sdp_record_path.as_deref())?,
        })
    }

    /// Options passed to `ProfileManager1.RegisterProfile`
    pub fn to_profile(&self) -> Profile {
        Profile {
            uuid: self.uuid,
            name: Some(self.name.clone()),
            role: Some(self.role),
            require_authentication: Some(self.require_authentication),
            require_authorization: Some(self.require_authorization),
            service_record: Some(self.service_record.clone()),
            ..Default::default()
        }
    }
}

/// A registered profile. Dropping or unregistering it withdraws the profile.
pub struct ProfileRegistrar {
    tasks: JoinSet<()>,
    _session: bluer::Session,
}

impl ProfileRegistrar {
    /// Register the profile and start forwarding its lifecycle to `events`.
    pub async fn register(
        config: &ProfileConfig,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Self, RegistrationError> {
        let session = bluer::Session::new()
            .await
            .map_err(RegistrationError::Session)?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(RegistrationError::Session)?;
        info!("Using Bluetooth adapter {}", adapter.name());

        let handle = session
            .register_profile(config.to_profile())
            .await
            .map_err(RegistrationError::Rejected)?;
        info!("Registered profile {} ({})", config.name, config.uuid);

        let mut tasks = JoinSet::new();
        tasks.spawn(watch_adapter(
            session.clone(),
            adapter.name().to_string(),
            events.clone(),
        ));
        tasks.spawn(forward_requests(handle, adapter, events));

        Ok(Self {
            tasks,
            _session: session,
        })
    }

    /// Withdraw the profile from the Bluetooth stack.
    pub async fn unregister(mut self) {
        // the ProfileHandle lives in the forwarder; dropping it unregisters
        self.tasks.shutdown().await;
        tokio::task::yield_now().await;
        info!("Profile unregistered");
    }
}

/// Properties of a `NewConnection` as reported by the stack
fn connection_properties(
    address: Address,
    version: Option<u16>,
    features: Option<u16>,
) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    properties.insert("Address".to_string(), address.to_string());
    if let Some(version) = version {
        properties.insert("Version".to_string(), format!("{:#06x}", version));
    }
    if let Some(features) = features {
        properties.insert("Features".to_string(), format!("{:#06x}", features));
    }
    properties
}

/// One live link watcher per device. Dropping it aborts them all.
#[derive(Default)]
struct LinkWatchers {
    tasks: JoinSet<()>,
    by_device: HashMap<Address, AbortHandle>,
}

impl LinkWatchers {
    /// Start watching `device`, replacing the watcher of its previous link.
    fn watch<F>(&mut self, device: Address, watcher: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        while self.tasks.try_join_next().is_some() {}
        if let Some(previous) = self.by_device.remove(&device) {
            previous.abort();
        }
        let handle = self.tasks.spawn(watcher);
        self.by_device.insert(device, handle);
    }
}

async fn forward_requests(
    mut handle: ProfileHandle,
    adapter: Adapter,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut watchers = LinkWatchers::default();

    while let Some(request) = handle.next().await {
        let address = request.device();
        let peer = PeerId::new(address.to_string());
        let mut properties =
            connection_properties(address, request.version(), request.features());
        let closed = request.closed();

        let stream = match request.accept() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Could not accept connection from {}: {}", peer, e);
                continue;
            }
        };

        let device = match adapter.device(address) {
            Ok(device) => {
                if let Ok(Some(name)) = device.name().await {
                    properties.insert("Name".to_string(), name);
                }
                Some(device)
            }
            Err(e) => {
                debug!("No device object for {}: {}", peer, e);
                None
            }
        };

        watchers.watch(
            address,
            watch_link(
                peer.clone(),
                closed,
                link_lost(device, peer.clone()),
                events.clone(),
            ),
        );

        let event = ProfileEvent::NewConnection {
            peer: peer.clone(),
            channel: L2capChannel::new(peer, stream),
            properties,
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

/// Send one `RequestDisconnection` for `peer` once the stack closes the
/// profile connection or the device drops off.
async fn watch_link<C>(
    peer: PeerId,
    closed: impl Future<Output = ()>,
    link_lost: impl Future<Output = ()>,
    events: mpsc::UnboundedSender<ProfileEvent<C>>,
) {
    tokio::select! {
        _ = closed => debug!("Stack requested disconnection of {}", peer),
        _ = link_lost => debug!("{} is no longer connected", peer),
    }
    let _ = events.send(ProfileEvent::RequestDisconnection { peer });
}

/// Resolves when the device's `Connected` property turns false. Never
/// resolves if the device cannot be watched.
async fn link_lost(device: Option<Device>, peer: PeerId) {
    let Some(device) = device else {
        return pending().await;
    };
    let mut changes = match device.events().await {
        Ok(changes) => Box::pin(changes),
        Err(e) => {
            debug!("Cannot watch {} for disconnects: {}", peer, e);
            return pending().await;
        }
    };

    while let Some(DeviceEvent::PropertyChanged(property)) = changes.next().await {
        if let DeviceProperty::Connected(false) = property {
            return;
        }
    }
    pending().await
}

async fn watch_adapter(
    session: bluer::Session,
    adapter: String,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    match session.events().await {
        Ok(changes) => forward_adapter_removal(Box::pin(changes), &adapter, &events).await,
        Err(e) => debug!("Cannot watch adapters: {}", e),
    }
}

/// Send `Release` once `adapter` is removed from the system.
async fn forward_adapter_removal<C>(
    mut changes: impl Stream<Item = SessionEvent> + Unpin,
    adapter: &str,
    events: &mpsc::UnboundedSender<ProfileEvent<C>>,
) {
    while let Some(change) = changes.next().await {
        match change {
            SessionEvent::AdapterRemoved(name) if name == adapter => {
                warn!("Adapter {} was removed", name);
                let _ = events.send(ProfileEvent::Release);
                return;
            }
            SessionEvent::AdapterAdded(name) | SessionEvent::AdapterRemoved(name) => {
                debug!("Ignoring change of adapter {}", name)
            }
        }
    }
}
