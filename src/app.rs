//! Application context
//!
//! [`RelayApp`] owns the sample source, the connection manager and the relay.
//! Profile events and relay ticks are both handled on one task, so every
//! handler runs to completion before the next one starts.
//!
//! [`RelayService`] wires the app to BlueZ and the FIFO, with explicit
//! `init` / `run` / `shutdown`.

use crate::domain::connection::{ConnectionManager, ReportChannel};
use crate::domain::models::ProfileEvent;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{
    ChannelEvent, L2capChannel, ProfileConfig, ProfileRegistrar,
};
use crate::infrastructure::sample_source::{FifoSource, SampleSource};
use crate::relay::{RelayStats, ReportRelay, TickOutcome};
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct RelayApp<S: SampleSource, C: ReportChannel> {
    source: S,
    connections: ConnectionManager<C>,
    relay: ReportRelay,
}

impl<S: SampleSource, C: ReportChannel> RelayApp<S, C> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            connections: ConnectionManager::new(),
            relay: ReportRelay::new(),
        }
    }

    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionManager<C> {
        &mut self.connections
    }

    pub fn stats(&self) -> RelayStats {
        self.relay.stats()
    }

    /// Apply one lifecycle notification from the Bluetooth stack.
    pub fn dispatch(&mut self, event: ProfileEvent<C>) {
        let before = self.connections.state();
        match event {
            ProfileEvent::Release => self.connections.on_release(),
            ProfileEvent::NewConnection {
                peer,
                channel,
                properties,
            } => self.connections.on_new_connection(peer, channel, &properties),
            ProfileEvent::RequestDisconnection { peer } => {
                self.connections.on_request_disconnection(&peer)
            }
        }
        let after = self.connections.state();
        if after != before {
            debug!("Connection state {:?} -> {:?}", before, after);
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.relay.tick(&mut self.source, &mut self.connections)
    }

    /// Serve profile events and relay ticks until `shutdown` resolves.
    pub async fn run(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<ProfileEvent<C>>,
        period: Duration,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = events.recv() => self.dispatch(event),
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }

    /// Close any open channel and hand back the source for cleanup.
    pub fn shutdown(mut self) -> S {
        let connections = self.connections();
        info!(
            "Stopping in state {:?} (advertising: {})",
            connections.state(),
            connections.is_advertising()
        );
        if let Some(peer) = connections.peer() {
            info!("Closing link to {}", peer);
        }
        self.connections.shutdown();
        let stats = self.stats();
        info!(
            "Relay stopped: {} sent, {} dropped, {} broken links",
            stats.sent, stats.dropped, stats.broken
        );
        self.source
    }
}

/// The relay wired to BlueZ and the sample FIFO
pub struct RelayService {
    app: RelayApp<FifoSource, L2capChannel>,
    registrar: ProfileRegistrar,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    period: Duration,
}

impl RelayService {
    /// Create the sample FIFO and register the HID profile.
    pub async fn init(settings: &Settings) -> Result<Self> {
        let config = ProfileConfig::from_settings(settings)?;

        let source = FifoSource::create(&settings.fifo_path)?;
        info!("Reading samples from {}", source.path().display());
        let mut app = RelayApp::new(source);

        let (tx, events) = mpsc::unbounded_channel();
        let registrar = match ProfileRegistrar::register(&config, tx).await {
            Ok(registrar) => registrar,
            Err(e) => {
                app.shutdown().remove();
                return Err(e).context("Failed to register HID profile");
            }
        };
        app.connections_mut().mark_registered();

        Ok(Self {
            app,
            registrar,
            events,
            period: Duration::from_millis(settings.tick_interval_ms.max(1)),
        })
    }

    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        info!(
            "Relaying reports every {:?}; waiting for a host",
            self.period
        );
        self.app.run(&mut self.events, self.period, shutdown).await;
    }

    pub async fn shutdown(self) {
        let Self { app, registrar, .. } = self;
        let source = app.shutdown();
        registrar.unregister().await;
        source.remove();
    }
}

/// Resolves on SIGINT or SIGTERM.
pub fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    Ok(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
            _ = terminate.recv() => {}
        }
        info!("Shutting down");
    })
}
