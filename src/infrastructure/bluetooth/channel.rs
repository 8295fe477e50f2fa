//! HID Channel
//!
//! Wraps the socket BlueZ hands over in `NewConnection`. Writes are polled
//! exactly once: if the socket cannot take the report right now, the report
//! is dropped instead of waiting.

use crate::domain::connection::ReportChannel;
use crate::domain::models::{PeerId, SendOutcome};
use crate::domain::report::HidReport;
use crate::error::TransportError;
use bluer::rfcomm::Stream;
use futures::FutureExt;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

pub struct L2capChannel<W = Stream> {
    peer: PeerId,
    stream: W,
}

impl<W: AsyncWrite + Unpin> L2capChannel<W> {
    pub fn new(peer: PeerId, stream: W) -> Self {
        Self { peer, stream }
    }
}

impl<W> std::fmt::Debug for L2capChannel<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L2capChannel")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl<W: AsyncWrite + Unpin> ReportChannel for L2capChannel<W> {
    fn try_send(&mut self, report: &HidReport) -> Result<SendOutcome, TransportError> {
        let bytes = report.as_bytes();
        match self.stream.write(bytes).now_or_never() {
            None => Ok(SendOutcome::WouldBlock),
            Some(Ok(0)) => Err(TransportError(io::Error::from(io::ErrorKind::WriteZero))),
            Some(Ok(n)) => {
                if n < bytes.len() {
                    debug!("Short write to {}: {} of {} bytes", self.peer, n, bytes.len());
                }
                trace!("Sent {:02X?} to {}", bytes, self.peer);
                Ok(SendOutcome::Sent)
            }
            Some(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(SendOutcome::WouldBlock),
            Some(Err(e)) => Err(TransportError(e)),
        }
    }

    fn close(self) {
        debug!("Closing HID channel to {}", self.peer);
        // dropping the stream closes the socket
    }
}
