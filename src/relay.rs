//! Report Relay
//!
//! One tick: poll the source, encode, write to the current channel if there
//! is one. Reports are never queued or retried; the next tick simply carries
//! fresher input.

use crate::domain::connection::{ConnectionManager, ReportChannel};
use crate::domain::models::SendOutcome;
use crate::domain::report::encode;
use crate::infrastructure::sample_source::SampleSource;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No sample this tick
    Idle,
    /// A report was built but nobody could take it
    Dropped,
    Sent,
    /// The write failed and the connection was torn down
    Broken,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub sent: u64,
    pub dropped: u64,
    pub broken: u64,
}

#[derive(Debug, Default)]
pub struct ReportRelay {
    stats: RelayStats,
}

impl ReportRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn tick<S, C>(
        &mut self,
        source: &mut S,
        connections: &mut ConnectionManager<C>,
    ) -> TickOutcome
    where
        S: SampleSource,
        C: ReportChannel,
    {
        let Some(sample) = source.poll() else {
            return TickOutcome::Idle;
        };
        let report = encode(&sample);

        let outcome = match connections.current_channel_mut() {
            None => TickOutcome::Dropped,
            Some(channel) => match channel.try_send(&report) {
                Ok(SendOutcome::Sent) => TickOutcome::Sent,
                Ok(SendOutcome::WouldBlock) => {
                    trace!("Channel busy, dropping report");
                    TickOutcome::Dropped
                }
                Err(e) => {
                    warn!("{}", e);
                    TickOutcome::Broken
                }
            },
        };

        match outcome {
            TickOutcome::Sent => self.stats.sent += 1,
            TickOutcome::Dropped => self.stats.dropped += 1,
            TickOutcome::Broken => {
                self.stats.broken += 1;
                connections.mark_broken();
            }
            TickOutcome::Idle => {}
        }

        outcome
    }
}


#[cfg(test)]
mod tests {
    use super::testing::QueueSource;
    use super::*;
    use crate::domain::connection::testing::{MockChannel, MockWrite, SharedLog};
    use crate::domain::connection::ConnectionState;
    use crate::domain::models::PeerId;
    use std::collections::BTreeMap;

    fn connected(channel: MockChannel) -> ConnectionManager<MockChannel> {
        let mut connections = ConnectionManager::new();
        connections.mark_registered();
        connections.on_new_connection(PeerId::new("/peer/0"), channel, &BTreeMap::new());
        connections
    }

    #[test]
    fn test_sample_is_written_while_connected() {
        let log = SharedLog::default();
        let mut connections = connected(MockChannel::new(1, &log));
        let mut source = QueueSource::lines(&["10,20,30,40,0,0,0"]);
        let mut relay = ReportRelay::new();

        assert_eq!(relay.tick(&mut source, &mut connections), TickOutcome::Sent);
        assert_eq!(
            log.borrow().writes,
            vec![(1, vec![0xA1, 10, 20, 30, 40, 0, 0, 0])]
        );
        assert_eq!(relay.stats().sent, 1);
    }

    #[test]
    fn test_malformed_sample_is_a_no_op() {
        let log = SharedLog::default();
        let mut connections = connected(MockChannel::new(1, &log));
        let mut source = QueueSource::lines(&["a,b,c"]);
        let mut relay = ReportRelay::new();

        assert_eq!(relay.tick(&mut source, &mut connections), TickOutcome::Idle);
        assert!(log.borrow().writes.is_empty());
        assert_eq!(connections.state(), ConnectionState::Connected);
        assert_eq!(relay.stats(), RelayStats::default());
    }

    #[test]
    fn test_report_dropped_without_connection() {
        let mut connections: ConnectionManager<MockChannel> = ConnectionManager::new();
        connections.mark_registered();
        let mut source = QueueSource::lines(&["1,2,3,4,5,6,7"]);
        let mut relay = ReportRelay::new();

        assert_eq!(relay.tick(&mut source, &mut connections), TickOutcome::Dropped);
        assert_eq!(relay.stats().dropped, 1);
    }

    #[test]
    fn test_full_channel_drops_report_and_keeps_link() {
        let log = SharedLog::default();
        let mut channel = MockChannel::new(1, &log);
        channel.mode = MockWrite::Full;
        let mut connections = connected(channel);
        let mut source = QueueSource::lines(&["1,2,3,4,5,6,7"]);
        let mut relay = ReportRelay::new();

        assert_eq!(relay.tick(&mut source, &mut connections), TickOutcome::Dropped);
        assert_eq!(connections.state(), ConnectionState::Connected);
        assert!(log.borrow().closes.is_empty());
    }

    #[test]
    fn test_broken_pipe_tears_down_connection() {
        let log = SharedLog::default();
        let mut connections = connected(MockChannel::failing(1, &log));
        let mut source = QueueSource::lines(&["1,2,3,4,5,6,7", "1,2,3,4,5,6,7"]);
        let mut relay = ReportRelay::new();

        assert_eq!(relay.tick(&mut source, &mut connections), TickOutcome::Broken);
        assert_eq!(connections.state(), ConnectionState::Registered);
        assert_eq!(log.borrow().closes, vec![1]);
        assert!(connections.current_channel_mut().is_none());

        // next cycle encodes but has nowhere to write
        assert_eq!(relay.tick(&mut source, &mut connections), TickOutcome::Dropped);
        assert_eq!(log.borrow().closes, vec![1]);
        assert!(log.borrow().writes.is_empty());
        assert_eq!(
            relay.stats(),
            RelayStats {
                sent: 0,
                dropped: 1,
                broken: 1
            }
        );
    }
}
