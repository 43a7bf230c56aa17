// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-match subscriber fan-out.
//!
//! Each match gets its own `broadcast` channel. A subscriber first replays
//! persisted history from [`wa_eventlog::EventLog`] for `seq > after_seq`,
//! then transitions to the live channel with no gap and no duplicate. A
//! subscriber that falls behind the channel's bounded capacity is not
//! silently skipped ahead: it is disconnected with the last sequence number
//! it actually received, so the client can reconnect with
//! `after=lastDeliveredSeq` and replay the gap from durable storage.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;
use wa_contracts::MatchEvent;
use wa_eventlog::{EventLog, EventLogError};

/// Errors a subscriber can encounter.
#[derive(Debug, Error)]
pub enum HubError {
    /// The subscriber's channel buffer filled before it could keep up;
    /// it has been disconnected at `last_delivered_seq`.
    #[error("slow consumer disconnected after seq {last_delivered_seq}")]
    SlowConsumer {
        /// The last sequence number this subscriber actually received.
        last_delivered_seq: i64,
    },
    /// Replay failed to read persisted history.
    #[error("replay failed: {0}")]
    Database(#[from] EventLogError),
}

/// Registry of per-match broadcast channels.
pub struct MatchHub {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<MatchEvent>>>,
    capacity: usize,
}

impl MatchHub {
    /// Create a hub whose per-match channels buffer up to `capacity` events
    /// before a lagging subscriber is disconnected.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn sender_for(&self, match_id: Uuid) -> broadcast::Sender<MatchEvent> {
        let mut channels = self.channels.lock().expect("channel registry poisoned");
        channels
            .entry(match_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish an event to every live subscriber of its match. A no-op if
    /// nobody is currently subscribed.
    pub fn publish(&self, event: MatchEvent) {
        let sender = self.sender_for(event.match_id);
        let _ = sender.send(event);
    }

    /// Subscribe to a match's events starting after `after_seq`, replaying
    /// persisted history first. Subscribing to the live channel happens
    /// before the replay read completes, so an event published in between
    /// is never missed; [`Subscription::next`] deduplicates it against the
    /// replayed tail.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Database`] if the replay read fails.
    pub async fn subscribe(
        &self,
        log: &EventLog,
        match_id: Uuid,
        after_seq: i64,
    ) -> Result<Subscription, HubError> {
        let live = self.sender_for(match_id).subscribe();
        let replay = log.list(match_id, after_seq).await?;
        let last_seq = replay.last().map_or(after_seq, |e| e.seq);
        Ok(Subscription {
            replay: replay.into(),
            live,
            last_seq,
        })
    }

    /// Number of matches with at least one registered channel (live or not).
    #[must_use]
    pub fn tracked_match_count(&self) -> usize {
        self.channels.lock().expect("channel registry poisoned").len()
    }
}

/// A live subscription: drains replayed history, then tails the broadcast
/// channel.
pub struct Subscription {
    replay: VecDeque<MatchEvent>,
    live: broadcast::Receiver<MatchEvent>,
    last_seq: i64,
}

impl Subscription {
    /// The last sequence number delivered by this subscription so far.
    #[must_use]
    pub fn last_delivered_seq(&self) -> i64 {
        self.last_seq
    }

    /// Fetch the next event. Returns `Ok(None)` once the match's channel has
    /// closed (the hub and all publishers dropped).
    ///
    /// # Errors
    ///
    /// Returns [`HubError::SlowConsumer`] if this subscriber's buffer
    /// overflowed; the caller should reconnect with
    /// `after = last_delivered_seq()`.
    pub async fn next(&mut self) -> Result<Option<MatchEvent>, HubError> {
        if let Some(event) = self.replay.pop_front() {
            self.last_seq = event.seq;
            return Ok(Some(event));
        }

        loop {
            match self.live.recv().await {
                Ok(event) if event.seq <= self.last_seq => continue,
                Ok(event) => {
                    self.last_seq = event.seq;
                    return Ok(Some(event));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        last_delivered_seq = self.last_seq,
                        missed,
                        "slow consumer disconnected"
                    );
                    return Err(HubError::SlowConsumer {
                        last_delivered_seq: self.last_seq,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wa_contracts::MatchEventKind;

    fn kind() -> MatchEventKind {
        MatchEventKind::PhaseStarted {
            phase: 1,
            round_count: 3,
        }
    }

    async fn log() -> EventLog {
        EventLog::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn replay_then_tail_has_no_gap_or_duplicate() {
        let event_log = log().await;
        let match_id = Uuid::new_v4();
        event_log
            .append(wa_eventlog::PendingEvent {
                match_id,
                team_id: None,
                kind: kind(),
            })
            .await
            .unwrap();
        event_log
            .append(wa_eventlog::PendingEvent {
                match_id,
                team_id: None,
                kind: kind(),
            })
            .await
            .unwrap();

        let hub = MatchHub::new(16);
        let mut sub = hub.subscribe(&event_log, match_id, 0).await.unwrap();

        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.seq, 1);
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.seq, 2);

        let live_event = event_log
            .append(wa_eventlog::PendingEvent {
                match_id,
                team_id: None,
                kind: kind(),
            })
            .await
            .unwrap();
        hub.publish(live_event.clone());

        let third = sub.next().await.unwrap().unwrap();
        assert_eq!(third.seq, 3);
        assert_eq!(sub.last_delivered_seq(), 3);
    }

    #[tokio::test]
    async fn late_subscriber_replay_skips_live_duplicate() {
        let event_log = log().await;
        let match_id = Uuid::new_v4();
        let hub = MatchHub::new(16);

        let persisted = event_log
            .append(wa_eventlog::PendingEvent {
                match_id,
                team_id: None,
                kind: kind(),
            })
            .await
            .unwrap();

        let mut sub = hub.subscribe(&event_log, match_id, 0).await.unwrap();
        hub.publish(persisted.clone());

        let delivered = sub.next().await.unwrap().unwrap();
        assert_eq!(delivered.seq, persisted.seq);
        assert_eq!(sub.last_delivered_seq(), persisted.seq);
    }

    #[tokio::test]
    async fn slow_consumer_is_disconnected_not_skipped_ahead() {
        let event_log = log().await;
        let match_id = Uuid::new_v4();
        let hub = MatchHub::new(2);

        let mut sub = hub.subscribe(&event_log, match_id, 0).await.unwrap();

        for _ in 0..5 {
            let event = event_log
                .append(wa_eventlog::PendingEvent {
                    match_id,
                    team_id: None,
                    kind: kind(),
                })
                .await
                .unwrap();
            hub.publish(event);
        }

        let err = sub.next().await.unwrap_err();
        assert!(matches!(err, HubError::SlowConsumer { .. }));
    }

    #[tokio::test]
    async fn unsubscribed_match_publish_is_a_no_op() {
        let hub = MatchHub::new(4);
        let match_id = Uuid::new_v4();
        hub.publish(MatchEvent {
            id: Uuid::new_v4(),
            seq: 1,
            ts: chrono::Utc::now(),
            match_id,
            team_id: None,
            kind: kind(),
        });
        assert_eq!(hub.tracked_match_count(), 1);
    }
}
