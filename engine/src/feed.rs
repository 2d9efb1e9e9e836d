//! Leaderboard change notifications.
//!
//! Generic publish/subscribe with at-least-once delivery: every event means
//! "re-fetch the ranking", never a diff, so a lagged or duplicated delivery
//! is harmless. The transport is an in-process broadcast channel per
//! tournament.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Buffered events per tournament channel. Receivers that fall further
/// behind observe a lag and simply re-fetch.
const CHANNEL_CAPACITY: usize = 64;

/// Emitted after any successful merge affecting a tournament.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardChange {
    pub tournament_id: Uuid,
    pub teams_updated: usize,
}

#[derive(Clone, Default)]
pub struct ChangeFeed {
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<LeaderboardChange>>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for one tournament's leaderboard.
    pub fn subscribe(&self, tournament_id: Uuid) -> broadcast::Receiver<LeaderboardChange> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(tournament_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish after a successful merge. A tournament nobody watches is a
    /// no-op, and a channel every receiver abandoned is evicted so the map
    /// does not accumulate dead entries over a long-lived process.
    pub fn publish(&self, change: LeaderboardChange) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(&change.tournament_id).cloned() else {
            return;
        };
        if sender.receiver_count() == 0 {
            channels.remove(&change.tournament_id);
            return;
        }
        let _ = sender.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let feed = ChangeFeed::new();
        let tournament_id = Uuid::new_v4();
        let mut first = feed.subscribe(tournament_id);
        let mut second = feed.subscribe(tournament_id);

        feed.publish(LeaderboardChange {
            tournament_id,
            teams_updated: 2,
        });

        assert_eq!(first.recv().await.unwrap().teams_updated, 2);
        assert_eq!(second.recv().await.unwrap().teams_updated, 2);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let feed = ChangeFeed::new();
        feed.publish(LeaderboardChange {
            tournament_id: Uuid::new_v4(),
            teams_updated: 1,
        });
    }

    #[tokio::test]
    async fn tournaments_are_isolated() {
        let feed = ChangeFeed::new();
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut receiver = feed.subscribe(watched);

        feed.publish(LeaderboardChange {
            tournament_id: other,
            teams_updated: 1,
        });

        assert!(matches!(
            receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn abandoned_channels_are_evicted_on_publish() {
        let feed = ChangeFeed::new();
        let tournament_id = Uuid::new_v4();
        drop(feed.subscribe(tournament_id));

        feed.publish(LeaderboardChange {
            tournament_id,
            teams_updated: 1,
        });

        assert!(feed.channels.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_subscribers_keep_their_channel() {
        let feed = ChangeFeed::new();
        let tournament_id = Uuid::new_v4();
        let mut receiver = feed.subscribe(tournament_id);

        feed.publish(LeaderboardChange {
            tournament_id,
            teams_updated: 1,
        });

        assert_eq!(receiver.recv().await.unwrap().teams_updated, 1);
        assert_eq!(feed.channels.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_merges_deliver_repeatedly() {
        let feed = ChangeFeed::new();
        let tournament_id = Uuid::new_v4();
        let mut receiver = feed.subscribe(tournament_id);

        for teams_updated in 1..=3 {
            feed.publish(LeaderboardChange {
                tournament_id,
                teams_updated,
            });
        }

        for expected in 1..=3 {
            assert_eq!(receiver.recv().await.unwrap().teams_updated, expected);
        }
    }
}
