//! Per-game broadcast fanout

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::session::directory::SessionDirectory;
use crate::ws::protocol::{GameSnapshot, ServerMsg};

/// Events buffered per game channel; readers slower than this lag
const CHANNEL_CAPACITY: usize = 64;

/// Registry of per-game broadcast channels. A channel exists while at
/// least one connection is subscribed to its game code; the last
/// unsubscribe removes it.
pub struct BroadcastHub {
    channels: DashMap<String, broadcast::Sender<ServerMsg>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a game's events, creating the channel on first use.
    pub fn subscribe(&self, code: &str) -> broadcast::Receiver<ServerMsg> {
        self.channels
            .entry(code.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop the receiver first, then call this; the channel is removed
    /// once no receivers remain.
    pub fn unsubscribe(&self, code: &str) {
        self.channels
            .remove_if(code, |_, tx| tx.receiver_count() == 0);
    }

    /// Fire-and-forget send to everyone watching this game. A game with
    /// no watchers is not an error.
    pub fn broadcast(&self, code: &str, msg: ServerMsg) {
        match self.channels.get(code) {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!(code = %code, "Broadcast had no receivers");
                }
            }
            None => {
                debug!(code = %code, "No channel for game, broadcast dropped");
            }
        }
    }

    /// Connections currently subscribed to one game
    pub fn subscriber_count(&self, code: &str) -> usize {
        self.channels
            .get(code)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Connections currently subscribed across all games
    pub fn connected_clients(&self) -> usize {
        self.channels
            .iter()
            .map(|entry| entry.value().receiver_count())
            .sum()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Recompute the game snapshot and broadcast the event built from it.
/// The mutation already committed; a failed snapshot only costs the
/// notification, never the action.
pub fn announce<F>(directory: &SessionDirectory, hub: &BroadcastHub, code: &str, build: F)
where
    F: FnOnce(GameSnapshot) -> ServerMsg,
{
    match directory.game_state(code) {
        Ok(snapshot) => hub.broadcast(code, build(snapshot)),
        Err(e) => {
            debug!(code = %code, error = %e, "Snapshot failed, skipping broadcast");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CatalogStore, GameStore};
    use crate::ws::protocol::PROTOCOL_VERSION;
    use std::sync::Arc;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let hub = BroadcastHub::new();
        let mut rx_a = hub.subscribe("ABC123");
        let mut rx_b = hub.subscribe("ABC123");

        hub.broadcast("ABC123", ServerMsg::error("ping"));

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await.unwrap() {
                ServerMsg::Error { version, message } => {
                    assert_eq!(version, PROTOCOL_VERSION);
                    assert_eq!(message, "ping");
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn games_have_isolated_channels() {
        let hub = BroadcastHub::new();
        let mut rx_a = hub.subscribe("AAAAAA");
        let mut rx_b = hub.subscribe("BBBBBB");

        hub.broadcast("AAAAAA", ServerMsg::error("for a"));

        assert!(rx_a.recv().await.is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_harmless() {
        let hub = BroadcastHub::new();
        hub.broadcast("NOBODY", ServerMsg::error("lost"));
        assert_eq!(hub.subscriber_count("NOBODY"), 0);
    }

    #[tokio::test]
    async fn last_unsubscribe_removes_the_channel() {
        let hub = BroadcastHub::new();
        let rx_a = hub.subscribe("ABC123");
        let rx_b = hub.subscribe("ABC123");
        assert_eq!(hub.subscriber_count("ABC123"), 2);

        drop(rx_a);
        hub.unsubscribe("ABC123");
        assert_eq!(hub.subscriber_count("ABC123"), 1);

        drop(rx_b);
        hub.unsubscribe("ABC123");
        assert_eq!(hub.subscriber_count("ABC123"), 0);
        assert_eq!(hub.connected_clients(), 0);
    }

    #[tokio::test]
    async fn connected_clients_counts_across_games() {
        let hub = BroadcastHub::new();
        let _rx_a = hub.subscribe("AAAAAA");
        let _rx_b = hub.subscribe("AAAAAA");
        let _rx_c = hub.subscribe("BBBBBB");

        assert_eq!(hub.connected_clients(), 3);
    }

    #[tokio::test]
    async fn announce_sends_fresh_snapshot() {
        let games = Arc::new(GameStore::new());
        let catalog = Arc::new(CatalogStore::new());
        let directory = SessionDirectory::new(games, catalog);
        let created = directory.create_game("Host", None).unwrap();

        let hub = BroadcastHub::new();
        let mut rx = hub.subscribe(&created.code);

        announce(&directory, &hub, &created.code, |data| {
            ServerMsg::PlayerJoined {
                version: PROTOCOL_VERSION,
                data,
            }
        });

        match rx.recv().await.unwrap() {
            ServerMsg::PlayerJoined { data, .. } => {
                assert_eq!(data.code, created.code);
                assert_eq!(data.unassigned_players.len(), 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn announce_for_unknown_game_sends_nothing() {
        let games = Arc::new(GameStore::new());
        let catalog = Arc::new(CatalogStore::new());
        let directory = SessionDirectory::new(games, catalog);

        let hub = BroadcastHub::new();
        let mut rx = hub.subscribe("ZZZZZZ");

        announce(&directory, &hub, "ZZZZZZ", |data| ServerMsg::GameState {
            version: PROTOCOL_VERSION,
            data,
        });

        assert!(rx.try_recv().is_err());
    }
}
