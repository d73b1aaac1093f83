use futures::future::BoxFuture;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tracing::{debug, warn};

use super::{ChangeFeed, ChannelSpec, RawChange, RawSubscription, RealtimeResult};

/// Capacity of each subscriber's forwarding buffer.
const SUBSCRIPTION_BUFFER: usize = 32;

/// In-process change feed: every published change is fanned out to the
/// channels whose spec matches it, in publish order.
#[derive(Clone)]
pub struct ChangeHub {
    sender: broadcast::Sender<RawChange>,
}

impl ChangeHub {
    /// Construct a hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send a change to all open channels, ignoring the no-subscriber case.
    pub fn publish(&self, change: RawChange) {
        let _ = self.sender.send(change);
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeFeed for ChangeHub {
    fn subscribe(&self, spec: ChannelSpec) -> BoxFuture<'static, RealtimeResult<RawSubscription>> {
        let mut receiver = self.sender.subscribe();
        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<RawChange>(SUBSCRIPTION_BUFFER);
            let topic = spec.topic.clone();

            // forwarder task: filters the broadcast and feeds this channel until it is dropped
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tx.closed() => break,
                        recv_result = receiver.recv() => {
                            match recv_result {
                                Ok(change) => {
                                    if !spec.matches(&change) {
                                        continue;
                                    }
                                    if tx.send(change).await.is_err() {
                                        break;
                                    }
                                }
                                Err(RecvError::Closed) => break,
                                Err(RecvError::Lagged(skipped)) => {
                                    warn!(topic = %spec.topic, skipped, "change feed subscriber lagged");
                                    continue;
                                }
                            }
                        }
                    }
                }
                debug!(topic = %spec.topic, "change feed channel closed");
            });

            Ok(RawSubscription::new(topic, rx))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::PlayerRow;
    use crate::realtime::{ChangeKind, Table};
    use serde_json::{Value, json};
    use uuid::Uuid;

    fn player_change(session_id: Uuid, nickname: &str) -> RawChange {
        RawChange {
            kind: ChangeKind::Insert,
            table: Table::Players,
            record: json!({
                "id": Uuid::new_v4().to_string(),
                "session_id": session_id.to_string(),
                "nickname": nickname,
                "avatar_emoji": "🐼",
                "player_id": "player_1_x",
                "status": "connected",
                "team": null,
                "score": 0,
                "joined_at": "2024-05-01T10:00:00+00:00",
                "last_seen": "2024-05-01T10:00:00+00:00",
                "reconnect_token": null
            }),
            old_record: Value::Null,
        }
    }

    #[tokio::test]
    async fn delivers_matching_changes_in_order() {
        let hub = ChangeHub::default();
        let session_id = Uuid::new_v4();
        let mut subscription = hub
            .subscribe(ChannelSpec::players(session_id))
            .await
            .unwrap()
            .typed::<PlayerRow>();

        hub.publish(player_change(Uuid::new_v4(), "Other"));
        hub.publish(player_change(session_id, "Sam"));
        hub.publish(player_change(session_id, "Lee"));

        let first = subscription.next().await.unwrap().row.unwrap();
        let second = subscription.next().await.unwrap().row.unwrap();
        assert_eq!(first.nickname, "Sam");
        assert_eq!(second.nickname, "Lee");
    }
}
