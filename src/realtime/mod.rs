//! Change feed abstraction: per-session notifications for the `sessions` and
//! `players` collections, delivered as typed subscriptions.

pub mod hub;
#[cfg(feature = "hosted-store")]
pub mod phoenix;

use std::{fmt, marker::PhantomData};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dao::models::{PlayerRow, SessionRow};

pub use self::hub::ChangeHub;

/// Result alias for change feed operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Failures raised while opening or running a change feed channel.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The realtime endpoint could not be reached.
    #[error("realtime connection error: {0}")]
    Connection(String),
    /// The server refused to join the channel.
    #[error("realtime channel `{topic}` rejected: {reason}")]
    JoinRejected { topic: String, reason: String },
    /// Unexpected frame or protocol state.
    #[error("realtime protocol error: {0}")]
    Protocol(String),
}

/// Collections exposed on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Sessions,
    Players,
}

impl Table {
    /// Table name as known by the datastore.
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Sessions => "sessions",
            Table::Players => "players",
        }
    }
}

/// Kind of row change carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Which change kinds a channel listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Inserts, updates and deletes.
    All,
    /// A single change kind.
    Only(ChangeKind),
}

impl EventFilter {
    /// Wire representation used in channel join payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            EventFilter::All => "*",
            EventFilter::Only(ChangeKind::Insert) => "INSERT",
            EventFilter::Only(ChangeKind::Update) => "UPDATE",
            EventFilter::Only(ChangeKind::Delete) => "DELETE",
        }
    }

    fn accepts(self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(only) => only == kind,
        }
    }
}

/// Equality filter on a single column, `column=eq.value` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    /// Match rows whose `column` equals `value`.
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// Evaluate the filter against a JSON record.
    pub fn matches(&self, record: &Value) -> bool {
        match record.get(&self.column) {
            Some(Value::String(text)) => *text == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// Everything needed to open one change feed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub topic: String,
    pub table: Table,
    pub events: EventFilter,
    pub filter: Option<RowFilter>,
}

impl ChannelSpec {
    /// All changes to the session row itself.
    pub fn session(session_id: Uuid) -> Self {
        Self {
            topic: format!("session:{session_id}"),
            table: Table::Sessions,
            events: EventFilter::All,
            filter: Some(RowFilter::eq("id", session_id)),
        }
    }

    /// All changes to the players of a session.
    pub fn players(session_id: Uuid) -> Self {
        Self {
            topic: format!("players:{session_id}"),
            table: Table::Players,
            events: EventFilter::All,
            filter: Some(RowFilter::eq("session_id", session_id)),
        }
    }

    /// Whether a raw change belongs on this channel.
    pub fn matches(&self, change: &RawChange) -> bool {
        if change.table != self.table || !self.events.accepts(change.kind) {
            return false;
        }

        match &self.filter {
            None => true,
            Some(filter) => match change.kind {
                ChangeKind::Delete => filter.matches(&change.old_record),
                _ => filter.matches(&change.record),
            },
        }
    }
}

/// Undecoded notification as delivered by a feed backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChange {
    pub kind: ChangeKind,
    pub table: Table,
    pub record: Value,
    pub old_record: Value,
}

/// Typed notification for a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<T> {
    pub kind: ChangeKind,
    /// New row image, absent for deletes.
    pub row: Option<T>,
    /// Primary key of the deleted row, when the feed provides it.
    pub old_id: Option<Uuid>,
}

impl<T: DeserializeOwned> ChangeEvent<T> {
    fn decode(raw: RawChange) -> serde_json::Result<Self> {
        let old_id = raw
            .old_record
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok());

        let row = match raw.kind {
            ChangeKind::Delete => None,
            _ => Some(serde_json::from_value(raw.record)?),
        };

        Ok(Self {
            kind: raw.kind,
            row,
            old_id,
        })
    }
}

/// Source of change notifications.
pub trait ChangeFeed: Send + Sync {
    /// Open a channel. Notifications stop once the returned subscription is dropped.
    fn subscribe(&self, spec: ChannelSpec) -> BoxFuture<'static, RealtimeResult<RawSubscription>>;
}

/// Receiving end of an open channel.
pub struct RawSubscription {
    topic: String,
    receiver: mpsc::Receiver<RawChange>,
}

impl RawSubscription {
    /// Wrap the receiver fed by a backend forwarder task.
    pub fn new(topic: impl Into<String>, receiver: mpsc::Receiver<RawChange>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    /// Decode notifications into rows of type `T`.
    pub fn typed<T: DeserializeOwned>(self) -> Subscription<T> {
        Subscription {
            inner: self,
            _row: PhantomData,
        }
    }
}

/// Stream of typed change events for one channel.
pub struct Subscription<T> {
    inner: RawSubscription,
    _row: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    /// Wait for the next decodable change, `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<ChangeEvent<T>> {
        loop {
            let raw = self.inner.receiver.recv().await?;
            match ChangeEvent::decode(raw) {
                Ok(event) => return Some(event),
                Err(err) => {
                    warn!(topic = %self.inner.topic, error = %err, "dropping undecodable change");
                }
            }
        }
    }

    /// Channel topic, for logging.
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Close the channel.
    pub fn unsubscribe(self) {
        debug!(topic = %self.inner.topic, "unsubscribing change feed channel");
    }
}

/// Subscribe to updates of a single session row.
pub async fn subscribe_session(
    feed: &dyn ChangeFeed,
    session_id: Uuid,
) -> RealtimeResult<Subscription<SessionRow>> {
    let raw = feed.subscribe(ChannelSpec::session(session_id)).await?;
    Ok(raw.typed())
}

/// Subscribe to player changes of a session.
pub async fn subscribe_players(
    feed: &dyn ChangeFeed,
    session_id: Uuid,
) -> RealtimeResult<Subscription<PlayerRow>> {
    let raw = feed.subscribe(ChannelSpec::players(session_id)).await?;
    Ok(raw.typed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn player_channel_matches_only_its_session() {
        let session_id = Uuid::new_v4();
        let spec = ChannelSpec::players(session_id);

        let ours = RawChange {
            kind: ChangeKind::Insert,
            table: Table::Players,
            record: json!({"session_id": session_id.to_string()}),
            old_record: Value::Null,
        };
        let theirs = RawChange {
            record: json!({"session_id": Uuid::new_v4().to_string()}),
            ..ours.clone()
        };
        let wrong_table = RawChange {
            table: Table::Sessions,
            ..ours.clone()
        };

        assert!(spec.matches(&ours));
        assert!(!spec.matches(&theirs));
        assert!(!spec.matches(&wrong_table));
    }

    #[test]
    fn delete_is_filtered_on_old_record() {
        let session_id = Uuid::new_v4();
        let spec = ChannelSpec::session(session_id);
        let change = RawChange {
            kind: ChangeKind::Delete,
            table: Table::Sessions,
            record: json!({}),
            old_record: json!({"id": session_id.to_string()}),
        };

        assert!(spec.matches(&change));
        let event = ChangeEvent::<SessionRow>::decode(change).unwrap();
        assert_eq!(event.old_id, Some(session_id));
        assert!(event.row.is_none());
    }

    #[test]
    fn row_filter_renders_wire_syntax() {
        let filter = RowFilter::eq("session_id", "abc");
        assert_eq!(filter.to_string(), "session_id=eq.abc");
        assert!(filter.matches(&json!({"session_id": "abc"})));
        assert!(!filter.matches(&json!({"session_id": null})));
    }
}
