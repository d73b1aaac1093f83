//! Change feed backed by the hosted realtime service (Phoenix channels over a
//! websocket). Each subscription owns its own socket and channel.

use std::time::Duration;

use futures::{SinkExt, StreamExt, future::BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{sync::mpsc, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::dao::lobby_store::hosted::HostedConfig;

use super::{
    ChangeFeed, ChangeKind, ChannelSpec, RawChange, RawSubscription, RealtimeError,
    RealtimeResult, Table,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const SUBSCRIPTION_BUFFER: usize = 32;
const JOIN_REF: &str = "1";

const EVENT_JOIN: &str = "phx_join";
const EVENT_LEAVE: &str = "phx_leave";
const EVENT_REPLY: &str = "phx_reply";
const EVENT_ERROR: &str = "phx_error";
const EVENT_CLOSE: &str = "phx_close";
const EVENT_HEARTBEAT: &str = "heartbeat";
const EVENT_CHANGES: &str = "postgres_changes";

/// Websocket change feed for the hosted datastore.
#[derive(Debug, Clone)]
pub struct PhoenixChangeFeed {
    url: String,
    schema: String,
}

impl PhoenixChangeFeed {
    /// Feed targeting the realtime endpoint of `config`.
    pub fn new(config: &HostedConfig) -> Self {
        Self {
            url: config.realtime_url(),
            schema: config.schema.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    topic: &'a str,
    event: &'a str,
    payload: Value,
    #[serde(rename = "ref")]
    reference: String,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangesPayload {
    data: ChangeData,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: ChangeKind,
    table: Table,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    old_record: Value,
}

fn channel_topic(spec: &ChannelSpec) -> String {
    format!("realtime:{}", spec.topic)
}

fn encode(frame: &OutboundFrame<'_>) -> RealtimeResult<Message> {
    serde_json::to_string(frame)
        .map(Message::Text)
        .map_err(|err| RealtimeError::Protocol(format!("failed to encode frame: {err}")))
}

fn join_frame(spec: &ChannelSpec, topic: &str, schema: &str) -> RealtimeResult<Message> {
    let mut change = json!({
        "event": spec.events.as_str(),
        "schema": schema,
        "table": spec.table.as_str(),
    });
    if let Some(filter) = &spec.filter {
        change["filter"] = Value::String(filter.to_string());
    }

    encode(&OutboundFrame {
        topic,
        event: EVENT_JOIN,
        payload: json!({ "config": { "postgres_changes": [change] } }),
        reference: JOIN_REF.to_string(),
    })
}

fn heartbeat_frame(counter: u64) -> RealtimeResult<Message> {
    encode(&OutboundFrame {
        topic: "phoenix",
        event: EVENT_HEARTBEAT,
        payload: json!({}),
        reference: counter.to_string(),
    })
}

fn leave_frame(topic: &str, counter: u64) -> RealtimeResult<Message> {
    encode(&OutboundFrame {
        topic,
        event: EVENT_LEAVE,
        payload: json!({}),
        reference: counter.to_string(),
    })
}

/// Outcome of a `phx_reply` to the join request, `None` for unrelated frames.
fn join_outcome(frame: &InboundFrame, topic: &str) -> Option<Result<(), String>> {
    if frame.event != EVENT_REPLY
        || frame.topic != topic
        || frame.reference.as_deref() != Some(JOIN_REF)
    {
        return None;
    }

    match frame.payload.get("status").and_then(Value::as_str) {
        Some("ok") => Some(Ok(())),
        _ => {
            let reason = frame
                .payload
                .get("response")
                .map(Value::to_string)
                .unwrap_or_else(|| "join refused".to_string());
            Some(Err(reason))
        }
    }
}

fn decode_change(frame: &InboundFrame) -> Option<RawChange> {
    if frame.event != EVENT_CHANGES {
        return None;
    }

    match serde_json::from_value::<ChangesPayload>(frame.payload.clone()) {
        Ok(ChangesPayload { data }) => Some(RawChange {
            kind: data.kind,
            table: data.table,
            record: data.record,
            old_record: data.old_record,
        }),
        Err(err) => {
            warn!(topic = %frame.topic, error = %err, "ignoring malformed change frame");
            None
        }
    }
}

fn parse_frame(text: &str) -> Option<InboundFrame> {
    match serde_json::from_str(text) {
        Ok(frame) => Some(frame),
        Err(err) => {
            debug!(error = %err, "ignoring non-frame websocket message");
            None
        }
    }
}

impl ChangeFeed for PhoenixChangeFeed {
    fn subscribe(&self, spec: ChannelSpec) -> BoxFuture<'static, RealtimeResult<RawSubscription>> {
        let url = self.url.clone();
        let schema = self.schema.clone();

        Box::pin(async move {
            let (socket, _response) = connect_async(url.as_str())
                .await
                .map_err(|err| RealtimeError::Connection(err.to_string()))?;
            let (mut sink, mut stream) = socket.split();

            let topic = channel_topic(&spec);
            sink.send(join_frame(&spec, &topic, &schema)?)
                .await
                .map_err(|err| RealtimeError::Connection(err.to_string()))?;

            let joined = timeout(JOIN_TIMEOUT, async {
                while let Some(message) = stream.next().await {
                    let message = message.map_err(|err| RealtimeError::Connection(err.to_string()))?;
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let Some(frame) = parse_frame(&text) else {
                        continue;
                    };
                    if let Some(outcome) = join_outcome(&frame, &topic) {
                        return outcome.map_err(|reason| RealtimeError::JoinRejected {
                            topic: spec.topic.clone(),
                            reason,
                        });
                    }
                }
                Err(RealtimeError::Connection(
                    "socket closed before join reply".into(),
                ))
            })
            .await
            .map_err(|_| RealtimeError::Protocol(format!("join of `{topic}` timed out")))?;
            joined?;

            info!(topic = %spec.topic, "realtime channel joined");

            let (tx, rx) = mpsc::channel::<RawChange>(SUBSCRIPTION_BUFFER);
            let subscription_topic = spec.topic.clone();

            tokio::spawn(async move {
                let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
                heartbeat.tick().await;
                let mut counter: u64 = 1;

                loop {
                    tokio::select! {
                        _ = tx.closed() => {
                            counter += 1;
                            if let Ok(frame) = leave_frame(&topic, counter) {
                                let _ = sink.send(frame).await;
                            }
                            let _ = sink.close().await;
                            break;
                        }
                        _ = heartbeat.tick() => {
                            counter += 1;
                            let sent = match heartbeat_frame(counter) {
                                Ok(frame) => sink.send(frame).await.is_ok(),
                                Err(_) => false,
                            };
                            if !sent {
                                warn!(topic = %spec.topic, "realtime heartbeat failed");
                                break;
                            }
                        }
                        message = stream.next() => {
                            let text = match message {
                                Some(Ok(Message::Text(text))) => text,
                                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => continue,
                                Some(Ok(Message::Close(frame))) => {
                                    info!(topic = %spec.topic, ?frame, "realtime socket closed by server");
                                    break;
                                }
                                Some(Err(err)) => {
                                    warn!(topic = %spec.topic, error = %err, "realtime socket error");
                                    break;
                                }
                                None => break,
                            };

                            let Some(frame) = parse_frame(&text) else {
                                continue;
                            };
                            if frame.topic == topic && (frame.event == EVENT_ERROR || frame.event == EVENT_CLOSE) {
                                warn!(topic = %spec.topic, event = %frame.event, "realtime channel closed");
                                break;
                            }
                            let Some(change) = decode_change(&frame) else {
                                continue;
                            };
                            if !spec.matches(&change) {
                                continue;
                            }
                            if tx.send(change).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                debug!(topic = %spec.topic, "realtime forwarder stopped");
            });

            Ok(RawSubscription::new(subscription_topic, rx))
        })
    }
}
