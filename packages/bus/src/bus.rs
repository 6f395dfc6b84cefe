//! The subscription bus.
//!
//! Channel-keyed publish/subscribe over long-lived WebSocket clients. The
//! client map is mutex-guarded; publish iterates a snapshot and never
//! blocks on a slow subscriber (per-client unbounded senders feed the
//! socket tasks). Slow or silent clients are reaped by the heartbeat, not
//! by publish.

use axum::extract::ws::Message;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Heartbeat cadence. Stale clients are reaped within two intervals.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Core channels the coordinator publishes on. Advisory only: the bus
/// accepts any channel string.
pub mod channels {
    pub const NPC_EVENTS: &str = "npc-events";
    pub const REBELLION_ALERTS: &str = "rebellion-alerts";
    pub const SIMULATION_TICKS: &str = "simulation-ticks";
    pub const SYSTEM_STATUS: &str = "system-status";
    pub const COGNITIVE_RAILS: &str = "cognitive-rails";
    pub const NPC_COMMANDS: &str = "npc-commands";
}

struct Client {
    sender: mpsc::UnboundedSender<Message>,
    subscriptions: HashSet<String>,
    alive: bool,
}

/// Channel-subscription broadcast bus.
pub struct EventBus {
    clients: Mutex<HashMap<Uuid, Client>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    port: AtomicU16,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            heartbeat: Mutex::new(None),
            port: AtomicU16::new(0),
        }
    }

    /// Record the port the transport listens on.
    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Relaxed);
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }

    pub fn connection_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Register a connected client. Starts with no subscriptions, alive.
    pub fn register(&self, sender: mpsc::UnboundedSender<Message>) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.lock().insert(
            id,
            Client {
                sender,
                subscriptions: HashSet::new(),
                alive: true,
            },
        );
        tracing::debug!(client = %id, "bus client connected");
        id
    }

    /// Drop a client.
    pub fn remove(&self, id: Uuid) {
        if self.clients.lock().remove(&id).is_some() {
            tracing::debug!(client = %id, "bus client removed");
        }
    }

    /// Mark a client alive (probe response or any traffic).
    pub fn mark_alive(&self, id: Uuid) {
        if let Some(client) = self.clients.lock().get_mut(&id) {
            client.alive = true;
        }
    }

    /// Handle one inbound text frame from a client.
    ///
    /// A well-formed subscribe message extends the client's subscription set
    /// (idempotently) and is acknowledged; malformed JSON gets an error
    /// reply without disconnecting.
    pub fn handle_text(&self, id: Uuid, text: &str) {
        self.mark_alive(id);
        let parsed: Result<Value, _> = serde_json::from_str(text);
        let reply = match parsed {
            Ok(value) if value.get("type").and_then(Value::as_str) == Some("subscribe") => {
                let requested: Vec<String> = value
                    .get("channels")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                {
                    let mut clients = self.clients.lock();
                    if let Some(client) = clients.get_mut(&id) {
                        for channel in &requested {
                            client.subscriptions.insert(channel.clone());
                        }
                    }
                }
                json!({
                    "type": "subscribed",
                    "channels": requested,
                    "timestamp": Utc::now().to_rfc3339(),
                })
            }
            Ok(_) => {
                // Unknown but well-formed messages are tolerated silently.
                return;
            }
            Err(e) => json!({
                "type": "error",
                "message": format!("malformed message: {e}"),
                "timestamp": Utc::now().to_rfc3339(),
            }),
        };
        self.send_to(id, reply);
    }

    fn send_to(&self, id: Uuid, payload: Value) {
        let failed = {
            let clients = self.clients.lock();
            match clients.get(&id) {
                Some(client) => client
                    .sender
                    .send(Message::Text(payload.to_string().into()))
                    .is_err(),
                None => false,
            }
        };
        if failed {
            self.remove(id);
        }
    }

    /// Publish to every live subscriber of a channel.
    ///
    /// Lossy by design: unsubscribed clients are skipped and clients whose
    /// transport is gone are silently removed.
    pub fn publish(&self, channel: &str, data: Value) {
        let envelope = json!({
            "channel": channel,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });
        let text = envelope.to_string();

        let targets: Vec<(Uuid, mpsc::UnboundedSender<Message>)> = {
            let clients = self.clients.lock();
            clients
                .iter()
                .filter(|(_, c)| c.subscriptions.contains(channel))
                .map(|(id, c)| (*id, c.sender.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, sender) in targets {
            if sender.send(Message::Text(text.clone().into())).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            self.remove(id);
        }
    }

    /// One heartbeat pass: reap clients that never answered the last probe,
    /// ping the rest and mark them pending.
    pub fn sweep(&self) {
        let mut clients = self.clients.lock();
        clients.retain(|id, client| {
            if !client.alive {
                tracing::info!(client = %id, "reaping unresponsive bus client");
                let _ = client.sender.send(Message::Close(None));
                return false;
            }
            client.alive = false;
            client.sender.send(Message::Ping(Vec::new().into())).is_ok()
        });
    }

    /// Spawn the periodic heartbeat task.
    pub fn start_heartbeat(self: &Arc<Self>, interval: Duration) {
        let bus = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Skip the immediate first tick so fresh clients get a full
            // interval before their first probe.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                bus.sweep();
            }
        });
        if let Some(previous) = self.heartbeat.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the heartbeat and drop every client.
    pub fn close(&self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
        let mut clients = self.clients.lock();
        for (_, client) in clients.drain() {
            let _ = client.sender.send(Message::Close(None));
        }
    }

    /// Channel names a client is subscribed to, for tests and diagnostics.
    pub fn subscriptions_of(&self, id: Uuid) -> Vec<String> {
        self.clients
            .lock()
            .get(&id)
            .map(|c| {
                let mut subs: Vec<String> = c.subscriptions.iter().cloned().collect();
                subs.sort();
                subs
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(bus: &EventBus) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (bus.register(tx), rx)
    }

    fn next_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        match rx.try_recv().expect("expected a frame") {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_is_idempotent_and_acknowledged() {
        let bus = EventBus::new();
        let (id, mut rx) = connect(&bus);

        bus.handle_text(id, r#"{"type":"subscribe","channels":["npc-events"]}"#);
        bus.handle_text(id, r#"{"type":"subscribe","channels":["npc-events"]}"#);

        assert_eq!(bus.subscriptions_of(id), vec!["npc-events".to_string()]);
        let ack = next_json(&mut rx);
        assert_eq!(ack["type"], "subscribed");
        assert_eq!(ack["channels"][0], "npc-events");
        // Second ack still answers the request.
        let ack = next_json(&mut rx);
        assert_eq!(ack["type"], "subscribed");
    }

    #[test]
    fn malformed_json_gets_error_without_disconnect() {
        let bus = EventBus::new();
        let (id, mut rx) = connect(&bus);

        bus.handle_text(id, "{not json");
        let reply = next_json(&mut rx);
        assert_eq!(reply["type"], "error");
        assert_eq!(bus.connection_count(), 1);
    }

    #[test]
    fn publish_reaches_only_subscribers() {
        let bus = EventBus::new();
        let (subscriber, mut sub_rx) = connect(&bus);
        let (_other, mut other_rx) = connect(&bus);

        bus.handle_text(subscriber, r#"{"type":"subscribe","channels":["npc-events"]}"#);
        let _ack = next_json(&mut sub_rx);

        bus.publish(channels::NPC_EVENTS, json!({"eventId": "e1"}));

        let envelope = next_json(&mut sub_rx);
        assert_eq!(envelope["channel"], "npc-events");
        assert_eq!(envelope["data"]["eventId"], "e1");
        assert!(envelope["timestamp"].is_string());
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn publish_drops_clients_with_closed_transport() {
        let bus = EventBus::new();
        let (id, rx) = connect(&bus);
        bus.handle_text(id, r#"{"type":"subscribe","channels":["system-status"]}"#);
        drop(rx);

        bus.publish(channels::SYSTEM_STATUS, json!({"note": "x"}));
        assert_eq!(bus.connection_count(), 0);
    }

    #[test]
    fn sweep_pings_then_reaps_silent_clients() {
        let bus = EventBus::new();
        let (id, mut rx) = connect(&bus);

        // First sweep: client was alive, gets a ping and goes pending.
        bus.sweep();
        assert_eq!(bus.connection_count(), 1);
        assert!(matches!(rx.try_recv().unwrap(), Message::Ping(_)));

        // No pong: second sweep reaps.
        bus.sweep();
        assert_eq!(bus.connection_count(), 0);

        let _ = id;
    }

    #[test]
    fn pong_keeps_client_alive_across_sweeps() {
        let bus = EventBus::new();
        let (id, mut rx) = connect(&bus);

        bus.sweep();
        assert!(matches!(rx.try_recv().unwrap(), Message::Ping(_)));
        bus.mark_alive(id);
        bus.sweep();
        assert_eq!(bus.connection_count(), 1);
    }

    #[test]
    fn close_drops_everyone() {
        let bus = EventBus::new();
        let _a = connect(&bus);
        let _b = connect(&bus);
        assert_eq!(bus.connection_count(), 2);
        bus.close();
        assert_eq!(bus.connection_count(), 0);
    }
}
