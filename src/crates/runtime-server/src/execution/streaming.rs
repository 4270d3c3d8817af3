//! SSE event framing, cancellation flags, and the per-run broadcast
//! channel that backs stream reconnection.
//!
//! Delta semantics: each `messages` event is a two-element tuple
//! `[message_chunk_delta, metadata]` where the chunk's `content` holds only
//! the new tokens. The server accumulates content internally for the final
//! `values` event; cumulative content never appears on the wire.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Replay buffer cap per run. Streams longer than this still deliver live
/// events; reconnects replay at most this many.
const REPLAY_BUFFER_MAX: usize = 4096;

/// Broadcast fan-out capacity per run.
const BROADCAST_CAPACITY: usize = 1024;

/// One wire-format SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub name: String,
    pub data: Value,
}

impl SseEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// `event: <name>\ndata: <json>\n\n`
    pub fn frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name, self.data)
    }

    pub fn metadata(run_id: &str, attempt: u32) -> Self {
        Self::new("metadata", json!({"run_id": run_id, "attempt": attempt}))
    }

    /// A `values` event; `values` must be the `{"messages": [...]}` form.
    pub fn values(values: Value) -> Self {
        Self::new("values", json!({"values": values}))
    }

    /// A `messages` delta: `[chunk, metadata]`.
    pub fn messages(chunk: Value, metadata: Value) -> Self {
        Self::new("messages", json!([chunk, metadata]))
    }

    pub fn updates(node: &str, values: Value) -> Self {
        let mut data = serde_json::Map::new();
        data.insert(node.to_string(), values);
        Self::new("updates", Value::Object(data))
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self::new("error", json!({"detail": detail.into()}))
    }

    pub fn end(run_id: &str, checkpoint_id: Option<&str>, status: &str) -> Self {
        Self::new(
            "end",
            json!({"run_id": run_id, "checkpoint_id": checkpoint_id, "status": status}),
        )
    }
}

/// Cancellation flags, one per in-flight run, polled by the streaming
/// engine between events.
#[derive(Default)]
pub struct CancelRegistry {
    flags: DashMap<String, Arc<AtomicBool>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run; returns its flag.
    pub fn register(&self, run_id: &str) -> Arc<AtomicBool> {
        self.flags
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    /// Request cancellation. Returns `false` when the run is not in flight.
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.flags.get(run_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, run_id: &str) {
        self.flags.remove(run_id);
    }
}

struct RunChannel {
    tx: broadcast::Sender<SseEvent>,
    replay: Mutex<Vec<SseEvent>>,
    done: AtomicBool,
}

/// Per-run event fan-out with bounded replay, so `GET .../stream` can join
/// an in-progress run and completed runs can serve their cached events.
#[derive(Default)]
pub struct RunBroadcast {
    channels: DashMap<String, Arc<RunChannel>>,
}

impl RunBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the channel for a run at admission time.
    pub fn open(&self, run_id: &str) {
        self.channels.entry(run_id.to_string()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
            Arc::new(RunChannel {
                tx,
                replay: Mutex::new(Vec::new()),
                done: AtomicBool::new(false),
            })
        });
    }

    /// Publish an event to subscribers and the replay buffer.
    pub fn publish(&self, run_id: &str, event: &SseEvent) {
        if let Some(channel) = self.channels.get(run_id) {
            let mut replay = channel.replay.lock();
            if replay.len() < REPLAY_BUFFER_MAX {
                replay.push(event.clone());
            }
            // Send while holding the lock so a concurrent subscriber sees
            // each event exactly once (snapshot or live, never neither).
            let _ = channel.tx.send(event.clone());
        }
    }

    /// Mark the run's stream complete.
    pub fn finish(&self, run_id: &str) {
        if let Some(channel) = self.channels.get(run_id) {
            let _replay = channel.replay.lock();
            channel.done.store(true, Ordering::SeqCst);
        }
    }

    /// Join a run's stream: the replayed prefix plus, for in-progress runs,
    /// a live receiver. `None` when the run has no channel (never started
    /// streaming or already evicted).
    pub fn subscribe(
        &self,
        run_id: &str,
    ) -> Option<(Vec<SseEvent>, Option<broadcast::Receiver<SseEvent>>)> {
        let channel = self.channels.get(run_id)?;
        let replay = channel.replay.lock();
        let snapshot = replay.clone();
        let live = if channel.done.load(Ordering::SeqCst) {
            None
        } else {
            Some(channel.tx.subscribe())
        };
        Some((snapshot, live))
    }

    /// Drop a run's channel (after its final events have been consumed or
    /// on thread deletion).
    pub fn evict(&self, run_id: &str) {
        self.channels.remove(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_matches_wire_format() {
        let event = SseEvent::metadata("r1", 1);
        let frame = event.frame();
        assert!(frame.starts_with("event: metadata\ndata: "));
        assert!(frame.ends_with("\n\n"));

        let payload = frame
            .trim_start_matches("event: metadata\ndata: ")
            .trim_end();
        let data: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(data["run_id"], "r1");
        assert_eq!(data["attempt"], 1);
    }

    #[test]
    fn messages_event_is_a_tuple() {
        let event = SseEvent::messages(json!({"content": "He"}), json!({"langgraph_node": "model"}));
        assert!(event.data.is_array());
        assert_eq!(event.data[0]["content"], "He");
        assert_eq!(event.data[1]["langgraph_node"], "model");
    }

    #[test]
    fn error_event_uses_detail_shape() {
        let event = SseEvent::error("boom");
        assert_eq!(event.data, json!({"detail": "boom"}));
    }

    #[test]
    fn cancel_registry_flags() {
        let registry = CancelRegistry::new();
        let flag = registry.register("r1");
        assert!(!flag.load(Ordering::SeqCst));

        assert!(registry.cancel("r1"));
        assert!(flag.load(Ordering::SeqCst));

        assert!(!registry.cancel("r2"));

        registry.remove("r1");
        assert!(!registry.cancel("r1"));
    }

    #[tokio::test]
    async fn replay_then_live_subscription() {
        let broadcast = RunBroadcast::new();
        broadcast.open("r1");
        broadcast.publish("r1", &SseEvent::metadata("r1", 1));
        broadcast.publish("r1", &SseEvent::values(json!({"messages": []})));

        let (snapshot, live) = broadcast.subscribe("r1").unwrap();
        assert_eq!(snapshot.len(), 2);
        let mut live = live.expect("run still in progress");

        broadcast.publish("r1", &SseEvent::end("r1", None, "success"));
        let event = live.recv().await.unwrap();
        assert_eq!(event.name, "end");
    }

    #[test]
    fn completed_runs_replay_without_live_receiver() {
        let broadcast = RunBroadcast::new();
        broadcast.open("r1");
        broadcast.publish("r1", &SseEvent::metadata("r1", 1));
        broadcast.finish("r1");

        let (snapshot, live) = broadcast.subscribe("r1").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(live.is_none());

        broadcast.evict("r1");
        assert!(broadcast.subscribe("r1").is_none());
    }
}
