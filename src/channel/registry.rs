use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::broadcast;

use super::StreamTransport;

struct Entry {
    generation: u64,
    cancel: broadcast::Sender<()>,
}

/// Open streams: a cancel sender per request and the readiness flags.
///
/// Each registration gets a generation so a stream that outlived its
/// replacement cannot clear the newer stream's state.
#[derive(Default)]
pub struct StreamRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    ready: Mutex<HashSet<(String, String)>>,
    next_generation: AtomicU64,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`, cancelling any stream already registered under it.
    pub fn register(&self, id: &str) -> (u64, broadcast::Receiver<()>) {
        let (tx, rx) = broadcast::channel(1);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), Entry { generation, cancel: tx });
        if let Some(previous) = previous {
            let _ = previous.cancel.send(());
            self.clear_ready(id);
        }
        (generation, rx)
    }

    pub fn cancel(&self, id: &str) -> bool {
        let entry = self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
        self.clear_ready(id);
        if let Some(entry) = entry {
            let _ = entry.cancel.send(());
            return true;
        }
        false
    }

    /// Mark the stream open, if `generation` is still the registered one.
    pub fn mark_open(&self, id: &str, generation: u64, protocol: &str) {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.get(id).is_some_and(|entry| entry.generation == generation) {
            self.set_ready(id, protocol, true);
        }
    }

    /// Forget a finished stream, if `generation` is still the registered one.
    pub fn release(&self, id: &str, generation: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.get(id).is_some_and(|entry| entry.generation == generation) {
            entries.remove(id);
            self.clear_ready(id);
        }
    }

    pub fn set_ready(&self, id: &str, protocol: &str, ready: bool) {
        let mut states = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        let key = (id.to_string(), protocol.to_string());
        if ready {
            states.insert(key);
        } else {
            states.remove(&key);
        }
    }

    fn clear_ready(&self, id: &str) {
        self.ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(ready_id, _)| ready_id != id);
    }

    pub fn is_ready(&self, id: &str, protocol: &str) -> bool {
        self.ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(id.to_string(), protocol.to_string()))
    }
}

impl StreamTransport for StreamRegistry {
    fn ready_state(&self, request_id: &str, protocol: &str) -> bool {
        self.is_ready(request_id, protocol)
    }

    fn close(&self, request_id: &str) {
        if !self.cancel(request_id) {
            tracing::debug!(request_id, "close requested with no open stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::STREAM_PROTOCOL;

    #[test]
    fn cancel_signals_registered_receiver_and_clears_readiness() {
        let registry = StreamRegistry::new();
        let (generation, mut rx) = registry.register("req_1");
        registry.mark_open("req_1", generation, STREAM_PROTOCOL);
        assert!(registry.ready_state("req_1", STREAM_PROTOCOL));

        assert!(registry.cancel("req_1"));
        assert!(rx.try_recv().is_ok());
        assert!(!registry.ready_state("req_1", STREAM_PROTOCOL));
        assert!(!registry.cancel("req_1"));
    }

    #[test]
    fn re_registering_cancels_previous_stream() {
        let registry = StreamRegistry::new();
        let (_, mut first) = registry.register("req_1");
        let _second = registry.register("req_1");
        assert!(first.try_recv().is_ok());
    }

    #[test]
    fn stale_generation_cannot_touch_newer_stream() {
        let registry = StreamRegistry::new();
        let (old, _old_rx) = registry.register("req_1");
        let (new, _new_rx) = registry.register("req_1");
        registry.mark_open("req_1", old, STREAM_PROTOCOL);
        assert!(!registry.ready_state("req_1", STREAM_PROTOCOL));

        registry.mark_open("req_1", new, STREAM_PROTOCOL);
        registry.release("req_1", old);
        assert!(registry.ready_state("req_1", STREAM_PROTOCOL));

        registry.release("req_1", new);
        assert!(!registry.ready_state("req_1", STREAM_PROTOCOL));
    }

    #[test]
    fn ready_state_is_per_request_and_protocol() {
        let registry = StreamRegistry::new();
        registry.set_ready("req_1", STREAM_PROTOCOL, true);

        assert!(registry.ready_state("req_1", STREAM_PROTOCOL));
        assert!(!registry.ready_state("req_1", "websocket"));
        assert!(!registry.ready_state("req_2", STREAM_PROTOCOL));

        registry.set_ready("req_1", STREAM_PROTOCOL, false);
        assert!(!registry.ready_state("req_1", STREAM_PROTOCOL));
    }
}
