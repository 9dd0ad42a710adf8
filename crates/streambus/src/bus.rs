use crate::entry::StreamEntry;
use chrono::Utc;
use sa_domain::stream::BoxStream;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Message fanned out to live subscribers of a stream.
#[derive(Debug, Clone)]
enum Msg<E> {
    Entry(StreamEntry<E>),
    Closed,
}

/// What a subscriber observes (§4.1 "subscriber callback must not throw" is
/// realized here as a `Lagged` item instead of a dropped connection).
#[derive(Debug, Clone)]
pub enum BusEvent<E> {
    Entry(StreamEntry<E>),
    /// The subscriber fell behind the bounded history and some entries were
    /// evicted before being delivered (§4.1 "documented, bounded loss").
    Lagged,
    Closed,
}

struct StreamState<E: Clone> {
    entries: VecDeque<StreamEntry<E>>,
    next_seq: u64,
    closed: bool,
    sender: broadcast::Sender<Msg<E>>,
}

impl<E: Clone> StreamState<E> {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(16));
        Self {
            entries: VecDeque::with_capacity(capacity),
            next_seq: 1,
            closed: false,
            sender,
        }
    }
}

/// Per-stream, ordered, replayable event broadcast with bounded history
/// (§4.1). One `StreamBus<E>` instance is shared across the process; `E` is
/// the orchestrator's normalized event type.
pub struct StreamBus<E: Clone + Send + Sync + 'static> {
    streams: parking_lot::RwLock<HashMap<String, Arc<parking_lot::Mutex<StreamState<E>>>>>,
    capacity: usize,
}

impl<E: Clone + Send + Sync + 'static> StreamBus<E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            streams: parking_lot::RwLock::new(HashMap::new()),
            capacity,
        }
    }

    fn get_or_create(&self, stream_id: &str) -> Arc<parking_lot::Mutex<StreamState<E>>> {
        if let Some(s) = self.streams.read().get(stream_id) {
            return s.clone();
        }
        let mut streams = self.streams.write();
        streams
            .entry(stream_id.to_string())
            .or_insert_with(|| Arc::new(parking_lot::Mutex::new(StreamState::new(self.capacity))))
            .clone()
    }

    /// §4.1 `publish`: assigns the next monotonic `seq`, appends, delivers
    /// to all live subscribers. A no-op after `close` (returns `None`).
    pub fn publish(&self, stream_id: &str, event: E) -> Option<u64> {
        let state = self.get_or_create(stream_id);
        let mut state = state.lock();
        if state.closed {
            return None;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        let entry = StreamEntry {
            seq,
            event,
            ts: Utc::now(),
        };
        if state.entries.len() >= self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(entry.clone());
        let _ = state.sender.send(Msg::Entry(entry));
        Some(seq)
    }

    /// §4.1 `close`: marks the stream terminal and notifies live subscribers.
    pub fn close(&self, stream_id: &str) {
        let state = self.get_or_create(stream_id);
        let mut state = state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let _ = state.sender.send(Msg::Closed);
    }

    /// §4.1 `subscribe`: replays retained entries with `seq > after_seq`,
    /// then yields live entries until close. Implemented as a
    /// `futures_core::Stream` rather than literal callbacks, matching
    /// `sa-gateway::api::runs::make_run_event_stream`'s handling of a lagged
    /// broadcast receiver.
    pub fn subscribe(&self, stream_id: &str, after_seq: u64) -> BoxStream<'static, BusEvent<E>> {
        let state = self.get_or_create(stream_id);
        let (backlog, mut receiver, already_closed) = {
            let guard = state.lock();
            let backlog: Vec<StreamEntry<E>> = guard
                .entries
                .iter()
                .filter(|e| e.seq > after_seq)
                .cloned()
                .collect();
            (backlog, guard.sender.subscribe(), guard.closed)
        };

        Box::pin(async_stream::stream! {
            for entry in backlog {
                yield BusEvent::Entry(entry);
            }
            if already_closed {
                yield BusEvent::Closed;
                return;
            }
            loop {
                match receiver.recv().await {
                    Ok(Msg::Entry(entry)) => yield BusEvent::Entry(entry),
                    Ok(Msg::Closed) => {
                        yield BusEvent::Closed;
                        return;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        yield BusEvent::Lagged;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        yield BusEvent::Closed;
                        return;
                    }
                }
            }
        })
    }

    /// Drop all in-memory state for a stream (called once all subscribers
    /// have disconnected and the stream will never be published to again).
    pub fn cleanup(&self, stream_id: &str) {
        self.streams.write().remove(stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn publish_assigns_monotonic_seq() {
        let bus: StreamBus<String> = StreamBus::new(2000);
        let s1 = bus.publish("s", "a".into()).unwrap();
        let s2 = bus.publish("s", "b".into()).unwrap();
        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
    }

    #[tokio::test]
    async fn publish_after_close_is_noop() {
        let bus: StreamBus<String> = StreamBus::new(2000);
        bus.publish("s", "a".into());
        bus.close("s");
        assert!(bus.publish("s", "b".into()).is_none());
    }

    // ── S6: SSE resume via cursor ────────────────────────────────────
    #[tokio::test]
    async fn subscribe_replays_after_cursor_then_closes() {
        let bus: StreamBus<String> = StreamBus::new(2000);
        bus.publish("s", "a".into());
        bus.publish("s", "b".into());
        bus.publish("s", "c".into());
        bus.close("s");

        let mut stream = bus.subscribe("s", 1);
        let mut seqs = Vec::new();
        let mut saw_closed = false;
        while let Some(item) = stream.next().await {
            match item {
                BusEvent::Entry(e) => seqs.push(e.seq),
                BusEvent::Closed => {
                    saw_closed = true;
                    break;
                }
                BusEvent::Lagged => {}
            }
        }
        assert_eq!(seqs, vec![2, 3]);
        assert!(saw_closed);
    }

    #[tokio::test]
    async fn subscribe_after_close_immediately_closes() {
        let bus: StreamBus<String> = StreamBus::new(2000);
        bus.publish("s", "a".into());
        bus.close("s");

        let mut stream = bus.subscribe("s", 0);
        let first = stream.next().await.unwrap();
        assert!(matches!(first, BusEvent::Entry(_)));
        let second = stream.next().await.unwrap();
        assert!(matches!(second, BusEvent::Closed));
    }

    // ── invariant 3: strictly increasing, contiguous within retained history
    #[tokio::test]
    async fn bounded_history_evicts_oldest() {
        let bus: StreamBus<String> = StreamBus::new(3);
        for i in 0..5 {
            bus.publish("s", format!("e{i}"));
        }
        let mut stream = bus.subscribe("s", 0);
        let mut seqs = Vec::new();
        bus.close("s");
        while let Some(item) = stream.next().await {
            match item {
                BusEvent::Entry(e) => seqs.push(e.seq),
                BusEvent::Closed => break,
                BusEvent::Lagged => {}
            }
        }
        // only the last 3 of 5 are retained: seq 3,4,5
        assert_eq!(seqs, vec![3, 4, 5]);
    }
}
