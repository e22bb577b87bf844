//! Value sinks - addressable, observable output slots.
//!
//! A sink is the boundary through which a task publishes externally-visible
//! values. Each sink wraps a `tokio::sync::watch` channel, so every write
//! atomically replaces the current value and wakes all subscribers without
//! any subscriber being able to mutate it. Writes stamp a monotonically
//! non-decreasing UTC timestamp.
//!
//! # Representations
//!
//! - [`ScalarSink<T>`] - a single typed value (position index, benchmark
//!   counter value, position name).
//! - [`CounterSink`] - a monotonically increasing event-sequence counter.
//! - [`ArraySink`] - an integer array whose head element is rewritten
//!   copy-on-write: readers always observe a complete array of the original
//!   length, never a partial write.
//!
//! Exactly one task owns write access to a sink at any time; the dispatcher's
//! single-owner-per-target rule enforces this.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// A published value together with its publish timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timestamped<T> {
    /// The published value.
    pub value: T,
    /// UTC stamp of the write, non-decreasing per sink.
    pub timestamp: DateTime<Utc>,
}

impl<T> Timestamped<T> {
    fn now(value: T) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
        }
    }

    /// Stamp `value` with now, clamped so timestamps never go backwards
    /// relative to the previous publish on the same sink.
    fn after(prev: DateTime<Utc>, value: T) -> Self {
        let now = Utc::now();
        Self {
            value,
            timestamp: if now > prev { now } else { prev },
        }
    }
}

/// Type-erased view of a sink, for registry listings and logging.
pub trait ValueSink: Send + Sync {
    /// Sink name (unique within the engine).
    fn name(&self) -> &str;

    /// Number of live subscribers.
    fn subscriber_count(&self) -> usize;

    /// Current value as JSON.
    fn value_json(&self) -> serde_json::Value;
}

// =============================================================================
// ScalarSink
// =============================================================================

/// Watch-backed scalar slot.
///
/// Cloning a sink shares the underlying channel, so a clone can be handed to
/// the owning task while readers keep subscribing through another clone.
pub struct ScalarSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    name: String,
    tx: watch::Sender<Timestamped<T>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for ScalarSink<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T> ScalarSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a sink holding `initial`.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        let (tx, _) = watch::channel(Timestamped::now(initial));
        Self {
            name: name.into(),
            tx,
        }
    }

    /// Publish a new value, stamping it and waking all subscribers.
    pub fn publish(&self, value: T) {
        let prev = self.tx.borrow().timestamp;
        self.tx.send_replace(Timestamped::after(prev, value));
    }

    /// Current value with its timestamp.
    pub fn get(&self) -> Timestamped<T> {
        self.tx.borrow().clone()
    }

    /// Subscribe to publishes.
    pub fn subscribe(&self) -> watch::Receiver<Timestamped<T>> {
        self.tx.subscribe()
    }
}

impl<T> ValueSink for ScalarSink<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn value_json(&self) -> serde_json::Value {
        serde_json::to_value(self.get().value).unwrap_or(serde_json::Value::Null)
    }
}

// =============================================================================
// CounterSink
// =============================================================================

/// Monotonically increasing event-sequence counter.
///
/// Used as the event proxy for event-only benchmark runs: each `next()` call
/// publishes and returns the new count.
#[derive(Clone)]
pub struct CounterSink {
    inner: ScalarSink<u64>,
}

impl CounterSink {
    /// Create a counter starting at zero.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: ScalarSink::new(name, 0),
        }
    }

    /// Increment, publish and return the new count.
    ///
    /// Single-owner rule: only one task writes a sink at a time, so the
    /// read-increment-publish sequence cannot race with another writer.
    pub fn next(&self) -> u64 {
        let n = self.inner.get().value + 1;
        self.inner.publish(n);
        n
    }

    /// Current count.
    pub fn get(&self) -> Timestamped<u64> {
        self.inner.get()
    }

    /// Subscribe to count publishes.
    pub fn subscribe(&self) -> watch::Receiver<Timestamped<u64>> {
        self.inner.subscribe()
    }
}

impl ValueSink for CounterSink {
    fn name(&self) -> &str {
        ValueSink::name(&self.inner)
    }

    fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    fn value_json(&self) -> serde_json::Value {
        self.inner.value_json()
    }
}

// =============================================================================
// ArraySink
// =============================================================================

/// Integer array slot with copy-on-write head updates.
///
/// `publish_head` clones the current array, overwrites index 0 and publishes
/// the copy, so a concurrent reader holding the previous value never observes
/// a mutation and every observed array has the original length.
#[derive(Clone)]
pub struct ArraySink {
    name: String,
    tx: watch::Sender<Timestamped<Vec<i32>>>,
}

impl ArraySink {
    /// Create a sink over `initial`. The array length is fixed for the life
    /// of the sink.
    pub fn new(name: impl Into<String>, initial: Vec<i32>) -> Self {
        let (tx, _) = watch::channel(Timestamped::now(initial));
        Self {
            name: name.into(),
            tx,
        }
    }

    /// Create a sink over the canonical demo array `[0, 1, .., len-1]`.
    pub fn with_len(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, (0..len as i32).collect())
    }

    /// Copy the current array, overwrite index 0 with `value`, publish the
    /// copy.
    pub fn publish_head(&self, value: i32) {
        let prev = self.tx.borrow().clone();
        let mut next = prev.value;
        if let Some(head) = next.first_mut() {
            *head = value;
        }
        self.tx
            .send_replace(Timestamped::after(prev.timestamp, next));
    }

    /// Clone of the current array.
    pub fn snapshot(&self) -> Vec<i32> {
        self.tx.borrow().value.clone()
    }

    /// Array length.
    pub fn len(&self) -> usize {
        self.tx.borrow().value.len()
    }

    /// True if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to array publishes.
    pub fn subscribe(&self) -> watch::Receiver<Timestamped<Vec<i32>>> {
        self.tx.subscribe()
    }
}

impl ValueSink for ArraySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn value_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scalar_publish_and_subscribe() {
        let sink = ScalarSink::new("position", 0usize);
        let mut rx = sink.subscribe();
        assert_eq!(rx.borrow().value, 0);

        sink.publish(2);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().value, 2);
        assert_eq!(sink.get().value, 2);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let sink = ScalarSink::new("v", 0i64);
        let mut last = sink.get().timestamp;
        for i in 1..100 {
            sink.publish(i);
            let t = sink.get().timestamp;
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn test_counter_is_monotonic() {
        let counter = CounterSink::new("events");
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.next(), 3);
        assert_eq!(counter.get().value, 3);
    }

    #[test]
    fn test_array_copy_on_write() {
        let sink = ArraySink::with_len("array", 8);
        let before = sink.snapshot();
        assert_eq!(before, vec![0, 1, 2, 3, 4, 5, 6, 7]);

        sink.publish_head(42);
        // The earlier snapshot is untouched; the new one differs only at [0].
        assert_eq!(before[0], 0);
        let after = sink.snapshot();
        assert_eq!(after[0], 42);
        assert_eq!(after[1..], before[1..]);
        assert_eq!(sink.len(), 8);
    }

    #[test]
    fn test_value_json() {
        let sink = ScalarSink::new("v", 7i64);
        assert_eq!(sink.value_json(), serde_json::json!(7));

        let arr = ArraySink::with_len("a", 3);
        assert_eq!(arr.value_json(), serde_json::json!([0, 1, 2]));
    }
}
