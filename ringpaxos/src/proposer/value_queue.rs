//! The client-value ingest queue.  De-duplicates by `valueId` so a value resubmitted while still
//! bound to an in-flight instance is never bound to a second one concurrently, the same
//! ring-buffer-style "hold until resolved" lifetime the original system's `value_id_map` gives
//! its mappings (evicted only once superseded, not the instant they're read).

use std::collections::{HashSet, VecDeque};

use biometrics::Counter;

use ringpaxos_pb::{Value, ValueId};

static DUPLICATES_DROPPED: Counter = Counter::new("ringpaxos.proposer.value_queue.duplicates_dropped");
static PUSHED: Counter = Counter::new("ringpaxos.proposer.value_queue.pushed");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&DUPLICATES_DROPPED);
    collector.register_counter(&PUSHED);
}

/// FIFO queue of client values awaiting an open instance, with `valueId` de-duplication.
///
/// The `push` method is the precise contract an external TCP stream-reassembler (out of scope
/// here) is expected to call into once it has reconstructed a complete `ValueData` frame.
#[derive(Default)]
pub struct ClientValueQueue {
    queue: VecDeque<Value>,
    seen: HashSet<ValueId>,
}

impl ClientValueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a client value at the tail.  Returns `false` (and drops it) if this `valueId` is
    /// already queued or already bound to an in-flight instance.
    pub fn push(&mut self, value: Value) -> bool {
        if !self.seen.insert(value.id) {
            DUPLICATES_DROPPED.click();
            return false;
        }
        PUSHED.click();
        self.queue.push_back(value);
        true
    }

    /// Push a value back onto the head of the queue (a Phase-2 timeout returning a client value
    /// to be retried).  Bypasses de-duplication since this value was already accounted for and
    /// never released (see [ClientValueQueue::pop]).
    pub fn push_front_retry(&mut self, value: Value) {
        self.seen.insert(value.id);
        self.queue.push_front(value);
    }

    /// Dequeue the head for binding to an open instance.  Unlike a plain FIFO pop, this does
    /// *not* clear `valueId` from the de-duplication set: the value is now bound to an in-flight
    /// instance, and a duplicate resubmission must keep being dropped until that instance
    /// actually completes and calls [ClientValueQueue::release].  Otherwise the same value could
    /// be bound to two instances at once if it's resubmitted while still in flight.
    pub fn pop(&mut self) -> Option<Value> {
        self.queue.pop_front()
    }

    /// The instance a popped value was bound to has committed (or been abandoned without a
    /// retry): release `value_id` so a future resubmission is accepted again.
    pub fn release(&mut self, value_id: &ValueId) {
        self.seen.remove(value_id);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(byte: u8) -> Value {
        Value::new(ValueId::new([byte; one_two_eight::BYTES]), vec![byte])
    }

    #[test]
    fn duplicate_value_id_is_dropped() {
        let mut q = ClientValueQueue::new();
        assert!(q.push(val(1)));
        assert!(!q.push(val(1)));
        assert_eq!(1, q.len());
    }

    #[test]
    fn pop_keeps_id_deduplicated_until_release() {
        let mut q = ClientValueQueue::new();
        q.push(val(1));
        let popped = q.pop().unwrap();
        assert!(!q.push(popped.clone()), "still bound to an in-flight instance");
        q.release(&popped.id);
        assert!(q.push(popped), "released once its instance resolved");
    }

    #[test]
    fn retry_goes_to_head() {
        let mut q = ClientValueQueue::new();
        q.push(val(1));
        q.push(val(2));
        let first = q.pop().unwrap();
        q.push_front_retry(first.clone());
        assert_eq!(first.id, q.pop().unwrap().id);
    }
}
