//! Buffers commits as they arrive (piggybacked on Phase-2, or via recovery) and delivers them to
//! an [InstanceSink] strictly in instance-id order, requesting recovery for gaps that persist past
//! a timeout.  The `after_last_committed` cursor is the single source of truth for "how far has
//! this host's total order actually advanced."

use std::collections::{BTreeMap, HashMap};

use biometrics::{Counter, Gauge};

use ringpaxos_pb::{Epoch, InstanceId, Value};

use super::sink::InstanceSink;

static COMMITS_BUFFERED: Counter = Counter::new("ringpaxos.commit.tracker.commits_buffered");
static COMMITS_DELIVERED: Counter = Counter::new("ringpaxos.commit.tracker.commits_delivered");
static GAPS_REQUESTED: Counter = Counter::new("ringpaxos.commit.tracker.gaps_requested");
static DUPLICATE_COMMITS: Counter = Counter::new("ringpaxos.commit.tracker.duplicate_commits");
static AFTER_LAST_COMMITTED: Gauge = Gauge::new("ringpaxos.commit.tracker.after_last_committed");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&COMMITS_BUFFERED);
    collector.register_counter(&COMMITS_DELIVERED);
    collector.register_counter(&GAPS_REQUESTED);
    collector.register_counter(&DUPLICATE_COMMITS);
    collector.register_gauge(&AFTER_LAST_COMMITTED);
}

pub struct CommitTracker {
    epoch: Epoch,
    /// The first instance id not yet delivered; every lower id has been delivered in order.
    after_last_committed: InstanceId,
    pending: BTreeMap<InstanceId, Value>,
    highest_known: InstanceId,
    last_recovery_request: HashMap<InstanceId, u64>,
    recovery_timeout_ms: u64,
}

impl CommitTracker {
    pub fn new(epoch: Epoch, recovery_timeout_ms: u64) -> Self {
        Self {
            epoch,
            after_last_committed: InstanceId::ZERO,
            pending: BTreeMap::new(),
            highest_known: InstanceId::ZERO,
            last_recovery_request: HashMap::new(),
            recovery_timeout_ms,
        }
    }

    pub fn after_last_committed(&self) -> InstanceId {
        self.after_last_committed
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Record a commit (from a Phase2 piggyback, a `Vote` landing at the master, or a recovery
    /// reply) and deliver every now-contiguous value to `sink`, in order.
    pub fn on_commit<S: InstanceSink>(&mut self, instance_id: InstanceId, value: Value, sink: &mut S) {
        if instance_id < self.after_last_committed {
            DUPLICATE_COMMITS.click();
            return;
        }
        if instance_id >= self.highest_known {
            self.highest_known = instance_id.next();
        }
        if self.pending.insert(instance_id, value).is_none() {
            COMMITS_BUFFERED.click();
        } else {
            DUPLICATE_COMMITS.click();
        }
        self.last_recovery_request.remove(&instance_id);
        self.drain_contiguous(sink);
    }

    fn drain_contiguous<S: InstanceSink>(&mut self, sink: &mut S) {
        while let Some(value) = self.pending.remove(&self.after_last_committed) {
            sink.deliver(self.after_last_committed, value);
            COMMITS_DELIVERED.click();
            self.after_last_committed = self.after_last_committed.next();
        }
        AFTER_LAST_COMMITTED.set(self.after_last_committed.id as f64);
    }

    /// Instances strictly between `after_last_committed` and `highest_known` that are still
    /// missing and haven't had a recovery request issued in the last `recovery_timeout_ms`.
    /// Idempotent: re-requesting the same gap before the timeout elapses returns nothing.
    pub fn detect_gaps(&mut self, now: u64) -> Vec<InstanceId> {
        let mut gaps = Vec::new();
        let mut iid = self.after_last_committed;
        while iid < self.highest_known {
            if !self.pending.contains_key(&iid) {
                let due = match self.last_recovery_request.get(&iid) {
                    Some(&requested_at) => now.saturating_sub(requested_at) >= self.recovery_timeout_ms,
                    None => true,
                };
                if due {
                    self.last_recovery_request.insert(iid, now);
                    GAPS_REQUESTED.click();
                    gaps.push(iid);
                }
            }
            iid = iid.next();
        }
        gaps
    }

    /// A new epoch invalidates every buffered commit and in-flight recovery timer: the instance
    /// numbering itself starts over.
    pub fn reset_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
        self.after_last_committed = InstanceId::ZERO;
        self.highest_known = InstanceId::ZERO;
        self.pending.clear();
        self.last_recovery_request.clear();
        AFTER_LAST_COMMITTED.set(0.0);
    }
}
