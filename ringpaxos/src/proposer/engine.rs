//! Orchestrates the three cooperating proposer tasks described in spec.md §4.4 — batcher,
//! reserved worker, client worker — plus Phase-2 completion/timeout handling and the bounded
//! commit-piggyback queue.  Kept synchronous and data-only so it can be driven either by the
//! async RPC fabric or directly by tests.

use std::collections::{HashMap, VecDeque};

use biometrics::{Counter, Gauge};

use ringpaxos_pb::{BallotId, CommitRecord, InstanceId, Value, COMMIT_PIGGYBACK_BATCH};

use super::ballot::BallotGenerator;
use super::instance::ProposerInstance;
use super::pool::InstancePool;
use super::value_queue::ClientValueQueue;
use crate::util::Notifier;

static INSTANCES_OPENED: Counter = Counter::new("ringpaxos.proposer.engine.instances_opened");
static INSTANCES_CLOSED: Counter = Counter::new("ringpaxos.proposer.engine.instances_closed");
static PHASE2_TIMEOUTS: Counter = Counter::new("ringpaxos.proposer.engine.phase2_timeouts");
static FORGOTTEN_DROPPED: Counter = Counter::new("ringpaxos.proposer.engine.forgotten_dropped");
static COMMIT_QUEUE_DEPTH: Gauge = Gauge::new("ringpaxos.proposer.engine.commit_queue_depth");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&INSTANCES_OPENED);
    collector.register_counter(&INSTANCES_CLOSED);
    collector.register_counter(&PHASE2_TIMEOUTS);
    collector.register_counter(&FORGOTTEN_DROPPED);
    collector.register_gauge(&COMMIT_QUEUE_DEPTH);
}

/// The result of a single-instance Phase-1 run by the reserved worker.
#[derive(Clone, Debug)]
pub enum ReservedOutcome {
    BallotTooLow { highest_promised: BallotId },
    Reserved { value: Value },
    Open,
    Forgotten,
}

pub struct ProposerEngine {
    ballot_gen: BallotGenerator,
    next_instance: InstanceId,
    pool: InstancePool,
    value_queue: ClientValueQueue,
    instances: HashMap<InstanceId, ProposerInstance>,
    commit_queue: VecDeque<CommitRecord>,
    pub on_commit: Notifier,
}

impl ProposerEngine {
    pub fn new(host_id: u32, num_hosts: u32, instance_pool_size: usize) -> Self {
        Self {
            ballot_gen: BallotGenerator::new(host_id, num_hosts),
            next_instance: InstanceId::ZERO,
            pool: InstancePool::new(instance_pool_size),
            value_queue: ClientValueQueue::new(),
            instances: HashMap::new(),
            commit_queue: VecDeque::new(),
            on_commit: Notifier::new(),
        }
    }

    pub fn ballot_generator(&self) -> &BallotGenerator {
        &self.ballot_gen
    }

    pub fn value_queue_mut(&mut self) -> &mut ClientValueQueue {
        &mut self.value_queue
    }

    pub fn pool(&self) -> &InstancePool {
        &self.pool
    }

    /// Fast-forward past instances already known unreservable (an `IID_TOO_LOW` reply).
    pub fn fast_forward(&mut self, retry_iid: InstanceId) {
        if retry_iid > self.next_instance {
            self.next_instance = retry_iid;
        }
    }

    pub fn next_instance(&self) -> InstanceId {
        self.next_instance
    }

    /// The batcher has decided to reserve `[start, end)`; create fresh proposer-instance state
    /// for each id and advance the cursor.
    pub fn begin_batch(&mut self, start: InstanceId, end: InstanceId) {
        let mut iid = start;
        while iid < end {
            self.instances.entry(iid).or_insert_with(|| ProposerInstance::new(iid));
            iid = iid.next();
        }
        if end > self.next_instance {
            self.next_instance = end;
        }
    }

    /// Classification callback: an instance in the batch turned out open (no prior vote found).
    pub fn mark_instance_open(&mut self, instance_id: InstanceId, ballot: BallotId) {
        let inst = self.instances.get_mut(&instance_id).expect("instance must exist");
        inst.start_phase1(ballot);
        inst.mark_open();
        self.pool.push_open(instance_id);
        INSTANCES_OPENED.click();
    }

    /// Classification callback: an instance in the batch turned out reserved; queue it for the
    /// reserved worker's authoritative single-instance Phase-1.
    pub fn mark_instance_reserved(&mut self, instance_id: InstanceId, ballot: BallotId) {
        let inst = self.instances.get_mut(&instance_id).expect("instance must exist");
        inst.start_phase1(ballot);
        self.pool.push_reserved(instance_id);
    }

    /// Pop the next reserved instance for the reserved worker to run Phase-1 on.
    pub fn pop_reserved(&mut self) -> Option<InstanceId> {
        self.pool.pop_reserved()
    }

    /// The ballot currently in flight for `instance_id`, e.g. to fill in a single-instance
    /// `Phase1Request` the reserved worker is about to send.
    pub fn ballot_for(&self, instance_id: InstanceId) -> BallotId {
        self.instances.get(&instance_id).expect("instance must exist").ballot()
    }

    pub fn handle_reserved_outcome(&mut self, instance_id: InstanceId, outcome: ReservedOutcome) {
        match outcome {
            ReservedOutcome::BallotTooLow { highest_promised } => {
                let boosted = self.ballot_gen.boost(highest_promised);
                let inst = self.instances.get_mut(&instance_id).expect("instance must exist");
                inst.start_phase1(boosted);
                self.pool.push_reserved(instance_id);
            }
            ReservedOutcome::Reserved { value } => {
                let inst = self.instances.get_mut(&instance_id).expect("instance must exist");
                inst.mark_reserved(value);
            }
            ReservedOutcome::Open => {
                let inst = self.instances.get_mut(&instance_id).expect("instance must exist");
                inst.mark_open();
                self.pool.push_open(instance_id);
                INSTANCES_OPENED.click();
            }
            ReservedOutcome::Forgotten => {
                FORGOTTEN_DROPPED.click();
                self.instances.remove(&instance_id);
            }
        }
    }

    /// Client worker: binds the head of the value queue to the next open instance, if both are
    /// available. Returns the instance id ready for Phase-2.
    pub fn try_bind_client_value(&mut self) -> Option<InstanceId> {
        if self.value_queue.is_empty() {
            return None;
        }
        let instance_id = self.pool.pop_open()?;
        let value = self.value_queue.pop().expect("checked non-empty above");
        let inst = self.instances.get_mut(&instance_id).expect("instance must exist");
        inst.bind_client_value(value);
        Some(instance_id)
    }

    /// An instance that is currently `P2_PENDING`/`P2_PENDING_CLIENT_VALUE` and ready for its
    /// Phase-2 multicast: returns `(ballot, value)`.
    pub fn phase2_payload(&self, instance_id: InstanceId) -> (BallotId, Value) {
        let inst = self.instances.get(&instance_id).expect("instance must exist");
        (inst.ballot(), inst.value().cloned().expect("P2 instances always carry a value"))
    }

    /// Up to [COMMIT_PIGGYBACK_BATCH] queued commits to attach to the next Phase-2 frame.
    pub fn drain_commits_for_piggyback(&mut self) -> Vec<CommitRecord> {
        let n = self.commit_queue.len().min(COMMIT_PIGGYBACK_BATCH);
        let drained: Vec<_> = self.commit_queue.drain(..n).collect();
        COMMIT_QUEUE_DEPTH.set(self.commit_queue.len() as f64);
        drained
    }

    /// The ring's single ack arrived: close the instance and queue its commit for piggyback.
    pub fn complete_instance(&mut self, instance_id: InstanceId) {
        let inst = self.instances.get_mut(&instance_id).expect("instance must exist");
        let value_id = inst.value().expect("completed instances carry a value").id;
        inst.complete();
        self.value_queue.release(&value_id);
        self.commit_queue.push_back(CommitRecord { instance_id, value_id });
        COMMIT_QUEUE_DEPTH.set(self.commit_queue.len() as f64);
        INSTANCES_CLOSED.click();
        self.on_commit.notify_all();
    }

    /// Phase-2 timed out or a higher ballot conflicted: boost, requeue as reserved, restore any
    /// drained-but-unsent commits to the head of the queue in original order, and return the
    /// client value (if any) so the caller can restore it to the ingest queue's head.
    pub fn phase2_timeout(
        &mut self,
        instance_id: InstanceId,
        rejected_ballot: BallotId,
        drained_commits: Vec<CommitRecord>,
    ) {
        PHASE2_TIMEOUTS.click();
        let boosted = self.ballot_gen.boost(rejected_ballot);
        let inst = self.instances.get_mut(&instance_id).expect("instance must exist");
        let returned_value = inst.retry_after_conflict(boosted);
        if let Some(value) = returned_value {
            self.value_queue.push_front_retry(value);
        }
        self.pool.push_reserved(instance_id);
        for commit in drained_commits.into_iter().rev() {
            self.commit_queue.push_front(commit);
        }
        COMMIT_QUEUE_DEPTH.set(self.commit_queue.len() as f64);
    }
}
