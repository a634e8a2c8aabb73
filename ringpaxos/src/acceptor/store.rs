//! A windowed, sparse map from [InstanceId] to [AcceptorInstance], split semantically into
//! pending (not yet committed) and committed sets with bounded size on each side.

use std::collections::BTreeMap;

use biometrics::Counter;

use ringpaxos_pb::{BallotId, Epoch, InstanceId, Value, ValueId, Vote};

use super::instance::{AcceptorInstance, BeginBallotResult, NextBallotResult, VoteResult};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static REFUSED: Counter = Counter::new("ringpaxos.acceptor.store.refused");
static EVICTED: Counter = Counter::new("ringpaxos.acceptor.store.evicted");
static EPOCH_RESET: Counter = Counter::new("ringpaxos.acceptor.store.epoch_reset");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&REFUSED);
    collector.register_counter(&EVICTED);
    collector.register_counter(&EPOCH_RESET);
}

/// Default cap on uncommitted instances tracked at once.
pub const DEFAULT_PENDING_INSTANCES_LIMIT: usize = 1_000_000;
/// Default cap on committed instances retained for recovery/value-cache purposes.
pub const DEFAULT_COMMITTED_INSTANCES_LIMIT: usize = 1_000_000;

/// Outcome of a store-level operation: mirrors the instance-level result but adds `Refused` for
/// window-exhaustion and `Nacked` to distinguish "this instance doesn't exist yet and creating it
/// isn't refused, but the operation itself failed at the instance level."
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreResult<T> {
    Ok(T),
    Nacked(T),
    Refused,
}

pub struct AcceptorStore {
    epoch: Epoch,
    pending_instances_limit: usize,
    committed_instances_limit: usize,
    pending: BTreeMap<InstanceId, AcceptorInstance>,
    committed: BTreeMap<InstanceId, AcceptorInstance>,
}

impl AcceptorStore {
    pub fn new(epoch: Epoch, pending_instances_limit: usize, committed_instances_limit: usize) -> Self {
        Self {
            epoch,
            pending_instances_limit,
            committed_instances_limit,
            pending: BTreeMap::new(),
            committed: BTreeMap::new(),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Atomically clears all instance state and starts fresh under `epoch`. Per spec.md's own
    /// assumption (open question #1), this is the *only* call site that resets acceptor state.
    pub fn update_epoch(&mut self, epoch: Epoch) {
        EPOCH_RESET.click();
        self.epoch = epoch;
        self.pending.clear();
        self.committed.clear();
    }

    fn get_or_create(&mut self, instance: InstanceId) -> Option<&mut AcceptorInstance> {
        if self.committed.contains_key(&instance) {
            return self.committed.get_mut(&instance);
        }
        if !self.pending.contains_key(&instance) && self.pending.len() >= self.pending_instances_limit {
            return None;
        }
        Some(self.pending.entry(instance).or_insert_with(AcceptorInstance::new))
    }

    pub fn next_ballot(&mut self, instance: InstanceId, ballot: BallotId) -> StoreResult<NextBallotResult> {
        let Some(inst) = self.get_or_create(instance) else {
            REFUSED.click();
            return StoreResult::Refused;
        };
        match inst.next_ballot(ballot) {
            ok @ NextBallotResult::Promised { .. } => StoreResult::Ok(ok),
            rej @ NextBallotResult::Rejected { .. } => StoreResult::Nacked(rej),
        }
    }

    pub fn begin_ballot(
        &mut self,
        instance: InstanceId,
        ballot: BallotId,
        value: Value,
    ) -> StoreResult<BeginBallotResult> {
        let Some(inst) = self.get_or_create(instance) else {
            REFUSED.click();
            return StoreResult::Refused;
        };
        match inst.begin_ballot(ballot, value) {
            ok @ BeginBallotResult::Ok { .. } => StoreResult::Ok(ok),
            rej @ BeginBallotResult::Rejected { .. } => StoreResult::Nacked(rej),
        }
    }

    pub fn vote(&mut self, instance: InstanceId, vote: Vote) -> StoreResult<VoteResult> {
        let Some(inst) = self.get_or_create(instance) else {
            REFUSED.click();
            return StoreResult::Refused;
        };
        match inst.vote(vote) {
            VoteResult::Ok => StoreResult::Ok(VoteResult::Ok),
            unknown @ VoteResult::UnknownValue => StoreResult::Ok(unknown),
            low @ VoteResult::TooLow { .. } => StoreResult::Nacked(low),
        }
    }

    /// Marks `instance` committed and, if it was pending, promotes it into the committed set,
    /// evicting the oldest committed entry if doing so would exceed the window.
    pub fn commit(&mut self, instance: InstanceId, value_id: ValueId) -> bool {
        let ok = if let Some(inst) = self.pending.get_mut(&instance) {
            inst.commit(value_id)
        } else if let Some(inst) = self.committed.get_mut(&instance) {
            return inst.commit(value_id);
        } else {
            return false;
        };
        if !ok {
            return false;
        }
        if let Some(inst) = self.pending.remove(&instance) {
            self.committed.insert(instance, inst);
        }
        while self.committed.len() > self.committed_instances_limit {
            if let Some(&oldest) = self.committed.keys().next() {
                self.committed.remove(&oldest);
                EVICTED.click();
            } else {
                break;
            }
        }
        true
    }

    pub fn value(&self, instance: InstanceId) -> Option<(Value, BallotId)> {
        self.committed
            .get(&instance)
            .or_else(|| self.pending.get(&instance))
            .and_then(|inst| inst.value())
    }

    /// The smallest instance id that has not been committed yet.  Used to answer `IID_TOO_LOW`
    /// in the Phase-1 batcher: instances below this id can never be freely reserved again.
    pub fn lowest_instance_id(&self) -> InstanceId {
        match self.pending.keys().next() {
            Some(&iid) => iid,
            None => match self.committed.keys().next_back() {
                Some(&iid) => iid.next(),
                None => InstanceId::ZERO,
            },
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }
}
