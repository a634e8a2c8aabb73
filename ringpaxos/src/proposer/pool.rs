//! Queues of open and reserved proposer instances awaiting binding/Phase-1, bounded in total size
//! so the master never holds unbounded in-flight instances.

use std::collections::VecDeque;

use biometrics::Gauge;

use ringpaxos_pb::InstanceId;

static POOL_SIZE: Gauge = Gauge::new("ringpaxos.proposer.pool.size");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_gauge(&POOL_SIZE);
}

/// Holds instance ids that are either freely open (Phase-1 found no prior vote) or reserved
/// (Phase-1 found a prior vote that must be re-proposed).  The batcher blocks on
/// [InstancePool::has_room] before reserving a new range, per spec.md §5's backpressure policy.
#[derive(Default)]
pub struct InstancePool {
    open: VecDeque<InstanceId>,
    reserved: VecDeque<InstanceId>,
    limit: usize,
}

impl InstancePool {
    pub fn new(limit: usize) -> Self {
        Self {
            open: VecDeque::new(),
            reserved: VecDeque::new(),
            limit,
        }
    }

    pub fn push_open(&mut self, instance: InstanceId) {
        self.open.push_back(instance);
        POOL_SIZE.set(self.len() as f64);
    }

    pub fn push_reserved(&mut self, instance: InstanceId) {
        self.reserved.push_back(instance);
        POOL_SIZE.set(self.len() as f64);
    }

    pub fn pop_open(&mut self) -> Option<InstanceId> {
        let popped = self.open.pop_front();
        POOL_SIZE.set(self.len() as f64);
        popped
    }

    pub fn pop_reserved(&mut self) -> Option<InstanceId> {
        let popped = self.reserved.pop_front();
        POOL_SIZE.set(self.len() as f64);
        popped
    }

    pub fn len(&self) -> usize {
        self.open.len() + self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff the pool can accept another batch of freshly-reserved instances.
    pub fn has_room(&self) -> bool {
        self.len() < self.limit
    }
}
