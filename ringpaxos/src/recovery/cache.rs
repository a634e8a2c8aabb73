//! A bounded, ordered cache of committed values this host can serve to peers recovering gaps.
//! Distinct from [crate::acceptor::AcceptorStore]'s committed window: this cache only needs to
//! answer "what value did instance N commit to", not carry ballots or pending votes.

use std::collections::BTreeMap;

use biometrics::Counter;

use ringpaxos_pb::{Epoch, InstanceId, Value};

static CACHE_HITS: Counter = Counter::new("ringpaxos.recovery.cache.hits");
static CACHE_EVICTIONS: Counter = Counter::new("ringpaxos.recovery.cache.evictions");
static CACHE_TOO_OLD: Counter = Counter::new("ringpaxos.recovery.cache.too_old");
static CACHE_WRONG_EPOCH: Counter = Counter::new("ringpaxos.recovery.cache.wrong_epoch");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&CACHE_HITS);
    collector.register_counter(&CACHE_EVICTIONS);
    collector.register_counter(&CACHE_TOO_OLD);
    collector.register_counter(&CACHE_WRONG_EPOCH);
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryResult {
    Ok(Value),
    NotYet,
    TooOld,
    WrongEpoch,
}

pub struct ValueCache {
    epoch: Epoch,
    capacity: usize,
    values: BTreeMap<InstanceId, Value>,
    /// The lowest instance id this cache still holds; anything below it has been forgotten.
    first_not_forgotten: InstanceId,
    highest_inserted: InstanceId,
}

impl ValueCache {
    pub fn new(epoch: Epoch, capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            epoch,
            capacity,
            values: BTreeMap::new(),
            first_not_forgotten: InstanceId::ZERO,
            highest_inserted: InstanceId::ZERO,
        }
    }

    pub fn insert(&mut self, instance_id: InstanceId, value: Value) {
        self.values.insert(instance_id, value);
        if instance_id >= self.highest_inserted {
            self.highest_inserted = instance_id.next();
        }
        while self.values.len() > self.capacity {
            if let Some((&lowest, _)) = self.values.iter().next() {
                self.values.remove(&lowest);
                self.first_not_forgotten = lowest.next();
                CACHE_EVICTIONS.click();
            }
        }
    }

    pub fn query(&self, epoch: Epoch, instance_id: InstanceId) -> QueryResult {
        if epoch != self.epoch {
            CACHE_WRONG_EPOCH.click();
            return QueryResult::WrongEpoch;
        }
        if instance_id < self.first_not_forgotten {
            CACHE_TOO_OLD.click();
            return QueryResult::TooOld;
        }
        match self.values.get(&instance_id) {
            Some(value) => {
                CACHE_HITS.click();
                QueryResult::Ok(value.clone())
            }
            None => QueryResult::NotYet,
        }
    }

    pub fn reset_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
        self.values.clear();
        self.first_not_forgotten = InstanceId::ZERO;
        self.highest_inserted = InstanceId::ZERO;
    }

    pub fn first_not_forgotten(&self) -> InstanceId {
        self.first_not_forgotten
    }
}
