//! Schedules recovery of missing instances over TCP: a main queue of gaps plus a random-
//! destination retry queue for gaps whose preferred peer dropped the connection.  The actual TCP
//! connection pool lives in `rpc::tcp`; this is the synchronous scheduling logic it drives.

use std::collections::{HashSet, VecDeque};

use biometrics::Counter;
use rand::Rng;
use tatl::{HeyListen, Stationary};

use ringpaxos_pb::{InstanceId, MAX_RECOVERY_BATCH};

use crate::config::HostEntry;

static RECOVERIES_ENQUEUED: Counter = Counter::new("ringpaxos.recovery.manager.enqueued");
static BATCHES_ISSUED: Counter = Counter::new("ringpaxos.recovery.manager.batches_issued");
static CONNECTION_LOSSES: Counter = Counter::new("ringpaxos.recovery.manager.connection_losses");
static RETRIES_ISSUED: Counter = Counter::new("ringpaxos.recovery.manager.retries_issued");
static INSTANCES_FORGOTTEN: Counter = Counter::new("ringpaxos.recovery.manager.forgotten");

static INSTANCES_FORGOTTEN_MONITOR: Stationary =
    Stationary::new("ringpaxos.recovery.manager.forgotten", &INSTANCES_FORGOTTEN);

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&RECOVERIES_ENQUEUED);
    collector.register_counter(&BATCHES_ISSUED);
    collector.register_counter(&CONNECTION_LOSSES);
    collector.register_counter(&RETRIES_ISSUED);
    collector.register_counter(&INSTANCES_FORGOTTEN);
}

/// A peer reporting a gap `forgotten` is a standing problem (retention windows are misaligned,
/// or this host fell further behind than any peer can still serve), not a transient one; flag it
/// the same way a host-down transition gets flagged rather than leaving it to a flat counter.
pub fn register_monitors(hey_listen: &mut HeyListen) {
    hey_listen.register_stationary(&INSTANCES_FORGOTTEN_MONITOR);
}

/// One outstanding batch of recovery requests, and which host it was sent to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecoveryBatch {
    pub to_host: u32,
    pub instances: Vec<InstanceId>,
}

pub struct RecoveryManager {
    self_datacenter: String,
    hosts: Vec<HostEntry>,
    main_queue: VecDeque<InstanceId>,
    retry_queue: VecDeque<InstanceId>,
    in_flight: HashSet<InstanceId>,
    batch_limit: usize,
}

impl RecoveryManager {
    pub fn new(self_host_id: u32, hosts: Vec<HostEntry>) -> Self {
        let self_datacenter = hosts
            .iter()
            .find(|h| h.host_id == self_host_id)
            .map(|h| h.datacenter.clone())
            .unwrap_or_default();
        Self {
            self_datacenter,
            hosts,
            main_queue: VecDeque::new(),
            retry_queue: VecDeque::new(),
            in_flight: HashSet::new(),
            batch_limit: MAX_RECOVERY_BATCH,
        }
    }

    /// Queue a gap for recovery, unless it's already pending or mid-flight.
    pub fn enqueue(&mut self, instance_id: InstanceId) {
        if self.in_flight.contains(&instance_id)
            || self.main_queue.contains(&instance_id)
            || self.retry_queue.contains(&instance_id)
        {
            return;
        }
        self.main_queue.push_back(instance_id);
        RECOVERIES_ENQUEUED.click();
    }

    /// Prefer a same-datacenter peer, then fall back to any other host, chosen uniformly at
    /// random so repeated retries don't hammer a single flaky peer.
    pub fn pick_destination<R: Rng>(&self, rng: &mut R, self_host_id: u32) -> Option<u32> {
        let candidates: Vec<u32> = self
            .hosts
            .iter()
            .filter(|h| h.host_id != self_host_id)
            .map(|h| h.host_id)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let same_dc: Vec<u32> = self
            .hosts
            .iter()
            .filter(|h| h.host_id != self_host_id && h.datacenter == self.self_datacenter)
            .map(|h| h.host_id)
            .collect();
        let pool = if same_dc.is_empty() { &candidates } else { &same_dc };
        Some(pool[rng.gen_range(0..pool.len())])
    }

    /// Drain up to [MAX_RECOVERY_BATCH] instances (retry queue first, since those gaps are older)
    /// for dispatch to `to_host`.
    pub fn next_batch(&mut self, to_host: u32) -> Option<RecoveryBatch> {
        let mut instances = Vec::new();
        while instances.len() < self.batch_limit {
            let next = self.retry_queue.pop_front().or_else(|| self.main_queue.pop_front());
            match next {
                Some(iid) => {
                    self.in_flight.insert(iid);
                    instances.push(iid);
                }
                None => break,
            }
        }
        if instances.is_empty() {
            return None;
        }
        BATCHES_ISSUED.click();
        Some(RecoveryBatch { to_host, instances })
    }

    /// The connection to `host_id` dropped mid-batch: move its in-flight instances to the retry
    /// queue so they're redispatched to a different peer.
    pub fn on_connection_lost(&mut self, instances: &[InstanceId]) {
        CONNECTION_LOSSES.click();
        for &iid in instances {
            if self.in_flight.remove(&iid) {
                RETRIES_ISSUED.click();
                self.retry_queue.push_back(iid);
            }
        }
    }

    /// A batch reply returned a committed value for these instances: they're resolved and no
    /// longer in flight.
    pub fn on_batch_resolved(&mut self, instances: &[InstanceId]) {
        for iid in instances {
            self.in_flight.remove(iid);
        }
    }

    /// A batch reply reported these instances as not yet committed on the peer: move them from
    /// in-flight to the retry queue so they get redispatched, giving the peer time to catch up.
    pub fn on_not_committed(&mut self, instances: &[InstanceId]) {
        for &iid in instances {
            if self.in_flight.remove(&iid) {
                RETRIES_ISSUED.click();
                self.retry_queue.push_back(iid);
            }
        }
    }

    /// A batch reply reported these instances as permanently forgotten by the peer (trimmed past
    /// its retention window or from a stale epoch): clear them from in-flight without requeuing,
    /// since retrying only wastes a round trip, and count them so operators notice this host is
    /// falling behind faster than peers can retain.
    pub fn on_forgotten(&mut self, instances: &[InstanceId]) {
        for iid in instances {
            self.in_flight.remove(iid);
        }
        if !instances.is_empty() {
            INSTANCES_FORGOTTEN.click();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.main_queue.len() + self.retry_queue.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn hosts() -> Vec<HostEntry> {
        vec![
            HostEntry {
                host_id: 0,
                datacenter: "dc1".into(),
                udp_addr: "127.0.0.1:9000".parse().unwrap(),
                tcp_addr: "127.0.0.1:9001".parse().unwrap(),
            },
            HostEntry {
                host_id: 1,
                datacenter: "dc1".into(),
                udp_addr: "127.0.0.1:9010".parse().unwrap(),
                tcp_addr: "127.0.0.1:9011".parse().unwrap(),
            },
            HostEntry {
                host_id: 2,
                datacenter: "dc2".into(),
                udp_addr: "127.0.0.1:9020".parse().unwrap(),
                tcp_addr: "127.0.0.1:9021".parse().unwrap(),
            },
        ]
    }

    #[test]
    fn enqueue_is_idempotent() {
        let mut mgr = RecoveryManager::new(0, hosts());
        mgr.enqueue(InstanceId::new(5));
        mgr.enqueue(InstanceId::new(5));
        assert_eq!(1, mgr.pending_len());
    }

    #[test]
    fn batch_respects_limit_and_tracks_in_flight() {
        let mut mgr = RecoveryManager::new(0, hosts());
        for i in 0..10 {
            mgr.enqueue(InstanceId::new(i));
        }
        let batch = mgr.next_batch(1).unwrap();
        assert_eq!(10, batch.instances.len());
        assert_eq!(10, mgr.in_flight_len());
        assert_eq!(0, mgr.pending_len());
    }

    #[test]
    fn connection_loss_requeues_in_flight_instances() {
        let mut mgr = RecoveryManager::new(0, hosts());
        mgr.enqueue(InstanceId::new(1));
        let batch = mgr.next_batch(1).unwrap();
        mgr.on_connection_lost(&batch.instances);
        assert_eq!(0, mgr.in_flight_len());
        assert_eq!(1, mgr.pending_len());
    }

    #[test]
    fn not_committed_requeues_for_retry() {
        let mut mgr = RecoveryManager::new(0, hosts());
        mgr.enqueue(InstanceId::new(1));
        let batch = mgr.next_batch(1).unwrap();
        mgr.on_not_committed(&batch.instances);
        assert_eq!(0, mgr.in_flight_len());
        assert_eq!(1, mgr.pending_len());
    }

    #[test]
    fn forgotten_instances_are_dropped_not_requeued() {
        let mut mgr = RecoveryManager::new(0, hosts());
        mgr.enqueue(InstanceId::new(1));
        let batch = mgr.next_batch(1).unwrap();
        mgr.on_forgotten(&batch.instances);
        assert_eq!(0, mgr.in_flight_len());
        assert_eq!(0, mgr.pending_len());
    }

    #[test]
    fn pick_destination_prefers_same_datacenter() {
        let mgr = RecoveryManager::new(0, hosts());
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let dest = mgr.pick_destination(&mut rng, 0).unwrap();
            assert_eq!(1, dest, "dc1 only has host 1 besides self");
        }
    }
}
