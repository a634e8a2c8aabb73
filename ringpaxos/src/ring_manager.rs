//! The master's ring-selection state machine: `LOOKING` (no ring, picking a candidate from ping
//! quality) → `WAIT_ACK` (candidate multicast, awaiting acks) → `OK` (installed and serving) →
//! back to `LOOKING` on ack timeout or a ring member going down.  Kept synchronous and
//! socket-free; the RPC fabric drives it with real `SetRingAck`s and host-down events, and
//! [RingManager::tick] with wall-clock time so a `WAIT_ACK` round can never wedge forever on a
//! dropped ack.

use std::collections::HashMap;
use std::collections::HashSet;

use biometrics::Counter;

use ringpaxos_pb::{Epoch, RingId, SetRing};

use crate::config::HostEntry;
use crate::ping::oracle::{pick_ring, HostQuality, OracleError};
use crate::ring::{RingConfiguration, SharedRing};

static RINGS_PROPOSED: Counter = Counter::new("ringpaxos.ring_manager.rings_proposed");
static RINGS_INSTALLED: Counter = Counter::new("ringpaxos.ring_manager.rings_installed");
static RING_RESETS: Counter = Counter::new("ringpaxos.ring_manager.ring_resets");
static ORACLE_REJECTIONS: Counter = Counter::new("ringpaxos.ring_manager.oracle_rejections");
static ACK_TIMEOUTS: Counter = Counter::new("ringpaxos.ring_manager.ack_timeouts");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&RINGS_PROPOSED);
    collector.register_counter(&RINGS_INSTALLED);
    collector.register_counter(&RING_RESETS);
    collector.register_counter(&ORACLE_REJECTIONS);
    collector.register_counter(&ACK_TIMEOUTS);
}

pub fn register_monitors(_hey_listen: &mut tatl::HeyListen) {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingManagerState {
    Looking,
    WaitAck,
    Ok,
}

pub struct RingManager {
    self_host_id: u32,
    hosts: Vec<HostEntry>,
    ok_to_miss_datacenter: bool,
    state: RingManagerState,
    candidate: Option<RingConfiguration>,
    acked: HashSet<u32>,
    next_ring_id: u32,
    shared_ring: SharedRing,
    /// When the current `WAIT_ACK` round started, in the same clock `tick` is driven with.
    wait_ack_since: Option<u64>,
}

impl RingManager {
    pub fn new(
        self_host_id: u32,
        hosts: Vec<HostEntry>,
        ok_to_miss_datacenter: bool,
        shared_ring: SharedRing,
    ) -> Self {
        Self {
            self_host_id,
            hosts,
            ok_to_miss_datacenter,
            state: RingManagerState::Looking,
            candidate: None,
            acked: HashSet::new(),
            next_ring_id: 1,
            shared_ring,
            wait_ack_since: None,
        }
    }

    pub fn state(&self) -> RingManagerState {
        self.state
    }

    /// `LOOKING` step: run the oracle over current ping quality and, if it finds a quorum,
    /// transition to `WAIT_ACK` and return the `SetRing` to multicast. `now` marks the start of
    /// the ack-collection deadline `tick` enforces. Returns `None` if the oracle has nothing to
    /// propose yet, or this host is not `LOOKING`.
    pub fn propose(
        &mut self,
        quality: &HashMap<u32, HostQuality>,
        epoch: Epoch,
        now: u64,
    ) -> Option<SetRing> {
        if self.state != RingManagerState::Looking {
            return None;
        }
        match pick_ring(&self.hosts, quality, self.ok_to_miss_datacenter) {
            Ok(host_ids) => {
                let ring_id = RingId::new(self.next_ring_id);
                self.next_ring_id += 1;
                let ring = RingConfiguration::new(ring_id, epoch, host_ids.clone(), self.self_host_id);
                self.candidate = Some(ring);
                self.acked.clear();
                self.state = RingManagerState::WaitAck;
                self.wait_ack_since = Some(now);
                RINGS_PROPOSED.click();
                Some(SetRing {
                    request_id: Default::default(),
                    group_guid: epoch,
                    ring_id,
                    ring_host_ids: host_ids,
                })
            }
            Err(OracleError::NoQuorum) | Err(OracleError::DatacenterUncovered) => {
                ORACLE_REJECTIONS.click();
                None
            }
        }
    }

    /// Drive the `WAIT_ACK` deadline: if acks have not all arrived within `timeout_ms` of the
    /// `propose` that started this round, reset back to `LOOKING` so the oracle gets another
    /// chance with fresher ping data. A no-op outside `WAIT_ACK`.
    pub fn tick(&mut self, now: u64, timeout_ms: u64) {
        if self.state != RingManagerState::WaitAck {
            return;
        }
        if let Some(since) = self.wait_ack_since {
            if now.saturating_sub(since) >= timeout_ms {
                ACK_TIMEOUTS.click();
                self.reset();
            }
        }
    }

    /// `WAIT_ACK` step: record one acker.  Once every ring member has acked, install the ring and
    /// transition to `OK`.
    pub fn on_ack(&mut self, ring_id: RingId, from_host: u32) {
        let Some(candidate) = &self.candidate else {
            return;
        };
        if self.state != RingManagerState::WaitAck || candidate.ring_id != ring_id {
            return;
        }
        self.acked.insert(from_host);
        if candidate.host_ids.iter().all(|h| self.acked.contains(h)) {
            self.shared_ring.install(candidate.clone());
            self.state = RingManagerState::Ok;
            RINGS_INSTALLED.click();
        }
    }

    /// Ack collection timed out, or a member of the installed/candidate ring went down: tear down
    /// and start looking again.
    pub fn reset(&mut self) {
        RING_RESETS.click();
        self.state = RingManagerState::Looking;
        self.candidate = None;
        self.acked.clear();
        self.wait_ack_since = None;
        self.shared_ring.clear();
    }

    /// Whether `host_id` going down should trigger [Self::reset]: true iff it is a member of the
    /// current candidate or installed ring.
    pub fn affects_current_ring(&self, host_id: u32) -> bool {
        self.candidate.as_ref().map(|c| c.contains(host_id)).unwrap_or(false)
    }
}
