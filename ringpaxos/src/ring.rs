//! Ring configuration: the ordered quorum subset of acceptors through which Phase-2 votes and
//! the ring-manager's `SetRing` control messages flow.  Shared across every ring holder (Phase-1
//! batcher, Phase-1 handler, Phase-2 handler, ring voter) through [SharedRing]'s atomic swap.

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use ringpaxos_pb::{Epoch, RingId};

/// `(ringId, hostIds, epoch)` plus the derived quantities every ring holder needs: `ringMask`,
/// `ringIndex`, and the addresses of this host's ring neighbors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RingConfiguration {
    pub ring_id: RingId,
    pub epoch: Epoch,
    /// Ordered ring membership, host 0 (the master) always first.
    pub host_ids: Vec<u32>,
    self_host_id: u32,
}

impl RingConfiguration {
    pub fn new(ring_id: RingId, epoch: Epoch, host_ids: Vec<u32>, self_host_id: u32) -> Self {
        Self {
            ring_id,
            epoch,
            host_ids,
            self_host_id,
        }
    }

    pub fn len(&self) -> usize {
        self.host_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host_ids.is_empty()
    }

    /// True iff `host_id` appears in this ring.
    pub fn contains(&self, host_id: u32) -> bool {
        self.host_ids.contains(&host_id)
    }

    /// This host's position in the ring, or `None` if it is not a ring member.
    pub fn ring_index(&self) -> Option<usize> {
        self.host_ids.iter().position(|&h| h == self.self_host_id)
    }

    /// Bitmask of acceptors (other than self) that are members of this ring.  Supports groups of
    /// up to 64 hosts per spec.md §2.
    pub fn ring_mask(&self) -> u64 {
        let mut mask = 0u64;
        for &host in &self.host_ids {
            if host != self.self_host_id && host < 64 {
                mask |= 1 << host;
            }
        }
        mask
    }

    pub fn is_master(&self) -> bool {
        self.self_host_id == 0
    }

    /// True iff this host is the first acceptor in the ring (index 1; index 0 is the master's
    /// own send, not a forwarding step) responsible for synthesizing the initial vote.
    pub fn is_first_forwarder(&self) -> bool {
        self.ring_index() == Some(1)
    }

    /// The host id this acceptor should forward a vote to: the next ring member, or the master
    /// (`host_ids[0]`) if this is the last member, per the wraparound described in spec.md §4.3.
    pub fn next_ring_host(&self) -> Option<u32> {
        let idx = self.ring_index()?;
        if idx + 1 < self.host_ids.len() {
            Some(self.host_ids[idx + 1])
        } else {
            Some(self.host_ids[0])
        }
    }

    /// True iff this host is the last member of the ring, i.e. its forwarded vote wraps back to
    /// the master rather than landing on another acceptor.
    pub fn is_last_ring_member(&self) -> bool {
        matches!(self.ring_index(), Some(idx) if idx + 1 == self.host_ids.len())
    }

    pub fn last_ring_host(&self) -> Option<u32> {
        self.host_ids.last().copied()
    }

    pub fn master_host_id(&self) -> u32 {
        self.host_ids.first().copied().unwrap_or(0)
    }
}

/// Resolves ring host ids to socket addresses using the fixed bootstrap host table.
pub struct HostAddressTable {
    udp_addrs: Vec<SocketAddr>,
}

impl HostAddressTable {
    pub fn new(udp_addrs: Vec<SocketAddr>) -> Self {
        Self { udp_addrs }
    }

    pub fn udp_addr(&self, host_id: u32) -> Option<SocketAddr> {
        self.udp_addrs.get(host_id as usize).copied()
    }
}

/// The atomically-swappable ring snapshot shared by every ring holder.  Readers never block a
/// writer installing a new ring, matching spec.md §5's "shared via atomic pointer swap."
#[derive(Clone, Default)]
pub struct SharedRing {
    inner: Arc<ArcSwapOption<RingConfiguration>>,
}

impl SharedRing {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwapOption::from(None)),
        }
    }

    pub fn load(&self) -> Option<Arc<RingConfiguration>> {
        self.inner.load_full()
    }

    pub fn install(&self, ring: RingConfiguration) {
        self.inner.store(Some(Arc::new(ring)));
    }

    /// Tears down the ring (e.g. on host-down detection), per `resetRingConfiguration(null)`.
    pub fn clear(&self) {
        self.inner.store(None);
    }
}
