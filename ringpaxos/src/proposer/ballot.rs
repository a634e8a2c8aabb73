//! Mints ballots of the form `1 + hostId + k*N`, guaranteeing uniqueness across hosts and strict
//! monotonicity on retry for a single host.

use ringpaxos_pb::BallotId;

#[derive(Clone, Copy, Debug)]
pub struct BallotGenerator {
    host_id: u32,
    num_hosts: u32,
}

impl BallotGenerator {
    pub fn new(host_id: u32, num_hosts: u32) -> Self {
        assert!(num_hosts > 0);
        assert!(host_id < num_hosts);
        Self { host_id, num_hosts }
    }

    /// The initial ballot this host will use for a fresh Phase-1.
    pub fn initial(&self) -> BallotId {
        BallotId::first_for_host(self.host_id)
    }

    /// Given a ballot this host's Phase-1/Phase-2 was rejected at (`last_promised`), returns the
    /// smallest strictly greater ballot belonging to this host.
    pub fn boost(&self, last_promised: BallotId) -> BallotId {
        last_promised.boost(self.host_id, self.num_hosts)
    }
}
