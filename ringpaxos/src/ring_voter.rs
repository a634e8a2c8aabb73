//! Forwards accept-votes along the acceptor ring, collapsing all-to-all quorum collection into a
//! single chain traversal: one multicast (Phase-2) followed by one unicast hop per ring member.

use biometrics::Counter;

use ringpaxos_pb::{Phase2Request, Vote, VoteTarget};

use crate::acceptor::store::{AcceptorStore, StoreResult};
use crate::acceptor::{BeginBallotResult, VoteResult};
use crate::ring::RingConfiguration;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static STALE_RING: Counter = Counter::new("ringpaxos.ring_voter.stale_ring");
static STALE_EPOCH: Counter = Counter::new("ringpaxos.ring_voter.stale_epoch");
static VOTES_FORWARDED: Counter = Counter::new("ringpaxos.ring_voter.votes_forwarded");
static VOTES_DROPPED: Counter = Counter::new("ringpaxos.ring_voter.votes_dropped");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&STALE_RING);
    collector.register_counter(&STALE_EPOCH);
    collector.register_counter(&VOTES_FORWARDED);
    collector.register_counter(&VOTES_DROPPED);
}

/// A network side-effect the caller (the RPC fabric) must carry out after a `ring_voter`
/// operation completes.  Keeping this synchronous and data-only lets the core logic be unit
/// tested without sockets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VoteAction {
    /// Nothing to send.
    None,
    /// Unicast `vote` to the ring member with this host id (wraps to the master for the last
    /// ring member, since `RingConfiguration::next_ring_host` already encodes the wraparound).
    /// `vote.target` tells the recipient whether to forward again (`NextAcceptor`) or hand the
    /// vote to commit completion (`Master`).
    SendVote { to_host: u32, vote: Vote },
}

fn target_for(ring: &RingConfiguration) -> VoteTarget {
    if ring.is_last_ring_member() {
        VoteTarget::Master
    } else {
        VoteTarget::NextAcceptor
    }
}

/// Apply an incoming Phase-2 multicast to the local acceptor store, applying any piggybacked
/// commits and — if this host is the ring's designated first forwarder, or a previously stashed
/// vote is released by this message finally arriving — producing the vote(s) to send onward.
pub fn on_phase2(
    store: &mut AcceptorStore,
    ring: &RingConfiguration,
    self_host_id: u32,
    req: &Phase2Request,
) -> Vec<VoteAction> {
    let mut actions = Vec::new();
    if req.ring_id != ring.ring_id {
        STALE_RING.click();
        return actions;
    }
    if req.epoch != ring.epoch {
        STALE_EPOCH.click();
        return actions;
    }
    let result = store.begin_ballot(req.instance, req.ballot, req.value.clone());
    for commit in &req.commits {
        store.commit(commit.instance_id, commit.value_id);
    }
    let released = match result {
        StoreResult::Ok(BeginBallotResult::Ok { released_vote }) => released_vote,
        _ => None,
    };
    if let Some(mut vote) = released {
        vote.target = target_for(ring);
        if let Some(to_host) = ring.next_ring_host() {
            actions.push(VoteAction::SendVote { to_host, vote });
        }
    }
    if ring.is_first_forwarder() {
        let vote = Vote {
            request_id: req.request_id,
            epoch: req.epoch,
            ring_id: req.ring_id,
            instance: req.instance,
            ballot: req.ballot,
            value_id: req.value.id,
            target: target_for(ring),
        };
        if let Some(to_host) = ring.next_ring_host() {
            actions.push(VoteAction::SendVote { to_host, vote });
        }
    }
    let _ = self_host_id;
    actions
}

/// Apply an incoming unicast vote.  Forwards strictly along the path order; stashes on unknown
/// value; drops on stale ballot.
pub fn on_vote(store: &mut AcceptorStore, ring: &RingConfiguration, vote: Vote) -> VoteAction {
    if vote.ring_id != ring.ring_id {
        STALE_RING.click();
        return VoteAction::None;
    }
    if vote.epoch != ring.epoch {
        STALE_EPOCH.click();
        return VoteAction::None;
    }
    match store.vote(vote.instance, vote.clone()) {
        StoreResult::Ok(VoteResult::Ok) => match ring.next_ring_host() {
            Some(to_host) => {
                VOTES_FORWARDED.click();
                let mut vote = vote;
                vote.target = target_for(ring);
                VoteAction::SendVote { to_host, vote }
            }
            None => VoteAction::None,
        },
        StoreResult::Ok(VoteResult::UnknownValue) => VoteAction::None,
        StoreResult::Nacked(VoteResult::TooLow { .. }) | StoreResult::Refused => {
            VOTES_DROPPED.click();
            VoteAction::None
        }
        _ => VoteAction::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringpaxos_pb::{BallotId, Epoch, InstanceId, RingId, Value, ValueId};

    fn epoch() -> Epoch {
        Epoch::new([1u8; one_two_eight::BYTES])
    }

    fn ring(host_ids: Vec<u32>, self_host_id: u32) -> RingConfiguration {
        RingConfiguration::new(RingId::new(1), epoch(), host_ids, self_host_id)
    }

    #[test]
    fn first_forwarder_synthesizes_vote_on_phase2() {
        let mut store = AcceptorStore::new(epoch(), 100, 100);
        let ring = ring(vec![0, 1, 2], 1);
        let req = Phase2Request {
            request_id: Default::default(),
            epoch: epoch(),
            ring_id: RingId::new(1),
            instance: InstanceId::new(0),
            ballot: BallotId::new(1),
            value: Value::new(ValueId::new([9; one_two_eight::BYTES]), vec![9]),
            commits: vec![],
        };
        let actions = on_phase2(&mut store, &ring, 1, &req);
        assert_eq!(1, actions.len());
        match &actions[0] {
            VoteAction::SendVote { to_host, vote } => {
                assert_eq!(2, *to_host);
                assert_eq!(req.value.id, vote.value_id);
            }
            VoteAction::None => panic!("expected a vote"),
        }
    }

    #[test]
    fn non_forwarder_produces_no_action_on_clean_phase2() {
        let mut store = AcceptorStore::new(epoch(), 100, 100);
        let ring = ring(vec![0, 1, 2], 2);
        let req = Phase2Request {
            request_id: Default::default(),
            epoch: epoch(),
            ring_id: RingId::new(1),
            instance: InstanceId::new(0),
            ballot: BallotId::new(1),
            value: Value::new(ValueId::new([9; one_two_eight::BYTES]), vec![9]),
            commits: vec![],
        };
        assert!(on_phase2(&mut store, &ring, 2, &req).is_empty());
    }

    #[test]
    fn vote_forwards_along_ring_and_wraps_to_master() {
        let mut store = AcceptorStore::new(epoch(), 100, 100);
        let ring = ring(vec![0, 1, 2], 2);
        let v = Value::new(ValueId::new([9; one_two_eight::BYTES]), vec![9]);
        store.begin_ballot(InstanceId::new(0), BallotId::new(1), v.clone());
        let vote = Vote {
            request_id: Default::default(),
            epoch: epoch(),
            ring_id: RingId::new(1),
            instance: InstanceId::new(0),
            ballot: BallotId::new(1),
            value_id: v.id,
            target: ringpaxos_pb::VoteTarget::NextAcceptor,
        };
        let action = on_vote(&mut store, &ring, vote);
        assert_eq!(
            VoteAction::SendVote {
                to_host: 0,
                vote: Vote {
                    request_id: Default::default(),
                    epoch: epoch(),
                    ring_id: RingId::new(1),
                    instance: InstanceId::new(0),
                    ballot: BallotId::new(1),
                    value_id: v.id,
                    target: ringpaxos_pb::VoteTarget::Master,
                }
            },
            action
        );
    }

    #[test]
    fn vote_stashes_and_releases_on_later_phase2() {
        let mut store = AcceptorStore::new(epoch(), 100, 100);
        let ring = ring(vec![0, 1, 2], 1);
        let v = Value::new(ValueId::new([9; one_two_eight::BYTES]), vec![9]);
        let vote = Vote {
            request_id: Default::default(),
            epoch: epoch(),
            ring_id: RingId::new(1),
            instance: InstanceId::new(0),
            ballot: BallotId::new(1),
            value_id: v.id,
            target: ringpaxos_pb::VoteTarget::NextAcceptor,
        };
        assert_eq!(VoteAction::None, on_vote(&mut store, &ring, vote));
        let req = Phase2Request {
            request_id: Default::default(),
            epoch: epoch(),
            ring_id: RingId::new(1),
            instance: InstanceId::new(0),
            ballot: BallotId::new(1),
            value: v,
            commits: vec![],
        };
        let actions = on_phase2(&mut store, &ring, 1, &req);
        assert_eq!(2, actions.len(), "expect released stash + synthesized forward vote");
    }
}
