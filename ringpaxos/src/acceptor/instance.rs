//! The per-instance acceptor state machine: Paxos promise/vote rules for exactly one
//! `(epoch, instanceId)` pair.

use biometrics::Counter;

use ringpaxos_pb::{BallotId, Value, ValueId, Vote};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static PHASE1_FAILS: Counter = Counter::new("ringpaxos.acceptor.instance.phase1_fails");
static PHASE2_FAILS: Counter = Counter::new("ringpaxos.acceptor.instance.phase2_fails");
static VOTE_FAILS: Counter = Counter::new("ringpaxos.acceptor.instance.vote_fails");
static UNKNOWN_VALUE_VOTES: Counter = Counter::new("ringpaxos.acceptor.instance.unknown_value_votes");
static RECOVERED_VOTES: Counter = Counter::new("ringpaxos.acceptor.instance.recovered_votes");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&PHASE1_FAILS);
    collector.register_counter(&PHASE2_FAILS);
    collector.register_counter(&VOTE_FAILS);
    collector.register_counter(&UNKNOWN_VALUE_VOTES);
    collector.register_counter(&RECOVERED_VOTES);
}

///////////////////////////////////////// operation results /////////////////////////////////////////

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NextBallotResult {
    Promised {
        last_voted_ballot: BallotId,
        last_voted_value: Value,
    },
    Rejected {
        highest_promised: BallotId,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BeginBallotResult {
    /// `released_vote` is the stashed vote that had been waiting on this value's bytes, now
    /// safe to forward along the ring (see `ring_voter`).
    Ok { released_vote: Option<Vote> },
    Rejected { highest_promised: BallotId },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VoteResult {
    Ok,
    UnknownValue,
    TooLow { highest_promised: BallotId },
}

//////////////////////////////////////////// AcceptorInstance ////////////////////////////////////////

/// Paxos acceptor state for one instance.  Owned exclusively by [super::store::AcceptorStore].
#[derive(Clone, Debug, Default)]
pub struct AcceptorInstance {
    highest_promised: BallotId,
    highest_voted: BallotId,
    last_voted_value: Value,
    pending_vote: Option<Vote>,
    committed: bool,
}

impl AcceptorInstance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highest_promised(&self) -> BallotId {
        self.highest_promised
    }

    pub fn highest_voted(&self) -> BallotId {
        self.highest_voted
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    fn check_invariant(&self) {
        debug_assert!(self.highest_voted <= self.highest_promised);
        debug_assert!(!self.committed || (self.highest_voted.is_valid() && !self.last_voted_value.is_empty()));
    }

    /// Phase 1.  Succeeds iff `ballot > highest_promised`; equal ballots are rejected because
    /// ballots are unique per proposer by construction.
    pub fn next_ballot(&mut self, ballot: BallotId) -> NextBallotResult {
        if ballot <= self.highest_promised {
            PHASE1_FAILS.click();
            return NextBallotResult::Rejected {
                highest_promised: self.highest_promised,
            };
        }
        self.highest_promised = ballot;
        self.check_invariant();
        NextBallotResult::Promised {
            last_voted_ballot: self.highest_voted,
            last_voted_value: self.last_voted_value.clone(),
        }
    }

    /// Phase 2.  Succeeds iff `ballot >= highest_promised`.  Releases a stashed vote if it was
    /// waiting on exactly this `(ballot, value.id)`.
    pub fn begin_ballot(&mut self, ballot: BallotId, value: Value) -> BeginBallotResult {
        if ballot < self.highest_promised {
            PHASE2_FAILS.click();
            return BeginBallotResult::Rejected {
                highest_promised: self.highest_promised,
            };
        }
        self.highest_promised = ballot;
        if ballot > self.highest_voted {
            self.highest_voted = ballot;
        }
        self.last_voted_value = value;
        let released_vote = match &self.pending_vote {
            Some(v) if v.ballot == ballot && v.value_id == self.last_voted_value.id => {
                RECOVERED_VOTES.click();
                self.pending_vote.take()
            }
            _ => None,
        };
        self.check_invariant();
        BeginBallotResult::Ok { released_vote }
    }

    /// Ring-voter entry point.  Requires `vote.ballot >= highest_promised`.  If this instance has
    /// not yet seen the Phase-2 bytes for `vote.value_id`, the vote is stashed and the ring
    /// stalls until `begin_ballot` releases it.
    pub fn vote(&mut self, vote: Vote) -> VoteResult {
        if vote.ballot < self.highest_promised {
            VOTE_FAILS.click();
            return VoteResult::TooLow {
                highest_promised: self.highest_promised,
            };
        }
        if self.last_voted_value.id != vote.value_id {
            UNKNOWN_VALUE_VOTES.click();
            self.pending_vote = Some(vote);
            return VoteResult::UnknownValue;
        }
        VoteResult::Ok
    }

    /// Marks this instance committed iff `value_id` matches the last voted value.
    pub fn commit(&mut self, value_id: ValueId) -> bool {
        if self.last_voted_value.id != value_id {
            return false;
        }
        self.committed = true;
        self.check_invariant();
        true
    }

    /// Returns the committed `(value, ballot)` pair, if any.
    pub fn value(&self) -> Option<(Value, BallotId)> {
        if self.committed {
            Some((self.last_voted_value.clone(), self.highest_voted))
        } else {
            None
        }
    }
}
