//! Per-instance proposer state, owned exclusively by the proposer engine.  Transitions other
//! than the ones below are programming errors and abort via `assert!`, never silently ignored.

use ringpaxos_pb::{BallotId, InstanceId, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProposerState {
    Empty,
    P1Pending,
    P1Open,
    P2Pending,
    P2PendingClientValue,
    Closed,
}

#[derive(Clone, Debug)]
pub struct ProposerInstance {
    instance_id: InstanceId,
    ballot: BallotId,
    value: Option<Value>,
    has_client_value: bool,
    state: ProposerState,
}

impl ProposerInstance {
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            ballot: BallotId::INVALID,
            value: None,
            has_client_value: false,
            state: ProposerState::Empty,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn ballot(&self) -> BallotId {
        self.ballot
    }

    pub fn state(&self) -> ProposerState {
        self.state
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn has_client_value(&self) -> bool {
        self.has_client_value
    }

    /// `EMPTY -> P1_PENDING`, or a retry of an existing Phase-1 with a strictly greater ballot.
    pub fn start_phase1(&mut self, ballot: BallotId) {
        match self.state {
            ProposerState::Empty => {}
            ProposerState::P1Pending => {
                assert!(ballot > self.ballot, "phase-1 retries must strictly increase the ballot");
            }
            other => panic!("start_phase1 called from illegal state {other:?}"),
        }
        self.ballot = ballot;
        self.state = ProposerState::P1Pending;
    }

    /// Phase-1 came back with no previously-voted value: `P1_PENDING -> P1_OPEN`.
    pub fn mark_open(&mut self) {
        assert_eq!(ProposerState::P1Pending, self.state);
        self.state = ProposerState::P1Open;
    }

    /// Phase-1 came back reserved: `P1_PENDING -> P2_PENDING` directly, carrying the
    /// previously-voted value forward (the proposer must re-propose exactly that value).
    pub fn mark_reserved(&mut self, value: Value) {
        assert_eq!(ProposerState::P1Pending, self.state);
        self.value = Some(value);
        self.has_client_value = false;
        self.state = ProposerState::P2Pending;
    }

    /// `P1_OPEN -> P2_PENDING_CLIENT_VALUE`: binds a client value to a freely-choosable instance.
    pub fn bind_client_value(&mut self, value: Value) {
        assert_eq!(ProposerState::P1Open, self.state);
        self.value = Some(value);
        self.has_client_value = true;
        self.state = ProposerState::P2PendingClientValue;
    }

    /// On a higher conflicting ballot or a Phase-2 timeout: `{P2_PENDING, P2_PENDING_CLIENT_VALUE}
    /// -> P1_PENDING`, boosting the ballot.  Returns the client value to push back onto the
    /// ingest queue's head, if this instance held one.
    pub fn retry_after_conflict(&mut self, new_ballot: BallotId) -> Option<Value> {
        assert!(
            matches!(self.state, ProposerState::P2Pending | ProposerState::P2PendingClientValue),
            "retry_after_conflict called from illegal state {:?}",
            self.state
        );
        assert!(new_ballot > self.ballot, "conflict retries must strictly increase the ballot");
        let returned_client_value = if self.has_client_value {
            self.value.take()
        } else {
            None
        };
        self.has_client_value = false;
        self.ballot = new_ballot;
        self.state = ProposerState::P1Pending;
        returned_client_value
    }

    /// `{P2_PENDING, P2_PENDING_CLIENT_VALUE} -> CLOSED`: the ring ack arrived.
    pub fn complete(&mut self) {
        assert!(
            matches!(self.state, ProposerState::P2Pending | ProposerState::P2PendingClientValue),
            "complete called from illegal state {:?}",
            self.state
        );
        self.state = ProposerState::Closed;
    }
}
