//! Dispatches an incoming [Frame] to the subsystem that owns its message type.  The actual
//! subsystem wiring (acceptor store, ring voter, proposer, ring manager, recovery cache) lives on
//! whatever implements [Dispatcher] — kept as a trait here so the dispatch table itself can be
//! unit tested against a fake.

use ringpaxos_pb::{
    BatchPhase1Reply, BatchPhase1Request, Frame, Phase1Reply, Phase1Request, Phase2Request, Ping,
    Pong, RecoveryReply, RecoveryRequest, SetRing, SetRingAck, Vote,
};

use crate::ring_voter::VoteAction;

/// Implementors hold their subsystem state behind interior mutability (the same pattern
/// `PendingRequests` uses), so dispatch can be driven concurrently by one receive loop without
/// needing exclusive access to the whole host.
pub trait Dispatcher {
    fn handle_ping(&self, ping: Ping) -> Pong;
    fn handle_set_ring(&self, req: SetRing) -> SetRingAck;
    fn handle_batch_phase1(&self, req: BatchPhase1Request) -> BatchPhase1Reply;
    fn handle_phase1(&self, req: Phase1Request) -> Phase1Reply;
    fn handle_phase2(&self, req: Phase2Request) -> Vec<VoteAction>;
    fn handle_vote(&self, vote: Vote) -> VoteAction;
    fn handle_recovery(&self, req: RecoveryRequest) -> RecoveryReply;
}

/// What the caller should do once dispatch returns.
pub enum DispatchOutcome {
    /// Unicast this reply back to the sender.
    Reply(Frame),
    /// Carry out these ring-voter side effects (forward vote(s) onward); Phase2 and Vote frames
    /// never get a direct unicast reply — completion is signaled by the vote reaching the master.
    VoteActions(Vec<VoteAction>),
    /// Nothing to send back (e.g. an ack, or a frame this host dropped as stale).
    None,
}

pub fn dispatch<D: Dispatcher>(dispatcher: &D, frame: Frame) -> DispatchOutcome {
    match frame {
        Frame::Ping(ping) => DispatchOutcome::Reply(Frame::Pong(dispatcher.handle_ping(ping))),
        Frame::SetRing(req) => DispatchOutcome::Reply(Frame::SetRingAck(dispatcher.handle_set_ring(req))),
        Frame::BatchPhase1Request(req) => {
            DispatchOutcome::Reply(Frame::BatchPhase1Reply(dispatcher.handle_batch_phase1(req)))
        }
        Frame::Phase1Request(req) => DispatchOutcome::Reply(Frame::Phase1Reply(dispatcher.handle_phase1(req))),
        Frame::Phase2Request(req) => DispatchOutcome::VoteActions(dispatcher.handle_phase2(req)),
        Frame::Vote(vote) => DispatchOutcome::VoteActions(vec![dispatcher.handle_vote(vote)]),
        Frame::RecoveryRequest(req) => {
            DispatchOutcome::Reply(Frame::RecoveryReply(dispatcher.handle_recovery(req)))
        }
        // Replies to our own outgoing requests: handled by the requester's pending-request table,
        // never reach the dispatcher.
        Frame::Pong(_)
        | Frame::SetRingAck(_)
        | Frame::BatchPhase1Reply(_)
        | Frame::Phase1Reply(_)
        | Frame::RecoveryReply(_) => DispatchOutcome::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringpaxos_pb::{BallotId, InstanceId};

    struct EchoDispatcher;

    impl Dispatcher for EchoDispatcher {
        fn handle_ping(&self, ping: Ping) -> Pong {
            Pong {
                request_id: ping.request_id,
                id: ping.id,
                sender_now: ping.sender_now,
            }
        }
        fn handle_set_ring(&self, req: SetRing) -> SetRingAck {
            SetRingAck {
                request_id: req.request_id,
                ring_id: req.ring_id,
            }
        }
        fn handle_batch_phase1(&self, req: BatchPhase1Request) -> BatchPhase1Reply {
            BatchPhase1Reply::Ok {
                request_id: req.request_id,
                reserved_instances: vec![],
            }
        }
        fn handle_phase1(&self, req: Phase1Request) -> Phase1Reply {
            Phase1Reply::Ok {
                request_id: req.request_id,
                last_voted_ballot: BallotId::INVALID,
                last_voted_value: Default::default(),
            }
        }
        fn handle_phase2(&self, _req: Phase2Request) -> Vec<VoteAction> {
            vec![VoteAction::None]
        }
        fn handle_vote(&self, _vote: Vote) -> VoteAction {
            VoteAction::None
        }
        fn handle_recovery(&self, req: RecoveryRequest) -> RecoveryReply {
            RecoveryReply::NotCommitted {
                request_id: req.request_id,
            }
        }
    }

    #[test]
    fn ping_dispatches_to_pong_reply() {
        let d = EchoDispatcher;
        let outcome = dispatch(
            &d,
            Frame::Ping(Ping {
                request_id: Default::default(),
                id: 9,
                sender_now: 1,
            }),
        );
        match outcome {
            DispatchOutcome::Reply(Frame::Pong(pong)) => assert_eq!(9, pong.id),
            _ => panic!("expected a Pong reply"),
        }
    }

    #[test]
    fn phase2_dispatches_to_vote_actions() {
        let d = EchoDispatcher;
        let outcome = dispatch(
            &d,
            Frame::Phase2Request(Phase2Request {
                request_id: Default::default(),
                epoch: Default::default(),
                ring_id: Default::default(),
                instance: InstanceId::new(0),
                ballot: BallotId::new(1),
                value: Default::default(),
                commits: vec![],
            }),
        );
        assert!(matches!(outcome, DispatchOutcome::VoteActions(_)));
    }

    #[test]
    fn reply_frames_produce_no_dispatch_outcome() {
        let d = EchoDispatcher;
        let outcome = dispatch(&d, Frame::Pong(Pong::default()));
        assert!(matches!(outcome, DispatchOutcome::None));
    }
}
