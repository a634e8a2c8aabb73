//! Tracks in-flight requests this host originated and resolves them against incoming replies:
//! a unicast request completes on its first reply, a multicast request (Phase-1 batching, the
//! ring-manager's `SetRing`) completes once every expected host has acked.
//!
//! Completion is keyed by `request_id` (a fresh GUID per attempt), so a stale timeout firing after
//! a retry already replaced the entry is harmless: the remove is simply a no-op.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use biometrics::Counter;
use tokio::sync::oneshot;
use tokio::time::timeout;

use ringpaxos_pb::{Error, Frame, RequestId};

static REQUESTS_REGISTERED: Counter = Counter::new("ringpaxos.rpc.requester.registered");
static REQUESTS_COMPLETED: Counter = Counter::new("ringpaxos.rpc.requester.completed");
static REQUESTS_TIMED_OUT: Counter = Counter::new("ringpaxos.rpc.requester.timed_out");
static REPLIES_UNMATCHED: Counter = Counter::new("ringpaxos.rpc.requester.replies_unmatched");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&REQUESTS_REGISTERED);
    collector.register_counter(&REQUESTS_COMPLETED);
    collector.register_counter(&REQUESTS_TIMED_OUT);
    collector.register_counter(&REPLIES_UNMATCHED);
}

/// What a caller gets back once a request resolves.
pub enum Reply {
    /// A unicast request's single reply.
    Unicast(Frame),
    /// A multicast request's replies, one per acking host, in arrival order.
    Multicast(Vec<(u32, Frame)>),
}

enum Kind {
    Unicast,
    Multicast { needed_mask: u64, acked_mask: u64, replies: Vec<(u32, Frame)> },
}

struct Entry {
    kind: Kind,
    tx: Option<oneshot::Sender<Reply>>,
}

/// The pending-request table.  Owned by whichever task owns the UDP socket, since all mutation
/// must be serialized with that task's receive loop.
#[derive(Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<RequestId, Entry>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, request_id: RequestId, kind: Kind) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().unwrap().insert(request_id, Entry { kind, tx: Some(tx) });
        REQUESTS_REGISTERED.click();
        rx
    }

    pub fn register_unicast(&self, request_id: RequestId) -> oneshot::Receiver<Reply> {
        self.insert(request_id, Kind::Unicast)
    }

    /// `needed_mask` is the set of ring-member host ids (as bits) whose ack completes this
    /// request — see [crate::ring::RingConfiguration::ring_mask].
    pub fn register_multicast(&self, request_id: RequestId, needed_mask: u64) -> oneshot::Receiver<Reply> {
        self.insert(
            request_id,
            Kind::Multicast {
                needed_mask,
                acked_mask: 0,
                replies: Vec::new(),
            },
        )
    }

    /// Feed an incoming reply frame to its matching pending request, if any.  Returns true if it
    /// matched and was applied (the request may or may not have completed as a result).
    pub fn on_reply(&self, request_id: RequestId, from_host: u32, frame: Frame) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(&request_id) else {
            REPLIES_UNMATCHED.click();
            return false;
        };
        let done = match &mut entry.kind {
            Kind::Unicast => true,
            Kind::Multicast { needed_mask, acked_mask, replies } => {
                if from_host < 64 {
                    *acked_mask |= 1 << from_host;
                }
                replies.push((from_host, frame.clone()));
                (*acked_mask & *needed_mask) == *needed_mask
            }
        };
        if done {
            if let Some(entry) = entries.remove(&request_id) {
                if let Some(tx) = entry.tx {
                    let reply = match entry.kind {
                        Kind::Unicast => Reply::Unicast(frame),
                        Kind::Multicast { replies, .. } => Reply::Multicast(replies),
                    };
                    let _ = tx.send(reply);
                    REQUESTS_COMPLETED.click();
                }
            }
        }
        true
    }

    /// Drop a pending request's bookkeeping, e.g. after the caller's own timeout fires.  A no-op
    /// if the request already completed (it was removed from the table by [Self::on_reply]).
    pub fn expire(&self, request_id: RequestId) {
        if self.entries.lock().unwrap().remove(&request_id).is_some() {
            REQUESTS_TIMED_OUT.click();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Wait for `rx` to resolve, or time out and expire the request from `pending`.
pub async fn await_reply(
    pending: &PendingRequests,
    request_id: RequestId,
    rx: oneshot::Receiver<Reply>,
    deadline: Duration,
) -> Result<Reply, Error> {
    match timeout(deadline, rx).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(_)) => Err(Error::TransportFailure {
            core: Default::default(),
            what: "request channel dropped".to_string(),
        }),
        Err(_) => {
            pending.expire(request_id);
            Err(Error::TimedOut { core: Default::default() })
        }
    }
}
