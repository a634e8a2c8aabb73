//! ringpaxos_pb provides the wire protocol for the ring-paxos total-order
//! broadcast service: the GUID-backed data model (epoch, instance, ballot,
//! value), the UDP multicast/unicast message set, and the TCP recovery and
//! value-ingest framing.

use prototk_derive::Message;

use one_two_eight::{generate_id, generate_id_prototk};

use zerror_core::ErrorCore;

///////////////////////////////////////////// Constants ////////////////////////////////////////////

/// Maximum size, in bytes, of a single value's opaque payload.
pub const MAX_VALUE_BYTES: usize = 8000;
/// Maximum size, in bytes, of a single UDP datagram this protocol will send.
pub const MAX_DATAGRAM_BYTES: usize = 8950;
/// Maximum number of commit records piggybacked onto one Phase2 request.
pub const COMMIT_PIGGYBACK_BATCH: usize = 10;
/// Maximum number of instance ids batched into one TCP BatchRecovery request.
pub const MAX_RECOVERY_BATCH: usize = 6000;

//////////////////////////////////////////////// GUID ///////////////////////////////////////////////

generate_id! {GUID, "guid:"}
generate_id_prototk! {GUID}

/// An [Epoch] identifies a master incarnation.  Changing it at any participant resets all
/// epoch-scoped state.
pub type Epoch = GUID;
/// The id a client assigns a [Value] when it is produced.
pub type ValueId = GUID;
/// Correlates an RPC request with its reply.
pub type RequestId = GUID;

impl GUID {
    /// True iff this is the zero GUID, used throughout as "no value"/"no epoch yet".
    pub fn is_empty(&self) -> bool {
        *self == GUID::BOTTOM
    }
}

///////////////////////////////////////////// InstanceId ////////////////////////////////////////////

/// Dense, zero-based instance identifier, scoped to an [Epoch].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Message)]
pub struct InstanceId {
    #[prototk(1, uint64)]
    pub id: u64,
}

impl InstanceId {
    pub const ZERO: InstanceId = InstanceId { id: 0 };

    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn next(self) -> Self {
        Self { id: self.id + 1 }
    }
}

impl From<u64> for InstanceId {
    fn from(id: u64) -> Self {
        Self { id }
    }
}

impl From<InstanceId> for u64 {
    fn from(iid: InstanceId) -> u64 {
        iid.id
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

////////////////////////////////////////////// BallotId /////////////////////////////////////////////

/// A ballot number.  Zero is reserved to mean "no ballot has ever been promised."
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Message)]
pub struct BallotId {
    #[prototk(1, uint32)]
    pub id: u32,
}

impl BallotId {
    pub const INVALID: BallotId = BallotId { id: 0 };

    pub fn new(id: u32) -> Self {
        Self { id }
    }

    pub fn is_valid(&self) -> bool {
        self.id != 0
    }

    /// The smallest ballot belonging to `host_id` in a group of `num_hosts` acceptors, i.e.
    /// `1 + host_id`.
    pub fn first_for_host(host_id: u32) -> BallotId {
        BallotId::new(1 + host_id)
    }

    /// The smallest ballot belonging to `host_id` that is strictly greater than `self`, of the
    /// form `1 + host_id + k * num_hosts`.  Mirrors the teacher's `BallotGenerator::boostBallotId`.
    pub fn boost(self, host_id: u32, num_hosts: u32) -> BallotId {
        if !self.is_valid() {
            return BallotId::first_for_host(host_id);
        }
        let k = (self.id - 1) / num_hosts;
        let boosted = 1 + host_id + (k + 1) * num_hosts;
        debug_assert!(boosted > self.id);
        BallotId::new(boosted)
    }

    /// True iff `ballot mod num_hosts == (1 + host_id) mod num_hosts`, i.e. the ballot was minted
    /// by `host_id` under this scheme (property 4 of the testable-properties list).
    pub fn belongs_to(&self, host_id: u32, num_hosts: u32) -> bool {
        self.id % num_hosts == (1 + host_id) % num_hosts
    }
}

impl std::fmt::Display for BallotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

////////////////////////////////////////////// RingId ///////////////////////////////////////////////

/// Identifies a specific ring configuration.  Zero means "no ring installed."
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Message)]
pub struct RingId {
    #[prototk(1, uint32)]
    pub id: u32,
}

impl RingId {
    pub const INVALID: RingId = RingId { id: 0 };

    pub fn new(id: u32) -> Self {
        Self { id }
    }

    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

////////////////////////////////////////////////// Value ////////////////////////////////////////////

/// An opaque client value.  Identical `id`s are assumed to carry identical `data` (used for vote
/// de-dup in the acceptor-instance state machine).
#[derive(Clone, Debug, Default, Eq, PartialEq, Message)]
pub struct Value {
    #[prototk(1, message)]
    pub id: ValueId,
    #[prototk(2, bytes)]
    pub data: Vec<u8>,
}

impl Value {
    pub fn new(id: ValueId, data: Vec<u8>) -> Self {
        Self { id, data }
    }

    /// True iff this is the "no value yet" sentinel.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Reject oversized payloads up front, per spec.
    pub fn validate(&self) -> Result<(), Error> {
        if self.data.len() > MAX_VALUE_BYTES {
            return Err(Error::RequestTooLarge {
                core: ErrorCore::default(),
                size: self.data.len() as u64,
            });
        }
        Ok(())
    }
}

////////////////////////////////////////// CommitRecord /////////////////////////////////////////////

/// A `(InstanceId, ValueId)` pair queued for piggyback on the next Phase2 message.
#[derive(Clone, Debug, Default, Eq, PartialEq, Message)]
pub struct CommitRecord {
    #[prototk(1, message)]
    pub instance_id: InstanceId,
    #[prototk(2, message)]
    pub value_id: ValueId,
}

///////////////////////////////////////// ReservedInstance //////////////////////////////////////////

/// One entry of a [BatchPhase1Reply]'s `Ok` variant: an instance for which some acceptor had
/// already voted, along with the ballot and value it voted for.
#[derive(Clone, Debug, Default, Message)]
pub struct ReservedInstance {
    #[prototk(1, message)]
    pub instance_id: InstanceId,
    #[prototk(2, message)]
    pub ballot: BallotId,
    #[prototk(3, message)]
    pub value: Value,
}

////////////////////////////////////////////////// Ping /////////////////////////////////////////////

#[derive(Clone, Debug, Default, Message)]
pub struct Ping {
    #[prototk(1, message)]
    pub request_id: RequestId,
    #[prototk(2, uint64)]
    pub id: u64,
    #[prototk(3, uint64)]
    pub sender_now: u64,
}

#[derive(Clone, Debug, Default, Message)]
pub struct Pong {
    #[prototk(1, message)]
    pub request_id: RequestId,
    #[prototk(2, uint64)]
    pub id: u64,
    #[prototk(3, uint64)]
    pub sender_now: u64,
}

///////////////////////////////////////////////// SetRing ///////////////////////////////////////////

#[derive(Clone, Debug, Default, Message)]
pub struct SetRing {
    #[prototk(1, message)]
    pub request_id: RequestId,
    #[prototk(2, message)]
    pub group_guid: Epoch,
    #[prototk(3, message)]
    pub ring_id: RingId,
    #[prototk(4, uint32)]
    pub ring_host_ids: Vec<u32>,
}

#[derive(Clone, Debug, Default, Message)]
pub struct SetRingAck {
    #[prototk(1, message)]
    pub request_id: RequestId,
    #[prototk(2, message)]
    pub ring_id: RingId,
}

//////////////////////////////////////////// BatchPhase1 ////////////////////////////////////////////

#[derive(Clone, Debug, Default, Message)]
pub struct BatchPhase1Request {
    #[prototk(1, message)]
    pub request_id: RequestId,
    #[prototk(2, message)]
    pub epoch: Epoch,
    #[prototk(3, message)]
    pub ring_id: RingId,
    #[prototk(4, message)]
    pub ballot: BallotId,
    #[prototk(5, message)]
    pub start_iid: InstanceId,
    #[prototk(6, message)]
    pub end_iid: InstanceId,
}

/// The per-acceptor reply to [BatchPhase1Request].  See spec open-question #2: when aggregated
/// across the ring, any `IidTooLow` makes the aggregate `IidTooLow`, but `reserved_instances`
/// accumulated from `Ok` replies already seen are still merged into the batcher's bookkeeping.
#[derive(Clone, Debug, Message)]
pub enum BatchPhase1Reply {
    #[prototk(1, message)]
    Ok {
        #[prototk(1, message)]
        request_id: RequestId,
        #[prototk(2, message)]
        reserved_instances: Vec<ReservedInstance>,
    },
    #[prototk(2, message)]
    IidTooLow {
        #[prototk(1, message)]
        request_id: RequestId,
        #[prototk(2, message)]
        retry_iid: InstanceId,
    },
}

impl Default for BatchPhase1Reply {
    fn default() -> Self {
        BatchPhase1Reply::Ok {
            request_id: RequestId::default(),
            reserved_instances: Vec::new(),
        }
    }
}

impl BatchPhase1Reply {
    pub fn request_id(&self) -> RequestId {
        match self {
            BatchPhase1Reply::Ok { request_id, .. } => *request_id,
            BatchPhase1Reply::IidTooLow { request_id, .. } => *request_id,
        }
    }
}

///////////////////////////////////////////// Phase1 ////////////////////////////////////////////////

#[derive(Clone, Debug, Default, Message)]
pub struct Phase1Request {
    #[prototk(1, message)]
    pub request_id: RequestId,
    #[prototk(2, message)]
    pub epoch: Epoch,
    #[prototk(3, message)]
    pub ring_id: RingId,
    #[prototk(4, message)]
    pub instance: InstanceId,
    #[prototk(5, message)]
    pub ballot: BallotId,
}

#[derive(Clone, Debug, Message)]
pub enum Phase1Reply {
    #[prototk(1, message)]
    Ok {
        #[prototk(1, message)]
        request_id: RequestId,
        #[prototk(2, message)]
        last_voted_ballot: BallotId,
        #[prototk(3, message)]
        last_voted_value: Value,
    },
    #[prototk(2, message)]
    BallotTooLow {
        #[prototk(1, message)]
        request_id: RequestId,
        #[prototk(2, message)]
        highest_promised: BallotId,
    },
}

impl Default for Phase1Reply {
    fn default() -> Self {
        Phase1Reply::Ok {
            request_id: RequestId::default(),
            last_voted_ballot: BallotId::default(),
            last_voted_value: Value::default(),
        }
    }
}

impl Phase1Reply {
    pub fn request_id(&self) -> RequestId {
        match self {
            Phase1Reply::Ok { request_id, .. } => *request_id,
            Phase1Reply::BallotTooLow { request_id, .. } => *request_id,
        }
    }
}

///////////////////////////////////////////// Phase2 ////////////////////////////////////////////////

#[derive(Clone, Debug, Default, Message)]
pub struct Phase2Request {
    #[prototk(1, message)]
    pub request_id: RequestId,
    #[prototk(2, message)]
    pub epoch: Epoch,
    #[prototk(3, message)]
    pub ring_id: RingId,
    #[prototk(4, message)]
    pub instance: InstanceId,
    #[prototk(5, message)]
    pub ballot: BallotId,
    #[prototk(6, message)]
    pub value: Value,
    #[prototk(7, message)]
    pub commits: Vec<CommitRecord>,
}

////////////////////////////////////////////////// Vote /////////////////////////////////////////////

/// Where a vote's final hop should land: the next acceptor on the ring, or the master that
/// initiated the Phase2.  Spec open-question #3 resolves the "ersatz ring" sentinel this way.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Message)]
pub enum VoteTarget {
    #[default]
    #[prototk(1, message)]
    NextAcceptor,
    #[prototk(2, message)]
    Master,
}

#[derive(Clone, Debug, Default, Message)]
pub struct Vote {
    #[prototk(1, message)]
    pub request_id: RequestId,
    #[prototk(2, message)]
    pub epoch: Epoch,
    #[prototk(3, message)]
    pub ring_id: RingId,
    #[prototk(4, message)]
    pub instance: InstanceId,
    #[prototk(5, message)]
    pub ballot: BallotId,
    #[prototk(6, message)]
    pub value_id: ValueId,
    /// Set by the sender: `Master` on the last ring hop so the recipient routes this to commit
    /// completion instead of another forwarding step.
    #[prototk(7, message)]
    pub target: VoteTarget,
}

/////////////////////////////////////////////// Recovery /////////////////////////////////////////////

/// Unicast UDP single-instance recovery, used opportunistically alongside the TCP batch path.
#[derive(Clone, Debug, Default, Message)]
pub struct RecoveryRequest {
    #[prototk(1, message)]
    pub request_id: RequestId,
    #[prototk(2, message)]
    pub epoch: Epoch,
    #[prototk(3, message)]
    pub instance: InstanceId,
}

#[derive(Clone, Debug, Message)]
pub enum RecoveryReply {
    #[prototk(1, message)]
    Ok {
        #[prototk(1, message)]
        request_id: RequestId,
        #[prototk(2, message)]
        value: Value,
    },
    #[prototk(2, message)]
    NotCommitted {
        #[prototk(1, message)]
        request_id: RequestId,
    },
    #[prototk(3, message)]
    Forgotten {
        #[prototk(1, message)]
        request_id: RequestId,
    },
}

impl Default for RecoveryReply {
    fn default() -> Self {
        RecoveryReply::NotCommitted {
            request_id: RequestId::default(),
        }
    }
}

impl RecoveryReply {
    pub fn request_id(&self) -> RequestId {
        match self {
            RecoveryReply::Ok { request_id, .. } => *request_id,
            RecoveryReply::NotCommitted { request_id, .. } => *request_id,
            RecoveryReply::Forgotten { request_id, .. } => *request_id,
        }
    }
}

////////////////////////////////////////////////// Frame ////////////////////////////////////////////

/// The UDP wire envelope.  Every datagram carries exactly one of these variants; the variant tag
/// doubles as the message-type enum from spec.md §6.
#[derive(Clone, Debug, Message)]
pub enum Frame {
    #[prototk(1, message)]
    Ping(Ping),
    #[prototk(2, message)]
    Pong(Pong),
    #[prototk(3, message)]
    SetRing(SetRing),
    #[prototk(4, message)]
    SetRingAck(SetRingAck),
    #[prototk(5, message)]
    BatchPhase1Request(BatchPhase1Request),
    #[prototk(6, message)]
    BatchPhase1Reply(BatchPhase1Reply),
    #[prototk(7, message)]
    Phase1Request(Phase1Request),
    #[prototk(8, message)]
    Phase1Reply(Phase1Reply),
    #[prototk(9, message)]
    Phase2Request(Phase2Request),
    #[prototk(10, message)]
    Vote(Vote),
    #[prototk(11, message)]
    RecoveryRequest(RecoveryRequest),
    #[prototk(12, message)]
    RecoveryReply(RecoveryReply),
}

impl Default for Frame {
    fn default() -> Self {
        Frame::Ping(Ping::default())
    }
}

impl Frame {
    pub fn request_id(&self) -> RequestId {
        match self {
            Frame::Ping(m) => m.request_id,
            Frame::Pong(m) => m.request_id,
            Frame::SetRing(m) => m.request_id,
            Frame::SetRingAck(m) => m.request_id,
            Frame::BatchPhase1Request(m) => m.request_id,
            Frame::BatchPhase1Reply(m) => m.request_id(),
            Frame::Phase1Request(m) => m.request_id,
            Frame::Phase1Reply(m) => m.request_id(),
            Frame::Phase2Request(m) => m.request_id,
            Frame::Vote(m) => m.request_id,
            Frame::RecoveryRequest(m) => m.request_id,
            Frame::RecoveryReply(m) => m.request_id(),
        }
    }
}

////////////////////////////////////////////// TCP: recovery ////////////////////////////////////////

/// Length-prefix header for every TCP message (recovery and ingest alike): a 4-byte big-endian
/// size followed by that many bytes of payload.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FixedSizeHeader {
    pub size: u32,
}

impl FixedSizeHeader {
    pub const ENCODED_LEN: usize = 4;

    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        self.size.to_be_bytes()
    }

    pub fn from_bytes(buf: [u8; Self::ENCODED_LEN]) -> Self {
        Self {
            size: u32::from_be_bytes(buf),
        }
    }
}

#[derive(Clone, Debug, Default, Message)]
pub struct RecoveredInstance {
    #[prototk(1, message)]
    pub instance_id: InstanceId,
    #[prototk(2, message)]
    pub ballot: BallotId,
    #[prototk(3, message)]
    pub value: Value,
}

#[derive(Clone, Debug, Default, Message)]
pub struct BatchRecoveryRequest {
    #[prototk(1, message)]
    pub epoch: Epoch,
    #[prototk(2, message)]
    pub instances: Vec<InstanceId>,
}

#[derive(Clone, Debug, Default, Message)]
pub struct BatchRecoveryReply {
    #[prototk(1, message)]
    pub epoch: Epoch,
    #[prototk(2, message)]
    pub recovered: Vec<RecoveredInstance>,
    #[prototk(3, message)]
    pub not_committed: Vec<InstanceId>,
    #[prototk(4, message)]
    pub forgotten: Vec<InstanceId>,
}

////////////////////////////////////////////// TCP: ingest //////////////////////////////////////////

/// Body pushed over the client-value-ingest TCP connection.
#[derive(Clone, Debug, Default, Message)]
pub struct ValueData {
    #[prototk(1, message)]
    pub id: ValueId,
    #[prototk(2, bytes)]
    pub data: Vec<u8>,
}

impl From<ValueData> for Value {
    fn from(v: ValueData) -> Value {
        Value::new(v.id, v.data)
    }
}

///////////////////////////////////////////////// Error /////////////////////////////////////////////

#[derive(Clone, Message, zerror_derive::Z)]
pub enum Error {
    #[prototk(663552, message)]
    Success {
        #[prototk(1, message)]
        core: ErrorCore,
    },
    /// Serializing or deserializing a frame failed.
    #[prototk(663553, message)]
    SerializationError {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        what: String,
    },
    /// The acceptor store is full of pending (not-yet-committed) instances.
    #[prototk(663554, message)]
    Refused {
        #[prototk(1, message)]
        core: ErrorCore,
    },
    /// The message referenced a ring id, epoch, or value id this participant does not recognize.
    #[prototk(663555, message)]
    ProtocolStale {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        what: String,
    },
    /// The instance fell out of the acceptor's or the value cache's retention window.
    #[prototk(663556, message)]
    Forgotten {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, message)]
        instance: InstanceId,
    },
    /// An RPC did not complete before its deadline.
    #[prototk(663557, message)]
    TimedOut {
        #[prototk(1, message)]
        core: ErrorCore,
    },
    /// A value's payload exceeded [MAX_VALUE_BYTES] or a request exceeded [MAX_DATAGRAM_BYTES].
    #[prototk(663558, message)]
    RequestTooLarge {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint64)]
        size: u64,
    },
    /// The underlying transport failed (socket error, peer closed, etc).
    #[prototk(663559, message)]
    TransportFailure {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        what: String,
    },
}

impl Default for Error {
    fn default() -> Error {
        Error::Success {
            core: ErrorCore::default(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(what: std::io::Error) -> Error {
        Error::TransportFailure {
            core: ErrorCore::default(),
            what: what.to_string(),
        }
    }
}

impl From<prototk::Error> for Error {
    fn from(what: prototk::Error) -> Error {
        Error::SerializationError {
            core: ErrorCore::default(),
            what: format!("{:?}", what),
        }
    }
}

impl From<buffertk::Error> for Error {
    fn from(what: buffertk::Error) -> Error {
        Error::SerializationError {
            core: ErrorCore::default(),
            what: format!("{:?}", what),
        }
    }
}

zerror::iotoz! {Error}
