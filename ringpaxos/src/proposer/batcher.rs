//! Reserves contiguous ranges of instances via `BatchPhase1Request`/`Reply`, classifying each
//! instance in the range as open (free to bind a client value) or reserved (carries a prior vote
//! that must be re-proposed).

use biometrics::Counter;

use ringpaxos_pb::{BallotId, BatchPhase1Reply, InstanceId, ReservedInstance};

static BATCHES_ISSUED: Counter = Counter::new("ringpaxos.proposer.batcher.batches_issued");
static IID_TOO_LOW: Counter = Counter::new("ringpaxos.proposer.batcher.iid_too_low");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&BATCHES_ISSUED);
    collector.register_counter(&IID_TOO_LOW);
}

/// The next `[start, end)` range the batcher should reserve, given the next un-reserved instance
/// id and the configured batch size.
pub fn next_batch_range(next: InstanceId, batch_size: u64) -> (InstanceId, InstanceId) {
    BATCHES_ISSUED.click();
    (next, InstanceId::new(next.id + batch_size))
}

/// The aggregated result of a `BatchPhase1` multicast round, after merging every acceptor's
/// reply in the ring.  Per the preserved (if odd) teacher behavior: if any acceptor reports
/// `IID_TOO_LOW`, the overall outcome is `too_low`, but `reserved_instances` accumulated from
/// `Ok` replies already seen are still merged in — callers must not rely on that set when
/// `too_low` is set.
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
    pub too_low: bool,
    pub retry_iid: InstanceId,
    pub reserved_instances: Vec<ReservedInstance>,
}

pub fn aggregate_batch_replies<I: IntoIterator<Item = BatchPhase1Reply>>(replies: I) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for reply in replies {
        match reply {
            BatchPhase1Reply::Ok { reserved_instances, .. } => {
                outcome.reserved_instances.extend(reserved_instances);
            }
            BatchPhase1Reply::IidTooLow { retry_iid, .. } => {
                IID_TOO_LOW.click();
                if !outcome.too_low || retry_iid > outcome.retry_iid {
                    outcome.retry_iid = retry_iid;
                }
                outcome.too_low = true;
            }
        }
    }
    outcome
}

/// The per-instance classification of one reserved-or-open range, once an outcome has been
/// judged not too-low.
pub enum Classification {
    Open(InstanceId),
    Reserved(InstanceId, ReservedInstance),
}

/// Classify every instance in `[start, end)` as open or reserved according to `outcome`.
pub fn classify_range(start: InstanceId, end: InstanceId, outcome: &BatchOutcome) -> Vec<Classification> {
    let mut result = Vec::new();
    let mut iid = start;
    while iid < end {
        match outcome.reserved_instances.iter().find(|r| r.instance_id == iid) {
            Some(reserved) => result.push(Classification::Reserved(iid, reserved.clone())),
            None => result.push(Classification::Open(iid)),
        }
        iid = iid.next();
    }
    result
}

pub const INVALID_BALLOT: BallotId = BallotId::INVALID;
