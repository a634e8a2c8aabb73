//! The delivery endpoint for commits: whatever the host hands ordered, committed values to once
//! [super::tracker::CommitTracker] has resolved all gaps up to a given instance.

use ringpaxos_pb::{InstanceId, Value};

/// Receives one committed value at a time, strictly in ascending instance-id order.
pub trait InstanceSink {
    fn deliver(&mut self, instance_id: InstanceId, value: Value);
}

/// An [InstanceSink] that just records what it was given, for tests and the `dump-snapshot` CLI
/// mode.
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Vec<(InstanceId, Value)>,
}

impl InstanceSink for RecordingSink {
    fn deliver(&mut self, instance_id: InstanceId, value: Value) {
        self.delivered.push((instance_id, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringpaxos_pb::ValueId;

    #[test]
    fn recording_sink_preserves_delivery_order() {
        let mut sink = RecordingSink::default();
        sink.deliver(InstanceId::new(0), Value::new(ValueId::new([1; one_two_eight::BYTES]), vec![1]));
        sink.deliver(InstanceId::new(1), Value::new(ValueId::new([2; one_two_eight::BYTES]), vec![2]));
        assert_eq!(2, sink.delivered.len());
        assert_eq!(InstanceId::new(0), sink.delivered[0].0);
        assert_eq!(InstanceId::new(1), sink.delivered[1].0);
    }
}
