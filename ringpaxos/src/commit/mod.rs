//! Orders and delivers committed values: buffers out-of-order commits, tracks the contiguous
//! delivery cursor, and surfaces persistent gaps for the recovery subsystem to fill.

pub mod sink;
pub mod tracker;

pub use sink::{InstanceSink, RecordingSink};
pub use tracker::CommitTracker;

pub fn register_biometrics(collector: &biometrics::Collector) {
    tracker::register_biometrics(collector);
}

pub fn register_monitors(_hey_listen: &mut tatl::HeyListen) {}
