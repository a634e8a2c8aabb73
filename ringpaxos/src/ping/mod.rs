//! Liveness tracking and ring selection: a sliding-window ping tracker per remote host, and the
//! datacenter-aware quorum oracle that turns those stats into a ring membership.

pub mod oracle;
pub mod stats;
pub mod tracker;

pub use oracle::{pick_ring, HostQuality, OracleError};
pub use stats::PingStats;
pub use tracker::PingTracker;

pub fn register_biometrics(collector: &biometrics::Collector) {
    oracle::register_biometrics(collector);
    tracker::register_biometrics(collector);
}

pub fn register_monitors(hey_listen: &mut tatl::HeyListen) {
    tracker::register_monitors(hey_listen);
}
