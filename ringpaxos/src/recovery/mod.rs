//! Fills gaps in the committed instance sequence: a bounded cache of values this host can serve,
//! and a scheduler for batched TCP recovery requests to peers.

pub mod cache;
pub mod manager;

pub use cache::{QueryResult, ValueCache};
pub use manager::{RecoveryBatch, RecoveryManager};

pub fn register_biometrics(collector: &biometrics::Collector) {
    cache::register_biometrics(collector);
    manager::register_biometrics(collector);
}

pub fn register_monitors(hey_listen: &mut tatl::HeyListen) {
    manager::register_monitors(hey_listen);
}
