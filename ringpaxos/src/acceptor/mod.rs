//! The acceptor side: per-instance Paxos state machine plus the windowed store that owns a
//! flat map of them for one epoch.

pub mod instance;
pub mod store;

pub use instance::{AcceptorInstance, BeginBallotResult, NextBallotResult, VoteResult};
pub use store::{AcceptorStore, StoreResult};

pub fn register_biometrics(collector: &biometrics::Collector) {
    instance::register_biometrics(collector);
    store::register_biometrics(collector);
}

pub fn register_monitors(_hey_listen: &mut tatl::HeyListen) {}
