//! The proposer pipeline: per-instance state machine, instance pool, Phase-1 batching, ballot
//! generation, client-value ingest, and the engine that ties them together.

pub mod ballot;
pub mod batcher;
pub mod engine;
pub mod instance;
pub mod pool;
pub mod value_queue;

pub use ballot::BallotGenerator;
pub use engine::{ProposerEngine, ReservedOutcome};
pub use instance::{ProposerInstance, ProposerState};
pub use value_queue::ClientValueQueue;

pub fn register_biometrics(collector: &biometrics::Collector) {
    batcher::register_biometrics(collector);
    engine::register_biometrics(collector);
    pool::register_biometrics(collector);
    value_queue::register_biometrics(collector);
}

pub fn register_monitors(_hey_listen: &mut tatl::HeyListen) {}
