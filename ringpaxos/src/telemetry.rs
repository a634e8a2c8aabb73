//! Process-wide structured logging collector and alert registry.
//!
//! This codebase does not use `log`/`tracing`; [indicio::Collector] plays the role `tracing`'s
//! subscriber would, and [tatl::HeyListen] plays the role an external alertmanager would for
//! conditions this process can observe directly.

use biometrics::Collector as BiometricsCollector;
use tatl::HeyListen;

/// The process-wide structured-log collector.  Modules emit through this with the `clue!` macro.
pub static COLLECTOR: indicio::Collector = indicio::Collector::new();

/// Build a [BiometricsCollector] with every subsystem's sensors registered.
pub fn register_biometrics() -> BiometricsCollector {
    let collector = BiometricsCollector::new();
    crate::acceptor::register_biometrics(&collector);
    crate::ring_voter::register_biometrics(&collector);
    crate::proposer::register_biometrics(&collector);
    crate::ping::register_biometrics(&collector);
    crate::ring_manager::register_biometrics(&collector);
    crate::commit::register_biometrics(&collector);
    crate::recovery::register_biometrics(&collector);
    crate::rpc::register_biometrics(&collector);
    collector
}

/// Build a [HeyListen] with every subsystem's stationary/threshold monitors registered.
pub fn register_monitors() -> HeyListen {
    let mut hey_listen = HeyListen::new();
    crate::acceptor::register_monitors(&mut hey_listen);
    crate::ping::register_monitors(&mut hey_listen);
    crate::commit::register_monitors(&mut hey_listen);
    crate::recovery::register_monitors(&mut hey_listen);
    hey_listen
}
