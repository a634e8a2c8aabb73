//! Owns one [PingStats] window per remote host and raises the `host_down` transition exactly
//! once per down/up cycle.

use std::collections::HashMap;

use biometrics::Counter;
use tatl::{HeyListen, Stationary};

use super::stats::PingStats;

static HOST_MARKED_DOWN: Counter = Counter::new("ringpaxos.ping.tracker.host_marked_down");
static HOST_MARKED_UP: Counter = Counter::new("ringpaxos.ping.tracker.host_marked_up");

static HOST_MARKED_DOWN_MONITOR: Stationary =
    Stationary::new("ringpaxos.ping.tracker.host_marked_down", &HOST_MARKED_DOWN);

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&HOST_MARKED_DOWN);
    collector.register_counter(&HOST_MARKED_UP);
}

/// Fires whenever a host transitions down, so operators see it without having to notice a flat
/// counter move in a dashboard.
pub fn register_monitors(hey_listen: &mut HeyListen) {
    hey_listen.register_stationary(&HOST_MARKED_DOWN_MONITOR);
}

struct HostState {
    stats: PingStats,
    down: bool,
}

pub struct PingTracker {
    window_capacity: usize,
    single_ping_timeout_ms: u64,
    no_heartbeat_timeout_ms: u64,
    hosts: HashMap<u32, HostState>,
}

impl PingTracker {
    pub fn new(window_capacity: usize, single_ping_timeout_ms: u64, no_heartbeat_timeout_ms: u64) -> Self {
        Self {
            window_capacity,
            single_ping_timeout_ms,
            no_heartbeat_timeout_ms,
            hosts: HashMap::new(),
        }
    }

    fn entry(&mut self, host_id: u32) -> &mut HostState {
        self.hosts.entry(host_id).or_insert_with(|| HostState {
            stats: PingStats::new(self.window_capacity, self.single_ping_timeout_ms),
            down: false,
        })
    }

    pub fn record_sent(&mut self, host_id: u32, ping_id: u64, send_time: u64) {
        self.entry(host_id).stats.record_sent(ping_id, send_time);
    }

    pub fn record_pong(&mut self, host_id: u32, ping_id: u64, recv_time: u64) {
        self.entry(host_id).stats.record_pong(ping_id, recv_time);
    }

    /// Re-evaluate every tracked host's down/up status as of `now`, returning the host ids whose
    /// status flipped this tick (either direction).
    pub fn tick(&mut self, now: u64) -> Vec<u32> {
        let mut flipped = Vec::new();
        for (&host_id, state) in self.hosts.iter_mut() {
            let is_down = state.stats.is_down(now, self.no_heartbeat_timeout_ms);
            if is_down && !state.down {
                state.down = true;
                HOST_MARKED_DOWN.click();
                flipped.push(host_id);
            } else if !is_down && state.down {
                state.down = false;
                HOST_MARKED_UP.click();
                flipped.push(host_id);
            }
        }
        flipped
    }

    pub fn is_down(&self, host_id: u32) -> bool {
        self.hosts.get(&host_id).map(|s| s.down).unwrap_or(true)
    }

    pub fn mean_latency_ms(&self, host_id: u32, now: u64) -> f64 {
        self.hosts.get(&host_id).map(|s| s.stats.mean_latency_ms(now)).unwrap_or(f64::INFINITY)
    }

    pub fn packet_loss_fraction(&self, host_id: u32, now: u64) -> f64 {
        self.hosts.get(&host_id).map(|s| s.stats.packet_loss_fraction(now)).unwrap_or(1.0)
    }

    pub fn known_hosts(&self) -> impl Iterator<Item = u32> + '_ {
        self.hosts.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_flips_down_then_up() {
        let mut tracker = PingTracker::new(4, 50, 200);
        tracker.record_sent(1, 1, 0);
        tracker.record_pong(1, 1, 5);
        assert!(tracker.tick(10).is_empty());
        let flipped = tracker.tick(500);
        assert_eq!(vec![1], flipped);
        assert!(tracker.is_down(1));

        tracker.record_sent(1, 2, 500);
        tracker.record_pong(1, 2, 505);
        let flipped = tracker.tick(510);
        assert_eq!(vec![1], flipped);
        assert!(!tracker.is_down(1));
    }

    #[test]
    fn unknown_host_treated_as_down() {
        let tracker = PingTracker::new(4, 50, 200);
        assert!(tracker.is_down(99));
    }
}
