//! A fixed-size sliding window of ping round-trips to one remote host, with the aggregates the
//! ring oracle and ping tracker need: mean latency, loss fraction, trailing-lost count, and the
//! most recent pong's send-time (the host-down clock).

use std::collections::VecDeque;

#[derive(Clone, Copy, Debug)]
struct Slot {
    id: u64,
    send_time: u64,
    recv_time: Option<u64>,
}

pub struct PingStats {
    window: VecDeque<Slot>,
    capacity: usize,
    single_ping_timeout_ms: u64,
    max_received_pong_send_time: u64,
}

impl PingStats {
    pub fn new(capacity: usize, single_ping_timeout_ms: u64) -> Self {
        assert!(capacity > 0);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            single_ping_timeout_ms,
            max_received_pong_send_time: 0,
        }
    }

    /// Record that a ping with `id` was sent at `send_time` (ms).
    pub fn record_sent(&mut self, id: u64, send_time: u64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(Slot {
            id,
            send_time,
            recv_time: None,
        });
    }

    /// Record a pong matching ping `id`, observed at `recv_time`.  Unmatched pongs (the ping fell
    /// out of the window already) are ignored.
    pub fn record_pong(&mut self, id: u64, recv_time: u64) {
        if let Some(slot) = self.window.iter_mut().find(|s| s.id == id) {
            slot.recv_time = Some(recv_time);
            if slot.send_time > self.max_received_pong_send_time {
                self.max_received_pong_send_time = slot.send_time;
            }
        }
    }

    /// A slot counts as lost once it has no pong and its deadline (`send_time +
    /// single_ping_timeout`) has passed as of `now`.
    fn is_lost(&self, slot: &Slot, now: u64) -> bool {
        slot.recv_time.is_none() && now >= slot.send_time + self.single_ping_timeout_ms
    }

    pub fn mean_latency_ms(&self, now: u64) -> f64 {
        let latencies: Vec<f64> = self
            .window
            .iter()
            .filter(|s| !self.is_lost(s, now))
            .filter_map(|s| s.recv_time.map(|r| (r - s.send_time) as f64))
            .collect();
        if latencies.is_empty() {
            return f64::INFINITY;
        }
        latencies.iter().sum::<f64>() / latencies.len() as f64
    }

    pub fn latency_variance_ms(&self, now: u64) -> f64 {
        let latencies: Vec<f64> = self
            .window
            .iter()
            .filter(|s| !self.is_lost(s, now))
            .filter_map(|s| s.recv_time.map(|r| (r - s.send_time) as f64))
            .collect();
        if latencies.len() < 2 {
            return 0.0;
        }
        let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
        latencies.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / latencies.len() as f64
    }

    pub fn packet_loss_fraction(&self, now: u64) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let lost = self.window.iter().filter(|s| self.is_lost(s, now)).count();
        lost as f64 / self.window.len() as f64
    }

    /// Consecutive lost slots counting back from the most recent.
    pub fn trailing_lost_count(&self, now: u64) -> usize {
        self.window.iter().rev().take_while(|s| self.is_lost(s, now)).count()
    }

    pub fn max_received_pong_send_time(&self) -> u64 {
        self.max_received_pong_send_time
    }

    /// A host is down iff too long has passed since the last pong we actually received.
    pub fn is_down(&self, now: u64, no_heartbeat_timeout_ms: u64) -> bool {
        now.saturating_sub(self.max_received_pong_send_time) > no_heartbeat_timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_latency_ignores_lost_pings() {
        let mut stats = PingStats::new(4, 100);
        stats.record_sent(1, 0);
        stats.record_pong(1, 10);
        stats.record_sent(2, 20);
        // never ponged; becomes lost once `now` passes deadline.
        assert_eq!(10.0, stats.mean_latency_ms(30));
        assert_eq!(10.0, stats.mean_latency_ms(130));
    }

    #[test]
    fn window_evicts_oldest_beyond_capacity() {
        let mut stats = PingStats::new(2, 100);
        stats.record_sent(1, 0);
        stats.record_sent(2, 10);
        stats.record_sent(3, 20);
        assert_eq!(2, stats.window.len());
        assert_eq!(2, stats.window.front().unwrap().id);
    }

    #[test]
    fn packet_loss_fraction_counts_expired_unponged_slots() {
        let mut stats = PingStats::new(4, 50);
        stats.record_sent(1, 0);
        stats.record_pong(1, 5);
        stats.record_sent(2, 10);
        assert_eq!(0.0, stats.packet_loss_fraction(20));
        assert_eq!(0.5, stats.packet_loss_fraction(70));
    }

    #[test]
    fn host_down_after_no_heartbeat_timeout() {
        let mut stats = PingStats::new(4, 50);
        stats.record_sent(1, 0);
        stats.record_pong(1, 5);
        assert!(!stats.is_down(100, 1000));
        assert!(stats.is_down(2000, 1000));
    }
}
