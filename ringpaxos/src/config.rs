//! Loads the bootstrap configuration: the fixed host table, per-subsystem timeouts, and the
//! `okToMissDatacenter` quorum-oracle flag.  The bootstrap epoch is derived deterministically from
//! the canonicalized file contents, so every host that boots off the same file agrees on the
//! initial [Epoch] without having to run a round of consensus to pick one.

use std::fs::read_to_string;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use ringpaxos_pb::Epoch;

/// Default length of the ping sliding window, in samples. See `ringpaxos::ping::stats`.
pub const DEFAULT_PING_WINDOW: usize = 20;
/// Default Phase-1 batch size, in instances.
pub const DEFAULT_PHASE1_BATCH_SIZE: u64 = 256;
/// Default number of commit records piggybacked per Phase2 request.
pub const DEFAULT_COMMIT_BATCH_SIZE: usize = ringpaxos_pb::COMMIT_PIGGYBACK_BATCH;
/// Default number of open (not yet committed) instances the proposer will keep in flight.
pub const DEFAULT_INSTANCE_POOL_SIZE: usize = 1024;
/// Default Phase2 RPC timeout.
pub const DEFAULT_PHASE2_TIMEOUT: Duration = Duration::from_millis(250);
/// Default interval between ping rounds.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(100);
/// Default retention window, in instances, for the acceptor store and value cache.
pub const DEFAULT_RETENTION_WINDOW: u64 = 1_000_000;
/// Default deadline for collecting every `SetRingAck` before the ring manager gives up and goes
/// back to `LOOKING`.
pub const DEFAULT_SET_RING_TIMEOUT: Duration = Duration::from_millis(1_000);

/// One line of the bootstrap host table: a fixed `hostId` in `0..hosts.len()` and its UDP/TCP
/// addresses.  Host 0 is always the initial master.
#[derive(Clone, Debug, Deserialize)]
pub struct HostEntry {
    pub host_id: u32,
    pub datacenter: String,
    pub udp_addr: SocketAddr,
    pub tcp_addr: SocketAddr,
}

#[derive(Clone, Debug, Deserialize)]
struct RawConfig {
    hosts: Vec<HostEntry>,
    #[serde(default = "default_true")]
    ok_to_miss_datacenter: bool,
    #[serde(default)]
    ping_window: Option<usize>,
    #[serde(default)]
    phase1_batch_size: Option<u64>,
    #[serde(default)]
    instance_pool_size: Option<usize>,
    #[serde(default)]
    phase2_timeout_ms: Option<u64>,
    #[serde(default)]
    ping_interval_ms: Option<u64>,
    #[serde(default)]
    retention_window: Option<u64>,
    #[serde(default)]
    set_ring_timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Fully-resolved bootstrap configuration for one process.
#[derive(Clone, Debug)]
pub struct Config {
    pub bootstrap_epoch: Epoch,
    pub hosts: Vec<HostEntry>,
    pub ok_to_miss_datacenter: bool,
    pub ping_window: usize,
    pub phase1_batch_size: u64,
    pub instance_pool_size: usize,
    pub phase2_timeout: Duration,
    pub ping_interval: Duration,
    pub retention_window: u64,
    pub set_ring_timeout: Duration,
}

impl Config {
    /// Load and validate a bootstrap configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ringpaxos_pb::Error> {
        let contents = read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a bootstrap configuration from its JSON text, deriving the bootstrap epoch from the
    /// exact bytes provided (callers that want a stable epoch across re-formatted copies of the
    /// same file should canonicalize before calling this).
    pub fn parse(contents: &str) -> Result<Config, ringpaxos_pb::Error> {
        let raw: RawConfig = serde_json::from_str(contents).map_err(|e| {
            ringpaxos_pb::Error::SerializationError {
                core: Default::default(),
                what: e.to_string(),
            }
        })?;
        if raw.hosts.is_empty() {
            return Err(ringpaxos_pb::Error::ProtocolStale {
                core: Default::default(),
                what: "bootstrap config has no hosts".to_string(),
            });
        }
        for (idx, host) in raw.hosts.iter().enumerate() {
            if host.host_id as usize != idx {
                return Err(ringpaxos_pb::Error::ProtocolStale {
                    core: Default::default(),
                    what: format!("host table is not dense/sorted at index {idx}"),
                });
            }
        }
        let bootstrap_epoch = content_hash_epoch(contents.as_bytes());
        Ok(Config {
            bootstrap_epoch,
            hosts: raw.hosts,
            ok_to_miss_datacenter: raw.ok_to_miss_datacenter,
            ping_window: raw.ping_window.unwrap_or(DEFAULT_PING_WINDOW),
            phase1_batch_size: raw.phase1_batch_size.unwrap_or(DEFAULT_PHASE1_BATCH_SIZE),
            instance_pool_size: raw.instance_pool_size.unwrap_or(DEFAULT_INSTANCE_POOL_SIZE),
            phase2_timeout: raw
                .phase2_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PHASE2_TIMEOUT),
            ping_interval: raw
                .ping_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PING_INTERVAL),
            retention_window: raw.retention_window.unwrap_or(DEFAULT_RETENTION_WINDOW),
            set_ring_timeout: raw
                .set_ring_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SET_RING_TIMEOUT),
        })
    }

    pub fn num_hosts(&self) -> u32 {
        self.hosts.len() as u32
    }
}

/// Derive a stable 128-bit [Epoch] from arbitrary bytes by truncating a SHA-256 digest.
fn content_hash_epoch(bytes: &[u8]) -> Epoch {
    let digest = Sha256::digest(bytes);
    let mut id = [0u8; one_two_eight::BYTES];
    id.copy_from_slice(&digest[..one_two_eight::BYTES]);
    Epoch::new(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "hosts": [
            {"host_id": 0, "datacenter": "dc1", "udp_addr": "127.0.0.1:9000", "tcp_addr": "127.0.0.1:9001"},
            {"host_id": 1, "datacenter": "dc1", "udp_addr": "127.0.0.1:9010", "tcp_addr": "127.0.0.1:9011"},
            {"host_id": 2, "datacenter": "dc2", "udp_addr": "127.0.0.1:9020", "tcp_addr": "127.0.0.1:9021"}
        ]
    }"#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let cfg = Config::parse(SAMPLE).unwrap();
        assert_eq!(3, cfg.hosts.len());
        assert!(cfg.ok_to_miss_datacenter);
        assert_eq!(DEFAULT_PING_WINDOW, cfg.ping_window);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = Config::parse(SAMPLE).unwrap();
        let b = Config::parse(SAMPLE).unwrap();
        assert_eq!(a.bootstrap_epoch, b.bootstrap_epoch);
    }

    #[test]
    fn rejects_sparse_host_table() {
        let bad = r#"{"hosts": [{"host_id": 1, "datacenter": "dc1", "udp_addr": "127.0.0.1:9000", "tcp_addr": "127.0.0.1:9001"}]}"#;
        assert!(Config::parse(bad).is_err());
    }

    #[test]
    fn rejects_empty_host_table() {
        assert!(Config::parse(r#"{"hosts": []}"#).is_err());
    }
}
