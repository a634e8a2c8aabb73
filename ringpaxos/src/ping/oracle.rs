//! Picks the ring membership and order from live ping statistics: a datacenter-aware quorum of
//! hosts, ordered by quality, with host 0 always first as ring sender/master.

use std::collections::HashMap;

use biometrics::Counter;

use crate::config::HostEntry;

static ORACLE_RUNS: Counter = Counter::new("ringpaxos.ping.oracle.runs");
static ORACLE_FAILURES: Counter = Counter::new("ringpaxos.ping.oracle.failures");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&ORACLE_RUNS);
    collector.register_counter(&ORACLE_FAILURES);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OracleError {
    /// `ok_to_miss_datacenter` is false and at least one datacenter has no live host.
    DatacenterUncovered,
    /// Fewer than a majority of hosts are live at all.
    NoQuorum,
}

#[derive(Clone, Copy, Debug)]
pub struct HostQuality {
    pub host_id: u32,
    pub packet_loss: f64,
    pub mean_latency_ms: f64,
    pub live: bool,
}

/// Picks a ring: a majority-sized, datacenter-spread, quality-ordered list of host ids with host
/// 0 prepended as the fixed ring sender.
///
/// Procedure (spec order): drop dead hosts, sort the rest by `(packet_loss, mean_latency)`
/// ascending, walk the sorted non-master hosts taking at most one per datacenter on the first
/// pass (to spread the ring across failure domains), top up from whichever quality-sorted
/// non-master hosts remain (including a second host from an already-covered datacenter) until
/// that candidate set reaches `ceil(num_hosts / 2)` members, then prepend host 0 — a final ring
/// of `ceil(num_hosts / 2) + 1` hosts, a true majority. If `ok_to_miss_datacenter` is false, a
/// datacenter with no live host aborts ring selection entirely, since the caller's failure domain
/// is no longer masked by the ring's placement.
pub fn pick_ring(
    hosts: &[HostEntry],
    quality: &HashMap<u32, HostQuality>,
    ok_to_miss_datacenter: bool,
) -> Result<Vec<u32>, OracleError> {
    ORACLE_RUNS.click();
    let num_hosts = hosts.len();
    let quorum = num_hosts.div_ceil(2);

    let mut datacenters: Vec<&str> = hosts.iter().map(|h| h.datacenter.as_str()).collect();
    datacenters.sort_unstable();
    datacenters.dedup();

    let mut live: Vec<HostQuality> = hosts
        .iter()
        .filter_map(|h| quality.get(&h.host_id))
        .filter(|q| q.live)
        .copied()
        .collect();
    live.sort_by(|a, b| {
        a.packet_loss
            .partial_cmp(&b.packet_loss)
            .unwrap()
            .then(a.mean_latency_ms.partial_cmp(&b.mean_latency_ms).unwrap())
    });

    if !ok_to_miss_datacenter {
        let covered: std::collections::HashSet<&str> = live
            .iter()
            .filter_map(|q| hosts.iter().find(|h| h.host_id == q.host_id))
            .map(|h| h.datacenter.as_str())
            .collect();
        if datacenters.iter().any(|dc| !covered.contains(dc)) {
            ORACLE_FAILURES.click();
            return Err(OracleError::DatacenterUncovered);
        }
    }

    let host_dc = |host_id: u32| -> &str {
        hosts.iter().find(|h| h.host_id == host_id).map(|h| h.datacenter.as_str()).unwrap_or("")
    };

    // Host 0 is prepended after selection below, not counted against the majority budget.
    let non_master_live: Vec<HostQuality> = live.iter().filter(|q| q.host_id != 0).copied().collect();
    if non_master_live.len() < quorum {
        ORACLE_FAILURES.click();
        return Err(OracleError::NoQuorum);
    }

    let mut chosen = Vec::new();
    let mut seen_dc: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut stash = Vec::new();
    for q in &non_master_live {
        if seen_dc.insert(host_dc(q.host_id)) {
            chosen.push(q.host_id);
        } else {
            stash.push(q.host_id);
        }
    }
    for host_id in stash {
        if chosen.len() >= quorum {
            break;
        }
        chosen.push(host_id);
    }
    chosen.truncate(quorum);

    let mut ring = vec![0u32];
    ring.append(&mut chosen);
    Ok(ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts() -> Vec<HostEntry> {
        vec![
            HostEntry {
                host_id: 0,
                datacenter: "dc1".into(),
                udp_addr: "127.0.0.1:9000".parse().unwrap(),
                tcp_addr: "127.0.0.1:9001".parse().unwrap(),
            },
            HostEntry {
                host_id: 1,
                datacenter: "dc1".into(),
                udp_addr: "127.0.0.1:9010".parse().unwrap(),
                tcp_addr: "127.0.0.1:9011".parse().unwrap(),
            },
            HostEntry {
                host_id: 2,
                datacenter: "dc2".into(),
                udp_addr: "127.0.0.1:9020".parse().unwrap(),
                tcp_addr: "127.0.0.1:9021".parse().unwrap(),
            },
            HostEntry {
                host_id: 3,
                datacenter: "dc2".into(),
                udp_addr: "127.0.0.1:9030".parse().unwrap(),
                tcp_addr: "127.0.0.1:9031".parse().unwrap(),
            },
        ]
    }

    fn q(host_id: u32, loss: f64, latency: f64, live: bool) -> HostQuality {
        HostQuality {
            host_id,
            packet_loss: loss,
            mean_latency_ms: latency,
            live,
        }
    }

    #[test]
    fn prefers_one_host_per_datacenter_first() {
        let hosts = hosts();
        let quality: HashMap<u32, HostQuality> = [
            (0, q(0, 0.0, 5.0, true)),
            (1, q(1, 0.0, 1.0, true)),
            (2, q(2, 0.0, 2.0, true)),
            (3, q(3, 0.0, 3.0, true)),
        ]
        .into_iter()
        .collect();
        let ring = pick_ring(&hosts, &quality, true).unwrap();
        assert_eq!(0, ring[0]);
        assert!(ring.contains(&2) || ring.contains(&3));
    }

    #[test]
    fn host_zero_always_first() {
        let hosts = hosts();
        let quality: HashMap<u32, HostQuality> = [
            (0, q(0, 0.0, 50.0, true)),
            (1, q(1, 0.0, 1.0, true)),
            (2, q(2, 0.0, 2.0, true)),
        ]
        .into_iter()
        .collect();
        let ring = pick_ring(&hosts, &quality, true).unwrap();
        assert_eq!(0, ring[0]);
    }

    #[test]
    fn fails_without_quorum() {
        let hosts = hosts();
        let quality: HashMap<u32, HostQuality> = [(0, q(0, 0.0, 1.0, true))].into_iter().collect();
        assert_eq!(Err(OracleError::NoQuorum), pick_ring(&hosts, &quality, true));
    }

    #[test]
    fn datacenter_coverage_required_when_not_ok_to_miss() {
        let hosts = hosts();
        let quality: HashMap<u32, HostQuality> = [
            (0, q(0, 0.0, 1.0, true)),
            (1, q(1, 0.0, 1.0, true)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            Err(OracleError::DatacenterUncovered),
            pick_ring(&hosts, &quality, false)
        );
    }
}
