//! End-to-end coverage for the six literal scenarios this protocol is designed around: a
//! single-instance happy path, a reserved-value takeover after a master restart, an acceptor
//! window refusal, a learner recovering a missing instance, a ring rebuild after a host goes
//! down, and a Phase-2 timeout that boosts the ballot and retries.
//!
//! S1 drives three real [ringpaxos::Host] processes over loopback UDP/TCP. The rest exercise the
//! same production types (`AcceptorStore`, `ProposerEngine`, `CommitTracker`, `RecoveryManager`,
//! `RingManager`, `ring_voter`) directly, since their state transitions are what each scenario is
//! actually about and doing so keeps the tests deterministic instead of racing wall-clock timers.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::time::{Duration, Instant};

use ringpaxos::acceptor::{AcceptorStore, NextBallotResult, StoreResult};
use ringpaxos::commit::sink::RecordingSink;
use ringpaxos::commit::CommitTracker;
use ringpaxos::config::Config;
use ringpaxos::ping::{pick_ring, HostQuality, PingTracker};
use ringpaxos::proposer::batcher;
use ringpaxos::proposer::{ProposerEngine, ReservedOutcome};
use ringpaxos::recovery::{QueryResult, RecoveryManager, ValueCache};
use ringpaxos::ring::SharedRing;
use ringpaxos::ring_manager::{RingManager, RingManagerState};
use ringpaxos::ring_voter;
use ringpaxos::rpc::Dispatcher;
use ringpaxos::Host;
use ringpaxos_pb::{
    BallotId, BatchPhase1Reply, Epoch, InstanceId, Phase2Request, RingId, SetRing, Value, ValueId,
};

fn val(byte: u8) -> Value {
    Value::new(ValueId::new([byte; one_two_eight::BYTES]), vec![byte])
}

fn epoch(byte: u8) -> Epoch {
    Epoch::new([byte; one_two_eight::BYTES])
}

fn free_udp_addr() -> SocketAddr {
    UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
}

fn free_tcp_addr() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
}

/// Three-host bootstrap config with every address freshly reserved so the real `Host`s in S1 can
/// bind them without colliding with another test running concurrently.
fn three_host_config() -> Config {
    let hosts: Vec<(SocketAddr, SocketAddr)> =
        (0..3).map(|_| (free_udp_addr(), free_tcp_addr())).collect();
    let body: Vec<String> = hosts
        .iter()
        .enumerate()
        .map(|(id, (udp, tcp))| {
            let dc = if id < 2 { "dc1" } else { "dc2" };
            format!(
                r#"{{"host_id": {id}, "datacenter": "{dc}", "udp_addr": "{udp}", "tcp_addr": "{tcp}"}}"#
            )
        })
        .collect();
    // A long ping interval keeps the real background ring manager from ever gathering enough
    // quality data to re-propose during the test window; the ring installed directly below via
    // `handle_set_ring` stays authoritative for the whole run.
    let json = format!(
        r#"{{"hosts": [{}], "ping_interval_ms": 60000, "phase2_timeout_ms": 200}}"#,
        body.join(",")
    );
    Config::parse(&json).unwrap()
}

//////////////////////////////////////// S1: single-instance happy path ////////////////////////////////////////

#[tokio::test]
async fn s1_single_instance_happy_path() {
    let config = three_host_config();
    let epoch = config.bootstrap_epoch;
    let ring_id = RingId::new(1);

    let mut hosts = Vec::new();
    for id in 0..3u32 {
        let host = Host::bootstrap(config.clone(), id).await.unwrap();
        host.handle_set_ring(SetRing {
            request_id: Default::default(),
            group_guid: epoch,
            ring_id,
            ring_host_ids: vec![0, 1, 2],
        });
        hosts.push(host);
    }
    for host in &hosts {
        tokio::spawn(host.clone().run());
    }

    let v1 = val(1);
    hosts[0].submit_value(v1.clone()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let delivered: Vec<_> = hosts.iter().map(|h| h.delivered_values()).collect();
        if delivered.iter().all(|d| d.first() == Some(&(InstanceId::new(0), v1.clone()))) {
            break;
        }
        if Instant::now() > deadline {
            panic!("instance 0 was not delivered to every host in time: {delivered:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

//////////////////////////////////////// S2: reserved value takeover ////////////////////////////////////////

#[tokio::test]
async fn s2_reserved_value_takeover_carries_prior_value() {
    // Two acceptors already hold a vote for instance 0 at ballot 1 (cast before the master
    // crashed); the fresh master's batch Phase-1 at ballot 4 must surface it as reserved.
    let e = epoch(1);
    let v1 = val(1);
    let mut store_a = AcceptorStore::new(e, 1_000, 1_000);
    let mut store_b = AcceptorStore::new(e, 1_000, 1_000);
    store_a.begin_ballot(InstanceId::new(0), BallotId::new(1), v1.clone());
    store_b.begin_ballot(InstanceId::new(0), BallotId::new(1), v1.clone());
    let mut store_new_master = AcceptorStore::new(e, 1_000, 1_000);

    let batch = |store: &mut AcceptorStore| -> BatchPhase1Reply {
        let mut reserved = Vec::new();
        for iid in 0..5u64 {
            let iid = InstanceId::new(iid);
            if let StoreResult::Ok(NextBallotResult::Promised { last_voted_ballot, last_voted_value }) =
                store.next_ballot(iid, BallotId::new(4))
            {
                if !last_voted_value.is_empty() {
                    reserved.push(ringpaxos_pb::ReservedInstance {
                        instance_id: iid,
                        ballot: last_voted_ballot,
                        value: last_voted_value,
                    });
                }
            }
        }
        BatchPhase1Reply::Ok {
            request_id: Default::default(),
            reserved_instances: reserved,
        }
    };

    let replies = vec![batch(&mut store_new_master), batch(&mut store_a), batch(&mut store_b)];
    let outcome = batcher::aggregate_batch_replies(replies);
    assert!(!outcome.too_low);
    let classified = batcher::classify_range(InstanceId::new(0), InstanceId::new(5), &outcome);
    let reserved_zero = classified.iter().find_map(|c| match c {
        batcher::Classification::Reserved(InstanceId { id: 0 }, inst) => Some(inst.clone()),
        _ => None,
    });
    let reserved_zero = reserved_zero.expect("instance 0 must classify as reserved");
    assert_eq!(v1.id, reserved_zero.value.id);

    // The proposer carries that exact value forward into Phase-2, never a fresh client value.
    let mut engine = ProposerEngine::new(0, 3, 100);
    engine.begin_batch(InstanceId::new(0), InstanceId::new(5));
    engine.mark_instance_reserved(InstanceId::new(0), BallotId::new(4));
    engine.value_queue_mut().push(val(99));
    let popped = engine.pop_reserved().unwrap();
    assert_eq!(InstanceId::new(0), popped);
    engine.handle_reserved_outcome(popped, ReservedOutcome::Reserved { value: reserved_zero.value.clone() });
    let (ballot, value) = engine.phase2_payload(InstanceId::new(0));
    assert_eq!(BallotId::new(4), ballot);
    assert_eq!(v1.id, value.id, "phase-2 must re-propose the reserved value, not the queued client value");

    // The commit tracker under the new epoch still delivers it at instance 0.
    let mut tracker = CommitTracker::new(e, 1_000);
    let mut sink = RecordingSink::default();
    tracker.on_commit(InstanceId::new(0), v1.clone(), &mut sink);
    assert_eq!(vec![(InstanceId::new(0), v1)], sink.delivered);
}

//////////////////////////////////////// S3: acceptor window refuses ////////////////////////////////////////

#[test]
fn s3_acceptor_window_refuses_then_master_fast_forwards() {
    let mut store = AcceptorStore::new(epoch(2), 4, 1_000);
    for i in 0..4u64 {
        assert!(matches!(
            store.next_ballot(InstanceId::new(i), BallotId::new(1)),
            StoreResult::Ok(_)
        ));
    }
    assert_eq!(
        StoreResult::Refused,
        store.next_ballot(InstanceId::new(100), BallotId::new(1)),
        "a full pending window refuses unrelated new instances"
    );

    // The master eventually finds out the true low-water mark and fast-forwards past it.
    let mut engine = ProposerEngine::new(0, 3, 1_000);
    let outcome = batcher::aggregate_batch_replies(vec![BatchPhase1Reply::IidTooLow {
        request_id: Default::default(),
        retry_iid: InstanceId::new(50),
    }]);
    assert!(outcome.too_low);
    engine.fast_forward(outcome.retry_iid);
    assert_eq!(InstanceId::new(50), engine.next_instance());
    engine.fast_forward(InstanceId::new(10));
    assert_eq!(InstanceId::new(50), engine.next_instance(), "fast-forward never moves backward");
}

//////////////////////////////////////// S4: gap triggers recovery ////////////////////////////////////////

#[test]
fn s4_gap_triggers_recovery_and_delivers_in_order() {
    let e = epoch(3);
    let mut tracker = CommitTracker::new(e, 50);
    let mut sink = RecordingSink::default();

    // Commits for 5 and 6 arrive, then 8 arrives with 7 still missing.
    for (iid, byte) in [(5u64, 5u8), (6, 6)] {
        tracker.on_commit(InstanceId::new(iid), val(byte), &mut sink);
    }
    tracker.on_commit(InstanceId::new(8), val(8), &mut sink);
    assert!(sink.delivered.is_empty(), "nothing can deliver while instances 0..5 and 7 are unknown");

    // Past the recovery grace period, the gap (everything strictly below the highest known
    // instance that's still missing) is surfaced for the recovery manager to fill.
    let gaps = tracker.detect_gaps(100);
    assert!(gaps.contains(&InstanceId::new(7)), "gaps: {gaps:?}");

    let hosts = vec![
        ringpaxos::config::HostEntry {
            host_id: 0,
            datacenter: "dc1".into(),
            udp_addr: "127.0.0.1:9100".parse().unwrap(),
            tcp_addr: "127.0.0.1:9101".parse().unwrap(),
        },
        ringpaxos::config::HostEntry {
            host_id: 1,
            datacenter: "dc1".into(),
            udp_addr: "127.0.0.1:9110".parse().unwrap(),
            tcp_addr: "127.0.0.1:9111".parse().unwrap(),
        },
    ];
    let mut recovery = RecoveryManager::new(1, hosts);
    for gap in &gaps {
        recovery.enqueue(*gap);
    }
    let to_host = recovery.pick_destination(&mut rand::thread_rng(), 1).unwrap();
    assert_eq!(0, to_host, "only one other host exists");
    let batch = recovery.next_batch(to_host).unwrap();
    assert_eq!(gaps, batch.instances);

    // The peer answers from its own value cache.
    let mut peer_cache = ValueCache::new(e, 1_000);
    peer_cache.insert(InstanceId::new(7), val(7));
    let reply = match peer_cache.query(e, InstanceId::new(7)) {
        QueryResult::Ok(value) => value,
        other => panic!("expected a hit, got {other:?}"),
    };

    // Instance 7's value lands and, because 5/6/7 are now all present and only 8 was buffered
    // ahead, the tracker drains straight through to (and excluding) the still-missing instances
    // between the two -- here there are none once 7 lands, so 7 and 8 both deliver.
    tracker.on_commit(InstanceId::new(7), reply, &mut sink);
    recovery.on_batch_resolved(&batch.instances);
    assert_eq!(0, recovery.in_flight_len());

    // Before 7 arrived, only 0..5 was ever a gap that mattered for this test; drive 0..5 through
    // too so delivery order is fully checked end to end.
    for iid in 0..5u64 {
        tracker.on_commit(InstanceId::new(iid), val(iid as u8), &mut sink);
    }
    let ids: Vec<u64> = sink.delivered.iter().map(|(iid, _)| iid.id).collect();
    assert_eq!(vec![0, 1, 2, 3, 4, 5, 6, 7, 8], ids, "delivery must be strictly ordered with no gaps");
}

//////////////////////////////////////// S5: ring rebuild on host down ////////////////////////////////////////

#[test]
fn s5_ring_rebuilds_after_host_down() {
    // Four hosts, each its own datacenter, so the oracle's majority-of-four (3: host 0 plus a
    // 2-host quorum of the rest) membership is determined purely by ping quality.
    let hosts: Vec<_> = (0..4u32)
        .map(|id| ringpaxos::config::HostEntry {
            host_id: id,
            datacenter: format!("dc{id}"),
            udp_addr: format!("127.0.0.1:92{id}0").parse().unwrap(),
            tcp_addr: format!("127.0.0.1:92{id}1").parse().unwrap(),
        })
        .collect();
    let shared = SharedRing::new();
    let mut manager = RingManager::new(0, hosts.clone(), true, shared.clone());

    let quality = |latencies: &[(u32, f64)]| -> HashMap<u32, HostQuality> {
        latencies
            .iter()
            .map(|&(id, ms)| {
                (
                    id,
                    HostQuality {
                        host_id: id,
                        packet_loss: 0.0,
                        mean_latency_ms: ms,
                        live: true,
                    },
                )
            })
            .collect()
    };

    let e = epoch(4);
    let all_live = [(0, 5.0), (1, 1.0), (2, 2.0), (3, 3.0)];
    let first = manager.propose(&quality(&all_live), e, 0).unwrap();
    assert_eq!(
        vec![0, 1, 2],
        first.ring_host_ids,
        "hosts 1 and 2 have the best latency of the non-master hosts"
    );
    for &host in &first.ring_host_ids {
        manager.on_ack(first.ring_id, host);
    }
    assert_eq!(RingManagerState::Ok, manager.state());
    assert!(shared.load().is_some());

    // Host 1 stops answering pings: a ping tracker observing it flips it down and the ring
    // manager, seeing it's part of the current ring, tears the ring down.
    let mut pings = PingTracker::new(20, 10, 50);
    pings.record_sent(1, 1, 0);
    pings.record_pong(1, 1, 5);
    assert!(pings.tick(10).is_empty());
    let flipped = pings.tick(1_000);
    assert_eq!(vec![1], flipped);
    assert!(pings.is_down(1));
    assert!(manager.affects_current_ring(1));
    manager.reset();
    assert_eq!(RingManagerState::Looking, manager.state());
    assert!(shared.load().is_none());

    // A fresh ring is picked, excluding the down host, with a new ring id.
    let without_host1 = [(0, 5.0), (2, 2.0), (3, 3.0)];
    let second = manager.propose(&quality(&without_host1), e, 2_000).unwrap();
    assert_eq!(vec![0, 2, 3], second.ring_host_ids);
    assert_ne!(first.ring_id, second.ring_id);
    for &host in &second.ring_host_ids {
        manager.on_ack(second.ring_id, host);
    }
    assert_eq!(RingManagerState::Ok, manager.state());
    assert_eq!(second.ring_id, shared.load().unwrap().ring_id);

    // Sanity: the oracle itself would independently produce the same membership.
    let picked = pick_ring(&hosts, &quality(&without_host1), true).unwrap();
    assert_eq!(vec![0, 2, 3], picked);
}

//////////////////////////////////////// S6: phase-2 timeout boosts the ballot ////////////////////////////////////////

#[test]
fn s6_phase2_timeout_boosts_ballot_and_all_acceptors_converge() {
    let mut engine = ProposerEngine::new(0, 3, 100);
    engine.begin_batch(InstanceId::new(0), InstanceId::new(1));
    engine.mark_instance_open(InstanceId::new(0), engine.ballot_generator().initial());
    assert_eq!(BallotId::new(1), engine.ballot_generator().initial());
    let v = val(7);
    engine.value_queue_mut().push(v.clone());
    let instance = engine.try_bind_client_value().unwrap();
    let (ballot, _) = engine.phase2_payload(instance);
    assert_eq!(BallotId::new(1), ballot);

    // Acceptor 2's vote never makes it back to the master; the proposer times out.
    engine.phase2_timeout(instance, BallotId::new(1), vec![]);
    let boosted = engine.pop_reserved().unwrap();
    assert_eq!(InstanceId::new(0), boosted);
    engine.handle_reserved_outcome(boosted, ReservedOutcome::Reserved { value: v.clone() });
    let (ballot, value) = engine.phase2_payload(InstanceId::new(0));
    assert_eq!(BallotId::new(4), ballot, "1 + hostId(0) + 1*numHosts(3)");
    assert_eq!(v.id, value.id);

    // Re-running Phase-2 at the boosted ballot across the ring: every acceptor ends up voting
    // for, and committing, the same value at ballot 4.
    let e = epoch(5);
    let ring_id = RingId::new(9);
    let req = Phase2Request {
        request_id: Default::default(),
        epoch: e,
        ring_id,
        instance: InstanceId::new(0),
        ballot,
        value: value.clone(),
        commits: vec![],
    };
    let mut store0 = AcceptorStore::new(e, 100, 100);
    let mut store1 = AcceptorStore::new(e, 100, 100);
    let mut store2 = AcceptorStore::new(e, 100, 100);
    let ring_at = |self_host_id: u32| ringpaxos::ring::RingConfiguration::new(ring_id, e, vec![0, 1, 2], self_host_id);

    // Phase-2 is multicast: every ring member applies it locally before any vote is forwarded.
    // Host 0 (the master) applies its own Phase-2 locally, the same way the real `Host` does.
    let _ = ring_voter::on_phase2(&mut store0, &ring_at(0), 0, &req);
    assert!(ring_voter::on_phase2(&mut store2, &ring_at(2), 2, &req).is_empty());

    // Host 1 is the first forwarder and synthesizes the initial vote after applying Phase-2.
    let actions1 = ring_voter::on_phase2(&mut store1, &ring_at(1), 1, &req);
    assert_eq!(1, actions1.len());
    let ring_voter::VoteAction::SendVote { to_host, vote } = actions1.into_iter().next().unwrap() else {
        panic!("expected a vote to forward");
    };
    assert_eq!(2, to_host);

    let action2 = ring_voter::on_vote(&mut store2, &ring_at(2), vote);
    let ring_voter::VoteAction::SendVote { to_host, vote } = action2 else {
        panic!("expected acceptor 2 to forward to the master");
    };
    assert_eq!(0, to_host);
    assert_eq!(ringpaxos_pb::VoteTarget::Master, vote.target);
    assert!(store0.commit(InstanceId::new(0), vote.value_id));
    assert!(store1.commit(InstanceId::new(0), value.id));
    assert!(store2.commit(InstanceId::new(0), value.id));
    assert_eq!(Some((value.clone(), BallotId::new(4))), store0.value(InstanceId::new(0)));
    assert_eq!(Some((value.clone(), BallotId::new(4))), store1.value(InstanceId::new(0)));
    assert_eq!(Some((value, BallotId::new(4))), store2.value(InstanceId::new(0)));
}
