//! Ties every subsystem into one running process: loads the bootstrap configuration, binds the
//! UDP control-plane socket and the TCP recovery listener, and drives the acceptor, proposer,
//! ring, commit, and recovery state machines from real network events.

pub mod acceptor;
pub mod commit;
pub mod config;
pub mod ping;
pub mod proposer;
pub mod recovery;
pub mod ring;
pub mod ring_manager;
pub mod ring_voter;
pub mod rpc;
pub mod telemetry;
pub mod util;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use ringpaxos_pb::{
    BallotId, BatchPhase1Reply, BatchPhase1Request, BatchRecoveryReply, BatchRecoveryRequest,
    Error, Frame, InstanceId, Phase1Reply, Phase1Request, Phase2Request, Ping, Pong,
    RecoveredInstance, RecoveryReply, RecoveryRequest, RequestId, ReservedInstance, SetRing,
    SetRingAck, Value, Vote, VoteTarget,
};

use crate::acceptor::{AcceptorStore, NextBallotResult, StoreResult};
use crate::acceptor::store::DEFAULT_PENDING_INSTANCES_LIMIT;
use crate::commit::sink::RecordingSink;
use crate::commit::CommitTracker;
use crate::config::Config;
use crate::ping::{HostQuality, PingTracker};
use crate::proposer::batcher;
use crate::proposer::{ProposerEngine, ReservedOutcome};
use crate::recovery::{QueryResult, RecoveryManager, ValueCache};
use crate::ring::{HostAddressTable, RingConfiguration, SharedRing};
use crate::ring_manager::RingManager;
use crate::ring_voter::{self, VoteAction};
use crate::rpc::{await_reply, dispatch, tcp, DispatchOutcome, Dispatcher, PendingRequests, Reply, UdpTransport};
use crate::util::{jittered_sleep, now_ms};

/// How long a gap may go unrecovered before [CommitTracker::detect_gaps] re-requests it.
const RECOVERY_GAP_TIMEOUT_MS: u64 = 1_000;
/// Interval between proposer pipeline ticks (batcher, reserved worker, client worker).
const PROPOSER_TICK: Duration = Duration::from_millis(20);
/// Interval between gap-detection/recovery-dispatch sweeps.
const RECOVERY_TICK: Duration = Duration::from_millis(200);

/// Owns every subsystem for one process.  State is held behind per-subsystem `Mutex`es — the
/// same interior-mutability pattern [PendingRequests] uses — so the UDP receive loop and the
/// background tasks can all drive the host concurrently through a shared `Arc<Host>`.
pub struct Host {
    config: Config,
    self_host_id: u32,
    shared_ring: SharedRing,
    host_addrs: HostAddressTable,
    addr_to_host: HashMap<SocketAddr, u32>,
    udp: UdpTransport,
    pending: PendingRequests,
    store: Mutex<AcceptorStore>,
    engine: Mutex<ProposerEngine>,
    ring_manager: Mutex<RingManager>,
    commit_tracker: Mutex<CommitTracker>,
    cache: Mutex<ValueCache>,
    recovery: Mutex<RecoveryManager>,
    ping_tracker: Mutex<PingTracker>,
    sink: Mutex<RecordingSink>,
    next_ping_id: Mutex<u64>,
}

impl Host {
    /// Bind this host's sockets and construct every subsystem from the bootstrap configuration.
    /// Does not start serving — call [Host::run] on the returned handle.
    pub async fn bootstrap(config: Config, self_host_id: u32) -> Result<Arc<Host>, Error> {
        let Some(self_entry) = config.hosts.get(self_host_id as usize) else {
            return Err(Error::ProtocolStale {
                core: Default::default(),
                what: format!("host id {self_host_id} is not in the bootstrap host table"),
            });
        };
        let udp = UdpTransport::bind(self_entry.udp_addr).await?;
        let host_addrs = HostAddressTable::new(config.hosts.iter().map(|h| h.udp_addr).collect());
        let addr_to_host = config.hosts.iter().map(|h| (h.udp_addr, h.host_id)).collect();
        let shared_ring = SharedRing::new();
        let epoch = config.bootstrap_epoch;
        let num_hosts = config.num_hosts();
        let single_ping_timeout_ms = (config.ping_interval.as_millis() as u64).saturating_mul(3).max(1);
        let no_heartbeat_timeout_ms = (config.ping_interval.as_millis() as u64).saturating_mul(10).max(1);
        let host = Host {
            self_host_id,
            shared_ring: shared_ring.clone(),
            host_addrs,
            addr_to_host,
            udp,
            pending: PendingRequests::new(),
            store: Mutex::new(AcceptorStore::new(
                epoch,
                DEFAULT_PENDING_INSTANCES_LIMIT,
                config.retention_window as usize,
            )),
            engine: Mutex::new(ProposerEngine::new(self_host_id, num_hosts, config.instance_pool_size)),
            ring_manager: Mutex::new(RingManager::new(
                self_host_id,
                config.hosts.clone(),
                config.ok_to_miss_datacenter,
                shared_ring,
            )),
            commit_tracker: Mutex::new(CommitTracker::new(epoch, RECOVERY_GAP_TIMEOUT_MS)),
            cache: Mutex::new(ValueCache::new(epoch, config.retention_window as usize)),
            recovery: Mutex::new(RecoveryManager::new(self_host_id, config.hosts.clone())),
            ping_tracker: Mutex::new(PingTracker::new(config.ping_window, single_ping_timeout_ms, no_heartbeat_timeout_ms)),
            sink: Mutex::new(RecordingSink::default()),
            next_ping_id: Mutex::new(0),
            config,
        };
        Ok(Arc::new(host))
    }

    pub fn self_host_id(&self) -> u32 {
        self.self_host_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Enqueue a client value for the proposer to bind to the next open instance.  Callers
    /// outside this process reach this through a `ValueData` frame over the TCP ingest path;
    /// same-process callers (the CLI's submit mode) call it directly.
    pub fn submit_value(&self, value: Value) -> Result<(), Error> {
        value.validate()?;
        self.engine.lock().unwrap().value_queue_mut().push(value);
        Ok(())
    }

    /// Every value this host has delivered so far, in commit order.  Backs the CLI's
    /// `dump-snapshot` mode.
    pub fn delivered_values(&self) -> Vec<(InstanceId, Value)> {
        self.sink.lock().unwrap().delivered.clone()
    }

    /// Spawn every background task and serve the UDP receive loop on the calling task.  Returns
    /// only if the UDP socket itself fails.
    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        tokio::spawn(self.clone().run_ping_loop());
        tokio::spawn(self.clone().run_ring_manager_loop());
        tokio::spawn(self.clone().run_proposer_loop());
        tokio::spawn(self.clone().run_recovery_loop());
        tokio::spawn(self.clone().run_recovery_listener());
        loop {
            let (frame, from) = self.udp.recv().await?;
            let this = self.clone();
            tokio::spawn(async move { this.handle_incoming(frame, from).await });
        }
    }

    async fn handle_incoming(self: Arc<Self>, frame: Frame, from: SocketAddr) {
        let from_host = self.addr_to_host.get(&from).copied();
        match &frame {
            Frame::SetRingAck(ack) => {
                if let Some(host_id) = from_host {
                    self.ring_manager.lock().unwrap().on_ack(ack.ring_id, host_id);
                }
                return;
            }
            Frame::Pong(pong) => {
                if let Some(host_id) = from_host {
                    self.ping_tracker.lock().unwrap().record_pong(host_id, pong.id, now_ms());
                }
                return;
            }
            Frame::BatchPhase1Reply(_) | Frame::Phase1Reply(_) | Frame::RecoveryReply(_) => {
                let host_id = from_host.unwrap_or(u32::MAX);
                self.pending.on_reply(frame.request_id(), host_id, frame.clone());
                return;
            }
            _ => {}
        }
        match dispatch(self.as_ref(), frame) {
            DispatchOutcome::Reply(reply) => {
                let _ = self.udp.send(from, &reply).await;
            }
            DispatchOutcome::VoteActions(actions) => self.dispatch_vote_actions(actions).await,
            DispatchOutcome::None => {}
        }
    }

    async fn dispatch_vote_actions(&self, actions: Vec<VoteAction>) {
        for action in actions {
            if let VoteAction::SendVote { to_host, vote } = action {
                if let Some(addr) = self.host_addrs.udp_addr(to_host) {
                    let _ = self.udp.send(addr, &Frame::Vote(vote)).await;
                }
            }
        }
    }

    fn tcp_addr(&self, host_id: u32) -> Option<SocketAddr> {
        self.config.hosts.get(host_id as usize).map(|h| h.tcp_addr)
    }

    //////////////////////////////////////////// ping ////////////////////////////////////////////

    async fn run_ping_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        loop {
            interval.tick().await;
            let now = now_ms();
            for host in &self.config.hosts {
                if host.host_id == self.self_host_id {
                    continue;
                }
                let id = {
                    let mut n = self.next_ping_id.lock().unwrap();
                    *n += 1;
                    *n
                };
                self.ping_tracker.lock().unwrap().record_sent(host.host_id, id, now);
                let ping = Frame::Ping(Ping {
                    request_id: RequestId::default(),
                    id,
                    sender_now: now,
                });
                let _ = self.udp.send(host.udp_addr, &ping).await;
            }
            let flipped = self.ping_tracker.lock().unwrap().tick(now_ms());
            for host_id in flipped {
                let went_down = self.ping_tracker.lock().unwrap().is_down(host_id);
                if went_down && self.ring_manager.lock().unwrap().affects_current_ring(host_id) {
                    self.ring_manager.lock().unwrap().reset();
                }
            }
        }
    }

    //////////////////////////////////////////// ring ////////////////////////////////////////////

    /// Master-only: while `LOOKING`, periodically ask the oracle for a ring and multicast it.
    async fn run_ring_manager_loop(self: Arc<Self>) {
        if self.self_host_id != 0 {
            return;
        }
        loop {
            jittered_sleep(self.config.ping_interval * 5).await;
            let now = now_ms();
            let timeout_ms = self.config.set_ring_timeout.as_millis() as u64;
            self.ring_manager.lock().unwrap().tick(now, timeout_ms);
            if self.ring_manager.lock().unwrap().state() != crate::ring_manager::RingManagerState::Looking {
                continue;
            }
            let quality = self.build_host_quality(now);
            let set_ring = self.ring_manager.lock().unwrap().propose(&quality, self.config.bootstrap_epoch, now);
            let Some(set_ring) = set_ring else {
                continue;
            };
            self.ring_manager.lock().unwrap().on_ack(set_ring.ring_id, self.self_host_id);
            for &host_id in &set_ring.ring_host_ids {
                if host_id == self.self_host_id {
                    continue;
                }
                if let Some(addr) = self.host_addrs.udp_addr(host_id) {
                    let _ = self.udp.send(addr, &Frame::SetRing(set_ring.clone())).await;
                }
            }
        }
    }

    fn build_host_quality(&self, now: u64) -> HashMap<u32, HostQuality> {
        let tracker = self.ping_tracker.lock().unwrap();
        self.config
            .hosts
            .iter()
            .map(|h| {
                if h.host_id == self.self_host_id {
                    (
                        h.host_id,
                        HostQuality {
                            host_id: h.host_id,
                            packet_loss: 0.0,
                            mean_latency_ms: 0.0,
                            live: true,
                        },
                    )
                } else {
                    (
                        h.host_id,
                        HostQuality {
                            host_id: h.host_id,
                            packet_loss: tracker.packet_loss_fraction(h.host_id, now),
                            mean_latency_ms: tracker.mean_latency_ms(h.host_id, now),
                            live: !tracker.is_down(h.host_id),
                        },
                    )
                }
            })
            .collect()
    }

    ///////////////////////////////////////// proposer //////////////////////////////////////////

    /// Master-only: the batcher/reserved-worker/client-worker pipeline, ticked on a timer rather
    /// than woken by events for simplicity — the tick interval is short relative to RPC latency.
    async fn run_proposer_loop(self: Arc<Self>) {
        if self.self_host_id != 0 {
            return;
        }
        let mut interval = tokio::time::interval(PROPOSER_TICK);
        loop {
            interval.tick().await;
            let Some(ring) = self.shared_ring.load() else {
                continue;
            };
            self.run_batcher_tick(&ring).await;
            self.run_reserved_tick(&ring).await;
            self.run_client_worker_tick(&ring).await;
        }
    }

    async fn run_batcher_tick(&self, ring: &RingConfiguration) {
        if !self.engine.lock().unwrap().pool().has_room() {
            return;
        }
        let next = self.engine.lock().unwrap().next_instance();
        let (start, end) = batcher::next_batch_range(next, self.config.phase1_batch_size);
        let ballot = self.engine.lock().unwrap().ballot_generator().initial();
        let Some(request_id) = RequestId::generate() else {
            return;
        };
        let req = BatchPhase1Request {
            request_id,
            epoch: ring.epoch,
            ring_id: ring.ring_id,
            ballot,
            start_iid: start,
            end_iid: end,
        };
        let mut replies = vec![self.handle_batch_phase1(req.clone())];
        let mask = ring.ring_mask();
        if mask != 0 {
            let rx = self.pending.register_multicast(request_id, mask);
            for &host_id in &ring.host_ids {
                if host_id == self.self_host_id {
                    continue;
                }
                if let Some(addr) = self.host_addrs.udp_addr(host_id) {
                    let _ = self.udp.send(addr, &Frame::BatchPhase1Request(req.clone())).await;
                }
            }
            if let Ok(Reply::Multicast(remote)) = await_reply(&self.pending, request_id, rx, self.config.phase2_timeout).await {
                for (_, frame) in remote {
                    if let Frame::BatchPhase1Reply(reply) = frame {
                        replies.push(reply);
                    }
                }
            }
        }
        let outcome = batcher::aggregate_batch_replies(replies);
        if outcome.too_low {
            self.engine.lock().unwrap().fast_forward(outcome.retry_iid);
            return;
        }
        let mut engine = self.engine.lock().unwrap();
        engine.begin_batch(start, end);
        for classified in batcher::classify_range(start, end, &outcome) {
            match classified {
                batcher::Classification::Open(iid) => engine.mark_instance_open(iid, ballot),
                batcher::Classification::Reserved(iid, _) => engine.mark_instance_reserved(iid, ballot),
            }
        }
    }

    /// Re-runs single-instance Phase-1 across the whole ring for an instance the batch round
    /// found reserved, since the batch reply only reflects whichever acceptor answered first —
    /// the reserved worker needs the true highest-voted value before Phase-2 can safely re-propose it.
    async fn run_reserved_tick(&self, ring: &RingConfiguration) {
        let Some(instance_id) = self.engine.lock().unwrap().pop_reserved() else {
            return;
        };
        let ballot = self.engine.lock().unwrap().ballot_for(instance_id);
        let Some(request_id) = RequestId::generate() else {
            return;
        };
        let req = Phase1Request {
            request_id,
            epoch: ring.epoch,
            ring_id: ring.ring_id,
            instance: instance_id,
            ballot,
        };
        let mut replies = vec![self.handle_phase1(req.clone())];
        let mask = ring.ring_mask();
        if mask != 0 {
            let rx = self.pending.register_multicast(request_id, mask);
            for &host_id in &ring.host_ids {
                if host_id == self.self_host_id {
                    continue;
                }
                if let Some(addr) = self.host_addrs.udp_addr(host_id) {
                    let _ = self.udp.send(addr, &Frame::Phase1Request(req.clone())).await;
                }
            }
            if let Ok(Reply::Multicast(remote)) = await_reply(&self.pending, request_id, rx, self.config.phase2_timeout).await {
                for (_, frame) in remote {
                    if let Frame::Phase1Reply(reply) = frame {
                        replies.push(reply);
                    }
                }
            }
        }
        let mut highest_promised = None;
        let mut best_vote: Option<(BallotId, Value)> = None;
        for reply in replies {
            match reply {
                Phase1Reply::BallotTooLow { highest_promised: hp, .. } => {
                    highest_promised = Some(highest_promised.map_or(hp, |cur: BallotId| cur.max(hp)));
                }
                Phase1Reply::Ok { last_voted_ballot, last_voted_value, .. } if !last_voted_value.is_empty() => {
                    let replace = best_vote.as_ref().map_or(true, |(cur, _)| last_voted_ballot > *cur);
                    if replace {
                        best_vote = Some((last_voted_ballot, last_voted_value));
                    }
                }
                Phase1Reply::Ok { .. } => {}
            }
        }
        let outcome = if let Some(highest_promised) = highest_promised {
            ReservedOutcome::BallotTooLow { highest_promised }
        } else if let Some((_, value)) = best_vote {
            ReservedOutcome::Reserved { value }
        } else {
            ReservedOutcome::Open
        };
        self.engine.lock().unwrap().handle_reserved_outcome(instance_id, outcome);
    }

    async fn run_client_worker_tick(&self, ring: &RingConfiguration) {
        let Some(instance_id) = self.engine.lock().unwrap().try_bind_client_value() else {
            return;
        };
        let (ballot, value) = self.engine.lock().unwrap().phase2_payload(instance_id);
        let commits = self.engine.lock().unwrap().drain_commits_for_piggyback();
        let Some(request_id) = RequestId::generate() else {
            return;
        };
        let req = Phase2Request {
            request_id,
            epoch: ring.epoch,
            ring_id: ring.ring_id,
            instance: instance_id,
            ballot,
            value,
            commits,
        };
        let actions = self.handle_phase2(req.clone());
        self.dispatch_vote_actions(actions).await;
        for &host_id in &ring.host_ids {
            if host_id == self.self_host_id {
                continue;
            }
            if let Some(addr) = self.host_addrs.udp_addr(host_id) {
                let _ = self.udp.send(addr, &Frame::Phase2Request(req.clone())).await;
            }
        }
    }

    ///////////////////////////////////////// recovery //////////////////////////////////////////

    /// Every host's gap-filling loop: detect stale gaps in its own commit sequence, batch them,
    /// and dial a peer's TCP recovery port.
    async fn run_recovery_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(RECOVERY_TICK);
        loop {
            interval.tick().await;
            let now = now_ms();
            let gaps = self.commit_tracker.lock().unwrap().detect_gaps(now);
            if gaps.is_empty() {
                continue;
            }
            {
                let mut recovery = self.recovery.lock().unwrap();
                for gap in gaps {
                    recovery.enqueue(gap);
                }
            }
            let to_host = {
                let recovery = self.recovery.lock().unwrap();
                recovery.pick_destination(&mut rand::thread_rng(), self.self_host_id)
            };
            let Some(to_host) = to_host else {
                continue;
            };
            let batch = self.recovery.lock().unwrap().next_batch(to_host);
            let Some(batch) = batch else {
                continue;
            };
            let epoch = self.commit_tracker.lock().unwrap().epoch();
            match self.run_recovery_batch(to_host, epoch, &batch.instances).await {
                Err(_) => self.recovery.lock().unwrap().on_connection_lost(&batch.instances),
                Ok(reply) => {
                    let recovered_ids: Vec<InstanceId> =
                        reply.recovered.iter().map(|r| r.instance_id).collect();
                    let mut recovery = self.recovery.lock().unwrap();
                    recovery.on_batch_resolved(&recovered_ids);
                    recovery.on_not_committed(&reply.not_committed);
                    recovery.on_forgotten(&reply.forgotten);
                }
            }
        }
    }

    async fn run_recovery_batch(
        &self,
        to_host: u32,
        epoch: ringpaxos_pb::Epoch,
        instances: &[InstanceId],
    ) -> Result<BatchRecoveryReply, Error> {
        let addr = self.tcp_addr(to_host).ok_or_else(|| Error::TransportFailure {
            core: Default::default(),
            what: format!("host {to_host} has no tcp address"),
        })?;
        let mut stream = TcpStream::connect(addr).await?;
        tcp::write_batch_recovery_request(
            &mut stream,
            BatchRecoveryRequest {
                epoch,
                instances: instances.to_vec(),
            },
        )
        .await?;
        let reply: BatchRecoveryReply = tcp::read_batch_recovery_reply(&mut stream).await?;
        let mut tracker = self.commit_tracker.lock().unwrap();
        let mut sink = self.sink.lock().unwrap();
        for recovered in &reply.recovered {
            self.cache.lock().unwrap().insert(recovered.instance_id, recovered.value.clone());
            tracker.on_commit(recovered.instance_id, recovered.value.clone(), &mut *sink);
        }
        Ok(reply)
    }

    /// Every host's recovery server: answer TCP `BatchRecoveryRequest`s with whatever this host's
    /// value cache can serve.
    async fn run_recovery_listener(self: Arc<Self>) {
        let Some(bind_addr) = self.tcp_addr(self.self_host_id) else {
            return;
        };
        let Ok(listener) = TcpListener::bind(bind_addr).await else {
            return;
        };
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            let this = self.clone();
            tokio::spawn(async move { this.serve_recovery_connection(stream).await });
        }
    }

    async fn serve_recovery_connection(&self, mut stream: TcpStream) {
        loop {
            let request = match tcp::read_batch_recovery_request(&mut stream).await {
                Ok(req) => req,
                Err(_) => return,
            };
            let mut recovered = Vec::new();
            let mut not_committed = Vec::new();
            let mut forgotten = Vec::new();
            {
                let cache = self.cache.lock().unwrap();
                for &instance_id in &request.instances {
                    match cache.query(request.epoch, instance_id) {
                        QueryResult::Ok(value) => recovered.push(RecoveredInstance {
                            instance_id,
                            ballot: BallotId::INVALID,
                            value,
                        }),
                        QueryResult::NotYet => not_committed.push(instance_id),
                        QueryResult::TooOld | QueryResult::WrongEpoch => forgotten.push(instance_id),
                    }
                }
            }
            let reply = BatchRecoveryReply {
                epoch: request.epoch,
                recovered,
                not_committed,
                forgotten,
            };
            if tcp::write_batch_recovery_reply(&mut stream, reply).await.is_err() {
                return;
            }
        }
    }
}

impl Dispatcher for Host {
    fn handle_ping(&self, ping: Ping) -> Pong {
        Pong {
            request_id: ping.request_id,
            id: ping.id,
            sender_now: now_ms(),
        }
    }

    fn handle_set_ring(&self, req: SetRing) -> SetRingAck {
        let ring = RingConfiguration::new(req.ring_id, req.group_guid, req.ring_host_ids, self.self_host_id);
        self.shared_ring.install(ring);
        SetRingAck {
            request_id: req.request_id,
            ring_id: req.ring_id,
        }
    }

    fn handle_batch_phase1(&self, req: BatchPhase1Request) -> BatchPhase1Reply {
        let mut store = self.store.lock().unwrap();
        let lowest = store.lowest_instance_id();
        if req.start_iid < lowest {
            return BatchPhase1Reply::IidTooLow {
                request_id: req.request_id,
                retry_iid: lowest,
            };
        }
        let mut reserved_instances = Vec::new();
        let mut iid = req.start_iid;
        while iid < req.end_iid {
            // A concurrent higher ballot already claiming this instance is left out of the
            // reply rather than failing the whole batch; the proposer notices when its own vote
            // never lands and the reserved worker re-runs single-instance Phase-1 for it.
            if let StoreResult::Ok(NextBallotResult::Promised { last_voted_ballot, last_voted_value }) =
                store.next_ballot(iid, req.ballot)
            {
                if !last_voted_value.is_empty() {
                    reserved_instances.push(ReservedInstance {
                        instance_id: iid,
                        ballot: last_voted_ballot,
                        value: last_voted_value,
                    });
                }
            }
            iid = iid.next();
        }
        BatchPhase1Reply::Ok {
            request_id: req.request_id,
            reserved_instances,
        }
    }

    fn handle_phase1(&self, req: Phase1Request) -> Phase1Reply {
        match self.store.lock().unwrap().next_ballot(req.instance, req.ballot) {
            StoreResult::Ok(NextBallotResult::Promised { last_voted_ballot, last_voted_value }) => Phase1Reply::Ok {
                request_id: req.request_id,
                last_voted_ballot,
                last_voted_value,
            },
            StoreResult::Nacked(NextBallotResult::Rejected { highest_promised }) => Phase1Reply::BallotTooLow {
                request_id: req.request_id,
                highest_promised,
            },
            _ => Phase1Reply::BallotTooLow {
                request_id: req.request_id,
                highest_promised: req.ballot,
            },
        }
    }

    fn handle_phase2(&self, req: Phase2Request) -> Vec<VoteAction> {
        let Some(ring) = self.shared_ring.load() else {
            return Vec::new();
        };
        let commits = req.commits.clone();
        let actions = {
            let mut store = self.store.lock().unwrap();
            ring_voter::on_phase2(&mut store, &ring, self.self_host_id, &req)
        };
        // Piggybacked commits only carry an instance/value id; the bytes must already be in this
        // host's own acceptor store from when it processed that instance's own Phase-2/vote.
        for commit in commits {
            let found = self.store.lock().unwrap().value(commit.instance_id);
            if let Some((value, _ballot)) = found {
                self.cache.lock().unwrap().insert(commit.instance_id, value.clone());
                let mut sink = self.sink.lock().unwrap();
                self.commit_tracker.lock().unwrap().on_commit(commit.instance_id, value, &mut *sink);
            }
        }
        actions
    }

    fn handle_vote(&self, vote: Vote) -> VoteAction {
        let Some(ring) = self.shared_ring.load() else {
            return VoteAction::None;
        };
        if vote.target == VoteTarget::Master {
            let value = self.engine.lock().unwrap().phase2_payload(vote.instance).1;
            self.engine.lock().unwrap().complete_instance(vote.instance);
            self.cache.lock().unwrap().insert(vote.instance, value.clone());
            let mut sink = self.sink.lock().unwrap();
            self.commit_tracker.lock().unwrap().on_commit(vote.instance, value, &mut *sink);
            return VoteAction::None;
        }
        let mut store = self.store.lock().unwrap();
        ring_voter::on_vote(&mut store, &ring, vote)
    }

    fn handle_recovery(&self, req: RecoveryRequest) -> RecoveryReply {
        match self.cache.lock().unwrap().query(req.epoch, req.instance) {
            QueryResult::Ok(value) => RecoveryReply::Ok {
                request_id: req.request_id,
                value,
            },
            QueryResult::NotYet => RecoveryReply::NotCommitted { request_id: req.request_id },
            QueryResult::TooOld | QueryResult::WrongEpoch => RecoveryReply::Forgotten { request_id: req.request_id },
        }
    }
}
