//! The network fabric: UDP framing/dispatch for the latency-sensitive control messages, TCP
//! framing for batched recovery and value ingest, and the pending-request table that lets a
//! caller `await` a reply to something it just sent.

pub mod codec;
pub mod requester;
pub mod responder;
pub mod tcp;

pub use codec::{decode_frame, encode_frame};
pub use requester::{await_reply, PendingRequests, Reply};
pub use responder::{dispatch, DispatchOutcome, Dispatcher};

use std::net::SocketAddr;
use std::sync::Arc;

use biometrics::Counter;
use tokio::net::UdpSocket;

use ringpaxos_pb::{Error, Frame};

static DATAGRAMS_SENT: Counter = Counter::new("ringpaxos.rpc.datagrams_sent");
static DATAGRAMS_RECEIVED: Counter = Counter::new("ringpaxos.rpc.datagrams_received");
static DATAGRAMS_DROPPED: Counter = Counter::new("ringpaxos.rpc.datagrams_dropped");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&DATAGRAMS_SENT);
    collector.register_counter(&DATAGRAMS_RECEIVED);
    collector.register_counter(&DATAGRAMS_DROPPED);
    requester::register_biometrics(collector);
}

pub fn register_monitors(_hey_listen: &mut tatl::HeyListen) {}

/// A bound UDP socket used for every control-plane frame this host sends or receives.  One per
/// host; cheap to clone (wraps an `Arc`) since `UdpSocket::send_to`/`recv_from` take `&self`.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket: Arc::new(socket) })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn send(&self, to: SocketAddr, frame: &Frame) -> Result<(), Error> {
        let bytes = encode_frame(frame)?;
        self.socket.send_to(&bytes, to).await?;
        DATAGRAMS_SENT.click();
        Ok(())
    }

    /// Receive and decode the next datagram.  A malformed datagram is logged via the dropped
    /// counter and skipped rather than propagated, since one bad peer shouldn't take the receive
    /// loop down.
    pub async fn recv(&self) -> Result<(Frame, SocketAddr), Error> {
        let mut buf = [0u8; ringpaxos_pb::MAX_DATAGRAM_BYTES];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match decode_frame(&buf[..len]) {
                Ok(frame) => {
                    DATAGRAMS_RECEIVED.click();
                    return Ok((frame, from));
                }
                Err(_) => {
                    DATAGRAMS_DROPPED.click();
                    continue;
                }
            }
        }
    }
}
