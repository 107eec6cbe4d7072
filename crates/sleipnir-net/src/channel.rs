//! Peer-to-peer classical channel.
//!
//! During dynamic circuit execution QPUs exchange measurement values with
//! the peers named by the circuit, and executors exchange whole circuits
//! and results with their group. All of that flows through one
//! [`ClassicalChannel`] per process:
//!
//! - Inbound, a router-style listener accepts every peer. Each peer stamps
//!   its frames with a declared identity, and [`ClassicalChannel::recv_info`]
//!   demultiplexes the shared stream into per-origin FIFOs, so a receiver
//!   can wait for a specific peer without losing frames that other peers
//!   deliver in the meantime.
//! - Outbound, one dealer-style connection per target, keyed by peer id (or
//!   by endpoint when no id is given). Connecting is idempotent.
//!
//! The listener is serviced by background reader threads feeding an
//! in-process queue; the channel façade itself is owned and driven by a
//! single thread. Reader threads live until their peer disconnects or the
//! process exits.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;

use rustc_hash::FxHashMap;
use serde_json::json;
use tracing::{debug, warn};

use sleipnir_registry::{self as registry, RegistryResult};

use crate::error::{NetError, NetResult};
use crate::frame::{read_frame, write_frame};
use crate::iface::best_local_ipv4;

/// One process's endpoint on the classical mesh.
pub struct ClassicalChannel {
    endpoint: String,
    identity: String,
    dealers: FxHashMap<String, TcpStream>,
    inbox: mpsc::Receiver<(String, Vec<u8>)>,
    buffered: FxHashMap<String, VecDeque<Vec<u8>>>,
}

impl ClassicalChannel {
    /// Open a channel whose identity is its own endpoint.
    pub fn new() -> NetResult<Self> {
        Self::with_id("")
    }

    /// Open a channel with an explicit identity (e.g. `"executor"`).
    ///
    /// An empty id means "use the bound endpoint", which is how QPU
    /// channels are recognised by the address they published.
    pub fn with_id(id: &str) -> NetResult<Self> {
        let ip = IpAddr::V4(best_local_ipv4().unwrap_or(Ipv4Addr::LOCALHOST));
        let listener = TcpListener::bind((ip, 0)).map_err(|source| NetError::Bind {
            endpoint: format!("tcp://{ip}:0"),
            source,
        })?;
        let endpoint = format!("tcp://{}", listener.local_addr()?);
        let identity = if id.is_empty() {
            endpoint.clone()
        } else {
            id.to_string()
        };
        debug!("classical channel {} listening on {}", identity, endpoint);

        let (tx, inbox) = mpsc::channel();
        thread::Builder::new()
            .name("chan-accept".into())
            .spawn(move || accept_loop(listener, tx))
            .map_err(NetError::Io)?;

        Ok(Self {
            endpoint,
            identity,
            dealers: FxHashMap::default(),
            inbox,
            buffered: FxHashMap::default(),
        })
    }

    /// The bound endpoint, `tcp://ip:port`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Append this channel's endpoint to the communications registry.
    pub fn publish(&self, suffix: &str) -> RegistryResult<()> {
        let entry = json!({ "communications_endpoint": self.endpoint });
        registry::write_on_file(&entry, &registry::communications_path(), suffix)
    }

    /// Connect to a peer, keyed by `id` (or by the endpoint if `id` is
    /// empty). Outbound frames carry this channel's own identity. Repeated
    /// calls for the same key are no-ops.
    pub fn connect(&mut self, endpoint: &str, id: &str) -> NetResult<()> {
        let key = if id.is_empty() { endpoint } else { id };
        let identity = self.identity.clone();
        self.connect_keyed(endpoint, key.to_string(), identity)
    }

    /// Connect to a peer, stamping outbound frames with this channel's
    /// bound endpoint instead of its identity.
    ///
    /// Used where the peer knows this process only by the address it
    /// published, never by a symbolic id.
    pub fn connect_forced(&mut self, endpoint: &str) -> NetResult<()> {
        let identity = self.endpoint.clone();
        self.connect_keyed(endpoint, endpoint.to_string(), identity)
    }

    /// [`Self::connect_forced`] over a whole peer list.
    pub fn connect_all_forced(&mut self, endpoints: &[String]) -> NetResult<()> {
        for endpoint in endpoints {
            self.connect_forced(endpoint)?;
        }
        Ok(())
    }

    fn connect_keyed(&mut self, endpoint: &str, key: String, identity: String) -> NetResult<()> {
        if self.dealers.contains_key(&key) {
            return Ok(());
        }
        let address = endpoint.trim_start_matches("tcp://");
        let mut stream = TcpStream::connect(address).map_err(|source| NetError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;
        // Identity handshake: the first frame names the sender for the
        // receiver's demultiplexer.
        write_frame(&mut stream, identity.as_bytes()).map_err(|source| NetError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;
        debug!("connected to {} as {}", endpoint, identity);
        self.dealers.insert(key, stream);
        Ok(())
    }

    /// Send a payload to a connected peer.
    ///
    /// Sending to a peer that was never connected is a hard error: peer
    /// wiring happens before execution, so this indicates a bug rather
    /// than a runtime condition.
    pub fn send_info(&self, data: &str, target: &str) -> NetResult<()> {
        let stream = self
            .dealers
            .get(target)
            .ok_or_else(|| NetError::UnknownPeer(target.to_string()))?;
        write_frame(&mut &*stream, data.as_bytes()).map_err(|source| NetError::Send {
            target: target.to_string(),
            source,
        })
    }

    /// Receive the next payload whose sender identity equals `origin`.
    ///
    /// Frames from other senders that arrive while waiting are parked in
    /// their own per-origin queue and handed out by later calls, so every
    /// sender's frames are observed in send order.
    pub fn recv_info(&mut self, origin: &str) -> NetResult<String> {
        if let Some(queue) = self.buffered.get_mut(origin) {
            if let Some(payload) = queue.pop_front() {
                return Ok(String::from_utf8_lossy(&payload).into_owned());
            }
        }
        loop {
            let (identity, payload) = self.inbox.recv().map_err(|_| NetError::ChannelClosed)?;
            if identity == origin {
                return Ok(String::from_utf8_lossy(&payload).into_owned());
            }
            debug!("parking frame from {} while waiting for {}", identity, origin);
            self.buffered.entry(identity).or_default().push_back(payload);
        }
    }

    /// Send a measurement value, decimal-encoded.
    pub fn send_measure(&self, measurement: u32, target: &str) -> NetResult<()> {
        self.send_info(&measurement.to_string(), target)
    }

    /// Receive a measurement value from `origin`.
    pub fn recv_measure(&mut self, origin: &str) -> NetResult<u32> {
        let payload = self.recv_info(origin)?;
        payload
            .trim()
            .parse()
            .map_err(|_| NetError::BadMeasurement(payload))
    }
}

/// Accept peers for the lifetime of the process.
fn accept_loop(listener: TcpListener, tx: mpsc::Sender<(String, Vec<u8>)>) {
    for connection in listener.incoming() {
        match connection {
            Ok(stream) => {
                let tx = tx.clone();
                let spawned = thread::Builder::new()
                    .name("chan-read".into())
                    .spawn(move || reader_loop(stream, tx));
                if let Err(e) = spawned {
                    warn!("could not spawn channel reader: {}", e);
                }
            }
            Err(e) => {
                warn!("channel accept failed: {}", e);
            }
        }
    }
}

/// Pump one peer's frames into the shared inbox, preserving their order.
fn reader_loop(mut stream: TcpStream, tx: mpsc::Sender<(String, Vec<u8>)>) {
    let identity = match read_frame(&mut stream) {
        Ok(frame) => String::from_utf8_lossy(&frame).into_owned(),
        Err(e) => {
            warn!("peer hung up before identifying: {}", e);
            return;
        }
    };
    debug!("peer {} attached", identity);
    loop {
        match read_frame(&mut stream) {
            Ok(payload) => {
                if tx.send((identity.clone(), payload)).is_err() {
                    return;
                }
            }
            Err(_) => {
                debug!("peer {} detached", identity);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let mut receiver = ClassicalChannel::with_id("sink").unwrap();
        let mut sender = ClassicalChannel::with_id("source").unwrap();

        sender.connect(receiver.endpoint(), "sink").unwrap();
        sender.send_info("payload", "sink").unwrap();

        assert_eq!(receiver.recv_info("source").unwrap(), "payload");
    }

    #[test]
    fn test_per_origin_order_survives_interleaving() {
        let mut receiver = ClassicalChannel::with_id("hub").unwrap();
        let mut alice = ClassicalChannel::with_id("alice").unwrap();
        let mut bob = ClassicalChannel::with_id("bob").unwrap();

        alice.connect(receiver.endpoint(), "hub").unwrap();
        bob.connect(receiver.endpoint(), "hub").unwrap();

        alice.send_info("a1", "hub").unwrap();
        alice.send_info("a2", "hub").unwrap();
        bob.send_info("b1", "hub").unwrap();
        alice.send_info("a3", "hub").unwrap();

        // Wait for bob first: alice's frames must be parked, not lost.
        assert_eq!(receiver.recv_info("bob").unwrap(), "b1");
        assert_eq!(receiver.recv_info("alice").unwrap(), "a1");
        assert_eq!(receiver.recv_info("alice").unwrap(), "a2");
        assert_eq!(receiver.recv_info("alice").unwrap(), "a3");
    }

    #[test]
    fn test_connect_is_idempotent() {
        let receiver = ClassicalChannel::with_id("target").unwrap();
        let mut sender = ClassicalChannel::with_id("origin").unwrap();

        for _ in 0..4 {
            sender.connect(receiver.endpoint(), "target").unwrap();
        }
        assert_eq!(sender.dealers.len(), 1);
    }

    #[test]
    fn test_send_to_unknown_peer_is_error() {
        let channel = ClassicalChannel::with_id("lonely").unwrap();
        assert!(matches!(
            channel.send_info("data", "nobody"),
            Err(NetError::UnknownPeer(_))
        ));
    }

    #[test]
    fn test_measure_round_trip() {
        let mut receiver = ClassicalChannel::new().unwrap();
        let mut sender = ClassicalChannel::new().unwrap();

        sender.connect_forced(receiver.endpoint()).unwrap();
        sender.send_measure(1, receiver.endpoint()).unwrap();
        sender.send_measure(0, receiver.endpoint()).unwrap();

        // A forced connector is identified by its own bound endpoint.
        assert_eq!(receiver.recv_measure(sender.endpoint()).unwrap(), 1);
        assert_eq!(receiver.recv_measure(sender.endpoint()).unwrap(), 0);
    }

    #[test]
    fn test_default_identity_is_endpoint() {
        let channel = ClassicalChannel::new().unwrap();
        assert_eq!(channel.identity, channel.endpoint);
    }
}
