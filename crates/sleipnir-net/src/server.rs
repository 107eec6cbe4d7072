//! Client-facing request/reply socket.
//!
//! Each QPU owns exactly one of these. The listen thread drives
//! [`ClientServer::accept`] and [`ClientServer::recv_data`]; the compute
//! thread answers through [`ClientServer::send_result`]. The two sides meet
//! only in the routing queue: every received request enqueues a reply
//! handle, every sent result dequeues the oldest one, so replies leave in
//! arrival order without the compute side knowing the client.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{NetError, NetResult};
use crate::frame::{read_frame, write_frame};
use crate::iface::best_local_ipv4;

/// Session-control sentinel.
///
/// Returned by [`ClientServer::recv_data`] on any socket error, and also
/// sent literally by well-behaved clients when they are done. Either way the
/// listen loop reacts by accepting the next connection.
pub const CLOSE_SENTINEL: &str = "CLOSE";

/// Network description published into `qpus.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub mode: String,
    pub nodename: String,
    pub endpoint: String,
}

/// The QPU's job submission socket.
pub struct ClientServer {
    info: ServerInfo,
    listener: TcpListener,
    /// Connection currently being read. Only the listen thread touches it.
    session: Mutex<Option<TcpStream>>,
    /// Reply handles for requests not yet answered, oldest first.
    routing: Mutex<VecDeque<TcpStream>>,
}

impl ClientServer {
    /// Bind the server socket.
    ///
    /// In `"hpc"` mode clients are co-resident login-node tunnels, so the
    /// socket binds to loopback. Any other mode binds the fastest local
    /// IPv4 so peers on other nodes can reach it. The port is
    /// kernel-assigned and read back into the published endpoint.
    pub fn bind(mode: &str) -> NetResult<Self> {
        let ip = if mode == "hpc" {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V4(best_local_ipv4().unwrap_or_else(|| {
                warn!("no routable interface found, binding to loopback");
                Ipv4Addr::LOCALHOST
            }))
        };

        let listener = TcpListener::bind((ip, 0)).map_err(|source| NetError::Bind {
            endpoint: format!("tcp://{ip}:0"),
            source,
        })?;
        let endpoint = format!("tcp://{}", listener.local_addr()?);
        debug!("server bound to {}", endpoint);

        Ok(Self {
            info: ServerInfo {
                mode: mode.to_string(),
                nodename: sleipnir_registry::nodename(),
                endpoint,
            },
            listener,
            session: Mutex::new(None),
            routing: Mutex::new(VecDeque::new()),
        })
    }

    /// The published endpoint, `tcp://ip:port`.
    pub fn endpoint(&self) -> &str {
        &self.info.endpoint
    }

    /// The `net` entry for this server's registry record.
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Block until the next client connects, replacing the current session.
    pub fn accept(&self) -> NetResult<()> {
        let (stream, peer) = self.listener.accept().map_err(NetError::Accept)?;
        debug!("accepted client {}", peer);
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(stream);
        Ok(())
    }

    /// Receive the next client payload.
    ///
    /// Any socket error (including the client hanging up) is reported as
    /// the [`CLOSE_SENTINEL`], which tells the listen loop to re-accept. A
    /// payload that *is* the sentinel carries no reply obligation, so no
    /// routing handle is enqueued for it.
    pub fn recv_data(&self) -> String {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let Some(stream) = session.as_mut() else {
            return CLOSE_SENTINEL.to_string();
        };

        let payload = match read_frame(stream) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("client receive failed, closing session: {}", e);
                return CLOSE_SENTINEL.to_string();
            }
        };
        let message = String::from_utf8_lossy(&payload).into_owned();
        if message == CLOSE_SENTINEL {
            return message;
        }

        match stream.try_clone() {
            Ok(handle) => {
                self.routing
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push_back(handle);
                message
            }
            Err(e) => {
                error!("could not retain reply handle: {}", e);
                CLOSE_SENTINEL.to_string()
            }
        }
    }

    /// Reply to the oldest request that has not been answered yet.
    pub fn send_result(&self, result: &str) -> NetResult<()> {
        let mut handle = {
            let mut routing = self.routing.lock().unwrap_or_else(|e| e.into_inner());
            routing.pop_front().ok_or(NetError::NoPendingClient)?
        };
        write_frame(&mut handle, result.as_bytes()).map_err(|source| NetError::Send {
            target: handle
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "client".to_string()),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn connect(endpoint: &str) -> TcpStream {
        TcpStream::connect(endpoint.trim_start_matches("tcp://")).unwrap()
    }

    #[test]
    fn test_bind_reads_back_endpoint() {
        let server = ClientServer::bind("hpc").unwrap();
        assert!(server.endpoint().starts_with("tcp://127.0.0.1:"));
        assert_eq!(server.info().nodename, "login");
    }

    #[test]
    fn test_request_reply_round_trip() {
        let server = ClientServer::bind("hpc").unwrap();
        let endpoint = server.endpoint().to_string();

        let client = thread::spawn(move || {
            let mut stream = connect(&endpoint);
            write_frame(&mut stream, b"{\"id\":\"t1\"}").unwrap();
            String::from_utf8(read_frame(&mut stream).unwrap()).unwrap()
        });

        server.accept().unwrap();
        assert_eq!(server.recv_data(), "{\"id\":\"t1\"}");
        server.send_result("{\"ok\":true}").unwrap();

        assert_eq!(client.join().unwrap(), "{\"ok\":true}");
    }

    #[test]
    fn test_close_then_new_client_is_served() {
        let server = ClientServer::bind("hpc").unwrap();
        let endpoint = server.endpoint().to_string();

        let clients = thread::spawn(move || {
            let mut first = connect(&endpoint);
            write_frame(&mut first, b"task-1").unwrap();
            let reply = String::from_utf8(read_frame(&mut first).unwrap()).unwrap();
            write_frame(&mut first, CLOSE_SENTINEL.as_bytes()).unwrap();
            drop(first);

            let mut second = connect(&endpoint);
            write_frame(&mut second, b"task-2").unwrap();
            let second_reply = String::from_utf8(read_frame(&mut second).unwrap()).unwrap();
            (reply, second_reply)
        });

        server.accept().unwrap();
        assert_eq!(server.recv_data(), "task-1");
        server.send_result("reply-1").unwrap();
        assert_eq!(server.recv_data(), CLOSE_SENTINEL);

        server.accept().unwrap();
        assert_eq!(server.recv_data(), "task-2");
        server.send_result("reply-2").unwrap();

        let (first, second) = clients.join().unwrap();
        assert_eq!(first, "reply-1");
        assert_eq!(second, "reply-2");
    }

    #[test]
    fn test_reply_without_request_is_error() {
        let server = ClientServer::bind("hpc").unwrap();
        assert!(matches!(
            server.send_result("{}"),
            Err(NetError::NoPendingClient)
        ));
    }

    #[test]
    fn test_client_disconnect_reports_close() {
        let server = ClientServer::bind("hpc").unwrap();
        let endpoint = server.endpoint().to_string();

        let client = thread::spawn(move || {
            let stream = connect(&endpoint);
            drop(stream);
        });

        server.accept().unwrap();
        client.join().unwrap();
        assert_eq!(server.recv_data(), CLOSE_SENTINEL);
    }
}
