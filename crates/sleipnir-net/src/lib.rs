//! Networking for Sleipnir processes.
//!
//! Two independent transports live here, both speaking length-delimited
//! frames over TCP (one frame carries one JSON document or one
//! decimal-encoded measurement):
//!
//! - [`ClientServer`] is the request/reply socket a QPU exposes to external
//!   submitters. Replies are matched to requests through a FIFO of routing
//!   handles, so the compute side never needs to know which client it is
//!   answering.
//! - [`ClassicalChannel`] is the peer mesh QPUs and executors use during
//!   dynamic circuit execution. Inbound frames from all peers arrive on one
//!   router-style socket and are demultiplexed by the sender identity
//!   stamped on every frame, giving each origin its own ordered stream.
//!
//! Endpoints are always rendered as `tcp://<ip>:<port>`. Binding picks the
//! kernel-assigned port and reads the concrete endpoint back for
//! publication in the registries.

pub mod channel;
pub mod error;
pub mod frame;
pub mod iface;
pub mod server;

pub use channel::ClassicalChannel;
pub use error::{NetError, NetResult};
pub use server::{ClientServer, ServerInfo, CLOSE_SENTINEL};
