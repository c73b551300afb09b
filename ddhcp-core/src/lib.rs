//! Core of a distributed DHCP daemon: pool geometry, the DHCP wire codec,
//! the per-block lease state machine, request routing across blocks, and
//! the peer bridge used when a request targets a block owned elsewhere.
//!
//! Everything here is synchronous and performs no I/O; the `ddhcpd` binary
//! owns the sockets and the event loop that drives these types.

pub mod addr;
pub mod block;
pub mod config;
pub mod error;
pub mod lease;
pub mod options;
pub mod packet;
pub mod peer;
pub mod reply;
pub mod router;

pub use block::{BlockPlane, BlockState, BlockTable, PeerId, StaticBlockPlane};
pub use config::PoolConfig;
pub use error::CoreError;
pub use lease::{Lease, LeaseState, LeaseTable};
pub use options::{DhcpOption, OptionStore};
pub use packet::{DhcpPacket, PacketParseError};
pub use peer::{PendingCache, PendingRequest, RenewAck, RenewLease, RenewNak};
pub use router::{AddressLocation, RouterAction};
