//! SDEP Protocol Communication
//!
//! Implements the Simple Data Exchange Protocol (SDEP) used by Bluefruit LE
//! SPI peripherals: framed packets over a half-duplex polled bus, an AT
//! command/response session layered on top, and the busy/ready flow-control
//! handshake that is the only flow-control primitive this link offers.
//!
//! The peripheral has no push delivery; every inbound transfer is gated by a
//! readiness line and a per-transfer busy/ready probe. All waits in this
//! module are bounded so that a stalled peripheral surfaces as
//! [`ProtocolError::Timeout`] instead of an indefinite hang.

pub mod bus;
mod error;
mod link;
mod packet;
mod session;

pub use bus::{BusGuard, BusTransport};
pub use error::ProtocolError;
pub use link::{Link, LinkConfig};
pub use packet::{CommandType, Header, Inbound, MessageType, Packet, BUSY_SENTINEL, PAYLOAD_MAX};
pub use session::{AtReply, RawReply, Session};

/// Probe attempts against a busy peripheral before a transfer counts as
/// timed out
pub const BUSY_RETRY_LIMIT: u32 = 100;

/// Readiness-line polls before an expected inbound packet counts as timed
/// out
pub const READY_POLL_LIMIT: u32 = 100;

/// Default pause between busy probe attempts in milliseconds
pub const DEFAULT_BUSY_RETRY_DELAY_MS: u64 = 1;

/// Default pause between readiness-line polls in milliseconds
pub const DEFAULT_READY_POLL_DELAY_MS: u64 = 5;
