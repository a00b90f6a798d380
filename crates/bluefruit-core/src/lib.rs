//! # Bluefruit Core Library
//!
//! Transport engine for Adafruit Bluefruit LE SPI peripherals.
//!
//! This library provides:
//! - SDEP packet framing and the busy/ready flow-control handshake
//! - AT command/response sessions with multi-packet reassembly
//! - A buffered byte stream tunneled over the BLE UART service
//! - High-level GAP convenience commands
//! - A simulated peripheral for tests and demos
//!
//! The peripheral offers no interrupt-driven push delivery, only a
//! readiness line and a busy/ready handshake per transfer; every layer
//! here is built around bounded polling of that handshake.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bluefruit_core::demo::DemoPeripheral;
//! use bluefruit_core::protocol::{Link, Session};
//! use bluefruit_core::uart::UartStream;
//!
//! let link = Link::new(DemoPeripheral::new());
//! let mut session = Session::new(link);
//! session.initialize()?;
//!
//! let mut uart = UartStream::new(session);
//! uart.write(b"hello over BLE\n")?;
//! ```

#![warn(missing_docs)]

pub mod demo;
pub mod device;
pub mod fifo;
pub mod protocol;
pub mod uart;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::demo::DemoPeripheral;
    pub use crate::device::{AtValue, Bluefruit};
    pub use crate::fifo::ByteFifo;
    pub use crate::protocol::{
        AtReply, BusTransport, CommandType, Inbound, Link, LinkConfig, ProtocolError, RawReply,
        Session,
    };
    pub use crate::uart::UartStream;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
