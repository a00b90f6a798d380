//! Packet engine
//!
//! Frames single packets, runs the busy/ready handshake with bounded
//! retries, and decodes inbound packets. The busy bit is the only
//! flow-control primitive the link offers, and there is no cancellation
//! mechanism above it, so every wait here is bounded: a fixed retry count
//! times a fixed per-iteration delay. Exhausting a bound converts what
//! would be an indefinite hang into [`ProtocolError::Timeout`].

use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::bus::{BusGuard, BusTransport};
use super::packet::{CommandType, Header, Inbound, MessageType, Packet, BUSY_SENTINEL};
use super::{
    ProtocolError, BUSY_RETRY_LIMIT, DEFAULT_BUSY_RETRY_DELAY_MS, DEFAULT_READY_POLL_DELAY_MS,
    READY_POLL_LIMIT,
};

/// Timing and retry bounds for the packet engine
///
/// The worst-case wait for any operation is `limit * delay`; tests shrink
/// the delays to zero without changing the retry arithmetic.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Probe attempts against a busy peripheral before giving up
    pub busy_retry_limit: u32,
    /// Pause between busy probe attempts
    pub busy_retry_delay: Duration,
    /// Readiness-line polls before an expected packet counts as lost
    pub ready_poll_limit: u32,
    /// Pause between readiness-line polls
    pub ready_poll_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            busy_retry_limit: BUSY_RETRY_LIMIT,
            busy_retry_delay: Duration::from_millis(DEFAULT_BUSY_RETRY_DELAY_MS),
            ready_poll_limit: READY_POLL_LIMIT,
            ready_poll_delay: Duration::from_millis(DEFAULT_READY_POLL_DELAY_MS),
        }
    }
}

impl LinkConfig {
    /// Config with all delays zeroed, for tests and simulated buses
    pub fn immediate() -> Self {
        Self {
            busy_retry_delay: Duration::ZERO,
            ready_poll_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Packet engine for one peripheral instance
///
/// Owns the bus handle exclusively; there is no hidden shared state, so
/// multiple independent peripherals are just multiple `Link` values.
pub struct Link<B: BusTransport> {
    bus: B,
    config: LinkConfig,
}

impl<B: BusTransport> Link<B> {
    /// Create a packet engine with default timing bounds
    pub fn new(bus: B) -> Self {
        Self::with_config(bus, LinkConfig::default())
    }

    /// Create a packet engine with explicit timing bounds
    pub fn with_config(bus: B, config: LinkConfig) -> Self {
        Self { bus, config }
    }

    /// Get the timing configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Get the underlying bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Get the underlying bus mutably
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Consume the engine and return the bus
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Send a single packet.
    ///
    /// Frames a 3-byte header plus at most the first
    /// [`PAYLOAD_MAX`](super::PAYLOAD_MAX) bytes of `data`; longer input
    /// sets the continuation flag and the remainder is the caller's to
    /// send in further calls. The peripheral is probed with one
    /// message-type byte first; a busy answer releases the bus, waits one
    /// retry delay and tries again, up to the configured cap.
    pub fn send_packet(&mut self, command: CommandType, data: &[u8]) -> Result<(), ProtocolError> {
        let frame = Packet::first_fragment(command, data).to_bytes();
        trace!(?command, len = data.len(), "sending packet");

        for attempt in 0..self.config.busy_retry_limit {
            let mut bus = BusGuard::acquire(&mut self.bus)?;
            let status = bus.exchange(MessageType::Command as u8)?;
            if status >= BUSY_SENTINEL {
                drop(bus);
                trace!(attempt, "peripheral busy on send, retrying");
                thread::sleep(self.config.busy_retry_delay);
                continue;
            }
            bus.write(&frame)?;
            return Ok(());
        }

        warn!(?command, "peripheral stayed busy, send timed out");
        Err(ProtocolError::Timeout)
    }

    /// Receive a single packet.
    ///
    /// Waits for the readiness line first; the bus is not touched until it
    /// asserts. Then runs the same busy probe/retry handshake as the send
    /// path, decodes the header, and reads the payload. An unrecognized
    /// command id yields [`Inbound::OutOfBand`] with the payload left
    /// unread; out-of-band traffic is informational, not a fault.
    pub fn receive_packet(&mut self) -> Result<Inbound, ProtocolError> {
        self.wait_ready()?;

        for attempt in 0..self.config.busy_retry_limit {
            let mut bus = BusGuard::acquire(&mut self.bus)?;
            let mut probe = [0u8; 1];
            bus.read(&mut probe)?;
            if probe[0] >= BUSY_SENTINEL {
                drop(bus);
                trace!(attempt, "peripheral busy on receive, retrying");
                thread::sleep(self.config.busy_retry_delay);
                continue;
            }

            let mut raw_header = [0u8; 3];
            bus.read(&mut raw_header)?;
            let header = Header::from_bytes(raw_header);

            match CommandType::from_raw(header.raw_command) {
                Some(command) if command.valid_inbound() => {
                    let mut payload = vec![0u8; header.length];
                    bus.read(&mut payload)?;
                    trace!(?command, len = header.length, more = header.more, "received packet");
                    return Ok(Inbound::Fragment {
                        more: header.more,
                        payload,
                    });
                }
                _ => {
                    debug!(raw = header.raw_command, "out-of-band packet");
                    return Ok(Inbound::OutOfBand(header.raw_command));
                }
            }
        }

        warn!("peripheral stayed busy, receive timed out");
        Err(ProtocolError::Timeout)
    }

    /// Poll the readiness line until it asserts, within the configured
    /// bound
    fn wait_ready(&mut self) -> Result<(), ProtocolError> {
        let mut polls = 0;
        while !self.bus.data_ready()? {
            polls += 1;
            if polls > self.config.ready_poll_limit {
                warn!("readiness line never asserted");
                return Err(ProtocolError::Timeout);
            }
            thread::sleep(self.config.ready_poll_delay);
        }
        Ok(())
    }
}
