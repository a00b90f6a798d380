//! Buffered BLE UART stream adapter
//!
//! The Bluefruit firmware exposes no push delivery for UART data arriving
//! from the connected BLE client; the only way to get it is to ask with
//! `AT+BLEUARTRX`. Blocking reads are therefore emulated entirely by
//! repeated polling through the command session, each poll bounded by the
//! packet engine's own timeouts. Outbound bytes are escaped and tunneled
//! through `AT+BLEUARTTX`.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::fifo::ByteFifo;
use crate::protocol::{BusTransport, ProtocolError, Session};

/// Default capacity of the receive fifo in bytes
pub const DEFAULT_FIFO_CAPACITY: usize = 1024;

/// Raw bytes per outbound `AT+BLEUARTTX` chunk.
///
/// Distinct from the 16-byte packet payload cap: the chunk is re-encoded
/// as escaped text before transport and fragmented again at the packet
/// layer.
const WRITE_CHUNK: usize = 32;

/// Pause between receive polls that returned no data
const DEFAULT_POLL_DELAY_MS: u64 = 5;

/// Byte stream tunneled over the BLE UART service
///
/// Owns its session and receive fifo exclusively; one reader, one writer,
/// same thread. Read and write fail with [`ProtocolError::NotConnected`]
/// when the peripheral is not paired with a BLE client.
pub struct UartStream<B: BusTransport> {
    session: Session<B>,
    fifo: ByteFifo,
    poll_delay: Duration,
}

impl<B: BusTransport> UartStream<B> {
    /// Create a stream with the default fifo capacity
    pub fn new(session: Session<B>) -> Self {
        Self::with_capacity(session, DEFAULT_FIFO_CAPACITY)
    }

    /// Create a stream with an explicit fifo capacity
    pub fn with_capacity(session: Session<B>, capacity: usize) -> Self {
        Self {
            session,
            fifo: ByteFifo::new(capacity),
            poll_delay: Duration::from_millis(DEFAULT_POLL_DELAY_MS),
        }
    }

    /// Override the pause between empty receive polls
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Get the underlying command session mutably
    pub fn session_mut(&mut self) -> &mut Session<B> {
        &mut self.session
    }

    /// Consume the stream and return the session
    pub fn into_session(self) -> Session<B> {
        self.session
    }

    /// Bytes already buffered and readable without polling
    pub fn buffered(&self) -> usize {
        self.fifo.len()
    }

    /// Read exactly `buf.len()` bytes.
    ///
    /// Drains the fifo first; when more bytes are needed, issues one
    /// receive poll per iteration, backing off briefly when the
    /// peripheral has nothing queued. Polled bytes are copied straight
    /// into `buf` and only the surplus is buffered, so the fifo never
    /// holds more than one poll's overhang. The call blocks until `buf`
    /// is full or a fault occurs; polling that merely yields nothing is
    /// not an error.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        let mut filled = 0;
        loop {
            filled += self.fifo.drain_into(&mut buf[filled..]);
            if filled == buf.len() {
                return Ok(());
            }

            let reply = match self.session.at_command_bytes("AT+BLEUARTRX") {
                Ok(reply) if reply.success => reply,
                Ok(_) => return Err(ProtocolError::NotConnected),
                Err(e) => {
                    debug!(error = %e, "UART receive poll failed");
                    return Err(ProtocolError::NotConnected);
                }
            };

            if reply.payload.is_empty() {
                thread::sleep(self.poll_delay);
            } else {
                let bytes = &reply.payload;
                // the fifo is empty here, drained above
                let direct = bytes.len().min(buf.len() - filled);
                buf[filled..filled + direct].copy_from_slice(&bytes[..direct]);
                filled += direct;
                let accepted = self.fifo.extend(&bytes[direct..]);
                if accepted < bytes.len() - direct {
                    warn!(
                        dropped = bytes.len() - direct - accepted,
                        "UART fifo overflow"
                    );
                }
            }
        }
    }

    /// Escape and transmit `data` through the UART service.
    ///
    /// Splits into chunks of at most 32 raw bytes, escapes control
    /// characters and backslashes, and sends each chunk as one
    /// `AT+BLEUARTTX` exchange. A failed chunk aborts the remainder;
    /// bytes already sent are not rolled back.
    pub fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        for chunk in data.chunks(WRITE_CHUNK) {
            let mut cmd = b"AT+BLEUARTTX=".to_vec();
            escape_into(chunk, &mut cmd);
            match self.session.at_command_raw(&cmd) {
                Ok(reply) if reply.success => {}
                Ok(_) => return Err(ProtocolError::NotConnected),
                Err(e) => {
                    debug!(error = %e, "UART transmit failed");
                    return Err(ProtocolError::NotConnected);
                }
            }
        }
        Ok(())
    }
}

/// Escape bytes the firmware's command parser would otherwise interpret.
///
/// Byte-wise, so backslashes already in the data never collide with the
/// escapes themselves.
fn escape_into(chunk: &[u8], out: &mut Vec<u8>) {
    for &byte in chunk {
        match byte {
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(byte),
        }
    }
}
