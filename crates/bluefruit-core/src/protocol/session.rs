//! AT command session
//!
//! Fragments outbound AT command text into packet-sized chunks and
//! reassembles fragmented responses using the continuation flag. One
//! `write_command`/`read_reply` pair is one logical exchange; `&mut self`
//! on every operation serializes callers per instance, and overlapping
//! exchanges across instances sharing a peripheral are the caller's
//! problem to avoid.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bus::BusTransport;
use super::link::Link;
use super::packet::{CommandType, Inbound, PAYLOAD_MAX};
use super::ProtocolError;

/// Terminal marker of a successful AT response
const OK_MARKER: &[u8] = b"OK\r\n";

/// Terminal marker of a failed AT response
const ERROR_MARKER: &[u8] = b"ERROR\r\n";

/// Settle time after the initialization packet, matching the firmware's
/// boot-up window
const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

/// Classified terminal response of one AT exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtReply {
    /// Whether the response ended with the OK marker
    pub success: bool,
    /// Response text with the terminal marker stripped; empty when no
    /// marker was present at all
    pub payload: String,
}

impl AtReply {
    /// Classify reassembled response text by its trailing marker
    pub fn classify(raw: &[u8]) -> Self {
        let reply = RawReply::classify(raw);
        Self {
            success: reply.success,
            payload: String::from_utf8_lossy(&reply.payload).into_owned(),
        }
    }
}

/// Classified terminal response with the payload kept as raw bytes
///
/// The UART tunnel carries arbitrary client bytes; decoding them as text
/// would mangle anything that is not valid UTF-8, so the marker is
/// stripped at the byte level and the payload passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReply {
    /// Whether the response ended with the OK marker
    pub success: bool,
    /// Response bytes with the terminal marker stripped; empty when no
    /// marker was present at all
    pub payload: Vec<u8>,
}

impl RawReply {
    /// Classify a reassembled response by its trailing marker
    pub fn classify(raw: &[u8]) -> Self {
        if let Some(body) = raw.strip_suffix(OK_MARKER) {
            Self {
                success: true,
                payload: body.to_vec(),
            }
        } else if let Some(body) = raw.strip_suffix(ERROR_MARKER) {
            Self {
                success: false,
                payload: body.to_vec(),
            }
        } else {
            Self {
                success: false,
                payload: Vec::new(),
            }
        }
    }
}

/// AT command session over one packet engine
pub struct Session<B: BusTransport> {
    link: Link<B>,
    settle_delay: Duration,
}

impl<B: BusTransport> Session<B> {
    /// Create a session over a packet engine
    pub fn new(link: Link<B>) -> Self {
        Self {
            link,
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
        }
    }

    /// Override the settle delay applied after initialization
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Get the underlying packet engine
    pub fn link(&self) -> &Link<B> {
        &self.link
    }

    /// Get the underlying packet engine mutably
    pub fn link_mut(&mut self) -> &mut Link<B> {
        &mut self.link
    }

    /// Consume the session and return the packet engine
    pub fn into_link(self) -> Link<B> {
        self.link
    }

    /// Send the initialization packet and wait for the firmware to settle
    pub fn initialize(&mut self) -> Result<(), ProtocolError> {
        debug!("initializing peripheral");
        self.link.send_packet(CommandType::Initialize, &[])?;
        thread::sleep(self.settle_delay);
        Ok(())
    }

    /// Fragment `text` into packet-sized chunks and send them in order.
    ///
    /// Each call hands the packet engine the whole remainder; the engine
    /// frames the first [`PAYLOAD_MAX`] bytes and sets the continuation
    /// flag when more are left, so the flag is set on every fragment but
    /// the last. Faults propagate unchanged.
    pub fn write_command(&mut self, text: &[u8]) -> Result<(), ProtocolError> {
        for offset in (0..text.len()).step_by(PAYLOAD_MAX) {
            self.link
                .send_packet(CommandType::AtWrapper, &text[offset..])?;
        }
        Ok(())
    }

    /// Reassemble one response.
    ///
    /// Receives packets until the first fragment whose continuation flag
    /// is clear, concatenating payloads into a buffer owned by this call.
    /// Out-of-band traffic in the middle of an exchange is escalated to a
    /// transport fault: the reply can no longer be trusted.
    pub fn read_reply(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let mut buffer = Vec::new();
        loop {
            match self.link.receive_packet()? {
                Inbound::Fragment { more, payload } => {
                    buffer.extend_from_slice(&payload);
                    if !more {
                        return Ok(buffer);
                    }
                }
                Inbound::OutOfBand(raw) => {
                    return Err(ProtocolError::UnexpectedCommand(raw));
                }
            }
        }
    }

    /// Run one full AT exchange and classify the response.
    ///
    /// A newline is appended so the firmware sees a complete command line.
    pub fn at_command(&mut self, cmd: &str) -> Result<AtReply, ProtocolError> {
        self.at_command_raw(cmd.as_bytes())
    }

    /// Byte-level variant of [`Session::at_command`] for command lines
    /// that are not valid UTF-8 (escaped UART chunks)
    pub fn at_command_raw(&mut self, cmd: &[u8]) -> Result<AtReply, ProtocolError> {
        let raw = self.exchange(cmd)?;
        Ok(AtReply::classify(&raw))
    }

    /// Run one full AT exchange and classify the response without text
    /// decoding, preserving every payload byte
    pub fn at_command_bytes(&mut self, cmd: &str) -> Result<RawReply, ProtocolError> {
        let raw = self.exchange(cmd.as_bytes())?;
        Ok(RawReply::classify(&raw))
    }

    fn exchange(&mut self, cmd: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        debug!(cmd = %String::from_utf8_lossy(cmd), "AT exchange");
        let mut line = Vec::with_capacity(cmd.len() + 1);
        line.extend_from_slice(cmd);
        line.push(b'\n');
        self.write_command(&line)?;
        self.read_reply()
    }

    /// Run an AT exchange and convert an ERROR reply into a fault,
    /// returning the payload of a successful one
    pub fn at_ok(&mut self, cmd: &str) -> Result<String, ProtocolError> {
        let reply = self.at_command(cmd)?;
        if reply.success {
            Ok(reply.payload)
        } else {
            Err(ProtocolError::At(cmd.to_string()))
        }
    }
}
