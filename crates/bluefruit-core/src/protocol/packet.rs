//! SDEP packet encoding/decoding
//!
//! Wire format: `[cmd_lo, cmd_hi, len]` followed by 0-16 payload bytes.
//! Bits 0-6 of `len` carry the payload length, bit 7 is the continuation
//! flag signalling that more fragments of the same logical message follow.
//! A single message-type probe byte precedes every header transfer.

use serde::{Deserialize, Serialize};

/// Maximum payload bytes carried by a single packet
pub const PAYLOAD_MAX: usize = 16;

/// Probe responses at or above this value signal that the peripheral cannot
/// accept or deliver a frame yet
pub const BUSY_SENTINEL: u8 = 0xFE;

/// Continuation flag bit in the header length byte
const MORE_FLAG: u8 = 0x80;

/// SDEP command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    /// Peripheral initialization (0xBEEF)
    Initialize,
    /// Wrapped AT command text (0x0A00)
    AtWrapper,
    /// BLE UART transmit (0x0A01)
    UartTx,
    /// BLE UART receive poll (0x0A02)
    UartRx,
}

impl CommandType {
    /// Get the 16-bit wire identifier
    pub fn id(&self) -> u16 {
        match self {
            CommandType::Initialize => 0xBEEF,
            CommandType::AtWrapper => 0x0A00,
            CommandType::UartTx => 0x0A01,
            CommandType::UartRx => 0x0A02,
        }
    }

    /// Decode a raw 16-bit command id
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0xBEEF => Some(CommandType::Initialize),
            0x0A00 => Some(CommandType::AtWrapper),
            0x0A01 => Some(CommandType::UartTx),
            0x0A02 => Some(CommandType::UartRx),
            _ => None,
        }
    }

    /// Check if this command id is valid in an inbound packet
    ///
    /// Only the AT wrapper and UART ids are expected from the peripheral;
    /// anything else observed on receive is out-of-band traffic.
    pub fn valid_inbound(&self) -> bool {
        matches!(
            self,
            CommandType::AtWrapper | CommandType::UartTx | CommandType::UartRx
        )
    }
}

/// SDEP message types used as the probe byte preceding a header transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// Controller-to-peripheral command (0x10)
    Command = 0x10,
    /// Peripheral-to-controller response (0x20)
    Response = 0x20,
    /// Unsolicited alert (0x40)
    Alert = 0x40,
    /// Error report (0x80)
    Error = 0x80,
}

/// A single outbound SDEP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Command identifier
    pub command: CommandType,
    /// Payload, at most [`PAYLOAD_MAX`] bytes
    pub payload: Vec<u8>,
    /// Continuation flag: more fragments of this message follow
    pub more: bool,
}

impl Packet {
    /// Frame the leading fragment of `data`.
    ///
    /// Only the first [`PAYLOAD_MAX`] bytes are placed in the packet; when
    /// `data` is longer the continuation flag is set and the remainder is
    /// left for the caller to frame in further calls. This truncation is a
    /// documented contract, not a convenience: the packet layer never loops
    /// on the caller's behalf.
    pub fn first_fragment(command: CommandType, data: &[u8]) -> Self {
        let take = data.len().min(PAYLOAD_MAX);
        Self {
            command,
            payload: data[..take].to_vec(),
            more: data.len() > PAYLOAD_MAX,
        }
    }

    /// Encode the header and payload to wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= PAYLOAD_MAX);
        let id = self.command.id();
        let mut len_byte = self.payload.len() as u8;
        if self.more {
            len_byte |= MORE_FLAG;
        }
        let mut bytes = Vec::with_capacity(3 + self.payload.len());
        bytes.push((id & 0xFF) as u8);
        bytes.push((id >> 8) as u8);
        bytes.push(len_byte);
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Decoded header fields of an inbound packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw 16-bit command id as received
    pub raw_command: u16,
    /// Payload length (0-16)
    pub length: usize,
    /// Continuation flag
    pub more: bool,
}

impl Header {
    /// Decode the 3-byte wire header
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self {
            raw_command: bytes[0] as u16 | ((bytes[1] as u16) << 8),
            length: (bytes[2] & !MORE_FLAG) as usize,
            more: bytes[2] & MORE_FLAG != 0,
        }
    }
}

/// Tagged result of one inbound packet transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A fragment of a recognized message
    Fragment {
        /// More fragments of this message follow
        more: bool,
        /// Fragment payload
        payload: Vec<u8>,
    },
    /// Traffic carrying an unrecognized command id; informational, not
    /// fatal, and its payload is left unread
    OutOfBand(u16),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_payload_header() {
        let packet = Packet::first_fragment(CommandType::AtWrapper, b"ATZ\n");
        let bytes = packet.to_bytes();
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 0x0A);
        assert_eq!(bytes[2], 4); // length, continuation clear
        assert_eq!(&bytes[3..], b"ATZ\n");
    }

    #[test]
    fn test_oversized_payload_truncates_and_flags() {
        let data = [0xABu8; 40];
        let packet = Packet::first_fragment(CommandType::AtWrapper, &data);
        assert_eq!(packet.payload.len(), PAYLOAD_MAX);
        assert!(packet.more);
        let bytes = packet.to_bytes();
        assert_eq!(bytes[2], 0x80 | PAYLOAD_MAX as u8);
        assert_eq!(bytes.len(), 3 + PAYLOAD_MAX);
    }

    #[test]
    fn test_exact_boundary_payload() {
        let data = [0u8; PAYLOAD_MAX];
        let packet = Packet::first_fragment(CommandType::UartTx, &data);
        assert_eq!(packet.payload.len(), PAYLOAD_MAX);
        assert!(!packet.more);
    }

    #[test]
    fn test_empty_payload() {
        let packet = Packet::first_fragment(CommandType::Initialize, &[]);
        let bytes = packet.to_bytes();
        assert_eq!(bytes, vec![0xEF, 0xBE, 0x00]);
    }

    #[test]
    fn test_header_decode() {
        let header = Header::from_bytes([0x00, 0x0A, 0x85]);
        assert_eq!(header.raw_command, 0x0A00);
        assert_eq!(header.length, 5);
        assert!(header.more);

        let header = Header::from_bytes([0x02, 0x0A, 0x10]);
        assert_eq!(header.raw_command, 0x0A02);
        assert_eq!(header.length, 16);
        assert!(!header.more);
    }

    #[test]
    fn test_command_ids() {
        assert_eq!(CommandType::Initialize.id(), 0xBEEF);
        assert_eq!(CommandType::AtWrapper.id(), 0x0A00);
        assert_eq!(CommandType::UartTx.id(), 0x0A01);
        assert_eq!(CommandType::UartRx.id(), 0x0A02);
        assert_eq!(CommandType::from_raw(0x0A01), Some(CommandType::UartTx));
        assert_eq!(CommandType::from_raw(0x1234), None);
    }

    #[test]
    fn test_initialize_not_valid_inbound() {
        assert!(!CommandType::Initialize.valid_inbound());
        assert!(CommandType::AtWrapper.valid_inbound());
        assert!(CommandType::UartRx.valid_inbound());
    }
}
