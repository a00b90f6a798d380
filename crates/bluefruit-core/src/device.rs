//! High-level Bluefruit control commands
//!
//! Thin string-building wrappers over the command session for the common
//! GAP-level operations: naming, advertising payload, connection and radio
//! queries. Nothing in the protocol core depends on this module; it sits
//! strictly above the session, and faults surface as explicit `Result`s
//! instead of the usual boolean/None conventions of the firmware docs.

use std::thread;
use std::time::Duration;

use tracing::info;

use crate::protocol::{BusTransport, ProtocolError, Session};
use crate::uart::UartStream;

/// Settle time after a reset command, matching the firmware's reboot
/// window
const DEFAULT_RESET_SETTLE_MS: u64 = 1500;

/// Transmit power levels supported by the radio, in dBm, ascending
const TX_POWER_LEVELS: [i8; 8] = [-40, -20, -16, -12, -8, -3, 0, 4];

/// Value encoded as wire-level AT argument text
///
/// The caller states the shape explicitly; the encoder never inspects
/// runtime types to guess between a scalar and a byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtValue {
    /// Unsigned scalar, rendered as a hex literal or as its little-endian
    /// bytes depending on width
    Scalar(u32),
    /// Raw byte sequence, rendered as dash-separated hex
    Bytes(Vec<u8>),
}

impl AtValue {
    /// Render to the dash-separated hex / hex-literal syntax the AT
    /// parser expects
    pub fn to_ascii(&self) -> String {
        match self {
            AtValue::Scalar(v) if *v < 0x100 => format!("{v:#x}"),
            AtValue::Scalar(v) if *v < 0x1_0000 => {
                join_hex(&[(*v & 0xFF) as u8, (*v >> 8) as u8])
            }
            AtValue::Scalar(v) => join_hex(&v.to_le_bytes()),
            AtValue::Bytes(bytes) if bytes.len() == 1 => format!("{:#x}", bytes[0]),
            AtValue::Bytes(bytes) => join_hex(bytes),
        }
    }

    /// Parse the AT argument syntax back into a value: a `0x` hex literal
    /// decodes as a scalar, dash-separated hex pairs decode as bytes
    pub fn from_ascii(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix("0x") {
            let v = u32::from_str_radix(hex, 16)
                .map_err(|_| ProtocolError::InvalidResponse(text.to_string()))?;
            return Ok(AtValue::Scalar(v));
        }
        let bytes = text
            .split('-')
            .map(|field| u8::from_str_radix(field, 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| ProtocolError::InvalidResponse(text.to_string()))?;
        Ok(AtValue::Bytes(bytes))
    }
}

fn join_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join("-")
}

/// A Bluefruit LE peripheral
///
/// Wraps a [`Session`] with the GAP-level convenience commands; drop down
/// to [`Bluefruit::session_mut`] for anything not covered here.
pub struct Bluefruit<B: BusTransport> {
    session: Session<B>,
    reset_settle: Duration,
}

impl<B: BusTransport> Bluefruit<B> {
    /// Wrap a session
    pub fn new(session: Session<B>) -> Self {
        Self {
            session,
            reset_settle: Duration::from_millis(DEFAULT_RESET_SETTLE_MS),
        }
    }

    /// Override the settle delay applied after reset commands
    pub fn with_reset_settle(mut self, delay: Duration) -> Self {
        self.reset_settle = delay;
        self
    }

    /// Get the underlying session mutably
    pub fn session_mut(&mut self) -> &mut Session<B> {
        &mut self.session
    }

    /// Consume the device and return the session
    pub fn into_session(self) -> Session<B> {
        self.session
    }

    /// Consume the device and open a BLE UART stream over its session
    pub fn into_uart(self) -> UartStream<B> {
        UartStream::new(self.session)
    }

    /// Send the initialization packet and wait for the firmware to settle
    pub fn initialize(&mut self) -> Result<(), ProtocolError> {
        self.session.initialize()
    }

    /// Perform a factory reset and wait for the reboot
    pub fn factory_reset(&mut self) -> Result<(), ProtocolError> {
        info!("factory reset");
        self.session.at_ok("AT+FACTORYRESET")?;
        thread::sleep(self.reset_settle);
        Ok(())
    }

    /// Perform a software reset and wait for the reboot
    pub fn reset(&mut self) -> Result<(), ProtocolError> {
        info!("software reset");
        self.session.at_ok("ATZ")?;
        thread::sleep(self.reset_settle);
        Ok(())
    }

    /// Get the current device name
    pub fn device_name(&mut self) -> Result<String, ProtocolError> {
        self.session.at_ok("AT+GAPDEVNAME").map(trimmed)
    }

    /// Change the device name; the firmware requires a reset before the
    /// new name is advertised
    pub fn set_device_name(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.session.at_ok(&format!("AT+GAPDEVNAME={name}"))?;
        self.reset()
    }

    /// Whether the peripheral is connected to a BLE client
    pub fn is_connected(&mut self) -> Result<bool, ProtocolError> {
        let res = self.session.at_ok("AT+GAPGETCONN")?;
        Ok(res.trim() == "1")
    }

    /// Get the 48-bit MAC address of the peripheral as a hex string
    pub fn address(&mut self) -> Result<String, ProtocolError> {
        self.session.at_ok("AT+BLEGETADDR").map(trimmed)
    }

    /// Get the MAC address of the connected client as a hex string
    pub fn peer_address(&mut self) -> Result<String, ProtocolError> {
        self.session.at_ok("AT+BLEGETPEERADDR").map(trimmed)
    }

    /// Get the RSSI of the current connection in dBm
    pub fn rssi(&mut self) -> Result<i32, ProtocolError> {
        let res = self.session.at_ok("AT+BLEGETRSSI")?;
        res.trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidResponse(res))
    }

    /// Get the current transmit power level in dBm
    pub fn tx_power(&mut self) -> Result<i8, ProtocolError> {
        let res = self.session.at_ok("AT+BLEPOWERLEVEL")?;
        res.trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidResponse(res))
    }

    /// Set the transmit power, snapping `dbm` up to the nearest level the
    /// radio supports; returns the level actually applied
    pub fn set_tx_power(&mut self, dbm: i8) -> Result<i8, ProtocolError> {
        let level = TX_POWER_LEVELS
            .iter()
            .copied()
            .find(|&l| l >= dbm)
            .unwrap_or(TX_POWER_LEVELS[TX_POWER_LEVELS.len() - 1]);
        self.session.at_ok(&format!("AT+BLEPOWERLEVEL={level}"))?;
        Ok(level)
    }

    /// Replace the advertising payload with raw block-encoded data; the
    /// firmware requires a reset before it takes effect
    pub fn set_advertising_data(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let encoded = AtValue::Bytes(data.to_vec()).to_ascii();
        self.session.at_ok(&format!("AT+GAPSETADVDATA={encoded}"))?;
        self.reset()
    }
}

fn trimmed(s: String) -> String {
    s.trim().to_string()
}
