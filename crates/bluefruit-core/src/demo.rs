//! Demo Mode - Simulated Bluefruit peripheral
//!
//! Implements the SDEP slave side of the protocol in memory: the busy/ready
//! handshake, AT command handling for the commands the rest of this crate
//! issues, and a loopback BLE UART. Lets the full stack, packet engine
//! through stream adapter, run in tests and demos without hardware.

use std::collections::VecDeque;
use std::io;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::protocol::{BusTransport, CommandType, Header, MessageType, BUSY_SENTINEL, PAYLOAD_MAX};

/// Bytes handed out per `AT+BLEUARTRX` poll; forces large client payloads
/// across several polls the way the real firmware's buffer does
const RX_POLL_CHUNK: usize = 64;

const DEFAULT_DEVICE_NAME: &str = "Bluefruit";

/// Simulated Bluefruit peripheral on the controller side of the bus
pub struct DemoPeripheral {
    selected: bool,
    /// Probes still to be answered busy before real traffic resumes
    remaining_busy: u32,
    /// Probability of answering any probe busy, for timing jitter
    busy_chance: f64,
    rng: StdRng,

    /// Inbound AT command text mid-reassembly
    partial_cmd: Vec<u8>,
    /// Outbound transfers not yet started: probe byte, header, payload
    pending: VecDeque<Vec<u8>>,
    /// Transfer being served and its read cursor
    current: Option<(Vec<u8>, usize)>,

    initialized: bool,
    connected: bool,
    device_name: String,
    tx_power: i8,
    /// Bytes queued as if sent by the connected BLE client
    from_client: VecDeque<u8>,
    /// Bytes the controller tunneled out through the UART, unescaped
    to_client: Vec<u8>,
}

impl Default for DemoPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoPeripheral {
    /// Create a peripheral with no busy jitter
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a peripheral with a deterministic jitter source
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            selected: false,
            remaining_busy: 0,
            busy_chance: 0.0,
            rng,
            partial_cmd: Vec::new(),
            pending: VecDeque::new(),
            current: None,
            initialized: false,
            connected: true,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            tx_power: 0,
            from_client: VecDeque::new(),
            to_client: Vec::new(),
        }
    }

    /// Answer the next `count` probes busy
    pub fn set_busy(&mut self, count: u32) {
        self.remaining_busy = count;
    }

    /// Answer any probe busy with probability `chance`
    pub fn set_busy_chance(&mut self, chance: f64) {
        self.busy_chance = chance;
    }

    /// Simulate pairing or unpairing with a BLE client
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Whether the initialization packet has been received
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current device name
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Queue bytes as if the connected client wrote them to the UART
    pub fn push_client_data(&mut self, data: &[u8]) {
        self.from_client.extend(data.iter().copied());
    }

    /// Bytes the controller sent through the UART so far, unescaped
    pub fn client_received(&self) -> &[u8] {
        &self.to_client
    }

    /// Queue a raw inbound transfer, for exercising out-of-band traffic
    pub fn queue_raw_transfer(&mut self, probe: u8, header: [u8; 3], payload: &[u8]) {
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.push(probe);
        frame.extend_from_slice(&header);
        frame.extend_from_slice(payload);
        self.pending.push_back(frame);
    }

    fn probe_busy(&mut self) -> bool {
        if self.remaining_busy > 0 {
            self.remaining_busy -= 1;
            return true;
        }
        self.busy_chance > 0.0 && self.rng.gen_bool(self.busy_chance)
    }

    /// Fragment response text into SDEP transfers and queue them
    fn respond(&mut self, text: &[u8]) {
        let id = CommandType::AtWrapper.id();
        let chunks: Vec<&[u8]> = text.chunks(PAYLOAD_MAX).collect();
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let mut len_byte = chunk.len() as u8;
            if i < last {
                len_byte |= 0x80;
            }
            self.queue_raw_transfer(
                MessageType::Response as u8,
                [(id & 0xFF) as u8, (id >> 8) as u8, len_byte],
                chunk,
            );
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        if frame.len() < 3 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame shorter than a header",
            ));
        }
        let header = Header::from_bytes([frame[0], frame[1], frame[2]]);
        let payload = &frame[3..];
        if payload.len() != header.length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame length does not match header",
            ));
        }

        match CommandType::from_raw(header.raw_command) {
            Some(CommandType::Initialize) => {
                self.initialized = true;
                self.partial_cmd.clear();
                self.pending.clear();
                self.current = None;
                Ok(())
            }
            Some(CommandType::AtWrapper) => {
                self.partial_cmd.extend_from_slice(payload);
                if !header.more {
                    let line = std::mem::take(&mut self.partial_cmd);
                    let response = self.process_line(&line);
                    self.respond(&response);
                }
                Ok(())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported outbound command {:#06x}", header.raw_command),
            )),
        }
    }

    fn process_line(&mut self, line: &[u8]) -> Vec<u8> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        trace!(cmd = %String::from_utf8_lossy(line), "demo peripheral command");

        if line == b"AT+BLEUARTRX" {
            if !self.connected {
                return b"ERROR\r\n".to_vec();
            }
            let take = self.from_client.len().min(RX_POLL_CHUNK);
            let mut out: Vec<u8> = self.from_client.drain(..take).collect();
            out.extend_from_slice(b"OK\r\n");
            return out;
        }
        if let Some(arg) = line.strip_prefix(b"AT+BLEUARTTX=") {
            if !self.connected {
                return b"ERROR\r\n".to_vec();
            }
            let unescaped = unescape(arg);
            self.to_client.extend_from_slice(&unescaped);
            return b"OK\r\n".to_vec();
        }

        let text = String::from_utf8_lossy(line).to_string();
        match text.as_str() {
            "ATZ" => b"OK\r\n".to_vec(),
            "AT+FACTORYRESET" => {
                self.device_name = DEFAULT_DEVICE_NAME.to_string();
                self.tx_power = 0;
                b"OK\r\n".to_vec()
            }
            "AT+GAPDEVNAME" => format!("{}\r\nOK\r\n", self.device_name).into_bytes(),
            "AT+GAPGETCONN" => {
                format!("{}\r\nOK\r\n", if self.connected { 1 } else { 0 }).into_bytes()
            }
            "AT+BLEGETADDR" => b"C3:2A:45:02:9B:A0\r\nOK\r\n".to_vec(),
            "AT+BLEGETPEERADDR" => {
                if self.connected {
                    b"D4:11:07:3E:5C:22\r\nOK\r\n".to_vec()
                } else {
                    b"ERROR\r\n".to_vec()
                }
            }
            "AT+BLEGETRSSI" => {
                if self.connected {
                    b"-60\r\nOK\r\n".to_vec()
                } else {
                    b"0\r\nOK\r\n".to_vec()
                }
            }
            "AT+BLEPOWERLEVEL" => format!("{}\r\nOK\r\n", self.tx_power).into_bytes(),
            _ => {
                if let Some(arg) = text.strip_prefix("AT+GAPDEVNAME=") {
                    self.device_name = arg.to_string();
                    return b"OK\r\n".to_vec();
                }
                if let Some(arg) = text.strip_prefix("AT+BLEPOWERLEVEL=") {
                    return match arg.trim().parse::<i8>() {
                        Ok(level) if [-40, -20, -16, -12, -8, -3, 0, 4].contains(&level) => {
                            self.tx_power = level;
                            b"OK\r\n".to_vec()
                        }
                        _ => b"ERROR\r\n".to_vec(),
                    };
                }
                if text.starts_with("AT+GAPSETADVDATA=") {
                    return b"OK\r\n".to_vec();
                }
                b"ERROR\r\n".to_vec()
            }
        }
    }
}

impl BusTransport for DemoPeripheral {
    fn select(&mut self) -> io::Result<()> {
        self.selected = true;
        Ok(())
    }

    fn unselect(&mut self) -> io::Result<()> {
        self.selected = false;
        // an abandoned transfer (out-of-band payload) is discarded with it
        self.current = None;
        Ok(())
    }

    fn exchange(&mut self, _byte: u8) -> io::Result<u8> {
        self.check_selected()?;
        if self.probe_busy() {
            Ok(BUSY_SENTINEL)
        } else {
            Ok(0x00)
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.check_selected()?;
        self.handle_frame(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.check_selected()?;
        if self.current.is_none() {
            if self.probe_busy() {
                buf.fill(0xFF);
                return Ok(());
            }
            match self.pending.pop_front() {
                Some(frame) => self.current = Some((frame, 0)),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "read with no transfer pending",
                    ));
                }
            }
        }

        let Some((frame, cursor)) = self.current.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read with no transfer pending",
            ));
        };
        if frame.len() - *cursor < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of transfer",
            ));
        }
        buf.copy_from_slice(&frame[*cursor..*cursor + buf.len()]);
        *cursor += buf.len();
        Ok(())
    }

    fn data_ready(&mut self) -> io::Result<bool> {
        Ok(!self.pending.is_empty() || self.current.is_some())
    }
}

impl DemoPeripheral {
    fn check_selected(&self) -> io::Result<()> {
        if self.selected {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "bus access while unselected",
            ))
        }
    }
}

/// Invert the UART text escaping applied by the stream adapter
fn unescape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\\' && i + 1 < data.len() {
            match data[i + 1] {
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'b' => out.push(0x08),
                b'\\' => out.push(b'\\'),
                other => {
                    out.push(b'\\');
                    out.push(other);
                }
            }
            i += 2;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}
