//! Bus transport abstraction
//!
//! The peripheral sits behind an exclusive-access, half-duplex polled bus
//! (SPI with a chip select and a readiness line on real hardware). The
//! [`BusTransport`] trait is the seam between the packet engine and the
//! actual transport; implementations exist for hardware bindings and for
//! the in-memory demo peripheral.

use std::io;

/// Exclusive-access primitives of the half-duplex polled bus
pub trait BusTransport {
    /// Assert the chip-select line, claiming the bus
    fn select(&mut self) -> io::Result<()>;

    /// Release the chip-select line
    fn unselect(&mut self) -> io::Result<()>;

    /// Clock one byte out while sampling one byte in
    fn exchange(&mut self, byte: u8) -> io::Result<u8>;

    /// Write bytes to the selected peripheral
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read exactly `buf.len()` bytes from the selected peripheral
    fn read(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Sample the readiness (IRQ) line without touching the bus
    fn data_ready(&mut self) -> io::Result<bool>;
}

/// Scoped bus critical section
///
/// Acquiring asserts chip select; dropping releases it. Release is
/// unconditional: it happens on the success path, on busy-retry exits and
/// when an error propagates out of the underlying read/write primitives.
pub struct BusGuard<'a, B: BusTransport> {
    bus: &'a mut B,
}

impl<'a, B: BusTransport> BusGuard<'a, B> {
    /// Claim the bus
    pub fn acquire(bus: &'a mut B) -> io::Result<Self> {
        bus.select()?;
        Ok(Self { bus })
    }

    /// Clock one byte out while sampling one byte in
    pub fn exchange(&mut self, byte: u8) -> io::Result<u8> {
        self.bus.exchange(byte)
    }

    /// Write bytes to the selected peripheral
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.bus.write(data)
    }

    /// Read exactly `buf.len()` bytes from the selected peripheral
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.bus.read(buf)
    }
}

impl<B: BusTransport> Drop for BusGuard<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = self.bus.unselect() {
            tracing::warn!("failed to release bus: {e}");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted bus for exercising the packet engine without hardware

    use super::BusTransport;
    use std::collections::VecDeque;
    use std::io;

    /// One observed bus operation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Op {
        Select,
        Unselect,
        Exchange(u8),
        Write(Vec<u8>),
        Read(usize),
    }

    /// Bus double that answers from a script and records every operation
    #[derive(Debug, Default)]
    pub struct ScriptedBus {
        /// Log of every bus operation in order
        pub ops: Vec<Op>,
        /// Probes answered busy before the peripheral reports ready
        pub busy_probes: u32,
        /// Readiness-line samples returning false before it asserts;
        /// `None` means the line never asserts
        pub ready_after: Option<u32>,
        /// Inbound byte stream served by `read`, probe bytes included
        pub rx: VecDeque<u8>,
        probes_seen: u32,
        ready_samples: u32,
    }

    impl ScriptedBus {
        pub fn new() -> Self {
            Self {
                ready_after: Some(0),
                ..Self::default()
            }
        }

        /// Queue one inbound transfer: probe byte, header, payload
        pub fn queue_frame(&mut self, probe: u8, header: [u8; 3], payload: &[u8]) {
            self.rx.push_back(probe);
            self.rx.extend(header);
            self.rx.extend(payload.iter().copied());
        }

        /// Frames written by the engine, in order
        pub fn written_frames(&self) -> Vec<Vec<u8>> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Write(bytes) => Some(bytes.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Count of a given zero-argument operation
        pub fn count(&self, op: &Op) -> usize {
            self.ops.iter().filter(|o| *o == op).count()
        }
    }

    impl BusTransport for ScriptedBus {
        fn select(&mut self) -> io::Result<()> {
            self.ops.push(Op::Select);
            Ok(())
        }

        fn unselect(&mut self) -> io::Result<()> {
            self.ops.push(Op::Unselect);
            Ok(())
        }

        fn exchange(&mut self, byte: u8) -> io::Result<u8> {
            self.ops.push(Op::Exchange(byte));
            if self.probes_seen < self.busy_probes {
                self.probes_seen += 1;
                Ok(0xFE)
            } else {
                Ok(0x00)
            }
        }

        fn write(&mut self, data: &[u8]) -> io::Result<()> {
            self.ops.push(Op::Write(data.to_vec()));
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
            self.ops.push(Op::Read(buf.len()));
            for slot in buf.iter_mut() {
                *slot = self.rx.pop_front().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted")
                })?;
            }
            Ok(())
        }

        fn data_ready(&mut self) -> io::Result<bool> {
            match self.ready_after {
                Some(after) if self.ready_samples >= after => Ok(true),
                _ => {
                    self.ready_samples += 1;
                    Ok(false)
                }
            }
        }
    }
}
