//! Bounded circular byte buffer
//!
//! Backs the UART stream adapter: a fixed-capacity ring with one producer
//! (the poll loop) and one consumer (the reader), both on the same thread.

/// Fixed-capacity ring buffer of bytes
#[derive(Debug)]
pub struct ByteFifo {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

impl ByteFifo {
    /// Create a fifo holding up to `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently queued
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the fifo holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the fifo is at capacity
    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Enqueue one byte; returns false when full
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        let tail = (self.head + self.len) % self.buf.len();
        self.buf[tail] = byte;
        self.len += 1;
        true
    }

    /// Dequeue one byte
    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % self.buf.len();
        self.len -= 1;
        Some(byte)
    }

    /// Enqueue as much of `data` as fits; returns the accepted count
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in data {
            if !self.push(byte) {
                break;
            }
            accepted += 1;
        }
        accepted
    }

    /// Dequeue into `out`; returns the number of bytes written
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let mut written = 0;
        while written < out.len() {
            match self.pop() {
                Some(byte) => {
                    out[written] = byte;
                    written += 1;
                }
                None => break,
            }
        }
        written
    }
}
