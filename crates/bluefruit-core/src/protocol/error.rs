//! Protocol errors

use thiserror::Error;

/// Errors that can occur during SDEP communication
///
/// [`ProtocolError::Timeout`] always means a bounded retry or poll loop ran
/// out; every other variant is a transport-class fault. Callers that need to
/// tell a stalled link from a broken one match on `Timeout`.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Timed out waiting for peripheral readiness")]
    Timeout,

    #[error("Unexpected command id {0:#06x} in response")]
    UnexpectedCommand(u16),

    #[error("Peripheral not connected to a BLE client")]
    NotConnected,

    #[error("AT command failed: {0}")]
    At(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error is a bounded-wait expiry rather than a transport
    /// fault
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout)
    }
}
