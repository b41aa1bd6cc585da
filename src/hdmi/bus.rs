//! Display data channel transport.

use std::io;
use std::time::Duration;

/// Size of one EDID block.
pub const EDID_BLOCK_LEN: usize = 128;

/// A bus carrying DDC, usually an I2C adapter.
///
/// Implementations bound every transfer with their own timeout, so none of these calls may
/// block indefinitely.
pub trait DdcBus: Send + Sync {
    /// Reads one 128-byte EDID block.
    fn read_block(&self, index: u8) -> Result<[u8; EDID_BLOCK_LEN], BusError>;

    /// Whether anything answers at the EDID address.
    fn probe(&self) -> bool;

    fn name(&self) -> &str {
        "ddc"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("no response from sink")]
    NotFound,
    #[error("transfer timed out after {0:?}")]
    Timeout(Duration),
    #[error("bus I/O error")]
    Io(#[from] io::Error),
}
