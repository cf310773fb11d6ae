//! Error types for desk control operations.

use thiserror::Error;
use uuid::Uuid;

use crate::desk::protocol::DpgCommand;

/// Main error type for all desk operations.
#[derive(Debug, Error)]
pub enum DeskError {
    /// No BLE device answered the target address.
    #[error("desk not found: no BLE device answered '{0}'")]
    DeviceNotFound(String),

    /// The device is missing a required GATT service (wrong firmware or model).
    #[error("GATT service {0} not found on device")]
    ServiceNotFound(Uuid),

    /// The device is missing a required GATT characteristic.
    #[error("GATT characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),

    /// Transport-level failure (read/write rejected, connection drop).
    #[error("BLE link error: {0}")]
    Link(#[from] btleplug::Error),

    /// A DPG response carried fewer payload bytes than the command requires.
    #[error("malformed response to {command:?}: {actual} payload byte(s), expected at least {expected}")]
    MalformedResponse {
        command: DpgCommand,
        expected: usize,
        actual: usize,
    },

    /// The device reported failure where success is required.
    #[error("DPG protocol error: {0}")]
    Protocol(String),

    /// Memory cell number outside 1..=numberOfMemoryCells.
    #[error("invalid memory cell {0}: cells are numbered starting with 1; check Desk::capabilities() for the total count")]
    InvalidMemoryCell(u8),

    /// Malformed caller input (height or cell string) at the facade boundary.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias using [`DeskError`].
pub type Result<T> = std::result::Result<T, DeskError>;
