//! Linak DPG byte codec: GATT UUIDs, command codes and frame build/parse.
//!
//! The DPG sub-protocol is a request/response exchange carried inside a
//! single GATT characteristic. Everything in this module is pure; the
//! actual reads and writes live in [`super::client`].

use uuid::Uuid;

use crate::error::{DeskError, Result};

// GATT generic access service carrying the advertised device name
pub const NAME_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const NAME_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);

// Motor control (arm/release direct input control)
pub const CONTROL_SERVICE_UUID: Uuid = Uuid::from_u128(0x99fa0001_338a_1024_8a49_009c0215f78a);
pub const CONTROL_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x99fa0002_338a_1024_8a49_009c0215f78a);

// DPG request/response channel
pub const DPG_SERVICE_UUID: Uuid = Uuid::from_u128(0x99fa0010_338a_1024_8a49_009c0215f78a);
pub const DPG_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x99fa0011_338a_1024_8a49_009c0215f78a);

// Current height (in 0.1mm units from the lowest position) and speed
pub const HEIGHT_SPEED_SERVICE_UUID: Uuid = Uuid::from_u128(0x99fa0020_338a_1024_8a49_009c0215f78a);
pub const HEIGHT_SPEED_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x99fa0021_338a_1024_8a49_009c0215f78a);

// Position reference input (target height during a move)
pub const INPUT_SERVICE_UUID: Uuid = Uuid::from_u128(0x99fa0030_338a_1024_8a49_009c0215f78a);
pub const INPUT_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x99fa0031_338a_1024_8a49_009c0215f78a);

/// Writing this raw value into a memory cell clears it back to "unset".
pub const MEMORY_CLEAR_SENTINEL: u16 = 0xFFFF;

/// DPG command codes.
///
/// Closed set for this protocol revision; codes go on the wire through the
/// explicit [`code`](Self::code) accessor rather than numeric casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpgCommand {
    ProductInfo,
    Name,
    Capabilities,
    DeskOffset,
    UserId,
    ReminderSetting,
    MemoryPosition1,
    MemoryPosition2,
    MemoryPosition3,
    MemoryPosition4,
    LogEntry,
}

impl DpgCommand {
    /// The one-byte command code on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::ProductInfo => 0x08,
            Self::Name => 0x26,
            Self::Capabilities => 0x80,
            Self::DeskOffset => 0x81,
            Self::UserId => 0x86,
            Self::ReminderSetting => 0x88,
            Self::MemoryPosition1 => 0x89,
            Self::MemoryPosition2 => 0x8a,
            Self::MemoryPosition3 => 0x8b,
            Self::MemoryPosition4 => 0x8c,
            Self::LogEntry => 0x90,
        }
    }

    /// Minimum payload length of a response to this command. Shorter
    /// responses are rejected as [`DeskError::MalformedResponse`].
    ///
    /// Value-carrying commands may legitimately answer with just the
    /// "undefined" flag byte, so one flag byte is the floor for every
    /// command in this revision; value decoding enforces the rest.
    pub fn min_payload_len(self) -> usize {
        1
    }

    /// Command for a 1-based memory cell number.
    ///
    /// Only four memory-position commands exist in this protocol revision,
    /// regardless of what the capability byte claims.
    pub fn memory_position(cell: u8) -> Result<Self> {
        match cell {
            1 => Ok(Self::MemoryPosition1),
            2 => Ok(Self::MemoryPosition2),
            3 => Ok(Self::MemoryPosition3),
            4 => Ok(Self::MemoryPosition4),
            _ => Err(DeskError::InvalidMemoryCell(cell)),
        }
    }
}

/// Build a query frame (read, no payload): `[0x7F, code, 0x00]`.
pub fn query_frame(command: DpgCommand) -> Vec<u8> {
    vec![0x7f, command.code(), 0x00]
}

/// Build a write frame: `[0x7F, code, 0x80, 0x01]` followed by the
/// little-endian payload bytes.
pub fn write_frame(command: DpgCommand, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x7f, command.code(), 0x80, 0x01];
    frame.extend_from_slice(payload);
    frame
}

/// Build a write frame carrying a single little-endian u16 value.
pub fn write_frame_u16(command: DpgCommand, value: u16) -> Vec<u8> {
    write_frame(command, &value.to_le_bytes())
}

/// A parsed DPG response: two ack header bytes followed by the
/// command-specific payload, whose first byte is the defined/status flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpgResponse {
    ack: [u8; 2],
    payload: Vec<u8>,
}

impl DpgResponse {
    /// Split raw response bytes into ack header and payload, enforcing the
    /// command's minimum payload length.
    pub fn parse(command: DpgCommand, bytes: &[u8]) -> Result<Self> {
        let payload_len = bytes.len().saturating_sub(2);
        let expected = command.min_payload_len();
        if bytes.len() < 2 || payload_len < expected {
            return Err(DeskError::MalformedResponse {
                command,
                expected,
                actual: payload_len,
            });
        }
        Ok(Self {
            ack: [bytes[0], bytes[1]],
            payload: bytes[2..].to_vec(),
        })
    }

    /// Whether the device acknowledged a write. Depending on firmware the
    /// ack arrives as `[0x01, _]` or `[_, 0x00]`; either form counts.
    pub fn ack_ok(&self) -> bool {
        self.ack[0] == 0x01 || self.ack[1] == 0x00
    }

    /// The status/defined flag: `0x01` = defined, `0x00` = undefined.
    pub fn status(&self) -> u8 {
        self.payload[0]
    }

    /// Whether the queried value is defined on the device.
    pub fn is_defined(&self) -> bool {
        self.status() == 0x01
    }

    /// Payload bytes following the status flag.
    pub fn tail(&self) -> &[u8] {
        &self.payload[1..]
    }

    /// Decode the little-endian u16 value following the status flag.
    /// `None` when the device reports the value as undefined.
    pub fn value_u16(&self, command: DpgCommand) -> Result<Option<u16>> {
        if !self.is_defined() {
            return Ok(None);
        }
        let tail = self.tail();
        if tail.len() < 2 {
            return Err(DeskError::MalformedResponse {
                command,
                expected: 3,
                actual: self.payload.len(),
            });
        }
        Ok(Some(u16::from_le_bytes([tail[0], tail[1]])))
    }
}

/// Desk features reported by the capability byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeskCapabilities {
    /// Number of memory cells (numbered from 1 toward callers).
    pub memory_cells: u8,
    pub auto_up: bool,
    pub auto_down: bool,
    pub ble_allowed: bool,
    pub has_display: bool,
    pub has_light: bool,
}

impl DeskCapabilities {
    /// Unpack the capability bit-fields from the response status byte.
    pub fn from_byte(byte: u8) -> Self {
        Self {
            memory_cells: byte & 0b0000_0111,
            auto_up: byte & 0b0000_1000 != 0,
            auto_down: byte & 0b0001_0000 != 0,
            ble_allowed: byte & 0b0010_0000 != 0,
            has_display: byte & 0b0100_0000 != 0,
            has_light: byte & 0b1000_0000 != 0,
        }
    }
}

/// Parse the 4-byte height/speed sensor frame: two little-endian u16s.
/// Only the height half matters to callers; speed rides along.
pub fn parse_height_speed(bytes: &[u8]) -> Option<(u16, u16)> {
    if bytes.len() < 4 {
        return None;
    }
    let height = u16::from_le_bytes([bytes[0], bytes[1]]);
    let speed = u16::from_le_bytes([bytes[2], bytes[3]]);
    Some((height, speed))
}
