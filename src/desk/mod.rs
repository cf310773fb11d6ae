//! Desk control: protocol engine, GATT link and the public facade.
//!
//! [`Desk`] is the externally consumed API. It speaks millimeters from
//! the floor; underneath, [`client::DpgClient`] works in raw tenths of a
//! millimeter from the desk's lowest mechanical position and the
//! calibrated offset bridges the two.

pub mod client;
pub mod convert;
pub mod link;
pub mod protocol;

use client::DpgClient;
use convert::{mm_from_raw, raw_from_floor_mm, raw_from_mm};
use link::{BleLink, GattLink};
use protocol::DeskCapabilities;

use crate::error::{DeskError, Result};

/// A connected desk session.
///
/// Exclusive to one caller; operations are strict request/response
/// exchanges and must be awaited to completion before the next one is
/// issued. Dropping the desk releases the link (best effort); call
/// [`disconnect`](Self::disconnect) for a deterministic teardown.
pub struct Desk<L: GattLink> {
    client: DpgClient<L>,
    capabilities: DeskCapabilities,
    /// Calibrated floor-to-lowest-position distance, raw. Fetched at
    /// setup, refreshed by [`set_min_height`](Self::set_min_height).
    offset_raw: u16,
}

impl Desk<BleLink> {
    /// Scan, connect and set the session up.
    ///
    /// With no address, the first advertising desk wins.
    pub async fn connect(address: Option<&str>) -> Result<Self> {
        let link = BleLink::connect(address).await?;
        Self::with_link(link).await
    }
}

impl<L: GattLink> Desk<L> {
    /// Session setup over an already established link: the one-time
    /// user-id echo the firmware demands before it honors memory-cell
    /// writes, then the capability and offset fetch.
    pub async fn with_link(link: L) -> Result<Self> {
        let client = DpgClient::new(link);

        let user_id = client.user_id().await?;
        client.set_user_id(&user_id).await?;

        let capabilities = client.capabilities().await?;
        let offset_raw = client.offset().await?;
        log::info!(
            "Session ready: {} memory cells, offset {:.1} mm",
            capabilities.memory_cells,
            mm_from_raw(offset_raw)
        );

        Ok(Self {
            client,
            capabilities,
            offset_raw,
        })
    }

    pub fn capabilities(&self) -> &DeskCapabilities {
        &self.capabilities
    }

    /// Advertised device name.
    pub async fn name(&self) -> Result<String> {
        self.client.name().await
    }

    pub async fn set_name(&self, name: &str) -> Result<()> {
        self.client.set_name(name).await
    }

    /// Height of the desk's lowest position above the floor, in mm.
    pub fn min_height(&self) -> f32 {
        mm_from_raw(self.offset_raw)
    }

    /// Calibrate the lowest-position height.
    pub async fn set_min_height(&mut self, mm: f32) -> Result<()> {
        let raw = raw_from_mm(mm);
        self.client.set_offset(raw).await?;
        self.offset_raw = raw;
        Ok(())
    }

    /// Current height above the floor in mm, from a fresh sensor read.
    pub async fn height(&self) -> Result<f32> {
        let sensor = self.client.height_raw().await?;
        Ok(convert::floor_mm(self.offset_raw, sensor))
    }

    /// Move to a floor-relative height in mm and block until the desk
    /// settles. Completion means "stopped moving", not "reached target" —
    /// the desk may park early at a mechanical limit.
    pub async fn set_height(&self, mm: f32) -> Result<()> {
        let target = raw_from_floor_mm(self.offset_raw, mm);
        self.client.move_to_raw(target).await
    }

    /// Stored memory position in floor-relative mm; `None` when unset.
    pub async fn memory(&self, cell: u8) -> Result<Option<f32>> {
        self.check_cell(cell)?;
        let raw = self.client.memory_raw(cell).await?;
        Ok(raw.map(|r| convert::floor_mm(self.offset_raw, r)))
    }

    /// Store a floor-relative height in a memory cell.
    pub async fn set_memory(&self, cell: u8, mm: f32) -> Result<()> {
        self.check_cell(cell)?;
        let raw = raw_from_floor_mm(self.offset_raw, mm);
        self.client.set_memory_raw(cell, raw).await
    }

    /// Store the desk's current height in a memory cell.
    pub async fn set_memory_to_current(&self, cell: u8) -> Result<f32> {
        let current = self.height().await?;
        self.set_memory(cell, current).await?;
        Ok(current)
    }

    /// Reset a memory cell to unset.
    pub async fn clear_memory(&self, cell: u8) -> Result<()> {
        self.check_cell(cell)?;
        self.client.clear_memory(cell).await
    }

    /// Deterministic session teardown; safe to call more than once.
    pub async fn disconnect(&self) -> Result<()> {
        self.client.link().disconnect().await
    }

    fn check_cell(&self, cell: u8) -> Result<()> {
        if cell == 0 || cell > self.capabilities.memory_cells {
            return Err(DeskError::InvalidMemoryCell(cell));
        }
        Ok(())
    }
}
