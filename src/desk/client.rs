//! DPG protocol client: request/response exchanges and the movement loop.
//!
//! Every DPG operation is a strict write-then-read on the DPG endpoint;
//! name, height, control and input operations talk to their own
//! characteristics directly. The client is generic over [`GattLink`] so
//! the whole engine runs against a scripted link in tests.

use super::link::{Endpoint, GattLink};
use super::protocol::{
    self, DeskCapabilities, DpgCommand, DpgResponse, MEMORY_CLEAR_SENTINEL,
};
use crate::error::{DeskError, Result};

/// Consecutive unchanged height reads before a move counts as settled.
const MOVEMENT_STOP_AFTER_ATTEMPTS: u32 = 5;

/// Raw-unit protocol client. Heights here are tenths of a millimeter from
/// the desk's lowest position; the facade layers floor-relative mm on top.
pub struct DpgClient<L: GattLink> {
    link: L,
}

impl<L: GattLink> DpgClient<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Issue a query frame and parse the response.
    async fn query(&self, command: DpgCommand) -> Result<DpgResponse> {
        self.link
            .write(Endpoint::Dpg, &protocol::query_frame(command))
            .await?;
        let bytes = self.link.read(Endpoint::Dpg).await?;
        DpgResponse::parse(command, &bytes)
    }

    /// Issue a write frame and parse the response completing the exchange.
    async fn exchange(&self, command: DpgCommand, payload: &[u8]) -> Result<DpgResponse> {
        self.link
            .write(Endpoint::Dpg, &protocol::write_frame(command, payload))
            .await?;
        let bytes = self.link.read(Endpoint::Dpg).await?;
        DpgResponse::parse(command, &bytes)
    }

    async fn exchange_u16(&self, command: DpgCommand, value: u16) -> Result<DpgResponse> {
        self.exchange(command, &value.to_le_bytes()).await
    }

    /// Query the capability byte and unpack it.
    pub async fn capabilities(&self) -> Result<DeskCapabilities> {
        let response = self.query(DpgCommand::Capabilities).await?;
        let capabilities = DeskCapabilities::from_byte(response.status());
        log::info!("Desk capabilities: {:?}", capabilities);
        Ok(capabilities)
    }

    /// The device's stored user id bytes, raw.
    pub async fn user_id(&self) -> Result<Vec<u8>> {
        let response = self.query(DpgCommand::UserId).await?;
        Ok(response.tail().to_vec())
    }

    /// Write the user id back. The firmware refuses memory-cell writes on
    /// a connection that has not performed this echo once.
    pub async fn set_user_id(&self, user_id: &[u8]) -> Result<()> {
        let response = self.exchange(DpgCommand::UserId, user_id).await?;
        if !response.ack_ok() {
            return Err(DeskError::Protocol("user id write rejected".into()));
        }
        Ok(())
    }

    /// Calibrated floor-to-lowest-position distance, raw. A desk that was
    /// never calibrated reports undefined, which reads as 0.
    pub async fn offset(&self) -> Result<u16> {
        let response = self.query(DpgCommand::DeskOffset).await?;
        Ok(response.value_u16(DpgCommand::DeskOffset)?.unwrap_or(0))
    }

    pub async fn set_offset(&self, raw: u16) -> Result<()> {
        let response = self.exchange_u16(DpgCommand::DeskOffset, raw).await?;
        if !response.ack_ok() {
            return Err(DeskError::Protocol("offset write rejected".into()));
        }
        Ok(())
    }

    /// Stored height of a 1-based memory cell; `None` when the cell is unset.
    pub async fn memory_raw(&self, cell: u8) -> Result<Option<u16>> {
        let command = DpgCommand::memory_position(cell)?;
        let response = self.query(command).await?;
        response.value_u16(command)
    }

    pub async fn set_memory_raw(&self, cell: u8, raw: u16) -> Result<()> {
        let command = DpgCommand::memory_position(cell)?;
        // The exchange must complete, but the firmware's memory-write ack
        // is unreliable, so it is not validated.
        self.exchange_u16(command, raw).await?;
        Ok(())
    }

    /// Reset a memory cell back to unset.
    pub async fn clear_memory(&self, cell: u8) -> Result<()> {
        self.set_memory_raw(cell, MEMORY_CLEAR_SENTINEL).await
    }

    /// Fresh height reading from the sensor characteristic (not DPG).
    pub async fn height_raw(&self) -> Result<u16> {
        let bytes = self.link.read(Endpoint::HeightSpeed).await?;
        let (height, speed) = protocol::parse_height_speed(&bytes).ok_or_else(|| {
            DeskError::Protocol(format!(
                "height/speed frame too short: {} byte(s)",
                bytes.len()
            ))
        })?;
        log::debug!("Sensor height {} (speed {})", height, speed);
        Ok(height)
    }

    /// Advertised device name.
    pub async fn name(&self) -> Result<String> {
        let bytes = self.link.read(Endpoint::Name).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn set_name(&self, name: &str) -> Result<()> {
        self.link.write(Endpoint::Name, name.as_bytes()).await
    }

    /// Drive the desk to `target` raw height and block until it settles.
    ///
    /// The device never announces completion. The loop keeps re-issuing
    /// the target and watching the sensor: any observed height change
    /// resets the counter, and five consecutive unchanged reads mean the
    /// desk stopped — at the target, at a mechanical limit, or stalled.
    pub async fn move_to_raw(&self, target: u16) -> Result<()> {
        log::info!("Moving desk to raw height {}", target);
        self.start_movement().await?;

        let mut previous = self.height_raw().await?;
        let mut attempts = 0;
        while attempts < MOVEMENT_STOP_AFTER_ATTEMPTS {
            self.link
                .write(Endpoint::Input, &target.to_le_bytes())
                .await?;

            let current = self.height_raw().await?;
            if current != previous {
                attempts = 0;
            } else {
                attempts += 1;
            }
            previous = current;
        }

        self.finish_movement().await?;
        log::info!("Movement settled at raw height {}", previous);
        Ok(())
    }

    /// Arm the motor controller for direct input control.
    async fn start_movement(&self) -> Result<()> {
        self.link
            .write(Endpoint::Control, &0x00fe_u16.to_le_bytes())
            .await?;
        self.link
            .write(Endpoint::Control, &0x00ff_u16.to_le_bytes())
            .await
    }

    /// Release direct input control.
    async fn finish_movement(&self) -> Result<()> {
        self.link
            .write(Endpoint::Control, &0x00ff_u16.to_le_bytes())
            .await?;
        self.link
            .write(Endpoint::Input, &0x8001_u16.to_le_bytes())
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Scripted [`GattLink`]: queued read responses per endpoint, every
    /// write recorded. The height endpoint keeps replaying its last
    /// scripted frame once the queue runs down to one entry, mimicking a
    /// desk that has stopped moving.
    pub(crate) struct MockLink {
        reads: Mutex<HashMap<Endpoint, VecDeque<Vec<u8>>>>,
        pub writes: Mutex<Vec<(Endpoint, Vec<u8>)>>,
    }

    impl MockLink {
        pub fn new() -> Self {
            Self {
                reads: Mutex::new(HashMap::new()),
                writes: Mutex::new(Vec::new()),
            }
        }

        pub fn push_read(&self, endpoint: Endpoint, bytes: Vec<u8>) {
            self.reads
                .lock()
                .unwrap()
                .entry(endpoint)
                .or_default()
                .push_back(bytes);
        }

        pub fn push_heights(&self, heights: &[u16]) {
            for h in heights {
                let mut frame = h.to_le_bytes().to_vec();
                frame.extend_from_slice(&[0x00, 0x00]); // speed
                self.push_read(Endpoint::HeightSpeed, frame);
            }
        }

        pub fn writes_to(&self, endpoint: Endpoint) -> Vec<Vec<u8>> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|(e, _)| *e == endpoint)
                .map(|(_, b)| b.clone())
                .collect()
        }
    }

    #[async_trait]
    impl GattLink for MockLink {
        async fn read(&self, endpoint: Endpoint) -> Result<Vec<u8>> {
            let mut reads = self.reads.lock().unwrap();
            let queue = reads
                .get_mut(&endpoint)
                .filter(|q| !q.is_empty())
                .ok_or_else(|| {
                    DeskError::Protocol(format!("unscripted read from {:?}", endpoint))
                })?;
            if endpoint == Endpoint::HeightSpeed && queue.len() == 1 {
                // desk at rest keeps reporting the same height
                Ok(queue.front().cloned().unwrap())
            } else {
                Ok(queue.pop_front().unwrap())
            }
        }

        async fn write(&self, endpoint: Endpoint, bytes: &[u8]) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((endpoint, bytes.to_vec()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_capability_query() {
        let link = MockLink::new();
        link.push_read(Endpoint::Dpg, vec![0x01, 0x00, 0b1010_0011]);

        let client = DpgClient::new(link);
        let caps = client.capabilities().await.unwrap();
        assert_eq!(caps.memory_cells, 3);
        assert!(caps.ble_allowed);
        assert!(caps.has_light);

        // a query frame went out on the DPG endpoint
        assert_eq!(
            client.link().writes_to(Endpoint::Dpg),
            vec![vec![0x7f, 0x80, 0x00]]
        );
    }

    #[tokio::test]
    async fn test_undefined_offset_reads_as_zero() {
        let link = MockLink::new();
        link.push_read(Endpoint::Dpg, vec![0x01, 0x00, 0x00]);

        let client = DpgClient::new(link);
        assert_eq!(client.offset().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unset_memory_cell_is_none_not_error() {
        let link = MockLink::new();
        link.push_read(Endpoint::Dpg, vec![0x01, 0x00, 0x00]);

        let client = DpgClient::new(link);
        assert_eq!(client.memory_raw(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_defined_memory_cell() {
        let link = MockLink::new();
        link.push_read(Endpoint::Dpg, vec![0x01, 0x00, 0x01, 0x04, 0x29]);

        let client = DpgClient::new(link);
        assert_eq!(client.memory_raw(1).await.unwrap(), Some(10500));
    }

    #[tokio::test]
    async fn test_invalid_memory_cell_rejected_before_any_io() {
        let client = DpgClient::new(MockLink::new());
        assert!(matches!(
            client.memory_raw(0).await,
            Err(DeskError::InvalidMemoryCell(0))
        ));
        assert!(matches!(
            client.set_memory_raw(5, 100).await,
            Err(DeskError::InvalidMemoryCell(5))
        ));
        assert!(client.link().writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_memory_writes_sentinel() {
        let link = MockLink::new();
        link.push_read(Endpoint::Dpg, vec![0x01, 0x00, 0x01]);

        let client = DpgClient::new(link);
        client.clear_memory(3).await.unwrap();

        assert_eq!(
            client.link().writes_to(Endpoint::Dpg),
            vec![vec![0x7f, 0x8b, 0x80, 0x01, 0xff, 0xff]]
        );
    }

    #[tokio::test]
    async fn test_user_id_round_trip() {
        let link = MockLink::new();
        link.push_read(Endpoint::Dpg, vec![0x01, 0x00, 0x01, 0x11, 0x22, 0x33, 0x44]);
        link.push_read(Endpoint::Dpg, vec![0x01, 0x00, 0x01]);

        let client = DpgClient::new(link);
        let id = client.user_id().await.unwrap();
        assert_eq!(id, vec![0x11, 0x22, 0x33, 0x44]);
        client.set_user_id(&id).await.unwrap();

        assert_eq!(
            client.link().writes_to(Endpoint::Dpg),
            vec![
                vec![0x7f, 0x86, 0x00],
                vec![0x7f, 0x86, 0x80, 0x01, 0x11, 0x22, 0x33, 0x44],
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_offset_write() {
        let link = MockLink::new();
        link.push_read(Endpoint::Dpg, vec![0x00, 0x01, 0x00]);

        let client = DpgClient::new(link);
        assert!(matches!(
            client.set_offset(700).await,
            Err(DeskError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_height_raw_takes_height_half_only() {
        let link = MockLink::new();
        // height 50, speed 16
        link.push_read(Endpoint::HeightSpeed, vec![0x32, 0x00, 0x10, 0x00]);

        let client = DpgClient::new(link);
        assert_eq!(client.height_raw().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_short_sensor_frame_is_protocol_error() {
        let link = MockLink::new();
        link.push_read(Endpoint::HeightSpeed, vec![0x32, 0x00]);
        link.push_read(Endpoint::HeightSpeed, vec![0x32, 0x00]);

        let client = DpgClient::new(link);
        assert!(matches!(
            client.height_raw().await,
            Err(DeskError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_movement_counter_resets_on_observed_change() {
        let link = MockLink::new();
        // initial read 100, one stalled read, then the desk starts moving
        // and parks at 105; the mock repeats 105 until the loop gives up.
        link.push_heights(&[100, 100, 105]);

        let client = DpgClient::new(link);
        client.move_to_raw(105).await.unwrap();

        // one stalled iteration + the transition + five unchanged reads
        // after it = 7 target writes, then the release word
        let input_writes = client.link().writes_to(Endpoint::Input);
        assert_eq!(input_writes.len(), 8);
        assert!(input_writes[..7].iter().all(|w| w == &vec![0x69, 0x00]));
        assert_eq!(input_writes[7], vec![0x01, 0x80]);

        // arm then release on the control characteristic
        assert_eq!(
            client.link().writes_to(Endpoint::Control),
            vec![vec![0xfe, 0x00], vec![0xff, 0x00], vec![0xff, 0x00]]
        );
    }

    #[tokio::test]
    async fn test_movement_with_no_motion_stops_after_cap() {
        let link = MockLink::new();
        link.push_heights(&[400]);

        let client = DpgClient::new(link);
        client.move_to_raw(500).await.unwrap();

        // never moved: exactly the attempt cap of target writes
        let input_writes = client.link().writes_to(Endpoint::Input);
        assert_eq!(input_writes.len(), MOVEMENT_STOP_AFTER_ATTEMPTS as usize + 1);
    }
}
