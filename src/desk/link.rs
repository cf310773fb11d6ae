//! GATT transport boundary.
//!
//! [`GattLink`] is the capability the protocol engine consumes: uncached
//! reads and writes against one of the desk's five fixed endpoints.
//! [`BleLink`] implements it on top of btleplug; tests script a mock
//! against the same trait.

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use super::protocol;
use crate::error::{DeskError, Result};

/// The five service/characteristic pairs a Linak desk exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// GATT generic-access device name.
    Name,
    /// Motor control (arm/release direct input).
    Control,
    /// DPG request/response channel.
    Dpg,
    /// Height/speed sensor.
    HeightSpeed,
    /// Position reference input.
    Input,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Name,
        Endpoint::Control,
        Endpoint::Dpg,
        Endpoint::HeightSpeed,
        Endpoint::Input,
    ];

    pub fn service_uuid(self) -> Uuid {
        match self {
            Endpoint::Name => protocol::NAME_SERVICE_UUID,
            Endpoint::Control => protocol::CONTROL_SERVICE_UUID,
            Endpoint::Dpg => protocol::DPG_SERVICE_UUID,
            Endpoint::HeightSpeed => protocol::HEIGHT_SPEED_SERVICE_UUID,
            Endpoint::Input => protocol::INPUT_SERVICE_UUID,
        }
    }

    pub fn characteristic_uuid(self) -> Uuid {
        match self {
            Endpoint::Name => protocol::NAME_CHARACTERISTIC_UUID,
            Endpoint::Control => protocol::CONTROL_CHARACTERISTIC_UUID,
            Endpoint::Dpg => protocol::DPG_CHARACTERISTIC_UUID,
            Endpoint::HeightSpeed => protocol::HEIGHT_SPEED_CHARACTERISTIC_UUID,
            Endpoint::Input => protocol::INPUT_CHARACTERISTIC_UUID,
        }
    }

    /// DPG exchanges and name writes want a confirmed write; control and
    /// input writes go unacknowledged, matching the reference panel.
    fn write_type(self) -> WriteType {
        match self {
            Endpoint::Control | Endpoint::Input => WriteType::WithoutResponse,
            _ => WriteType::WithResponse,
        }
    }
}

/// Abstract GATT read/write capability against a connected desk.
///
/// Every read queries the live device; implementations must not serve
/// cached values. Callers sequence exchanges themselves — the link is not
/// safe for overlapping requests.
#[async_trait]
pub trait GattLink: Send + Sync {
    async fn read(&self, endpoint: Endpoint) -> Result<Vec<u8>>;
    async fn write(&self, endpoint: Endpoint, bytes: &[u8]) -> Result<()>;
    /// Tear the session down. Must be idempotent.
    async fn disconnect(&self) -> Result<()>;
}

/// btleplug-backed [`GattLink`] owning the peripheral and its resolved
/// characteristic handles for the lifetime of the session.
pub struct BleLink {
    peripheral: Peripheral,
    characteristics: HashMap<Endpoint, Characteristic>,
}

impl BleLink {
    /// Scan for advertising Linak desks.
    pub async fn scan_for_desks(timeout_secs: u64) -> Result<Vec<Peripheral>> {
        let central = default_adapter().await?;

        log::info!("Starting BLE scan for Linak desks...");
        central.start_scan(ScanFilter::default()).await?;
        sleep(Duration::from_secs(timeout_secs)).await;

        let peripherals = central.peripherals().await?;
        log::info!("Found {} BLE devices", peripherals.len());

        // Linak desks usually advertise "Desk", "DPG" or the vendor name
        let mut desks = Vec::new();
        for peripheral in peripherals {
            if let Ok(Some(properties)) = peripheral.properties().await {
                if let Some(name) = properties.local_name {
                    let lower = name.to_lowercase();
                    if lower.contains("desk")
                        || lower.contains("dpg")
                        || lower.contains("linak")
                        || lower.contains("idasen")
                    {
                        log::info!("Found potential Linak desk: {}", name);
                        desks.push(peripheral);
                    }
                }
            }
        }

        central.stop_scan().await?;
        Ok(desks)
    }

    /// Connect to the desk at `address`, or to the first advertising desk
    /// when no address is given.
    pub async fn connect(address: Option<&str>) -> Result<Self> {
        let scan_secs = if address.is_some() { 5 } else { 10 };
        let desks = Self::scan_for_desks(scan_secs).await?;

        let peripheral = match address {
            Some(addr) => {
                let mut found = None;
                for p in desks {
                    if let Ok(Some(props)) = p.properties().await {
                        if props.address.to_string().eq_ignore_ascii_case(addr) {
                            found = Some(p);
                            break;
                        }
                    }
                }
                found.ok_or_else(|| DeskError::DeviceNotFound(addr.to_string()))?
            }
            None => {
                log::info!("No address given, connecting to first advertising desk");
                desks
                    .into_iter()
                    .next()
                    .ok_or_else(|| DeskError::DeviceNotFound("<any>".to_string()))?
            }
        };

        // Let the BLE stack settle after scanning
        sleep(Duration::from_millis(1000)).await;

        let max_retries = 3;
        let mut last_error = None;
        for attempt in 1..=max_retries {
            if attempt > 1 {
                log::info!("Connection retry attempt {} of {}", attempt, max_retries);
                sleep(Duration::from_secs(2)).await;
            }

            match Self::connect_to_peripheral(peripheral.clone()).await {
                Ok(link) => {
                    log::info!("Connected on attempt {}", attempt);
                    return Ok(link);
                }
                Err(e) => {
                    log::error!("Connection attempt {} failed: {}", attempt, e);
                    if let Ok(true) = peripheral.is_connected().await {
                        let _ = peripheral.disconnect().await;
                        sleep(Duration::from_millis(500)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(DeskError::Link(btleplug::Error::NotConnected)))
    }

    async fn connect_to_peripheral(peripheral: Peripheral) -> Result<Self> {
        let is_connected = with_timeout(Duration::from_secs(5), peripheral.is_connected()).await?;

        if !is_connected {
            log::info!("Establishing BLE connection...");
            with_timeout(Duration::from_secs(15), peripheral.connect()).await?;
        } else {
            log::info!("Peripheral already connected");
        }

        log::info!("Discovering services and characteristics...");
        with_timeout(Duration::from_secs(10), peripheral.discover_services()).await?;

        let characteristics = Self::resolve_endpoints(&peripheral)?;
        log::info!("Desk link ready ({} endpoints resolved)", characteristics.len());

        Ok(Self {
            peripheral,
            characteristics,
        })
    }

    /// Map every [`Endpoint`] to its discovered characteristic, checking
    /// the service topology first so a wrong-model device fails clearly.
    fn resolve_endpoints(peripheral: &Peripheral) -> Result<HashMap<Endpoint, Characteristic>> {
        let services = peripheral.services();
        let characteristics = peripheral.characteristics();
        log::debug!(
            "Device exposes {} services, {} characteristics",
            services.len(),
            characteristics.len()
        );

        let mut resolved = HashMap::new();
        for endpoint in Endpoint::ALL {
            if !services.iter().any(|s| s.uuid == endpoint.service_uuid()) {
                log::error!("Missing service {} for {:?}", endpoint.service_uuid(), endpoint);
                return Err(DeskError::ServiceNotFound(endpoint.service_uuid()));
            }
            let characteristic = characteristics
                .iter()
                .find(|c| c.uuid == endpoint.characteristic_uuid())
                .cloned()
                .ok_or_else(|| {
                    log::error!(
                        "Missing characteristic {} for {:?}",
                        endpoint.characteristic_uuid(),
                        endpoint
                    );
                    DeskError::CharacteristicNotFound(endpoint.characteristic_uuid())
                })?;
            resolved.insert(endpoint, characteristic);
        }
        Ok(resolved)
    }

    fn characteristic(&self, endpoint: Endpoint) -> Result<&Characteristic> {
        self.characteristics
            .get(&endpoint)
            .ok_or_else(|| DeskError::CharacteristicNotFound(endpoint.characteristic_uuid()))
    }
}

#[async_trait]
impl GattLink for BleLink {
    async fn read(&self, endpoint: Endpoint) -> Result<Vec<u8>> {
        let characteristic = self.characteristic(endpoint)?;
        let data = self.peripheral.read(characteristic).await?;
        log::debug!("{:?} read {} bytes: {:02X?}", endpoint, data.len(), data);
        Ok(data)
    }

    async fn write(&self, endpoint: Endpoint, bytes: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(endpoint)?;
        log::debug!("{:?} write: {:02X?}", endpoint, bytes);
        self.peripheral
            .write(characteristic, bytes, endpoint.write_type())
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
            log::info!("Disconnected from desk");
        }
        Ok(())
    }
}

impl Drop for BleLink {
    fn drop(&mut self) {
        // Best effort disconnect
        let _ = futures::executor::block_on(self.disconnect());
    }
}

async fn default_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or(DeskError::Link(btleplug::Error::DeviceNotFound))
}

/// Wrap a transport future in a deadline; an expired deadline surfaces as
/// a link timeout.
async fn with_timeout<T>(
    duration: Duration,
    future: impl std::future::Future<Output = btleplug::Result<T>> + Send,
) -> Result<T> {
    match timeout(duration, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DeskError::Link(btleplug::Error::TimedOut(duration))),
    }
}
