//! Control Linak DPG standing desks (IKEA Idasen and friends) over
//! Bluetooth LE.
//!
//! The entry point is [`Desk`]: connect to a desk by BLE address, read and
//! drive its height in millimeters from the floor, and manage the
//! device-stored memory positions.
//!
//! ```no_run
//! use idasen_control::Desk;
//!
//! # async fn demo() -> idasen_control::Result<()> {
//! let desk = Desk::connect(Some("EC:02:09:DF:8E:D8")).await?;
//! println!("{} is at {:.0} mm", desk.name().await?, desk.height().await?);
//! desk.set_height(1100.0).await?;
//! desk.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod desk;
pub mod error;

pub use desk::link::{BleLink, Endpoint, GattLink};
pub use desk::protocol::{DeskCapabilities, DpgCommand};
pub use desk::Desk;
pub use error::{DeskError, Result};
