//! Pin-level control of microcontroller boards over a serial link
//!
//! A board is described by a declarative descriptor (pins, aliases and
//! capability tags). The [`DeviceController`] opens the serial line, builds
//! one pin entry per physical pin and exchanges fixed-width frames with the
//! board firmware. An optional `socat` proxy keeps the physical line open
//! between invocations so auto-reset boards are not rebooted by every
//! command.
//!
//! ```no_run
//! use pinlink::{BoardCatalog, ControllerConfig, DeviceController};
//!
//! # fn main() -> pinlink::Result<()> {
//! let board = BoardCatalog::default().descriptor_for("nanoatmega328")?;
//! let mut controller = DeviceController::new(board, ControllerConfig::new("/dev/ttyUSB0"));
//! controller.open()?;
//! controller.get_pin("D13")?.high()?;
//! println!("{:?}", controller.firmware_version()?);
//! controller.close();
//! # Ok(())
//! # }
//! ```

pub mod board;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod serial;

#[cfg(test)]
mod testing;

pub use board::{BoardCatalog, BoardDescriptor, PinRef, PinSpec};
pub use config::{ConnectionSettings, Overrides, Settings, UserConfig};
pub use device::{ControllerConfig, ControllerState, DeviceController, Mode, Pin, PinMode, PinType};
pub use error::{Error, Result};
pub use protocol::{Command, Frame, Reply};
pub use serial::SerialProxy;
