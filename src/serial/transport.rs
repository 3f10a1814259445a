//! Seams between the device controller and the serial handle
//!
//! The controller only ever talks to a [`Transport`]; a [`Connector`] produces
//! one for a given port configuration. The production pair is
//! [`SerialConnector`] / [`SerialConnection`](super::SerialConnection).

use super::port::{PortConfig, SerialConnection};
use crate::error::Result;

/// An open, line-oriented serial handle
pub trait Transport {
    /// Write all bytes and flush
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Read one response line without its terminator.
    ///
    /// Returns a `DeviceConnection` error when no complete line arrives
    /// before the configured timeout.
    fn read_line(&mut self) -> Result<String>;
}

/// Opens transports
pub trait Connector {
    fn connect(&mut self, config: &PortConfig) -> Result<Box<dyn Transport>>;
}

/// Connector backed by the `serialport` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn connect(&mut self, config: &PortConfig) -> Result<Box<dyn Transport>> {
        let connection = SerialConnection::open(config.clone())?;
        Ok(Box::new(connection))
    }
}
