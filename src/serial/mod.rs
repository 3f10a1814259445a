//! Serial link to the board
//!
//! This module provides functionality for:
//! - Listing available serial ports
//! - Opening a blocking, line-oriented connection to a board
//! - Controlling the hang-up-on-close line flag
//! - Running a `socat` proxy so repeated invocations do not reset the board

pub mod port;
pub mod proxy;
pub mod transport;
pub mod tty;

pub use port::{PortConfig, SerialConnection, DEFAULT_TIMEOUT};
pub use proxy::{ProxyBackend, SerialProxy, SocatBackend};
pub use transport::{Connector, SerialConnector, Transport};
