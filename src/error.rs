//! Error types shared by the board, protocol, serial and device layers
//!
//! Every fallible library operation returns [`Result`]. The variants mirror
//! how a caller is expected to react:
//!
//! - **`Config`**: malformed or missing board descriptor / user config. Raised
//!   before any device I/O is attempted.
//! - **`PinNotFound`** / **`LedNotFound`**: a bad pin or LED reference. The caller
//!   can correct the reference; nothing is retried internally.
//! - **`DeviceConnection`**: the serial handle could not be opened, or a write/read
//!   on it failed or timed out. Fatal for the current invocation.
//! - **`Proxy`**: the serial proxy could not be started, or its process could not
//!   be located on stop.
//! - **`Frame`**: a wire frame that cannot be encoded or parsed.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pin {0} cannot be resolved to a pin on the device")]
    PinNotFound(String),

    #[error("LED {0} cannot be resolved to a pin on the device")]
    LedNotFound(String),

    #[error("Device connection error: {0}")]
    DeviceConnection(String),

    #[error("Serial proxy error: {0}")]
    Proxy(String),

    #[error("Invalid frame: {0}")]
    Frame(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn connection(msg: impl Into<String>) -> Self {
        Error::DeviceConnection(msg.into())
    }

    pub(crate) fn proxy(msg: impl Into<String>) -> Self {
        Error::Proxy(msg.into())
    }

    /// Whether the caller can recover by fixing the reference it passed in
    pub fn is_lookup_error(&self) -> bool {
        matches!(self, Error::PinNotFound(_) | Error::LedNotFound(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(format!("malformed YAML: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("malformed TOML: {}", err))
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Error::DeviceConnection(err.to_string())
    }
}
