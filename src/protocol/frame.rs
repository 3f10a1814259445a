//! Fixed-width command frames
//!
//! Every frame is exactly nine ASCII bytes:
//!
//! ```text
//! <  C C  P P  V V V  >
//!    code pin  value
//! ```
//!
//! The pin field is zero-padded to two digits, the value field to three.

use crate::error::{Error, Result};
use std::fmt;

/// Length of an encoded frame in bytes
pub const FRAME_LEN: usize = 9;

/// Highest pin id that fits the two-digit pin field
pub const MAX_PIN: u8 = 99;

/// Highest value that fits the three-digit value field
pub const MAX_VALUE: u16 = 999;

const FRAME_START: char = '<';
const FRAME_END: char = '>';

/// Command codes understood by the board firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    DigitalWrite,
    AnalogWrite,
    DigitalRead,
    AnalogRead,
    ModeOutput,
    ModeInput,
    ModeInputPullup,
    ModeRead,
    FirmwareVersion,
    FreeMemory,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::DigitalWrite,
        Command::AnalogWrite,
        Command::DigitalRead,
        Command::AnalogRead,
        Command::ModeOutput,
        Command::ModeInput,
        Command::ModeInputPullup,
        Command::ModeRead,
        Command::FirmwareVersion,
        Command::FreeMemory,
    ];

    /// Two-letter code placed after the start marker
    pub fn code(&self) -> &'static str {
        match self {
            Command::DigitalWrite => "DW",
            Command::AnalogWrite => "AW",
            Command::DigitalRead => "DR",
            Command::AnalogRead => "AR",
            Command::ModeOutput => "MO",
            Command::ModeInput => "MI",
            Command::ModeInputPullup => "MP",
            Command::ModeRead => "MR",
            Command::FirmwareVersion => "zv",
            Command::FreeMemory => "zz",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    pin: u8,
    value: u16,
}

impl Frame {
    /// Build a frame, rejecting pins and values that do not fit their fields
    pub fn new(command: Command, pin: u8, value: u16) -> Result<Self> {
        if pin > MAX_PIN {
            return Err(Error::Frame(format!(
                "pin {} does not fit the two-digit pin field",
                pin
            )));
        }
        if value > MAX_VALUE {
            return Err(Error::Frame(format!(
                "value {} does not fit the three-digit value field",
                value
            )));
        }
        Ok(Self {
            command,
            pin,
            value,
        })
    }

    /// Frame for a device-level query (`zv`, `zz`)
    pub fn device_query(command: Command) -> Self {
        Self {
            command,
            pin: 0,
            value: 0,
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    /// Encode to the nine-byte wire representation
    pub fn encode(&self) -> String {
        format!(
            "{}{}{:02}{:03}{}",
            FRAME_START,
            self.command.code(),
            self.pin,
            self.value,
            FRAME_END
        )
    }

    /// Parse a frame previously produced by [`Frame::encode`]
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != FRAME_LEN || !raw.is_ascii() {
            return Err(Error::Frame(format!(
                "expected {} ASCII bytes, got {:?}",
                FRAME_LEN, raw
            )));
        }
        if !raw.starts_with(FRAME_START) || !raw.ends_with(FRAME_END) {
            return Err(Error::Frame(format!("missing frame markers in {:?}", raw)));
        }

        let command = Command::from_code(&raw[1..3])
            .ok_or_else(|| Error::Frame(format!("unknown command code {:?}", &raw[1..3])))?;
        let pin = parse_digits(&raw[3..5], raw)?;
        let value = parse_digits(&raw[5..8], raw)?;

        Self::new(command, pin as u8, value)
    }
}

fn parse_digits(field: &str, raw: &str) -> Result<u16> {
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Frame(format!("non-numeric field {:?} in {:?}", field, raw)));
    }
    field
        .parse()
        .map_err(|_| Error::Frame(format!("non-numeric field {:?} in {:?}", field, raw)))
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
