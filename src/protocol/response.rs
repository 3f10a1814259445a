//! Response lines sent back by the board firmware
//!
//! Responses are newline-terminated text with `%`-separated fields, e.g.
//! `0%13%1` (board id, pin, value) or `0%version%0.7.0`. Only the last field
//! carries the value the caller asked for.

/// Line printed by the firmware right after the serial line is opened,
/// before it is ready to process commands
pub const BOOT_BANNER: &str = "Boot complete";

/// Separator between response fields
pub const FIELD_SEPARATOR: char = '%';

/// Outcome of sending a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Frame was written; the controller does not wait for responses
    Sent,
    /// Response line read back from the board
    Line(String),
}

impl Reply {
    /// The raw response line, if one was read
    pub fn line(&self) -> Option<&str> {
        match self {
            Reply::Sent => None,
            Reply::Line(line) => Some(line),
        }
    }

    /// All `%`-separated fields of the response
    pub fn fields(&self) -> Vec<&str> {
        self.line()
            .map(|line| line.split(FIELD_SEPARATOR).collect())
            .unwrap_or_default()
    }

    /// The last `%`-separated field
    pub fn payload(&self) -> Option<&str> {
        self.line()
            .and_then(|line| line.rsplit(FIELD_SEPARATOR).next())
    }

    pub fn is_banner(&self) -> bool {
        self.line() == Some(BOOT_BANNER)
    }
}
