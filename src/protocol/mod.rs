//! Wire protocol spoken over the serial link
//!
//! Commands go out as fixed-width nine-byte frames; the board answers with a
//! `%`-delimited text line.

pub mod frame;
pub mod response;

pub use frame::{Command, Frame, FRAME_LEN, MAX_PIN, MAX_VALUE};
pub use response::{Reply, BOOT_BANNER};
