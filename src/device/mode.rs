//! Per-pin mode state machine

use super::controller::DeviceController;
use crate::error::Result;
use crate::protocol::{Command, Frame, Reply};
use std::fmt;

/// Electrical mode of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PinMode {
    Input,
    Output,
    #[default]
    InputPullup,
}

impl PinMode {
    pub const ALL: [PinMode; 3] = [PinMode::Input, PinMode::Output, PinMode::InputPullup];

    /// Token used in board files and on the command line
    pub fn token(&self) -> &'static str {
        match self {
            PinMode::Input => "input",
            PinMode::Output => "output",
            PinMode::InputPullup => "input_pullup",
        }
    }

    /// Parse a mode token. `pwm` is accepted and means `output`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "input" => Some(PinMode::Input),
            "output" | "pwm" => Some(PinMode::Output),
            "input_pullup" => Some(PinMode::InputPullup),
            _ => None,
        }
    }

    pub fn command(&self) -> Command {
        match self {
            PinMode::Input => Command::ModeInput,
            PinMode::Output => Command::ModeOutput,
            PinMode::InputPullup => Command::ModeInputPullup,
        }
    }

    /// Value field of the mode frame
    pub fn frame_value(&self) -> u16 {
        match self {
            PinMode::Output => 1,
            PinMode::Input | PinMode::InputPullup => 0,
        }
    }

    pub fn frame(&self, pin: u8) -> Result<Frame> {
        Frame::new(self.command(), pin, self.frame_value())
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Mode handle of one pin, borrowed from its controller
pub struct Mode<'a> {
    controller: &'a mut DeviceController,
    physical_id: u8,
}

impl<'a> Mode<'a> {
    pub(crate) fn new(controller: &'a mut DeviceController, physical_id: u8) -> Self {
        Self {
            controller,
            physical_id,
        }
    }

    pub fn physical_id(&self) -> u8 {
        self.physical_id
    }

    /// Last mode requested for this pin
    pub fn tracked(&self) -> Option<PinMode> {
        self.controller.tracked_mode(self.physical_id)
    }

    pub fn output(&mut self) -> Result<Reply> {
        self.apply(PinMode::Output)
    }

    pub fn input(&mut self) -> Result<Reply> {
        self.apply(PinMode::Input)
    }

    pub fn input_pullup(&mut self) -> Result<Reply> {
        self.apply(PinMode::InputPullup)
    }

    /// Send the mode frame and record the mode once the exchange succeeded.
    ///
    /// The reply content is not validated.
    pub fn apply(&mut self, mode: PinMode) -> Result<Reply> {
        let frame = mode.frame(self.physical_id)?;
        let reply = self.controller.send(&frame)?;
        self.controller.record_mode(self.physical_id, mode);
        log::info!("Pin {} set to {}", self.physical_id, mode);
        Ok(reply)
    }

    /// Ask the board for the pin's current mode. The payload format is
    /// firmware-defined and returned as is.
    pub fn get_mode(&mut self) -> Result<Reply> {
        let frame = Frame::new(Command::ModeRead, self.physical_id, 0)?;
        self.controller.send(&frame)
    }

    /// Set the mode from a token.
    ///
    /// An unknown token is logged and yields `Ok(None)` without touching the
    /// wire.
    pub fn set_mode(&mut self, requested: &str) -> Result<Option<Reply>> {
        match PinMode::from_token(requested) {
            Some(mode) => self.apply(mode).map(Some),
            None => {
                log::warn!(
                    "Could not set mode {} for pin {}",
                    requested,
                    self.physical_id
                );
                Ok(None)
            }
        }
    }
}

impl fmt::Debug for Mode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mode")
            .field("physical_id", &self.physical_id)
            .field("tracked", &self.tracked())
            .finish()
    }
}
