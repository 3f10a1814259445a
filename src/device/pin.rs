//! Runtime pins and the registry that tracks them

use super::controller::DeviceController;
use super::mode::{Mode, PinMode};
use crate::board::BoardDescriptor;
use crate::error::{Error, Result};
use crate::protocol::{Command, Frame, Reply};
use std::collections::BTreeMap;
use std::fmt;

/// Highest duty cycle accepted by [`Pin::pwm`]
pub const MAX_PWM: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinType {
    Analog,
    Digital,
}

impl PinType {
    pub fn read_command(&self) -> Command {
        match self {
            PinType::Analog => Command::AnalogRead,
            PinType::Digital => Command::DigitalRead,
        }
    }
}

impl fmt::Display for PinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinType::Analog => write!(f, "analog"),
            PinType::Digital => write!(f, "digital"),
        }
    }
}

/// What the controller remembers about one physical pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinState {
    pub physical_id: u8,
    pub alias: Option<String>,
    pub pin_type: PinType,
    /// Last mode requested through a successful exchange
    pub mode: PinMode,
}

/// One [`PinState`] per physical pin of the board
#[derive(Debug, Clone, Default)]
pub struct PinRegistry {
    pins: BTreeMap<u8, PinState>,
}

impl PinRegistry {
    /// Build the registry from a descriptor; pins start in their configured
    /// mode, or `input_pullup` when none is set
    pub fn from_descriptor(descriptor: &BoardDescriptor) -> Self {
        let pins = descriptor
            .pins()
            .iter()
            .map(|spec| {
                let pin_type = if spec.is_analog() {
                    PinType::Analog
                } else {
                    PinType::Digital
                };
                let state = PinState {
                    physical_id: spec.physical_id,
                    alias: spec.alias.clone(),
                    pin_type,
                    mode: spec.pin_mode.unwrap_or_default(),
                };
                (spec.physical_id, state)
            })
            .collect();
        Self { pins }
    }

    pub fn get(&self, physical_id: u8) -> Option<&PinState> {
        self.pins.get(&physical_id)
    }

    pub(crate) fn set_mode(&mut self, physical_id: u8, mode: PinMode) {
        if let Some(state) = self.pins.get_mut(&physical_id) {
            state.mode = mode;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PinState> {
        self.pins.values()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn clear(&mut self) {
        self.pins.clear();
    }
}

/// A pin handed out by [`DeviceController::get_pin`]. It borrows the
/// controller, so the controller outlives every pin it issues.
pub struct Pin<'a> {
    controller: &'a mut DeviceController,
    physical_id: u8,
    pin_type: PinType,
}

impl<'a> Pin<'a> {
    pub(crate) fn new(
        controller: &'a mut DeviceController,
        physical_id: u8,
        pin_type: PinType,
    ) -> Self {
        Self {
            controller,
            physical_id,
            pin_type,
        }
    }

    pub fn physical_id(&self) -> u8 {
        self.physical_id
    }

    pub fn pin_type(&self) -> PinType {
        self.pin_type
    }

    pub fn alias(&self) -> Option<&str> {
        self.controller
            .pins()
            .get(self.physical_id)
            .and_then(|state| state.alias.as_deref())
    }

    pub fn tracked_mode(&self) -> Option<PinMode> {
        self.controller.tracked_mode(self.physical_id)
    }

    pub fn mode(&mut self) -> Mode<'_> {
        Mode::new(self.controller, self.physical_id)
    }

    pub fn set_mode(&mut self, requested: &str) -> Result<Option<Reply>> {
        self.mode().set_mode(requested)
    }

    pub fn high(&mut self) -> Result<Reply> {
        self.write(Command::DigitalWrite, 1)
    }

    pub fn low(&mut self) -> Result<Reply> {
        self.write(Command::DigitalWrite, 0)
    }

    /// Digital or analog read, depending on the pin type
    pub fn read(&mut self) -> Result<Reply> {
        self.write(self.pin_type.read_command(), 0)
    }

    /// Write a PWM duty cycle (0..=255)
    pub fn pwm(&mut self, value: u8) -> Result<Reply> {
        self.write(Command::AnalogWrite, value.into())
    }

    /// Like [`Pin::pwm`] but for values coming from untyped input
    pub fn pwm_checked(&mut self, value: i64) -> Result<Reply> {
        let duty = u8::try_from(value).map_err(|_| {
            Error::Frame(format!(
                "PWM value {} for pin {} is outside 0..={}",
                value, self.physical_id, MAX_PWM
            ))
        })?;
        self.pwm(duty)
    }

    fn write(&mut self, command: Command, value: u16) -> Result<Reply> {
        let frame = Frame::new(command, self.physical_id, value)?;
        self.controller.send(&frame)
    }
}

impl fmt::Debug for Pin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pin")
            .field("physical_id", &self.physical_id)
            .field("pin_type", &self.pin_type)
            .field("mode", &self.tracked_mode())
            .finish()
    }
}
