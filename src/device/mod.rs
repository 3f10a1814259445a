//! Runtime device model
//!
//! A [`DeviceController`] owns the serial link and one [`PinState`] per
//! physical pin. [`Pin`] and [`Mode`] handles borrow the controller and send
//! frames through it.

pub mod controller;
pub mod mode;
pub mod pin;

pub use controller::{ControllerConfig, ControllerState, DeviceController};
pub use mode::{Mode, PinMode};
pub use pin::{Pin, PinRegistry, PinState, PinType, MAX_PWM};
