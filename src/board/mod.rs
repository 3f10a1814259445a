//! Board capability model
//!
//! This module provides:
//! - Loading declarative board descriptors (YAML or TOML)
//! - Classifying pins into analog/digital, PWM, LED and bus capability sets
//! - Resolving pin aliases and LED labels to physical pin ids
//! - A catalogue of built-in boards with per-user overrides

pub mod capability;
pub mod catalog;
pub mod descriptor;

pub use capability::{BusMap, BusRole, Capabilities};
pub use catalog::{board_names, get_builtin, BoardCatalog};
pub use descriptor::{BoardDescriptor, PinRef, PinSpec};
