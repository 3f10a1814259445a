//! Capability classification for board pins
//!
//! Every pin carries a list of free-form capability tags (`analog`, `pwm`,
//! `led1`, `sda`, `mosi1`, ...). Classification turns those tags into the
//! derived sets a caller actually queries. It runs once when a descriptor is
//! loaded; the result never changes afterwards.

use super::descriptor::PinSpec;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

static LED_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^led\d*$").unwrap());
static I2C_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(sda|scl)(\d*)$").unwrap());
static SPI_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(ss|mosi|miso|sck)(\d*)$").unwrap());

/// Bus index used when a bus tag carries no numeric suffix
pub const DEFAULT_BUS: &str = "0";

/// Role a pin plays on an I2C or SPI bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BusRole {
    Sda,
    Scl,
    Ss,
    Mosi,
    Miso,
    Sck,
}

impl BusRole {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "sda" => Some(BusRole::Sda),
            "scl" => Some(BusRole::Scl),
            "ss" => Some(BusRole::Ss),
            "mosi" => Some(BusRole::Mosi),
            "miso" => Some(BusRole::Miso),
            "sck" => Some(BusRole::Sck),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BusRole::Sda => "sda",
            BusRole::Scl => "scl",
            BusRole::Ss => "ss",
            BusRole::Mosi => "mosi",
            BusRole::Miso => "miso",
            BusRole::Sck => "sck",
        }
    }
}

impl fmt::Display for BusRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bus index -> (role -> physical pin id)
pub type BusMap = BTreeMap<String, BTreeMap<BusRole, u8>>;

/// Derived capability sets of a board
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub analog_pins: Vec<u8>,
    pub digital_pins: Vec<u8>,
    pub pwm_pins: Vec<u8>,
    /// LED label (`led1`, `led`) -> physical pin id
    pub leds: BTreeMap<String, u8>,
    pub i2c_interfaces: BusMap,
    pub spi_interfaces: BusMap,
}

impl Capabilities {
    /// Classify pins. `pins` must already be sorted by physical id.
    pub fn classify(pins: &[PinSpec]) -> Self {
        let mut caps = Capabilities::default();

        for pin in pins {
            let id = pin.physical_id;

            if pin.has_tag("analog") {
                caps.analog_pins.push(id);
            } else {
                caps.digital_pins.push(id);
            }

            if pin.has_tag("pwm") {
                caps.pwm_pins.push(id);
            }

            for tag in &pin.extra {
                if LED_TAG.is_match(tag) {
                    caps.leds.insert(tag.clone(), id);
                } else if let Some((role, bus)) = bus_member(&I2C_TAG, tag) {
                    caps.i2c_interfaces.entry(bus).or_default().insert(role, id);
                } else if let Some((role, bus)) = bus_member(&SPI_TAG, tag) {
                    caps.spi_interfaces.entry(bus).or_default().insert(role, id);
                }
            }
        }

        caps
    }
}

/// Split a bus tag into its role and bus index (`"mosi1"` -> `(Mosi, "1")`)
fn bus_member(pattern: &Regex, tag: &str) -> Option<(BusRole, String)> {
    let captures = pattern.captures(tag)?;
    let role = BusRole::from_prefix(captures.get(1)?.as_str())?;
    let bus = match captures.get(2).map(|m| m.as_str()) {
        Some(digits) if !digits.is_empty() => digits.to_string(),
        _ => DEFAULT_BUS.to_string(),
    };
    Some((role, bus))
}
