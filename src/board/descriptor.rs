//! Board descriptor loading and pin resolution
//!
//! A descriptor lists the physical pins of one board, the aliases printed on
//! the silkscreen (`D13`, `A0`) and the capability tags of each pin:
//!
//! ```yaml
//! baudrate: 115200
//! pins:
//!   - physical_id: 13
//!     alias: D13
//!     extra: [led, sck]
//!   - physical_id: 14
//!     alias: A0
//!     extra: [analog]
//! ```
//!
//! TOML descriptors with the same shape are accepted as well.

use super::capability::{BusMap, Capabilities};
use crate::device::PinMode;
use crate::error::{Error, Result};
use crate::protocol::MAX_PIN;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// One physical pin as described by the board file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinSpec {
    pub physical_id: u8,
    pub alias: Option<String>,
    /// Capability tags (`analog`, `pwm`, `led1`, `sda`, ...)
    pub extra: Vec<String>,
    /// Mode the pin should start in, if the board file sets one
    pub pin_mode: Option<PinMode>,
}

impl PinSpec {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.extra.iter().any(|t| t == tag)
    }

    pub fn is_analog(&self) -> bool {
        self.has_tag("analog")
    }
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    pins: Vec<RawPin>,
    #[serde(default)]
    baudrate: Option<u32>,
    #[serde(default)]
    firmware: Option<RawFirmware>,
}

#[derive(Debug, Deserialize)]
struct RawPin {
    physical_id: i64,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    extra: Vec<String>,
    #[serde(default)]
    pin_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFirmware {
    #[serde(default)]
    extra_libs: Vec<String>,
}

/// Any of the ways a caller may name a pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinRef {
    Id(i64),
    Name(String),
}

impl From<i64> for PinRef {
    fn from(id: i64) -> Self {
        PinRef::Id(id)
    }
}

impl From<i32> for PinRef {
    fn from(id: i32) -> Self {
        PinRef::Id(id.into())
    }
}

impl From<u8> for PinRef {
    fn from(id: u8) -> Self {
        PinRef::Id(id.into())
    }
}

impl From<&str> for PinRef {
    fn from(name: &str) -> Self {
        PinRef::Name(name.to_string())
    }
}

impl From<String> for PinRef {
    fn from(name: String) -> Self {
        PinRef::Name(name)
    }
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinRef::Id(id) => write!(f, "{}", id),
            PinRef::Name(name) => f.write_str(name),
        }
    }
}

/// Parsed board descriptor with its derived capability sets
#[derive(Debug, Clone)]
pub struct BoardDescriptor {
    source: Option<PathBuf>,
    pins: Vec<PinSpec>,
    baudrate: Option<u32>,
    extra_libs: Vec<String>,
    capabilities: Capabilities,
}

impl BoardDescriptor {
    /// Load a descriptor from disk. The format is picked by extension:
    /// `.toml` is parsed as TOML, everything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::config(format!(
                "Cannot open boardfile: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read boardfile {}: {}", path.display(), e))
        })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let mut descriptor = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
        .map_err(|e| match e {
            Error::Config(msg) => Error::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;

        descriptor.source = Some(path.to_path_buf());
        log::debug!(
            "Loaded boardfile {} ({} pins)",
            path.display(),
            descriptor.num_physical_pins()
        );
        Ok(descriptor)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: RawDescriptor = serde_yaml::from_str(content)?;
        Self::from_raw(raw)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawDescriptor = toml::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawDescriptor) -> Result<Self> {
        let mut pins = Vec::with_capacity(raw.pins.len());
        let mut seen = HashSet::new();

        for entry in raw.pins {
            let physical_id = u8::try_from(entry.physical_id)
                .ok()
                .filter(|id| *id <= MAX_PIN)
                .ok_or_else(|| {
                    Error::config(format!(
                        "physical_id {} is outside 0..={}",
                        entry.physical_id, MAX_PIN
                    ))
                })?;

            if !seen.insert(physical_id) {
                return Err(Error::config(format!(
                    "physical_id {} is declared more than once",
                    physical_id
                )));
            }

            let pin_mode = match entry.pin_mode.as_deref() {
                None => None,
                Some(token) => Some(PinMode::from_token(token).ok_or_else(|| {
                    Error::config(format!(
                        "unknown pin_mode {:?} for pin {}",
                        token, physical_id
                    ))
                })?),
            };

            pins.push(PinSpec {
                physical_id,
                alias: entry.alias,
                extra: entry.extra,
                pin_mode,
            });
        }

        pins.sort_by_key(|p| p.physical_id);
        let capabilities = Capabilities::classify(&pins);

        Ok(Self {
            source: None,
            pins,
            baudrate: raw.baudrate,
            extra_libs: raw.firmware.unwrap_or_default().extra_libs,
            capabilities,
        })
    }

    /// File this descriptor was loaded from (`None` for built-ins)
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Pin specs ordered by physical id
    pub fn pins(&self) -> &[PinSpec] {
        &self.pins
    }

    /// Baud rate declared by the board file
    pub fn baudrate(&self) -> Option<u32> {
        self.baudrate
    }

    /// Baud rate declared by the board file, or `default` when absent
    pub fn baudrate_or(&self, default: u32) -> u32 {
        self.baudrate.unwrap_or(default)
    }

    pub fn extra_libs(&self) -> &[String] {
        &self.extra_libs
    }

    pub fn analog_pins(&self) -> &[u8] {
        &self.capabilities.analog_pins
    }

    pub fn digital_pins(&self) -> &[u8] {
        &self.capabilities.digital_pins
    }

    pub fn pwm_pins(&self) -> &[u8] {
        &self.capabilities.pwm_pins
    }

    pub fn leds(&self) -> &BTreeMap<String, u8> {
        &self.capabilities.leds
    }

    pub fn i2c_interfaces(&self) -> &BusMap {
        &self.capabilities.i2c_interfaces
    }

    pub fn spi_interfaces(&self) -> &BusMap {
        &self.capabilities.spi_interfaces
    }

    pub fn physical_pin_ids(&self) -> Vec<u8> {
        self.pins.iter().map(|p| p.physical_id).collect()
    }

    pub fn num_analog_pins(&self) -> usize {
        self.capabilities.analog_pins.len()
    }

    pub fn num_digital_pins(&self) -> usize {
        self.capabilities.digital_pins.len()
    }

    pub fn num_pwm_pins(&self) -> usize {
        self.capabilities.pwm_pins.len()
    }

    pub fn num_physical_pins(&self) -> usize {
        self.pins.len()
    }

    /// Resolve a pin id, numeric string or alias to a physical pin id.
    ///
    /// Numeric input is checked against the known physical ids; anything else
    /// must match an alias exactly (case-sensitive).
    pub fn normalize_pin_id(&self, pin: impl Into<PinRef>) -> Result<u8> {
        let pin = pin.into();
        let numeric = match &pin {
            PinRef::Id(id) => Some(*id),
            PinRef::Name(name) => name.trim().parse::<i64>().ok(),
        };

        let resolved = match numeric {
            Some(id) => u8::try_from(id)
                .ok()
                .filter(|id| self.get_pin_spec(*id).is_some()),
            None => self
                .pins
                .iter()
                .find(|p| matches!((&p.alias, &pin), (Some(a), PinRef::Name(n)) if a == n))
                .map(|p| p.physical_id),
        };

        resolved.ok_or_else(|| Error::PinNotFound(pin.to_string()))
    }

    /// Resolve an LED label (`"1"` -> `led1`, `""` -> `led`) to its pin id
    pub fn led_to_pin(&self, label: &str) -> Result<u8> {
        let key = format!("led{}", label);
        self.capabilities
            .leds
            .get(&key)
            .copied()
            .ok_or(Error::LedNotFound(key))
    }

    /// Non-failing lookup of a pin spec
    pub fn get_pin_spec(&self, physical_id: u8) -> Option<&PinSpec> {
        self.pins.iter().find(|p| p.physical_id == physical_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Nano-style layout: 2..13 digital, 14..21 analog
    pub(crate) const NANO_YAML: &str = r#"
baudrate: 115200
pins:
  - { physical_id: 2, alias: D2 }
  - { physical_id: 3, alias: D3, extra: [pwm, led1] }
  - { physical_id: 4, alias: D4 }
  - { physical_id: 5, alias: D5, extra: [pwm, led2] }
  - { physical_id: 6, alias: D6, extra: [pwm] }
  - { physical_id: 7, alias: D7 }
  - { physical_id: 8, alias: D8 }
  - { physical_id: 9, alias: D9, extra: [pwm] }
  - { physical_id: 10, alias: D10, extra: [pwm, ss] }
  - { physical_id: 11, alias: D11, extra: [pwm, mosi] }
  - { physical_id: 12, alias: D12, extra: [miso] }
  - { physical_id: 13, alias: D13, extra: [led, sck], pin_mode: output }
  - { physical_id: 14, alias: A0, extra: [analog] }
  - { physical_id: 15, alias: A1, extra: [analog] }
  - { physical_id: 16, alias: A2, extra: [analog] }
  - { physical_id: 17, alias: A3, extra: [analog] }
  - { physical_id: 18, alias: A4, extra: [analog, sda] }
  - { physical_id: 19, alias: A5, extra: [analog, scl] }
  - { physical_id: 20, alias: A6, extra: [analog] }
  - { physical_id: 21, alias: A7, extra: [analog] }
"#;

    pub(crate) fn nano() -> BoardDescriptor {
        BoardDescriptor::from_yaml_str(NANO_YAML).unwrap()
    }

    #[test]
    fn test_capability_sets() {
        let board = nano();
        assert_eq!(board.digital_pins(), &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]);
        assert_eq!(board.analog_pins(), &[14, 15, 16, 17, 18, 19, 20, 21]);
        assert_eq!(board.pwm_pins(), &[3, 5, 6, 9, 10, 11]);
        assert_eq!(board.leds().get("led1"), Some(&3));
        assert_eq!(board.leds().get("led"), Some(&13));
        assert_eq!(
            board.num_analog_pins() + board.num_digital_pins(),
            board.num_physical_pins()
        );
    }

    #[test]
    fn test_normalize_pin_id_success() {
        let board = nano();
        assert_eq!(board.normalize_pin_id(13).unwrap(), 13);
        assert_eq!(board.normalize_pin_id("13").unwrap(), 13);
        assert_eq!(board.normalize_pin_id("D13").unwrap(), 13);
        assert_eq!(board.normalize_pin_id("A0").unwrap(), 14);
    }

    #[test]
    fn test_normalize_pin_id_failure() {
        let board = nano();
        for bad in [PinRef::Id(1000), PinRef::Id(-99), PinRef::Id(0), PinRef::Id(2000)] {
            assert!(matches!(board.normalize_pin_id(bad), Err(Error::PinNotFound(_))));
        }
        for bad in ["D23", "AF", "a0", "d13", "", "-1"] {
            assert!(matches!(board.normalize_pin_id(bad), Err(Error::PinNotFound(_))));
        }
    }

    #[test]
    fn test_led_to_pin() {
        let board = nano();
        assert_eq!(board.led_to_pin("1").unwrap(), 3);
        assert_eq!(board.led_to_pin("2").unwrap(), 5);
        assert_eq!(board.led_to_pin("").unwrap(), 13);
        assert!(matches!(board.led_to_pin("13"), Err(Error::LedNotFound(_))));
    }

    #[test]
    fn test_get_pin_spec() {
        let board = nano();
        let spec = board.get_pin_spec(13).unwrap();
        assert_eq!(spec.alias.as_deref(), Some("D13"));
        assert_eq!(spec.pin_mode, Some(PinMode::Output));
        assert!(board.get_pin_spec(42).is_none());
    }

    #[test]
    fn test_pins_sorted_and_baudrate_fallback() {
        let board = BoardDescriptor::from_yaml_str(
            "pins:\n  - { physical_id: 7 }\n  - { physical_id: 2, extra: [analog] }\n",
        )
        .unwrap();
        assert_eq!(board.physical_pin_ids(), vec![2, 7]);
        assert_eq!(board.baudrate(), None);
        assert_eq!(board.baudrate_or(115200), 115200);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_modes() {
        let dup = "pins:\n  - { physical_id: 2 }\n  - { physical_id: 2 }\n";
        assert!(matches!(BoardDescriptor::from_yaml_str(dup), Err(Error::Config(_))));

        let big = "pins:\n  - { physical_id: 100 }\n";
        assert!(matches!(BoardDescriptor::from_yaml_str(big), Err(Error::Config(_))));

        let mode = "pins:\n  - { physical_id: 2, pin_mode: sideways }\n";
        assert!(matches!(BoardDescriptor::from_yaml_str(mode), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(NANO_YAML.as_bytes()).unwrap();

        let board = BoardDescriptor::load(file.path()).unwrap();
        assert_eq!(board.num_physical_pins(), 20);
        assert_eq!(board.source(), Some(file.path()));
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            b"baudrate = 9600\n\n[[pins]]\nphysical_id = 3\nalias = \"D3\"\nextra = [\"pwm\"]\n\n[[pins]]\nphysical_id = 14\nextra = [\"analog\"]\n\n[firmware]\nextra_libs = [\"#include <Servo.h>\"]\n",
        )
        .unwrap();

        let board = BoardDescriptor::load(file.path()).unwrap();
        assert_eq!(board.baudrate(), Some(9600));
        assert_eq!(board.pwm_pins(), &[3]);
        assert_eq!(board.analog_pins(), &[14]);
        assert_eq!(board.extra_libs().len(), 1);
    }

    #[test]
    fn test_load_failures() {
        let missing = BoardDescriptor::load(Path::new("/nonexistent/board.yml"));
        assert!(matches!(missing, Err(Error::Config(_))));

        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(b"pins: [ this is not a pin list").unwrap();
        assert!(matches!(BoardDescriptor::load(file.path()), Err(Error::Config(_))));
    }
}
