//! User configuration and connection settings
//!
//! The user config is a TOML file (default `~/.pinlink.toml`) describing
//! named boards ("buddies") and serial defaults:
//!
//! ```toml
//! log_level = "info"
//! default_buddy = "nano1"
//!
//! [serial]
//! use_proxy = false
//! hang_up_on_close = false
//!
//! [buddies.nano1]
//! board = "nanoatmega328"
//! tty = "/dev/ttyUSB1"
//! use_proxy = true
//! ```
//!
//! Command-line overrides win over the selected buddy, which wins over the
//! `[serial]` defaults.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Baud rate used when neither the user nor the board file sets one
pub const DEFAULT_BAUDRATE: u32 = 115200;

/// File name of the user config inside the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".pinlink.toml";

/// Explicit lookup settings passed into the board catalogue and controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory of user descriptors overriding built-in boards
    pub boards_dir: Option<PathBuf>,
    pub default_baudrate: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            boards_dir: None,
            default_baudrate: DEFAULT_BAUDRATE,
        }
    }
}

/// `[serial]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    pub use_proxy: bool,
    pub hang_up_on_close: bool,
}

/// A named board entry under `[buddies.<name>]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Buddy {
    pub board: Option<String>,
    pub tty: Option<String>,
    pub baudrate: Option<u32>,
    pub boardfile: Option<PathBuf>,
    pub use_proxy: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub log_level: Option<String>,
    pub boards_dir: Option<String>,
    pub default_buddy: Option<String>,
    pub serial: SerialSection,
    pub buddies: BTreeMap<String, Buddy>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub buddy: Option<String>,
    pub board: Option<String>,
    pub tty: Option<String>,
    pub baudrate: Option<u32>,
    pub boardfile: Option<PathBuf>,
    pub use_proxy: bool,
}

/// Everything needed to build a device controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub board: String,
    pub tty: String,
    /// Explicit baud rate; `None` defers to the board file
    pub baudrate: Option<u32>,
    pub boardfile: Option<PathBuf>,
    pub use_proxy: bool,
    pub hang_up_on_close: bool,
}

impl UserConfig {
    /// Default location of the user config
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
    }

    /// Load a config file. A missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                log::debug!("Using configuration file: {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            boards_dir: self.boards_dir.as_deref().map(expand_home),
            ..Settings::default()
        }
    }

    /// Merge overrides, buddy entry and serial defaults
    pub fn resolve(&self, overrides: &Overrides) -> Result<ConnectionSettings> {
        let buddy_name = overrides.buddy.as_ref().or(self.default_buddy.as_ref());
        let buddy = match buddy_name {
            Some(name) => {
                log::debug!("Using buddy '{}'", name);
                Some(self.buddies.get(name).ok_or_else(|| {
                    Error::config(format!(
                        "Buddy \"{}\" not described in configfile's \"buddies\" section",
                        name
                    ))
                })?)
            }
            None => None,
        };

        let board = overrides
            .board
            .clone()
            .or_else(|| buddy.and_then(|b| b.board.clone()))
            .ok_or_else(|| Error::config("Cannot determine board for desired action"))?;

        let tty = overrides
            .tty
            .clone()
            .or_else(|| buddy.and_then(|b| b.tty.clone()))
            .ok_or_else(|| Error::config("Cannot determine tty to use for desired action"))?;

        let baudrate = overrides.baudrate.or_else(|| buddy.and_then(|b| b.baudrate));
        let boardfile = overrides
            .boardfile
            .clone()
            .or_else(|| buddy.and_then(|b| b.boardfile.clone()));

        let use_proxy = overrides.use_proxy
            || buddy
                .and_then(|b| b.use_proxy)
                .unwrap_or(self.serial.use_proxy);
        let hang_up_on_close = self.serial.hang_up_on_close;

        if use_proxy && hang_up_on_close {
            return Err(Error::config(
                "use_proxy cannot be combined with hang_up_on_close; disable one of them",
            ));
        }

        Ok(ConnectionSettings {
            board,
            tty,
            baudrate,
            boardfile,
            use_proxy,
            hang_up_on_close,
        })
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
log_level = "debug"
boards_dir = "/opt/boards"
default_buddy = "nano1"

[serial]
use_proxy = false
hang_up_on_close = false

[buddies.nano1]
board = "nanoatmega328"
tty = "/dev/ttyUSB1"
use_proxy = true

[buddies.uno1]
board = "uno"
tty = "/dev/ttyACM0"
baudrate = 57600
"#;

    #[test]
    fn test_default_buddy() {
        let config = UserConfig::from_toml_str(SAMPLE).unwrap();
        let conn = config.resolve(&Overrides::default()).unwrap();
        assert_eq!(conn.board, "nanoatmega328");
        assert_eq!(conn.tty, "/dev/ttyUSB1");
        assert_eq!(conn.baudrate, None);
        assert!(conn.use_proxy);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.settings().boards_dir, Some(PathBuf::from("/opt/boards")));
    }

    #[test]
    fn test_overrides_win() {
        let config = UserConfig::from_toml_str(SAMPLE).unwrap();
        let overrides = Overrides {
            buddy: Some("uno1".into()),
            tty: Some("/dev/ttyACM3".into()),
            ..Default::default()
        };
        let conn = config.resolve(&overrides).unwrap();
        assert_eq!(conn.board, "uno");
        assert_eq!(conn.tty, "/dev/ttyACM3");
        assert_eq!(conn.baudrate, Some(57600));
        assert!(!conn.use_proxy);
    }

    #[test]
    fn test_unknown_buddy() {
        let config = UserConfig::from_toml_str(SAMPLE).unwrap();
        let overrides = Overrides {
            buddy: Some("mega1".into()),
            ..Default::default()
        };
        assert!(matches!(config.resolve(&overrides), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_board_or_tty() {
        let config = UserConfig::default();
        let only_tty = Overrides {
            tty: Some("/dev/ttyUSB0".into()),
            ..Default::default()
        };
        assert!(matches!(config.resolve(&only_tty), Err(Error::Config(_))));

        let only_board = Overrides {
            board: Some("uno".into()),
            ..Default::default()
        };
        assert!(matches!(config.resolve(&only_board), Err(Error::Config(_))));
    }

    #[test]
    fn test_proxy_conflicts_with_hang_up_on_close() {
        let config = UserConfig::from_toml_str("[serial]\nhang_up_on_close = true\n").unwrap();
        let overrides = Overrides {
            board: Some("uno".into()),
            tty: Some("/dev/ttyUSB0".into()),
            use_proxy: true,
            ..Default::default()
        };
        assert!(matches!(config.resolve(&overrides), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = UserConfig::load_or_default(Some(file.path())).unwrap();
        assert_eq!(config.buddies.len(), 2);

        assert!(UserConfig::load(Path::new("/nonexistent/pinlink.toml")).is_err());
        assert!(UserConfig::from_toml_str("buddies = 3").is_err());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/boards"), home.join("boards"));
        }
    }
}
