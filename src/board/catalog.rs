//! Built-in board descriptors and descriptor lookup
//!
//! Built-in boards are compiled into the binary. A directory of user
//! descriptors, when configured, takes precedence over them so a board can be
//! overridden without rebuilding.

use super::descriptor::BoardDescriptor;
use crate::config::Settings;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A descriptor shipped with the crate
#[derive(Debug)]
pub struct BuiltinBoard {
    pub id: &'static str,
    pub name: &'static str,
    pub source: &'static str,
}

static UNO: BuiltinBoard = BuiltinBoard {
    id: "uno",
    name: "Arduino Uno (ATmega328P)",
    source: include_str!("../../boards/uno.yml"),
};

static NANO_ATMEGA328: BuiltinBoard = BuiltinBoard {
    id: "nanoatmega328",
    name: "Arduino Nano (ATmega328P)",
    source: include_str!("../../boards/nanoatmega328.yml"),
};

/// Registry of built-in boards, including common alternative names
pub static BUILTIN_BOARDS: Lazy<HashMap<&'static str, &'static BuiltinBoard>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("uno", &UNO);
    m.insert("nanoatmega328", &NANO_ATMEGA328);
    m.insert("nano", &NANO_ATMEGA328);
    m
});

/// Get a built-in board by name
pub fn get_builtin(name: &str) -> Option<&'static BuiltinBoard> {
    BUILTIN_BOARDS.get(name.to_lowercase().as_str()).copied()
}

/// Canonical built-in board ids (deduplicated)
pub fn board_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTIN_BOARDS.values().map(|b| b.id).collect();
    names.sort();
    names.dedup();
    names
}

const DESCRIPTOR_EXTENSIONS: &[&str] = &["yml", "yaml", "toml"];

/// Resolves board ids to descriptors
#[derive(Debug, Clone, Default)]
pub struct BoardCatalog {
    boards_dir: Option<PathBuf>,
}

impl BoardCatalog {
    pub fn new(boards_dir: Option<PathBuf>) -> Self {
        Self { boards_dir }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.boards_dir.clone())
    }

    /// Path of a user descriptor overriding `board`, if one exists
    pub fn override_path(&self, board: &str) -> Option<PathBuf> {
        let dir = self.boards_dir.as_deref()?;
        DESCRIPTOR_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", board, ext)))
            .find(|path| path.is_file())
    }

    /// Load the descriptor for `board`: user override first, then built-in
    pub fn descriptor_for(&self, board: &str) -> Result<BoardDescriptor> {
        if let Some(path) = self.override_path(board) {
            log::debug!("Using boardfile override {}", path.display());
            return BoardDescriptor::load(&path);
        }

        let builtin = get_builtin(board).ok_or_else(|| {
            Error::config(format!(
                "Board ({}) not in supported boards list {:?}",
                board,
                board_names()
            ))
        })?;
        log::debug!("Using built-in boardfile for {}", builtin.id);
        BoardDescriptor::from_yaml_str(builtin.source)
    }

    /// Load an explicit boardfile, or fall back to the board lookup
    pub fn resolve(&self, board: &str, boardfile: Option<&Path>) -> Result<BoardDescriptor> {
        match boardfile {
            Some(path) => BoardDescriptor::load(path),
            None => self.descriptor_for(board),
        }
    }
}
