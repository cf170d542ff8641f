use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::format::{MAX_DISPLAY_CHARS, MIN_DISPLAY_CHARS};

/// Four 14-segment digits, the decimal point occupying its own cell, plus the unit
pub const DEFAULT_DISPLAY_CHARS: u8 = 5;

pub const DEFAULT_BRIGHTNESS: f32 = 1.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Config could not be encoded")]
    Encode,
    #[error("Config could not be decoded")]
    Decode,
    #[error("Invalid config: {0}")]
    Invalid(&'static str),
}

/// Station settings, stored as a postcard blob.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct StationConfig {
    /// Characters the display can show, including the unit suffix
    pub display_chars: u8,
    /// Display brightness, 0.0..=1.0
    pub brightness: f32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            display_chars: DEFAULT_DISPLAY_CHARS,
            brightness: DEFAULT_BRIGHTNESS,
        }
    }
}

impl StationConfig {
    pub fn with_display_chars(mut self, display_chars: u8) -> Self {
        self.display_chars = display_chars;
        self
    }

    pub fn with_brightness(mut self, brightness: f32) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn display_chars(&self) -> usize {
        self.display_chars as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_DISPLAY_CHARS..=MAX_DISPLAY_CHARS).contains(&self.display_chars()) {
            return Err(ConfigError::Invalid("display_chars must be between 2 and 16"));
        }
        if !(0.0..=1.0).contains(&self.brightness) {
            return Err(ConfigError::Invalid("brightness must be between 0.0 and 1.0"));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        self.validate()?;
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }
}
