/// Session configuration, readable from JSON.
use crate::error::{HelixError, Result};
use crate::sequencer::{beat_duration, DEFAULT_LOOP_LENGTH_BEATS, DEFAULT_TEMPO_BPM};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SLOT_COUNT: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SessionConfig {
    pub slot_count: usize,
    pub tempo_bpm: f32,
    pub loop_length_beats: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slot_count: DEFAULT_SLOT_COUNT,
            tempo_bpm: DEFAULT_TEMPO_BPM,
            loop_length_beats: DEFAULT_LOOP_LENGTH_BEATS,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(HelixError::Configuration(
                "slot-count must be at least 1".to_string(),
            ));
        }
        beat_duration(self.tempo_bpm)?;
        if self.loop_length_beats == 0 {
            return Err(HelixError::Configuration(
                "loop-length-beats must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
