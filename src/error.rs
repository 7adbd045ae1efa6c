/// Error kinds shared by the track, the sequencer and the outputs
use crate::tone::Tone;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelixError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Slot index {index} is out of range for a track of {len} slots")]
    OutOfRange { index: usize, len: usize },

    #[error("Slot {index} already holds {occupant}")]
    SlotOccupied { index: usize, occupant: Tone },

    #[error("Unknown tone: {0}")]
    UnknownTone(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HelixError>;
