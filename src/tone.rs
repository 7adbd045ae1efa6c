/// The fixed set of tones a user can place on the strand.
///
/// Each tone owns one sequencer channel and carries its default pitch,
/// velocity and the name of the sample an external sampler should load
/// for it.
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumCount, EnumIter, EnumString, FromRepr};

/// Velocity used for every tone, both in the loop and for previews.
pub const DEFAULT_VELOCITY: u8 = 127;

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumCount,
    EnumIter,
    EnumString,
    Eq,
    FromRepr,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Tone {
    Tone1,
    Tone2,
    Tone3,
    Tone4,
}

impl Tone {
    /// Sequencer channel, 0-based, one per tone.
    pub fn channel(&self) -> u8 {
        *self as u8
    }

    pub fn from_channel(channel: u8) -> Option<Self> {
        Self::from_repr(channel)
    }

    /// MIDI note number played for this tone.
    pub fn pitch(&self) -> u8 {
        match self {
            Tone::Tone1 => 62,
            Tone::Tone2 => 60,
            Tone::Tone3 => 58,
            Tone::Tone4 => 56,
        }
    }

    pub fn velocity(&self) -> u8 {
        DEFAULT_VELOCITY
    }

    pub fn sample_name(&self) -> &'static str {
        match self {
            Tone::Tone1 => "cheeb-bd",
            Tone::Tone2 => "cheeb-snr",
            Tone::Tone3 => "cheeb-hat",
            Tone::Tone4 => "cheeb-ch",
        }
    }

    pub fn all() -> impl Iterator<Item = Tone> {
        Self::iter()
    }
}
