/// Helix - a strand of slots that plays as a loop
///
/// This library provides the core of the strand toy:
/// - A fixed-length strand where each tone can sit on one slot
/// - A loop sequencer that turns the strand into a note timeline
/// - A playback engine that runs the loop clock
/// - Audio output for testing, MIDI output for production use

pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod sequencer;
pub mod session;
pub mod tone;

// Re-export commonly used types
pub use audio::AudioOutput;
pub use config::SessionConfig;
pub use error::{HelixError, Result};
pub use midi::{midi_note_name, MidiOutputDevice};
pub use sequencer::playback::{LoopCursor, PlaybackEngine, PlaybackEvent};
pub use sequencer::{
    LoopSequencer, PlaybackSink, Slot, SlotTrack, Timeline, TimelineEvent, TrackSnapshot,
    TransportState,
};
pub use session::Session;
pub use tone::Tone;
