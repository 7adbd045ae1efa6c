/// Session - one strand wired to one loop sequencer.
///
/// Input layers place and remove tones here; every change regenerates the
/// timeline so the loop always reflects the strand.
use crate::config::SessionConfig;
use crate::error::{HelixError, Result};
use crate::sequencer::{LoopSequencer, PlaybackSink, SlotTrack};
use crate::tone::Tone;
use log::debug;

pub struct Session<S: PlaybackSink> {
    track: SlotTrack,
    sequencer: LoopSequencer<S>,
}

impl<S: PlaybackSink> Session<S> {
    pub fn new(config: &SessionConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let track = SlotTrack::new(config.slot_count)?;
        let sequencer =
            LoopSequencer::with_config(sink, config.tempo_bpm, config.loop_length_beats)?;

        Ok(Self { track, sequencer })
    }

    pub fn track(&self) -> &SlotTrack {
        &self.track
    }

    pub fn sequencer(&self) -> &LoopSequencer<S> {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut LoopSequencer<S> {
        &mut self.sequencer
    }

    fn refresh(&mut self) -> Result<()> {
        self.sequencer.rebuild(&self.track.snapshot())
    }

    pub fn place(&mut self, tone: Tone, index: usize) -> Result<()> {
        self.track.assign(tone, index)?;
        self.refresh()
    }

    /// Places `tone` at `index`, first clearing whatever other tone sat there.
    pub fn move_tone(&mut self, tone: Tone, index: usize) -> Result<()> {
        match self.track.assign(tone, index) {
            Err(HelixError::SlotOccupied { occupant, .. }) => {
                debug!("{} displaces {} on slot {}", tone, occupant, index);
                self.track.unassign(index)?;
                self.track.assign(tone, index)?;
            }
            other => {
                other?;
            }
        }
        self.refresh()
    }

    pub fn remove(&mut self, index: usize) -> Result<Option<Tone>> {
        let previous = self.track.unassign(index)?;
        if previous.is_some() {
            self.refresh()?;
        }
        Ok(previous)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.track.clear();
        self.refresh()
    }

    /// Refreshes the timeline from the strand, then starts the loop.
    pub fn play(&mut self) -> Result<()> {
        self.refresh()?;
        self.sequencer.start()
    }

    pub fn stop(&mut self) {
        self.sequencer.stop();
    }

    pub fn preview(&mut self, tone: Tone) -> Result<()> {
        self.sequencer.trigger_one_shot(tone)
    }
}
