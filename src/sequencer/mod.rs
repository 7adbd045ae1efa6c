/// Loop sequencing - turns a strand snapshot into a looping note timeline
/// and owns the play/stop state around it.
use crate::error::{HelixError, Result};
use crate::tone::Tone;
use log::{debug, info};
use std::time::Duration;
use strum::EnumCount;

pub mod playback;
pub mod track;

pub use track::{Slot, SlotTrack, TrackSnapshot};

pub const DEFAULT_TEMPO_BPM: f32 = 200.0;
pub const DEFAULT_LOOP_LENGTH_BEATS: u32 = 12;

/// Length of one beat at `tempo_bpm`. Tempos whose beat is not a positive
/// `Duration` are rejected.
pub fn beat_duration(tempo_bpm: f32) -> Result<Duration> {
    if !(tempo_bpm.is_finite() && tempo_bpm > 0.0) {
        return Err(HelixError::Configuration(format!(
            "tempo must be a positive number of beats per minute, got {}",
            tempo_bpm
        )));
    }

    match Duration::try_from_secs_f32(60.0 / tempo_bpm) {
        Ok(beat) if !beat.is_zero() => Ok(beat),
        _ => Err(HelixError::Configuration(format!(
            "tempo {} bpm gives a beat length that cannot be played",
            tempo_bpm
        ))),
    }
}

/// One scheduled note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEvent {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    pub start_beat: u32,
    pub duration_beats: u32,
}

impl TimelineEvent {
    /// Event for `tone` sitting on slot `index`. The note sustains to the end
    /// of the loop, and never for less than one beat.
    pub fn for_slot(tone: Tone, index: usize, loop_length_beats: u32) -> Self {
        let start_beat = u32::try_from(index).unwrap_or(u32::MAX);
        Self {
            channel: tone.channel(),
            pitch: tone.pitch(),
            velocity: tone.velocity(),
            start_beat,
            duration_beats: loop_length_beats.saturating_sub(start_beat).max(1),
        }
    }

    pub fn end_beat(&self) -> u32 {
        self.start_beat.saturating_add(self.duration_beats)
    }

    pub fn tone(&self) -> Option<Tone> {
        Tone::from_channel(self.channel)
    }
}

/// Events for one loop iteration, kept per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    channels: Vec<Vec<TimelineEvent>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            channels: vec![Vec::new(); Tone::COUNT],
        }
    }

    pub fn channel(&self, channel: u8) -> &[TimelineEvent] {
        self.channels
            .get(channel as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// All events, channel by channel.
    pub fn events(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.channels.iter().flatten()
    }

    /// Events starting on `beat`, in channel order.
    pub fn starting_at(&self, beat: u32) -> impl Iterator<Item = &TimelineEvent> {
        self.events().filter(move |event| event.start_beat == beat)
    }

    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear_channel(&mut self, channel: u8) {
        if let Some(events) = self.channels.get_mut(channel as usize) {
            events.clear();
        }
    }

    fn push(&mut self, event: TimelineEvent) {
        if let Some(events) = self.channels.get_mut(event.channel as usize) {
            events.push(event);
        }
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Whatever actually makes sound. The sequencer only hands work over; the
/// sink owns the clock.
pub trait PlaybackSink {
    /// Starts (or replaces) looped playback of `timeline`.
    fn schedule(
        &mut self,
        timeline: &Timeline,
        tempo_bpm: f32,
        loop_length_beats: u32,
        looping: bool,
    ) -> Result<()>;

    /// Halts anything in flight. Must be safe to call at any time.
    fn stop_all(&mut self);

    /// Plays a single note now, outside the loop.
    fn trigger_immediate(&mut self, pitch: u8, velocity: u8, channel: u8) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

pub struct LoopSequencer<S: PlaybackSink> {
    sink: S,
    timeline: Timeline,
    tempo_bpm: f32,
    loop_length_beats: u32,
    looping: bool,
    state: TransportState,
}

impl<S: PlaybackSink> LoopSequencer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            timeline: Timeline::new(),
            tempo_bpm: DEFAULT_TEMPO_BPM,
            loop_length_beats: DEFAULT_LOOP_LENGTH_BEATS,
            looping: true,
            state: TransportState::Stopped,
        }
    }

    pub fn with_config(sink: S, tempo_bpm: f32, loop_length_beats: u32) -> Result<Self> {
        let mut sequencer = Self::new(sink);
        sequencer.configure(tempo_bpm, loop_length_beats)?;
        Ok(sequencer)
    }

    /// Sets tempo and loop length and drops the current timeline. Invalid
    /// values leave everything as it was.
    pub fn configure(&mut self, tempo_bpm: f32, loop_length_beats: u32) -> Result<()> {
        beat_duration(tempo_bpm)?;
        if loop_length_beats == 0 {
            return Err(HelixError::Configuration(
                "loop length must be at least one beat".to_string(),
            ));
        }

        self.tempo_bpm = tempo_bpm;
        self.loop_length_beats = loop_length_beats;
        self.timeline = Timeline::new();
        debug!(
            "sequencer configured: {} bpm, {} beat loop",
            tempo_bpm, loop_length_beats
        );
        Ok(())
    }

    /// Regenerates the whole timeline from `snapshot`.
    ///
    /// While playing, the new timeline is handed to the sink, which swaps it
    /// in at its next loop boundary.
    pub fn rebuild(&mut self, snapshot: &TrackSnapshot) -> Result<()> {
        let mut timeline = Timeline::new();
        for (index, tone) in snapshot.occupied() {
            timeline.clear_channel(tone.channel());
            timeline.push(TimelineEvent::for_slot(
                tone,
                index,
                self.loop_length_beats,
            ));
        }
        self.timeline = timeline;
        debug!("timeline rebuilt with {} events", self.timeline.len());

        if self.state == TransportState::Playing {
            self.schedule()?;
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state == TransportState::Playing {
            return Ok(());
        }

        self.schedule()?;
        self.state = TransportState::Playing;
        info!("playback started at {} bpm", self.tempo_bpm);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.state == TransportState::Stopped {
            return;
        }

        self.sink.stop_all();
        self.state = TransportState::Stopped;
        info!("playback stopped");
    }

    /// Plays `tone` once, regardless of transport state.
    pub fn trigger_one_shot(&mut self, tone: Tone) -> Result<()> {
        debug!("previewing {}", tone);
        self.sink
            .trigger_immediate(tone.pitch(), tone.velocity(), tone.channel())
    }

    fn schedule(&mut self) -> Result<()> {
        self.sink.schedule(
            &self.timeline,
            self.tempo_bpm,
            self.loop_length_beats,
            self.looping,
        )
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn tempo_bpm(&self) -> f32 {
        self.tempo_bpm
    }

    pub fn loop_length_beats(&self) -> u32 {
        self.loop_length_beats
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkCall {
        Schedule {
            events: Vec<TimelineEvent>,
            tempo_bpm: f32,
            loop_length_beats: u32,
            looping: bool,
        },
        StopAll,
        Trigger {
            pitch: u8,
            velocity: u8,
            channel: u8,
        },
    }

    /// Records every call so tests can check what reached the sink.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub calls: Vec<SinkCall>,
        pub fail_schedule: bool,
    }

    impl RecordingSink {
        pub fn schedule_count(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, SinkCall::Schedule { .. }))
                .count()
        }
    }

    impl PlaybackSink for RecordingSink {
        fn schedule(
            &mut self,
            timeline: &Timeline,
            tempo_bpm: f32,
            loop_length_beats: u32,
            looping: bool,
        ) -> Result<()> {
            if self.fail_schedule {
                return Err(HelixError::Audio("no device".to_string()));
            }
            self.calls.push(SinkCall::Schedule {
                events: timeline.events().copied().collect(),
                tempo_bpm,
                loop_length_beats,
                looping,
            });
            Ok(())
        }

        fn stop_all(&mut self) {
            self.calls.push(SinkCall::StopAll);
        }

        fn trigger_immediate(&mut self, pitch: u8, velocity: u8, channel: u8) -> Result<()> {
            self.calls.push(SinkCall::Trigger {
                pitch,
                velocity,
                channel,
            });
            Ok(())
        }
    }

    fn sequencer() -> LoopSequencer<RecordingSink> {
        LoopSequencer::with_config(RecordingSink::default(), 160.0, 12).unwrap()
    }

    #[test]
    fn test_two_tone_scenario() {
        let mut track = SlotTrack::new(12).unwrap();
        track.assign(Tone::Tone1, 0).unwrap();
        track.assign(Tone::Tone3, 5).unwrap();

        let mut seq = sequencer();
        seq.rebuild(&track.snapshot()).unwrap();

        let events: Vec<TimelineEvent> = seq.timeline().events().copied().collect();
        assert_eq!(
            events,
            vec![
                TimelineEvent {
                    channel: 0,
                    pitch: 62,
                    velocity: 127,
                    start_beat: 0,
                    duration_beats: 12,
                },
                TimelineEvent {
                    channel: 2,
                    pitch: 58,
                    velocity: 127,
                    start_beat: 5,
                    duration_beats: 7,
                },
            ]
        );
        assert_eq!(seq.timeline().channel(2)[0].tone(), Some(Tone::Tone3));
        assert!(seq.timeline().channel(1).is_empty());
    }

    #[test]
    fn test_duration_shrinks_toward_loop_end() {
        for index in 0..12 {
            let event = TimelineEvent::for_slot(Tone::Tone2, index, 12);
            let expected = if index <= 10 { 12 - index as u32 } else { 1 };
            assert_eq!(event.duration_beats, expected);
            assert_eq!(event.start_beat, index as u32);
        }
    }

    #[test]
    fn test_duration_clamps_past_loop_end() {
        let event = TimelineEvent::for_slot(Tone::Tone4, 15, 12);
        assert_eq!(event.duration_beats, 1);
        assert_eq!(event.end_beat(), 16);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut track = SlotTrack::new(12).unwrap();
        track.assign(Tone::Tone2, 3).unwrap();
        track.assign(Tone::Tone4, 11).unwrap();
        let snapshot = track.snapshot();

        let mut seq = sequencer();
        seq.rebuild(&snapshot).unwrap();
        let first = seq.timeline().clone();
        seq.rebuild(&snapshot).unwrap();
        assert_eq!(seq.timeline(), &first);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_rebuild_replaces_previous_events() {
        let mut track = SlotTrack::new(12).unwrap();
        track.assign(Tone::Tone1, 2).unwrap();
        let mut seq = sequencer();
        seq.rebuild(&track.snapshot()).unwrap();

        track.assign(Tone::Tone1, 8).unwrap();
        seq.rebuild(&track.snapshot()).unwrap();

        let events = seq.timeline().channel(0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_beat, 8);
        assert_eq!(events[0].duration_beats, 4);
    }

    #[test]
    fn test_configure_validates_and_clears() {
        let mut track = SlotTrack::new(12).unwrap();
        track.assign(Tone::Tone1, 0).unwrap();
        let mut seq = sequencer();
        seq.rebuild(&track.snapshot()).unwrap();

        assert!(matches!(
            seq.configure(0.0, 12),
            Err(HelixError::Configuration(_))
        ));
        assert!(seq.configure(f32::NAN, 12).is_err());
        assert!(seq.configure(120.0, 0).is_err());
        assert_eq!(seq.tempo_bpm(), 160.0);
        assert_eq!(seq.timeline().len(), 1);

        seq.configure(90.0, 8).unwrap();
        assert_eq!(seq.tempo_bpm(), 90.0);
        assert_eq!(seq.loop_length_beats(), 8);
        assert!(seq.timeline().is_empty());
    }

    #[test]
    fn test_unplayable_tempos_rejected() {
        let mut seq = sequencer();
        for tempo in [1e-30, f32::MIN_POSITIVE, 1e38, f32::INFINITY, -120.0] {
            assert!(matches!(
                seq.configure(tempo, 12),
                Err(HelixError::Configuration(_))
            ));
        }
        assert_eq!(seq.tempo_bpm(), 160.0);

        assert_eq!(beat_duration(60.0).unwrap(), Duration::from_secs(1));
        assert_eq!(beat_duration(120.0).unwrap(), Duration::from_millis(500));
        assert!(beat_duration(0.001).is_ok());
    }

    #[test]
    fn test_start_twice_schedules_once() {
        let mut seq = sequencer();
        seq.start().unwrap();
        seq.start().unwrap();

        assert_eq!(seq.state(), TransportState::Playing);
        assert_eq!(seq.sink().schedule_count(), 1);
        assert_eq!(
            seq.sink().calls[0],
            SinkCall::Schedule {
                events: vec![],
                tempo_bpm: 160.0,
                loop_length_beats: 12,
                looping: true,
            }
        );
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let mut seq = sequencer();
        seq.stop();
        assert_eq!(seq.state(), TransportState::Stopped);
        assert!(seq.sink().calls.is_empty());

        seq.start().unwrap();
        seq.stop();
        seq.stop();
        assert!(!seq.is_playing());
        assert_eq!(
            seq.sink()
                .calls
                .iter()
                .filter(|c| **c == SinkCall::StopAll)
                .count(),
            1
        );
    }

    #[test]
    fn test_failed_schedule_stays_stopped() {
        let mut seq = sequencer();
        seq.sink_mut().fail_schedule = true;
        assert!(seq.start().is_err());
        assert_eq!(seq.state(), TransportState::Stopped);
    }

    #[test]
    fn test_rebuild_while_playing_reschedules() {
        let mut track = SlotTrack::new(12).unwrap();
        let mut seq = sequencer();
        seq.start().unwrap();

        track.assign(Tone::Tone3, 4).unwrap();
        seq.rebuild(&track.snapshot()).unwrap();

        assert!(seq.is_playing());
        assert_eq!(seq.sink().schedule_count(), 2);
        match seq.sink().calls.last() {
            Some(SinkCall::Schedule { events, .. }) => assert_eq!(events.len(), 1),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_rebuild_while_stopped_does_not_schedule() {
        let mut track = SlotTrack::new(12).unwrap();
        track.assign(Tone::Tone3, 4).unwrap();
        let mut seq = sequencer();
        seq.rebuild(&track.snapshot()).unwrap();
        assert_eq!(seq.sink().schedule_count(), 0);
    }

    #[test]
    fn test_one_shot_ignores_transport() {
        let mut seq = sequencer();
        seq.trigger_one_shot(Tone::Tone2).unwrap();

        assert_eq!(seq.state(), TransportState::Stopped);
        assert_eq!(
            seq.sink().calls,
            vec![SinkCall::Trigger {
                pitch: 60,
                velocity: 127,
                channel: 1,
            }]
        );
    }
}
