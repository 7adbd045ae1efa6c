/// Playback engine - runs the loop clock and emits note events
use super::{beat_duration, PlaybackSink, Timeline};
use crate::error::{HelixError, Result};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How long a one-shot preview sounds before its note off.
pub const PREVIEW_DURATION: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    BeatAdvanced(u32),
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sounding {
    end_beat: u32,
    channel: u8,
    pitch: u8,
}

/// Beat-by-beat walk through a timeline.
///
/// Each `step` reports the current beat, releases notes whose duration has
/// run out, starts notes that begin on it, then moves to the next beat.
/// Everything still sounding is released when the loop wraps.
#[derive(Debug, Clone)]
pub struct LoopCursor {
    beat: u32,
    loop_length_beats: u32,
    looping: bool,
    finished: bool,
    sounding: Vec<Sounding>,
}

impl LoopCursor {
    pub fn new(loop_length_beats: u32, looping: bool) -> Self {
        Self {
            beat: 0,
            loop_length_beats: loop_length_beats.max(1),
            looping,
            finished: false,
            sounding: Vec::new(),
        }
    }

    pub fn beat(&self) -> u32 {
        self.beat
    }

    pub fn is_at_loop_start(&self) -> bool {
        self.beat == 0
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn sounding_count(&self) -> usize {
        self.sounding.len()
    }

    /// Only takes effect cleanly at a loop boundary.
    pub fn reconfigure(&mut self, loop_length_beats: u32, looping: bool) {
        self.loop_length_beats = loop_length_beats.max(1);
        self.looping = looping;
    }

    pub fn step(&mut self, timeline: &Timeline) -> Vec<PlaybackEvent> {
        if self.finished {
            return self.release_all();
        }

        let mut events = vec![PlaybackEvent::BeatAdvanced(self.beat)];

        if self.beat == 0 {
            events.extend(self.release_all());
        } else {
            let beat = self.beat;
            self.sounding.retain(|note| {
                if note.end_beat <= beat {
                    events.push(PlaybackEvent::NoteOff {
                        channel: note.channel,
                        pitch: note.pitch,
                    });
                    false
                } else {
                    true
                }
            });
        }

        for event in timeline.starting_at(self.beat) {
            events.push(PlaybackEvent::NoteOn {
                channel: event.channel,
                pitch: event.pitch,
                velocity: event.velocity,
            });
            self.sounding.push(Sounding {
                end_beat: event.end_beat(),
                channel: event.channel,
                pitch: event.pitch,
            });
        }

        self.beat += 1;
        if self.beat >= self.loop_length_beats {
            self.beat = 0;
            if !self.looping {
                self.finished = true;
            }
        }

        events
    }

    pub fn release_all(&mut self) -> Vec<PlaybackEvent> {
        self.sounding
            .drain(..)
            .map(|note| PlaybackEvent::NoteOff {
                channel: note.channel,
                pitch: note.pitch,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct LoopSettings {
    timeline: Timeline,
    beat_duration: Duration,
    loop_length_beats: u32,
    looping: bool,
}

/// Settings only the clock thread of `generation` may pick up.
#[derive(Debug)]
struct PendingLoop {
    generation: u64,
    settings: LoopSettings,
}

fn take_pending(pending: &Mutex<Option<PendingLoop>>, generation: u64) -> Option<LoopSettings> {
    let mut pending = pending.lock().ok()?;
    match pending.as_ref() {
        Some(waiting) if waiting.generation == generation => {
            pending.take().map(|waiting| waiting.settings)
        }
        _ => None,
    }
}

/// Background clock that plays a scheduled timeline. Consumers drain the
/// emitted events with `poll_events` and forward them to real outputs.
pub struct PlaybackEngine {
    sender: Sender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    is_running: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    pending: Arc<Mutex<Option<PendingLoop>>>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender,
            receiver,
            is_running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    fn spawn_clock(&self, generation: u64) {
        self.is_running.store(true, Ordering::SeqCst);

        let current_generation = Arc::clone(&self.generation);
        let is_running = Arc::clone(&self.is_running);
        let pending = Arc::clone(&self.pending);
        let sender = self.sender.clone();

        thread::spawn(move || {
            let alive = || {
                is_running.load(Ordering::SeqCst)
                    && current_generation.load(Ordering::SeqCst) == generation
            };

            let Some(mut settings) = take_pending(&pending, generation) else {
                warn!("playback clock started without a timeline");
                if current_generation.load(Ordering::SeqCst) == generation {
                    is_running.store(false, Ordering::SeqCst);
                }
                return;
            };
            let mut cursor = LoopCursor::new(settings.loop_length_beats, settings.looping);
            let mut next_beat = Instant::now();

            while alive() {
                let now = Instant::now();

                if now >= next_beat {
                    if cursor.is_at_loop_start() {
                        if let Some(update) = take_pending(&pending, generation) {
                            debug!("swapping in timeline with {} events", update.timeline.len());
                            cursor.reconfigure(update.loop_length_beats, update.looping);
                            settings = update;
                        }
                    }

                    for event in cursor.step(&settings.timeline) {
                        let _ = sender.send(event);
                    }

                    if cursor.is_finished() {
                        break;
                    }
                    next_beat += settings.beat_duration;
                }

                thread::sleep(Duration::from_millis(1));
            }

            for event in cursor.release_all() {
                let _ = sender.send(event);
            }
            if current_generation.load(Ordering::SeqCst) == generation {
                is_running.store(false, Ordering::SeqCst);
            }
            debug!("playback clock exited");
        });
    }
}

impl PlaybackSink for PlaybackEngine {
    fn schedule(
        &mut self,
        timeline: &Timeline,
        tempo_bpm: f32,
        loop_length_beats: u32,
        looping: bool,
    ) -> Result<()> {
        let beat = beat_duration(tempo_bpm)?;
        if loop_length_beats == 0 {
            return Err(HelixError::Configuration(
                "cannot schedule an empty loop".to_string(),
            ));
        }

        let settings = LoopSettings {
            timeline: timeline.clone(),
            beat_duration: beat,
            loop_length_beats,
            looping,
        };
        let start_clock = !self.is_running();
        let generation = if start_clock {
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.generation.load(Ordering::SeqCst)
        };
        match self.pending.lock() {
            Ok(mut pending) => {
                *pending = Some(PendingLoop {
                    generation,
                    settings,
                })
            }
            Err(_) => {
                return Err(HelixError::Audio(
                    "playback state is poisoned".to_string(),
                ))
            }
        }

        if start_clock {
            info!("starting playback clock at {} bpm", tempo_bpm);
            self.spawn_clock(generation);
        }
        Ok(())
    }

    fn stop_all(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut pending) = self.pending.lock() {
            *pending = None;
        }
    }

    fn trigger_immediate(&mut self, pitch: u8, velocity: u8, channel: u8) -> Result<()> {
        self.sender
            .send(PlaybackEvent::NoteOn {
                channel,
                pitch,
                velocity,
            })
            .map_err(|e| HelixError::Audio(format!("Failed to queue preview: {}", e)))?;

        let sender = self.sender.clone();
        thread::spawn(move || {
            thread::sleep(PREVIEW_DURATION);
            let _ = sender.send(PlaybackEvent::NoteOff { channel, pitch });
        });
        Ok(())
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop_all();
    }
}
