/// Audio output using cpal - one sine voice per tone channel
use crate::sequencer::playback::PlaybackEvent;
use crate::tone::Tone;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use std::sync::{Arc, Mutex};
use strum::EnumCount;

const VOICE_GAIN: f32 = 0.2;

#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    frequency: Option<f32>,
    phase: f32,
}

impl Voice {
    fn next_sample(&mut self, sample_rate: f32) -> f32 {
        match self.frequency {
            Some(frequency) => {
                let sample = (self.phase * 2.0 * std::f32::consts::PI).sin();
                self.phase += frequency / sample_rate;
                if self.phase >= 1.0 {
                    self.phase -= 1.0;
                }
                sample
            }
            None => {
                self.phase = 0.0;
                0.0
            }
        }
    }
}

pub struct AudioOutput {
    stream: Option<cpal::Stream>,
    voices: Arc<Mutex<Vec<Voice>>>,
}

impl AudioOutput {
    pub fn new() -> Option<Self> {
        let voices = Arc::new(Mutex::new(vec![Voice::default(); Tone::COUNT]));
        let stream = Self::setup_audio_stream(Arc::clone(&voices))?;

        Some(Self {
            stream: Some(stream),
            voices,
        })
    }

    /// Output that accepts notes but never opens a device.
    pub fn silent() -> Self {
        Self {
            stream: None,
            voices: Arc::new(Mutex::new(vec![Voice::default(); Tone::COUNT])),
        }
    }

    pub fn has_device(&self) -> bool {
        self.stream.is_some()
    }

    fn setup_audio_stream(voices: Arc<Mutex<Vec<Voice>>>) -> Option<cpal::Stream> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut voices) = voices.lock() else {
                        data.fill(0.0);
                        return;
                    };

                    for frame in data.chunks_mut(channels.max(1)) {
                        let mixed = voices
                            .iter_mut()
                            .map(|voice| voice.next_sample(sample_rate))
                            .sum::<f32>()
                            * VOICE_GAIN;
                        frame.fill(mixed);
                    }
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            ),
            format => {
                warn!("unsupported sample format {:?}", format);
                return None;
            }
        };

        match stream {
            Ok(stream) => {
                if let Err(e) = stream.play() {
                    warn!("Failed to start audio stream: {}", e);
                }
                info!("audio output open at {} Hz", sample_rate);
                Some(stream)
            }
            Err(e) => {
                warn!("Failed to build audio stream: {}", e);
                None
            }
        }
    }

    fn with_voice(&self, channel: u8, f: impl FnOnce(&mut Voice)) {
        if let Ok(mut voices) = self.voices.lock() {
            if let Some(voice) = voices.get_mut(channel as usize) {
                f(voice);
            }
        }
    }

    pub fn trigger_note(&mut self, channel: u8, note: u8) {
        let frequency = midi_note_to_frequency(note);
        self.with_voice(channel, |voice| voice.frequency = Some(frequency));
    }

    pub fn stop_note(&mut self, channel: u8) {
        self.with_voice(channel, |voice| voice.frequency = None);
    }

    pub fn stop_all(&mut self) {
        if let Ok(mut voices) = self.voices.lock() {
            for voice in voices.iter_mut() {
                voice.frequency = None;
            }
        }
    }

    /// Frequency currently sounding on `channel`, if any.
    pub fn active_frequency(&self, channel: u8) -> Option<f32> {
        self.voices
            .lock()
            .ok()
            .and_then(|voices| voices.get(channel as usize).and_then(|v| v.frequency))
    }

    pub fn handle_event(&mut self, event: &PlaybackEvent) {
        match *event {
            PlaybackEvent::NoteOn { channel, pitch, .. } => self.trigger_note(channel, pitch),
            PlaybackEvent::NoteOff { channel, .. } => self.stop_note(channel),
            PlaybackEvent::BeatAdvanced(_) => {}
        }
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new().unwrap_or_else(Self::silent)
    }
}

pub fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_frequencies() {
        assert!((midi_note_to_frequency(69) - 440.0).abs() < 1e-3);
        assert!((midi_note_to_frequency(57) - 220.0).abs() < 1e-3);
        assert!((midi_note_to_frequency(62) - 293.665).abs() < 1e-2);
    }

    #[test]
    fn test_silent_output_tracks_voices() {
        let mut output = AudioOutput::silent();
        assert!(!output.has_device());

        output.handle_event(&PlaybackEvent::NoteOn {
            channel: 1,
            pitch: 69,
            velocity: 127,
        });
        assert_eq!(output.active_frequency(1), Some(440.0));
        assert_eq!(output.active_frequency(0), None);

        output.handle_event(&PlaybackEvent::NoteOff {
            channel: 1,
            pitch: 69,
        });
        assert_eq!(output.active_frequency(1), None);

        output.trigger_note(9, 60);
        output.trigger_note(3, 60);
        output.stop_all();
        assert_eq!(output.active_frequency(3), None);
    }

    #[test]
    fn test_voice_is_silent_without_frequency() {
        let mut voice = Voice::default();
        assert_eq!(voice.next_sample(48_000.0), 0.0);
        voice.frequency = Some(12_000.0);
        voice.next_sample(48_000.0);
        assert!((voice.phase - 0.25).abs() < 1e-6);
    }
}
