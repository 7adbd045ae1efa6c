/// MIDI output using midir
use crate::error::{HelixError, Result};
use crate::sequencer::playback::PlaybackEvent;
use log::info;
use midir::{MidiOutput, MidiOutputConnection};

const CLIENT_NAME: &str = "Helix MIDI Output";

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const CONTROL_CHANGE: u8 = 0xB0;
const ALL_NOTES_OFF: u8 = 123;

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self { connection: None }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<()> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| HelixError::Midi(format!("Failed to create MIDI output: {}", e)))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| HelixError::Midi(format!("Invalid port index {}", port_index)))?;
        let port_name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "helix")
            .map_err(|e| HelixError::Midi(format!("Failed to connect: {}", e)))?;

        info!("connected to MIDI port {}", port_name);
        self.connection = Some(connection);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        if let Some(ref mut conn) = self.connection {
            conn.send(message)
                .map_err(|e| HelixError::Midi(format!("Failed to send {:02X?}: {}", message, e)))?;
        }
        Ok(())
    }

    pub fn send_note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.send(&note_on_message(channel, note, velocity))
    }

    pub fn send_note_off(&mut self, channel: u8, note: u8) -> Result<()> {
        self.send(&note_off_message(channel, note))
    }

    pub fn all_notes_off(&mut self, channel: u8) -> Result<()> {
        self.send(&[CONTROL_CHANGE | (channel & 0x0F), ALL_NOTES_OFF, 0])
    }

    pub fn handle_event(&mut self, event: &PlaybackEvent) -> Result<()> {
        match *event {
            PlaybackEvent::NoteOn {
                channel,
                pitch,
                velocity,
            } => self.send_note_on(channel, pitch, velocity),
            PlaybackEvent::NoteOff { channel, pitch } => self.send_note_off(channel, pitch),
            PlaybackEvent::BeatAdvanced(_) => Ok(()),
        }
    }

    pub fn disconnect(&mut self) {
        self.connection = None;
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

pub fn note_on_message(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [NOTE_ON | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

pub fn note_off_message(channel: u8, note: u8) -> [u8; 3] {
    [NOTE_OFF | (channel & 0x0F), note & 0x7F, 0]
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(62), "D4");
        assert_eq!(midi_note_name(58), "A#3");
        assert_eq!(midi_note_name(56), "G#3");
        assert_eq!(midi_note_name(0), "C-1");
    }

    #[test]
    fn test_messages_carry_channel() {
        assert_eq!(note_on_message(2, 58, 127), [0x92, 58, 127]);
        assert_eq!(note_off_message(3, 56), [0x83, 56, 0]);
        assert_eq!(note_on_message(0, 200, 255), [0x90, 72, 127]);
    }

    #[test]
    fn test_unconnected_device_swallows_events() {
        let mut device = MidiOutputDevice::new();
        assert!(!device.is_connected());
        device
            .handle_event(&PlaybackEvent::NoteOn {
                channel: 0,
                pitch: 62,
                velocity: 127,
            })
            .unwrap();
        device.all_notes_off(0).unwrap();
    }
}
