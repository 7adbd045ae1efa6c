#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
use helix::{
    midi_note_name, AudioOutput, HelixError, MidiOutputDevice, PlaybackEngine, PlaybackEvent,
    Session, SessionConfig, Tone,
};

#[cfg(feature = "cli")]
use log::warn;

#[cfg(feature = "cli")]
use std::{thread, time::Duration};

/// Place tones on the strand and play them as a loop
#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON session configuration
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Override the configured tempo
    #[arg(long)]
    tempo: Option<f32>,

    /// Place a tone, as <tone>@<slot>, e.g. tone1@0
    #[arg(long = "place", value_parser = parse_placement)]
    placements: Vec<(Tone, usize)>,

    /// Print the strand and timeline, then exit
    #[arg(long)]
    print: bool,

    /// Number of loop passes to play
    #[arg(long, default_value_t = 2)]
    loops: u32,

    /// MIDI output port index
    #[arg(long)]
    midi_port: Option<usize>,

    /// List MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Play a tone once before the loop starts
    #[arg(long)]
    preview: Option<Tone>,
}

#[cfg(feature = "cli")]
fn parse_placement(s: &str) -> Result<(Tone, usize), String> {
    let (tone, slot) = s
        .split_once('@')
        .ok_or_else(|| format!("expected <tone>@<slot>, got {}", s))?;
    let tone = tone
        .parse::<Tone>()
        .map_err(|_| HelixError::UnknownTone(tone.to_string()).to_string())?;
    let slot = slot
        .parse::<usize>()
        .map_err(|e| format!("bad slot {}: {}", slot, e))?;
    Ok((tone, slot))
}

#[cfg(feature = "cli")]
fn main() -> Result<(), HelixError> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let args = Args::parse();

    if args.list_ports {
        for (i, name) in MidiOutputDevice::available_ports().iter().enumerate() {
            println!("{}: {}", i, name);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(tempo) = args.tempo {
        config.tempo_bpm = tempo;
    }

    let mut session = Session::new(&config, PlaybackEngine::new())?;
    for (tone, slot) in &args.placements {
        session.move_tone(*tone, *slot)?;
    }

    if args.print {
        print_session(&session);
        return Ok(());
    }

    let mut player = Player::new(args.midi_port)?;

    if let Some(tone) = args.preview {
        session.preview(tone)?;
        player.pump(&session, Duration::from_millis(600));
    }

    session.play()?;
    player.play_passes(&session, args.loops);
    session.stop();
    player.pump(&session, Duration::from_millis(50));
    player.silence();

    Ok(())
}

#[cfg(feature = "cli")]
fn print_session(session: &Session<PlaybackEngine>) {
    println!("Strand:");
    for slot in session.track().slots() {
        match slot.occupant() {
            Some(tone) => println!("  {:>2}  {}", slot.index(), tone),
            None => println!("  {:>2}  -", slot.index()),
        }
    }

    let sequencer = session.sequencer();
    println!(
        "Timeline ({} bpm, {} beats):",
        sequencer.tempo_bpm(),
        sequencer.loop_length_beats()
    );
    for event in sequencer.timeline().events() {
        println!(
            "  ch{} {:<4} beat {:>2} for {:>2} beats",
            event.channel,
            midi_note_name(event.pitch),
            event.start_beat,
            event.duration_beats
        );
    }
}

/// Forwards engine events to the audio and MIDI outputs.
#[cfg(feature = "cli")]
struct Player {
    audio_output: AudioOutput,
    midi_output: MidiOutputDevice,
}

#[cfg(feature = "cli")]
impl Player {
    fn new(midi_port: Option<usize>) -> Result<Self, HelixError> {
        let mut midi_output = MidiOutputDevice::new();
        if let Some(port) = midi_port {
            midi_output.connect(port)?;
        }
        let audio_output = AudioOutput::default();
        if !audio_output.has_device() && !midi_output.is_connected() {
            warn!("no audio device and no MIDI port - playback will be silent");
        }

        Ok(Self {
            audio_output,
            midi_output,
        })
    }

    fn forward(&mut self, event: &PlaybackEvent) {
        self.audio_output.handle_event(event);
        if let Err(e) = self.midi_output.handle_event(event) {
            warn!("{}", e);
        }
    }

    /// Forwards whatever the engine emits for `duration`.
    fn pump(&mut self, session: &Session<PlaybackEngine>, duration: Duration) {
        let step = Duration::from_millis(2);
        let mut waited = Duration::ZERO;

        while waited < duration {
            for event in session.sequencer().sink().poll_events() {
                self.forward(&event);
            }
            thread::sleep(step);
            waited += step;
        }
    }

    /// Forwards events until `passes` full loop passes have played. Nothing
    /// from the pass after them is forwarded.
    fn play_passes(&mut self, session: &Session<PlaybackEngine>, passes: u32) {
        let mut pass_starts = 0;

        while session.sequencer().sink().is_running() {
            let events = session.sequencer().sink().poll_events();
            let (played, done) = events_within_passes(&events, &mut pass_starts, passes);
            for event in played {
                self.forward(event);
            }
            if done {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        warn!("playback clock stopped before {} passes", passes);
    }

    fn silence(&mut self) {
        self.audio_output.stop_all();
        for tone in Tone::all() {
            if let Err(e) = self.midi_output.all_notes_off(tone.channel()) {
                warn!("{}", e);
            }
        }
    }
}

/// Returns the prefix of `events` that belongs to the first `passes` passes,
/// and whether the next pass has begun. `pass_starts` carries the count of
/// loop starts seen across calls.
#[cfg(feature = "cli")]
fn events_within_passes<'a>(
    events: &'a [PlaybackEvent],
    pass_starts: &mut u32,
    passes: u32,
) -> (&'a [PlaybackEvent], bool) {
    for (i, event) in events.iter().enumerate() {
        if *event == PlaybackEvent::BeatAdvanced(0) {
            if *pass_starts == passes {
                return (&events[..i], true);
            }
            *pass_starts += 1;
        }
    }
    (events, false)
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("This binary requires the 'cli' feature to be enabled");
    std::process::exit(1);
}
