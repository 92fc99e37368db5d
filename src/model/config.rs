use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_VELOCITY: u8 = 80;
pub const DEFAULT_TEMPO: f64 = 120.0;
pub const DEFAULT_BEAT_RESOLUTION: u32 = 24;

/// How cell values in a pianoroll are interpreted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VelocityMode {
    /// Cells are presence flags, every note gets the default velocity.
    #[default]
    Binary,

    /// Cells hold velocities (0-127), the onset cell's value is used.
    Raw,
}

impl VelocityMode {
    pub fn from_zero_one(is_zero_one: bool) -> Self {
        if is_zero_one {
            VelocityMode::Binary
        } else {
            VelocityMode::Raw
        }
    }
}

/// Settings for transcribing a single track.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TranscribeConfig {
    pub velocity_mode: VelocityMode,
    pub default_velocity: u8,
    /// A cell is active only when its value is strictly greater than this.
    pub silence_threshold: f64,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            velocity_mode: VelocityMode::Binary,
            default_velocity: DEFAULT_VELOCITY,
            silence_threshold: 0.0,
        }
    }
}

/// Song-level settings for assembling a whole pianoroll.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RollConfig {
    /// Beats per minute.
    pub tempo: f64,
    /// Time steps per beat.
    pub beat_resolution: u32,
    /// MIDI note number of the pianoroll's first pitch column.
    pub lowest_pitch: u8,
    pub transcribe: TranscribeConfig,
}

impl Default for RollConfig {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            beat_resolution: DEFAULT_BEAT_RESOLUTION,
            lowest_pitch: 0,
            transcribe: TranscribeConfig::default(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ROLL_WELL",
    about = "Transcribe a multi-track pianoroll into a MIDI file!"
)]
pub struct Args {
    /// Path to a JSON pianoroll document.
    #[arg(required_unless_present = "demo")]
    pub input: Option<PathBuf>,

    /// Path of the MIDI file to write.
    #[arg(short, long, required_unless_present = "dry_run")]
    pub output: Option<PathBuf>,

    /// Tempo in beats per minute. Overrides the document's value.
    #[arg(long)]
    pub tempo: Option<f64>,

    /// Time steps per beat. Overrides the document's value.
    #[arg(long)]
    pub beat_resolution: Option<u32>,

    /// MIDI note number of the first pitch column. Overrides the document's value.
    #[arg(long)]
    pub lowest_pitch: Option<u8>,

    /// How cell values are read: binary|velocity. Overrides the document's `is_zero_one`.
    #[arg(short, long)]
    pub velocity_mode: Option<String>,

    /// Velocity given to every note in binary mode.
    #[arg(long, default_value_t = DEFAULT_VELOCITY)]
    pub default_velocity: u8,

    /// Cells at or below this value count as silence.
    #[arg(long, default_value_t = 0.0)]
    pub silence_threshold: f64,

    /// Transcribe the built-in demo song instead of reading an input file.
    #[arg(long, default_value_t = false)]
    pub demo: bool,

    /// Dry run (print the first dry_run_max notes of each track and exit).
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Maximum notes per track to print in dry run.
    #[arg(long, default_value_t = 80)]
    pub dry_run_max: usize,
}
