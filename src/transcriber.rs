use crate::error::RollError;
use crate::model::config::{TranscribeConfig, VelocityMode};
use crate::model::song::NoteEvent;
use log::debug;
use ndarray::{ArrayView2, Axis};

pub const PITCH_SPACE: usize = 128;
const MAX_VELOCITY: f64 = 127.0;

/// Segment one track's `activity[time_step][pitch]` matrix into note events.
///
/// Every pitch column is scanned on its own, and each maximal run of active cells becomes one
/// note, so simultaneous runs on different pitches stay separate (polyphony). A run still
/// sounding at the last step is closed at the matrix boundary.
///
/// Pitches are `column + pitch_offset`. Output is sorted by onset, then pitch.
pub fn transcribe_track<A>(
    activity: ArrayView2<'_, A>,
    pitch_offset: u8,
    config: &TranscribeConfig,
) -> Result<Vec<NoteEvent>, RollError>
where
    A: Copy + Into<f64>,
{
    let (n_steps, width) = activity.dim();

    if pitch_offset as usize + width > PITCH_SPACE {
        return Err(RollError::range(
            "pitch",
            format!(
                "lowest pitch {} + {} pitch columns exceeds {}",
                pitch_offset, width, PITCH_SPACE
            ),
        ));
    }

    validate_transcribe_config(config)?;

    let mut notes: Vec<NoteEvent> = Vec::new();
    let mut dropped = 0usize;

    for (column, cells) in activity.axis_iter(Axis(1)).enumerate() {
        let pitch = pitch_offset + column as u8;
        let mut run_start: Option<(usize, f64)> = None;

        for (step, &cell) in cells.iter().enumerate() {
            let value: f64 = cell.into();
            let active = value > 0.0 && value > config.silence_threshold;

            match (run_start, active) {
                (None, true) => run_start = Some((step, value)),
                (Some((onset, onset_value)), false) => {
                    push_run(&mut notes, &mut dropped, pitch, onset, step, onset_value, config);
                    run_start = None;
                }
                _ => {}
            }
        }

        if let Some((onset, onset_value)) = run_start {
            push_run(&mut notes, &mut dropped, pitch, onset, n_steps, onset_value, config);
        }
    }

    if dropped > 0 {
        debug!(
            "Dropped {} run(s) whose onset velocity truncated to zero..!",
            dropped
        );
    }

    notes.sort_by_key(|note| (note.onset, note.pitch));

    Ok(notes)
}

/// Static checks on a [`TranscribeConfig`], shared with the song assembler's eager validation.
pub(crate) fn validate_transcribe_config(config: &TranscribeConfig) -> Result<(), RollError> {
    if !config.silence_threshold.is_finite() || config.silence_threshold < 0.0 {
        return Err(RollError::range(
            "silence threshold",
            format!(
                "{} must be a finite, non-negative value",
                config.silence_threshold
            ),
        ));
    }

    if config.velocity_mode == VelocityMode::Binary
        && !(1..=127).contains(&config.default_velocity)
    {
        return Err(RollError::range(
            "default velocity",
            format!("{} is not within [1, 127]", config.default_velocity),
        ));
    }

    Ok(())
}

/// Raw velocities are truncated toward zero the way an unsigned 8-bit cast would, then capped
/// at 127. A run whose truncated onset velocity is 0 is dropped rather than bumped up to 1.
fn push_run(
    notes: &mut Vec<NoteEvent>,
    dropped: &mut usize,
    pitch: u8,
    onset: usize,
    offset: usize,
    onset_value: f64,
    config: &TranscribeConfig,
) {
    let velocity = match config.velocity_mode {
        VelocityMode::Binary => config.default_velocity,
        VelocityMode::Raw => {
            let truncated = onset_value.trunc().min(MAX_VELOCITY);
            if truncated < 1.0 {
                *dropped += 1;
                return;
            }
            truncated as u8
        }
    };

    notes.push(NoteEvent {
        pitch,
        velocity,
        onset: onset as u64,
        offset: offset as u64,
    });
}
