use crate::model::song::*;
use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::fs;
use std::path::Path;

const DRUM_CHANNEL: u8 = 9;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;
const MAX_U15: u32 = 0x7FFF;
const MAX_U24: u32 = 0xFF_FFFF;
const MAX_U28: u64 = 0x0FFF_FFFF;

/// Write a song to a format 1 Standard MIDI File at `path`.
pub fn write_midi_file<P: AsRef<Path>>(song: &Song, path: P) -> Result<()> {
    let bytes = song_to_midi_bytes(song)?;

    if let Some(parent) = path.as_ref().parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(path.as_ref(), &bytes).map_err(|e| {
        anyhow!(
            "Failed to write MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    info!(
        "Wrote {} byte(s) to '{}'..!",
        bytes.len(),
        path.as_ref().display()
    );

    Ok(())
}

pub fn song_to_midi_bytes(song: &Song) -> Result<Vec<u8>> {
    let smf = song_to_smf(song)?;

    let mut buffer = Vec::new();
    smf.write(&mut buffer)
        .map_err(|e| anyhow!("Failed to encode MIDI: {}", e))?;

    Ok(buffer)
}

/// Lay a song out as SMF tracks: a tempo track (tempo changes plus a 4/4 time signature) first,
/// then one track per song track.
///
/// One tick is one time step, so the file's ticks per quarter note is the song's beat resolution.
pub fn song_to_smf(song: &Song) -> Result<Smf<'_>> {
    if song.beat_resolution == 0 || song.beat_resolution > MAX_U15 {
        bail!(
            "Beat resolution {} cannot be stored as MIDI ticks per quarter note..!",
            song.beat_resolution
        );
    }

    let header = Header::new(
        Format::Parallel,
        Timing::Metrical((song.beat_resolution as u16).into()),
    );

    let mut tracks: Vec<Vec<TrackEvent<'_>>> = Vec::with_capacity(song.tracks.len() + 1);
    tracks.push(build_tempo_track(&song.tempo_map)?);

    let mut melodic_count: usize = 0;
    for track in song.tracks.iter() {
        let channel = if track.metadata.is_drum {
            DRUM_CHANNEL
        } else {
            let ch = melodic_channel(melodic_count);
            melodic_count += 1;
            ch
        };

        debug!(
            "Track '{}': program {} channel {} with {} note(s)",
            track.metadata.name,
            track.metadata.program,
            channel,
            track.notes.len()
        );

        tracks.push(build_note_track(track, channel)?);
    }

    Ok(Smf { header, tracks })
}

/// Channels 0..=15 without the drum channel, cycling once they run out.
fn melodic_channel(index: usize) -> u8 {
    let channel = (index % 15) as u8;
    if channel >= DRUM_CHANNEL {
        channel + 1
    } else {
        channel
    }
}

fn build_tempo_track(tempo_map: &TempoMap) -> Result<Vec<TrackEvent<'static>>> {
    let mut changes = tempo_map.changes();
    if changes.is_empty() {
        changes.push(TempoEntry {
            step: 0,
            bpm: DEFAULT_BPM,
        });
    }

    // 4/4, 24 clocks per click, 8 thirty-seconds per quarter
    let mut events: Vec<(u64, TrackEventKind<'static>)> = vec![
        (0, TrackEventKind::Meta(MetaMessage::TrackName(b"tempo"))),
        (
            0,
            TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
        ),
    ];

    for change in changes {
        let mpqn = (MICROSECONDS_PER_MINUTE / change.bpm).round();
        if !(1.0..=MAX_U24 as f64).contains(&mpqn) {
            bail!("Tempo {} BPM cannot be stored in a MIDI tempo event..!", change.bpm);
        }

        events.push((
            change.step,
            TrackEventKind::Meta(MetaMessage::Tempo((mpqn as u32).into())),
        ));
    }

    to_delta_events(events)
}

fn build_note_track(track: &Track, channel: u8) -> Result<Vec<TrackEvent<'_>>> {
    let mut events: Vec<(u64, TrackEventKind<'_>)> = vec![
        (
            0,
            TrackEventKind::Meta(MetaMessage::TrackName(track.metadata.name.as_bytes())),
        ),
        (
            0,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::ProgramChange {
                    program: track.metadata.program.into(),
                },
            },
        ),
    ];

    let mut notes: Vec<(u64, bool, &NoteEvent)> = Vec::with_capacity(track.notes.len() * 2);
    for note in track.notes.iter() {
        notes.push((note.onset, true, note));
        notes.push((note.offset, false, note));
    }

    // note-offs first at equal ticks so back-to-back notes on one pitch don't swallow each other
    notes.sort_by_key(|(tick, is_on, note)| (*tick, *is_on, note.pitch));

    for (tick, is_on, note) in notes {
        let message = if is_on {
            MidiMessage::NoteOn {
                key: note.pitch.into(),
                vel: note.velocity.into(),
            }
        } else {
            MidiMessage::NoteOff {
                key: note.pitch.into(),
                vel: 0u8.into(),
            }
        };

        events.push((
            tick,
            TrackEventKind::Midi {
                channel: channel.into(),
                message,
            },
        ));
    }

    to_delta_events(events)
}

/// Convert absolute-tick events (already in order) to delta-timed events and close the track.
fn to_delta_events(events: Vec<(u64, TrackEventKind<'_>)>) -> Result<Vec<TrackEvent<'_>>> {
    let mut out: Vec<TrackEvent<'_>> = Vec::with_capacity(events.len() + 1);
    let mut last_tick: u64 = 0;

    for (tick, kind) in events {
        let delta = tick.saturating_sub(last_tick);
        if delta > MAX_U28 {
            bail!("Delta of {} ticks is too large for a MIDI event..!", delta);
        }

        out.push(TrackEvent {
            delta: (delta as u32).into(),
            kind,
        });
        last_tick = last_tick.max(tick);
    }

    out.push(TrackEvent {
        delta: 0u32.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    Ok(out)
}
