use serde::{Deserialize, Serialize};

pub const DEFAULT_BPM: f64 = 120.0;
const SECONDS_PER_MINUTE: f64 = 60.0;

/// A single transcribed note, in absolute pitch and absolute time-step space.
///
/// `offset` is exclusive and always greater than `onset`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub onset: u64,
    pub offset: u64,
}

impl NoteEvent {
    pub fn duration_steps(&self) -> u64 {
        self.offset - self.onset
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackMetadata {
    pub program: u8,
    pub is_drum: bool,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub metadata: TrackMetadata,
    /// Ordered by onset, then pitch.
    pub notes: Vec<NoteEvent>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TempoEntry {
    pub step: u64,
    pub bpm: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TempoMap {
    pub entries: Vec<TempoEntry>,
}

impl TempoMap {
    /// One entry per time step, all at the same tempo.
    pub fn constant(bpm: f64, n_steps: u64) -> Self {
        Self {
            entries: (0..n_steps).map(|step| TempoEntry { step, bpm }).collect(),
        }
    }

    /// The tempo in effect at `step`. Steps past the last entry keep the last tempo.
    pub fn bpm_at(&self, step: u64) -> f64 {
        self.entries
            .iter()
            .rfind(|entry| entry.step <= step)
            .or(self.entries.first())
            .map(|entry| entry.bpm)
            .unwrap_or(DEFAULT_BPM)
    }

    /// Only the entries where the tempo actually differs from the one before.
    pub fn changes(&self) -> Vec<TempoEntry> {
        let mut changes: Vec<TempoEntry> = Vec::new();
        for entry in self.entries.iter() {
            match changes.last() {
                Some(last) if last.bpm == entry.bpm => continue,
                _ => changes.push(*entry),
            }
        }

        changes
    }

    /// Absolute seconds for a time step, integrating piecewise over tempo changes.
    ///
    /// This builds a [`TempoTimeline`] for a single lookup; keep one around for repeated queries.
    pub fn step_to_seconds(&self, step: u64, beat_resolution: u32) -> f64 {
        self.timeline(beat_resolution).step_to_seconds(step)
    }

    /// Precompute the tempo segments so each lookup is a binary search.
    pub fn timeline(&self, beat_resolution: u32) -> TempoTimeline {
        let resolution = beat_resolution as f64;
        let changes = self.changes();

        let mut segments: Vec<TempoSegment> = Vec::with_capacity(changes.len().max(1));
        let mut seconds = 0.0;
        let mut last_step: u64 = 0;
        let mut last_bpm = changes.first().map(|c| c.bpm).unwrap_or(DEFAULT_BPM);

        // the first tempo also covers any steps before its own entry
        segments.push(TempoSegment {
            start_step: 0,
            bpm: last_bpm,
            seconds_at_start: 0.0,
        });

        for change in changes.iter().skip(1) {
            seconds += (change.step - last_step) as f64 / resolution
                / (last_bpm / SECONDS_PER_MINUTE);

            segments.push(TempoSegment {
                start_step: change.step,
                bpm: change.bpm,
                seconds_at_start: seconds,
            });

            last_step = change.step;
            last_bpm = change.bpm;
        }

        TempoTimeline {
            segments,
            beat_resolution,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoSegment {
    pub start_step: u64,
    pub bpm: f64,
    pub seconds_at_start: f64,
}

/// Tempo segments with their accumulated start times, for repeated step-to-seconds lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoTimeline {
    segments: Vec<TempoSegment>,
    beat_resolution: u32,
}

impl TempoTimeline {
    pub fn step_to_seconds(&self, step: u64) -> f64 {
        let index = self
            .segments
            .partition_point(|seg| seg.start_step <= step)
            .saturating_sub(1);

        let resolution = self.beat_resolution as f64;
        let Some(segment) = self.segments.get(index) else {
            return step as f64 / resolution / (DEFAULT_BPM / SECONDS_PER_MINUTE);
        };

        segment.seconds_at_start
            + (step - segment.start_step) as f64 / resolution / (segment.bpm / SECONDS_PER_MINUTE)
    }

    /// (onset, offset) of a note in seconds.
    pub fn note_seconds(&self, note: &NoteEvent) -> (f64, f64) {
        (
            self.step_to_seconds(note.onset),
            self.step_to_seconds(note.offset),
        )
    }
}

/// The assembled result of a transcription, ready for export.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Song {
    pub tracks: Vec<Track>,
    pub tempo_map: TempoMap,
    /// Time steps per beat.
    pub beat_resolution: u32,
    pub n_steps: u64,
}

impl Song {
    pub fn timeline(&self) -> TempoTimeline {
        self.tempo_map.timeline(self.beat_resolution)
    }

    pub fn step_to_seconds(&self, step: u64) -> f64 {
        self.tempo_map.step_to_seconds(step, self.beat_resolution)
    }

    /// (onset, offset) of a note in seconds.
    pub fn note_seconds(&self, note: &NoteEvent) -> (f64, f64) {
        self.timeline().note_seconds(note)
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|track| track.notes.len()).sum()
    }
}
