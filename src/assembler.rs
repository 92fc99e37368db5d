use crate::error::RollError;
use crate::model::config::RollConfig;
use crate::model::song::{NoteEvent, Song, TempoMap, Track, TrackMetadata};
use crate::transcriber::{PITCH_SPACE, transcribe_track, validate_transcribe_config};
use log::{debug, info};
use ndarray::{Array2, ArrayView2, ArrayViewD, Axis, Ix3, s};

/// Validate a (track, time, pitch) pianoroll against its metadata and transcribe it into a [`Song`].
///
/// All shape, cardinality and range checks happen before any track is transcribed, so this
/// either returns a complete song or an error with nothing produced.
pub fn assemble_song<A>(
    roll: ArrayViewD<'_, A>,
    programs: &[u8],
    is_drums: &[bool],
    track_names: &[String],
    config: &RollConfig,
) -> Result<Song, RollError>
where
    A: Copy + Into<f64> + Sync,
{
    let shape = roll.shape().to_vec();
    let roll = roll
        .into_dimensionality::<Ix3>()
        .map_err(|_| RollError::Shape { shape })?;

    let (n_tracks, n_steps, width) = roll.dim();

    let mismatches: Vec<(&'static str, usize)> = [
        ("programs", programs.len()),
        ("is_drums", is_drums.len()),
        ("track_names", track_names.len()),
    ]
    .into_iter()
    .filter(|(_, len)| *len != n_tracks)
    .collect();

    if !mismatches.is_empty() {
        return Err(RollError::Cardinality {
            tracks: n_tracks,
            mismatches,
        });
    }

    validate_config(config, width, programs)?;

    debug!(
        "Assembling {} track(s) x {} step(s) x {} pitch(es), lowest pitch {}..!",
        n_tracks, n_steps, width, config.lowest_pitch
    );

    let tracks = transcribe_tracks(&roll, config)?;

    let tracks: Vec<Track> = tracks
        .into_iter()
        .enumerate()
        .map(|(i, notes)| Track {
            metadata: TrackMetadata {
                program: programs[i],
                is_drum: is_drums[i],
                name: track_names[i].clone(),
            },
            notes,
        })
        .collect();

    let song = Song {
        tracks,
        tempo_map: TempoMap::constant(config.tempo, n_steps as u64),
        beat_resolution: config.beat_resolution,
        n_steps: n_steps as u64,
    };

    info!(
        "Transcribed {} note(s) across {} track(s)..!",
        song.note_count(),
        song.tracks.len()
    );

    Ok(song)
}

fn validate_config(config: &RollConfig, width: usize, programs: &[u8]) -> Result<(), RollError> {
    if config.lowest_pitch as usize + width > PITCH_SPACE {
        return Err(RollError::range(
            "pitch",
            format!(
                "lowest pitch {} + {} pitch columns exceeds {}",
                config.lowest_pitch, width, PITCH_SPACE
            ),
        ));
    }

    if let Some((track, program)) = programs.iter().enumerate().find(|(_, p)| **p > 127) {
        return Err(RollError::range(
            "program",
            format!("track {} has program {}", track, program),
        ));
    }

    if !config.tempo.is_finite() || config.tempo <= 0.0 {
        return Err(RollError::range(
            "tempo",
            format!("{} must be a positive number of beats per minute", config.tempo),
        ));
    }

    if config.beat_resolution == 0 {
        return Err(RollError::range(
            "beat resolution",
            "must be at least one time step per beat",
        ));
    }

    validate_transcribe_config(&config.transcribe)
}

/// Widen a track's pitch window to the full 128-pitch space in a fresh working matrix.
///
/// Zero columns fill `0..lowest_pitch` and everything above the window.
pub(crate) fn pad_pitch_axis<A>(
    track: ArrayView2<'_, A>,
    lowest_pitch: u8,
) -> Result<Array2<f64>, RollError>
where
    A: Copy + Into<f64>,
{
    let (n_steps, width) = track.dim();
    let lo = lowest_pitch as usize;

    if lo + width > PITCH_SPACE {
        return Err(RollError::range(
            "pitch",
            format!(
                "lowest pitch {} + {} pitch columns exceeds {}",
                lowest_pitch, width, PITCH_SPACE
            ),
        ));
    }

    let mut padded = Array2::<f64>::zeros((n_steps, PITCH_SPACE));
    padded
        .slice_mut(s![.., lo..lo + width])
        .assign(&track.mapv(Into::<f64>::into));

    Ok(padded)
}

fn transcribe_padded<A>(
    track: ArrayView2<'_, A>,
    config: &RollConfig,
) -> Result<Vec<NoteEvent>, RollError>
where
    A: Copy + Into<f64>,
{
    let padded = pad_pitch_axis(track, config.lowest_pitch)?;
    transcribe_track(padded.view(), 0, &config.transcribe)
}

#[cfg(feature = "parallel")]
fn transcribe_tracks<A>(
    roll: &ndarray::ArrayView3<'_, A>,
    config: &RollConfig,
) -> Result<Vec<Vec<NoteEvent>>, RollError>
where
    A: Copy + Into<f64> + Sync,
{
    use rayon::prelude::*;

    (0..roll.len_of(Axis(0)))
        .into_par_iter()
        .map(|i| transcribe_padded(roll.index_axis(Axis(0), i), config))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn transcribe_tracks<A>(
    roll: &ndarray::ArrayView3<'_, A>,
    config: &RollConfig,
) -> Result<Vec<Vec<NoteEvent>>, RollError>
where
    A: Copy + Into<f64> + Sync,
{
    roll.axis_iter(Axis(0))
        .map(|track| transcribe_padded(track, config))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::config::{TranscribeConfig, VelocityMode};
    use ndarray::{Array, Array3, IxDyn};

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Track {}", i)).collect()
    }

    fn config(lowest_pitch: u8) -> RollConfig {
        RollConfig {
            tempo: 120.0,
            beat_resolution: 4,
            lowest_pitch,
            transcribe: TranscribeConfig::default(),
        }
    }

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9
    }

    #[test]
    fn all_zero_roll_gives_empty_tracks() {
        env_logger::try_init().unwrap_or(());

        let roll: Array3<u8> = Array3::zeros((3, 32, 88));
        let song = assemble_song(
            roll.view().into_dyn(),
            &[0, 0, 33],
            &[true, false, false],
            &names(3),
            &config(21),
        )
        .unwrap();

        assert_eq!(song.tracks.len(), 3);
        assert!(song.tracks.iter().all(|t| t.notes.is_empty()));
        assert_eq!(song.tempo_map.entries.len(), 32);
        assert!(song.tempo_map.entries.iter().all(|e| e.bpm == 120.0));
    }

    #[test]
    fn single_run_maps_to_absolute_pitch_and_time() {
        env_logger::try_init().unwrap_or(());

        let mut roll: Array3<u8> = Array3::zeros((1, 4, 4));
        roll[[0, 1, 0]] = 1;
        roll[[0, 2, 0]] = 1;

        let song = assemble_song(
            roll.view().into_dyn(),
            &[0],
            &[false],
            &names(1),
            &config(60),
        )
        .unwrap();

        let notes = &song.tracks[0].notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 60);
        assert_eq!(notes[0].velocity, 80);
        assert_eq!((notes[0].onset, notes[0].offset), (1, 3));

        let (on, off) = song.note_seconds(&notes[0]);
        assert!(approx_eq(on, 1.0 / 4.0 / 2.0));
        assert!(approx_eq(off, 3.0 / 4.0 / 2.0));
    }

    #[test]
    fn metadata_is_paired_in_order() {
        env_logger::try_init().unwrap_or(());

        let mut roll: Array3<u8> = Array3::zeros((2, 4, 2));
        roll[[1, 0, 1]] = 1;

        let song = assemble_song(
            roll.view().into_dyn(),
            &[0, 33],
            &[true, false],
            &["Drums".to_string(), "Bass".to_string()],
            &config(35),
        )
        .unwrap();

        assert_eq!(song.tracks[0].metadata.name, "Drums");
        assert!(song.tracks[0].metadata.is_drum);
        assert!(song.tracks[0].notes.is_empty());

        assert_eq!(song.tracks[1].metadata.program, 33);
        assert_eq!(song.tracks[1].notes[0].pitch, 36);
    }

    #[test]
    fn cardinality_mismatch_fails() {
        env_logger::try_init().unwrap_or(());

        let roll: Array3<u8> = Array3::zeros((3, 4, 4));
        let result = assemble_song(
            roll.view().into_dyn(),
            &[0, 0],
            &[false, false, false],
            &names(3),
            &config(0),
        );

        assert_eq!(
            result,
            Err(RollError::Cardinality {
                tracks: 3,
                mismatches: vec![("programs", 2)],
            })
        );
    }

    #[test]
    fn wrong_rank_fails() {
        env_logger::try_init().unwrap_or(());

        let roll = Array::<u8, _>::zeros(IxDyn(&[2, 4, 4, 4]));
        let result = assemble_song(roll.view(), &[0, 0], &[false, false], &names(2), &config(0));
        assert_eq!(
            result,
            Err(RollError::Shape {
                shape: vec![2, 4, 4, 4]
            })
        );
    }

    #[test]
    fn window_past_pitch_space_fails() {
        env_logger::try_init().unwrap_or(());

        let roll: Array3<u8> = Array3::zeros((1, 4, 88));
        let result = assemble_song(roll.view().into_dyn(), &[0], &[false], &names(1), &config(41));
        assert!(matches!(result, Err(RollError::Range { what: "pitch", .. })));
    }

    #[test]
    fn bad_program_and_tempo_fail() {
        env_logger::try_init().unwrap_or(());

        let roll: Array3<u8> = Array3::zeros((1, 4, 4));
        let result = assemble_song(roll.view().into_dyn(), &[128], &[false], &names(1), &config(0));
        assert!(matches!(result, Err(RollError::Range { what: "program", .. })));

        let bad_tempo = RollConfig {
            tempo: 0.0,
            ..config(0)
        };
        let result = assemble_song(roll.view().into_dyn(), &[0], &[false], &names(1), &bad_tempo);
        assert!(matches!(result, Err(RollError::Range { what: "tempo", .. })));
    }

    #[test]
    fn overlapping_runs_across_pitches_are_preserved() {
        env_logger::try_init().unwrap_or(());

        let mut roll: Array3<f32> = Array3::zeros((1, 6, 8));
        for step in 0..4 {
            roll[[0, step, 2]] = 90.0;
        }
        for step in 2..6 {
            roll[[0, step, 5]] = 70.0;
        }

        let raw = RollConfig {
            transcribe: TranscribeConfig {
                velocity_mode: VelocityMode::Raw,
                ..TranscribeConfig::default()
            },
            ..config(50)
        };

        let song = assemble_song(roll.view().into_dyn(), &[0], &[false], &names(1), &raw).unwrap();
        let notes = &song.tracks[0].notes;

        assert_eq!(notes.len(), 2);
        assert_eq!((notes[0].pitch, notes[0].velocity), (52, 90));
        assert_eq!((notes[1].pitch, notes[1].velocity), (55, 70));
        assert!(notes[1].onset < notes[0].offset);
    }

    #[test]
    fn transcription_is_deterministic() {
        env_logger::try_init().unwrap_or(());

        let roll = Array3::from_shape_fn((4, 48, 12), |(t, s, p)| ((t + s * 3 + p) % 5 == 0) as u8);
        let run = || {
            assemble_song(
                roll.view().into_dyn(),
                &[0, 1, 2, 3],
                &[false, true, false, false],
                &names(4),
                &config(30),
            )
            .unwrap()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn padding_places_window_at_lowest_pitch() {
        let track: Array2<u8> = ndarray::array![[1, 2], [3, 4]];
        let padded = pad_pitch_axis(track.view(), 126).unwrap();

        assert_eq!(padded.dim(), (2, 128));
        assert_eq!(padded[[0, 126]], 1.0);
        assert_eq!(padded[[1, 127]], 4.0);
        assert_eq!(padded.slice(s![.., ..126]).sum(), 0.0);
    }

    #[test]
    fn padding_past_pitch_space_fails() {
        let track: Array2<u8> = Array2::zeros((2, 3));
        let result = pad_pitch_axis(track.view(), 126);
        assert!(matches!(result, Err(RollError::Range { what: "pitch", .. })));
    }

    #[test]
    fn negative_threshold_is_rejected_before_transcription() {
        env_logger::try_init().unwrap_or(());

        let roll: Array3<u8> = Array3::zeros((1, 4, 4));
        let negative = RollConfig {
            transcribe: TranscribeConfig {
                silence_threshold: -0.5,
                ..TranscribeConfig::default()
            },
            ..config(0)
        };

        let result = assemble_song(roll.view().into_dyn(), &[0], &[false], &names(1), &negative);
        assert!(matches!(
            result,
            Err(RollError::Range {
                what: "silence threshold",
                ..
            })
        ));

        let nan = RollConfig {
            transcribe: TranscribeConfig {
                silence_threshold: f64::NAN,
                ..TranscribeConfig::default()
            },
            ..config(0)
        };

        let ones: Array3<u8> = Array3::ones((1, 4, 4));
        let result = assemble_song(ones.view().into_dyn(), &[0], &[false], &names(1), &nan);
        assert!(matches!(
            result,
            Err(RollError::Range {
                what: "silence threshold",
                ..
            })
        ));
    }

    #[test]
    fn default_velocity_is_checked_without_tracks() {
        env_logger::try_init().unwrap_or(());

        let roll: Array3<u8> = Array3::zeros((0, 4, 4));
        let silent = RollConfig {
            transcribe: TranscribeConfig {
                default_velocity: 0,
                ..TranscribeConfig::default()
            },
            ..config(0)
        };

        let result = assemble_song(roll.view().into_dyn(), &[], &[], &[], &silent);
        assert!(matches!(
            result,
            Err(RollError::Range {
                what: "default velocity",
                ..
            })
        ));
    }
}
