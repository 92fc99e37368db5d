use crate::model::config::{RollConfig, TranscribeConfig, VelocityMode};
use anyhow::{Result, anyhow, bail};
use log::{debug, warn};
use ndarray::{Array3, ArrayD, Ix4, IxDyn, s};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// A pianoroll plus the per-track metadata and optional settings needed to transcribe it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRollDocument")]
pub struct RollDocument {
    /// (track, time, pitch) once loaded; other ranks are passed through untouched.
    pub pianoroll: ArrayD<f64>,
    pub programs: Vec<u8>,
    pub is_drums: Vec<bool>,
    pub track_names: Vec<String>,
    pub tempo: Option<f64>,
    pub beat_resolution: Option<u32>,
    pub lowest_pitch: Option<u8>,
    pub is_zero_one: Option<bool>,
}

#[derive(Deserialize)]
struct RawRollDocument {
    pianoroll: Nested,
    programs: Vec<u8>,
    is_drums: Vec<bool>,
    track_names: Vec<String>,
    #[serde(default)]
    tempo: Option<f64>,
    #[serde(default)]
    beat_resolution: Option<u32>,
    #[serde(default)]
    lowest_pitch: Option<u8>,
    #[serde(default)]
    is_zero_one: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Nested {
    Value(f64),
    List(Vec<Nested>),
}

impl TryFrom<RawRollDocument> for RollDocument {
    type Error = anyhow::Error;

    fn try_from(raw: RawRollDocument) -> Result<Self> {
        let pianoroll = flatten_measures(nested_to_array(&raw.pianoroll)?)?;

        Ok(RollDocument {
            pianoroll,
            programs: raw.programs,
            is_drums: raw.is_drums,
            track_names: raw.track_names,
            tempo: raw.tempo,
            beat_resolution: raw.beat_resolution,
            lowest_pitch: raw.lowest_pitch,
            is_zero_one: raw.is_zero_one,
        })
    }
}

pub fn load_roll_file<P: AsRef<Path>>(path: P) -> Result<RollDocument> {
    let text = fs::read_to_string(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read pianoroll file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    parse_roll_document(&text)
}

pub fn parse_roll_document(text: &str) -> Result<RollDocument> {
    let document: RollDocument =
        serde_json::from_str(text).map_err(|e| anyhow!("Failed to parse pianoroll: {}", e))?;

    debug!(
        "Loaded pianoroll with shape {:?} and {} track name(s)",
        document.pianoroll.shape(),
        document.track_names.len()
    );

    Ok(document)
}

/// Build a dense array from a rectangular nested list, rejecting ragged input.
fn nested_to_array(nested: &Nested) -> Result<ArrayD<f64>> {
    let mut shape: Vec<usize> = Vec::new();
    let mut cursor = nested;
    while let Nested::List(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }

    let mut data: Vec<f64> = Vec::with_capacity(shape.iter().product());
    collect_values(nested, &shape, 0, &mut data)?;

    ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| anyhow!("Pianoroll data does not fill shape {:?}: {}", shape, e))
}

fn collect_values(nested: &Nested, shape: &[usize], depth: usize, out: &mut Vec<f64>) -> Result<()> {
    match nested {
        Nested::Value(v) if depth == shape.len() => {
            out.push(*v);
            Ok(())
        }
        Nested::List(items) if depth < shape.len() && items.len() == shape[depth] => {
            for item in items {
                collect_values(item, shape, depth + 1, out)?;
            }
            Ok(())
        }
        _ => bail!(
            "Pianoroll is ragged at depth {}, expected shape {:?}..!",
            depth,
            shape
        ),
    }
}

/// Fold (track, measure, measure_resolution, pitch) rolls into (track, time, pitch).
///
/// Any other rank is returned untouched.
pub fn flatten_measures(roll: ArrayD<f64>) -> Result<ArrayD<f64>> {
    if roll.ndim() != 4 {
        return Ok(roll);
    }

    let roll = roll
        .into_dimensionality::<Ix4>()
        .map_err(|e| anyhow!("Failed to read 4-dimensional pianoroll: {}", e))?;
    let (tracks, measures, resolution, pitches) = roll.dim();

    warn!(
        "Flattening {} measure(s) of {} step(s) into one time axis..!",
        measures, resolution
    );

    let flat = roll
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((tracks, measures * resolution, pitches))
        .map_err(|e| anyhow!("Failed to flatten measures: {}", e))?;

    Ok(flat.into_dyn())
}

impl RollDocument {
    /// Merge the document's own settings with overrides, falling back to `RollConfig` defaults.
    pub fn roll_config(
        &self,
        tempo: Option<f64>,
        beat_resolution: Option<u32>,
        lowest_pitch: Option<u8>,
        velocity_mode: Option<VelocityMode>,
        transcribe: TranscribeConfig,
    ) -> RollConfig {
        let defaults = RollConfig::default();

        RollConfig {
            tempo: tempo.or(self.tempo).unwrap_or(defaults.tempo),
            beat_resolution: beat_resolution
                .or(self.beat_resolution)
                .unwrap_or(defaults.beat_resolution),
            lowest_pitch: lowest_pitch
                .or(self.lowest_pitch)
                .unwrap_or(defaults.lowest_pitch),
            transcribe: TranscribeConfig {
                velocity_mode: velocity_mode
                    .or(self.is_zero_one.map(VelocityMode::from_zero_one))
                    .unwrap_or(transcribe.velocity_mode),
                ..transcribe
            },
        }
    }

    /// Three tracks of drums, piano and bass over four 24-step measures.
    pub fn demo() -> Self {
        let n_measures = 4;
        let measure_resolution = 24;
        let n_pitches = 88;
        let n_steps = n_measures * measure_resolution;

        let mut pianoroll = Array3::<f64>::zeros((3, n_steps, n_pitches));

        // kick and closed hat
        pianoroll.slice_mut(s![0, ..;24, 3]).fill(1.0);
        pianoroll.slice_mut(s![0, ..;12, 9]).fill(1.0);

        for measure in 0..n_measures {
            let start = measure * measure_resolution;
            let held = start..start + measure_resolution - 6;

            pianoroll.slice_mut(s![1, held.clone(), 51]).fill(1.0);
            pianoroll.slice_mut(s![1, held.clone(), 55]).fill(1.0);
            pianoroll.slice_mut(s![2, held, 15]).fill(1.0);
        }

        RollDocument {
            pianoroll: pianoroll.into_dyn(),
            programs: vec![0, 0, 33],
            is_drums: vec![true, false, false],
            track_names: vec!["Drums".into(), "Piano".into(), "Bass".into()],
            tempo: Some(100.0),
            beat_resolution: Some(6),
            lowest_pitch: Some(21),
            is_zero_one: Some(true),
        }
    }
}
