use thiserror::Error;

/// Failures raised while validating or transcribing a piano-roll.
///
/// Every variant is detected before any transcription work starts, so a caller that gets one of
/// these back can be sure nothing was partially produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RollError {
    /// The tensor is not (track, time, pitch).
    #[error("pianoroll must be 3-dimensional (track, time, pitch), got shape {shape:?}..!")]
    Shape { shape: Vec<usize> },

    /// One or more metadata arrays disagree with the tensor's track dimension.
    #[error(
        "pianoroll has {tracks} track(s) but {}..!",
        describe_mismatches(.mismatches)
    )]
    Cardinality {
        tracks: usize,
        mismatches: Vec<(&'static str, usize)>,
    },

    /// A pitch, velocity, program or timing value falls outside its valid bound.
    #[error("{what} out of range: {detail}..!")]
    Range { what: &'static str, detail: String },
}

impl RollError {
    pub(crate) fn range(what: &'static str, detail: impl Into<String>) -> Self {
        RollError::Range {
            what,
            detail: detail.into(),
        }
    }
}

fn describe_mismatches(mismatches: &[(&'static str, usize)]) -> String {
    mismatches
        .iter()
        .map(|(name, len)| format!("{} has {}", name, len))
        .collect::<Vec<_>>()
        .join(", ")
}
