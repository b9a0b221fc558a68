use thiserror::Error;

/// Failures while turning chart text into a [`crate::chart::Chart`].
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Malformed chart JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Chart is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Note {index} has invalid lane {lane} (expected 0..={max})")]
    InvalidLane { index: usize, lane: u8, max: u8 },

    #[error("Note {index} has invalid time {time}")]
    InvalidTime { index: usize, time: f64 },

    #[error("Could not serialize chart: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Editor-side refusals. Both are usage preconditions rather than runtime faults.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("No timings recorded; record taps before generating charts")]
    EmptyRecording,

    #[error("No audio file loaded; choose a song before recording")]
    NoAudio,
}

/// Play-session failures. The session is back in its idle phase whenever one
/// of these is returned.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No chart loaded")]
    NoChart,

    #[error("No {0} chart loaded")]
    MissingDifficulty(String),

    #[error("Session already running")]
    AlreadyRunning,

    #[error("Audio was not ready after {waited_ms:.0} ms")]
    AudioTimeout { waited_ms: f64 },

    #[error("Audio playback failed to start")]
    AudioFailed,

    #[error(transparent)]
    Chart(#[from] ChartError),
}
