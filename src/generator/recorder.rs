//! Tap recording session for the chart editor.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

/// Song metadata entered in the editor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SongInfo {
    pub title: String,
    pub artist: String,
    pub bpm: f64,
    /// Seconds subtracted from every recorded tap.
    pub offset: f64,
    /// Bare file name of the loaded song, if any.
    pub audio_file: Option<String>,
}

impl Default for SongInfo {
    fn default() -> Self {
        Self {
            title: String::new(),
            artist: String::new(),
            bpm: 120.0,
            offset: 0.0,
            audio_file: None,
        }
    }
}

impl SongInfo {
    /// Path the player will fetch the song from.
    pub fn audio_path(&self) -> String {
        format!("assets/sounds/{}", self.audio_file.as_deref().unwrap_or_default())
    }
}

/// Collects tap timestamps while the song plays. Times passed in are host
/// clock milliseconds; stored samples are offset-corrected seconds, never
/// negative.
#[derive(Debug, Default)]
pub struct Recorder {
    pub song: SongInfo,
    recording: bool,
    start_ms: f64,
    timings: Vec<f64>,
}

impl Recorder {
    pub fn new(song: SongInfo) -> Self {
        Self {
            song,
            ..Self::default()
        }
    }

    /// Begin a fresh recording; earlier samples are dropped.
    pub fn start(&mut self, now_ms: f64) -> Result<(), GenerateError> {
        if self.song.audio_file.is_none() {
            return Err(GenerateError::NoAudio);
        }
        self.recording = true;
        self.timings.clear();
        self.start_ms = now_ms;
        info!("recording started");
        Ok(())
    }

    /// Record one tap. Ignored (returns `None`) unless recording.
    pub fn tap(&mut self, now_ms: f64) -> Option<f64> {
        if !self.recording {
            return None;
        }
        let elapsed = (now_ms - self.start_ms) / 1000.0;
        let sample = (elapsed - self.song.offset).max(0.0);
        self.timings.push(sample);
        Some(sample)
    }

    /// Stop recording and report how many taps were captured.
    pub fn stop(&mut self) -> usize {
        self.recording = false;
        info!("recording stopped: {} taps", self.timings.len());
        self.timings.len()
    }

    pub fn clear(&mut self) {
        self.timings.clear();
        info!("recording cleared");
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn timings(&self) -> &[f64] {
        &self.timings
    }

    pub fn last_tap(&self) -> Option<f64> {
        self.timings.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> Recorder {
        Recorder::new(SongInfo {
            offset: 0.5,
            audio_file: Some("song.ogg".into()),
            ..SongInfo::default()
        })
    }

    #[test]
    fn test_start_requires_audio() {
        let mut rec = Recorder::default();
        assert_eq!(rec.start(0.0), Err(GenerateError::NoAudio));
        assert!(!rec.is_recording());
    }

    #[test]
    fn test_taps_are_offset_corrected_and_clamped() {
        let mut rec = loaded();
        rec.start(1_000.0).unwrap();
        assert_eq!(rec.tap(1_200.0), Some(0.0)); // 0.2s - 0.5s offset
        assert_eq!(rec.tap(3_000.0), Some(1.5));
        assert_eq!(rec.stop(), 2);
        assert_eq!(rec.tap(4_000.0), None);
        assert_eq!(rec.timings(), &[0.0, 1.5]);
        assert_eq!(rec.last_tap(), Some(1.5));
    }

    #[test]
    fn test_restart_and_clear_drop_samples() {
        let mut rec = loaded();
        rec.start(0.0).unwrap();
        rec.tap(2_000.0);
        rec.stop();
        rec.start(10_000.0).unwrap();
        assert!(rec.timings().is_empty());
        rec.tap(11_000.0);
        rec.clear();
        assert!(rec.timings().is_empty());
    }

    #[test]
    fn test_audio_path() {
        assert_eq!(loaded().song.audio_path(), "assets/sounds/song.ogg");
    }
}
