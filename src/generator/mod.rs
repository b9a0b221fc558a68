//! Chart generation from a tap recording.
//!
//! One recording feeds every difficulty. Each tier thins the recorded taps by
//! its density (stride sampling, so the kept taps stay spread over the song),
//! then turns every kept tap into a single note or a chord according to its
//! chord level.

mod recorder;

pub use recorder::{Recorder, SongInfo};

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::chart::{
    Chart, ChordHistogram, Difficulty, DifficultyInfo, KEY_LANES, Note, round_millis, sort_by_time,
};
use crate::error::GenerateError;
use crate::rng::RandomSource;

/// Per-tier knobs. `density` is a percentage of recorded taps to keep;
/// `chord_level` picks the chord probability table (0 = never chords).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyConfig {
    pub density: u8,
    pub chord_level: u8,
}

impl DifficultyConfig {
    pub const fn new(density: u8, chord_level: u8) -> Self {
        Self {
            density,
            chord_level,
        }
    }
}

/// Config for all four tiers, keyed the way the editor form names them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfigs {
    pub beginner: DifficultyConfig,
    pub normal: DifficultyConfig,
    pub hyper: DifficultyConfig,
    pub another: DifficultyConfig,
}

impl Default for DifficultyConfigs {
    fn default() -> Self {
        Self {
            beginner: DifficultyConfig::new(30, 0),
            normal: DifficultyConfig::new(50, 1),
            hyper: DifficultyConfig::new(75, 2),
            another: DifficultyConfig::new(100, 3),
        }
    }
}

impl DifficultyConfigs {
    pub fn get(&self, difficulty: Difficulty) -> DifficultyConfig {
        match difficulty {
            Difficulty::Beginner => self.beginner,
            Difficulty::Normal => self.normal,
            Difficulty::Hyper => self.hyper,
            Difficulty::Another => self.another,
        }
    }
}

/// Indices kept for `density` percent of `len` taps.
///
/// `count = floor(len * density / 100)` and `index(i) = floor(i * len / count)`.
/// When `count` reaches `len` every index is kept.
pub fn select_indices(len: usize, density: u8) -> Vec<usize> {
    let count = len * density as usize / 100;
    if count >= len {
        return (0..len).collect();
    }
    (0..count).map(|i| i * len / count).collect()
}

pub fn select_timings(timings: &[f64], density: u8) -> Vec<f64> {
    select_indices(timings.len(), density)
        .into_iter()
        .map(|i| timings[i])
        .collect()
}

/// Chord size for one tap, from a single uniform draw `r` in `[0, 1)`.
pub fn chord_size(chord_level: u8, r: f64) -> usize {
    match chord_level {
        1 if r < 0.1 => 2,
        2 if r < 0.2 => 2,
        3 if r < 0.1 => 3,
        3 if r < 0.3 => 2,
        4 if r < 0.2 => 3,
        4 if r < 0.5 => 2,
        _ => 1,
    }
}

/// `size` distinct key lanes, drawn uniformly with redraw on collision.
pub fn pick_lanes(size: usize, rng: &mut impl RandomSource) -> Vec<u8> {
    let size = size.min(KEY_LANES as usize);
    let mut lanes: Vec<u8> = Vec::with_capacity(size);
    while lanes.len() < size {
        let lane = rng.next_index(KEY_LANES as usize) as u8;
        if !lanes.contains(&lane) {
            lanes.push(lane);
        }
    }
    lanes
}

/// Notes for one kept tap. The chord draw happens before the lane draws.
fn notes_for_tap(time: f64, chord_level: u8, rng: &mut impl RandomSource) -> Vec<Note> {
    let size = chord_size(chord_level, rng.next_unit());
    pick_lanes(size, rng)
        .into_iter()
        .map(|lane| Note::tap(time, lane))
        .collect()
}

/// Build one difficulty's chart from the recorded taps.
pub fn generate(
    song: &SongInfo,
    difficulty: Difficulty,
    timings: &[f64],
    config: DifficultyConfig,
    rng: &mut impl RandomSource,
) -> Result<Chart, GenerateError> {
    if timings.is_empty() {
        return Err(GenerateError::EmptyRecording);
    }
    // Taps that land on the same millisecond would become one chord in the
    // file; keep one so chord lanes stay distinct.
    let mut kept: Vec<f64> = select_timings(timings, config.density)
        .into_iter()
        .map(round_millis)
        .collect();
    kept.sort_by(f64::total_cmp);
    kept.dedup();
    let mut notes: Vec<Note> = kept
        .into_iter()
        .flat_map(|t| notes_for_tap(t, config.chord_level, rng))
        .collect();
    sort_by_time(&mut notes);

    let chart = Chart {
        title: non_empty_or(&song.title, "Untitled"),
        artist: non_empty_or(&song.artist, "Unknown"),
        bpm: song.bpm,
        offset: song.offset,
        audio_file: song.audio_path(),
        difficulty: DifficultyInfo::from(difficulty),
        notes,
    };
    debug!(
        "generated {} [{}]: {} notes from {} taps (density {}%, chord level {})",
        chart.title,
        chart.difficulty.name,
        chart.notes.len(),
        timings.len(),
        config.density,
        config.chord_level
    );
    Ok(chart)
}

/// All four tiers, BEGINNER through ANOTHER.
pub fn generate_all(
    song: &SongInfo,
    timings: &[f64],
    configs: &DifficultyConfigs,
    rng: &mut impl RandomSource,
) -> Result<Vec<Chart>, GenerateError> {
    let charts = Difficulty::ALL
        .into_iter()
        .map(|d| generate(song, d, timings, configs.get(d), &mut *rng))
        .collect::<Result<Vec<_>, _>>()?;
    info!("generated {} charts from {} recorded taps", charts.len(), timings.len());
    Ok(charts)
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// One line of the editor preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartSummary {
    pub difficulty: String,
    pub level: u32,
    pub notes: usize,
    pub chords: ChordHistogram,
}

impl ChartSummary {
    pub fn of(chart: &Chart) -> Self {
        Self {
            difficulty: chart.difficulty.name.clone(),
            level: chart.difficulty.level,
            notes: chart.notes.len(),
            chords: chart.chord_histogram(),
        }
    }
}

impl fmt::Display for ChartSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Lv.{}): {} notes ({} single / {} double / {} triple)",
            self.difficulty,
            self.level,
            self.notes,
            self.chords.single,
            self.chords.double,
            self.chords.triple + self.chords.larger
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScriptedRandom;

    fn song() -> SongInfo {
        SongInfo {
            audio_file: Some("track.mp3".into()),
            ..SongInfo::default()
        }
    }

    #[test]
    fn test_stride_selection() {
        let timings: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(select_indices(10, 50), vec![0, 2, 4, 6, 8]);
        assert_eq!(select_timings(&timings, 50), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(select_indices(10, 30), vec![0, 3, 6]);
        assert_eq!(select_indices(10, 100).len(), 10);
        assert!(select_indices(10, 9).is_empty());
    }

    #[test]
    fn test_density_above_full_keeps_everything() {
        assert_eq!(select_indices(4, 250), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_chord_table() {
        assert_eq!(chord_size(0, 0.0), 1);
        assert_eq!(chord_size(1, 0.09), 2);
        assert_eq!(chord_size(1, 0.1), 1);
        assert_eq!(chord_size(2, 0.19), 2);
        assert_eq!(chord_size(2, 0.2), 1);
        assert_eq!(chord_size(3, 0.05), 3);
        assert_eq!(chord_size(3, 0.25), 2);
        assert_eq!(chord_size(3, 0.3), 1);
        assert_eq!(chord_size(4, 0.15), 3);
        assert_eq!(chord_size(4, 0.45), 2);
        assert_eq!(chord_size(4, 0.5), 1);
        assert_eq!(chord_size(9, 0.0), 1);
    }

    #[test]
    fn test_pick_lanes_redraws_collisions() {
        // 0.0 -> lane 0, 0.01 -> lane 0 again (rejected), 0.5 -> lane 3
        let mut rng = ScriptedRandom::new(&[0.0, 0.01, 0.5]);
        assert_eq!(pick_lanes(2, &mut rng), vec![0, 3]);
    }

    #[test]
    fn test_generate_with_scripted_draws() {
        // tap 1: chord draw 0.05 (triple at level 3), lanes 0.0, 0.2, 0.9
        // tap 2: chord draw 0.9 (single), lane 0.4
        let mut rng = ScriptedRandom::new(&[0.05, 0.0, 0.2, 0.9, 0.9, 0.4]);
        let chart = generate(
            &song(),
            Difficulty::Another,
            &[0.5, 1.25],
            DifficultyConfig::new(100, 3),
            &mut rng,
        )
        .unwrap();
        let got: Vec<(f64, u8)> = chart.notes.iter().map(|n| (n.time, n.lane)).collect();
        assert_eq!(got, vec![(0.5, 0), (0.5, 1), (0.5, 5), (1.25, 2)]);
        assert_eq!(chart.title, "Untitled");
        assert_eq!(chart.artist, "Unknown");
        assert_eq!(chart.audio_file, "assets/sounds/track.mp3");
        assert_eq!(chart.difficulty.name, "ANOTHER");
        assert_eq!(chart.difficulty.level, 11);
    }

    #[test]
    fn test_generate_rounds_times_to_millis() {
        let mut rng = ScriptedRandom::new(&[0.9, 0.0]);
        let chart = generate(
            &song(),
            Difficulty::Normal,
            &[1.234_56],
            DifficultyConfig::new(100, 0),
            &mut rng,
        )
        .unwrap();
        assert_eq!(chart.notes[0].time, 1.235);
    }

    #[test]
    fn test_same_millisecond_taps_collapse() {
        // both taps round to 2.0; only one chord draw + lane draw is consumed
        let mut rng = ScriptedRandom::new(&[0.9, 0.0, 0.9, 0.5]);
        let chart = generate(
            &song(),
            Difficulty::Normal,
            &[1.9999, 2.0002],
            DifficultyConfig::new(100, 1),
            &mut rng,
        )
        .unwrap();
        assert_eq!(chart.notes, vec![Note::tap(2.0, 0)]);
    }

    #[test]
    fn test_generate_refuses_empty_recording() {
        let mut rng = ScriptedRandom::new(&[0.0]);
        let config = DifficultyConfig::new(50, 0);
        let err = generate(&song(), Difficulty::Normal, &[], config, &mut rng);
        assert_eq!(err, Err(GenerateError::EmptyRecording));
    }

    #[test]
    fn test_zero_count_yields_empty_chart() {
        let mut rng = ScriptedRandom::new(&[0.0]);
        let chart = generate(
            &song(),
            Difficulty::Beginner,
            &[1.0, 2.0],
            DifficultyConfig::new(10, 0),
            &mut rng,
        )
        .unwrap();
        assert!(chart.notes.is_empty());
    }

    #[test]
    fn test_generate_all_tiers_in_order() {
        let mut rng = ScriptedRandom::new(&[0.7, 0.3, 0.1, 0.6]);
        let timings: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let configs = DifficultyConfigs::default();
        let charts = generate_all(&song(), &timings, &configs, &mut rng).unwrap();
        let names: Vec<&str> = charts.iter().map(|c| c.difficulty.name.as_str()).collect();
        assert_eq!(names, vec!["BEGINNER", "NORMAL", "HYPER", "ANOTHER"]);
        // beginner keeps 30% of 20 taps and never chords
        assert_eq!(charts[0].notes.len(), 6);
    }

    #[test]
    fn test_summary_line() {
        let mut rng = ScriptedRandom::new(&[0.9, 0.1]);
        let chart = generate(
            &song(),
            Difficulty::Hyper,
            &[1.0, 2.0],
            DifficultyConfig::new(100, 0),
            &mut rng,
        )
        .unwrap();
        let line = ChartSummary::of(&chart).to_string();
        assert_eq!(line, "HYPER (Lv.8): 2 notes (2 single / 0 double / 0 triple)");
    }
}
