//! Chart data model shared by the editor (generator) and the player (judgment engine).
//!
//! A chart is persisted as JSON:
//!
//! ```json
//! { "title": "...", "artist": "...", "bpm": 120, "offset": 0.0,
//!   "audioFile": "assets/sounds/song.mp3",
//!   "difficulty": { "name": "HYPER", "level": 8 },
//!   "notes": [ { "time": 1.234, "lane": 3, "type": "tap" } ] }
//! ```
//!
//! Note times are written with millisecond (3 decimal) precision. Play-side
//! transient state (render position, resolution) never lives here; see
//! [`crate::judge::ActiveNote`].

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ChartError;

/// Playable key lanes are `0..KEY_LANES`.
pub const KEY_LANES: u8 = 6;
/// Scratch lane in the six-key + scratch layout.
pub const SCRATCH_LANE: u8 = 6;
/// Scratch index used by older charts; still judged like any other lane.
pub const LEGACY_SCRATCH_LANE: u8 = 7;
/// Highest lane index a loadable chart may reference.
pub const MAX_LANE: u8 = LEGACY_SCRATCH_LANE;

const DEFAULT_BPM: f64 = 120.0;
const FALLBACK_LEVEL: u32 = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    #[default]
    Tap,
    Hold,
    /// Legacy scratch type from hand-built charts. Judged as a tap.
    Scratch,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(serialize_with = "serialize_millis")]
    pub time: f64,
    pub lane: u8,
    #[serde(rename = "type", default)]
    pub kind: NoteKind,
    /// Sustain length in seconds; only meaningful for holds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duration: f64,
}

impl Note {
    pub fn tap(time: f64, lane: u8) -> Self {
        Self {
            time: round_millis(time),
            lane,
            kind: NoteKind::Tap,
            duration: 0.0,
        }
    }

    pub fn hold(time: f64, lane: u8, duration: f64) -> Self {
        Self {
            time: round_millis(time),
            lane,
            kind: NoteKind::Hold,
            duration,
        }
    }

    pub fn is_scratch(&self) -> bool {
        self.lane >= SCRATCH_LANE || self.kind == NoteKind::Scratch
    }
}

/// The four tiers the editor emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Beginner,
    Normal,
    Hyper,
    Another,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Beginner,
        Difficulty::Normal,
        Difficulty::Hyper,
        Difficulty::Another,
    ];

    /// Lower-case key used in file names and editor form ids.
    pub fn key(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Normal => "normal",
            Difficulty::Hyper => "hyper",
            Difficulty::Another => "another",
        }
    }

    /// Upper-case name stored in `difficulty.name`.
    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Beginner => "BEGINNER",
            Difficulty::Normal => "NORMAL",
            Difficulty::Hyper => "HYPER",
            Difficulty::Another => "ANOTHER",
        }
    }

    pub fn level(self) -> u32 {
        match self {
            Difficulty::Beginner => 3,
            Difficulty::Normal => 5,
            Difficulty::Hyper => 8,
            Difficulty::Another => 11,
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.key().eq_ignore_ascii_case(name.trim()))
    }
}

/// Level for an arbitrary difficulty name; unknown names rate as 5.
pub fn level_for_name(name: &str) -> u32 {
    Difficulty::from_name(name)
        .map(Difficulty::level)
        .unwrap_or(FALLBACK_LEVEL)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyInfo {
    pub name: String,
    pub level: u32,
}

impl From<Difficulty> for DifficultyInfo {
    fn from(d: Difficulty) -> Self {
        Self {
            name: d.name().to_string(),
            level: d.level(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub title: String,
    pub artist: String,
    pub bpm: f64,
    pub offset: f64,
    pub audio_file: String,
    pub difficulty: DifficultyInfo,
    pub notes: Vec<Note>,
}

// Loading goes through an all-optional mirror so missing fields become
// `ChartError::MissingField` instead of an opaque serde message.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChart {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    bpm: Option<f64>,
    #[serde(default)]
    offset: Option<f64>,
    #[serde(default)]
    audio_file: Option<String>,
    #[serde(default)]
    difficulty: Option<RawDifficulty>,
    #[serde(default)]
    notes: Option<Vec<Note>>,
}

#[derive(Deserialize)]
struct RawDifficulty {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    level: Option<u32>,
}

impl Chart {
    /// Parse and validate chart text. Notes that arrive out of order are
    /// stable-sorted by time.
    pub fn from_json(text: &str) -> Result<Self, ChartError> {
        let raw: RawChart = serde_json::from_str(text)?;
        let difficulty = raw.difficulty.ok_or(ChartError::MissingField("difficulty"))?;
        let name = difficulty
            .name
            .ok_or(ChartError::MissingField("difficulty.name"))?;
        let mut notes = raw.notes.ok_or(ChartError::MissingField("notes"))?;

        for (index, note) in notes.iter().enumerate() {
            if !note.time.is_finite() || note.time < 0.0 {
                return Err(ChartError::InvalidTime {
                    index,
                    time: note.time,
                });
            }
            if note.lane > MAX_LANE {
                return Err(ChartError::InvalidLane {
                    index,
                    lane: note.lane,
                    max: MAX_LANE,
                });
            }
        }
        if !notes.is_sorted_by(|a, b| a.time <= b.time) {
            warn!("chart notes out of order; sorting {} notes by time", notes.len());
            sort_by_time(&mut notes);
        }

        let level = difficulty.level.unwrap_or_else(|| level_for_name(&name));
        let chart = Chart {
            title: raw.title.unwrap_or_default(),
            artist: raw.artist.unwrap_or_default(),
            bpm: raw.bpm.unwrap_or(DEFAULT_BPM),
            offset: raw.offset.unwrap_or(0.0),
            audio_file: raw.audio_file.unwrap_or_default(),
            difficulty: DifficultyInfo { name, level },
            notes,
        };
        if !chart.has_unique_chord_lanes() {
            warn!(
                "chart '{}' [{}] repeats a lane within a chord",
                chart.title, chart.difficulty.name
            );
        }
        Ok(chart)
    }

    /// Pretty JSON, two-space indented.
    pub fn to_json(&self) -> Result<String, ChartError> {
        serde_json::to_string_pretty(self).map_err(ChartError::Serialize)
    }

    /// Download name: `<title>_<difficulty>.json`, `chart` when untitled.
    pub fn file_name(&self) -> String {
        let title = self.title.trim();
        let stem = if title.is_empty() { "chart" } else { title };
        format!("{}_{}.json", stem, self.difficulty.name.to_lowercase())
    }

    /// True when no two notes at the same timestamp share a lane.
    pub fn has_unique_chord_lanes(&self) -> bool {
        self.chords()
            .all(|group| group.iter().enumerate().all(|(i, n)| {
                group[..i].iter().all(|m| m.lane != n.lane)
            }))
    }

    /// Groups of notes sharing one timestamp, in time order.
    pub fn chords(&self) -> impl Iterator<Item = &[Note]> {
        self.notes.chunk_by(|a, b| a.time == b.time)
    }

    pub fn chord_histogram(&self) -> ChordHistogram {
        let mut hist = ChordHistogram::default();
        for group in self.chords() {
            match group.len() {
                1 => hist.single += 1,
                2 => hist.double += 1,
                3 => hist.triple += 1,
                _ => hist.larger += 1,
            }
        }
        hist
    }

    /// Copy with every scratch-lane note removed.
    pub fn without_scratch(&self) -> Chart {
        let mut chart = self.clone();
        chart.notes.retain(|n| n.lane < SCRATCH_LANE);
        chart
    }

    /// Copy converted from the old 7-key + scratch layout: lane 7 becomes the
    /// scratch lane 6, lane 6 folds onto 5, anything higher is dropped. A note
    /// that would collide with an existing lane at the same time is dropped.
    pub fn remap_legacy_lanes(&self) -> Chart {
        let mut chart = self.clone();
        let mut remapped: Vec<Note> = Vec::with_capacity(chart.notes.len());
        for mut note in chart.notes.drain(..) {
            note.lane = match note.lane {
                LEGACY_SCRATCH_LANE => SCRATCH_LANE,
                SCRATCH_LANE => KEY_LANES - 1,
                l if l > LEGACY_SCRATCH_LANE => continue,
                l => l,
            };
            let collides = remapped
                .iter()
                .rev()
                .take_while(|m| m.time == note.time)
                .any(|m| m.lane == note.lane);
            if !collides {
                remapped.push(note);
            }
        }
        chart.notes = remapped;
        chart
    }
}

/// Charts for one song, one per difficulty, keyed by lower-case difficulty
/// name. A later chart for the same difficulty replaces the earlier one.
#[derive(Clone, Debug, Default)]
pub struct ChartSet {
    charts: BTreeMap<String, Chart>,
}

impl ChartSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chart: Chart) -> Option<Chart> {
        self.charts.insert(chart.difficulty.name.to_lowercase(), chart)
    }

    /// Parse every text independently. A file that fails to load is reported
    /// in its slot and does not stop the rest; successful slots carry the key
    /// the chart was stored under.
    pub fn load_all<'a>(
        &mut self,
        texts: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Result<String, ChartError>> {
        texts
            .into_iter()
            .map(|text| {
                let chart = Chart::from_json(text)?;
                let key = chart.difficulty.name.to_lowercase();
                if self.insert(chart).is_some() {
                    warn!("second '{key}' chart replaces the first");
                }
                Ok(key)
            })
            .collect()
    }

    /// Case-insensitive lookup by difficulty name.
    pub fn get(&self, difficulty: &str) -> Option<&Chart> {
        self.charts.get(&difficulty.to_lowercase())
    }

    pub fn difficulties(&self) -> impl Iterator<Item = &str> {
        self.charts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn clear(&mut self) {
        self.charts.clear();
    }
}

/// Count of timestamp groups by chord size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChordHistogram {
    pub single: usize,
    pub double: usize,
    pub triple: usize,
    pub larger: usize,
}

impl ChordHistogram {
    pub fn groups(&self) -> usize {
        self.single + self.double + self.triple + self.larger
    }
}

/// Stable ascending sort on note time.
pub fn sort_by_time(notes: &mut [Note]) {
    notes.sort_by(|a, b| a.time.total_cmp(&b.time));
}

pub fn round_millis(t: f64) -> f64 {
    (t * 1000.0).round() / 1000.0
}

fn serialize_millis<S: Serializer>(t: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_millis(*t))
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_with(notes: Vec<Note>) -> Chart {
        Chart {
            title: "Song".into(),
            artist: "Band".into(),
            bpm: 120.0,
            offset: 0.0,
            audio_file: "assets/sounds/song.mp3".into(),
            difficulty: Difficulty::Hyper.into(),
            notes,
        }
    }

    #[test]
    fn test_level_table() {
        assert_eq!(level_for_name("beginner"), 3);
        assert_eq!(level_for_name("NORMAL"), 5);
        assert_eq!(level_for_name("Hyper"), 8);
        assert_eq!(level_for_name("another"), 11);
        assert_eq!(level_for_name("leggendaria"), 5);
    }

    #[test]
    fn test_load_minimal_chart() {
        let text = r#"{"difficulty":{"name":"ANOTHER"},"notes":[{"time":1.5,"lane":2}]}"#;
        let chart = Chart::from_json(text).unwrap();
        assert_eq!(chart.difficulty.level, 11);
        assert_eq!(chart.bpm, 120.0);
        assert_eq!(chart.notes[0].kind, NoteKind::Tap);
        assert_eq!(chart.notes[0].duration, 0.0);
    }

    #[test]
    fn test_load_rejects_missing_fields() {
        let no_notes = r#"{"difficulty":{"name":"NORMAL","level":5}}"#;
        assert!(matches!(
            Chart::from_json(no_notes),
            Err(ChartError::MissingField("notes"))
        ));
        let no_name = r#"{"difficulty":{"level":5},"notes":[]}"#;
        assert!(matches!(
            Chart::from_json(no_name),
            Err(ChartError::MissingField("difficulty.name"))
        ));
        assert!(matches!(
            Chart::from_json("{not json"),
            Err(ChartError::Malformed(_))
        ));
    }

    #[test]
    fn test_load_rejects_bad_lane_and_time() {
        let lane = r#"{"difficulty":{"name":"N"},"notes":[{"time":1.0,"lane":9}]}"#;
        assert!(matches!(
            Chart::from_json(lane),
            Err(ChartError::InvalidLane { index: 0, lane: 9, .. })
        ));
        let time = r#"{"difficulty":{"name":"N"},"notes":[{"time":-0.5,"lane":1}]}"#;
        assert!(matches!(
            Chart::from_json(time),
            Err(ChartError::InvalidTime { index: 0, .. })
        ));
    }

    #[test]
    fn test_load_sorts_unordered_notes() {
        let text = r#"{"difficulty":{"name":"NORMAL"},"notes":[
            {"time":2.0,"lane":0},{"time":1.0,"lane":1},{"time":1.0,"lane":2}]}"#;
        let chart = Chart::from_json(text).unwrap();
        let lanes: Vec<u8> = chart.notes.iter().map(|n| n.lane).collect();
        assert_eq!(lanes, vec![1, 2, 0]);
    }

    #[test]
    fn test_load_accepts_legacy_scratch() {
        let text =
            r#"{"difficulty":{"name":"NORMAL"},"notes":[{"time":1.0,"lane":7,"type":"scratch"}]}"#;
        let chart = Chart::from_json(text).unwrap();
        assert!(chart.notes[0].is_scratch());
    }

    #[test]
    fn test_json_writes_millisecond_times() {
        let mut chart = chart_with(vec![Note::tap(0.0, 0)]);
        chart.notes[0].time = 1.234_567;
        let json = chart.to_json().unwrap();
        assert!(json.contains("\"time\": 1.235"), "{json}");
        assert!(json.contains("\"audioFile\""));
        assert!(!json.contains("duration"));
        let back = Chart::from_json(&json).unwrap();
        assert_eq!(back.notes[0].time, 1.235);
    }

    #[test]
    fn test_hold_keeps_duration() {
        let chart = chart_with(vec![Note::hold(1.0, 3, 0.5)]);
        let json = chart.to_json().unwrap();
        assert!(json.contains("\"type\": \"hold\""));
        assert!(json.contains("\"duration\": 0.5"));
    }

    #[test]
    fn test_file_name() {
        let mut chart = chart_with(vec![]);
        assert_eq!(chart.file_name(), "Song_hyper.json");
        chart.title = "  ".into();
        assert_eq!(chart.file_name(), "chart_hyper.json");
    }

    #[test]
    fn test_chord_histogram_and_uniqueness() {
        let chart = chart_with(vec![
            Note::tap(1.0, 0),
            Note::tap(1.0, 3),
            Note::tap(2.0, 1),
            Note::tap(3.0, 0),
            Note::tap(3.0, 1),
            Note::tap(3.0, 2),
        ]);
        let hist = chart.chord_histogram();
        assert_eq!((hist.single, hist.double, hist.triple), (1, 1, 1));
        assert_eq!(hist.groups(), 3);
        assert!(chart.has_unique_chord_lanes());

        let dup = chart_with(vec![Note::tap(1.0, 2), Note::tap(1.0, 2)]);
        assert!(!dup.has_unique_chord_lanes());
    }

    #[test]
    fn test_lane_utilities() {
        let chart = chart_with(vec![
            Note::tap(1.0, 5),
            Note::tap(1.0, 6),
            Note::tap(2.0, 7),
            Note::tap(3.0, 2),
        ]);
        let stripped = chart.without_scratch();
        assert_eq!(stripped.notes.len(), 2);

        let remapped = chart.remap_legacy_lanes();
        let lanes: Vec<u8> = remapped.notes.iter().map(|n| n.lane).collect();
        // 6 folds onto 5, which already exists at t=1.0
        assert_eq!(lanes, vec![5, 6, 2]);
    }

    #[test]
    fn test_chart_set_keeps_good_files_when_one_fails() {
        let mut set = ChartSet::new();
        let results = set.load_all([
            r#"{"difficulty":{"name":"HYPER"},"notes":[]}"#,
            r#"{"difficulty":{"name":"NORMAL"}}"#,
            r#"{"difficulty":{"name":"Beginner"},"notes":[{"time":1.0,"lane":2}]}"#,
        ]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), "hyper");
        assert!(matches!(results[1], Err(ChartError::MissingField("notes"))));
        assert_eq!(results[2].as_ref().unwrap(), "beginner");
        assert_eq!(set.len(), 2);
        assert_eq!(set.difficulties().collect::<Vec<_>>(), vec!["beginner", "hyper"]);
        assert_eq!(set.get("BEGINNER").unwrap().notes.len(), 1);
        assert!(set.get("normal").is_none());
    }
}
