use log::debug;

use super::{
    EngineEvent, EventSink, Judgment, JudgmentTier, NoteId, POOR_WINDOW_S, Resolution, judge,
    timing_error,
};
use crate::chart::{Chart, Note};

/// Render position a note takes before its first `advance`.
pub const OFFSCREEN_Y: f64 = -50.0;
/// Scroll rate at note speed 1.
pub const PIXELS_PER_SECOND: f64 = 200.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoteState {
    Pending,
    Hit,
    Missed,
}

/// A spawned note plus its play-side state.
#[derive(Clone, Debug)]
pub struct ActiveNote {
    pub id: NoteId,
    pub note: Note,
    pub y: f64,
    pub state: NoteState,
}

impl ActiveNote {
    pub fn is_pending(&self) -> bool {
        self.state == NoteState::Pending
    }
}

/// Resolutions per tier. POOR from a press and POOR from expiry are kept apart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JudgmentCounts {
    pub perfect: u32,
    pub great: u32,
    pub good: u32,
    pub bad: u32,
    pub poor: u32,
    pub miss: u32,
}

impl JudgmentCounts {
    fn record(&mut self, tier: JudgmentTier, resolution: Resolution) {
        match (tier, resolution) {
            (_, Resolution::Missed) => self.miss += 1,
            (JudgmentTier::Perfect, _) => self.perfect += 1,
            (JudgmentTier::Great, _) => self.great += 1,
            (JudgmentTier::Good, _) => self.good += 1,
            (JudgmentTier::Bad, _) => self.bad += 1,
            (JudgmentTier::Poor, _) => self.poor += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.perfect + self.great + self.good + self.bad + self.poor + self.miss
    }
}

/// Scheduling and scoring state for one play run.
///
/// Every time argument is seconds on the session clock (0 = chart start).
/// Notes move `pending -> hit | missed` exactly once; resolved notes are
/// pruned on the next `advance`.
#[derive(Debug)]
pub struct JudgmentEngine {
    note_speed: f64,
    judgment_y: f64,
    score: u64,
    combo: u32,
    max_combo: u32,
    counts: JudgmentCounts,
    active: Vec<ActiveNote>,
    spawned: usize,
    resolved: usize,
}

impl JudgmentEngine {
    pub fn new(note_speed: f64, judgment_y: f64) -> Self {
        Self {
            note_speed,
            judgment_y,
            score: 0,
            combo: 0,
            max_combo: 0,
            counts: JudgmentCounts::default(),
            active: Vec::new(),
            spawned: 0,
            resolved: 0,
        }
    }

    /// The host may move the line on resize.
    pub fn set_judgment_y(&mut self, judgment_y: f64) {
        self.judgment_y = judgment_y;
    }

    /// Load every chart note as pending, replacing whatever was active.
    pub fn spawn(&mut self, chart: &Chart, sink: &mut impl EventSink) {
        self.active = chart
            .notes
            .iter()
            .enumerate()
            .map(|(id, note)| ActiveNote {
                id,
                note: note.clone(),
                y: OFFSCREEN_Y,
                state: NoteState::Pending,
            })
            .collect();
        self.spawned = self.active.len();
        self.resolved = 0;
        for n in &self.active {
            sink.emit(EngineEvent::Spawned {
                note: n.id,
                lane: n.note.lane,
                kind: n.note.kind,
                duration: n.note.duration,
            });
        }
        debug!("spawned {} notes", self.spawned);
    }

    /// Render y of a note due at `note_time`. Equals the judgment line exactly
    /// when `current_time == note_time`; notes not yet due sit on the far side
    /// and close in as time advances.
    pub fn position_for(&self, note_time: f64, current_time: f64) -> f64 {
        self.judgment_y + (current_time - note_time) * PIXELS_PER_SECOND * self.note_speed
    }

    /// One frame: reposition pending notes, expire the ones past the POOR
    /// window, prune everything resolved.
    pub fn advance(&mut self, current_time: f64, sink: &mut impl EventSink) {
        for idx in 0..self.active.len() {
            if !self.active[idx].is_pending() {
                continue;
            }
            let note_time = self.active[idx].note.time;
            let y = self.position_for(note_time, current_time);
            self.active[idx].y = y;
            sink.emit(EngineEvent::PositionUpdated {
                note: self.active[idx].id,
                y,
            });

            let late = timing_error(current_time, note_time);
            if late > POOR_WINDOW_S {
                self.resolve(idx, JudgmentTier::Poor, late, Resolution::Missed, sink);
            }
        }
        self.active.retain(ActiveNote::is_pending);
    }

    /// Judge a lane press. Takes the earliest pending note on `lane` inside
    /// the POOR window; a press with no such note does nothing.
    pub fn on_key_press(
        &mut self,
        lane: u8,
        current_time: f64,
        sink: &mut impl EventSink,
    ) -> Option<Judgment> {
        let (idx, tier, error) = self.active.iter().enumerate().find_map(|(idx, n)| {
            if !n.is_pending() || n.note.lane != lane {
                return None;
            }
            let error = timing_error(current_time, n.note.time);
            judge(error).map(|tier| (idx, tier, error))
        })?;
        Some(self.resolve(idx, tier, error, Resolution::Hit, sink))
    }

    fn resolve(
        &mut self,
        idx: usize,
        tier: JudgmentTier,
        error_s: f64,
        resolution: Resolution,
        sink: &mut impl EventSink,
    ) -> Judgment {
        let score_delta = tier.points();
        self.score += u64::from(score_delta);
        if tier.keeps_combo() {
            self.combo += 1;
            self.max_combo = self.max_combo.max(self.combo);
        } else {
            self.combo = 0;
        }
        self.counts.record(tier, resolution);
        self.resolved += 1;

        let active = &mut self.active[idx];
        active.state = match resolution {
            Resolution::Hit => NoteState::Hit,
            Resolution::Missed => NoteState::Missed,
        };
        let judgment = Judgment {
            note: active.id,
            lane: active.note.lane,
            tier,
            error_s,
            score_delta,
            new_score: self.score,
            new_combo: self.combo,
        };
        debug!(
            "note {} lane {}: {} ({:+.3}s) score={} combo={}",
            judgment.note,
            judgment.lane,
            tier.label(),
            error_s,
            self.score,
            self.combo
        );
        sink.emit(EngineEvent::Judged(judgment));
        sink.emit(EngineEvent::Retired {
            note: judgment.note,
            resolution,
        });
        judgment
    }

    /// Zero the score state and drop all notes. Only between runs.
    pub fn reset(&mut self) {
        self.score = 0;
        self.combo = 0;
        self.max_combo = 0;
        self.counts = JudgmentCounts::default();
        self.clear_active();
    }

    /// Drop all notes but keep the score state for the result display.
    pub fn clear_active(&mut self) {
        self.active.clear();
        self.spawned = 0;
        self.resolved = 0;
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    pub fn max_combo(&self) -> u32 {
        self.max_combo
    }

    pub fn counts(&self) -> JudgmentCounts {
        self.counts
    }

    pub fn active_notes(&self) -> &[ActiveNote] {
        &self.active
    }

    /// All spawned notes resolved.
    pub fn is_finished(&self) -> bool {
        self.resolved >= self.spawned
    }
}
