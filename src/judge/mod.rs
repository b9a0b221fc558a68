//! Judgment tiers, timing windows and the events the engine reports.
//!
//! Windows are absolute timing errors in seconds and are fixed: a press is
//! graded by the first window that contains `|press - note.time|`.

mod engine;

pub use engine::{ActiveNote, JudgmentCounts, JudgmentEngine, NoteState};

use crate::chart::NoteKind;

pub const PERFECT_WINDOW_S: f64 = 0.08;
pub const GREAT_WINDOW_S: f64 = 0.12;
pub const GOOD_WINDOW_S: f64 = 0.18;
pub const BAD_WINDOW_S: f64 = 0.25;
/// Widest window; also the auto-miss boundary.
pub const POOR_WINDOW_S: f64 = 0.35;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JudgmentTier {
    Perfect,
    Great,
    Good,
    Bad,
    Poor,
}

impl JudgmentTier {
    pub const ALL: [JudgmentTier; 5] = [
        JudgmentTier::Perfect,
        JudgmentTier::Great,
        JudgmentTier::Good,
        JudgmentTier::Bad,
        JudgmentTier::Poor,
    ];

    pub fn points(self) -> u32 {
        match self {
            JudgmentTier::Perfect => 1000,
            JudgmentTier::Great => 800,
            JudgmentTier::Good => 500,
            JudgmentTier::Bad => 200,
            JudgmentTier::Poor => 50,
        }
    }

    pub fn window_s(self) -> f64 {
        match self {
            JudgmentTier::Perfect => PERFECT_WINDOW_S,
            JudgmentTier::Great => GREAT_WINDOW_S,
            JudgmentTier::Good => GOOD_WINDOW_S,
            JudgmentTier::Bad => BAD_WINDOW_S,
            JudgmentTier::Poor => POOR_WINDOW_S,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            JudgmentTier::Perfect => "PERFECT",
            JudgmentTier::Great => "GREAT",
            JudgmentTier::Good => "GOOD",
            JudgmentTier::Bad => "BAD",
            JudgmentTier::Poor => "POOR",
        }
    }

    /// Only POOR breaks the combo.
    pub fn keeps_combo(self) -> bool {
        self != JudgmentTier::Poor
    }
}

/// Signed `current_time - note_time`, quantized to whole microseconds so a
/// press exactly on a window edge lands inside it (`1.08 - 1.0` is not
/// `0.08` in binary).
pub fn timing_error(current_time: f64, note_time: f64) -> f64 {
    ((current_time - note_time) * 1e6).round() / 1e6
}

/// Tier for a timing error; `None` when outside every window.
pub fn judge(delta_s: f64) -> Option<JudgmentTier> {
    let err = delta_s.abs();
    JudgmentTier::ALL.into_iter().find(|t| err <= t.window_s())
}

/// Index of a note in the chart it was spawned from.
pub type NoteId = usize;

/// How a note left play.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Hit,
    Missed,
}

/// Score outcome of one resolved note.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Judgment {
    pub note: NoteId,
    pub lane: u8,
    pub tier: JudgmentTier,
    /// Signed `current_time - note.time`; positive means late.
    pub error_s: f64,
    pub score_delta: u32,
    pub new_score: u64,
    pub new_combo: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Spawned {
        note: NoteId,
        lane: u8,
        kind: NoteKind,
        duration: f64,
    },
    PositionUpdated {
        note: NoteId,
        y: f64,
    },
    Judged(Judgment),
    Retired {
        note: NoteId,
        resolution: Resolution,
    },
}

/// Receiver for everything the host needs to draw.
pub trait EventSink {
    fn emit(&mut self, event: EngineEvent);
}

impl EventSink for Vec<EngineEvent> {
    fn emit(&mut self, event: EngineEvent) {
        self.push(event);
    }
}

/// Drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: EngineEvent) {}
}
