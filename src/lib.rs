//! Tapbeat core crate.
//!
//! Two halves share one chart format: the editor records taps against a song
//! and turns them into BEGINNER/NORMAL/HYPER/ANOTHER charts, and the player
//! scrolls a chart across six key lanes plus a scratch lane and grades each
//! press against fixed timing windows.
//!
//! Everything except `web` is plain Rust driven by explicit timestamps, so
//! it runs (and is tested) natively; `web` is the wasm host glue.

use wasm_bindgen::prelude::*;

pub mod chart;
pub mod error;
pub mod generator;
pub mod judge;
pub mod logging;
pub mod rng;
pub mod session;
pub mod web;

pub use chart::{Chart, ChartSet, Difficulty, Note, NoteKind};
pub use error::{ChartError, GenerateError, SessionError};
pub use generator::{DifficultyConfig, DifficultyConfigs, Recorder, SongInfo};
pub use judge::{EngineEvent, EventSink, Judgment, JudgmentEngine, JudgmentTier};
pub use session::{InputEvent, KeyEdge, PlayConfig, PlaySession};

// Optional small allocator for size (feature gated)
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn wasm_start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    logging::init(log::LevelFilter::Info);
}
