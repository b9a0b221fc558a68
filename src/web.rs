//! Browser host: wires the session and recorder to the page.
//!
//! Expected markup:
//! `.lane[data-lane=N]` columns, `#score-value`, `#combo-value`,
//! `#judge-display`, `#start-btn`, `#stop-btn`, and for the editor
//! `#recorded-count`, `#last-tap`, `#generation-status`.
//!
//! Audio stays in JS: the page polls `game_wants_playback()`, calls
//! `audio.play()` and reports back through `audio_started()` /
//! `audio_failed()`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use log::{error, info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, KeyboardEvent, window};

use crate::chart::{Chart, Difficulty, NoteKind};
use crate::generator::{self, ChartSummary, DifficultyConfigs, Recorder, SongInfo};
use crate::judge::{EngineEvent, EventSink, NoteId};
use crate::rng::StdRandom;
use crate::session::{Clock, InputEvent, KeyEdge, PlayConfig, PlaySession};

const JUDGE_FLASH_MS: f64 = 500.0;
const NOTE_HEIGHT_PX: f64 = 30.0;
const HOLD_PX_PER_SECOND: f64 = 200.0;
/// Distance from the viewport bottom to the judgment line.
const JUDGMENT_LINE_MARGIN_PX: f64 = 100.0;

/// `performance.now()`.
pub struct PerformanceClock;

impl Clock for PerformanceClock {
    fn now_ms(&self) -> f64 {
        window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or(0.0)
    }
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn document() -> Result<Document, JsValue> {
    window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("no document"))
}

fn set_text(doc: &Document, id: &str, text: &str) {
    if let Some(el) = doc.get_element_by_id(id) {
        el.set_text_content(Some(text));
    }
}

fn set_disabled(doc: &Document, id: &str, disabled: bool) {
    if let Some(el) = doc.get_element_by_id(id) {
        if disabled {
            el.set_attribute("disabled", "").ok();
        } else {
            el.remove_attribute("disabled").ok();
        }
    }
}

// --- Rendering sink ----------------------------------------------------------

/// Mirrors engine events into note `div`s and the score/combo/judge overlays.
struct DomSink {
    doc: Document,
    notes: HashMap<NoteId, Element>,
    judgment_y: f64,
    now_ms: f64,
    judge_shown_at: Option<f64>,
}

impl DomSink {
    fn new(doc: Document, judgment_y: f64) -> Self {
        Self {
            doc,
            notes: HashMap::new(),
            judgment_y,
            now_ms: 0.0,
            judge_shown_at: None,
        }
    }

    fn note_style(&self, bottom_px: f64, height_px: f64) -> String {
        format!(
            "position:absolute; bottom:{bottom_px:.1}px; width:100%; height:{height_px:.0}px; \
             background-color:#fff; border:2px solid #fff; \
             box-shadow:0 0 10px rgba(255,255,255,0.5); z-index:15;"
        )
    }

    fn spawn_note(&mut self, id: NoteId, lane: u8, kind: NoteKind, duration: f64) {
        let selector = format!(".lane[data-lane=\"{lane}\"]");
        let Ok(Some(lane_el)) = self.doc.query_selector(&selector) else {
            warn!("no lane element for lane {lane}; note {id} not drawn");
            return;
        };
        let Ok(el) = self.doc.create_element("div") else {
            return;
        };
        let mut class = String::from("note");
        if lane >= crate::chart::SCRATCH_LANE || kind == NoteKind::Scratch {
            class.push_str(" scratch-note");
        }
        let height = if kind == NoteKind::Hold {
            class.push_str(" hold");
            duration * HOLD_PX_PER_SECOND
        } else {
            NOTE_HEIGHT_PX
        };
        el.set_class_name(&class);
        el.set_attribute("style", &self.note_style(-50.0, height)).ok();
        el.set_attribute("data-height", &format!("{height:.0}")).ok();
        if lane_el.append_child(&el).is_ok() {
            self.notes.insert(id, el);
        }
    }

    fn move_note(&self, id: NoteId, y: f64) {
        if let Some(el) = self.notes.get(&id) {
            let height = el
                .get_attribute("data-height")
                .and_then(|h| h.parse::<f64>().ok())
                .unwrap_or(NOTE_HEIGHT_PX);
            el.set_attribute("style", &self.note_style(self.judgment_y - y, height))
                .ok();
        }
    }

    fn clear_notes(&mut self) {
        for (_, el) in self.notes.drain() {
            el.remove();
        }
    }

    /// Blank the judge overlay once it has been up long enough.
    fn expire_judge_flash(&mut self) {
        if let Some(shown) = self.judge_shown_at {
            if self.now_ms - shown >= JUDGE_FLASH_MS {
                if let Some(el) = self.doc.get_element_by_id("judge-display") {
                    el.set_text_content(Some(""));
                    el.set_class_name("");
                }
                self.judge_shown_at = None;
            }
        }
    }
}

impl EventSink for DomSink {
    fn emit(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Spawned {
                note,
                lane,
                kind,
                duration,
            } => self.spawn_note(note, lane, kind, duration),
            EngineEvent::PositionUpdated { note, y } => self.move_note(note, y),
            EngineEvent::Judged(j) => {
                set_text(&self.doc, "score-value", &j.new_score.to_string());
                set_text(&self.doc, "combo-value", &j.new_combo.to_string());
                if let Some(el) = self.doc.get_element_by_id("judge-display") {
                    el.set_text_content(Some(j.tier.label()));
                    el.set_class_name(&format!("judge-{}", j.tier.label().to_lowercase()));
                }
                self.judge_shown_at = Some(self.now_ms);
            }
            EngineEvent::Retired { note, .. } => {
                if let Some(el) = self.notes.remove(&note) {
                    el.remove();
                }
            }
        }
    }
}

// --- Host state --------------------------------------------------------------

struct GameHost {
    session: PlaySession,
    sink: DomSink,
    frame_loop: bool,
    /// Set when the page configured `judgment_y`; otherwise it tracks the
    /// viewport at each start.
    fixed_judgment_y: bool,
}

#[derive(Default)]
struct EditorHost {
    recorder: Recorder,
    charts: Vec<Chart>,
}

thread_local! {
    static GAME: RefCell<Option<GameHost>> = const { RefCell::new(None) };
    static EDITOR: RefCell<EditorHost> = RefCell::new(EditorHost::default());
    static LISTENERS: Cell<bool> = const { Cell::new(false) };
}

fn with_game<R>(f: impl FnOnce(&mut GameHost) -> R) -> Result<R, JsValue> {
    GAME.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            let doc = document()?;
            let config = PlayConfig::default();
            let sink = DomSink::new(doc, config.judgment_y);
            *slot = Some(GameHost {
                session: PlaySession::new(config),
                sink,
                frame_loop: false,
                fixed_judgment_y: false,
            });
        }
        match slot.as_mut() {
            Some(host) => Ok(f(host)),
            None => Err(JsValue::from_str("game host unavailable")),
        }
    })
}

fn viewport_judgment_y() -> Option<f64> {
    window()
        .and_then(|w| w.inner_height().ok())
        .and_then(|h| h.as_f64())
        .map(|h| h - JUDGMENT_LINE_MARGIN_PX)
}

fn reset_overlays(doc: &Document) {
    set_text(doc, "score-value", "0");
    set_text(doc, "combo-value", "0");
}

fn show_idle_buttons(doc: &Document) {
    set_disabled(doc, "start-btn", false);
    set_disabled(doc, "stop-btn", true);
}

// --- Game exports ------------------------------------------------------------

/// Replace the play settings (JSON, see `PlayConfig`). Only while idle.
///
/// A `judgment_y` given here pins the judgment line; without one the line
/// follows the viewport height.
#[wasm_bindgen]
pub fn set_play_config(json: &str) -> Result<(), JsValue> {
    let config = PlayConfig::from_json(json).map_err(js_err)?;
    let fixed_judgment_y = PlayConfig::sets_judgment_y(json);
    with_game(|host| {
        if host.session.is_running() {
            return Err(JsValue::from_str("cannot change settings while playing"));
        }
        let chart = host.session.chart().cloned();
        let charts = host.session.charts().clone();
        host.sink.judgment_y = config.judgment_y;
        host.fixed_judgment_y = fixed_judgment_y;
        host.session = PlaySession::new(config);
        host.session.set_charts(charts).map_err(js_err)?;
        if let Some(chart) = chart {
            host.session.set_chart(chart).map_err(js_err)?;
        }
        Ok(())
    })?
}

#[wasm_bindgen]
pub fn load_chart(json: &str) -> Result<(), JsValue> {
    with_game(|host| host.session.load_chart(json).map(|_| ()).map_err(js_err))?
}

/// Load custom chart files (one JSON text each), replacing the previous set.
/// Returns one entry per file: the difficulty it was stored under, or the
/// reason it was skipped.
#[wasm_bindgen]
pub fn load_custom_charts(texts: Vec<String>) -> Result<Vec<String>, JsValue> {
    let results = with_game(|host| {
        host.session
            .load_charts(texts.iter().map(String::as_str))
            .map_err(js_err)
    })??;
    Ok(results
        .into_iter()
        .map(|r| match r {
            Ok(difficulty) => difficulty,
            Err(e) => format!("error: {e}"),
        })
        .collect())
}

/// Pick the custom chart for `difficulty` as the next chart to play.
#[wasm_bindgen]
pub fn select_difficulty(difficulty: &str) -> Result<(), JsValue> {
    with_game(|host| host.session.select(difficulty).map(|_| ()).map_err(js_err))?
}

#[wasm_bindgen]
pub fn loaded_difficulties() -> Vec<String> {
    with_game(|host| host.session.charts().difficulties().map(String::from).collect())
        .unwrap_or_default()
}

#[wasm_bindgen]
pub fn start_game() -> Result<(), JsValue> {
    install_listeners()?;
    let now = PerformanceClock.now_ms();
    let start_loop = with_game(|host| {
        if !host.fixed_judgment_y {
            if let Some(y) = viewport_judgment_y() {
                host.session.engine_mut().set_judgment_y(y);
                host.sink.judgment_y = y;
            }
        }
        host.sink.clear_notes();
        host.session.begin(now).map_err(js_err)?;
        reset_overlays(&host.sink.doc);
        set_disabled(&host.sink.doc, "start-btn", true);
        set_disabled(&host.sink.doc, "stop-btn", false);
        let start = !host.frame_loop;
        host.frame_loop = true;
        Ok::<bool, JsValue>(start)
    })??;
    if start_loop {
        start_frame_loop();
    }
    Ok(())
}

/// Idempotent. The frame loop notices on its next callback and ends.
#[wasm_bindgen]
pub fn stop_game() {
    let _ = with_game(|host| {
        host.session.stop();
        host.sink.clear_notes();
        show_idle_buttons(&host.sink.doc);
    });
}

#[wasm_bindgen]
pub fn game_wants_playback() -> bool {
    with_game(|host| host.session.wants_playback()).unwrap_or(false)
}

/// Called by the page once `audio.play()` resolved.
#[wasm_bindgen]
pub fn audio_started() -> bool {
    let now = PerformanceClock.now_ms();
    with_game(|host| {
        host.sink.now_ms = now;
        host.session.audio_started(now, &mut host.sink)
    })
    .unwrap_or(false)
}

/// Called by the page when `audio.play()` rejected.
#[wasm_bindgen]
pub fn audio_failed() -> JsValue {
    with_game(|host| {
        let err = host.session.audio_failed();
        host.sink.clear_notes();
        show_idle_buttons(&host.sink.doc);
        js_err(err)
    })
    .unwrap_or(JsValue::NULL)
}

/// On-screen key press (mouse/touch).
#[wasm_bindgen]
pub fn press_lane(lane: u8) {
    lane_input(lane, KeyEdge::Down, PerformanceClock.now_ms());
}

#[wasm_bindgen]
pub fn release_lane(lane: u8) {
    lane_input(lane, KeyEdge::Up, PerformanceClock.now_ms());
}

#[wasm_bindgen]
pub fn game_score() -> f64 {
    with_game(|host| host.session.engine().score() as f64).unwrap_or(0.0)
}

#[wasm_bindgen]
pub fn game_max_combo() -> u32 {
    with_game(|host| host.session.engine().max_combo()).unwrap_or(0)
}

fn lane_input(lane: u8, edge: KeyEdge, now: f64) {
    let _ = with_game(|host| {
        set_key_active(&host.sink.doc, lane, edge == KeyEdge::Down);
        host.sink.now_ms = now;
        host.session
            .input(InputEvent { lane, edge }, now, &mut host.sink)
    });
}

fn set_key_active(doc: &Document, lane: u8, active: bool) {
    let selector = format!(".key[data-key=\"{lane}\"]");
    if let Ok(Some(el)) = doc.query_selector(&selector) {
        let class = el.class_name();
        let mut classes: Vec<&str> = class.split_whitespace().filter(|c| *c != "active").collect();
        if active {
            classes.push("active");
        }
        el.set_class_name(&classes.join(" "));
    }
}

type FrameCallback = Closure<dyn FnMut(f64)>;

thread_local! {
    // Created on first start and reused; a stopped session just stops
    // rescheduling it.
    static FRAME: RefCell<Option<FrameCallback>> = const { RefCell::new(None) };
}

fn request_frame() {
    FRAME.with(|slot| {
        if let (Some(w), Some(cb)) = (window(), slot.borrow().as_ref()) {
            let _ = w.request_animation_frame(cb.as_ref().unchecked_ref());
        }
    });
}

fn start_frame_loop() {
    FRAME.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(Closure::wrap(Box::new(move |ts: f64| {
                if frame(ts) {
                    request_frame();
                }
            }) as Box<dyn FnMut(f64)>));
        }
    });
    request_frame();
}

/// One animation frame. Returns whether another frame is wanted.
fn frame(now: f64) -> bool {
    with_game(|host| {
        host.sink.now_ms = now;
        if let Err(e) = host.session.tick(now, &mut host.sink) {
            error!("{e}");
            host.sink.clear_notes();
            show_idle_buttons(&host.sink.doc);
        }
        host.sink.expire_judge_flash();
        if host.session.is_complete() {
            let counts = host.session.engine().counts();
            info!(
                "chart complete: {} perfect, {} great, {} good, {} bad, {} poor, {} miss",
                counts.perfect, counts.great, counts.good, counts.bad, counts.poor, counts.miss
            );
            // Score and combo stay on screen; stop only drops the notes.
            host.session.stop();
            show_idle_buttons(&host.sink.doc);
        }
        host.frame_loop = host.session.is_running();
        host.frame_loop
    })
    .unwrap_or(false)
}

// --- Keyboard ----------------------------------------------------------------

fn install_listeners() -> Result<(), JsValue> {
    if LISTENERS.with(|l| l.replace(true)) {
        return Ok(());
    }
    let doc = document()?;
    let keydown = Closure::wrap(Box::new(move |evt: KeyboardEvent| {
        let now = PerformanceClock.now_ms();
        if evt.code() == "Space" && EDITOR.with(|e| e.borrow().recorder.is_recording()) {
            evt.prevent_default();
            editor_record_tap(now);
            return;
        }
        if let Some(lane) = key_lane(&evt.key()) {
            evt.prevent_default();
            lane_input(lane, KeyEdge::Down, now);
        }
    }) as Box<dyn FnMut(_)>);
    doc.add_event_listener_with_callback("keydown", keydown.as_ref().unchecked_ref())?;
    keydown.forget();

    let keyup = Closure::wrap(Box::new(move |evt: KeyboardEvent| {
        if let Some(lane) = key_lane(&evt.key()) {
            evt.prevent_default();
            lane_input(lane, KeyEdge::Up, PerformanceClock.now_ms());
        }
    }) as Box<dyn FnMut(_)>);
    doc.add_event_listener_with_callback("keyup", keyup.as_ref().unchecked_ref())?;
    keyup.forget();
    Ok(())
}

fn key_lane(key: &str) -> Option<u8> {
    with_game(|host| host.session.config().lane_for_key(key))
        .ok()
        .flatten()
}

// --- Editor exports ----------------------------------------------------------

/// Song metadata as JSON (`SongInfo`: title, artist, bpm, offset, audioFile).
#[wasm_bindgen]
pub fn editor_set_song(json: &str) -> Result<(), JsValue> {
    let song: SongInfo = serde_json::from_str(json).map_err(js_err)?;
    EDITOR.with(|e| e.borrow_mut().recorder.song = song);
    Ok(())
}

#[wasm_bindgen]
pub fn editor_start_recording() -> Result<(), JsValue> {
    install_listeners()?;
    let now = PerformanceClock.now_ms();
    EDITOR.with(|e| e.borrow_mut().recorder.start(now)).map_err(js_err)?;
    if let Ok(doc) = document() {
        set_text(&doc, "generation-status", "Recording... tap SPACE on the beat.");
        update_recording_display(&doc, 0, None);
    }
    Ok(())
}

#[wasm_bindgen]
pub fn editor_stop_recording() -> u32 {
    let count = EDITOR.with(|e| e.borrow_mut().recorder.stop());
    if let Ok(doc) = document() {
        set_text(&doc, "generation-status", &format!("Recorded {count} taps."));
    }
    count as u32
}

#[wasm_bindgen]
pub fn editor_clear_recording() {
    EDITOR.with(|e| {
        let mut e = e.borrow_mut();
        e.recorder.clear();
        e.charts.clear();
    });
    if let Ok(doc) = document() {
        update_recording_display(&doc, 0, None);
        set_text(&doc, "generation-status", "Recording cleared.");
    }
}

fn editor_record_tap(now: f64) {
    let tapped = EDITOR.with(|e| {
        let mut e = e.borrow_mut();
        e.recorder
            .tap(now)
            .map(|t| (e.recorder.timings().len(), t))
    });
    if let (Some((count, last)), Ok(doc)) = (tapped, document()) {
        update_recording_display(&doc, count, Some(last));
    }
}

fn update_recording_display(doc: &Document, count: usize, last: Option<f64>) {
    set_text(doc, "recorded-count", &format!("Recorded: {count}"));
    if let Some(t) = last {
        set_text(doc, "last-tap", &format!("Last tap: {t:.3}s"));
    }
}

/// Generate all four tiers. `configs_json` follows `DifficultyConfigs`
/// (missing tiers use defaults); pass a seed for reproducible output.
/// Returns the preview summary.
#[wasm_bindgen]
pub fn editor_generate(configs_json: &str, seed: Option<u32>) -> Result<String, JsValue> {
    let configs: DifficultyConfigs = if configs_json.trim().is_empty() {
        DifficultyConfigs::default()
    } else {
        serde_json::from_str(configs_json).map_err(js_err)?
    };
    let mut rng = match seed {
        Some(s) => StdRandom::seeded(u64::from(s)),
        None => StdRandom::from_entropy(),
    };
    let preview = EDITOR.with(|e| {
        let mut e = e.borrow_mut();
        let charts =
            generator::generate_all(&e.recorder.song, e.recorder.timings(), &configs, &mut rng)?;
        let preview = charts
            .iter()
            .map(|c| ChartSummary::of(c).to_string())
            .collect::<Vec<_>>()
            .join("\n");
        e.charts = charts;
        Ok::<String, crate::error::GenerateError>(preview)
    })
    .map_err(js_err)?;
    if let Ok(doc) = document() {
        set_text(&doc, "generation-status", "Charts generated.");
    }
    Ok(preview)
}

fn generated(difficulty: &str) -> Option<Chart> {
    let wanted = Difficulty::from_name(difficulty)?;
    EDITOR.with(|e| {
        e.borrow()
            .charts
            .iter()
            .find(|c| c.difficulty.name == wanted.name())
            .cloned()
    })
}

/// JSON text of a generated tier, ready to download.
#[wasm_bindgen]
pub fn editor_chart_json(difficulty: &str) -> Result<Option<String>, JsValue> {
    generated(difficulty)
        .map(|c| c.to_json().map_err(js_err))
        .transpose()
}

#[wasm_bindgen]
pub fn editor_chart_file_name(difficulty: &str) -> Option<String> {
    generated(difficulty).map(|c| c.file_name())
}

/// Hand a generated tier straight to the player.
#[wasm_bindgen]
pub fn editor_play_chart(difficulty: &str) -> Result<(), JsValue> {
    let chart = generated(difficulty).ok_or_else(|| JsValue::from_str("chart not generated"))?;
    with_game(|host| host.session.set_chart(chart).map_err(js_err))?
}
