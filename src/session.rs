//! Play-session lifecycle around the judgment engine.
//!
//! The session owns the clock origin. Starting goes through a short countdown,
//! then waits (bounded) for the host to report that audio playback really
//! began; only then is `startTime` fixed and the chart spawned, so judgment
//! timing is always relative to actual playback.
//!
//! Every entry point takes the host's monotonic `now_ms` captured when the
//! frame or input event was handled.

use std::collections::HashMap;

use log::{info, warn};
use serde::Deserialize;

use crate::chart::{Chart, ChartSet};
use crate::error::{ChartError, SessionError};
use crate::judge::{EventSink, Judgment, JudgmentEngine};

/// Monotonic host clock in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Tunables the host may override, e.g. from a JSON settings blob.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayConfig {
    pub note_speed: f64,
    /// Judgment line y in host render coordinates.
    pub judgment_y: f64,
    pub start_delay_ms: f64,
    pub audio_timeout_ms: f64,
    /// Keyboard `key` (lower-case) to lane.
    pub key_map: HashMap<String, u8>,
}

impl Default for PlayConfig {
    fn default() -> Self {
        let key_map = [("a", 0), ("s", 1), ("d", 2), ("g", 3), ("h", 4), ("j", 5)]
            .into_iter()
            .map(|(k, lane)| (k.to_string(), lane))
            .collect();
        Self {
            note_speed: 3.0,
            judgment_y: 600.0,
            start_delay_ms: 1_000.0,
            audio_timeout_ms: 10_000.0,
            key_map,
        }
    }
}

impl PlayConfig {
    /// Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Whether settings text names `judgment_y` explicitly (as opposed to
    /// taking the default).
    pub fn sets_judgment_y(text: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(text)
            .map(|v| v.get("judgment_y").is_some())
            .unwrap_or(false)
    }

    pub fn lane_for_key(&self, key: &str) -> Option<u8> {
        self.key_map.get(&key.to_lowercase()).copied()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Phase {
    Idle,
    Countdown { until_ms: f64 },
    AwaitingAudio { since_ms: f64, deadline_ms: f64 },
    Playing { start_ms: f64 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyEdge {
    Down,
    Up,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputEvent {
    pub lane: u8,
    pub edge: KeyEdge,
}

pub struct PlaySession {
    config: PlayConfig,
    charts: ChartSet,
    chart: Option<Chart>,
    engine: JudgmentEngine,
    phase: Phase,
}

impl PlaySession {
    pub fn new(config: PlayConfig) -> Self {
        let engine = JudgmentEngine::new(config.note_speed, config.judgment_y);
        Self {
            config,
            charts: ChartSet::new(),
            chart: None,
            engine,
            phase: Phase::Idle,
        }
    }

    pub fn config(&self) -> &PlayConfig {
        &self.config
    }

    pub fn engine(&self) -> &JudgmentEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut JudgmentEngine {
        &mut self.engine
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn chart(&self) -> Option<&Chart> {
        self.chart.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.phase, Phase::Playing { .. })
    }

    /// True from `begin` until stop/abort.
    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Parse chart text and make it the next chart to play. A running session
    /// keeps its chart until it is stopped.
    pub fn load_chart(&mut self, text: &str) -> Result<&Chart, SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        let chart = Chart::from_json(text)?;
        info!(
            "chart loaded: {} - {} [{} Lv.{}], {} notes",
            chart.title,
            chart.artist,
            chart.difficulty.name,
            chart.difficulty.level,
            chart.notes.len()
        );
        Ok(&*self.chart.insert(chart))
    }

    /// Replace the custom chart set with `texts`, one chart file each. Files
    /// that fail are reported in their slot; the rest still load.
    pub fn load_charts<'a>(
        &mut self,
        texts: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<Result<String, ChartError>>, SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        self.charts.clear();
        let results = self.charts.load_all(texts);
        for (i, result) in results.iter().enumerate() {
            if let Err(e) = result {
                warn!("chart file {i} skipped: {e}");
            }
        }
        info!("{} custom charts loaded", self.charts.len());
        Ok(results)
    }

    /// Carry a chart set over, e.g. into a session rebuilt with new settings.
    pub fn set_charts(&mut self, charts: ChartSet) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        self.charts = charts;
        Ok(())
    }

    pub fn charts(&self) -> &ChartSet {
        &self.charts
    }

    /// Make the set's chart for `difficulty` the next chart to play.
    pub fn select(&mut self, difficulty: &str) -> Result<&Chart, SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        let chart = self
            .charts
            .get(difficulty)
            .cloned()
            .ok_or_else(|| SessionError::MissingDifficulty(difficulty.to_lowercase()))?;
        info!(
            "selected {} [{} Lv.{}], {} notes",
            chart.title,
            chart.difficulty.name,
            chart.difficulty.level,
            chart.notes.len()
        );
        Ok(&*self.chart.insert(chart))
    }

    pub fn set_chart(&mut self, chart: Chart) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        self.chart = Some(chart);
        Ok(())
    }

    /// Reset scoring and start the pre-roll countdown.
    pub fn begin(&mut self, now_ms: f64) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        if self.chart.is_none() {
            return Err(SessionError::NoChart);
        }
        self.engine.reset();
        self.phase = Phase::Countdown {
            until_ms: now_ms + self.config.start_delay_ms,
        };
        info!("session starting in {:.0} ms", self.config.start_delay_ms);
        Ok(())
    }

    /// Host asks this each frame to know when to call `play()` on its audio.
    pub fn wants_playback(&self) -> bool {
        matches!(self.phase, Phase::AwaitingAudio { .. })
    }

    /// Playback began: fix the clock origin and spawn the chart.
    ///
    /// `startTime = now - offset`, so session time 0 is the chart's time 0.
    /// Ignored outside the audio-wait phase.
    pub fn audio_started(&mut self, now_ms: f64, sink: &mut impl EventSink) -> bool {
        if !self.wants_playback() {
            return false;
        }
        let Some(chart) = self.chart.as_ref() else {
            return false;
        };
        let start_ms = now_ms - chart.offset * 1000.0;
        self.engine.spawn(chart, sink);
        self.phase = Phase::Playing { start_ms };
        info!("playback started; clock origin {:.1} ms", start_ms);
        true
    }

    /// Host's play() was rejected. Back to idle.
    pub fn audio_failed(&mut self) -> SessionError {
        warn!("audio playback failed; session aborted");
        self.abort();
        SessionError::AudioFailed
    }

    /// Session time in seconds for a host timestamp, if playing.
    pub fn current_time(&self, now_ms: f64) -> Option<f64> {
        match self.phase {
            Phase::Playing { start_ms } => Some((now_ms - start_ms) / 1000.0),
            _ => None,
        }
    }

    /// Per-frame driver. Irregular intervals are fine: everything derives
    /// from `now_ms`.
    pub fn tick(&mut self, now_ms: f64, sink: &mut impl EventSink) -> Result<(), SessionError> {
        match self.phase {
            Phase::Idle => {}
            Phase::Countdown { until_ms } => {
                if now_ms >= until_ms {
                    self.phase = Phase::AwaitingAudio {
                        since_ms: now_ms,
                        deadline_ms: now_ms + self.config.audio_timeout_ms,
                    };
                }
            }
            Phase::AwaitingAudio {
                since_ms,
                deadline_ms,
            } => {
                if now_ms >= deadline_ms {
                    warn!("audio not ready after {:.0} ms; session aborted", now_ms - since_ms);
                    self.abort();
                    return Err(SessionError::AudioTimeout {
                        waited_ms: now_ms - since_ms,
                    });
                }
            }
            Phase::Playing { start_ms } => {
                self.engine.advance((now_ms - start_ms) / 1000.0, sink);
            }
        }
        Ok(())
    }

    /// Route one input event. Only key-down while playing is judged; the
    /// session time is taken from this event's own timestamp.
    pub fn input(
        &mut self,
        event: InputEvent,
        now_ms: f64,
        sink: &mut impl EventSink,
    ) -> Option<Judgment> {
        if event.edge != KeyEdge::Down {
            return None;
        }
        let current_time = self.current_time(now_ms)?;
        self.engine.on_key_press(event.lane, current_time, sink)
    }

    /// Stop immediately. Safe to call any number of times.
    pub fn stop(&mut self) {
        if self.phase != Phase::Idle {
            info!(
                "session stopped: score {} max combo {}",
                self.engine.score(),
                self.engine.max_combo()
            );
        }
        self.abort();
    }

    /// Every note of the chart resolved while playing.
    pub fn is_complete(&self) -> bool {
        self.is_playing() && self.engine.is_finished()
    }

    fn abort(&mut self) {
        self.phase = Phase::Idle;
        self.engine.clear_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::{EngineEvent, JudgmentTier, NullSink};

    const CHART: &str = r#"{"title":"T","artist":"A","bpm":150,"offset":0.5,
        "audioFile":"assets/sounds/t.mp3","difficulty":{"name":"NORMAL","level":5},
        "notes":[{"time":1.0,"lane":0,"type":"tap"},{"time":2.0,"lane":1,"type":"tap"}]}"#;

    fn down(lane: u8) -> InputEvent {
        InputEvent {
            lane,
            edge: KeyEdge::Down,
        }
    }

    fn playing_session() -> PlaySession {
        let mut s = PlaySession::new(PlayConfig::default());
        s.load_chart(CHART).unwrap();
        s.begin(0.0).unwrap();
        s.tick(1_000.0, &mut NullSink).unwrap();
        assert!(s.wants_playback());
        assert!(s.audio_started(1_200.0, &mut NullSink));
        s
    }

    #[test]
    fn test_begin_requires_chart() {
        let mut s = PlaySession::new(PlayConfig::default());
        assert!(matches!(s.begin(0.0), Err(SessionError::NoChart)));
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_bad_chart_does_not_load() {
        let mut s = PlaySession::new(PlayConfig::default());
        assert!(matches!(s.load_chart("[]"), Err(SessionError::Chart(_))));
        assert!(s.chart().is_none());
    }

    #[test]
    fn test_clock_starts_at_playback_with_offset() {
        let s = playing_session();
        // origin = 1200 - 500
        assert_eq!(s.phase(), Phase::Playing { start_ms: 700.0 });
        assert_eq!(s.current_time(1_700.0), Some(1.0));
        assert_eq!(s.engine().active_notes().len(), 2);
    }

    #[test]
    fn test_countdown_and_audio_wait_ignore_input() {
        let mut s = PlaySession::new(PlayConfig::default());
        s.load_chart(CHART).unwrap();
        s.begin(0.0).unwrap();
        assert!(!s.wants_playback());
        assert!(!s.audio_started(10.0, &mut NullSink));
        assert!(s.input(down(0), 500.0, &mut NullSink).is_none());
        s.tick(999.0, &mut NullSink).unwrap();
        assert!(!s.wants_playback());
        s.tick(1_000.0, &mut NullSink).unwrap();
        assert!(s.input(down(0), 1_500.0, &mut NullSink).is_none());
        assert!(s.engine().active_notes().is_empty());
    }

    #[test]
    fn test_audio_timeout_rolls_back() {
        let mut s = PlaySession::new(PlayConfig::default());
        s.load_chart(CHART).unwrap();
        s.begin(0.0).unwrap();
        s.tick(1_000.0, &mut NullSink).unwrap();
        s.tick(10_999.0, &mut NullSink).unwrap();
        let err = s.tick(11_000.0, &mut NullSink).unwrap_err();
        assert!(matches!(err, SessionError::AudioTimeout { waited_ms } if waited_ms == 10_000.0));
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.begin(20_000.0).is_ok());
    }

    #[test]
    fn test_audio_failure_rolls_back() {
        let mut s = PlaySession::new(PlayConfig::default());
        s.load_chart(CHART).unwrap();
        s.begin(0.0).unwrap();
        s.tick(1_000.0, &mut NullSink).unwrap();
        assert!(matches!(s.audio_failed(), SessionError::AudioFailed));
        assert!(!s.is_running());
    }

    #[test]
    fn test_input_judged_at_event_time() {
        let mut s = playing_session();
        // note at 1.0s session time -> host 1700 ms; press 50 ms late
        let j = s.input(down(0), 1_750.0, &mut NullSink).unwrap();
        assert_eq!(j.tier, JudgmentTier::Perfect);
        let up = InputEvent {
            lane: 1,
            edge: KeyEdge::Up,
        };
        assert!(s.input(up, 2_700.0, &mut NullSink).is_none());
    }

    #[test]
    fn test_tick_expires_notes_and_completes() {
        let mut s = playing_session();
        let mut events: Vec<EngineEvent> = Vec::new();
        s.tick(2_000.0, &mut events).unwrap(); // 1.3s: still in window
        assert_eq!(s.engine().score(), 0);
        s.tick(4_000.0, &mut events).unwrap(); // 3.3s: both missed
        assert_eq!(s.engine().score(), 100);
        assert!(s.is_complete());
    }

    #[test]
    fn test_stop_is_idempotent_and_silences() {
        let mut s = playing_session();
        s.stop();
        s.stop();
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.engine().active_notes().is_empty());
        let mut events: Vec<EngineEvent> = Vec::new();
        s.tick(9_000.0, &mut events).unwrap();
        assert!(s.input(down(0), 1_700.0, &mut events).is_none());
        assert!(events.is_empty());
    }

    #[test]
    fn test_cannot_swap_chart_while_running() {
        let mut s = playing_session();
        assert!(matches!(s.load_chart(CHART), Err(SessionError::AlreadyRunning)));
        assert!(matches!(s.begin(0.0), Err(SessionError::AlreadyRunning)));
    }

    #[test]
    fn test_chart_set_partial_failure_and_selection() {
        let mut s = PlaySession::new(PlayConfig::default());
        let hyper = CHART.replace("NORMAL", "HYPER");
        let results = s.load_charts([CHART, "{not json", hyper.as_str()]).unwrap();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ChartError::Malformed(_))));
        assert!(results[2].is_ok());
        assert_eq!(s.charts().len(), 2);

        let chart = s.select("Hyper").unwrap();
        assert_eq!(chart.difficulty.name, "HYPER");
        assert!(s.begin(0.0).is_ok());
    }

    #[test]
    fn test_select_missing_tier() {
        let mut s = PlaySession::new(PlayConfig::default());
        s.load_charts([CHART]).unwrap();
        let err = s.select("ANOTHER").unwrap_err();
        assert!(matches!(err, SessionError::MissingDifficulty(ref d) if d == "another"));
        assert!(s.chart().is_none());
        assert!(matches!(s.begin(0.0), Err(SessionError::NoChart)));
    }

    #[test]
    fn test_reloading_charts_replaces_the_set() {
        let mut s = PlaySession::new(PlayConfig::default());
        s.load_charts([CHART]).unwrap();
        s.load_charts([CHART.replace("NORMAL", "BEGINNER").as_str()]).unwrap();
        assert!(s.charts().get("normal").is_none());
        assert!(s.select("beginner").is_ok());
    }

    #[test]
    fn test_config_from_json_and_keys() {
        let cfg = PlayConfig::from_json(r#"{"note_speed": 5.0}"#).unwrap();
        assert_eq!(cfg.note_speed, 5.0);
        assert_eq!(cfg.audio_timeout_ms, 10_000.0);
        assert_eq!(cfg.lane_for_key("J"), Some(5));
        assert_eq!(cfg.lane_for_key("f"), None);
        assert!(!PlayConfig::sets_judgment_y(r#"{"note_speed": 5.0}"#));
        assert!(PlayConfig::sets_judgment_y(r#"{"judgment_y": 480}"#));
        assert!(!PlayConfig::sets_judgment_y("not json"));
    }
}
