use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{config::clamp_finite, BeatConfig};

const RECENT_WINDOW: usize = 30;
const MEDIUM_WINDOW: usize = 90;
const AVERAGE_FLOOR: f32 = 0.01;
const HIGH_VARIANCE: f32 = 0.1;
const LOW_VARIANCE: f32 = 0.05;
const QUORUM_RATIO: f32 = 0.4;
const MIN_INTENSITY: f32 = 0.1;
const MAX_INTENSITY: f32 = 10.0;

/// Bounded history of smoothed bass magnitudes, oldest first.
#[derive(Debug, Clone)]
pub struct BassHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl BassHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity, evicting the oldest samples if it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Mean of the newest `min(window, len)` samples.
    pub fn window_average(&self, window: usize) -> f32 {
        let count = window.min(self.samples.len());
        if count == 0 {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().rev().take(count).sum();
        sum / count as f32
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Statistics derived from the bass history for one detection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatStatistics {
    pub current: f32,
    pub recent_average: f32,
    pub medium_average: f32,
    pub overall_average: f32,
    pub variance: f32,
    pub std_dev: f32,
}

impl BeatStatistics {
    pub fn from_history(history: &BassHistory) -> Self {
        let Some(current) = history.latest() else {
            return Self::default();
        };

        let overall_average = history.window_average(history.len());
        let variance = history
            .iter()
            .map(|value| {
                let diff = value - overall_average;
                diff * diff
            })
            .sum::<f32>()
            / history.len() as f32;

        Self {
            current,
            recent_average: history.window_average(RECENT_WINDOW),
            medium_average: history.window_average(MEDIUM_WINDOW),
            overall_average,
            variance,
            std_dev: variance.sqrt(),
        }
    }

    /// Current value relative to the floored overall average.
    pub fn ratio(&self) -> f32 {
        self.current / self.overall_average.max(AVERAGE_FLOOR)
    }
}

/// Independent heuristics voted on every detection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Basic,
    Recent,
    Variance,
    Medium,
    Intensity,
}

type Heuristic = fn(&BeatStatistics, f32, &BeatConfig) -> bool;

const HEURISTICS: [(DetectionMethod, Heuristic); 5] = [
    (DetectionMethod::Basic, above_overall),
    (DetectionMethod::Recent, above_recent),
    (DetectionMethod::Variance, above_spread),
    (DetectionMethod::Medium, above_medium),
    (DetectionMethod::Intensity, above_ratio),
];

fn above_overall(stats: &BeatStatistics, threshold: f32, _: &BeatConfig) -> bool {
    stats.current > stats.overall_average * threshold
}

fn above_recent(stats: &BeatStatistics, threshold: f32, _: &BeatConfig) -> bool {
    stats.current > stats.recent_average * threshold * 0.9
}

fn above_spread(stats: &BeatStatistics, _: f32, config: &BeatConfig) -> bool {
    stats.current > stats.overall_average + stats.std_dev * config.variance_threshold
}

fn above_medium(stats: &BeatStatistics, threshold: f32, _: &BeatConfig) -> bool {
    stats.current > stats.medium_average * threshold * 1.1
}

fn above_ratio(stats: &BeatStatistics, threshold: f32, _: &BeatConfig) -> bool {
    stats.ratio() > threshold
}

/// Outcome of every heuristic for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    flags: [bool; 5],
}

impl DetectionResult {
    pub fn evaluate(stats: &BeatStatistics, threshold: f32, config: &BeatConfig) -> Self {
        let mut flags = [false; 5];
        for (flag, (_, heuristic)) in flags.iter_mut().zip(HEURISTICS.iter()) {
            *flag = heuristic(stats, threshold, config);
        }
        Self { flags }
    }

    pub fn triggered(&self, method: DetectionMethod) -> bool {
        HEURISTICS
            .iter()
            .zip(self.flags)
            .any(|((candidate, _), flag)| *candidate == method && flag)
    }

    pub fn count(&self) -> usize {
        self.flags.iter().fold(0, |count, flag| count + usize::from(*flag))
    }

    pub fn methods(&self) -> Vec<DetectionMethod> {
        HEURISTICS
            .iter()
            .zip(self.flags)
            .filter_map(|((method, _), flag)| flag.then_some(*method))
            .collect()
    }
}

/// Votes required before a multi-method beat fires.
pub fn quorum() -> usize {
    let ratio = (QUORUM_RATIO * HEURISTICS.len() as f32).round() as usize;
    ratio.max(2)
}

/// Threshold multiplier adapted to the signal's spread and the sensitivity.
pub fn dynamic_threshold(config: &BeatConfig, std_dev: f32) -> f32 {
    let mut threshold = config.threshold_multiplier;
    if config.dynamic_threshold {
        if std_dev > HIGH_VARIANCE {
            threshold *= 0.8;
        } else if std_dev < LOW_VARIANCE {
            threshold *= 1.3;
        }
    }
    threshold * (2.0 - config.sensitivity)
}

/// A detected (or injected) beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    pub intensity: f32,
    /// Seconds since the engine started.
    pub timestamp: f64,
    pub methods: Vec<DetectionMethod>,
}

/// Read-only snapshot for debugging overlays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatDiagnostics {
    pub history_len: usize,
    pub history_capacity: usize,
    pub statistics: Option<BeatStatistics>,
    pub detection: Option<DetectionResult>,
    pub threshold: Option<f32>,
    pub since_last_beat: Option<f64>,
    pub beats_detected: u64,
    pub cooldown_remaining: f32,
}

/// Beat detector over the smoothed bass trace.
///
/// Runs the heuristics of [`DetectionMethod`] against rolling statistics and
/// emits a [`BeatEvent`] when enough of them agree. `min_interval` rate-limits
/// events; `duration` drives the independent visual cooldown reported through
/// [`BeatDetector::beat_active`] and [`BeatDetector::beat_progress`].
#[derive(Debug, Clone)]
pub struct BeatDetector {
    config: BeatConfig,
    history: BassHistory,
    last_beat: Option<f64>,
    cooldown: f32,
    intensity: f32,
    beats_detected: u64,
    last_statistics: Option<BeatStatistics>,
    last_detection: Option<DetectionResult>,
    last_threshold: Option<f32>,
    now: f64,
}

impl BeatDetector {
    pub fn new(config: BeatConfig) -> Self {
        let config = config.sanitized();
        Self {
            history: BassHistory::new(config.history_size),
            config,
            last_beat: None,
            cooldown: 0.0,
            intensity: 0.0,
            beats_detected: 0,
            last_statistics: None,
            last_detection: None,
            last_threshold: None,
            now: 0.0,
        }
    }

    pub fn config(&self) -> &BeatConfig {
        &self.config
    }

    pub fn history(&self) -> &BassHistory {
        &self.history
    }

    /// Feeds one smoothed bass sample observed at `timestamp` seconds, after
    /// `delta` seconds of host time.
    pub fn process(&mut self, delta: f32, timestamp: f64, bass: f32) -> Option<BeatEvent> {
        self.now = timestamp;
        if delta.is_finite() && delta > 0.0 {
            self.cooldown = (self.cooldown - delta).max(0.0);
        }
        if self.cooldown <= 0.0 {
            self.intensity = 0.0;
        }

        self.history.push(if bass.is_finite() { bass.max(0.0) } else { 0.0 });

        if self.history.len() < self.config.min_history {
            return None;
        }
        if let Some(since) = self.since_last_beat() {
            if since < f64::from(self.config.min_interval) {
                return None;
            }
        }

        let stats = BeatStatistics::from_history(&self.history);
        let threshold = dynamic_threshold(&self.config, stats.std_dev);
        let detection = DetectionResult::evaluate(&stats, threshold, &self.config);
        trace!(
            current = stats.current,
            average = stats.overall_average,
            std_dev = stats.std_dev,
            threshold,
            votes = detection.count(),
            "beat statistics"
        );

        self.last_statistics = Some(stats);
        self.last_detection = Some(detection);
        self.last_threshold = Some(threshold);

        let fire = if self.config.multi_method {
            detection.count() >= quorum()
        } else {
            detection.triggered(DetectionMethod::Basic)
        };
        if !fire {
            return None;
        }

        let intensity = self.score(&stats, &detection);
        Some(self.emit(intensity, detection.methods()))
    }

    /// Injects a beat regardless of the signal and of the rate limit.
    pub fn force_beat(&mut self, intensity: f32) -> BeatEvent {
        let intensity = clamp_finite(intensity, MIN_INTENSITY, MAX_INTENSITY, 1.0);
        self.emit(intensity, Vec::new())
    }

    fn score(&self, stats: &BeatStatistics, detection: &DetectionResult) -> f32 {
        let methods = detection.count().max(1) as f32;
        let agreement = 1.0 + 0.2 * (methods - 1.0);
        let spread = 1.0 + (2.0 * stats.std_dev).min(1.0);
        let raw = stats.ratio() * agreement * spread * self.config.sensitivity;
        clamp_finite(raw, MIN_INTENSITY, MAX_INTENSITY, MIN_INTENSITY)
    }

    fn emit(&mut self, intensity: f32, methods: Vec<DetectionMethod>) -> BeatEvent {
        self.last_beat = Some(self.now);
        self.cooldown = self.config.duration;
        self.intensity = intensity;
        self.beats_detected += 1;

        debug!(intensity, timestamp = self.now, ?methods, "beat detected");
        BeatEvent {
            intensity,
            timestamp: self.now,
            methods,
        }
    }

    pub fn since_last_beat(&self) -> Option<f64> {
        self.last_beat.map(|last| self.now - last)
    }

    pub fn beat_active(&self) -> bool {
        self.cooldown > 0.0
    }

    /// 0 at the onset of a beat, rising to 1 as its cooldown runs out.
    pub fn beat_progress(&self) -> f32 {
        if !self.beat_active() || self.config.duration <= 0.0 {
            return 1.0;
        }
        (1.0 - self.cooldown / self.config.duration).clamp(0.0, 1.0)
    }

    /// Intensity of the active beat, or 0 once it has cooled down.
    pub fn beat_intensity(&self) -> f32 {
        self.intensity
    }

    pub fn beats_detected(&self) -> u64 {
        self.beats_detected
    }

    pub fn diagnostics(&self) -> BeatDiagnostics {
        BeatDiagnostics {
            history_len: self.history.len(),
            history_capacity: self.history.capacity(),
            statistics: self.last_statistics,
            detection: self.last_detection,
            threshold: self.last_threshold,
            since_last_beat: self.since_last_beat(),
            beats_detected: self.beats_detected,
            cooldown_remaining: self.cooldown,
        }
    }

    pub fn set_threshold_multiplier(&mut self, value: f32) {
        self.config.threshold_multiplier = value;
        self.config = self.config.sanitized();
    }

    pub fn set_variance_threshold(&mut self, value: f32) {
        self.config.variance_threshold = value;
        self.config = self.config.sanitized();
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.config.sensitivity = value;
        self.config = self.config.sanitized();
    }

    pub fn set_min_interval(&mut self, seconds: f32) {
        self.config.min_interval = seconds;
        self.config = self.config.sanitized();
    }

    pub fn set_duration(&mut self, seconds: f32) {
        self.config.duration = seconds;
        self.config = self.config.sanitized();
        self.cooldown = self.cooldown.min(self.config.duration);
    }

    pub fn set_multi_method(&mut self, enabled: bool) {
        self.config.multi_method = enabled;
    }

    pub fn set_dynamic_threshold(&mut self, enabled: bool) {
        self.config.dynamic_threshold = enabled;
    }

    pub fn set_history_size(&mut self, size: usize) {
        self.config.history_size = size;
        self.config = self.config.sanitized();
        self.history.set_capacity(self.config.history_size);
        debug!(size = self.config.history_size, "bass history resized");
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_beat = None;
        self.cooldown = 0.0;
        self.intensity = 0.0;
        self.last_statistics = None;
        self.last_detection = None;
        self.last_threshold = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f32 = 1.0 / 60.0;

    struct Feed {
        detector: BeatDetector,
        time: f64,
        events: Vec<BeatEvent>,
    }

    impl Feed {
        fn new(config: BeatConfig) -> Self {
            Self {
                detector: BeatDetector::new(config),
                time: 0.0,
                events: Vec::new(),
            }
        }

        fn tick(&mut self, delta: f32, bass: f32) -> Option<BeatEvent> {
            self.time += f64::from(delta);
            let event = self.detector.process(delta, self.time, bass);
            self.events.extend(event.clone());
            event
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut history = BassHistory::new(4);
        for value in 0..10 {
            history.push(value as f32);
            assert!(history.len() <= 4);
        }
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![6.0, 7.0, 8.0, 9.0]);

        history.set_capacity(2);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec![8.0, 9.0]);
    }

    #[test]
    fn window_averages_use_available_samples() {
        let mut history = BassHistory::new(180);
        for value in [1.0, 2.0, 3.0] {
            history.push(value);
        }
        let stats = BeatStatistics::from_history(&history);

        assert_eq!(stats.current, 3.0);
        assert_eq!(stats.recent_average, 2.0);
        assert_eq!(stats.medium_average, 2.0);
        assert_eq!(stats.overall_average, 2.0);
        assert!((stats.variance - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn quorum_requires_two_votes() {
        assert_eq!(quorum(), 2);
    }

    #[test]
    fn threshold_adapts_to_spread() {
        let config = BeatConfig {
            sensitivity: 1.0,
            ..Default::default()
        };
        assert!((dynamic_threshold(&config, 0.2) - 1.04).abs() < 1e-6);
        assert!((dynamic_threshold(&config, 0.07) - 1.3).abs() < 1e-6);
        assert!((dynamic_threshold(&config, 0.01) - 1.69).abs() < 1e-6);

        let fixed = BeatConfig {
            dynamic_threshold: false,
            sensitivity: 0.0,
            ..Default::default()
        };
        assert!((dynamic_threshold(&fixed, 0.01) - 2.6).abs() < 1e-6);
    }

    #[test]
    fn constant_signal_never_beats() {
        let mut feed = Feed::new(BeatConfig::default());
        for _ in 0..200 {
            feed.tick(TICK, 0.05);
        }
        assert!(feed.events.is_empty());
    }

    #[test]
    fn single_spike_fires_once() {
        let mut feed = Feed::new(BeatConfig::default());
        for _ in 0..50 {
            feed.tick(TICK, 0.05);
        }
        let event = feed.tick(TICK, 0.5).expect("spike should beat");

        assert_eq!(feed.events.len(), 1);
        assert!(event.intensity > 1.0);
        assert!(event.intensity <= MAX_INTENSITY);
        assert!(event.methods.contains(&DetectionMethod::Basic));
        assert!(feed.detector.beat_active());
        assert_eq!(feed.detector.beat_progress(), 0.0);
    }

    #[test]
    fn spikes_inside_min_interval_are_suppressed() {
        let mut feed = Feed::new(BeatConfig::default());
        for _ in 0..50 {
            feed.tick(TICK, 0.05);
        }
        assert!(feed.tick(0.01, 0.5).is_some());
        feed.tick(0.02, 0.05);
        feed.tick(0.02, 0.05);
        assert!(feed.tick(0.01, 0.5).is_none());
        assert_eq!(feed.events.len(), 1);
    }

    #[test]
    fn cold_start_waits_for_history() {
        let mut feed = Feed::new(BeatConfig::default());
        for _ in 0..8 {
            feed.tick(TICK, 0.01);
        }
        assert!(feed.tick(TICK, 1.0).is_none());
        assert!(feed.detector.diagnostics().statistics.is_none());
    }

    #[test]
    fn single_method_mode_uses_basic_only() {
        let mut feed = Feed::new(BeatConfig {
            multi_method: false,
            ..Default::default()
        });
        for _ in 0..50 {
            feed.tick(TICK, 0.05);
        }
        let event = feed.tick(TICK, 0.5).expect("basic heuristic should fire");
        assert!(!event.methods.is_empty());
    }

    #[test]
    fn cooldown_tracks_duration() {
        let mut detector = BeatDetector::new(BeatConfig::default());
        detector.force_beat(3.0);
        assert_eq!(detector.beat_intensity(), 3.0);

        detector.process(0.2, 0.2, 0.0);
        assert!(detector.beat_active());
        assert!((detector.beat_progress() - 0.5).abs() < 1e-5);

        detector.process(0.25, 0.45, 0.0);
        assert!(!detector.beat_active());
        assert_eq!(detector.beat_progress(), 1.0);
        assert_eq!(detector.beat_intensity(), 0.0);
    }

    #[test]
    fn forced_beats_are_clamped() {
        let mut detector = BeatDetector::new(BeatConfig::default());
        assert_eq!(detector.force_beat(50.0).intensity, MAX_INTENSITY);
        assert_eq!(detector.force_beat(0.0).intensity, MIN_INTENSITY);
        assert_eq!(detector.beats_detected(), 2);
    }

    #[test]
    fn setters_clamp_instead_of_rejecting() {
        let mut detector = BeatDetector::new(BeatConfig::default());
        detector.set_sensitivity(4.0);
        detector.set_min_interval(-1.0);
        detector.set_history_size(0);

        assert_eq!(detector.config().sensitivity, 1.0);
        assert_eq!(detector.config().min_interval, 0.0);
        assert_eq!(detector.history().capacity(), 1);
    }

    #[test]
    fn reset_forgets_history_and_timing() {
        let mut feed = Feed::new(BeatConfig::default());
        for _ in 0..20 {
            feed.tick(TICK, 0.05);
        }
        feed.detector.force_beat(1.0);
        feed.detector.reset();

        let diagnostics = feed.detector.diagnostics();
        assert_eq!(diagnostics.history_len, 0);
        assert!(diagnostics.since_last_beat.is_none());
        assert!(!feed.detector.beat_active());
    }
}
