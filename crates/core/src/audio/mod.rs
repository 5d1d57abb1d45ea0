//! Per-tick façade that drives the whole analysis and reactivity pipeline.

mod spectrum;

use std::fmt;

use tracing::{debug, trace};

pub use spectrum::{FftSpectrum, SpectrumSource};

use crate::{
    AnalysisFrame, AppConfig, Band, BandLevels, BandSmoother, BeatDetector, BeatDiagnostics,
    BeatEvent, EngineEvent, EventQueue, ParameterStore, PlaybackClock, ReactivityMapper, Result,
    SpectrumSampler,
};

/// High level audio engine façade.
///
/// The host render loop calls [`AudioEngine::process`] once per frame with the
/// elapsed time. Each call samples the spectrum into bands, smooths them,
/// feeds the bass trace to the beat detector and lets the reactivity mapper
/// write the parameter store. Nothing here blocks or spawns work.
pub struct AudioEngine<S = FftSpectrum> {
    config: AppConfig,
    source: Option<S>,
    sampler: SpectrumSampler,
    smoother: BandSmoother,
    detector: BeatDetector,
    mapper: ReactivityMapper,
    reactivity_requested: bool,
    clock: PlaybackClock,
    events: EventQueue,
    pending_beat: Option<BeatEvent>,
    latest: AnalysisFrame,
}

impl AudioEngine<FftSpectrum> {
    /// Creates an engine analysing PCM handed over through
    /// [`AudioEngine::push_samples`].
    pub fn new(config: AppConfig) -> Result<Self> {
        let config = config.sanitized();
        let spectrum = FftSpectrum::new(config.audio.sample_rate, config.audio.transform_size)?;
        Ok(Self::with_source(config, spectrum))
    }

    /// Feeds a block of PCM samples into the FFT source, if one is attached.
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<()> {
        match self.source.as_mut() {
            Some(spectrum) => spectrum.push_samples(samples),
            None => Ok(()),
        }
    }
}

impl<S: SpectrumSource> AudioEngine<S> {
    pub fn with_source(config: AppConfig, source: S) -> Self {
        let mut engine = Self::without_source(config);
        engine.source = Some(source);
        engine
    }

    /// Engine that reports silence until a source is attached.
    pub fn without_source(config: AppConfig) -> Self {
        let config = config.sanitized();
        Self {
            sampler: SpectrumSampler::new(config.audio.clone()),
            smoother: BandSmoother::new(config.audio.smoothing_factor),
            detector: BeatDetector::new(config.beat.clone()),
            mapper: ReactivityMapper::new(config.reactivity.clone()),
            reactivity_requested: config.reactivity.enabled,
            config,
            source: None,
            clock: PlaybackClock::default(),
            events: EventQueue::new(),
            pending_beat: None,
            latest: AnalysisFrame::default(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn attach_source(&mut self, source: S) {
        self.source = Some(source);
        debug!("spectrum source attached");
    }

    pub fn detach_source(&mut self) -> Option<S> {
        debug!("spectrum source detached");
        self.source.take()
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> Option<&mut S> {
        self.source.as_mut()
    }

    /// False while no spectrum source is attached; bands then read zero and
    /// no beat can fire.
    pub fn is_ready(&self) -> bool {
        self.source.is_some()
    }

    /// Runs one tick of the pipeline.
    pub fn process(&mut self, delta: f32, params: &mut dyn ParameterStore) -> &AnalysisFrame {
        let time = self.clock.advance(delta);

        let raw = self
            .sampler
            .sample(self.source.as_ref().map(|source| source as &dyn SpectrumSource));
        let levels = self.smoother.update(raw);
        self.events.push(EngineEvent::LevelsUpdated(levels));

        let detected = self.detector.process(delta, time, levels.bass);
        let forced = self.pending_beat.take();
        let beat = detected.or(forced);
        if let Some(event) = &beat {
            self.events.push(EngineEvent::BeatDetected(event.clone()));
        }

        if self.reactivity_requested && !self.mapper.is_enabled() {
            self.mapper.enable(params);
        }
        self.mapper.update(delta, &levels, beat.as_ref(), params);

        trace!(time, bass = levels.bass, mid = levels.mid, treble = levels.treble, "tick");
        self.latest = AnalysisFrame {
            time,
            raw,
            levels,
            beat,
            beat_active: self.detector.beat_active(),
            beat_progress: self.detector.beat_progress(),
            beat_intensity: self.detector.beat_intensity(),
        };
        &self.latest
    }

    /// Injects a beat that is delivered to the mapper and the event queue on
    /// the next tick.
    pub fn force_beat(&mut self, intensity: f32) -> BeatEvent {
        let event = self.detector.force_beat(intensity);
        self.pending_beat = Some(event.clone());
        event
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain()
    }

    pub fn latest_frame(&self) -> &AnalysisFrame {
        &self.latest
    }

    pub fn levels(&self) -> BandLevels {
        self.smoother.levels()
    }

    pub fn band_level(&self, band: Band) -> f32 {
        self.smoother.levels().get(band)
    }

    pub fn beat_active(&self) -> bool {
        self.detector.beat_active()
    }

    pub fn beat_progress(&self) -> f32 {
        self.detector.beat_progress()
    }

    pub fn beat_intensity(&self) -> f32 {
        self.detector.beat_intensity()
    }

    pub fn diagnostics(&self) -> BeatDiagnostics {
        self.detector.diagnostics()
    }

    pub fn detector(&self) -> &BeatDetector {
        &self.detector
    }

    pub fn mapper(&self) -> &ReactivityMapper {
        &self.mapper
    }

    pub fn time(&self) -> f64 {
        self.clock.time_seconds
    }

    pub fn set_band_gain(&mut self, band: Band, gain: f32) {
        self.sampler.set_band_gain(band, gain);
        *self.config.audio.band_mut(band) = *self.sampler.settings().band(band);
    }

    pub fn set_band_range(&mut self, band: Band, min_freq: f32, max_freq: f32) {
        self.sampler.set_band_range(band, min_freq, max_freq);
        *self.config.audio.band_mut(band) = *self.sampler.settings().band(band);
    }

    pub fn set_overall_gain(&mut self, gain: f32) {
        self.sampler.set_overall_gain(gain);
        self.config.audio.overall_gain = self.sampler.settings().overall_gain;
    }

    pub fn set_smoothing_factor(&mut self, factor: f32) {
        self.smoother.set_factor(factor);
        self.config.audio.smoothing_factor = self.smoother.factor();
    }

    pub fn set_threshold_multiplier(&mut self, value: f32) {
        self.detector.set_threshold_multiplier(value);
        self.sync_beat_config();
    }

    pub fn set_variance_threshold(&mut self, value: f32) {
        self.detector.set_variance_threshold(value);
        self.sync_beat_config();
    }

    pub fn set_sensitivity(&mut self, value: f32) {
        self.detector.set_sensitivity(value);
        self.sync_beat_config();
    }

    pub fn set_min_interval(&mut self, seconds: f32) {
        self.detector.set_min_interval(seconds);
        self.sync_beat_config();
    }

    pub fn set_beat_duration(&mut self, seconds: f32) {
        self.detector.set_duration(seconds);
        self.sync_beat_config();
    }

    pub fn set_history_size(&mut self, size: usize) {
        self.detector.set_history_size(size);
        self.sync_beat_config();
    }

    pub fn set_multi_method(&mut self, enabled: bool) {
        self.detector.set_multi_method(enabled);
        self.sync_beat_config();
    }

    pub fn set_dynamic_threshold(&mut self, enabled: bool) {
        self.detector.set_dynamic_threshold(enabled);
        self.sync_beat_config();
    }

    /// Turns reactivity on (capturing bases) or off (restoring them).
    pub fn set_reactivity(&mut self, enabled: bool, params: &mut dyn ParameterStore) {
        self.reactivity_requested = enabled;
        self.config.reactivity.enabled = enabled;
        self.mapper.set_enabled(enabled, params);
    }

    pub fn reactivity_enabled(&self) -> bool {
        self.mapper.is_enabled()
    }

    /// Clears analysis state and the clock. Reactivity is left untouched.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.smoother.reset();
        self.detector.reset();
        self.events.drain();
        self.pending_beat = None;
        self.latest = AnalysisFrame::default();
    }

    fn sync_beat_config(&mut self) {
        self.config.beat = self.detector.config().clone();
    }
}

impl<S> fmt::Debug for AudioEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("ready", &self.source.is_some())
            .field("time", &self.clock.time_seconds)
            .field("levels", &self.smoother.levels())
            .field("beats", &self.detector.beats_detected())
            .field("reactive", &self.mapper.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::SceneParameters;

    const TICK: f32 = 1.0 / 60.0;

    fn immediate() -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.smoothing_factor = 1.0;
        config.reactivity.seed = Some(3);
        config
    }

    #[test]
    fn missing_source_reports_silence() {
        let mut engine = AudioEngine::<FftSpectrum>::without_source(immediate());
        let mut params = SceneParameters::kaleidoscope();

        assert!(!engine.is_ready());
        for _ in 0..120 {
            let frame = engine.process(TICK, &mut params);
            assert_eq!(frame.levels, BandLevels::default());
            assert!(frame.beat.is_none());
        }
        assert_eq!(engine.diagnostics().beats_detected, 0);
    }

    #[test]
    fn emits_levels_then_beats() {
        let mut engine = AudioEngine::with_source(immediate(), |lo: f32, _hi: f32| {
            if lo < 250.0 {
                0.05
            } else {
                0.0
            }
        });
        let mut params = SceneParameters::kaleidoscope();

        for _ in 0..50 {
            engine.process(TICK, &mut params);
        }
        let events = engine.drain_events();
        assert_eq!(events.len(), 50);
        assert!(events
            .iter()
            .all(|event| matches!(event, EngineEvent::LevelsUpdated(_))));
        assert!((engine.band_level(Band::Bass) - 0.05).abs() < 1e-6);

        engine.force_beat(4.0);
        let frame = engine.process(TICK, &mut params).clone();
        assert!(frame.beat.is_some());
        assert!(frame.beat_active);

        let events = engine.drain_events();
        assert!(matches!(events[0], EngineEvent::LevelsUpdated(_)));
        assert!(matches!(events[1], EngineEvent::BeatDetected(ref beat) if beat.intensity == 4.0));
    }

    #[test]
    fn reactivity_requested_in_config_starts_on_first_tick() {
        let mut config = immediate();
        config.reactivity.enabled = true;
        let mut engine = AudioEngine::with_source(config, |_lo: f32, _hi: f32| 0.5);
        let mut params = SceneParameters::kaleidoscope();

        assert!(!engine.reactivity_enabled());
        engine.process(TICK, &mut params);
        assert!(engine.reactivity_enabled());
        assert!(params.get("pulse").unwrap() > 0.0);

        engine.set_reactivity(false, &mut params);
        assert_eq!(params, SceneParameters::kaleidoscope());
    }

    #[test]
    fn mutators_clamp_and_update_config() {
        let mut engine = AudioEngine::<FftSpectrum>::without_source(AppConfig::default());
        engine.set_sensitivity(-2.0);
        engine.set_band_gain(Band::Treble, 500.0);
        engine.set_smoothing_factor(0.0);
        engine.set_multi_method(false);

        let config = engine.config();
        assert_eq!(config.beat.sensitivity, 0.0);
        assert!(!config.beat.multi_method);
        assert_eq!(config.audio.treble.gain, 100.0);
        assert_eq!(config.audio.smoothing_factor, 0.001);
    }

    #[test]
    fn fft_engine_tracks_a_bass_tone() {
        let mut config = immediate();
        config.audio.transform_size = 1024;
        let mut engine = AudioEngine::new(config).unwrap();
        let mut params: HashMap<String, f32> = HashMap::new();

        let samples: Vec<f32> = (0..2048)
            .map(|i| (2.0 * std::f32::consts::PI * 80.0 * i as f32 / 44_100.0).sin())
            .collect();
        engine.push_samples(&samples).unwrap();
        let frame = engine.process(TICK, &mut params);

        assert!(frame.levels.bass > frame.levels.treble);
        assert!(frame.levels.bass > 0.0);
    }

    #[test]
    fn reset_rewinds_the_clock() {
        let mut engine = AudioEngine::with_source(immediate(), |_lo: f32, _hi: f32| 0.1);
        let mut params = SceneParameters::kaleidoscope();
        engine.process(0.5, &mut params);
        engine.reset();

        assert_eq!(engine.time(), 0.0);
        assert!(engine.drain_events().is_empty());
        assert_eq!(engine.levels(), BandLevels::default());
    }
}
