use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Band, BeatPerturbation, MappingDescriptor, Result};

/// Top-level configuration structure for the application.
///
/// The configuration is read once and handed to [`crate::AudioEngine`] at
/// construction. Values outside their legal ranges are clamped by
/// [`AppConfig::sanitized`], never rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub beat: BeatConfig,
    pub reactivity: ReactivityConfig,
}

impl AppConfig {
    /// Parses a JSON document. Missing fields fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Loads and sanitises a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Returns a copy with every field clamped into its legal range.
    pub fn sanitized(&self) -> Self {
        Self {
            audio: self.audio.sanitized(),
            beat: self.beat.sanitized(),
            reactivity: self.reactivity.sanitized(),
        }
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Size of the spectral transform; together with `sample_rate` this
    /// defines the bin resolution the bands are sampled at.
    pub transform_size: usize,
    /// Blend weight of the exponential smoothing, in (0, 1].
    pub smoothing_factor: f32,
    pub overall_gain: f32,
    pub bass: BandConfig,
    pub mid: BandConfig,
    pub treble: BandConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            transform_size: 2048,
            smoothing_factor: 0.08,
            overall_gain: 1.0,
            bass: BandConfig::new(20.0, 250.0),
            mid: BandConfig::new(250.0, 4_000.0),
            treble: BandConfig::new(4_000.0, 20_000.0),
        }
    }
}

impl AudioConfig {
    pub const MIN_SMOOTHING: f32 = 0.001;
    pub const MAX_GAIN: f32 = 100.0;
    pub const MAX_TRANSFORM_SIZE: usize = 65_536;

    /// Width of a single spectral bin in Hz.
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.transform_size.max(1) as f32
    }

    pub fn band(&self, band: Band) -> &BandConfig {
        match band {
            Band::Bass => &self.bass,
            Band::Mid => &self.mid,
            Band::Treble => &self.treble,
        }
    }

    pub fn band_mut(&mut self, band: Band) -> &mut BandConfig {
        match band {
            Band::Bass => &mut self.bass,
            Band::Mid => &mut self.mid,
            Band::Treble => &mut self.treble,
        }
    }

    pub fn sanitized(&self) -> Self {
        let nyquist = self.sample_rate.max(1) as f32 * 0.5;
        Self {
            sample_rate: self.sample_rate.max(1),
            transform_size: self.transform_size.clamp(2, Self::MAX_TRANSFORM_SIZE),
            smoothing_factor: clamp_finite(self.smoothing_factor, Self::MIN_SMOOTHING, 1.0, 1.0),
            overall_gain: clamp_finite(self.overall_gain, 0.0, Self::MAX_GAIN, 1.0),
            bass: self.bass.sanitized(nyquist),
            mid: self.mid.sanitized(nyquist),
            treble: self.treble.sanitized(nyquist),
        }
    }
}

/// Frequency range `[min_freq, max_freq)` and amplifier gain of one band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub min_freq: f32,
    pub max_freq: f32,
    #[serde(default = "unit_gain")]
    pub gain: f32,
}

fn unit_gain() -> f32 {
    1.0
}

impl BandConfig {
    pub fn new(min_freq: f32, max_freq: f32) -> Self {
        Self {
            min_freq,
            max_freq,
            gain: 1.0,
        }
    }

    /// Clamps the range into `[0, nyquist]` and keeps `min <= max`.
    pub fn sanitized(&self, nyquist: f32) -> Self {
        let min_freq = clamp_finite(self.min_freq, 0.0, nyquist, 0.0);
        let max_freq = clamp_finite(self.max_freq, 0.0, nyquist, nyquist).max(min_freq);
        Self {
            min_freq,
            max_freq,
            gain: clamp_finite(self.gain, 0.0, AudioConfig::MAX_GAIN, 1.0),
        }
    }
}

/// Tuning knobs of the beat detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Capacity of the bass history ring, in ticks.
    pub history_size: usize,
    /// Samples required before detection is attempted.
    pub min_history: usize,
    /// Hard rate limit between two beats, in seconds.
    pub min_interval: f32,
    /// Visual cooldown started by each beat, in seconds.
    pub duration: f32,
    pub threshold_multiplier: f32,
    pub variance_threshold: f32,
    /// In [0, 1]; higher values lower the threshold.
    pub sensitivity: f32,
    pub multi_method: bool,
    pub dynamic_threshold: bool,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            history_size: 180,
            min_history: 10,
            min_interval: 0.12,
            duration: 0.4,
            threshold_multiplier: 1.3,
            variance_threshold: 2.0,
            sensitivity: 0.7,
            multi_method: true,
            dynamic_threshold: true,
        }
    }
}

impl BeatConfig {
    pub const MAX_HISTORY: usize = 3_600;

    pub fn sanitized(&self) -> Self {
        let history_size = self.history_size.clamp(1, Self::MAX_HISTORY);
        Self {
            history_size,
            min_history: self.min_history.clamp(1, history_size),
            min_interval: clamp_finite(self.min_interval, 0.0, 10.0, 0.12),
            duration: clamp_finite(self.duration, 0.0, 10.0, 0.4),
            threshold_multiplier: clamp_finite(self.threshold_multiplier, 0.1, 10.0, 1.3),
            variance_threshold: clamp_finite(self.variance_threshold, 0.0, 10.0, 2.0),
            sensitivity: clamp_finite(self.sensitivity, 0.0, 1.0, 0.7),
            multi_method: self.multi_method,
            dynamic_threshold: self.dynamic_threshold,
        }
    }
}

/// How band levels and beats are routed onto scene parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactivityConfig {
    pub enabled: bool,
    /// Lifetime of every transient effect started by a beat, in seconds.
    pub beat_duration: f32,
    pub mappings: Vec<MappingDescriptor>,
    /// Even-integer parameter nudged by every beat.
    pub segment_target: Option<String>,
    pub segment_range: (f32, f32),
    pub segment_step: f32,
    /// Bursts only fire for beats stronger than this.
    pub burst_threshold: f32,
    pub bursts: Vec<BeatPerturbation>,
    /// Fixed seed for the segment offsets; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ReactivityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            beat_duration: 0.4,
            mappings: vec![
                MappingDescriptor::new(Band::Bass, "pulse", 1.0, 1.0),
                MappingDescriptor::new(Band::Mid, "rotation", 1.0, 2.0),
                MappingDescriptor::new(Band::Treble, "zoom", 1.0, 0.5),
            ],
            segment_target: Some("segments".to_string()),
            segment_range: (4.0, 80.0),
            segment_step: 2.0,
            burst_threshold: 2.0,
            bursts: vec![
                BeatPerturbation::new("color_shift", 0.5),
                BeatPerturbation::new("flash", 1.0),
            ],
            seed: None,
        }
    }
}

impl ReactivityConfig {
    pub fn sanitized(&self) -> Self {
        let (lo, hi) = self.segment_range;
        let lo = clamp_finite(lo, 0.0, f32::MAX, 4.0);
        let hi = clamp_finite(hi, 0.0, f32::MAX, 80.0).max(lo);
        Self {
            enabled: self.enabled,
            beat_duration: clamp_finite(self.beat_duration, 0.01, 10.0, 0.4),
            mappings: self.mappings.clone(),
            segment_target: self.segment_target.clone(),
            segment_range: (lo, hi),
            segment_step: clamp_finite(self.segment_step, 2.0, 40.0, 2.0),
            burst_threshold: clamp_finite(self.burst_threshold, 0.0, 10.0, 2.0),
            bursts: self.bursts.clone(),
            seed: self.seed,
        }
    }
}

/// Clamps `value` into `[min, max]`, replacing non-finite input with `fallback`.
pub(crate) fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback.clamp(min, max)
    }
}
