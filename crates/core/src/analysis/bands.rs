use serde::{Deserialize, Serialize};

use crate::{config::clamp_finite, AudioConfig, SpectrumSource};

/// Frequency band tracked independently by the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Bass,
    Mid,
    Treble,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Bass, Band::Mid, Band::Treble];

    pub fn name(self) -> &'static str {
        match self {
            Band::Bass => "bass",
            Band::Mid => "mid",
            Band::Treble => "treble",
        }
    }
}

/// One magnitude per band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandLevels {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

impl BandLevels {
    pub fn get(&self, band: Band) -> f32 {
        match band {
            Band::Bass => self.bass,
            Band::Mid => self.mid,
            Band::Treble => self.treble,
        }
    }

    pub fn set(&mut self, band: Band, value: f32) {
        match band {
            Band::Bass => self.bass = value,
            Band::Mid => self.mid = value,
            Band::Treble => self.treble = value,
        }
    }
}

/// Averages the spectrum over each band's range at bin resolution and applies
/// the band and overall gains.
#[derive(Debug, Clone)]
pub struct SpectrumSampler {
    settings: AudioConfig,
}

impl SpectrumSampler {
    pub fn new(settings: AudioConfig) -> Self {
        Self {
            settings: settings.sanitized(),
        }
    }

    pub fn settings(&self) -> &AudioConfig {
        &self.settings
    }

    pub fn set_band_gain(&mut self, band: Band, gain: f32) {
        self.settings.band_mut(band).gain = clamp_finite(gain, 0.0, AudioConfig::MAX_GAIN, 1.0);
    }

    pub fn set_band_range(&mut self, band: Band, min_freq: f32, max_freq: f32) {
        let nyquist = self.settings.sample_rate as f32 * 0.5;
        let config = self.settings.band_mut(band);
        config.min_freq = min_freq;
        config.max_freq = max_freq;
        *config = config.sanitized(nyquist);
    }

    pub fn set_overall_gain(&mut self, gain: f32) {
        self.settings.overall_gain = clamp_finite(gain, 0.0, AudioConfig::MAX_GAIN, 1.0);
    }

    /// Raw, gained magnitudes for every band. A missing source reads as silence.
    pub fn sample(&self, source: Option<&dyn SpectrumSource>) -> BandLevels {
        let mut levels = BandLevels::default();
        let Some(source) = source else {
            return levels;
        };

        for band in Band::ALL {
            let config = self.settings.band(band);
            let raw = self.band_average(source, config.min_freq, config.max_freq);
            levels.set(band, raw * config.gain * self.settings.overall_gain);
        }
        levels
    }

    fn band_average(&self, source: &dyn SpectrumSource, min_freq: f32, max_freq: f32) -> f32 {
        let bin_hz = self.settings.bin_width();
        let bins = ((max_freq - min_freq) / bin_hz).ceil().max(0.0) as usize;
        if bins == 0 {
            return 0.0;
        }

        let sum: f32 = (0..bins)
            .map(|index| {
                let lo = min_freq + index as f32 * bin_hz;
                let hi = (lo + bin_hz).min(max_freq);
                source.magnitude(lo, hi)
            })
            .filter(|magnitude| magnitude.is_finite() && *magnitude > 0.0)
            .sum();
        sum / bins as f32
    }
}

/// Exponential moving average over the three band magnitudes.
#[derive(Debug, Clone)]
pub struct BandSmoother {
    factor: f32,
    levels: BandLevels,
}

impl BandSmoother {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: clamp_finite(factor, AudioConfig::MIN_SMOOTHING, 1.0, 1.0),
            levels: BandLevels::default(),
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn set_factor(&mut self, factor: f32) {
        self.factor = clamp_finite(factor, AudioConfig::MIN_SMOOTHING, 1.0, self.factor);
    }

    pub fn levels(&self) -> BandLevels {
        self.levels
    }

    /// Blends `raw` into the smoothed levels and returns the result.
    pub fn update(&mut self, raw: BandLevels) -> BandLevels {
        for band in Band::ALL {
            let target = raw.get(band).max(0.0);
            let current = self.levels.get(band);
            self.levels.set(band, lerp(current, target, self.factor));
        }
        self.levels
    }

    pub fn reset(&mut self) {
        self.levels = BandLevels::default();
    }
}

pub(crate) fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}
