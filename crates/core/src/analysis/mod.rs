//! Band extraction and beat detection over a spectral magnitude source.

mod bands;
mod beat;

use serde::{Deserialize, Serialize};

pub use bands::{Band, BandLevels, BandSmoother, SpectrumSampler};
pub(crate) use bands::lerp;
pub use beat::{
    dynamic_threshold, quorum, BassHistory, BeatDetector, BeatDiagnostics, BeatEvent,
    BeatStatistics, DetectionMethod, DetectionResult,
};

/// Representation of the feature set for a single tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFrame {
    /// Seconds since the engine started.
    pub time: f64,
    /// Gained band magnitudes before smoothing.
    pub raw: BandLevels,
    /// Smoothed band magnitudes consumed downstream.
    pub levels: BandLevels,
    pub beat: Option<BeatEvent>,
    pub beat_active: bool,
    /// 0 at a beat onset, 1 once its cooldown has elapsed.
    pub beat_progress: f32,
    pub beat_intensity: f32,
}
