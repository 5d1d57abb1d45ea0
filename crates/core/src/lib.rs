//! Core library for the audio-reactive visualiser.
//!
//! The crate turns a spectral magnitude source into three smoothed frequency
//! bands, detects beats on the bass trace and maps both onto a caller-owned
//! parameter store. Everything runs synchronously inside
//! [`AudioEngine::process`], which the host render loop calls once per frame
//! with the elapsed time.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod mapping;
pub mod scene;
pub mod timeline;

pub use analysis::{
    dynamic_threshold, quorum, AnalysisFrame, Band, BandLevels, BandSmoother, BassHistory,
    BeatDetector, BeatDiagnostics, BeatEvent, BeatStatistics, DetectionMethod, DetectionResult,
    SpectrumSampler,
};
pub use audio::{AudioEngine, FftSpectrum, SpectrumSource};
pub use config::{AppConfig, AudioConfig, BandConfig, BeatConfig, ReactivityConfig};
pub use error::{Result, VisualiserError};
pub use events::{EngineEvent, EventQueue};
pub use mapping::{
    snap_even, BeatPerturbation, MappingDescriptor, ParameterStore, ReactivityMapper,
    TransientEffect,
};
pub use scene::{ParameterKind, SceneParameter, SceneParameters};
pub use timeline::PlaybackClock;
