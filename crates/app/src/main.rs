use std::{f32::consts::PI, path::PathBuf};

use clap::{Parser, Subcommand};
use reactive_visualiser_core::{
    AppConfig, AudioEngine, EngineEvent, ParameterStore, SceneParameters, VisualiserError,
};
use tracing_subscriber::EnvFilter;

const FRAME_RATE: f32 = 60.0;
const MIN_BPM: f32 = 20.0;
const MAX_BPM: f32 = 300.0;

fn main() -> reactive_visualiser_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            seconds,
            bpm,
            reactive,
        } => run_simulation(config.as_ref(), seconds, bpm, reactive),
        Commands::Defaults { output } => write_defaults(&output),
    }
}

fn run_simulation(
    config: Option<&PathBuf>,
    seconds: f32,
    bpm: f32,
    reactive: bool,
) -> reactive_visualiser_core::Result<()> {
    validate_simulation(seconds, bpm)?;
    let mut config = match config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.reactivity.enabled |= reactive;
    tracing::info!(seconds, bpm, reactive = config.reactivity.enabled, "starting simulation");

    let sample_rate = config.audio.sample_rate;
    let mut engine = AudioEngine::new(config)?;
    let mut scene = SceneParameters::kaleidoscope();
    let mut signal = KickDrum::new(sample_rate, bpm);

    let delta = 1.0 / FRAME_RATE;
    let block = (sample_rate as f32 / FRAME_RATE).round() as usize;
    let frames = (seconds * FRAME_RATE).round() as u64;
    let mut beats = 0u64;

    for _ in 0..frames {
        engine.push_samples(&signal.next_block(block))?;
        engine.process(delta, &mut scene);

        for event in engine.drain_events() {
            if let EngineEvent::BeatDetected(beat) = event {
                beats += 1;
                tracing::info!(
                    time = beat.timestamp,
                    intensity = beat.intensity,
                    methods = ?beat.methods,
                    segments = ?scene.get("segments"),
                    "beat"
                );
            }
        }
    }

    let diagnostics = engine.diagnostics();
    tracing::info!(
        beats,
        expected = (seconds * bpm / 60.0).floor(),
        threshold = ?diagnostics.threshold,
        history = diagnostics.history_len,
        "simulation finished"
    );
    Ok(())
}

fn validate_simulation(seconds: f32, bpm: f32) -> reactive_visualiser_core::Result<()> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(VisualiserError::msg(format!(
            "simulation length must be a non-negative number of seconds, got {seconds}"
        )));
    }
    if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return Err(VisualiserError::msg(format!(
            "tempo must be between {MIN_BPM} and {MAX_BPM} bpm, got {bpm}"
        )));
    }
    Ok(())
}

fn write_defaults(output: &PathBuf) -> reactive_visualiser_core::Result<()> {
    tracing::info!(?output, "writing default configuration");
    AppConfig::default().save(output)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Synthetic four-on-the-floor kick: a decaying 55 Hz sine retriggered every
/// beat, over a quiet high-frequency hiss.
struct KickDrum {
    sample_rate: f32,
    period: usize,
    position: usize,
}

impl KickDrum {
    fn new(sample_rate: u32, bpm: f32) -> Self {
        let sample_rate = sample_rate as f32;
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        Self {
            sample_rate,
            period: ((sample_rate * 60.0 / bpm) as usize).max(1),
            position: 0,
        }
    }

    fn next_block(&mut self, len: usize) -> Vec<f32> {
        (0..len)
            .map(|_| {
                let t = (self.position % self.period) as f32 / self.sample_rate;
                let kick = (2.0 * PI * 55.0 * t).sin() * (-t * 18.0).exp();
                let hiss = (2.0 * PI * 7_000.0 * self.position as f32 / self.sample_rate).sin() * 0.02;
                self.position += 1;
                kick + hiss
            })
            .collect()
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive visualiser core driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the engine at 60 Hz from a synthetic kick-drum signal.
    Simulate {
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Length of the simulation in seconds.
        #[arg(short, long, default_value_t = 8.0)]
        seconds: f32,
        /// Tempo of the synthetic kick drum.
        #[arg(short, long, default_value_t = 120.0)]
        bpm: f32,
        /// Enable reactivity regardless of the configuration.
        #[arg(short, long)]
        reactive: bool,
    },
    /// Write the default configuration as JSON.
    Defaults {
        /// Destination path.
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_simulation_arguments() {
        assert!(validate_simulation(8.0, 120.0).is_ok());

        let err = validate_simulation(-1.0, 120.0).unwrap_err();
        assert!(matches!(err, VisualiserError::Message(_)));
        assert!(err.to_string().contains("seconds"));

        let err = validate_simulation(8.0, 1_000.0).unwrap_err();
        assert!(err.to_string().contains("tempo"));
        assert!(validate_simulation(f32::NAN, 120.0).is_err());
    }

    #[test]
    fn kick_drum_blocks_have_requested_length() {
        let mut kick = KickDrum::new(44_100, 120.0);
        let block = kick.next_block(735);
        assert_eq!(block.len(), 735);
        assert!(block.iter().all(|sample| sample.is_finite()));
    }
}
