use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{Result, VisualiserError};

/// Spectral magnitude query primitive consumed by the band sampler.
///
/// Implementations return the magnitude of the spectrum over `[lo_hz, hi_hz)`.
/// Callers treat negative or non-finite answers as silence.
pub trait SpectrumSource {
    fn magnitude(&self, lo_hz: f32, hi_hz: f32) -> f32;
}

impl<F> SpectrumSource for F
where
    F: Fn(f32, f32) -> f32,
{
    fn magnitude(&self, lo_hz: f32, hi_hz: f32) -> f32 {
        self(lo_hz, hi_hz)
    }
}

/// [`SpectrumSource`] backed by a forward real FFT over the most recent
/// `transform_size` PCM samples.
pub struct FftSpectrum {
    sample_rate: u32,
    size: usize,
    history: Vec<f32>,
    seen: usize,
    window: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    magnitudes: Vec<f32>,
}

impl FftSpectrum {
    pub fn new(sample_rate: u32, transform_size: usize) -> Result<Self> {
        if transform_size < 2 {
            return Err(VisualiserError::InvalidInput(
                "spectral transform needs at least two samples",
            ));
        }
        if sample_rate == 0 {
            return Err(VisualiserError::InvalidInput("sample rate must be positive"));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(transform_size);
        let input = plan.make_input_vec();
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let magnitudes = vec![0.0; spectrum.len()];
        let window = (0..transform_size)
            .map(|index| hann_value(index, transform_size))
            .collect();

        Ok(Self {
            sample_rate,
            size: transform_size,
            history: vec![0.0; transform_size],
            seen: 0,
            window,
            plan,
            input,
            scratch,
            spectrum,
            magnitudes,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn transform_size(&self) -> usize {
        self.size
    }

    /// Width of one bin in Hz.
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.size as f32
    }

    /// True once a full transform window has been analysed.
    pub fn is_primed(&self) -> bool {
        self.seen >= self.size
    }

    /// Normalised magnitude per bin, from DC up to Nyquist.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Appends a block of PCM samples and refreshes the spectrum once the
    /// window is full. Non-finite samples are treated as silence.
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let fresh = &samples[samples.len().saturating_sub(self.size)..];
        let keep = self.size - fresh.len();
        self.history.copy_within(fresh.len().., 0);
        for (slot, sample) in self.history[keep..].iter_mut().zip(fresh) {
            *slot = if sample.is_finite() { *sample } else { 0.0 };
        }
        self.seen = self.seen.saturating_add(samples.len());

        if self.is_primed() {
            self.analyse()?;
        }
        Ok(())
    }

    /// Forgets every sample pushed so far.
    pub fn clear(&mut self) {
        self.history.fill(0.0);
        self.magnitudes.fill(0.0);
        self.seen = 0;
    }

    fn analyse(&mut self) -> Result<()> {
        for ((slot, sample), weight) in self.input.iter_mut().zip(&self.history).zip(&self.window) {
            *slot = sample * weight;
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        let norm = 2.0 / self.size as f32;
        for (magnitude, bin) in self.magnitudes.iter_mut().zip(&self.spectrum) {
            let value = bin.norm() * norm;
            *magnitude = if value.is_finite() { value } else { 0.0 };
        }
        Ok(())
    }
}

impl SpectrumSource for FftSpectrum {
    fn magnitude(&self, lo_hz: f32, hi_hz: f32) -> f32 {
        if !self.is_primed() || !(lo_hz.is_finite() && hi_hz.is_finite()) || lo_hz < 0.0 {
            return 0.0;
        }

        let bin_hz = self.bin_width();
        let last = self.magnitudes.len().saturating_sub(1);
        let first = (lo_hz / bin_hz).ceil() as usize;
        let end = ((hi_hz / bin_hz).ceil() as usize).min(last + 1);

        if first < end {
            let bins = &self.magnitudes[first..end];
            bins.iter().sum::<f32>() / bins.len() as f32
        } else {
            let index = (lo_hz / bin_hz).floor() as usize;
            self.magnitudes.get(index).copied().unwrap_or(0.0)
        }
    }
}

impl fmt::Debug for FftSpectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftSpectrum")
            .field("sample_rate", &self.sample_rate)
            .field("size", &self.size)
            .field("seen", &self.seen)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn rejects_degenerate_transforms() {
        assert!(FftSpectrum::new(44_100, 1).is_err());
        assert!(FftSpectrum::new(0, 1024).is_err());
    }

    #[test]
    fn reports_silence_until_primed() {
        let mut spectrum = FftSpectrum::new(44_100, 1024).unwrap();
        spectrum.push_samples(&sine(100.0, 44_100, 512)).unwrap();

        assert!(!spectrum.is_primed());
        assert_eq!(spectrum.magnitude(20.0, 250.0), 0.0);
    }

    #[test]
    fn low_tone_lands_in_low_range() {
        let mut spectrum = FftSpectrum::new(44_100, 2048).unwrap();
        spectrum.push_samples(&sine(100.0, 44_100, 4096)).unwrap();

        let bass = spectrum.magnitude(60.0, 140.0);
        let treble = spectrum.magnitude(4_000.0, 20_000.0);
        assert!(bass > 0.05, "bass was {bass}");
        assert!(bass > treble * 10.0, "bass={bass} treble={treble}");
    }

    #[test]
    fn sub_bin_queries_read_a_single_bin() {
        let mut spectrum = FftSpectrum::new(1_000, 100).unwrap();
        spectrum.push_samples(&sine(100.0, 1_000, 100)).unwrap();

        let narrow = spectrum.magnitude(100.0, 100.5);
        assert_eq!(narrow, spectrum.magnitudes()[10]);
    }

    #[test]
    fn invalid_samples_are_treated_as_silence() {
        let mut spectrum = FftSpectrum::new(1_000, 8).unwrap();
        spectrum
            .push_samples(&[f32::NAN, f32::INFINITY, 0.0, 0.0, f32::NEG_INFINITY, 0.0, 0.0, 0.0])
            .unwrap();

        assert!(spectrum.magnitudes().iter().all(|m| *m == 0.0));
        assert_eq!(spectrum.magnitude(0.0, 500.0), 0.0);
    }

    #[test]
    fn closures_act_as_sources() {
        let flat = |_lo: f32, _hi: f32| 0.25;
        assert_eq!(flat.magnitude(10.0, 20.0), 0.25);
    }
}
