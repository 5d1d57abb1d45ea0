use std::collections::{BTreeMap, HashMap};

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{analysis::lerp, Band, BandLevels, BeatEvent, ReactivityConfig};

/// Externally owned store of named render parameters.
///
/// Implementations clamp written values into whatever range they consider
/// legal. While reactivity is enabled the mapper must be the only writer of
/// the parameters it tracks.
pub trait ParameterStore {
    fn get(&self, name: &str) -> Option<f32>;
    fn set(&mut self, name: &str, value: f32);
}

impl ParameterStore for HashMap<String, f32> {
    fn get(&self, name: &str) -> Option<f32> {
        HashMap::get(self, name).copied()
    }

    fn set(&mut self, name: &str, value: f32) {
        self.insert(name.to_string(), value);
    }
}

/// Describes how a band level should be routed to a render parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDescriptor {
    pub source: Band,
    pub target: String,
    pub intensity: f32,
    pub scale: f32,
    /// Optional clamp applied before the store sees the value.
    #[serde(default)]
    pub range: Option<(f32, f32)>,
}

impl MappingDescriptor {
    pub fn new(source: Band, target: impl Into<String>, intensity: f32, scale: f32) -> Self {
        Self {
            source,
            target: target.into(),
            intensity,
            scale,
            range: None,
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.range = Some((min.min(max), max.max(min)));
        self
    }

    /// `base + level * intensity * scale`, clamped to the optional range.
    pub fn evaluate(&self, base: f32, level: f32) -> f32 {
        let value = base + level * self.intensity * self.scale;
        match self.range {
            Some((min, max)) => value.clamp(min, max),
            None => value,
        }
    }
}

/// One-shot offset applied to a parameter by strong beats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatPerturbation {
    pub target: String,
    pub amount: f32,
}

impl BeatPerturbation {
    pub fn new(target: impl Into<String>, amount: f32) -> Self {
        Self {
            target: target.into(),
            amount,
        }
    }
}

/// Temporary override of a parameter that eases back to its base value.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientEffect {
    pub parameter: String,
    pub base: f32,
    pub peak: f32,
    pub current: f32,
    pub remaining: f32,
    pub duration: f32,
    /// Even-integer range the value is snapped into after every write.
    even_range: Option<(f32, f32)>,
}

impl TransientEffect {
    fn new(parameter: &str, base: f32, peak: f32, duration: f32, even_range: Option<(f32, f32)>) -> Self {
        let current = match even_range {
            Some((min, max)) => snap_even(peak, min, max),
            None => peak,
        };
        Self {
            parameter: parameter.to_string(),
            base,
            peak: current,
            current,
            remaining: duration,
            duration,
            even_range,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining <= 0.0
    }

    /// Holds the peak for the first half, then eases out to the base.
    fn advance(&mut self, delta: f32) {
        self.remaining -= delta;
        let half = self.duration * 0.5;
        let value = if self.remaining <= 0.0 {
            self.base
        } else if self.remaining > half {
            self.peak
        } else {
            let t = self.remaining / half;
            lerp(self.base, self.peak, t * t)
        };
        self.current = self.quantise(value);
    }

    fn quantise(&self, value: f32) -> f32 {
        match self.even_range {
            Some((min, max)) => snap_even(value, min, max),
            None => value,
        }
    }
}

/// Rounds to the nearest even integer inside `[min, max]`.
pub fn snap_even(value: f32, min: f32, max: f32) -> f32 {
    let lo = (min / 2.0).ceil() * 2.0;
    let hi = (max / 2.0).floor() * 2.0;
    if !value.is_finite() || lo > hi {
        return lo;
    }
    ((value / 2.0).round() * 2.0).clamp(lo, hi)
}

/// Routes band levels and beats onto a caller-owned [`ParameterStore`].
#[derive(Debug, Clone)]
pub struct ReactivityMapper {
    config: ReactivityConfig,
    enabled: bool,
    bases: BTreeMap<String, f32>,
    transients: Vec<TransientEffect>,
    rng: Pcg32,
}

impl ReactivityMapper {
    pub fn new(config: ReactivityConfig) -> Self {
        let config = config.sanitized();
        let rng = Pcg32::seed_from_u64(config.seed.unwrap_or_else(rand::random));
        Self {
            config,
            enabled: false,
            bases: BTreeMap::new(),
            transients: Vec::new(),
            rng,
        }
    }

    pub fn config(&self) -> &ReactivityConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn transients(&self) -> &[TransientEffect] {
        &self.transients
    }

    pub fn base_value(&self, name: &str) -> Option<f32> {
        self.bases.get(name).copied()
    }

    /// Captures the current value of every tracked parameter as its base.
    pub fn enable(&mut self, store: &mut dyn ParameterStore) {
        if self.enabled {
            return;
        }
        self.bases.clear();
        self.transients.clear();
        for name in self.tracked_parameters() {
            if let Some(value) = store.get(&name) {
                let value = self.quantise(&name, value);
                self.bases.insert(name, value);
            }
        }
        self.enabled = true;
        debug!(tracked = self.bases.len(), "reactivity enabled");
    }

    /// Restores every tracked parameter to its base and forgets all state.
    pub fn disable(&mut self, store: &mut dyn ParameterStore) {
        if !self.enabled {
            return;
        }
        for (name, base) in &self.bases {
            store.set(name, *base);
        }
        self.bases.clear();
        self.transients.clear();
        self.enabled = false;
        debug!("reactivity disabled, parameters restored");
    }

    pub fn set_enabled(&mut self, enabled: bool, store: &mut dyn ParameterStore) {
        if enabled {
            self.enable(store);
        } else {
            self.disable(store);
        }
    }

    pub fn update(
        &mut self,
        delta: f32,
        levels: &BandLevels,
        beat: Option<&BeatEvent>,
        store: &mut dyn ParameterStore,
    ) {
        if !self.enabled {
            return;
        }
        let delta = if delta.is_finite() { delta.max(0.0) } else { 0.0 };

        for effect in &mut self.transients {
            effect.advance(delta);
            store.set(&effect.parameter, effect.current);
        }
        self.transients.retain(|effect| !effect.is_expired());

        if let Some(beat) = beat {
            self.apply_beat(beat, store);
        }

        for mapping in &self.config.mappings {
            if self.transients.iter().any(|e| e.parameter == mapping.target) {
                continue;
            }
            let Some(base) = self.bases.get(&mapping.target) else {
                continue;
            };
            let value = mapping.evaluate(*base, levels.get(mapping.source));
            store.set(&mapping.target, self.quantise(&mapping.target, value));
        }
    }

    fn apply_beat(&mut self, beat: &BeatEvent, store: &mut dyn ParameterStore) {
        if let Some(target) = self.config.segment_target.clone() {
            if let Some(base) = self.bases.get(&target).copied() {
                let peak = self.segment_peak(base, beat.intensity);
                self.start_transient(&target, base, peak, store);
            }
        }

        if beat.intensity <= self.config.burst_threshold {
            return;
        }
        let strength = (beat.intensity / 10.0).min(1.0);
        for burst in self.config.bursts.clone() {
            if let Some(base) = self.bases.get(&burst.target).copied() {
                self.start_transient(&burst.target, base, base + burst.amount * strength, store);
            }
        }
    }

    fn segment_peak(&mut self, base: f32, intensity: f32) -> f32 {
        let (min, max) = self.config.segment_range;
        let step = self.config.segment_step;
        let unit: f32 = self.rng.gen_range(-1.0..=1.0);
        let draw = unit * intensity * step * 2.0;

        let mut offset = (draw / 2.0).round() * 2.0;
        if offset == 0.0 {
            offset = if draw < 0.0 { -step } else { step };
        }
        let peak = snap_even(base + offset, min, max);
        if peak == base {
            snap_even(base - offset, min, max)
        } else {
            peak
        }
    }

    fn start_transient(&mut self, name: &str, base: f32, peak: f32, store: &mut dyn ParameterStore) {
        let even_range = self.even_range(name);
        let effect = TransientEffect::new(name, base, peak, self.config.beat_duration, even_range);
        store.set(name, effect.current);
        trace!(parameter = name, base, peak = effect.current, "transient started");

        self.transients.retain(|existing| existing.parameter != name);
        self.transients.push(effect);
    }

    fn even_range(&self, name: &str) -> Option<(f32, f32)> {
        match &self.config.segment_target {
            Some(target) if target == name => Some(self.config.segment_range),
            _ => None,
        }
    }

    fn quantise(&self, name: &str, value: f32) -> f32 {
        match self.even_range(name) {
            Some((min, max)) => snap_even(value, min, max),
            None => value,
        }
    }

    fn tracked_parameters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.mappings.iter().map(|m| m.target.clone()).collect();
        names.extend(self.config.segment_target.iter().cloned());
        names.extend(self.config.bursts.iter().map(|b| b.target.clone()));
        names.sort();
        names.dedup();
        names
    }
}
