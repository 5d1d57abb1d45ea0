/// Accumulates the delta-time handed over by the host loop.
///
/// No wall-clock reads happen anywhere in the pipeline; every timestamp is
/// derived from the deltas passed to [`PlaybackClock::advance`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlaybackClock {
    pub time_seconds: f64,
    pub ticks: u64,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
        self.ticks = 0;
    }

    /// Moves the clock forward. Negative or non-finite deltas count as zero.
    pub fn advance(&mut self, delta: f32) -> f64 {
        if delta.is_finite() && delta > 0.0 {
            self.time_seconds += f64::from(delta);
        }
        self.ticks += 1;
        self.time_seconds
    }
}
