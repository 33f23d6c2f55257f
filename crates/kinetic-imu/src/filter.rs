use glam::DVec3;

/// Gyroscope readings (rad/s) below this magnitude are treated as jitter.
pub const GYRO_NOISE_LIMIT: f64 = 0.06;

/// Zeroes readings whose magnitude is below a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseFilter {
    threshold: f64,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(GYRO_NOISE_LIMIT)
    }
}

impl NoiseFilter {
    /// A threshold of `0.0` lets every reading through.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
        }
    }

    /// Return 0 if `|value| < threshold`, otherwise `value` unchanged.
    pub fn suppress(&self, value: f64) -> f64 {
        if value.abs() < self.threshold {
            0.0
        } else {
            value
        }
    }

    /// Apply [`suppress`](Self::suppress) to each axis independently.
    pub fn apply(&self, v: DVec3) -> DVec3 {
        DVec3::new(self.suppress(v.x), self.suppress(v.y), self.suppress(v.z))
    }
}
