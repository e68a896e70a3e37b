use std::f64::consts::TAU;

use crate::muscle::Side;
use crate::pedal::Sample;
use crate::units::Degrees;

/// Cycles start at the reference pose, a quarter turn before the sensor's zero
pub const CYCLE_PHASE_SHIFT: Degrees = Degrees(-90.0);

/// A sample re-expressed in the cycle frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleSample {
    pub timestamp: f64,
    /// Phase-shifted angle in [0, 360)
    pub angle: Degrees,
    pub left_power: f64,
    pub right_power: f64,
}

impl CycleSample {
    fn from_sample(sample: &Sample) -> Self {
        Self {
            timestamp: sample.timestamp,
            angle: (sample.angle.to_degrees() + CYCLE_PHASE_SHIFT).wrapped(),
            left_power: sample.left_power,
            right_power: sample.right_power,
        }
    }

    pub fn power(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.left_power,
            Side::Right => self.right_power,
        }
    }
}

/// One crank rotation, from one boundary sample up to (not including) the next.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub samples: Vec<CycleSample>,
}

impl Cycle {
    pub fn from_samples(samples: &[Sample]) -> Self {
        Self {
            samples: samples.iter().map(CycleSample::from_sample).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    pub fn mean_abs_power(&self, side: Side) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f64 = self.samples.iter().map(|s| s.power(side).abs()).sum();
        Some(total / self.samples.len() as f64)
    }
}

/// True when the crank passed a multiple of 360° between two consecutive raw angles.
/// The reference multiple is the one at or below `current`;
/// landing exactly on it counts as crossed.
pub fn is_boundary(previous: f64, current: f64) -> bool {
    let reference = (current / TAU).floor() * TAU;
    (previous - reference < 0.0) != (current - reference < 0.0)
}

/// Indices of samples that start a new rotation.
/// The first sample counts when it sits exactly on a multiple of 360°.
pub fn boundaries(samples: &[Sample]) -> Vec<usize> {
    let mut found = Vec::new();
    if let Some(first) = samples.first() {
        if first.angle.0.rem_euclid(TAU) == 0.0 {
            found.push(0);
        }
    }
    found.extend(
        samples
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| is_boundary(pair[0].angle.0, pair[1].angle.0))
            .map(|(index, _)| index + 1),
    );
    found
}

/// Number of complete boundary-to-boundary slices
pub fn count_cycles(samples: &[Sample]) -> usize {
    boundaries(samples).len().saturating_sub(1)
}

/// Walk back from the newest sample collecting up to `n` complete cycles, returned oldest first.
pub fn last_cycles(samples: &[Sample], n: usize) -> Vec<Cycle> {
    let found = boundaries(samples);
    let mut cycles: Vec<Cycle> = found
        .windows(2)
        .rev()
        .take(n)
        .map(|bounds| Cycle::from_samples(&samples[bounds[0]..bounds[1]]))
        .collect();
    cycles.reverse();
    cycles
}
