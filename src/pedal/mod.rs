/*
 * Copyright (c) 2020. Beautiful Code BV, Rotterdam, Netherlands
 * Licensed under GNU GENERAL PUBLIC LICENSE Version 3.
 */

//! Crank angle tracking.
//!
//! The ergometer delivers samples at its own irregular rate. The [`AngleTracker`]
//! turns them into an angle estimate that can be read at control-loop rate by
//! integrating the last measured speed, and it segments the sample buffer into
//! complete pedal cycles for cost extraction.

pub mod cycles;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use instant::Instant;
use log::debug;

use crate::error::{SessionError, SessionResult};
use crate::lock;
use crate::muscle::Side;
use crate::units::{Degrees, DegreesPerSecond, Radians};

pub use cycles::{Cycle, CycleSample};

/// One reading from the ergometer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Monotonic sensor timestamp in seconds
    pub timestamp: f64,
    /// Cumulative crank angle, not wrapped
    pub angle: Radians,
    /// Crank speed in radians per second
    pub speed: f64,
    pub left_power: f64,
    pub right_power: f64,
}

impl Sample {
    pub fn power(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.left_power,
            Side::Right => self.right_power,
        }
    }
}

/// Pull-based, time-ordered sample buffer provided by the sensor driver.
/// Readers never mutate it; `clear` restarts the evaluation window.
pub trait SensorSource: Send + Sync {
    fn len(&self) -> usize;

    /// Samples in `range`, clipped to what is currently buffered
    fn samples(&self, range: Range<usize>) -> Vec<Sample>;

    fn clear(&self);

    /// Release the device handle, called once when the ingestion loop stops
    fn close(&self) {}

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn latest(&self) -> Option<Sample> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.samples(len - 1..len).pop()
    }

    fn snapshot(&self) -> Vec<Sample> {
        self.samples(0..usize::MAX)
    }
}

/// In-memory [`SensorSource`] that a driver thread pushes into.
pub struct SampleBuffer {
    samples: Mutex<VecDeque<Sample>>,
    capacity: usize,
}

impl SampleBuffer {
    pub const DEFAULT_CAPACITY: usize = 100_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Oldest samples are dropped once `capacity` is exceeded
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, sample: Sample) {
        let mut samples = lock(&self.samples);
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SampleBuffer {
    fn len(&self) -> usize {
        lock(&self.samples).len()
    }

    fn samples(&self, range: Range<usize>) -> Vec<Sample> {
        let samples = lock(&self.samples);
        let end = range.end.min(samples.len());
        let start = range.start.min(end);
        samples.range(start..end).copied().collect()
    }

    fn clear(&self) {
        lock(&self.samples).clear();
    }
}

/// The last genuinely new sample, and when it arrived.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub sample: Sample,
    pub angle: Degrees,
    pub speed: DegreesPerSecond,
    pub received: Instant,
}

impl Measurement {
    pub fn new(sample: Sample, received: Instant) -> Self {
        Self {
            sample,
            angle: sample.angle.to_degrees().wrapped(),
            speed: DegreesPerSecond::from_radians_per_second(sample.speed),
            received,
        }
    }

    /// Dead reckoning from the measurement to `now`
    pub fn estimate_at(&self, now: Instant) -> Degrees {
        let elapsed = now.saturating_duration_since(self.received).as_secs_f64();
        (self.angle + self.speed * elapsed).wrapped()
    }

    fn is_same_reading(&self, sample: &Sample) -> bool {
        self.sample.angle == sample.angle
            && self.sample.speed == sample.speed
            && self.sample.left_power == sample.left_power
            && self.sample.right_power == sample.right_power
    }
}

/// Shared angle state: written by the ingestion loop, read by the controller and the evaluator.
#[derive(Debug, Clone, Default)]
pub struct AngleState {
    pub measured: Option<Measurement>,
    pub estimate: Option<Degrees>,
}

/// Angle estimation and cycle segmentation on top of a [`SensorSource`].
#[derive(Clone)]
pub struct AngleTracker {
    source: Arc<dyn SensorSource>,
    state: Arc<Mutex<AngleState>>,
}

impl AngleTracker {
    pub fn new(source: Arc<dyn SensorSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(AngleState::default())),
        }
    }

    pub fn source(&self) -> &Arc<dyn SensorSource> {
        &self.source
    }

    /// One pass of the ingestion loop.
    /// Returns true when a new sample reset the dead reckoning,
    /// false when the estimate was only advanced.
    pub fn ingest(&self) -> SessionResult<bool> {
        self.ingest_at(Instant::now())
    }

    pub fn ingest_at(&self, now: Instant) -> SessionResult<bool> {
        let latest = self.source.latest().ok_or(SessionError::SensorUnavailable)?;
        let mut state = lock(&self.state);
        let previous = state.measured;
        match previous {
            Some(measured) if measured.is_same_reading(&latest) => {
                state.estimate = Some(measured.estimate_at(now));
                Ok(false)
            }
            _ => {
                let measured = Measurement::new(latest, now);
                state.estimate = Some(measured.angle);
                state.measured = Some(measured);
                Ok(true)
            }
        }
    }

    /// Fresh dead-reckoned angle in [0, 360), `None` until the first sample arrived
    pub fn estimate_angle(&self) -> Option<Degrees> {
        self.estimate_angle_at(Instant::now())
    }

    pub fn estimate_angle_at(&self, now: Instant) -> Option<Degrees> {
        let mut state = lock(&self.state);
        let estimate = state.measured.map(|measured| measured.estimate_at(now))?;
        state.estimate = Some(estimate);
        Some(estimate)
    }

    /// The estimate as of the last ingestion or estimation pass, possibly one tick stale
    pub fn current_estimate(&self) -> Option<Degrees> {
        lock(&self.state).estimate
    }

    pub fn clear_samples(&self) {
        debug!("Clearing {} buffered samples", self.source.len());
        self.source.clear();
    }

    pub fn completed_cycles(&self) -> usize {
        cycles::count_cycles(&self.source.snapshot())
    }

    /// Up to `n` newest complete cycles, oldest first
    pub fn get_last_cycles(&self, n: usize) -> Vec<Cycle> {
        cycles::last_cycles(&self.source.snapshot(), n)
    }

    /// Mean absolute power of the newest complete cycle on one side
    pub fn last_cycle_mean_power(&self, side: Side) -> Option<f64> {
        self.get_last_cycles(1)
            .first()
            .and_then(|cycle| cycle.mean_abs_power(side))
    }
}
