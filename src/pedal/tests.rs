#![cfg(test)]

use std::f64::consts::{PI, TAU};
use std::sync::Arc;
use std::time::Duration;

use instant::Instant;

use crate::error::SessionError;
use crate::muscle::Side;
use crate::pedal::cycles::{boundaries, count_cycles, is_boundary, last_cycles};
use crate::pedal::{AngleTracker, Measurement, Sample, SampleBuffer, SensorSource};
use crate::units::Radians;

fn sample(timestamp: f64, angle: f64) -> Sample {
    Sample {
        timestamp,
        angle: Radians(angle),
        speed: TAU,
        left_power: 10.0,
        right_power: 20.0,
    }
}

/// Two full rotations sampled in 40 equal steps, first and last sample on a boundary
fn two_rotations() -> Vec<Sample> {
    (0..=40)
        .map(|i| {
            let fraction = i as f64 / 40.0;
            sample(fraction * 2.0, 4.0 * PI * fraction)
        })
        .collect()
}

// ============ Boundary Tests ============

#[test]
fn test_boundary_crossing() {
    assert!(is_boundary(TAU - 0.1, TAU + 0.1));
    assert!(is_boundary(TAU - 0.1, TAU));
    assert!(!is_boundary(TAU, TAU + 0.1), "Landing on the boundary must not count twice");
    assert!(!is_boundary(0.1, 0.2));
    assert!(!is_boundary(TAU + 0.2, TAU + 0.1), "Pedaling backwards is not a new cycle");
}

#[test]
fn test_boundaries_of_two_rotations() {
    assert_eq!(boundaries(&two_rotations()), vec![0, 20, 40]);
    assert_eq!(count_cycles(&two_rotations()), 2);
}

#[test]
fn test_partial_rotation_has_no_cycle() {
    let samples: Vec<Sample> = (0..10).map(|i| sample(i as f64, 0.3 + i as f64 * 0.1)).collect();
    assert_eq!(count_cycles(&samples), 0);
    assert!(last_cycles(&samples, 3).is_empty());
}

// ============ Segmentation Tests ============

#[test]
fn test_last_two_cycles() {
    let samples = two_rotations();
    let cycles = last_cycles(&samples, 2);
    assert_eq!(cycles.len(), 2);
    let total: usize = cycles.iter().map(|cycle| cycle.len()).sum();
    assert_eq!(total, samples.len() - 1);
    assert!(
        cycles[0].samples.last().unwrap().timestamp < cycles[1].samples[0].timestamp,
        "Cycles must not overlap"
    );
}

#[test]
fn test_only_newest_cycles_kept() {
    let samples = two_rotations();
    let cycles = last_cycles(&samples, 1);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].samples[0].timestamp, samples[20].timestamp);
    assert_eq!(last_cycles(&samples, 5).len(), 2);
}

#[test]
fn test_cycle_angles_are_phase_shifted() {
    let cycles = last_cycles(&two_rotations(), 2);
    for cycle in &cycles {
        assert!((cycle.samples[0].angle.0 - 270.0).abs() < 1e-9);
        assert!(cycle.samples.iter().all(|s| s.angle.is_normalized()));
    }
    // Raw 90° is the reference pose, which may land a hair either side of zero
    let reference = cycles[0].samples[5].angle.0;
    assert!(reference < 1e-9 || reference > 360.0 - 1e-9, "Got {reference}");
}

// ============ Tracker Tests ============

#[test]
fn test_dead_reckoning_wraps() {
    let start = Instant::now();
    let measurement = Measurement::new(
        Sample {
            speed: TAU,
            ..sample(0.0, 300f64.to_radians())
        },
        start,
    );
    let estimate = measurement.estimate_at(start + Duration::from_millis(250));
    assert!((estimate.0 - 30.0).abs() < 1e-9, "Expected 30°, got {estimate}");
}

#[test]
fn test_ingest_resets_only_on_new_samples() {
    let buffer = Arc::new(SampleBuffer::new());
    let tracker = AngleTracker::new(buffer.clone());
    assert_eq!(tracker.ingest(), Err(SessionError::SensorUnavailable));
    assert_eq!(tracker.estimate_angle(), None);

    let start = Instant::now();
    buffer.push(sample(0.0, 4.0 * TAU + 10f64.to_radians()));
    assert_eq!(tracker.ingest_at(start), Ok(true));
    assert_eq!(tracker.ingest_at(start + Duration::from_millis(100)), Ok(false));
    let advanced = tracker.current_estimate().unwrap();
    assert!((advanced.0 - 46.0).abs() < 1e-6, "Expected 46°, got {advanced}");

    buffer.push(sample(0.01, 4.0 * TAU + 50f64.to_radians()));
    assert_eq!(tracker.ingest_at(start + Duration::from_millis(110)), Ok(true));
    let reset = tracker.current_estimate().unwrap();
    assert!((reset.0 - 50.0).abs() < 1e-9);
}

#[test]
fn test_tracker_cycles_and_power() {
    let buffer = Arc::new(SampleBuffer::new());
    for s in two_rotations() {
        buffer.push(s);
    }
    let tracker = AngleTracker::new(buffer.clone());
    assert_eq!(tracker.completed_cycles(), 2);
    assert_eq!(tracker.get_last_cycles(3).len(), 2);
    assert_eq!(tracker.last_cycle_mean_power(Side::Left), Some(10.0));
    assert_eq!(tracker.last_cycle_mean_power(Side::Right), Some(20.0));

    tracker.clear_samples();
    assert!(buffer.is_empty());
    assert_eq!(tracker.completed_cycles(), 0);
    assert_eq!(tracker.last_cycle_mean_power(Side::Left), None);
}

#[test]
fn test_buffer_capacity_drops_oldest() {
    let buffer = SampleBuffer::with_capacity(3);
    for i in 0..5 {
        buffer.push(sample(i as f64, i as f64 * 0.1));
    }
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.samples(0..1)[0].timestamp, 2.0);
    assert_eq!(buffer.latest().unwrap().timestamp, 4.0);
    assert!(buffer.samples(10..20).is_empty());
}

#[test]
fn test_full_buffer_keeps_a_sliding_window() {
    let buffer = SampleBuffer::with_capacity(4);
    for i in 0..1000 {
        buffer.push(sample(i as f64, i as f64 * 0.01));
    }
    let timestamps: Vec<f64> = buffer.snapshot().iter().map(|s| s.timestamp).collect();
    assert_eq!(timestamps, vec![996.0, 997.0, 998.0, 999.0]);
    let middle: Vec<f64> = buffer.samples(1..3).iter().map(|s| s.timestamp).collect();
    assert_eq!(middle, vec![997.0, 998.0]);
}
