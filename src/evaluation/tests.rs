#![cfg(test)]

use std::f64::consts::TAU;
use std::sync::Arc;

use crate::config::{CostArc, MuscleConfig};
use crate::error::SessionError;
use crate::evaluation::{arc_power, muscle_cost, EvaluationConfig, EvaluationPipeline};
use crate::muscle::{MuscleKey, Side};
use crate::optimizer::Objective;
use crate::params::{MuscleParameters, StimulationParameters};
use crate::pedal::{AngleTracker, Cycle, CycleSample, Sample, SampleBuffer};
use crate::session::StopSignal;
use crate::simulation::MockStimulator;
use crate::stimulation::StimulationController;
use crate::units::{Degrees, Milliamps, Radians};

fn cycle(points: &[(f64, f64, f64)]) -> Cycle {
    Cycle {
        samples: points
            .iter()
            .enumerate()
            .map(|(index, &(angle, left_power, right_power))| CycleSample {
                timestamp: index as f64 * 0.01,
                angle: Degrees(angle),
                left_power,
                right_power,
            })
            .collect(),
    }
}

fn right_arc() -> CostArc {
    MuscleConfig::default_for(MuscleKey::BicepsR).cost_arc
}

fn pipeline(buffer: Arc<SampleBuffer>, stop: StopSignal) -> EvaluationPipeline {
    let muscles = vec![(MuscleKey::BicepsR, MuscleConfig::default_for(MuscleKey::BicepsR))];
    let (device, _) = MockStimulator::new();
    let controller = Arc::new(StimulationController::new(&muscles, Box::new(device)));
    let config = EvaluationConfig {
        cycles_to_run: 2,
        cycles_to_keep: 1,
        poll_interval_ms: 1,
        ..EvaluationConfig::default()
    };
    EvaluationPipeline::new(controller, AngleTracker::new(buffer), muscles, config, stop)
}

// ============ Cost Tests ============

#[test]
fn test_arc_power_counts_only_inside() {
    let cycles = [cycle(&[(100.0, 7.0, 1.0), (200.0, 7.0, 3.0), (300.0, 7.0, 5.0)])];
    assert_eq!(arc_power(&cycles, &right_arc()), Ok(9.0));
    let complement = MuscleConfig::default_for(MuscleKey::TricepsR).cost_arc;
    assert_eq!(arc_power(&cycles, &complement), Ok(26.0));
}

#[test]
fn test_arc_boundaries_are_inclusive() {
    let cycles = [cycle(&[(110.0, 0.0, 2.0), (285.0, 0.0, 2.0)])];
    assert_eq!(arc_power(&cycles, &right_arc()), Ok(8.0));
}

#[test]
fn test_wrapping_arc_boundaries_are_inclusive() {
    let triceps = MuscleConfig::default_for(MuscleKey::TricepsR).cost_arc;
    assert!(triceps.start > triceps.end);
    let cycles = [cycle(&[(285.0, 0.0, 2.0), (110.0, 0.0, 2.0), (200.0, 0.0, 3.0)])];
    assert_eq!(arc_power(&cycles, &triceps), Ok(8.0));
    assert_eq!(arc_power(&cycles, &right_arc()), Ok(17.0));

    let biceps_l = MuscleConfig::default_for(MuscleKey::BicepsL).cost_arc;
    let left = [cycle(&[(290.0, 3.0, 0.0), (105.0, 1.0, 0.0), (200.0, 10.0, 0.0)])];
    assert_eq!(arc_power(&left, &biceps_l), Ok(10.0));
}

#[test]
fn test_left_arc_uses_left_power() {
    let arc = MuscleConfig::default_for(MuscleKey::TricepsL).cost_arc;
    assert_eq!(arc.side, Side::Left);
    let cycles = [cycle(&[(200.0, 4.0, 100.0)]), cycle(&[(150.0, -2.0, 100.0)])];
    assert_eq!(arc_power(&cycles, &arc), Ok(20.0));
}

#[test]
fn test_cost_penalizes_intensity() {
    let cycles = [cycle(&[(200.0, 0.0, 3.0)])];
    let cost = muscle_cost(&cycles, &right_arc(), Milliamps(10.0), 0.05).unwrap();
    assert!((cost - (-9.0 + 5.0)).abs() < 1e-12);
}

#[test]
fn test_cycle_angle_out_of_range() {
    let cycles = [cycle(&[(200.0, 0.0, 3.0), (400.0, 0.0, 3.0)])];
    assert_eq!(arc_power(&cycles, &right_arc()), Err(SessionError::AngleOutOfRange(400.0)));
}

// ============ Config Tests ============

#[test]
fn test_evaluation_config_validation() {
    assert!(EvaluationConfig::default().validate().is_ok());
    let keep_too_many = EvaluationConfig {
        cycles_to_run: 2,
        cycles_to_keep: 3,
        ..EvaluationConfig::default()
    };
    assert!(matches!(keep_too_many.validate(), Err(SessionError::InvalidConfig(_))));
    let no_cycles = EvaluationConfig {
        cycles_to_run: 0,
        ..EvaluationConfig::default()
    };
    assert!(no_cycles.validate().is_err());
}

// ============ Pipeline Tests ============

#[test]
fn test_absolute_requires_every_session_muscle() {
    let pipeline = pipeline(Arc::new(SampleBuffer::new()), StopSignal::new());
    let parameters = StimulationParameters::new()
        .with(MuscleKey::BicepsR, MuscleParameters::from_vector([10.0, -10.0, 8.0]));
    let absolute = pipeline.absolute(&parameters).unwrap();
    let window = absolute.get(MuscleKey::BicepsR).unwrap();
    assert_eq!((window.onset, window.offset), (Degrees(140.0), Degrees(270.0)));

    let foreign = parameters
        .clone()
        .with(MuscleKey::DeltAntL, MuscleParameters::from_vector([0.0, 0.0, 5.0]));
    assert_eq!(pipeline.absolute(&foreign), Err(SessionError::UnknownMuscle(MuscleKey::DeltAntL)));
    assert_eq!(
        pipeline.absolute(&StimulationParameters::new()),
        Err(SessionError::UnknownMuscle(MuscleKey::BicepsR))
    );
}

#[test]
fn test_wait_returns_newest_cycles() {
    let buffer = Arc::new(SampleBuffer::new());
    // Boundaries at samples 0, 20 and 40
    for i in 0..=50 {
        let fraction = i as f64 / 20.0;
        buffer.push(Sample {
            timestamp: fraction,
            angle: Radians(TAU * fraction),
            speed: TAU,
            left_power: 0.0,
            right_power: 2.0,
        });
    }
    let pipeline = pipeline(buffer, StopSignal::new());
    let cycles = pipeline.wait_for_cycles().unwrap();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].samples[0].timestamp, 1.0);
    assert_eq!(cycles[0].len(), 20);
    let costs = pipeline.costs(&cycles).unwrap();
    assert!(costs[&MuscleKey::BicepsR] < 0.0);
}

#[test]
fn test_stop_cancels_evaluation() {
    let stop = StopSignal::new();
    let mut pipeline = pipeline(Arc::new(SampleBuffer::new()), stop.clone());
    stop.raise();
    assert_eq!(pipeline.wait_for_cycles(), Err(SessionError::Cancelled));
    let parameters = StimulationParameters::new()
        .with(MuscleKey::BicepsR, MuscleParameters::from_vector([0.0, 0.0, 8.0]));
    assert_eq!(pipeline.evaluate(&parameters), Err(SessionError::Cancelled));
}
