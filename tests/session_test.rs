/// Integration tests running whole sessions against the simulated rig

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use fes_cycle_lab::evaluation::EvaluationConfig;
use fes_cycle_lab::pedal::SampleBuffer;
use fes_cycle_lab::simulation::{ErgometerConfig, MockStimulator, SimulatedErgometer, StimulatorLog};
use fes_cycle_lab::{
    MuscleKey, MuscleParameters, MuscleSet, OptimizerConfig, Session, SessionConfig, SessionError,
    StimulationParameters, StopSignal,
};

struct Rig {
    session: Session,
    log: StimulatorLog,
    ergometer_stop: StopSignal,
    ergometer: JoinHandle<()>,
}

impl Rig {
    fn new(config: SessionConfig) -> Self {
        let buffer = Arc::new(SampleBuffer::new());
        let (device, log) = MockStimulator::new();
        let session = Session::new(config, buffer.clone(), Box::new(device)).unwrap();
        let ergometer_stop = StopSignal::new();
        let ergometer = SimulatedErgometer::new(
            ErgometerConfig {
                cadence_rpm: 1200.0,
                sample_period_ms: 1,
                ..ErgometerConfig::default()
            },
            buffer,
        )
        .with_stimulator(log.clone())
        .spawn(ergometer_stop.clone());
        Self {
            session,
            log,
            ergometer_stop,
            ergometer,
        }
    }

    fn finish(self) -> StimulatorLog {
        self.ergometer_stop.raise();
        self.ergometer.join().unwrap();
        self.log
    }
}

fn fast_config(n_iterations: usize) -> SessionConfig {
    SessionConfig {
        muscle_set: MuscleSet::BicepsTriceps,
        optimizer: OptimizerConfig {
            n_init: 2,
            n_iterations,
            n_restarts: 2,
            seed: Some(3),
            ..OptimizerConfig::default()
        },
        evaluation: EvaluationConfig {
            cycles_to_run: 2,
            cycles_to_keep: 1,
            poll_interval_ms: 5,
            ..EvaluationConfig::default()
        },
        ..SessionConfig::default()
    }
}

#[test]
fn test_optimization_session_runs_to_completion() {
    let rig = Rig::new(fast_config(1));
    let report = rig.session.run_optimization().unwrap();
    let log = rig.finish();

    assert!(!report.cancelled);
    assert_eq!(report.evaluations, 3);
    assert_eq!(report.muscles.len(), 4);
    for (muscle, muscle_report) in &report.muscles {
        assert_eq!(muscle_report.history.len(), 3, "{muscle} history");
        let best = muscle_report.best.unwrap();
        assert!(muscle_report.history.iter().all(|o| best.cost <= o.cost));
    }
    assert!(log.applies() > 0, "The control loop never switched a channel");
    assert!(log.is_disconnected());

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"biceps_r\""));
}

#[test]
fn test_stop_signal_cancels_optimization() {
    let rig = Rig::new(fast_config(1000));
    let stop = rig.session.stop_signal();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(600));
        stop.raise();
    });
    let report = rig.session.run_optimization().unwrap();
    stopper.join().unwrap();
    let log = rig.finish();

    assert!(report.cancelled);
    assert!(report.evaluations < 1000);
    assert!(log.is_disconnected());
}

#[test]
fn test_fixed_stimulation_replay() {
    let mut config = fast_config(0);
    config.muscle_set = MuscleSet::Deltoids;
    let parameters: StimulationParameters = [
        (MuscleKey::DeltPostR, MuscleParameters::from_vector([0.0, 0.0, 6.0])),
        (MuscleKey::DeltAntR, MuscleParameters::from_vector([5.0, -5.0, 6.0])),
        (MuscleKey::DeltPostL, MuscleParameters::from_vector([0.0, 0.0, 6.0])),
        (MuscleKey::DeltAntL, MuscleParameters::from_vector([-5.0, 5.0, 6.0])),
    ]
    .into_iter()
    .collect();
    let rig = Rig::new(config);
    rig.session
        .stimulate_fixed(&parameters, Some(Duration::from_millis(300)))
        .unwrap();
    assert_eq!(
        rig.session.controller().intensity(MuscleKey::DeltAntL).map(|i| i.0),
        Some(6.0)
    );
    let log = rig.finish();
    assert!(log.applies() > 0);
    assert!(log.is_disconnected());
}

#[test]
fn test_replay_rejects_foreign_muscles() {
    let rig = Rig::new(fast_config(0));
    let parameters = StimulationParameters::new()
        .with(MuscleKey::DeltAntL, MuscleParameters::from_vector([0.0, 0.0, 6.0]));
    assert_eq!(
        rig.session.stimulate_fixed(&parameters, Some(Duration::from_millis(10))),
        Err(SessionError::UnknownMuscle(MuscleKey::DeltAntL))
    );
    rig.finish();
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let mut config = fast_config(1);
    config.evaluation.cycles_to_keep = 5;
    let (device, _) = MockStimulator::new();
    let result = Session::new(config, Arc::new(SampleBuffer::new()), Box::new(device));
    assert!(matches!(result, Err(SessionError::InvalidConfig(_))));
}
