//! The three loops of a stimulation session.
//!
//! Sensor ingestion and stimulation control run on their own threads at fixed
//! periods while the optimizer runs on the calling thread. They share the
//! [`AngleTracker`] state, the [`StimulationController`] and one [`StopSignal`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use instant::Instant;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::{DeviceError, SessionError, SessionResult};
use crate::evaluation::EvaluationPipeline;
use crate::muscle::Side;
use crate::optimizer::{BayesianOptimizer, OptimizationReport};
use crate::params::StimulationParameters;
use crate::pedal::{AngleTracker, SensorSource};
use crate::stimulation::{StimulationController, StimulatorDevice};

/// Raised once to end every loop of a session.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub tick_period_ms: u64,
    pub ingest_period_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 1,
            ingest_period_ms: 5,
        }
    }
}

/// Keep the angle estimate fresh until stopped, then release the sensor.
pub fn ingest_loop(tracker: AngleTracker, period: Duration, stop: StopSignal) {
    let mut waiting = false;
    while !stop.is_raised() {
        match tracker.ingest() {
            Ok(_) => waiting = false,
            Err(error) => {
                if !waiting {
                    debug!("Waiting for sensor data: {error}");
                }
                waiting = true;
            }
        }
        thread::sleep(period);
    }
    tracker.source().close();
    info!("Sensor ingestion stopped");
}

/// Tick the controller with the current angle until stopped.
/// A fatal error raises the stop signal. The controller is shut down on every exit.
pub fn control_loop(
    controller: Arc<StimulationController>,
    tracker: AngleTracker,
    period: Duration,
    stop: StopSignal,
) -> SessionResult<()> {
    let outcome = loop {
        if stop.is_raised() {
            break Ok(());
        }
        if let Some(angle) = tracker.estimate_angle() {
            match controller.tick(angle) {
                Ok(_) => {}
                Err(error) if error.is_recoverable() => {
                    warn!("Control tick failed, retrying: {error}")
                }
                Err(error) => {
                    error!("Stimulation control stopped: {error}");
                    stop.raise();
                    break Err(error);
                }
            }
        }
        thread::sleep(period);
    };
    let shutdown = controller.shutdown();
    outcome.and(shutdown)
}

struct RealTimeLoops {
    ingest: JoinHandle<()>,
    control: JoinHandle<SessionResult<()>>,
}

impl RealTimeLoops {
    fn join(self) -> SessionResult<()> {
        if self.ingest.join().is_err() {
            error!("Sensor ingestion thread panicked");
        }
        self.control
            .join()
            .unwrap_or_else(|_| {
                Err(SessionError::Device(DeviceError::new("control thread panicked")))
            })
    }
}

/// One session on one rig: a sensor, a stimulator and a configuration.
/// The stop signal is one-shot, so a session runs once.
pub struct Session {
    config: SessionConfig,
    tracker: AngleTracker,
    controller: Arc<StimulationController>,
    stop: StopSignal,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn SensorSource>,
        device: Box<dyn StimulatorDevice>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let muscles = config.active_muscles();
        info!(
            "Session with {} on channels {:?}",
            config.muscle_set,
            config.resolved_muscles().channels()
        );
        Ok(Self {
            tracker: AngleTracker::new(source),
            controller: Arc::new(StimulationController::new(&muscles, device)),
            stop: StopSignal::new(),
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn tracker(&self) -> &AngleTracker {
        &self.tracker
    }

    pub fn controller(&self) -> &Arc<StimulationController> {
        &self.controller
    }

    fn start(&self) -> SessionResult<RealTimeLoops> {
        if let Err(error) = self.controller.start() {
            if let Err(shutdown) = self.controller.shutdown() {
                warn!("Shutdown after failed start: {shutdown}");
            }
            return Err(error);
        }
        let ingest = {
            let tracker = self.tracker.clone();
            let period = Duration::from_millis(self.config.loops.ingest_period_ms);
            let stop = self.stop.clone();
            thread::spawn(move || ingest_loop(tracker, period, stop))
        };
        let control = {
            let controller = self.controller.clone();
            let tracker = self.tracker.clone();
            let period = Duration::from_millis(self.config.loops.tick_period_ms);
            let stop = self.stop.clone();
            thread::spawn(move || control_loop(controller, tracker, period, stop))
        };
        Ok(RealTimeLoops { ingest, control })
    }

    /// Run the Bayesian optimization with the real-time loops in the background.
    /// A fatal control error is reported even if the optimizer itself finished.
    pub fn run_optimization(&self) -> SessionResult<OptimizationReport> {
        let loops = self.start()?;
        let bounds: Vec<_> = self
            .config
            .active_muscles()
            .into_iter()
            .map(|(muscle, config)| (muscle, config.bounds))
            .collect();
        let mut optimizer = BayesianOptimizer::new(bounds, self.config.optimizer.clone());
        let mut pipeline = EvaluationPipeline::new(
            self.controller.clone(),
            self.tracker.clone(),
            self.config.active_muscles(),
            self.config.evaluation.clone(),
            self.stop.clone(),
        );
        let outcome = optimizer.optimize(&mut pipeline);
        self.stop.raise();
        let control = loops.join();
        let report = outcome?;
        control?;
        Ok(report)
    }

    /// Stimulate with fixed parameters for `duration`, or until stopped when `None`.
    pub fn stimulate_fixed(
        &self,
        parameters: &StimulationParameters,
        duration: Option<Duration>,
    ) -> SessionResult<()> {
        let pipeline = EvaluationPipeline::new(
            self.controller.clone(),
            self.tracker.clone(),
            self.config.active_muscles(),
            self.config.evaluation.clone(),
            self.stop.clone(),
        );
        let absolute = pipeline.absolute(parameters)?;
        self.controller.apply_parameters(&absolute, true)?;
        info!("Stimulating with {parameters}");
        let loops = self.start()?;
        let started = Instant::now();
        let mut reported = None;
        while !self.stop.is_raised() && duration.map_or(true, |limit| started.elapsed() < limit) {
            thread::sleep(self.config.evaluation.poll_interval());
            let Some(cycle) = self.tracker.get_last_cycles(1).pop() else {
                continue;
            };
            let cycle_start = cycle.samples.first().map(|sample| sample.timestamp);
            if cycle_start != reported {
                reported = cycle_start;
                let power = (cycle.mean_abs_power(Side::Left), cycle.mean_abs_power(Side::Right));
                if let (Some(left), Some(right)) = power {
                    let seconds = cycle.duration();
                    info!("Cycle of {seconds:.2}s: left {left:.1} W, right {right:.1} W");
                }
            }
        }
        self.stop.raise();
        loops.join()
    }
}
