//! Turning a candidate into a cost vector on the live rig.
//!
//! The candidate goes to the controller, the sensor buffer is cleared, and the
//! pipeline waits for enough complete pedal cycles under the new stimulation.
//! The newest cycles are kept and each muscle is scored on its own arc.

pub mod cost;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::MuscleConfig;
use crate::error::{SessionError, SessionResult};
use crate::muscle::MuscleKey;
use crate::optimizer::{CostVector, Objective};
use crate::params::{AbsoluteParameters, StimulationParameters};
use crate::pedal::{AngleTracker, Cycle};
use crate::session::StopSignal;
use crate::stimulation::StimulationController;

pub use cost::{arc_power, muscle_cost};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Complete cycles to wait for after applying a candidate
    pub cycles_to_run: usize,
    /// Newest cycles that enter the cost, the rest is settling time
    pub cycles_to_keep: usize,
    pub poll_interval_ms: u64,
    /// λ in the intensity penalty λ·I²
    pub intensity_weight: f64,
    /// When false only the timing of a candidate reaches the stimulator
    pub apply_intensity: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            cycles_to_run: 5,
            cycles_to_keep: 3,
            poll_interval_ms: 100,
            intensity_weight: 0.05,
            apply_intensity: true,
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> SessionResult<()> {
        if self.cycles_to_run == 0 || self.cycles_to_keep == 0 {
            return Err(SessionError::InvalidConfig("cycle counts must be at least 1".to_string()));
        }
        if self.cycles_to_keep > self.cycles_to_run {
            return Err(SessionError::InvalidConfig(format!(
                "cannot keep {} of {} cycles",
                self.cycles_to_keep, self.cycles_to_run
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(SessionError::InvalidConfig("poll interval must be positive".to_string()));
        }
        if !(self.intensity_weight >= 0.0 && self.intensity_weight.is_finite()) {
            return Err(SessionError::InvalidConfig(
                "intensity weight must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub struct EvaluationPipeline {
    controller: Arc<StimulationController>,
    tracker: AngleTracker,
    muscles: Vec<(MuscleKey, MuscleConfig)>,
    config: EvaluationConfig,
    stop: StopSignal,
}

impl EvaluationPipeline {
    pub fn new(
        controller: Arc<StimulationController>,
        tracker: AngleTracker,
        muscles: Vec<(MuscleKey, MuscleConfig)>,
        config: EvaluationConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            controller,
            tracker,
            muscles,
            config,
            stop,
        }
    }

    fn muscle_config(&self, muscle: MuscleKey) -> SessionResult<&MuscleConfig> {
        self.muscles
            .iter()
            .find(|(key, _)| *key == muscle)
            .map(|(_, config)| config)
            .ok_or(SessionError::UnknownMuscle(muscle))
    }

    /// Absolute windows for `parameters`, which must cover exactly the session's muscles
    pub fn absolute(
        &self,
        parameters: &StimulationParameters,
    ) -> SessionResult<AbsoluteParameters> {
        for (muscle, _) in parameters.iter() {
            self.muscle_config(muscle)?;
        }
        self.muscles
            .iter()
            .map(|(muscle, config)| -> SessionResult<_> {
                Ok((*muscle, parameters.require(*muscle)?.to_absolute(config)))
            })
            .collect()
    }

    /// Poll until `cycles_to_run` cycles are complete, then hand back the newest `cycles_to_keep`
    pub fn wait_for_cycles(&self) -> SessionResult<Vec<Cycle>> {
        loop {
            if self.stop.is_raised() {
                return Err(SessionError::Cancelled);
            }
            let completed = self.tracker.completed_cycles();
            if completed >= self.config.cycles_to_run {
                break;
            }
            thread::sleep(self.config.poll_interval());
        }
        Ok(self.tracker.get_last_cycles(self.config.cycles_to_keep))
    }

    /// Score every muscle on the given cycles at the controller's current intensities
    pub fn costs(&self, cycles: &[Cycle]) -> SessionResult<CostVector> {
        self.muscles
            .iter()
            .map(|(muscle, config)| -> SessionResult<(MuscleKey, f64)> {
                let intensity = self
                    .controller
                    .intensity(*muscle)
                    .ok_or(SessionError::UnknownMuscle(*muscle))?;
                let weight = self.config.intensity_weight;
                let cost = muscle_cost(cycles, &config.cost_arc, intensity, weight)?;
                debug!("{muscle}: cost {cost:.3} at {intensity}");
                Ok((*muscle, cost))
            })
            .collect()
    }
}

impl Objective for EvaluationPipeline {
    fn evaluate(&mut self, parameters: &StimulationParameters) -> SessionResult<CostVector> {
        if self.stop.is_raised() {
            return Err(SessionError::Cancelled);
        }
        let absolute = self.absolute(parameters)?;
        self.controller.apply_parameters(&absolute, self.config.apply_intensity)?;
        self.tracker.clear_samples();
        let cycles = self.wait_for_cycles()?;
        let costs = self.costs(&cycles)?;
        info!(
            "Evaluated {parameters} over {} cycles: {}",
            cycles.len(),
            costs
                .iter()
                .map(|(muscle, cost)| format!("{muscle} {cost:.2}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(costs)
    }
}
