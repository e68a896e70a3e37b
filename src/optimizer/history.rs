use std::collections::BTreeMap;

use serde::Serialize;

use crate::muscle::MuscleKey;
use crate::params::{MuscleParameters, StimulationParameters};
use crate::surrogate::Point;

/// One evaluated candidate for one muscle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub parameters: MuscleParameters,
    pub cost: f64,
}

/// Append-only record of every evaluation of one muscle, in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct MuscleHistory {
    inputs: Vec<Point>,
    outputs: Vec<f64>,
    best: Option<Observation>,
}

impl MuscleHistory {
    /// Record an observation. Returns true when it became the new best.
    pub fn record(&mut self, x: Point, cost: f64) -> bool {
        self.inputs.push(x);
        self.outputs.push(cost);
        let is_better = self.best.map_or(true, |best| cost < best.cost);
        if is_better {
            self.best = Some(Observation {
                parameters: MuscleParameters::from_vector(x),
                cost,
            });
        }
        is_better
    }

    pub fn inputs(&self) -> &[Point] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[f64] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn best(&self) -> Option<Observation> {
        self.best
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.inputs
            .iter()
            .zip(&self.outputs)
            .map(|(&x, &cost)| Observation {
                parameters: MuscleParameters::from_vector(x),
                cost,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MuscleReport {
    pub best: Option<Observation>,
    pub history: Vec<Observation>,
}

/// Outcome of an optimization run, handed to whoever persists or displays results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub label: String,
    pub evaluations: usize,
    pub cancelled: bool,
    pub muscles: BTreeMap<MuscleKey, MuscleReport>,
}

impl OptimizationReport {
    pub fn new(
        histories: &BTreeMap<MuscleKey, MuscleHistory>,
        evaluations: usize,
        cancelled: bool,
    ) -> Self {
        let label = format!("bayes_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"));
        let muscles = histories
            .iter()
            .map(|(&muscle, history)| {
                let report = MuscleReport {
                    best: history.best(),
                    history: history.observations(),
                };
                (muscle, report)
            })
            .collect();
        Self {
            label,
            evaluations,
            cancelled,
            muscles,
        }
    }

    /// The best parameters of every muscle that has at least one observation
    pub fn best_parameters(&self) -> StimulationParameters {
        self.muscles
            .iter()
            .filter_map(|(&muscle, report)| report.best.map(|best| (muscle, best.parameters)))
            .collect()
    }

    pub fn best_cost(&self, muscle: MuscleKey) -> Option<f64> {
        self.muscles.get(&muscle)?.best.map(|best| best.cost)
    }
}
