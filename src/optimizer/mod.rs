//! Bayesian optimization of stimulation timing and intensity.
//!
//! Every muscle has its own Gaussian Process surrogate, but all muscles are
//! stimulated together, so each objective call evaluates one candidate per
//! muscle and returns one cost per muscle.
//!
//! The run has two phases:
//! 1. Habituation: `n_init` candidates with random timing and an intensity that
//!    ramps from the lower to the upper bound, so the subject gets used to the
//!    current gradually.
//! 2. Search: `n_iterations` candidates, each the maximizer of the Probability
//!    of Improvement under the muscle's surrogate.

pub mod acquisition;
pub mod history;
pub mod local_search;


use std::collections::BTreeMap;

use log::{debug, info, warn};
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ParameterBounds;
use crate::error::{SessionError, SessionResult};
use crate::muscle::MuscleKey;
use crate::params::{MuscleParameters, StimulationParameters};
use crate::surrogate::{GaussianProcess, Point};

use acquisition::probability_of_improvement;
use local_search::{minimize_bounded, Bounds};

pub use history::{MuscleHistory, MuscleReport, Observation, OptimizationReport};

/// Cost per muscle, lower is better
pub type CostVector = BTreeMap<MuscleKey, f64>;

/// Something that can put a candidate to the test.
pub trait Objective {
    fn evaluate(&mut self, parameters: &StimulationParameters) -> SessionResult<CostVector>;
}

impl<F> Objective for F
where
    F: FnMut(&StimulationParameters) -> SessionResult<CostVector>,
{
    fn evaluate(&mut self, parameters: &StimulationParameters) -> SessionResult<CostVector> {
        self(parameters)
    }
}

/// Configuration for the optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Habituation evaluations before the surrogates take over
    pub n_init: usize,
    pub n_iterations: usize,
    /// Required margin of improvement in the acquisition function
    pub xi: f64,
    pub length_scale: f64,
    pub noise: f64,
    /// Random starting points of the acquisition search
    pub n_restarts: usize,
    /// Fixed seed for reproducible runs, system time otherwise
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            n_init: 8,
            n_iterations: 20,
            xi: 0.01,
            length_scale: 1.0,
            noise: 1e-6,
            n_restarts: 10,
            seed: None,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> SessionResult<()> {
        let problem = if self.n_init == 0 {
            Some("n_init must be at least 1")
        } else if self.n_restarts == 0 {
            Some("n_restarts must be at least 1")
        } else if !(self.length_scale > 0.0) {
            Some("length_scale must be positive")
        } else if !(self.noise >= 0.0) {
            Some("noise must not be negative")
        } else if !self.xi.is_finite() {
            Some("xi must be finite")
        } else {
            None
        };
        match problem {
            Some(reason) => Err(SessionError::InvalidConfig(reason.to_string())),
            None => Ok(()),
        }
    }

    fn master_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(42)
        })
    }
}

/// Search state of one muscle
#[derive(Debug, Clone)]
struct MuscleSearch {
    muscle: MuscleKey,
    bounds: Bounds,
    history: MuscleHistory,
    model: GaussianProcess,
}

impl MuscleSearch {
    fn random_point(&self, rng: &mut ChaCha8Rng) -> Point {
        let [onset, offset, intensity] = self.bounds;
        [
            rng.random_range(onset.0..=onset.1),
            rng.random_range(offset.0..=offset.1),
            rng.random_range(intensity.0..=intensity.1),
        ]
    }

    /// Maximize PI by minimizing its negative from `n_restarts` random starts.
    /// Runs on a rayon worker, so all randomness comes from `seed`.
    fn propose(&self, config: &OptimizerConfig, seed: u64) -> Point {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let best = match self.history.best() {
            Some(best) if self.model.is_fitted() => best.cost,
            _ => {
                debug!("{}: no surrogate yet, drawing a random candidate", self.muscle);
                return self.random_point(&mut rng);
            }
        };
        let negative_pi = |x: &Point| match self.model.predict(x) {
            Ok((mean, std)) => -probability_of_improvement(mean, std, best, config.xi),
            Err(_) => 0.0,
        };
        let starts: Vec<Point> =
            (0..config.n_restarts).map(|_| self.random_point(&mut rng)).collect();
        let scored = match self.model.predict_batch(&starts) {
            Ok(predictions) => predictions,
            Err(error) => {
                warn!("{}: cannot score starts ({error}), drawing a random candidate", self.muscle);
                return self.random_point(&mut rng);
            }
        };
        // Seeded with the best raw start
        let mut winner = starts
            .iter()
            .zip(scored)
            .map(|(start, (mean, std))| {
                (*start, -probability_of_improvement(mean, std, best, config.xi))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        for start in &starts {
            let (x, value) = minimize_bounded(&negative_pi, start, &self.bounds);
            if winner.map_or(true, |(_, lowest)| value < lowest) {
                winner = Some((x, value));
            }
        }
        match winner {
            Some((x, value)) => {
                debug!("{}: PI {:.4} at {:?}", self.muscle, -value, x);
                x
            }
            None => self.random_point(&mut rng),
        }
    }

    fn refit(&mut self, config: &OptimizerConfig) {
        if self.history.is_empty() {
            return;
        }
        if let Err(error) = self.model.fit(self.history.inputs(), self.history.outputs()) {
            warn!(
                "{}: surrogate fit failed ({error}), keeping the model of {} observations",
                self.muscle,
                self.model.observation_count()
            );
        } else {
            debug!(
                "{}: surrogate length scale {} noise {} over {} points",
                self.muscle,
                config.length_scale,
                config.noise,
                self.history.len()
            );
        }
    }
}

pub struct BayesianOptimizer {
    config: OptimizerConfig,
    /// Master RNG, also the source of per-muscle task seeds
    rng: ChaCha8Rng,
    searches: Vec<MuscleSearch>,
    evaluations: usize,
}

impl BayesianOptimizer {
    pub fn new(muscles: Vec<(MuscleKey, ParameterBounds)>, config: OptimizerConfig) -> Self {
        let master_seed = config.master_seed();
        info!("Bayesian optimizer seeded with {master_seed}");
        let searches = muscles
            .into_iter()
            .map(|(muscle, bounds)| MuscleSearch {
                muscle,
                bounds: bounds.as_array(),
                history: MuscleHistory::default(),
                model: GaussianProcess::new(config.length_scale, config.noise),
            })
            .collect();
        Self {
            rng: ChaCha8Rng::seed_from_u64(master_seed),
            config,
            searches,
            evaluations: 0,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn history(&self, muscle: MuscleKey) -> Option<&MuscleHistory> {
        self.searches
            .iter()
            .find(|search| search.muscle == muscle)
            .map(|search| &search.history)
    }

    /// Habituation candidate `index` of `n_init`: random timing, ramped intensity.
    pub fn initial_candidate(&mut self, index: usize) -> StimulationParameters {
        let steps = self.config.n_init.saturating_sub(1);
        let mut candidate = StimulationParameters::new();
        for search in &self.searches {
            let [onset, offset, (low, high)] = search.bounds;
            let intensity = if steps == 0 {
                low
            } else {
                low + index as f64 * (high - low) / steps as f64
            };
            let x = [
                self.rng.random_range(onset.0..=onset.1),
                self.rng.random_range(offset.0..=offset.1),
                intensity,
            ];
            candidate = candidate.with(search.muscle, MuscleParameters::from_vector(x));
        }
        candidate
    }

    /// Next candidate from the surrogates, one acquisition search per muscle in parallel.
    pub fn suggest(&mut self) -> StimulationParameters {
        let task_seeds: Vec<u64> = (0..self.searches.len()).map(|_| self.rng.random()).collect();
        let config = &self.config;
        self.searches
            .par_iter()
            .zip(task_seeds.into_par_iter())
            .map(|(search, seed)| {
                let point = search.propose(config, seed);
                (search.muscle, MuscleParameters::from_vector(point))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    /// Record one evaluation. Every muscle must have a cost; nothing is recorded otherwise.
    pub fn observe(
        &mut self,
        candidate: &StimulationParameters,
        costs: &CostVector,
    ) -> SessionResult<()> {
        for search in &self.searches {
            candidate.require(search.muscle)?;
            if !costs.contains_key(&search.muscle) {
                return Err(SessionError::InvalidConfig(format!(
                    "no cost reported for {}",
                    search.muscle
                )));
            }
        }
        for search in &mut self.searches {
            let parameters = candidate.require(search.muscle);
            let (Ok(parameters), Some(&cost)) = (parameters, costs.get(&search.muscle)) else {
                continue;
            };
            if search.history.record(parameters.as_vector(), cost) {
                let label = parameters_label(parameters);
                info!("{}: new best cost {cost:.3} with {label}", search.muscle);
            }
        }
        self.evaluations += 1;
        Ok(())
    }

    /// Refit every surrogate on its full history
    pub fn refit(&mut self) {
        let config = &self.config;
        for search in &mut self.searches {
            search.refit(config);
        }
    }

    /// Run the habituation phase and fit the first surrogates.
    pub fn initialize<O: Objective + ?Sized>(&mut self, objective: &mut O) -> SessionResult<()> {
        for index in 0..self.config.n_init {
            let candidate = self.initial_candidate(index);
            info!("Habituation {}/{}: {candidate}", index + 1, self.config.n_init);
            let costs = objective.evaluate(&candidate)?;
            self.observe(&candidate, &costs)?;
        }
        self.refit();
        Ok(())
    }

    /// Full run. Cancellation ends it early with the best found so far.
    pub fn optimize<O: Objective + ?Sized>(
        &mut self,
        objective: &mut O,
    ) -> SessionResult<OptimizationReport> {
        match self.run(objective) {
            Ok(()) => {
                info!("Optimization finished after {} evaluations", self.evaluations);
                Ok(self.report(false))
            }
            Err(SessionError::Cancelled) => {
                warn!("Optimization cancelled after {} evaluations", self.evaluations);
                Ok(self.report(true))
            }
            Err(error) => Err(error),
        }
    }

    fn run<O: Objective + ?Sized>(&mut self, objective: &mut O) -> SessionResult<()> {
        self.initialize(objective)?;
        for iteration in 0..self.config.n_iterations {
            let candidate = self.suggest();
            info!("Iteration {}/{}: {candidate}", iteration + 1, self.config.n_iterations);
            let costs = objective.evaluate(&candidate)?;
            self.observe(&candidate, &costs)?;
            self.refit();
        }
        Ok(())
    }

    pub fn report(&self, cancelled: bool) -> OptimizationReport {
        let histories: BTreeMap<MuscleKey, MuscleHistory> = self
            .searches
            .iter()
            .map(|search| (search.muscle, search.history.clone()))
            .collect();
        OptimizationReport::new(&histories, self.evaluations, cancelled)
    }
}

fn parameters_label(parameters: &MuscleParameters) -> String {
    format!(
        "onset {:+.1}° offset {:+.1}° intensity {:.1}mA",
        parameters.onset_deg, parameters.offset_deg, parameters.intensity
    )
}
