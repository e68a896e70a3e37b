//! Angle-triggered functional electrical stimulation for arm-crank pedaling,
//! with per-muscle Bayesian optimization of stimulation timing and intensity.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod error;
pub mod evaluation;
pub mod muscle;
pub mod optimizer;
pub mod params;
pub mod pedal;
pub mod session;
pub mod simulation;
pub mod stimulation;
pub mod surrogate;
pub mod units;

pub use config::{MuscleConfig, ParameterBounds, SessionConfig};
pub use error::{DeviceError, SessionError, SessionResult};
pub use muscle::{MuscleKey, MuscleSet, Side};
pub use optimizer::{BayesianOptimizer, CostVector, Objective, OptimizationReport, OptimizerConfig};
pub use params::{MuscleParameters, StimulationParameters};
pub use session::{Session, StopSignal};

/// A panicked holder leaves plain data behind, so poisoning is ignored
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
