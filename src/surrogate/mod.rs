//! Gaussian Process regression over the three stimulation parameters.
//!
//! Zero prior mean, unit-variance RBF kernel with a fixed length scale and a
//! fixed diagonal noise term. Fitting factors the covariance once; prediction
//! is a dot product and one triangular solve per point.

#[cfg(test)]
mod tests;

use log::debug;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};

use crate::error::{SessionError, SessionResult};

/// A point in parameter space: onset, offset, intensity
pub type Point = [f64; 3];

/// Predictions never report less uncertainty than this variance
pub const MIN_VARIANCE: f64 = 1e-10;

#[derive(Debug, Clone)]
struct Fitted {
    inputs: Vec<Point>,
    cholesky: Cholesky<f64, Dyn>,
    /// (K + εI)⁻¹·y
    weights: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct GaussianProcess {
    length_scale: f64,
    noise: f64,
    fitted: Option<Fitted>,
}

impl GaussianProcess {
    pub fn new(length_scale: f64, noise: f64) -> Self {
        Self {
            length_scale,
            noise,
            fitted: None,
        }
    }

    pub fn kernel(&self, a: &Point, b: &Point) -> f64 {
        let squared: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
        (-0.5 * squared / (self.length_scale * self.length_scale)).exp()
    }

    /// K + εI over `inputs`
    fn covariance(&self, inputs: &[Point]) -> DMatrix<f64> {
        let n = inputs.len();
        DMatrix::from_fn(n, n, |i, j| {
            let k = self.kernel(&inputs[i], &inputs[j]);
            if i == j {
                k + self.noise
            } else {
                k
            }
        })
    }

    fn kernel_vector(&self, x: &Point, inputs: &[Point]) -> DVector<f64> {
        DVector::from_iterator(inputs.len(), inputs.iter().map(|input| self.kernel(x, input)))
    }

    /// Replace the training set. On failure the previous model stays in place.
    pub fn fit(&mut self, inputs: &[Point], outputs: &[f64]) -> SessionResult<()> {
        if inputs.is_empty() {
            return Err(SessionError::InvalidConfig("no observations to fit".to_string()));
        }
        if inputs.len() != outputs.len() {
            return Err(SessionError::InvalidConfig(format!(
                "{} inputs but {} outputs",
                inputs.len(),
                outputs.len()
            )));
        }
        let cholesky = Cholesky::new(self.covariance(inputs)).ok_or(SessionError::SingularMatrix)?;
        let weights = cholesky.solve(&DVector::from_column_slice(outputs));
        debug!("Surrogate fitted on {} observations", inputs.len());
        self.fitted = Some(Fitted {
            inputs: inputs.to_vec(),
            cholesky,
            weights,
        });
        Ok(())
    }

    /// Posterior mean and standard deviation at `x`
    pub fn predict(&self, x: &Point) -> SessionResult<(f64, f64)> {
        let fitted = self.fitted.as_ref().ok_or(SessionError::ModelNotFitted)?;
        let k_star = self.kernel_vector(x, &fitted.inputs);
        let mean = k_star.dot(&fitted.weights);
        let variance = self.kernel(x, x) - k_star.dot(&fitted.cholesky.solve(&k_star));
        Ok((mean, variance.max(MIN_VARIANCE).sqrt()))
    }

    /// Predictions at many points from one cross-covariance matrix
    pub fn predict_batch(&self, xs: &[Point]) -> SessionResult<Vec<(f64, f64)>> {
        let fitted = self.fitted.as_ref().ok_or(SessionError::ModelNotFitted)?;
        let cross = DMatrix::from_fn(fitted.inputs.len(), xs.len(), |i, j| {
            self.kernel(&fitted.inputs[i], &xs[j])
        });
        let means = cross.tr_mul(&fitted.weights);
        let solved = fitted.cholesky.solve(&cross);
        Ok(xs
            .iter()
            .enumerate()
            .map(|(j, x)| {
                let variance = self.kernel(x, x) - cross.column(j).dot(&solved.column(j));
                (means[j], variance.max(MIN_VARIANCE).sqrt())
            })
            .collect())
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Size of the training set behind the current model
    pub fn observation_count(&self) -> usize {
        self.fitted.as_ref().map_or(0, |fitted| fitted.inputs.len())
    }
}
