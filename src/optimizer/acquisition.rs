/// Posterior standard deviations are floored to this before dividing
pub const MIN_STD: f64 = 1e-10;

/// Standard normal density
pub fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF, Hart / Abramowitz-Stegun rational approximation.
/// Saturates to exactly 0 and 1 beyond ±8.
pub fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }
    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let inner = 1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429);
    let poly = t * (0.319_381_530 + t * (-0.356_563_782 + t * inner));
    let upper = 1.0 - norm_pdf(x.abs()) * poly;
    if x >= 0.0 {
        upper
    } else {
        1.0 - upper
    }
}

/// PI(x) = Φ((best − μ − ξ) / σ) for a minimization problem
pub fn probability_of_improvement(mean: f64, std: f64, best: f64, xi: f64) -> f64 {
    norm_cdf((best - mean - xi) / std.max(MIN_STD))
}
