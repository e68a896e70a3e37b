//! Box-constrained minimization of a smooth function of three variables.
//!
//! Projected gradient descent: central finite-difference gradients scaled by
//! the box widths, a backtracking line search, and every iterate clamped back
//! into the box.

use crate::surrogate::Point;

pub type Bounds = [(f64, f64); 3];

const MAX_ITERATIONS: usize = 100;
const RELATIVE_STEP: f64 = 1e-4;
const MIN_STEP: f64 = 1e-6;

pub fn clamp(x: &Point, bounds: &Bounds) -> Point {
    let mut clamped = *x;
    for (value, &(lo, hi)) in clamped.iter_mut().zip(bounds) {
        *value = value.clamp(lo, hi);
    }
    clamped
}

/// Gradient in box-width units, one-sided where the box cuts the stencil
fn scaled_gradient<F: Fn(&Point) -> f64>(f: &F, x: &Point, bounds: &Bounds) -> Point {
    let mut gradient = [0.0; 3];
    for (dimension, &(lo, hi)) in bounds.iter().enumerate() {
        let width = hi - lo;
        let h = RELATIVE_STEP * width;
        let mut forward = *x;
        let mut backward = *x;
        forward[dimension] = (x[dimension] + h).min(hi);
        backward[dimension] = (x[dimension] - h).max(lo);
        let span = forward[dimension] - backward[dimension];
        if span > 0.0 {
            gradient[dimension] = (f(&forward) - f(&backward)) / span * width;
        }
    }
    gradient
}

/// Local minimum of `f` inside `bounds` starting from `start`, with its value
pub fn minimize_bounded<F>(f: F, start: &Point, bounds: &Bounds) -> (Point, f64)
where
    F: Fn(&Point) -> f64,
{
    let mut x = clamp(start, bounds);
    let mut fx = f(&x);
    for _ in 0..MAX_ITERATIONS {
        let gradient = scaled_gradient(&f, &x, bounds);
        let largest = gradient.iter().fold(0.0f64, |m, g| m.max(g.abs()));
        if !(largest > 0.0) {
            break;
        }
        // Halve the step until it improves, then keep halving while it improves further
        let mut step = 0.5;
        let mut accepted: Option<(Point, f64)> = None;
        while step >= MIN_STEP {
            let mut candidate = x;
            for (dimension, &(lo, hi)) in bounds.iter().enumerate() {
                candidate[dimension] -= step * (hi - lo) * gradient[dimension] / largest;
            }
            let candidate = clamp(&candidate, bounds);
            let value = f(&candidate);
            if value < accepted.map_or(fx, |(_, lowest)| lowest) {
                accepted = Some((candidate, value));
            } else if accepted.is_some() {
                break;
            }
            step *= 0.5;
        }
        match accepted {
            Some((candidate, value)) => {
                x = candidate;
                fx = value;
            }
            None => break,
        }
    }
    (x, fx)
}
