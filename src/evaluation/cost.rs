use crate::config::CostArc;
use crate::error::{SessionError, SessionResult};
use crate::pedal::Cycle;
use crate::stimulation::is_active;
use crate::units::Milliamps;

/// Σ power² over the samples of all `cycles` that fall inside the arc, on the arc's side.
pub fn arc_power(cycles: &[Cycle], arc: &CostArc) -> SessionResult<f64> {
    let mut total = 0.0;
    for sample in cycles.iter().flat_map(|cycle| cycle.samples.iter()) {
        if !sample.angle.is_normalized() {
            return Err(SessionError::AngleOutOfRange(sample.angle.0));
        }
        if is_active(arc.start, arc.end, sample.angle)? {
            total += sample.power(arc.side).powi(2);
        }
    }
    Ok(total)
}

/// Power earned in the arc, penalized by the stimulation intensity.
pub fn muscle_cost(
    cycles: &[Cycle],
    arc: &CostArc,
    intensity: Milliamps,
    intensity_weight: f64,
) -> SessionResult<f64> {
    Ok(-arc_power(cycles, arc)? + intensity_weight * intensity.0.powi(2))
}
