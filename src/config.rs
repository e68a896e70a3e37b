use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::evaluation::EvaluationConfig;
use crate::muscle::{MuscleKey, MuscleSet, ResolvedMuscleSet, Side};
use crate::optimizer::OptimizerConfig;
use crate::session::LoopConfig;
use crate::units::{Degrees, Microseconds, Milliamps};

/// Search box for one muscle: (low, high) per optimized parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    /// Onset relative to the muscle's center onset, degrees
    pub onset: (f64, f64),
    /// Offset relative to the muscle's center offset, degrees
    pub offset: (f64, f64),
    /// Stimulation amplitude, milliamps
    pub intensity: (f64, f64),
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            onset: (-30.0, 30.0),
            offset: (-30.0, 30.0),
            intensity: (5.0, 15.0),
        }
    }
}

impl ParameterBounds {
    /// Bounds in parameter-vector order: onset, offset, intensity
    pub fn as_array(&self) -> [(f64, f64); 3] {
        [self.onset, self.offset, self.intensity]
    }

    pub fn contains(&self, x: &[f64; 3]) -> bool {
        self.as_array()
            .iter()
            .zip(x.iter())
            .all(|(&(lo, hi), &value)| value >= lo && value <= hi)
    }

    fn validate(&self, muscle: MuscleKey) -> SessionResult<()> {
        for (name, (lo, hi)) in ["onset", "offset", "intensity"].iter().zip(self.as_array()) {
            if !(lo < hi) {
                return Err(SessionError::InvalidConfig(format!(
                    "{muscle} {name} bounds [{lo}, {hi}] are empty"
                )));
            }
        }
        if self.intensity.0 < 0.0 {
            return Err(SessionError::InvalidConfig(format!(
                "{muscle} intensity bounds must be positive"
            )));
        }
        Ok(())
    }
}

/// The angular arc of one ergometer side over which a muscle's contribution to power is measured.
/// Evaluated with the same window rule as stimulation, so start > end wraps through 0°.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostArc {
    pub side: Side,
    pub start: Degrees,
    pub end: Degrees,
}

/// Static per-muscle configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuscleConfig {
    /// Physical onset angle that relative onsets are added to
    pub center_onset: Degrees,
    /// Physical offset angle that relative offsets are added to
    pub center_offset: Degrees,
    pub bounds: ParameterBounds,
    pub cost_arc: CostArc,
    /// Intensity used until the optimizer applies one
    pub default_intensity: Milliamps,
    pub pulse_width: Microseconds,
}

// Zero is the left hand in front. Cost arcs are in the cycle frame (shifted by -90°).
const RIGHT_ARC: (f64, f64) = (110.0, 285.0);
const LEFT_ARC: (f64, f64) = (105.0, 290.0);

impl MuscleConfig {
    pub fn default_for(muscle: MuscleKey) -> Self {
        let (center_onset, center_offset) = match muscle {
            MuscleKey::BicepsR | MuscleKey::DeltPostR => (130.0, 280.0),
            MuscleKey::TricepsR | MuscleKey::DeltAntR => (290.0, 90.0),
            MuscleKey::BicepsL | MuscleKey::DeltPostL => (310.0, 100.0),
            MuscleKey::TricepsL | MuscleKey::DeltAntL => (110.0, 270.0),
        };
        let (start, end) = match muscle {
            MuscleKey::BicepsR | MuscleKey::DeltPostR => RIGHT_ARC,
            MuscleKey::TricepsR | MuscleKey::DeltAntR => (RIGHT_ARC.1, RIGHT_ARC.0),
            MuscleKey::BicepsL | MuscleKey::DeltPostL => (LEFT_ARC.1, LEFT_ARC.0),
            MuscleKey::TricepsL | MuscleKey::DeltAntL => LEFT_ARC,
        };
        Self {
            center_onset: Degrees(center_onset),
            center_offset: Degrees(center_offset),
            bounds: ParameterBounds::default(),
            cost_arc: CostArc {
                side: muscle.side(),
                start: Degrees(start),
                end: Degrees(end),
            },
            default_intensity: Milliamps(10.0),
            pulse_width: Microseconds(300),
        }
    }
}

/// Everything a session needs, supplied as static configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub muscle_set: MuscleSet,
    /// Per-muscle overrides, muscles not listed use [`MuscleConfig::default_for`]
    pub muscles: BTreeMap<MuscleKey, MuscleConfig>,
    pub optimizer: OptimizerConfig,
    pub evaluation: EvaluationConfig,
    pub loops: LoopConfig,
}

impl SessionConfig {
    pub fn from_json_file(path: &Path) -> SessionResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| {
                SessionError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
            })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> SessionResult<Self> {
        let config: SessionConfig =
            serde_json::from_str(text).map_err(|e| SessionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn muscle(&self, muscle: MuscleKey) -> MuscleConfig {
        self.muscles
            .get(&muscle)
            .copied()
            .unwrap_or_else(|| MuscleConfig::default_for(muscle))
    }

    pub fn resolved_muscles(&self) -> ResolvedMuscleSet {
        self.muscle_set.resolve()
    }

    /// The muscle configurations of the active set, in channel order
    pub fn active_muscles(&self) -> Vec<(MuscleKey, MuscleConfig)> {
        self.resolved_muscles()
            .muscles()
            .map(|muscle| (muscle, self.muscle(muscle)))
            .collect()
    }

    pub fn validate(&self) -> SessionResult<()> {
        for (muscle, config) in self.active_muscles() {
            config.bounds.validate(muscle)?;
            if config.cost_arc.start == config.cost_arc.end {
                return Err(SessionError::InvalidConfig(format!("{muscle} cost arc is empty")));
            }
        }
        self.evaluation.validate()?;
        self.optimizer.validate()?;
        Ok(())
    }
}
