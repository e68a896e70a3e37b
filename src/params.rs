use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::config::MuscleConfig;
use crate::error::{SessionError, SessionResult};
use crate::muscle::MuscleKey;
use crate::units::{Degrees, Milliamps};

/// Onset, offset and intensity for one muscle, relative to its physical center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuscleParameters {
    pub onset_deg: f64,
    pub offset_deg: f64,
    pub intensity: f64,
}

impl MuscleParameters {
    pub fn from_vector(x: [f64; 3]) -> Self {
        Self {
            onset_deg: x[0],
            offset_deg: x[1],
            intensity: x[2],
        }
    }

    /// The point the surrogate model sees
    pub fn as_vector(&self) -> [f64; 3] {
        [self.onset_deg, self.offset_deg, self.intensity]
    }

    /// Add the muscle's physical center and wrap into [0, 360)
    pub fn to_absolute(&self, config: &MuscleConfig) -> AbsoluteWindow {
        AbsoluteWindow {
            onset: (config.center_onset + Degrees(self.onset_deg)).wrapped(),
            offset: (config.center_offset + Degrees(self.offset_deg)).wrapped(),
            intensity: Milliamps(self.intensity),
        }
    }
}

/// Window and intensity in crank degrees, ready for the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsoluteWindow {
    pub onset: Degrees,
    pub offset: Degrees,
    pub intensity: Milliamps,
}

/// One candidate for every muscle of the session, evaluated together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StimulationParameters {
    muscles: BTreeMap<MuscleKey, MuscleParameters>,
}

impl StimulationParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, muscle: MuscleKey, parameters: MuscleParameters) -> Self {
        self.muscles.insert(muscle, parameters);
        self
    }

    pub fn get(&self, muscle: MuscleKey) -> Option<&MuscleParameters> {
        self.muscles.get(&muscle)
    }

    pub fn require(&self, muscle: MuscleKey) -> SessionResult<&MuscleParameters> {
        self.get(muscle).ok_or(SessionError::UnknownMuscle(muscle))
    }

    pub fn iter(&self) -> impl Iterator<Item = (MuscleKey, &MuscleParameters)> {
        self.muscles.iter().map(|(&muscle, parameters)| (muscle, parameters))
    }

    pub fn len(&self) -> usize {
        self.muscles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.muscles.is_empty()
    }
}

impl FromIterator<(MuscleKey, MuscleParameters)> for StimulationParameters {
    fn from_iter<T: IntoIterator<Item = (MuscleKey, MuscleParameters)>>(iter: T) -> Self {
        Self {
            muscles: iter.into_iter().collect(),
        }
    }
}

impl Display for StimulationParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(muscle, p)| {
                format!(
                    "{muscle}: {:+.1}°/{:+.1}° @{:.1}mA",
                    p.onset_deg, p.offset_deg, p.intensity
                )
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Absolute form of [`StimulationParameters`], what the controller consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbsoluteParameters {
    muscles: BTreeMap<MuscleKey, AbsoluteWindow>,
}

impl AbsoluteParameters {
    pub fn get(&self, muscle: MuscleKey) -> Option<&AbsoluteWindow> {
        self.muscles.get(&muscle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MuscleKey, &AbsoluteWindow)> {
        self.muscles.iter().map(|(&muscle, window)| (muscle, window))
    }
}

impl FromIterator<(MuscleKey, AbsoluteWindow)> for AbsoluteParameters {
    fn from_iter<T: IntoIterator<Item = (MuscleKey, AbsoluteWindow)>>(iter: T) -> Self {
        Self {
            muscles: iter.into_iter().collect(),
        }
    }
}
