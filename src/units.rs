/*
 * Copyright (c) 2020. Beautiful Code BV, Rotterdam, Netherlands
 * Licensed under GNU GENERAL PUBLIC LICENSE Version 3.
 */

//! Physical units for crank and stimulation quantities
//!
//! Type-safe wrappers so that angles in degrees never get mixed up with
//! radians, and stimulation amplitudes never get mixed up with pulse widths.

use std::f64::consts::TAU;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Deref, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Angle in degrees
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Degrees(pub f64);

/// Angle in radians, usually the cumulative crank angle from the sensor
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Radians(pub f64);

/// Angular speed in degrees per second
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct DegreesPerSecond(pub f64);

/// Stimulation amplitude in milliamps
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Milliamps(pub f64);

/// Stimulation pulse width in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Microseconds(pub u16);

/// One full crank rotation
pub const FULL_CIRCLE: Degrees = Degrees(360.0);

impl Deref for Degrees {
    type Target = f64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for Radians {
    type Target = f64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for DegreesPerSecond {
    type Target = f64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for Milliamps {
    type Target = f64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for Microseconds {
    type Target = u16;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Degrees {
    /// Wrap into [0, 360).
    /// `rem_euclid` can round a tiny negative input up to exactly 360, which is folded back to 0.
    pub fn wrapped(self) -> Self {
        let wrapped = self.0.rem_euclid(FULL_CIRCLE.0);
        if wrapped >= FULL_CIRCLE.0 {
            Self(0.0)
        } else {
            Self(wrapped)
        }
    }

    /// True for angles in [0, 360)
    pub fn is_normalized(self) -> bool {
        self.0 >= 0.0 && self.0 < FULL_CIRCLE.0
    }

    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}

impl Radians {
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }

    /// Number of completed rotations contained in a cumulative angle
    pub fn rotations(self) -> f64 {
        (self.0 / TAU).floor()
    }
}

impl DegreesPerSecond {
    pub fn from_radians_per_second(radians_per_second: f64) -> Self {
        Self(radians_per_second.to_degrees())
    }
}

impl Add for Degrees {
    type Output = Degrees;

    fn add(self, rhs: Degrees) -> Degrees {
        Degrees(self.0 + rhs.0)
    }
}

impl Sub for Degrees {
    type Output = Degrees;

    fn sub(self, rhs: Degrees) -> Degrees {
        Degrees(self.0 - rhs.0)
    }
}

// Dead reckoning: speed times elapsed seconds gives an angle increment
impl Mul<f64> for DegreesPerSecond {
    type Output = Degrees;

    fn mul(self, seconds: f64) -> Degrees {
        Degrees(self.0 * seconds)
    }
}

impl Display for Degrees {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}°", self.0)
    }
}

impl Display for Milliamps {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}mA", self.0)
    }
}

impl Display for Microseconds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapping() {
        assert_eq!(Degrees(370.0).wrapped(), Degrees(10.0));
        assert_eq!(Degrees(-30.0).wrapped(), Degrees(330.0));
        assert_eq!(Degrees(360.0).wrapped(), Degrees(0.0));
        assert!(Degrees(-1e-17).wrapped().is_normalized());
    }

    #[test]
    fn test_rotations() {
        assert_eq!(Radians(0.0).rotations(), 0.0);
        assert_eq!(Radians(TAU).rotations(), 1.0);
        assert_eq!(Radians(TAU * 2.5).rotations(), 2.0);
    }

    #[test]
    fn test_dead_reckoning_increment() {
        let increment = DegreesPerSecond(360.0) * 0.25;
        assert_eq!(increment, Degrees(90.0));
    }
}
