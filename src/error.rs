use std::fmt;

use crate::muscle::MuscleKey;

/// Failure reported by a stimulator device driver
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceError {
    pub message: String,
}

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DeviceError {}

/// Error types that can occur while stimulating and optimizing
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// A crank angle outside [0, 360) reached a consumer; the sensor or estimator is broken
    AngleOutOfRange(f64),
    /// A stimulation window whose onset equals its offset has no defined arc
    DegenerateWindow(f64),
    /// The surrogate covariance matrix could not be inverted
    SingularMatrix,
    /// Prediction was requested before the surrogate was fitted
    ModelNotFitted,
    /// Parameters or configuration mention a muscle that is not part of the session
    UnknownMuscle(MuscleKey),
    /// Configuration values that cannot work
    InvalidConfig(String),
    /// The stimulator rejected a command
    Device(DeviceError),
    /// No sensor sample has arrived yet
    SensorUnavailable,
    /// The stop signal was raised
    Cancelled,
}

impl SessionError {
    /// Transient errors are logged and retried on the next loop pass
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SessionError::Device(_) | SessionError::SensorUnavailable)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AngleOutOfRange(angle) => write!(f, "Angle {angle} is outside [0, 360)"),
            SessionError::DegenerateWindow(angle) => {
                write!(f, "Onset and offset are both {angle}, the window has no arc")
            }
            SessionError::SingularMatrix => write!(f, "Covariance matrix is singular"),
            SessionError::ModelNotFitted => write!(f, "Surrogate model has not been fitted"),
            SessionError::UnknownMuscle(muscle) => {
                write!(f, "Muscle {muscle} is not part of this session")
            }
            SessionError::InvalidConfig(reason) => write!(f, "Invalid configuration: {reason}"),
            SessionError::Device(error) => write!(f, "Stimulator error: {error}"),
            SessionError::SensorUnavailable => write!(f, "No sensor sample available"),
            SessionError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<DeviceError> for SessionError {
    fn from(error: DeviceError) -> Self {
        SessionError::Device(error)
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
