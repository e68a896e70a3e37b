use crate::error::DeviceError;
use crate::muscle::MuscleKey;
use crate::units::{Microseconds, Milliamps};

/// Initial configuration of one stimulator channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSetup {
    pub number: u8,
    pub muscle: MuscleKey,
    pub amplitude: Milliamps,
    pub pulse_width: Microseconds,
}

/// A multi-channel stimulator.
///
/// Amplitude and pulse width changes are staged per channel and only reach the
/// electrodes when [`apply`](StimulatorDevice::apply) pushes them all at once.
/// The session is bounded by `start` and `pause`/`end`/`disconnect`.
pub trait StimulatorDevice: Send {
    fn start(&mut self, channels: &[ChannelSetup]) -> Result<(), DeviceError>;

    fn set_amplitude(&mut self, channel: u8, amplitude: Milliamps) -> Result<(), DeviceError>;

    fn set_pulse_width(&mut self, channel: u8, pulse_width: Microseconds)
        -> Result<(), DeviceError>;

    fn apply(&mut self) -> Result<(), DeviceError>;

    fn pause(&mut self) -> Result<(), DeviceError>;

    fn end(&mut self) -> Result<(), DeviceError>;

    fn disconnect(&mut self) -> Result<(), DeviceError>;
}
