//! Angle-triggered multi-channel stimulation.
//!
//! Each muscle owns a channel that is either active or inactive. On every tick
//! the controller compares the crank angle with each channel's absolute window
//! and only talks to the stimulator when at least one channel changed state.

pub mod device;


use std::sync::Mutex;

use log::{debug, info, warn};

use crate::config::MuscleConfig;
use crate::error::{DeviceError, SessionError, SessionResult};
use crate::lock;
use crate::muscle::MuscleKey;
use crate::params::AbsoluteParameters;
use crate::units::{Degrees, Microseconds, Milliamps};

pub use device::{ChannelSetup, StimulatorDevice};

/// Whether `angle` lies inside the window running from `onset` to `offset`.
///
/// Both boundaries belong to the window. When `onset > offset` the window wraps
/// through 0°. Equal onset and offset define no arc at all and are rejected.
pub fn is_active(onset: Degrees, offset: Degrees, angle: Degrees) -> SessionResult<bool> {
    if onset < offset {
        Ok(onset <= angle && angle <= offset)
    } else if onset > offset {
        Ok(!(offset < angle && angle < onset))
    } else {
        Err(SessionError::DegenerateWindow(onset.0))
    }
}

/// Actuator state of one muscle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub muscle: MuscleKey,
    pub number: u8,
    pub intensity: Milliamps,
    pub pulse_width: Microseconds,
    pub onset: Degrees,
    pub offset: Degrees,
    pub active: bool,
}

impl Channel {
    pub fn new(muscle: MuscleKey, config: &MuscleConfig) -> Self {
        Self {
            muscle,
            number: muscle.channel(),
            intensity: config.default_intensity,
            pulse_width: config.pulse_width,
            onset: config.center_onset,
            offset: config.center_offset,
            active: false,
        }
    }

    pub fn contains(&self, angle: Degrees) -> SessionResult<bool> {
        is_active(self.onset, self.offset, angle)
    }
}

/// A staged change for one channel, produced by a tick
#[derive(Debug, Clone, Copy)]
struct ChannelCommand {
    muscle: MuscleKey,
    number: u8,
    activate: bool,
    amplitude: Milliamps,
    pulse_width: Microseconds,
}

pub struct StimulationController {
    channels: Mutex<Vec<Channel>>,
    device: Mutex<Box<dyn StimulatorDevice>>,
}

impl StimulationController {
    pub fn new(muscles: &[(MuscleKey, MuscleConfig)], device: Box<dyn StimulatorDevice>) -> Self {
        let channels = muscles
            .iter()
            .map(|(muscle, config)| Channel::new(*muscle, config))
            .collect();
        Self {
            channels: Mutex::new(channels),
            device: Mutex::new(device),
        }
    }

    /// Open the stimulation session with every channel silent.
    pub fn start(&self) -> SessionResult<()> {
        let setups: Vec<ChannelSetup> = lock(&self.channels)
            .iter()
            .map(|channel| ChannelSetup {
                number: channel.number,
                muscle: channel.muscle,
                amplitude: Milliamps(0.0),
                pulse_width: channel.pulse_width,
            })
            .collect();
        let numbers: Vec<u8> = setups.iter().map(|s| s.number).collect();
        info!("Starting stimulation on channels {numbers:?}");
        lock(&self.device).start(&setups)?;
        Ok(())
    }

    /// Install new absolute windows, and new intensities only when `apply_intensity` is set.
    /// Nothing changes if any window is degenerate or names a muscle without a channel.
    pub fn apply_parameters(
        &self,
        parameters: &AbsoluteParameters,
        apply_intensity: bool,
    ) -> SessionResult<()> {
        let mut channels = lock(&self.channels);
        for (muscle, window) in parameters.iter() {
            if !channels.iter().any(|channel| channel.muscle == muscle) {
                return Err(SessionError::UnknownMuscle(muscle));
            }
            if window.onset == window.offset {
                return Err(SessionError::DegenerateWindow(window.onset.0));
            }
        }
        for channel in channels.iter_mut() {
            let Some(window) = parameters.get(channel.muscle) else {
                continue;
            };
            channel.onset = window.onset;
            channel.offset = window.offset;
            if apply_intensity {
                channel.intensity = window.intensity;
            }
            debug!(
                "{}: window {} -> {} at {}",
                channel.muscle, channel.onset, channel.offset, channel.intensity
            );
        }
        if !apply_intensity {
            warn!("Stimulation windows updated, intensities left unchanged");
        }
        Ok(())
    }

    /// One control pass at `angle`. Returns the number of channels that changed state.
    ///
    /// Device failures are reported as recoverable and the affected channels are
    /// restored, so the next tick retries the same transitions.
    pub fn tick(&self, angle: Degrees) -> SessionResult<usize> {
        if !angle.is_normalized() {
            return Err(SessionError::AngleOutOfRange(angle.0));
        }
        let commands = {
            let mut channels = lock(&self.channels);
            let desired = channels
                .iter()
                .map(|channel| channel.contains(angle))
                .collect::<SessionResult<Vec<bool>>>()?;
            let mut commands = Vec::new();
            for (channel, should_be_active) in channels.iter_mut().zip(desired) {
                if should_be_active == channel.active {
                    continue;
                }
                channel.active = should_be_active;
                commands.push(ChannelCommand {
                    muscle: channel.muscle,
                    number: channel.number,
                    activate: should_be_active,
                    amplitude: if should_be_active { channel.intensity } else { Milliamps(0.0) },
                    pulse_width: channel.pulse_width,
                });
            }
            commands
        };
        if commands.is_empty() {
            return Ok(0);
        }
        if let Err(error) = self.push(&commands) {
            self.revert(&commands);
            return Err(error.into());
        }
        Ok(commands.len())
    }

    fn push(&self, commands: &[ChannelCommand]) -> Result<(), DeviceError> {
        let mut device = lock(&self.device);
        for command in commands {
            device.set_amplitude(command.number, command.amplitude)?;
            if command.activate {
                device.set_pulse_width(command.number, command.pulse_width)?;
            }
        }
        device.apply()
    }

    fn revert(&self, commands: &[ChannelCommand]) {
        let mut channels = lock(&self.channels);
        for command in commands {
            if let Some(channel) = channels.iter_mut().find(|c| c.muscle == command.muscle) {
                channel.active = !command.activate;
            }
        }
    }

    /// Silence every channel and close the device session.
    /// Every step is attempted even when an earlier one fails; the first failure is returned.
    pub fn shutdown(&self) -> SessionResult<()> {
        let numbers: Vec<u8> = {
            let mut channels = lock(&self.channels);
            channels.iter_mut().for_each(|channel| channel.active = false);
            channels.iter().map(|channel| channel.number).collect()
        };
        let mut device = lock(&self.device);
        let mut results = Vec::new();
        for number in &numbers {
            results.push(device.set_amplitude(*number, Milliamps(0.0)));
        }
        results.push(device.apply());
        results.push(device.pause());
        results.push(device.end());
        results.push(device.disconnect());
        info!("Stimulation stopped, device disconnected");
        match results.into_iter().find_map(Result::err) {
            Some(error) => {
                warn!("Stimulator shutdown reported: {error}");
                Err(error.into())
            }
            None => Ok(()),
        }
    }

    fn channel(&self, muscle: MuscleKey) -> Option<Channel> {
        lock(&self.channels).iter().find(|c| c.muscle == muscle).copied()
    }

    pub fn intensity(&self, muscle: MuscleKey) -> Option<Milliamps> {
        self.channel(muscle).map(|channel| channel.intensity)
    }

    pub fn window(&self, muscle: MuscleKey) -> Option<(Degrees, Degrees)> {
        self.channel(muscle).map(|channel| (channel.onset, channel.offset))
    }

    pub fn is_channel_active(&self, muscle: MuscleKey) -> Option<bool> {
        self.channel(muscle).map(|channel| channel.active)
    }

    pub fn channels(&self) -> Vec<Channel> {
        lock(&self.channels).clone()
    }
}
