//! Stand-ins for the ergometer and the stimulator.
//!
//! The simulated ergometer pedals at a constant cadence and pushes samples into
//! a [`SampleBuffer`] from its own thread, like a sensor driver would. The mock
//! stimulator records every command it receives, can be told to fail, and can
//! feed the currents it delivers back into the ergometer's power.

use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use instant::Instant;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::error::DeviceError;
use crate::lock;
use crate::muscle::{MuscleKey, Side};
use crate::pedal::{Sample, SampleBuffer};
use crate::session::StopSignal;
use crate::stimulation::{ChannelSetup, StimulatorDevice};
use crate::units::{Microseconds, Milliamps, Radians};

// ============ Mock stimulator ============

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Start(Vec<u8>),
    SetAmplitude(u8, Milliamps),
    SetPulseWidth(u8, Microseconds),
    Apply,
    Pause,
    End,
    Disconnect,
}

/// Shared view of a [`MockStimulator`], kept by whoever handed the device to a controller.
#[derive(Debug, Clone, Default)]
pub struct StimulatorLog {
    calls: Arc<Mutex<Vec<DeviceCall>>>,
    /// Amplitude currently reaching each channel, updated on apply
    delivered: Arc<Mutex<BTreeMap<u8, Milliamps>>>,
    failures: Arc<AtomicUsize>,
}

impl StimulatorLog {
    pub fn calls(&self) -> Vec<DeviceCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| predicate(call)).count()
    }

    pub fn applies(&self) -> usize {
        self.count(|call| *call == DeviceCall::Apply)
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    /// The next `count` applies fail
    pub fn fail_next_applies(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn delivered(&self, channel: u8) -> Milliamps {
        lock(&self.delivered).get(&channel).copied().unwrap_or_default()
    }

    /// Total current delivered to the muscles of one side
    pub fn delivered_on(&self, side: Side) -> Milliamps {
        let delivered = lock(&self.delivered);
        let total = MuscleKey::iter()
            .filter(|muscle| muscle.side() == side)
            .filter_map(|muscle| delivered.get(&muscle.channel()))
            .map(|amplitude| amplitude.0)
            .sum();
        Milliamps(total)
    }

    pub fn is_disconnected(&self) -> bool {
        lock(&self.calls).last() == Some(&DeviceCall::Disconnect)
    }

    fn record(&self, call: DeviceCall) {
        lock(&self.calls).push(call);
    }
}

#[derive(Debug, Default)]
pub struct MockStimulator {
    log: StimulatorLog,
    staged: BTreeMap<u8, Milliamps>,
}

impl MockStimulator {
    pub fn new() -> (Self, StimulatorLog) {
        let stimulator = Self::default();
        let log = stimulator.log.clone();
        (stimulator, log)
    }
}

impl StimulatorDevice for MockStimulator {
    fn start(&mut self, channels: &[ChannelSetup]) -> Result<(), DeviceError> {
        self.staged = channels.iter().map(|c| (c.number, c.amplitude)).collect();
        *lock(&self.log.delivered) = self.staged.clone();
        self.log.record(DeviceCall::Start(channels.iter().map(|c| c.number).collect()));
        Ok(())
    }

    fn set_amplitude(&mut self, channel: u8, amplitude: Milliamps) -> Result<(), DeviceError> {
        self.staged.insert(channel, amplitude);
        self.log.record(DeviceCall::SetAmplitude(channel, amplitude));
        Ok(())
    }

    fn set_pulse_width(
        &mut self,
        channel: u8,
        pulse_width: Microseconds,
    ) -> Result<(), DeviceError> {
        self.log.record(DeviceCall::SetPulseWidth(channel, pulse_width));
        Ok(())
    }

    fn apply(&mut self) -> Result<(), DeviceError> {
        let pending = self.log.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.log.failures.store(pending - 1, Ordering::SeqCst);
            return Err(DeviceError::new("simulated transmission failure"));
        }
        *lock(&self.log.delivered) = self.staged.clone();
        self.log.record(DeviceCall::Apply);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.log.record(DeviceCall::Pause);
        Ok(())
    }

    fn end(&mut self) -> Result<(), DeviceError> {
        lock(&self.log.delivered).clear();
        self.log.record(DeviceCall::End);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.log.record(DeviceCall::Disconnect);
        Ok(())
    }
}

// ============ Simulated ergometer ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErgometerConfig {
    pub cadence_rpm: f64,
    pub sample_period_ms: u64,
    /// Peak voluntary power per side, watts
    pub base_power: f64,
    /// Watts added per milliamp of stimulation on that side
    pub assist_gain: f64,
}

impl Default for ErgometerConfig {
    fn default() -> Self {
        Self {
            cadence_rpm: 60.0,
            sample_period_ms: 2,
            base_power: 20.0,
            assist_gain: 1.0,
        }
    }
}

pub struct SimulatedErgometer {
    config: ErgometerConfig,
    buffer: Arc<SampleBuffer>,
    stimulator: Option<StimulatorLog>,
}

impl SimulatedErgometer {
    pub fn new(config: ErgometerConfig, buffer: Arc<SampleBuffer>) -> Self {
        Self {
            config,
            buffer,
            stimulator: None,
        }
    }

    /// Let the current delivered by the mock stimulator add to the pedaling power
    pub fn with_stimulator(mut self, log: StimulatorLog) -> Self {
        self.stimulator = Some(log);
        self
    }

    pub fn angular_speed(&self) -> f64 {
        self.config.cadence_rpm * TAU / 60.0
    }

    /// The reading `elapsed` seconds after the crank started at zero
    pub fn sample_at(&self, elapsed: f64) -> Sample {
        let speed = self.angular_speed();
        let angle = speed * elapsed;
        let assist = |side: Side| {
            self.stimulator
                .as_ref()
                .map_or(0.0, |log| log.delivered_on(side).0 * self.config.assist_gain)
        };
        Sample {
            timestamp: elapsed,
            angle: Radians(angle),
            speed,
            left_power: self.config.base_power * (-angle.sin()).max(0.0) + assist(Side::Left),
            right_power: self.config.base_power * angle.sin().max(0.0) + assist(Side::Right),
        }
    }

    /// Pedal on a background thread until `stop` is raised
    pub fn spawn(self, stop: StopSignal) -> JoinHandle<()> {
        thread::spawn(move || {
            info!("Simulated ergometer pedaling at {} rpm", self.config.cadence_rpm);
            let period = Duration::from_millis(self.config.sample_period_ms.max(1));
            let started = Instant::now();
            let mut count = 0usize;
            while !stop.is_raised() {
                self.buffer.push(self.sample_at(started.elapsed().as_secs_f64()));
                count += 1;
                thread::sleep(period);
            }
            debug!("Simulated ergometer stopped after {count} samples");
        })
    }
}
