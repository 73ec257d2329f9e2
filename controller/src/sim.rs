//! Stand-ins for the probe and the fan output on host builds.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use fanpilot_common::{Actuator, PwmSignal, SensorConfig, TemperatureSensor};

/// Triangle wave between `base - swing` and `base + swing`.
pub struct SimulatedSensor {
    base_c: f32,
    swing_c: f32,
    period_ticks: u32,
    tick: u32,
}

impl SimulatedSensor {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            base_c: config.simulated_base_c,
            swing_c: config.simulated_swing_c,
            period_ticks: config.simulated_period_ticks.max(2),
            tick: 0,
        }
    }
}

impl TemperatureSensor for SimulatedSensor {
    fn sample(&mut self) -> Option<f32> {
        let phase = self.tick % self.period_ticks;
        self.tick = self.tick.wrapping_add(1);

        let half = self.period_ticks as f32 / 2.0;
        let position = phase as f32;
        let ramp = if position < half {
            position / half
        } else {
            (self.period_ticks as f32 - position) / half
        };
        Some(self.base_c - self.swing_c + 2.0 * self.swing_c * ramp)
    }
}

/// Records the last driven signal so it can be inspected.
#[derive(Debug, Clone, Default)]
pub struct LoggingActuator {
    last: Arc<Mutex<Option<PwmSignal>>>,
}

impl LoggingActuator {
    pub fn last(&self) -> Option<PwmSignal> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Actuator for LoggingActuator {
    fn drive(&mut self, signal: PwmSignal) {
        match signal {
            PwmSignal::Off => debug!("fan pin driven low"),
            PwmSignal::FullOn => debug!("fan pin driven high"),
            PwmSignal::Duty(duty) => debug!("fan pwm duty {duty}/255"),
        }
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(signal);
    }
}
