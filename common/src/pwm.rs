//! Duty percentage → hardware PWM signal.
//!
//! The hardware duty domain is 8 bits. Both ends of the percentage range are
//! driven digitally: below 1% the pin is held low, above 90% it is held high.

use tracing::info;

pub const HARDWARE_DUTY_MAX: u16 = 255;
pub const FULL_ON_ABOVE_PERCENT: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmSignal {
    Off,
    FullOn,
    Duty(u8),
}

impl PwmSignal {
    pub fn from_percent(duty_percent: u8) -> Self {
        if duty_percent < 1 {
            Self::Off
        } else if duty_percent > FULL_ON_ABOVE_PERCENT {
            Self::FullOn
        } else {
            // round(percent * 2.55) in integer arithmetic.
            let scaled = (duty_percent as u16 * HARDWARE_DUTY_MAX + 50) / 100;
            Self::Duty(scaled as u8)
        }
    }
}

/// Output stage the driver writes into (GPIO + PWM channel on hardware).
pub trait Actuator {
    fn drive(&mut self, signal: PwmSignal);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PwmState {
    pub current: u8,
    pub previous: u8,
}

impl PwmState {
    pub fn new(current: u8) -> Self {
        Self {
            current: current.min(100),
            previous: 0,
        }
    }

    pub fn set_current(&mut self, duty_percent: u8) -> bool {
        let duty_percent = duty_percent.min(100);
        let changed = self.current != duty_percent;
        self.current = duty_percent;
        changed
    }
}

pub struct PwmDriver<A> {
    actuator: A,
    last_signal: Option<PwmSignal>,
}

impl<A: Actuator> PwmDriver<A> {
    pub fn new(actuator: A) -> Self {
        Self {
            actuator,
            last_signal: None,
        }
    }

    /// Drives `state.current` to the output and reports whether it differed
    /// from the last applied value.
    pub fn apply(&mut self, state: &mut PwmState) -> bool {
        let changed = state.current != state.previous;
        if changed {
            info!(
                previous = state.previous,
                current = state.current,
                "pwm state changed"
            );
        }

        let signal = PwmSignal::from_percent(state.current);
        self.actuator.drive(signal);
        self.last_signal = Some(signal);
        state.previous = state.current;
        changed
    }

    pub fn last_signal(&self) -> Option<PwmSignal> {
        self.last_signal
    }

    #[cfg(test)]
    fn actuator(&self) -> &A {
        &self.actuator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder(Vec<PwmSignal>);

    impl Actuator for Recorder {
        fn drive(&mut self, signal: PwmSignal) {
            self.0.push(signal);
        }
    }

    #[test]
    fn boundaries_are_driven_digitally() {
        assert_eq!(PwmSignal::from_percent(0), PwmSignal::Off);
        assert_eq!(PwmSignal::from_percent(100), PwmSignal::FullOn);
        assert_eq!(PwmSignal::from_percent(91), PwmSignal::FullOn);
        assert_eq!(PwmSignal::from_percent(90), PwmSignal::Duty(230));
        assert_eq!(PwmSignal::from_percent(1), PwmSignal::Duty(3));
    }

    #[test]
    fn half_duty_rounds_up() {
        assert_eq!(PwmSignal::from_percent(50), PwmSignal::Duty(128));
        assert_eq!(PwmSignal::from_percent(75), PwmSignal::Duty(191));
    }

    #[test]
    fn apply_tracks_previous_and_reports_changes() {
        let mut driver = PwmDriver::new(Recorder::default());
        let mut state = PwmState::new(50);

        assert!(driver.apply(&mut state));
        assert_eq!(state.previous, 50);
        assert!(!driver.apply(&mut state));

        state.set_current(0);
        assert!(driver.apply(&mut state));

        assert_eq!(
            driver.actuator().0,
            vec![PwmSignal::Duty(128), PwmSignal::Duty(128), PwmSignal::Off]
        );
        assert_eq!(driver.last_signal(), Some(PwmSignal::Off));
    }

    #[test]
    fn current_is_capped_at_full_duty() {
        let mut state = PwmState::default();
        assert!(state.set_current(150));
        assert_eq!(state.current, 100);
        assert!(!state.set_current(100));
    }
}
