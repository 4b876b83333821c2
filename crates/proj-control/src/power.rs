//! Power lifecycle state machine
//!
//! ```text
//!   Off --request_on--> Warming --warm-up timer--> On
//!    ^                                             |
//!    +---- cool-down timer <-- Cooling <--request_off
//! ```
//!
//! The machine never sleeps or spawns anything. Requests return
//! [`PowerStep`]s: commands to queue and timers to schedule. Timer expiries
//! come back through [`PowerLifecycle::on_timer`] tagged with the generation
//! they were scheduled under; anything older than the current generation is
//! ignored.

use std::time::Duration;

use proj_protocol::{Command, InputId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default warm-up period when none is configured
pub const DEFAULT_WARM_UP: Duration = Duration::from_millis(1000);
/// Default cool-down period when none is configured
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_millis(2000);

/// Lifecycle state of the lamp/light source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerState {
    /// Standby
    #[default]
    Off,
    /// Power-on commanded, waiting for warm-up to elapse
    Warming,
    /// Running
    On,
    /// Power-off commanded, waiting for cool-down to elapse
    Cooling,
}

impl PowerState {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Warming => "Warming",
            Self::On => "On",
            Self::Cooling => "Cooling",
        }
    }
}

/// The two lifecycle timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerTimer {
    /// Ends `Warming`
    WarmUp,
    /// Ends `Cooling`
    CoolDown,
}

/// Side effect requested by the lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerStep {
    /// Queue this command for transmission
    Send(Command),
    /// Deliver `on_timer(timer, generation)` after `after`
    Schedule {
        /// Which timer
        timer: PowerTimer,
        /// Generation the expiry must match
        generation: u64,
        /// Delay from now
        after: Duration,
    },
}

/// Timed power state machine plus the observed on/off flag
#[derive(Debug)]
pub struct PowerLifecycle {
    state: PowerState,
    power_is_on: bool,
    ignore_off_echo: bool,
    warm_up: Duration,
    cool_down: Duration,
    generation: u64,
    deferred_input: Option<InputId>,
}

impl PowerLifecycle {
    /// Create a lifecycle in `Off` with the given timer durations
    pub fn new(warm_up: Duration, cool_down: Duration) -> Self {
        Self {
            state: PowerState::Off,
            power_is_on: false,
            ignore_off_echo: false,
            warm_up,
            cool_down,
            generation: 0,
            deferred_input: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Externally visible on/off flag
    pub fn is_on(&self) -> bool {
        self.power_is_on
    }

    /// Whether a warm-up period is running
    pub fn is_warming(&self) -> bool {
        self.state == PowerState::Warming
    }

    /// Whether a cool-down period is running
    pub fn is_cooling(&self) -> bool {
        self.state == PowerState::Cooling
    }

    /// Input waiting for warm-up to finish
    pub fn deferred_input(&self) -> Option<InputId> {
        self.deferred_input
    }

    /// Turn on; no-op unless `Off`
    pub fn request_on(&mut self) -> Vec<PowerStep> {
        if self.state != PowerState::Off {
            debug!("Ignoring power on while {}", self.state.name());
            return Vec::new();
        }

        self.ignore_off_echo = true;
        self.state = PowerState::Warming;
        self.generation += 1;
        vec![
            PowerStep::Send(Command::power_on()),
            PowerStep::Schedule {
                timer: PowerTimer::WarmUp,
                generation: self.generation,
                after: self.warm_up,
            },
        ]
    }

    /// Turn off; no-op unless `On`
    pub fn request_off(&mut self) -> Vec<PowerStep> {
        if self.state != PowerState::On {
            debug!("Ignoring power off while {}", self.state.name());
            return Vec::new();
        }

        self.state = PowerState::Cooling;
        self.deferred_input = None;
        self.generation += 1;
        vec![
            PowerStep::Send(Command::power_off()),
            PowerStep::Schedule {
                timer: PowerTimer::CoolDown,
                generation: self.generation,
                after: self.cool_down,
            },
        ]
    }

    /// Send the opposite of the observed flag, bypassing the lifecycle
    pub fn request_toggle(&mut self) -> Vec<PowerStep> {
        let command = if self.power_is_on {
            Command::power_off()
        } else {
            Command::power_on()
        };
        vec![PowerStep::Send(command)]
    }

    /// Select an input, powering on first if necessary
    ///
    /// While `Off` the input waits behind an implicit power-on and is sent when
    /// warm-up completes; while `Warming` it replaces any input already waiting.
    pub fn request_input(&mut self, input: InputId) -> Vec<PowerStep> {
        match self.state {
            PowerState::On => vec![PowerStep::Send(Command::input_select(input))],
            PowerState::Warming => {
                self.deferred_input = Some(input);
                Vec::new()
            }
            PowerState::Off => {
                self.deferred_input = Some(input);
                self.request_on()
            }
            PowerState::Cooling => {
                warn!("Ignoring input {} while cooling down", input);
                Vec::new()
            }
        }
    }

    /// A lifecycle timer fired
    pub fn on_timer(&mut self, timer: PowerTimer, generation: u64) -> Vec<PowerStep> {
        if generation != self.generation {
            debug!("Ignoring stale {:?} timer (generation {})", timer, generation);
            return Vec::new();
        }

        match (timer, self.state) {
            (PowerTimer::WarmUp, PowerState::Warming) => {
                self.state = PowerState::On;
                self.power_is_on = true;
                self.ignore_off_echo = false;
                self.deferred_input
                    .take()
                    .map(|input| vec![PowerStep::Send(Command::input_select(input))])
                    .unwrap_or_default()
            }
            (PowerTimer::CoolDown, PowerState::Cooling) => {
                self.state = PowerState::Off;
                self.power_is_on = false;
                Vec::new()
            }
            (timer, state) => {
                debug!("Ignoring {:?} timer in state {}", timer, state.name());
                Vec::new()
            }
        }
    }

    /// Reconcile a power report from the wire
    ///
    /// The first "off" report during a warm-up is the projector echoing its
    /// pre-command state and is ignored. Outside warm-up/cool-down the report
    /// also moves the state to `On` or `Off`.
    pub fn on_observed_power(&mut self, is_on: bool) {
        match self.state {
            PowerState::Warming => {
                if !is_on && self.ignore_off_echo {
                    debug!("Ignoring stale power-off echo during warm-up");
                    self.ignore_off_echo = false;
                    return;
                }
                if is_on {
                    self.ignore_off_echo = false;
                }
                self.power_is_on = is_on;
            }
            PowerState::Cooling => {
                self.power_is_on = is_on;
            }
            PowerState::Off | PowerState::On => {
                self.power_is_on = is_on;
                self.state = if is_on { PowerState::On } else { PowerState::Off };
            }
        }
    }
}

impl Default for PowerLifecycle {
    fn default() -> Self {
        Self::new(DEFAULT_WARM_UP, DEFAULT_COOL_DOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation_of(steps: &[PowerStep]) -> u64 {
        steps
            .iter()
            .find_map(|s| match s {
                PowerStep::Schedule { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("no timer scheduled")
    }

    #[test]
    fn test_power_on_warms_then_on() {
        let mut power = PowerLifecycle::default();
        let steps = power.request_on();

        assert_eq!(steps[0], PowerStep::Send(Command::power_on()));
        assert!(matches!(
            steps[1],
            PowerStep::Schedule {
                timer: PowerTimer::WarmUp,
                after,
                ..
            } if after == DEFAULT_WARM_UP
        ));
        assert_eq!(power.state(), PowerState::Warming);

        power.on_timer(PowerTimer::WarmUp, generation_of(&steps));
        assert_eq!(power.state(), PowerState::On);
        assert!(power.is_on());
    }

    #[test]
    fn test_power_on_while_warming_is_noop() {
        let mut power = PowerLifecycle::default();
        power.request_on();
        assert!(power.request_on().is_empty());
        assert!(power.request_off().is_empty());
    }

    #[test]
    fn test_power_off_cools_then_off() {
        let mut power = PowerLifecycle::default();
        power.on_observed_power(true);
        assert_eq!(power.state(), PowerState::On);

        let steps = power.request_off();
        assert_eq!(steps[0], PowerStep::Send(Command::power_off()));
        assert_eq!(power.state(), PowerState::Cooling);
        assert!(power.request_on().is_empty());

        power.on_timer(PowerTimer::CoolDown, generation_of(&steps));
        assert_eq!(power.state(), PowerState::Off);
        assert!(!power.is_on());
    }

    #[test]
    fn test_power_off_while_off_is_noop() {
        let mut power = PowerLifecycle::default();
        assert!(power.request_off().is_empty());
    }

    #[test]
    fn test_stale_timer_ignored() {
        let mut power = PowerLifecycle::default();
        let first = power.request_on();
        power.on_timer(PowerTimer::WarmUp, generation_of(&first));
        let second = power.request_off();

        // Old warm-up generation must not disturb the cool-down
        power.on_timer(PowerTimer::WarmUp, generation_of(&first));
        assert_eq!(power.state(), PowerState::Cooling);

        power.on_timer(PowerTimer::CoolDown, generation_of(&second));
        assert_eq!(power.state(), PowerState::Off);
    }

    #[test]
    fn test_off_echo_ignored_once_during_warm_up() {
        let mut power = PowerLifecycle::default();
        power.request_on();

        power.on_observed_power(false);
        assert!(!power.is_on());
        assert_eq!(power.state(), PowerState::Warming);

        power.on_observed_power(true);
        assert!(power.is_on());

        // Debounce is spent; a later off report is taken at face value
        power.on_observed_power(false);
        assert!(!power.is_on());
        assert_eq!(power.state(), PowerState::Warming);
    }

    #[test]
    fn test_observation_syncs_idle_state() {
        let mut power = PowerLifecycle::default();
        power.on_observed_power(true);
        assert_eq!(power.state(), PowerState::On);
        power.on_observed_power(false);
        assert_eq!(power.state(), PowerState::Off);
    }

    #[test]
    fn test_toggle_follows_observed_flag() {
        let mut power = PowerLifecycle::default();
        assert_eq!(power.request_toggle(), [PowerStep::Send(Command::power_on())]);
        power.on_observed_power(true);
        assert_eq!(power.request_toggle(), [PowerStep::Send(Command::power_off())]);
        assert_eq!(power.state(), PowerState::On);
    }

    #[test]
    fn test_input_while_off_waits_for_warm_up() {
        let mut power = PowerLifecycle::default();
        let steps = power.request_input(InputId::Hd1);

        assert_eq!(steps[0], PowerStep::Send(Command::power_on()));
        assert_eq!(power.deferred_input(), Some(InputId::Hd1));

        let after = power.on_timer(PowerTimer::WarmUp, generation_of(&steps));
        assert_eq!(after, [PowerStep::Send(Command::input_select(InputId::Hd1))]);
        assert!(power.deferred_input().is_none());
    }

    #[test]
    fn test_input_while_warming_replaces_deferred() {
        let mut power = PowerLifecycle::default();
        let steps = power.request_input(InputId::Hd1);
        assert!(power.request_input(InputId::Dvi).is_empty());

        let after = power.on_timer(PowerTimer::WarmUp, generation_of(&steps));
        assert_eq!(after, [PowerStep::Send(Command::input_select(InputId::Dvi))]);
    }

    #[test]
    fn test_input_while_on_is_immediate() {
        let mut power = PowerLifecycle::default();
        power.on_observed_power(true);
        assert_eq!(
            power.request_input(InputId::Rg1),
            [PowerStep::Send(Command::input_select(InputId::Rg1))]
        );
    }
}
