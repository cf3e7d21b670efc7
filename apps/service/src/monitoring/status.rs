//! Up/down hysteresis.
//!
//! A monitor that is up tolerates `threshold - 1` consecutive failed probes
//! before it is declared down. A monitor that is down comes back up on the
//! first successful probe.

use super::types::MonitorStatus;

/// Default number of consecutive failures that flips an up monitor to down.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Status fields the engine owns on a monitor row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusState {
    pub status: MonitorStatus,
    pub consecutive_failures: u32,
}

impl StatusState {
    pub fn new(status: MonitorStatus, consecutive_failures: u32) -> Self {
        Self { status, consecutive_failures }
    }

    /// Fresh monitors start up with a clean counter
    pub fn initial() -> Self {
        Self::new(MonitorStatus::Up, 0)
    }
}

/// Outcome of applying one probe to a monitor's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: StatusState,
    pub next: StatusState,
}

impl Transition {
    pub fn went_down(&self) -> bool {
        self.previous.status == MonitorStatus::Up && self.next.status == MonitorStatus::Down
    }

    pub fn recovered(&self) -> bool {
        self.previous.status == MonitorStatus::Down && self.next.status == MonitorStatus::Up
    }

    pub fn stayed_down(&self) -> bool {
        self.previous.status == MonitorStatus::Down && self.next.status == MonitorStatus::Down
    }
}

/// Status state machine with a fixed failure threshold
#[derive(Debug, Clone, Copy)]
pub struct StatusMachine {
    threshold: u32,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl StatusMachine {
    /// A threshold of zero would mean "down before any failure"; it is raised to one.
    pub fn new(threshold: u32) -> Self {
        Self { threshold: threshold.max(1) }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn apply(&self, previous: StatusState, success: bool) -> Transition {
        let next = if success {
            StatusState::new(MonitorStatus::Up, 0)
        } else {
            // Keeps counting while down, for observability only.
            let failures = previous.consecutive_failures.saturating_add(1);
            let status = match previous.status {
                MonitorStatus::Down => MonitorStatus::Down,
                MonitorStatus::Up if failures >= self.threshold => MonitorStatus::Down,
                MonitorStatus::Up => MonitorStatus::Up,
            };
            StatusState::new(status, failures)
        };

        Transition { previous, next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(machine: &StatusMachine, start: StatusState, probes: &[bool]) -> Vec<StatusState> {
        let mut state = start;
        probes
            .iter()
            .map(|&ok| {
                state = machine.apply(state, ok).next;
                state
            })
            .collect()
    }

    #[test]
    fn test_transition_table() {
        let machine = StatusMachine::new(3);

        let t = machine.apply(StatusState::new(MonitorStatus::Up, 0), true);
        assert_eq!(t.next, StatusState::new(MonitorStatus::Up, 0));

        let t = machine.apply(StatusState::new(MonitorStatus::Up, 0), false);
        assert_eq!(t.next, StatusState::new(MonitorStatus::Up, 1));

        let t = machine.apply(StatusState::new(MonitorStatus::Up, 2), false);
        assert_eq!(t.next, StatusState::new(MonitorStatus::Down, 3));
        assert!(t.went_down());

        let t = machine.apply(StatusState::new(MonitorStatus::Down, 5), true);
        assert_eq!(t.next, StatusState::new(MonitorStatus::Up, 0));
        assert!(t.recovered());

        let t = machine.apply(StatusState::new(MonitorStatus::Down, 5), false);
        assert_eq!(t.next, StatusState::new(MonitorStatus::Down, 6));
        assert!(t.stayed_down());
    }

    #[test]
    fn test_threshold_minus_one_failures_stay_up() {
        for threshold in 1..=6 {
            let machine = StatusMachine::new(threshold);
            let probes = vec![false; threshold as usize];
            let states = run(&machine, StatusState::initial(), &probes);

            for state in &states[..states.len() - 1] {
                assert_eq!(state.status, MonitorStatus::Up, "threshold {threshold}");
            }
            assert_eq!(states.last().unwrap().status, MonitorStatus::Down);
        }
    }

    #[test]
    fn test_successes_always_reset() {
        let machine = StatusMachine::default();
        for start in [
            StatusState::new(MonitorStatus::Up, 2),
            StatusState::new(MonitorStatus::Down, 40),
            StatusState::initial(),
        ] {
            let states = run(&machine, start, &[true, true, true]);
            assert!(states.iter().all(|s| *s == StatusState::new(MonitorStatus::Up, 0)));
        }
    }

    #[test]
    fn test_blip_is_forgiven() {
        let machine = StatusMachine::new(3);
        let states = run(&machine, StatusState::initial(), &[false, false, true, false, false]);
        assert!(states.iter().all(|s| s.status == MonitorStatus::Up));
        assert_eq!(states.last().unwrap().consecutive_failures, 2);
    }

    #[test]
    fn test_zero_threshold_is_raised() {
        let machine = StatusMachine::new(0);
        assert_eq!(machine.threshold(), 1);
        let t = machine.apply(StatusState::initial(), false);
        assert!(t.went_down());
    }

    #[test]
    fn test_counter_saturates() {
        let machine = StatusMachine::default();
        let t = machine.apply(StatusState::new(MonitorStatus::Down, u32::MAX), false);
        assert_eq!(t.next.consecutive_failures, u32::MAX);
        assert_eq!(t.next.status, MonitorStatus::Down);
    }
}
