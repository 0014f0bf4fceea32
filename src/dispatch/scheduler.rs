use std::time::Duration;

/// Identifies one arming of a timer. Fires carrying an older token are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveTimer {
    #[default]
    None,
    Delay { period: Duration, token: TimerToken },
    Interval { period: Duration, token: TimerToken },
}

impl ActiveTimer {
    fn token(self) -> Option<TimerToken> {
        match self {
            ActiveTimer::None => None,
            ActiveTimer::Delay { token, .. } | ActiveTimer::Interval { token, .. } => Some(token),
        }
    }
}

/// Timer changes the caller has to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reschedule {
    pub disarm: Option<TimerToken>,
    pub arm: Option<TimerToken>,
}

/// Holds at most one armed timer: a one-shot delay or a repeating interval.
///
/// Pure bookkeeping. Arming the real timer and posting fires back is the
/// runtime's job; this type only decides which fires still count.
#[derive(Debug, Default)]
pub struct TriggerScheduler {
    active: ActiveTimer,
    next_token: u64,
}

impl TriggerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> ActiveTimer {
        self.active
    }

    pub fn is_delay_active(&self) -> bool {
        matches!(self.active, ActiveTimer::Delay { .. })
    }

    pub fn is_interval_active(&self) -> bool {
        matches!(self.active, ActiveTimer::Interval { .. })
    }

    /// Replace whatever is armed with a one-shot delay. A zero period only clears.
    pub fn set_delay(&mut self, period: Duration) -> Reschedule {
        self.replace(period, |period, token| ActiveTimer::Delay { period, token })
    }

    /// Replace whatever is armed with a repeating interval. A zero period only clears.
    pub fn set_interval(&mut self, period: Duration) -> Reschedule {
        self.replace(period, |period, token| ActiveTimer::Interval { period, token })
    }

    /// Clear the armed timer, if any. Idempotent.
    pub fn cancel(&mut self) -> Option<TimerToken> {
        std::mem::take(&mut self.active).token()
    }

    /// Clear a pending delay; an armed interval is left alone.
    pub fn clear_delay(&mut self) -> Option<TimerToken> {
        if self.is_delay_active() {
            return self.cancel();
        }
        None
    }

    /// Consume a delay fire. Returns false for stale tokens.
    pub fn fire_delay(&mut self, token: TimerToken) -> bool {
        match self.active {
            ActiveTimer::Delay { token: active, .. } if active == token => {
                self.active = ActiveTimer::None;
                true
            }
            _ => false,
        }
    }

    /// Check an interval tick. The interval stays armed.
    pub fn fire_interval(&self, token: TimerToken) -> bool {
        matches!(self.active, ActiveTimer::Interval { token: active, .. } if active == token)
    }

    fn replace(
        &mut self,
        period: Duration,
        timer: impl FnOnce(Duration, TimerToken) -> ActiveTimer,
    ) -> Reschedule {
        let disarm = self.cancel();
        if period.is_zero() {
            return Reschedule { disarm, arm: None };
        }

        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.active = timer(period, token);
        Reschedule {
            disarm,
            arm: Some(token),
        }
    }
}
