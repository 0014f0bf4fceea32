//! Per-request dispatch session as a state-reducing function.
//!
//! [`update`] consumes one [`Event`] and returns the [`Command`]s the runtime
//! must carry out. All timer bookkeeping happens here, synchronously, so a
//! timer fire is consumed before any rendering starts.

use std::time::Duration;

use super::scheduler::{Reschedule, TimerToken, TriggerScheduler};
use crate::http::request::RequestDefinition;
use crate::settings::OverlapPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Manual,
    Delay,
    Interval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ManualDispatch { prompt_for_post_download: bool },
    DelayRequested(Duration),
    IntervalRequested(Duration),
    DelayFired(TimerToken),
    IntervalFired(TimerToken),
    CancelPressed,
    RequestEdited(RequestDefinition),
    DispatchFinished,
    /// The editor is going away: stop timers and any open stream.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Dispatch {
        request: RequestDefinition,
        prompt_for_post_download: bool,
        trigger: TriggerSource,
    },
    ArmDelay { token: TimerToken, period: Duration },
    ArmInterval { token: TimerToken, period: Duration },
    Disarm(TimerToken),
    CloseStream { request_id: String },
}

#[derive(Debug)]
pub struct SessionState {
    request: RequestDefinition,
    scheduler: TriggerScheduler,
    overlap_policy: OverlapPolicy,
    in_flight: usize,
    started: u64,
    completed: u64,
}

impl SessionState {
    pub fn new(request: RequestDefinition, overlap_policy: OverlapPolicy) -> Self {
        Self {
            request,
            scheduler: TriggerScheduler::new(),
            overlap_policy,
            in_flight: 0,
            started: 0,
            completed: 0,
        }
    }

    pub fn request(&self) -> &RequestDefinition {
        &self.request
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn started(&self) -> u64 {
        self.started
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Whether the cancel/disconnect affordance applies. `stream_open` is the
    /// transport's readiness for this request; it only counts for event streams.
    pub fn is_cancellable(&self, stream_open: bool) -> bool {
        self.scheduler.is_interval_active()
            || self.scheduler.is_delay_active()
            || (self.request.is_event_stream() && stream_open)
    }

    fn dispatch(&mut self, trigger: TriggerSource, prompt_for_post_download: bool) -> Command {
        self.in_flight += 1;
        self.started += 1;
        Command::Dispatch {
            request: self.request.clone(),
            prompt_for_post_download,
            trigger,
        }
    }
}

pub fn update(state: &mut SessionState, event: Event) -> Vec<Command> {
    match event {
        Event::ManualDispatch {
            prompt_for_post_download,
        } => {
            let mut commands: Vec<Command> =
                state.scheduler.clear_delay().map(Command::Disarm).into_iter().collect();
            commands.push(state.dispatch(TriggerSource::Manual, prompt_for_post_download));
            commands
        }
        Event::DelayRequested(period) => {
            let reschedule = state.scheduler.set_delay(period);
            rearm(reschedule, |token| Command::ArmDelay { token, period })
        }
        Event::IntervalRequested(period) => {
            let reschedule = state.scheduler.set_interval(period);
            rearm(reschedule, |token| Command::ArmInterval { token, period })
        }
        Event::DelayFired(token) => {
            if !state.scheduler.fire_delay(token) {
                tracing::debug!(?token, "ignoring stale delay fire");
                return Vec::new();
            }
            vec![state.dispatch(TriggerSource::Delay, false)]
        }
        Event::IntervalFired(token) => {
            if !state.scheduler.fire_interval(token) {
                tracing::debug!(?token, "ignoring stale interval tick");
                return Vec::new();
            }
            if state.overlap_policy == OverlapPolicy::SkipWhileBusy && state.in_flight > 0 {
                tracing::info!(
                    request_id = %state.request.id,
                    in_flight = state.in_flight,
                    "skipping interval tick while a dispatch is running"
                );
                return Vec::new();
            }
            vec![state.dispatch(TriggerSource::Interval, false)]
        }
        Event::CancelPressed => {
            if state.request.is_event_stream() {
                return vec![Command::CloseStream {
                    request_id: state.request.id.clone(),
                }];
            }
            state.scheduler.cancel().map(Command::Disarm).into_iter().collect()
        }
        Event::RequestEdited(request) => {
            state.request = request;
            Vec::new()
        }
        Event::DispatchFinished => {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.completed += 1;
            Vec::new()
        }
        Event::Shutdown => {
            let mut commands: Vec<Command> =
                state.scheduler.cancel().map(Command::Disarm).into_iter().collect();
            if state.request.is_event_stream() {
                commands.push(Command::CloseStream {
                    request_id: state.request.id.clone(),
                });
            }
            commands
        }
    }
}

fn rearm(reschedule: Reschedule, arm: impl FnOnce(TimerToken) -> Command) -> Vec<Command> {
    let mut commands = Vec::new();
    if let Some(token) = reschedule.disarm {
        commands.push(Command::Disarm(token));
    }
    if let Some(token) = reschedule.arm {
        commands.push(arm(token));
    }
    commands
}
