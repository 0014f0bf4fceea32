//! # Dispatch
//!
//! Turns user intent (a click, a shortcut, a timer fire) into exactly one
//! pipeline run per trigger:
//!
//! - one-shot requests: load, render, transform, submit `send`
//! - event-stream requests: render the in-memory request, submit `connect`
//!
//! [`update`] owns the timer bookkeeping, [`Orchestrator`] runs the
//! pipeline and [`SessionHandle`] wires both to the tokio runtime.

mod orchestrator;
mod outcome;
mod runtime;
mod scheduler;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{DispatchContext, DispatchReport, Orchestrator, UNEXPECTED_FAILURE_TITLE};
pub use outcome::Outcome;
pub use runtime::{SessionHandle, SessionSnapshot};
pub use scheduler::{ActiveTimer, Reschedule, TimerToken, TriggerScheduler};
pub use session::{update, Command, Event, SessionState, TriggerSource};
