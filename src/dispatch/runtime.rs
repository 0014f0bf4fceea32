//! Drives a [`SessionState`] on the tokio runtime.
//!
//! Events are reduced under a lock and the resulting commands executed
//! before the lock is released, so timer bookkeeping never interleaves.
//! Pipelines and timers run as spawned tasks that post their results back
//! as events; they only hold weak references, so dropping the last
//! [`SessionHandle`] stops every timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::orchestrator::{DispatchContext, Orchestrator};
use super::scheduler::TimerToken;
use super::session::{update, Command, Event, SessionState, TriggerSource};
use crate::http::request::RequestDefinition;
use crate::shortcuts;

/// Observable session state, published after every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub delay_active: bool,
    pub interval_active: bool,
    pub in_flight: usize,
    pub started: u64,
    pub completed: u64,
}

impl SessionSnapshot {
    fn of(state: &SessionState) -> Self {
        Self {
            delay_active: state.scheduler().is_delay_active(),
            interval_active: state.scheduler().is_interval_active(),
            in_flight: state.in_flight(),
            started: state.started(),
            completed: state.completed(),
        }
    }
}

struct Core {
    state: SessionState,
    timers: HashMap<TimerToken, JoinHandle<()>>,
}

struct SessionInner {
    orchestrator: Arc<Orchestrator>,
    ctx: DispatchContext,
    core: Mutex<Core>,
    changes: watch::Sender<SessionSnapshot>,
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, timer) in core.timers.drain() {
            timer.abort();
        }
    }
}

/// Cloneable handle to one request's dispatch session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    /// Must be called from within a tokio runtime.
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        ctx: DispatchContext,
        request: RequestDefinition,
    ) -> Self {
        let state = SessionState::new(request, ctx.settings.overlap_policy);
        let (changes, _) = watch::channel(SessionSnapshot::of(&state));
        Self {
            inner: Arc::new(SessionInner {
                orchestrator,
                ctx,
                core: Mutex::new(Core {
                    state,
                    timers: HashMap::new(),
                }),
                changes,
            }),
        }
    }

    pub fn send(&self, event: Event) {
        apply(&self.inner, event);
    }

    pub fn shutdown(&self) {
        apply(&self.inner, Event::Shutdown);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.inner.changes.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.changes.subscribe()
    }

    pub fn request(&self) -> RequestDefinition {
        self.inner.lock().state.request().clone()
    }

    pub fn context(&self) -> &DispatchContext {
        &self.inner.ctx
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.inner.orchestrator
    }

    pub fn is_cancellable(&self) -> bool {
        let core = self.inner.lock();
        self.inner.orchestrator.is_cancellable(&core.state)
    }

    pub fn is_loading(&self) -> bool {
        self.inner.orchestrator.is_loading()
    }

    pub fn button_label(&self) -> &'static str {
        let kind = self.inner.lock().state.request().kind;
        shortcuts::button_label(kind, self.is_cancellable())
    }
}

fn apply(inner: &Arc<SessionInner>, event: Event) {
    let mut core = inner.lock();
    for command in update(&mut core.state, event) {
        execute(inner, &mut core, command);
    }
    core.timers.retain(|_, timer| !timer.is_finished());
    let snapshot = SessionSnapshot::of(&core.state);
    drop(core);
    inner.changes.send_replace(snapshot);
}

fn execute(inner: &Arc<SessionInner>, core: &mut Core, command: Command) {
    match command {
        Command::Dispatch {
            request,
            prompt_for_post_download,
            trigger,
        } => {
            spawn_dispatch(inner, request, prompt_for_post_download, trigger);
        }
        Command::ArmDelay { token, period } => {
            debug!(?token, ?period, "arming delay");
            let timer = spawn_delay(Arc::downgrade(inner), token, period);
            core.timers.insert(token, timer);
        }
        Command::ArmInterval { token, period } => {
            debug!(?token, ?period, "arming interval");
            let timer = spawn_interval(Arc::downgrade(inner), token, period);
            core.timers.insert(token, timer);
        }
        Command::Disarm(token) => {
            if let Some(timer) = core.timers.remove(&token) {
                debug!(?token, "disarming timer");
                timer.abort();
            }
        }
        Command::CloseStream { request_id } => inner.orchestrator.close_stream(&request_id),
    }
}

fn spawn_dispatch(
    inner: &Arc<SessionInner>,
    request: RequestDefinition,
    prompt_for_post_download: bool,
    trigger: TriggerSource,
) {
    let session = Arc::downgrade(inner);
    let orchestrator = inner.orchestrator.clone();
    let ctx = inner.ctx.clone();
    tokio::spawn(async move {
        let pipeline = {
            let orchestrator = orchestrator.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                orchestrator.dispatch(&ctx, &request, prompt_for_post_download).await
            })
        };
        let report = match pipeline.await {
            Ok(report) => report,
            Err(err) => orchestrator.fail(&ctx, panic_message(err)),
        };
        info!(request_id = %ctx.scope.request_id, ?trigger, ?report, "dispatch finished");
        if let Some(inner) = session.upgrade() {
            apply(&inner, Event::DispatchFinished);
        }
    });
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "dispatch task panicked".to_string())
}

fn spawn_delay(session: Weak<SessionInner>, token: TimerToken, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep(period).await;
        if let Some(inner) = session.upgrade() {
            apply(&inner, Event::DelayFired(token));
        }
    })
}

fn spawn_interval(
    session: Weak<SessionInner>,
    token: TimerToken,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = session.upgrade() else {
                break;
            };
            apply(&inner, Event::IntervalFired(token));
        }
    })
}
