//! In-memory collaborators for exercising the dispatch pipeline.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::orchestrator::{DispatchContext, Orchestrator};
use super::outcome::Outcome;
use crate::channel::{
    ChannelCommand, ChannelStatus, DispatchScope, StreamTransport, SubmissionChannel,
};
use crate::environment::{EnvVariable, Environment, RenderPayload, Renderer, TemplateRenderer};
use crate::error::{DispatchError, Result};
use crate::http::request::{
    RenderedRequest, RequestDefinition, RequestHeader, RequestKind, RequestParameter,
};
use crate::notify::{Notifier, RequestStats};
use crate::plugins::{PluginHook, PluginPipeline};
use crate::settings::Settings;
use crate::storage::SqliteStore;

#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    alerts: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub(crate) fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Records submitted commands. Can be told to fail or to take a while.
#[derive(Debug, Default)]
pub(crate) struct RecordingChannel {
    commands: Mutex<Vec<(DispatchScope, ChannelCommand)>>,
    failure: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
}

impl RecordingChannel {
    pub(crate) fn commands(&self) -> Vec<(DispatchScope, ChannelCommand)> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }
}

impl SubmissionChannel for RecordingChannel {
    fn submit(
        &self,
        scope: &DispatchScope,
        command: ChannelCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.commands.lock().unwrap().push((scope.clone(), command));
        let failure = self.failure.lock().unwrap().clone();
        let latency = *self.latency.lock().unwrap();
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            match failure {
                Some(message) => Err(DispatchError::Transport(message)),
                None => Ok(()),
            }
        })
    }

    fn status(&self) -> ChannelStatus {
        ChannelStatus::Idle
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeStreams {
    open: AtomicBool,
    closed: Mutex<Vec<String>>,
}

impl FakeStreams {
    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub(crate) fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

impl StreamTransport for FakeStreams {
    fn ready_state(&self, _request_id: &str, _protocol: &str) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self, request_id: &str) {
        self.set_open(false);
        self.closed.lock().unwrap().push(request_id.to_string());
    }
}

/// A renderer whose user backed out.
pub(crate) struct AbortingRenderer;

impl Renderer for AbortingRenderer {
    fn render(
        &self,
        _payload: RenderPayload,
    ) -> Pin<Box<dyn Future<Output = Outcome<RenderedRequest>> + Send + '_>> {
        Box::pin(async { Outcome::Aborted })
    }
}

/// A renderer that panics on its first call and renders templates after.
pub(crate) struct PanicOnceRenderer {
    panicked: AtomicBool,
    inner: TemplateRenderer,
}

impl PanicOnceRenderer {
    pub(crate) fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            panicked: AtomicBool::new(false),
            inner: TemplateRenderer::new(notifier),
        }
    }
}

impl Renderer for PanicOnceRenderer {
    fn render(
        &self,
        payload: RenderPayload,
    ) -> Pin<Box<dyn Future<Output = Outcome<RenderedRequest>> + Send + '_>> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("renderer blew up");
        }
        self.inner.render(payload)
    }
}

/// One stored request in workspace `wrk_1`, with every collaborator faked
/// except the template renderer, the plugin pipeline and the SQLite store.
pub(crate) struct TestRig {
    pub(crate) request: RequestDefinition,
    pub(crate) store: Arc<SqliteStore>,
    pub(crate) channel: Arc<RecordingChannel>,
    pub(crate) streams: Arc<FakeStreams>,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) stats: Arc<RequestStats>,
    pub(crate) hooks: Vec<PluginHook>,
    pub(crate) renderer: Option<Arc<dyn Renderer>>,
    pub(crate) settings: Settings,
}

impl TestRig {
    pub(crate) fn one_shot(url: &str, variables: &[(&str, &str)]) -> Self {
        Self::with_request(RequestDefinition::new("req_1", "wrk_1", url), variables)
    }

    /// An event-stream request with a `:topic` segment, a `since` query
    /// parameter and an `Accept` header.
    pub(crate) fn event_stream(url: &str, variables: &[(&str, &str)]) -> Self {
        let mut request = RequestDefinition::new("req_1", "wrk_1", url);
        request.kind = RequestKind::EventStream;
        request.headers = vec![RequestHeader::new("Accept", "text/event-stream")];
        request.parameters = vec![
            RequestParameter::segment("topic", "news"),
            RequestParameter::query("since", "0"),
            RequestParameter {
                disabled: true,
                ..RequestParameter::query("debug", "{{ undefined }}")
            },
        ];
        Self::with_request(request, variables)
    }

    fn with_request(request: RequestDefinition, variables: &[(&str, &str)]) -> Self {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_request(&request).unwrap();
        let base = Environment {
            id: "env_base".into(),
            name: "Base Environment".into(),
            workspace_id: request.workspace_id.clone(),
            variables: variables.iter().map(|(k, v)| EnvVariable::new(*k, *v)).collect(),
        };
        store.upsert_environment(&base, true).unwrap();

        Self {
            request,
            store: Arc::new(store),
            channel: Arc::default(),
            streams: Arc::default(),
            notifier: Arc::default(),
            stats: Arc::default(),
            hooks: Vec::new(),
            renderer: None,
            settings: Settings::default(),
        }
    }

    pub(crate) fn context(&self) -> DispatchContext {
        DispatchContext {
            scope: DispatchScope {
                organization_id: "org_1".into(),
                project_id: "proj_1".into(),
                workspace_id: self.request.workspace_id.clone(),
                request_id: self.request.id.clone(),
            },
            environment_id: None,
            cookie_jars: self.store.clone(),
            settings: Arc::new(self.settings.clone()),
        }
    }

    pub(crate) fn orchestrator(&self) -> Orchestrator {
        let renderer: Arc<dyn Renderer> = match &self.renderer {
            Some(renderer) => renderer.clone(),
            None => Arc::new(TemplateRenderer::new(self.notifier.clone())),
        };
        Orchestrator::new(
            renderer,
            Arc::new(PluginPipeline::new(self.hooks.clone(), self.notifier.clone())),
            self.channel.clone(),
            self.streams.clone(),
            self.store.clone(),
            self.notifier.clone(),
            self.stats.clone(),
        )
    }
}
