use std::sync::Arc;

use tracing::{debug, error};

use super::outcome::Outcome;
use super::session::SessionState;
use crate::channel::{
    ChannelCommand, ChannelStatus, ConnectPayload, DispatchScope, SendPayload, StreamTransport,
    SubmissionChannel, STREAM_PROTOCOL,
};
use crate::environment::{RenderPayload, RenderPurpose, Renderer};
use crate::error::Result;
use crate::http::request::{RenderedRequest, RequestDefinition, RequestKind};
use crate::http::url::compose_url;
use crate::import_export;
use crate::notify::{Notifier, StatsCounter};
use crate::plugins::RequestTransform;
use crate::settings::Settings;
use crate::storage::{CookieJarProvider, RequestStore};

/// Title of the alert raised for failures no pipeline stage reported itself.
pub const UNEXPECTED_FAILURE_TITLE: &str = "Unexpected Request Failure";

/// Everything a dispatch needs to know about where it runs.
#[derive(Clone)]
pub struct DispatchContext {
    pub scope: DispatchScope,
    pub environment_id: Option<String>,
    pub cookie_jars: Arc<dyn CookieJarProvider>,
    pub settings: Arc<Settings>,
}

/// How one pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    Connected,
    Sent,
    /// A stage reported its own failure or the user backed out.
    Aborted,
    /// Unexpected failure; the user was alerted with this message.
    Failed(String),
}

pub struct Orchestrator {
    renderer: Arc<dyn Renderer>,
    transform: Arc<dyn RequestTransform>,
    channel: Arc<dyn SubmissionChannel>,
    streams: Arc<dyn StreamTransport>,
    store: Arc<dyn RequestStore>,
    notifier: Arc<dyn Notifier>,
    stats: Arc<dyn StatsCounter>,
}

impl Orchestrator {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        transform: Arc<dyn RequestTransform>,
        channel: Arc<dyn SubmissionChannel>,
        streams: Arc<dyn StreamTransport>,
        store: Arc<dyn RequestStore>,
        notifier: Arc<dyn Notifier>,
        stats: Arc<dyn StatsCounter>,
    ) -> Self {
        Self {
            renderer,
            transform,
            channel,
            streams,
            store,
            notifier,
            stats,
        }
    }

    /// Run one dispatch for `request`. Never fails: unexpected errors are
    /// alerted here, once, and reported as [`DispatchReport::Failed`].
    pub async fn dispatch(
        &self,
        ctx: &DispatchContext,
        request: &RequestDefinition,
        prompt_for_post_download: bool,
    ) -> DispatchReport {
        self.stats.record_attempt(&ctx.scope.request_id);

        let result = match request.kind {
            RequestKind::EventStream => self.connect(ctx, request).await,
            RequestKind::OneShot => self.send(ctx, prompt_for_post_download).await,
        };

        match result {
            Ok(report) => report,
            Err(err) => self.fail(ctx, err.to_string()),
        }
    }

    /// Log and alert an unexpected failure, once. The runtime also reports
    /// panicking stages through here.
    pub fn fail(&self, ctx: &DispatchContext, message: String) -> DispatchReport {
        error!(request_id = %ctx.scope.request_id, error = %message, "dispatch failed");
        self.notifier.alert(UNEXPECTED_FAILURE_TITLE, &message);
        DispatchReport::Failed(message)
    }

    async fn connect(
        &self,
        ctx: &DispatchContext,
        request: &RequestDefinition,
    ) -> Result<DispatchReport> {
        let request_id = ctx.scope.request_id.as_str();
        let cookie_jar = ctx.cookie_jars.get_or_create(&ctx.scope.workspace_id).await?;
        let environment = self
            .store
            .environment(&ctx.scope.workspace_id, ctx.environment_id.as_deref())
            .await?;

        let mut snapshot = request.clone();
        snapshot.parameters.retain(|param| !param.disabled);

        debug!(request_id, "rendering stream request");
        let payload = RenderPayload {
            request: snapshot,
            environment,
            cookie_jar,
            purpose: RenderPurpose::Connect,
        };
        let rendered = match self.renderer.render(payload).await {
            Outcome::Ok(rendered) => rendered,
            stopped => return Ok(stop("render", request_id, stopped)),
        };

        let url = compose_url(&rendered)?;
        let command = ChannelCommand::Connect(ConnectPayload {
            url: url.to_string(),
            headers: rendered.headers,
            authentication: rendered.authentication,
            cookie_jar: rendered.cookie_jar,
            suppress_user_agent: rendered.suppress_user_agent || ctx.settings.disable_user_agent,
        });

        debug!(request_id, %url, "submitting connect");
        self.channel.submit(&ctx.scope, command).await?;
        Ok(DispatchReport::Connected)
    }

    async fn send(
        &self,
        ctx: &DispatchContext,
        prompt_for_post_download: bool,
    ) -> Result<DispatchReport> {
        let request_id = ctx.scope.request_id.as_str();
        let (request, environment) = self
            .store
            .fetch(request_id, ctx.environment_id.as_deref())
            .await?;
        let cookie_jar = ctx.cookie_jars.get_or_create(&ctx.scope.workspace_id).await?;

        debug!(request_id, "rendering request");
        let payload = RenderPayload {
            request,
            environment,
            cookie_jar,
            purpose: RenderPurpose::Send,
        };
        let rendered = match self.renderer.render(payload).await {
            Outcome::Ok(rendered) => rendered,
            stopped => return Ok(stop("render", request_id, stopped)),
        };

        debug!(request_id, "transforming request");
        let mut transformed = match self.transform.transform(rendered).await {
            Outcome::Ok(transformed) => transformed,
            stopped => return Ok(stop("transform", request_id, stopped)),
        };
        transformed.suppress_user_agent |= ctx.settings.disable_user_agent;

        let command = ChannelCommand::Send(SendPayload {
            rendered_request: transformed,
            should_prompt_for_path_after_response: prompt_for_post_download,
        });

        debug!(request_id, "submitting send");
        self.channel.submit(&ctx.scope, command).await?;
        Ok(DispatchReport::Sent)
    }

    /// Render `request` for the code export view. `None` when rendering stopped.
    pub async fn export_curl(
        &self,
        ctx: &DispatchContext,
        request: &RequestDefinition,
    ) -> Result<Option<String>> {
        let rendered = self.render_for_export(ctx, request).await?;
        rendered.map(|rendered| import_export::to_curl(&rendered)).transpose()
    }

    async fn render_for_export(
        &self,
        ctx: &DispatchContext,
        request: &RequestDefinition,
    ) -> Result<Option<RenderedRequest>> {
        let cookie_jar = ctx.cookie_jars.get_or_create(&ctx.scope.workspace_id).await?;
        let environment = self
            .store
            .environment(&ctx.scope.workspace_id, ctx.environment_id.as_deref())
            .await?;
        let payload = RenderPayload {
            request: request.clone(),
            environment,
            cookie_jar,
            purpose: RenderPurpose::Export,
        };
        Ok(self.renderer.render(payload).await.ok())
    }

    pub fn stream_open(&self, request_id: &str) -> bool {
        self.streams.ready_state(request_id, STREAM_PROTOCOL)
    }

    pub fn close_stream(&self, request_id: &str) {
        debug!(request_id, "closing stream");
        self.streams.close(request_id);
    }

    pub fn is_cancellable(&self, state: &SessionState) -> bool {
        let request = state.request();
        let stream_open = request.is_event_stream() && self.stream_open(&request.id);
        state.is_cancellable(stream_open)
    }

    pub fn is_loading(&self) -> bool {
        self.channel.status() != ChannelStatus::Idle
    }
}

fn stop<T>(stage: &str, request_id: &str, outcome: Outcome<T>) -> DispatchReport {
    match outcome {
        Outcome::Failed(reason) => {
            debug!(request_id, stage, %reason, "stage failed, dispatch stopped")
        }
        Outcome::Aborted | Outcome::Ok(_) => {
            debug!(request_id, stage, "stage aborted, dispatch stopped")
        }
    }
    DispatchReport::Aborted
}
