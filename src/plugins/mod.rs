//! # Plugin Transform Stage
//!
//! Request hooks run after rendering and before the request is handed to the
//! submission channel. Each hook may rewrite the rendered request or reject
//! it; a rejection is reported to the user here and the dispatch stops.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatch::Outcome;
use crate::http::request::{RenderedParameter, RenderedRequest};
use crate::notify::Notifier;

pub const PLUGIN_FAILURE_TITLE: &str = "Plugin error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HookAction {
    SetHeader { name: String, value: String },
    RemoveHeader { name: String },
    AddParameter { name: String, value: String },
    Reject { reason: String },
}

/// A registered plugin hook, applied to every rendered request before it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginHook {
    pub name: String,
    pub action: HookAction,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Post-render modification of a request.
///
/// Like the renderer, a transform reports its own failures; the caller stops
/// silently on anything but [`Outcome::Ok`].
pub trait RequestTransform: Send + Sync {
    fn transform(
        &self,
        request: RenderedRequest,
    ) -> Pin<Box<dyn Future<Output = Outcome<RenderedRequest>> + Send + '_>>;
}

/// Applies enabled `BeforeRequest` hooks in registration order.
pub struct PluginPipeline {
    hooks: Vec<PluginHook>,
    notifier: Arc<dyn Notifier>,
}

impl PluginPipeline {
    pub fn new(hooks: Vec<PluginHook>, notifier: Arc<dyn Notifier>) -> Self {
        Self { hooks, notifier }
    }

    pub fn passthrough(notifier: Arc<dyn Notifier>) -> Self {
        Self::new(Vec::new(), notifier)
    }

    fn apply(&self, mut request: RenderedRequest) -> Result<RenderedRequest, String> {
        let hooks = self.hooks.iter().filter(|hook| hook.enabled);

        for hook in hooks {
            tracing::debug!(
                plugin = %hook.name,
                request_id = %request.request_id,
                "applying request hook"
            );
            match &hook.action {
                HookAction::SetHeader { name, value } => {
                    request.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
                    request.headers.push((name.clone(), value.clone()));
                }
                HookAction::RemoveHeader { name } => {
                    request.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
                }
                HookAction::AddParameter { name, value } => {
                    request.parameters.push(RenderedParameter {
                        name: name.clone(),
                        value: value.clone(),
                        path_segment: false,
                    });
                }
                HookAction::Reject { reason } => {
                    return Err(format!("{}: {reason}", hook.name));
                }
            }
        }

        Ok(request)
    }
}

impl RequestTransform for PluginPipeline {
    fn transform(
        &self,
        request: RenderedRequest,
    ) -> Pin<Box<dyn Future<Output = Outcome<RenderedRequest>> + Send + '_>> {
        let result = self.apply(request);
        Box::pin(async move {
            match result {
                Ok(request) => Outcome::Ok(request),
                Err(message) => {
                    self.notifier.alert(PLUGIN_FAILURE_TITLE, &message);
                    Outcome::Failed(message)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethod;
    use crate::dispatch::testing::RecordingNotifier;
    use crate::http::method::HttpMethod;
    use crate::storage::CookieJar;

    fn rendered() -> RenderedRequest {
        RenderedRequest {
            request_id: "req_1".into(),
            method: HttpMethod::Get,
            url: "https://example.com".into(),
            headers: vec![("Accept".into(), "text/plain".into())],
            authentication: AuthMethod::None,
            parameters: Vec::new(),
            body: None,
            cookie_jar: CookieJar::empty("wrk_1"),
            suppress_user_agent: false,
        }
    }

    fn hook(name: &str, action: HookAction) -> PluginHook {
        PluginHook {
            name: name.into(),
            action,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn passthrough_returns_request_unchanged() {
        let pipeline = PluginPipeline::passthrough(Arc::new(RecordingNotifier::default()));
        let outcome = pipeline.transform(rendered()).await;
        assert_eq!(outcome, Outcome::Ok(rendered()));
    }

    #[tokio::test]
    async fn hooks_apply_in_order() {
        let pipeline = PluginPipeline::new(
            vec![
                hook(
                    "accept-json",
                    HookAction::SetHeader {
                        name: "accept".into(),
                        value: "application/json".into(),
                    },
                ),
                hook(
                    "trace",
                    HookAction::AddParameter {
                        name: "trace".into(),
                        value: "1".into(),
                    },
                ),
                PluginHook {
                    enabled: false,
                    ..hook("disabled", HookAction::Reject { reason: "never".into() })
                },
            ],
            Arc::new(RecordingNotifier::default()),
        );

        let request = pipeline.transform(rendered()).await.ok().unwrap();
        assert_eq!(request.headers, vec![("accept".into(), "application/json".into())]);
        assert_eq!(request.parameters[0].name, "trace");
    }

    #[tokio::test]
    async fn rejection_alerts_and_fails() {
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = PluginPipeline::new(
            vec![hook("guard", HookAction::Reject { reason: "blocked host".into() })],
            notifier.clone(),
        );

        let outcome = pipeline.transform(rendered()).await;
        assert_eq!(outcome, Outcome::Failed("guard: blocked host".into()));
        assert_eq!(
            notifier.alerts(),
            vec![(PLUGIN_FAILURE_TITLE.to_string(), "guard: blocked host".to_string())]
        );
    }
}
