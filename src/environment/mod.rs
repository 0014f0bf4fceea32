//! # Environments & Rendering
//!
//! Environments are named sets of variables. A workspace has one base
//! environment and any number of sub-environments; the active one overrides
//! the base. Rendering resolves `{{ variable }}` expressions in every field
//! of a request against that merged set.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::Outcome;
use crate::http::request::{RenderedParameter, RenderedRequest, RequestDefinition};
use crate::notify::Notifier;
use crate::storage::CookieJar;

/// Title of the alert shown when rendering fails.
pub const RENDER_FAILURE_TITLE: &str = "Failed to render request";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVariable {
    pub key: String,
    pub value: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl EnvVariable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub variables: Vec<EnvVariable>,
}

impl Environment {
    /// Merge `active` over `base`. The result keeps the active environment's identity.
    pub fn merged(base: &Environment, active: Option<&Environment>) -> Environment {
        let Some(active) = active else {
            return base.clone();
        };

        let mut variables: Vec<EnvVariable> = base.variables.clone();
        for var in &active.variables {
            if !var.enabled {
                continue;
            }
            match variables.iter_mut().find(|existing| existing.key == var.key) {
                Some(existing) => *existing = var.clone(),
                None => variables.push(var.clone()),
            }
        }

        Environment {
            id: active.id.clone(),
            name: active.name.clone(),
            workspace_id: active.workspace_id.clone(),
            variables,
        }
    }

    pub fn variable_map(&self) -> HashMap<String, String> {
        build_variable_map(&self.variables, None)
    }
}

/// Build a merged variable map. Environment variables override base variables.
pub fn build_variable_map(
    base_variables: &[EnvVariable],
    environment: Option<&Environment>,
) -> HashMap<String, String> {
    let mut variables = HashMap::new();

    for v in base_variables {
        if v.enabled && !v.key.is_empty() {
            variables.insert(v.key.clone(), v.value.clone());
        }
    }

    if let Some(env) = environment {
        for v in &env.variables {
            if v.enabled && !v.key.is_empty() {
                variables.insert(v.key.clone(), v.value.clone());
            }
        }
    }

    variables
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("undefined variable `{0}`")]
    Undefined(String),
    #[error("unterminated tag at offset {0}")]
    Unterminated(usize),
}

/// Replace every `{{ name }}` (or `{{ _.name }}`) in `input`.
pub fn interpolate(
    input: &str,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open
            .find("}}")
            .ok_or(TemplateError::Unterminated(offset + start))?;

        let expression = after_open[..end].trim();
        let name = expression.strip_prefix("_.").unwrap_or(expression);
        let value = variables
            .get(name)
            .ok_or_else(|| TemplateError::Undefined(name.to_string()))?;
        output.push_str(value);

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    output.push_str(rest);
    Ok(output)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {source}")]
pub struct RenderError {
    pub field: String,
    pub source: TemplateError,
}

/// What the rendered request will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPurpose {
    Send,
    Connect,
    Export,
}

#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub request: RequestDefinition,
    pub environment: Environment,
    pub cookie_jar: CookieJar,
    pub purpose: RenderPurpose,
}

/// Resolves template expressions in a request.
///
/// On failure the renderer informs the user itself and returns
/// [`Outcome::Failed`]; callers must not report the failure again.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        payload: RenderPayload,
    ) -> Pin<Box<dyn Future<Output = Outcome<RenderedRequest>> + Send + '_>>;
}

/// Renderer for `{{ variable }}` templates backed by the payload's environment.
pub struct TemplateRenderer {
    notifier: Arc<dyn Notifier>,
}

impl TemplateRenderer {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl Renderer for TemplateRenderer {
    fn render(
        &self,
        payload: RenderPayload,
    ) -> Pin<Box<dyn Future<Output = Outcome<RenderedRequest>> + Send + '_>> {
        let result = render_request(&payload);
        Box::pin(async move {
            match result {
                Ok(rendered) => Outcome::Ok(rendered),
                Err(err) => {
                    let message = err.to_string();
                    self.notifier.alert(RENDER_FAILURE_TITLE, &message);
                    Outcome::Failed(message)
                }
            }
        })
    }
}

pub fn render_request(payload: &RenderPayload) -> Result<RenderedRequest, RenderError> {
    let variables = payload.environment.variable_map();
    let request = &payload.request;
    let render = |field: &str, text: &str| {
        interpolate(text, &variables).map_err(|source| RenderError {
            field: field.to_string(),
            source,
        })
    };

    let url = render("url", &request.url)?;

    let mut headers = Vec::new();
    for header in request.enabled_headers() {
        let name = render("header name", &header.name)?;
        let value = render(&format!("header `{}`", header.name), &header.value)?;
        headers.push((name, value));
    }

    let authentication = request
        .authentication
        .try_map(|text| render("authentication", text))?;

    let mut parameters = Vec::new();
    for param in request.enabled_parameters() {
        parameters.push(RenderedParameter {
            name: render("parameter name", &param.name)?,
            value: render(&format!("parameter `{}`", param.name), &param.value)?,
            path_segment: param.path_segment,
        });
    }

    let body = request
        .body
        .as_deref()
        .map(|body| render("body", body))
        .transpose()?;

    Ok(RenderedRequest {
        request_id: request.id.clone(),
        method: request.method,
        url,
        headers,
        authentication,
        parameters,
        body,
        cookie_jar: payload.cookie_jar.clone(),
        suppress_user_agent: request.suppress_user_agent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethod;
    use crate::dispatch::testing::RecordingNotifier;
    use crate::http::request::{RequestHeader, RequestParameter};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn env(id: &str, pairs: &[(&str, &str)]) -> Environment {
        Environment {
            id: id.into(),
            name: id.into(),
            workspace_id: "wrk_1".into(),
            variables: pairs.iter().map(|(k, v)| EnvVariable::new(*k, *v)).collect(),
        }
    }

    fn payload(request: RequestDefinition, environment: Environment) -> RenderPayload {
        RenderPayload {
            request,
            environment,
            cookie_jar: CookieJar::empty("wrk_1"),
            purpose: RenderPurpose::Send,
        }
    }

    #[test]
    fn interpolate_tolerates_whitespace_and_prefix() {
        let vars = vars(&[("host", "api.example.com"), ("port", "8080")]);
        let result = interpolate("https://{{ host }}:{{_.port}}/api", &vars).unwrap();
        assert_eq!(result, "https://api.example.com:8080/api");
    }

    #[test]
    fn interpolate_without_tags_is_identity() {
        let result = interpolate("https://example.com/api", &HashMap::new()).unwrap();
        assert_eq!(result, "https://example.com/api");
    }

    #[test]
    fn interpolate_rejects_undefined_variables() {
        let err = interpolate("{{ missing }}", &HashMap::new()).unwrap_err();
        assert_eq!(err, TemplateError::Undefined("missing".into()));
    }

    #[test]
    fn interpolate_rejects_unterminated_tags() {
        let vars = vars(&[("a", "1")]);
        let err = interpolate("{{ a }}/{{ b", &vars).unwrap_err();
        assert_eq!(err, TemplateError::Unterminated(8));
    }

    #[test]
    fn merged_environment_overrides_base() {
        let base = env("base", &[("host", "localhost"), ("token", "base-token")]);
        let mut dev = env("dev", &[("host", "dev.example.com")]);
        dev.variables.push(EnvVariable {
            enabled: false,
            ..EnvVariable::new("token", "ignored")
        });

        let merged = Environment::merged(&base, Some(&dev));
        let map = merged.variable_map();
        assert_eq!(merged.id, "dev");
        assert_eq!(map.get("host").unwrap(), "dev.example.com");
        assert_eq!(map.get("token").unwrap(), "base-token");
    }

    #[test]
    fn build_variable_map_skips_disabled_and_empty_keys() {
        let base = vec![
            EnvVariable {
                enabled: false,
                ..EnvVariable::new("secret", "hidden")
            },
            EnvVariable::new("", "nameless"),
        ];
        let map = build_variable_map(&base, None);
        assert!(map.is_empty());
    }

    #[test]
    fn render_request_resolves_all_fields() {
        let mut request =
            RequestDefinition::new("req_1", "wrk_1", "https://api.example.com/{{ base }}/posts");
        request.headers = vec![
            RequestHeader::new("Authorization", "Bearer {{ token }}"),
            RequestHeader {
                disabled: true,
                ..RequestHeader::new("X-Skip", "{{ undefined }}")
            },
        ];
        request.parameters = vec![RequestParameter::query("lang", "{{ lang }}")];
        request.authentication = AuthMethod::BearerToken {
            token: "{{ token }}".into(),
        };
        request.body = Some(r#"{"v":"{{ base }}"}"#.into());

        let environment = env("dev", &[("base", "v1"), ("token", "t0k"), ("lang", "en")]);
        let rendered = render_request(&payload(request, environment)).unwrap();

        assert_eq!(rendered.url, "https://api.example.com/v1/posts");
        assert_eq!(rendered.headers, vec![("Authorization".into(), "Bearer t0k".into())]);
        assert_eq!(rendered.parameters[0].value, "en");
        assert_eq!(
            rendered.authentication,
            AuthMethod::BearerToken { token: "t0k".into() }
        );
        assert_eq!(rendered.body.as_deref(), Some(r#"{"v":"v1"}"#));
    }

    #[test]
    fn render_error_names_the_field() {
        let mut request = RequestDefinition::new("req_1", "wrk_1", "https://example.com");
        request.headers = vec![RequestHeader::new("X-Id", "{{ id }}")];
        let err = render_request(&payload(request, Environment::default())).unwrap_err();
        assert_eq!(err.to_string(), "header `X-Id`: undefined variable `id`");
    }

    #[tokio::test]
    async fn template_renderer_alerts_once_on_failure() {
        let notifier = Arc::new(RecordingNotifier::default());
        let renderer = TemplateRenderer::new(notifier.clone());
        let request = RequestDefinition::new("req_1", "wrk_1", "{{ host }}/x");

        let outcome = renderer.render(payload(request, Environment::default())).await;

        assert_eq!(outcome, Outcome::Failed("url: undefined variable `host`".into()));
        let alerts = notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, RENDER_FAILURE_TITLE);
    }
}
