use serde::{Deserialize, Serialize};

use super::method::HttpMethod;
use crate::auth::AuthMethod;
use crate::storage::CookieJar;

/// Whether dispatching sends a single exchange or opens a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    #[default]
    OneShot,
    EventStream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeader {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub disabled: bool,
}

impl RequestHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            disabled: false,
        }
    }
}

/// A query parameter, or a `:name` path segment binding when `path_segment` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameter {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub path_segment: bool,
}

impl RequestParameter {
    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            disabled: false,
            path_segment: false,
        }
    }

    pub fn segment(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path_segment: true,
            ..Self::query(name, value)
        }
    }
}

/// A request as the user edited it. Fields may contain template expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDefinition {
    pub id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Vec<RequestHeader>,
    #[serde(default)]
    pub authentication: AuthMethod,
    #[serde(default)]
    pub parameters: Vec<RequestParameter>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub kind: RequestKind,
    #[serde(default)]
    pub suppress_user_agent: bool,
}

impl RequestDefinition {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            name: String::new(),
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            authentication: AuthMethod::None,
            parameters: Vec::new(),
            body: None,
            kind: RequestKind::OneShot,
            suppress_user_agent: false,
        }
    }

    pub fn enabled_parameters(&self) -> impl Iterator<Item = &RequestParameter> {
        self.parameters.iter().filter(|param| !param.disabled)
    }

    pub fn enabled_headers(&self) -> impl Iterator<Item = &RequestHeader> {
        self.headers.iter().filter(|header| !header.disabled)
    }

    pub fn is_event_stream(&self) -> bool {
        self.kind == RequestKind::EventStream
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedParameter {
    pub name: String,
    pub value: String,
    pub path_segment: bool,
}

/// A request with every template expression resolved and disabled rows dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedRequest {
    pub request_id: String,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub authentication: AuthMethod,
    pub parameters: Vec<RenderedParameter>,
    pub body: Option<String>,
    pub cookie_jar: CookieJar,
    pub suppress_user_agent: bool,
}
