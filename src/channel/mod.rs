//! Submission channel: the command interface to whatever performs network work.
//!
//! The orchestrator issues exactly two commands, `connect` for event-stream
//! requests and `send` for one-shot requests. Streams are observed and closed
//! through [`StreamTransport`].

mod registry;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub use registry::StreamRegistry;

use crate::auth::AuthMethod;
use crate::error::Result;
use crate::http::request::RenderedRequest;
use crate::storage::CookieJar;

/// Protocol name under which event-stream connections report readiness.
pub const STREAM_PROTOCOL: &str = "curl";

/// Identifies the request a command belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchScope {
    pub organization_id: String,
    pub project_id: String,
    pub workspace_id: String,
    pub request_id: String,
}

impl fmt::Display for DispatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.organization_id, self.project_id, self.workspace_id, self.request_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPayload {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub authentication: AuthMethod,
    pub cookie_jar: CookieJar,
    pub suppress_user_agent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub rendered_request: RenderedRequest,
    pub should_prompt_for_path_after_response: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "camelCase")]
pub enum ChannelCommand {
    Connect(ConnectPayload),
    Send(SendPayload),
}

impl ChannelCommand {
    pub fn action(&self) -> &'static str {
        match self {
            ChannelCommand::Connect(_) => "connect",
            ChannelCommand::Send(_) => "send",
        }
    }
}

/// Coarse channel state, used only to drive a loading indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    #[default]
    Idle,
    Busy,
}

pub trait SubmissionChannel: Send + Sync {
    fn submit(
        &self,
        scope: &DispatchScope,
        command: ChannelCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    fn status(&self) -> ChannelStatus;
}

/// Long-lived connections, owned outside the orchestrator.
pub trait StreamTransport: Send + Sync {
    fn ready_state(&self, request_id: &str, protocol: &str) -> bool;

    /// Fire-and-forget.
    fn close(&self, request_id: &str);
}
