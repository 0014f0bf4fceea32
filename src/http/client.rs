//! reqwest-backed submission channel.
//!
//! `send` performs one exchange and keeps the last response. `connect`
//! spawns a streaming task registered in the [`StreamRegistry`]; the task
//! reports readiness there and stops when the registry cancels it.

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, COOKIE, USER_AGENT};
use reqwest::{Client, RequestBuilder, Url};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::request::RenderedRequest;
use super::response::HttpResponse;
use super::url::compose_url;
use crate::auth::{ApiKeyLocation, AuthMethod};
use crate::channel::{
    ChannelCommand, ChannelStatus, ConnectPayload, DispatchScope, SendPayload, StreamRegistry,
    SubmissionChannel, STREAM_PROTOCOL,
};
use crate::error::{DispatchError, Result};
use crate::settings::Settings;
use crate::storage;

const EVENT_STREAM: &str = "text/event-stream";
const STREAM_BUFFER: usize = 64;

/// A piece of data received on an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub request_id: String,
    pub data: String,
}

pub struct HttpBackend {
    client: Client,
    streams: Arc<StreamRegistry>,
    chunks: broadcast::Sender<StreamChunk>,
    in_flight: AtomicUsize,
    last_response: Mutex<Option<HttpResponse>>,
    download_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    user_agent: String,
}

impl HttpBackend {
    pub fn new(settings: &Settings, streams: Arc<StreamRegistry>) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        let (chunks, _) = broadcast::channel(STREAM_BUFFER);
        Ok(Self {
            client,
            streams,
            chunks,
            in_flight: AtomicUsize::new(0),
            last_response: Mutex::new(None),
            download_dir: settings.download_path.clone(),
            timeout: settings.request_timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis),
            user_agent: format!("getman-dispatch/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn last_response(&self) -> Option<HttpResponse> {
        self.last_response.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn subscribe_streams(&self) -> broadcast::Receiver<StreamChunk> {
        self.chunks.subscribe()
    }

    async fn send(&self, payload: SendPayload) -> Result<HttpResponse> {
        let request = &payload.rendered_request;
        let url = compose_url(request)?;
        let mut builder = self.request_builder(request, &url)?;
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body.as_deref().filter(|body| !body.is_empty()) {
            if !request.method.is_bodyless() {
                builder = builder.body(body.to_string());
            }
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let elapsed = started.elapsed().as_millis();

        let status = response.status();
        let headers = format_headers(response.headers());
        let bytes = response.bytes().await?;

        let mut result = HttpResponse {
            request_id: request.request_id.clone(),
            status: format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ),
            duration_ms: elapsed,
            size_bytes: bytes.len(),
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            downloaded_to: None,
        };

        if let Some(dir) = self.download_target(payload.should_prompt_for_path_after_response) {
            fs::create_dir_all(&dir)?;
            let path = dir.join(format!("response-{}.bin", request.request_id));
            fs::write(&path, &bytes)?;
            info!(request_id = %request.request_id, path = %path.display(), "response downloaded");
            result.downloaded_to = Some(path);
        }

        Ok(result)
    }

    /// Where to write the response body. An explicit download request without
    /// a configured directory falls back to the data directory.
    fn download_target(&self, requested: bool) -> Option<PathBuf> {
        match (&self.download_dir, requested) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => Some(storage::data_dir().join("downloads")),
            (None, false) => None,
        }
    }

    fn request_builder(&self, request: &RenderedRequest, url: &Url) -> Result<RequestBuilder> {
        let mut builder = self
            .client
            .request(request.method.into(), url.clone())
            .headers(build_headers(&request.headers)?);
        builder = apply_auth(builder, &request.authentication)?;
        if let Some(cookie) = request.cookie_jar.header_for(url) {
            builder = builder.header(COOKIE, cookie);
        }
        if !request.suppress_user_agent {
            builder = builder.header(USER_AGENT, &self.user_agent);
        }
        Ok(builder)
    }

    fn connect(&self, scope: &DispatchScope, payload: ConnectPayload) -> Result<()> {
        let url = Url::parse(&payload.url).map_err(|e| DispatchError::InvalidUrl {
            url: payload.url.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = self
            .client
            .get(url.clone())
            .header(ACCEPT, EVENT_STREAM)
            .headers(build_headers(&payload.headers)?);
        builder = apply_auth(builder, &payload.authentication)?;
        if let Some(cookie) = payload.cookie_jar.header_for(&url) {
            builder = builder.header(COOKIE, cookie);
        }
        if !payload.suppress_user_agent {
            builder = builder.header(USER_AGENT, &self.user_agent);
        }

        let request_id = scope.request_id.clone();
        let (generation, cancel_rx) = self.streams.register(&request_id);
        let streams = self.streams.clone();
        let chunks = self.chunks.clone();
        info!(%request_id, %url, "opening stream");
        tokio::spawn(async move {
            run_stream(builder, &request_id, generation, cancel_rx, &streams, &chunks).await;
            streams.release(&request_id, generation);
            info!(%request_id, "stream closed");
        });
        Ok(())
    }
}

async fn run_stream(
    builder: RequestBuilder,
    request_id: &str,
    generation: u64,
    mut cancel_rx: broadcast::Receiver<()>,
    streams: &StreamRegistry,
    chunks: &broadcast::Sender<StreamChunk>,
) {
    let response = tokio::select! {
        response = builder.send() => response,
        _ = cancel_rx.recv() => return,
    };
    let mut response = match response {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!(request_id, status = %response.status(), "stream refused");
            return;
        }
        Err(err) => {
            warn!(request_id, error = %err, "stream connect failed");
            return;
        }
    };

    streams.mark_open(request_id, generation, STREAM_PROTOCOL);
    loop {
        tokio::select! {
            chunk = response.chunk() => match chunk {
                Ok(Some(bytes)) => {
                    debug!(request_id, bytes = bytes.len(), "stream data");
                    let _ = chunks.send(StreamChunk {
                        request_id: request_id.to_string(),
                        data: String::from_utf8_lossy(&bytes).into_owned(),
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(request_id, error = %err, "stream read failed");
                    break;
                }
            },
            _ = cancel_rx.recv() => break,
        }
    }
}

/// Marks the backend busy for as long as it lives.
struct BusyGuard<'a>(&'a AtomicUsize);

impl<'a> BusyGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SubmissionChannel for HttpBackend {
    fn submit(
        &self,
        scope: &DispatchScope,
        command: ChannelCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let scope = scope.clone();
        Box::pin(async move {
            debug!(%scope, action = command.action(), "submit");
            match command {
                ChannelCommand::Connect(payload) => self.connect(&scope, payload),
                ChannelCommand::Send(payload) => {
                    let _busy = BusyGuard::new(&self.in_flight);
                    let response = self.send(payload).await?;
                    info!(
                        request_id = %response.request_id,
                        status = %response.status,
                        duration_ms = response.duration_ms as u64,
                        size_bytes = response.size_bytes,
                        "response received"
                    );
                    *self.last_response.lock().unwrap_or_else(|e| e.into_inner()) = Some(response);
                    Ok(())
                }
            }
        })
    }

    fn status(&self) -> ChannelStatus {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            ChannelStatus::Busy
        } else {
            ChannelStatus::Idle
        }
    }
}

pub fn build_headers(input: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (key, value) in input {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
            DispatchError::Transport(format!("Invalid header name `{key}`: {err}"))
        })?;
        let header_value = HeaderValue::from_str(value.trim()).map_err(|err| {
            DispatchError::Transport(format!("Invalid header value for `{key}`: {err}"))
        })?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

fn apply_auth(builder: RequestBuilder, auth: &AuthMethod) -> Result<RequestBuilder> {
    Ok(match auth {
        AuthMethod::None => builder,
        AuthMethod::ApiKey {
            location: ApiKeyLocation::Query,
            ..
        } => builder,
        AuthMethod::BearerToken { token } => builder.bearer_auth(token.trim()),
        AuthMethod::BasicAuth { username, password } => {
            builder.basic_auth(username.trim(), Some(password.trim()))
        }
        AuthMethod::ApiKey {
            key,
            value,
            location: ApiKeyLocation::Header,
        } => {
            let key = key.trim();
            if key.is_empty() {
                return Ok(builder);
            }
            let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
                DispatchError::Transport(format!("Invalid API key header `{key}`: {err}"))
            })?;
            let header_value = HeaderValue::from_str(value.trim()).map_err(|err| {
                DispatchError::Transport(format!("Invalid API key header value: {err}"))
            })?;
            builder.header(header_name, header_value)
        }
    })
}

fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{name}: {}", value.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join("\n")
}
