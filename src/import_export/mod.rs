//! # Code Export
//!
//! Turns a rendered request into a shell command the user can copy.

use crate::auth::{ApiKeyLocation, AuthMethod};
use crate::error::Result;
use crate::http::request::RenderedRequest;
use crate::http::url::compose_url;

const LINE_BREAK: &str = " \\\n  ";

/// `curl` invocation equivalent to sending `request`.
pub fn to_curl(request: &RenderedRequest) -> Result<String> {
    let url = compose_url(request)?;
    let mut parts = vec![
        format!("curl --request {}", request.method),
        format!("--url {}", quote(url.as_str())),
    ];

    for (name, value) in &request.headers {
        if !name.is_empty() {
            parts.push(format!("--header {}", quote(&format!("{name}: {value}"))));
        }
    }

    match &request.authentication {
        AuthMethod::None => {}
        AuthMethod::BearerToken { token } => {
            let value = format!("Authorization: Bearer {}", token.trim());
            parts.push(format!("--header {}", quote(&value)));
        }
        AuthMethod::BasicAuth { username, password } => {
            let credentials = format!("{}:{}", username.trim(), password.trim());
            parts.push(format!("--user {}", quote(&credentials)));
        }
        AuthMethod::ApiKey {
            key,
            value,
            location: ApiKeyLocation::Header,
        } => {
            parts.push(format!("--header {}", quote(&format!("{}: {}", key.trim(), value.trim()))));
        }
        AuthMethod::ApiKey {
            location: ApiKeyLocation::Query,
            ..
        } => {}
    }

    if let Some(cookie) = request.cookie_jar.header_for(&url) {
        parts.push(format!("--header {}", quote(&format!("Cookie: {cookie}"))));
    }

    if let Some(body) = request.body.as_deref().filter(|body| !body.is_empty()) {
        if !request.method.is_bodyless() {
            parts.push(format!("--data-raw {}", quote(body)));
        }
    }

    Ok(parts.join(LINE_BREAK))
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
