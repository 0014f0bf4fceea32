//! # Authentication
//!
//! Authentication schemes a request can carry. Every string field may hold
//! template expressions; [`AuthMethod::try_map`] is how the renderer resolves
//! them without knowing the individual variants.

use serde::{Deserialize, Serialize};

/// Supported authentication methods.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthMethod {
    #[default]
    None,
    #[serde(rename_all = "camelCase")]
    BearerToken { token: String },
    #[serde(rename_all = "camelCase")]
    BasicAuth { username: String, password: String },
    #[serde(rename_all = "camelCase")]
    ApiKey {
        key: String,
        value: String,
        location: ApiKeyLocation,
    },
}

/// Where to place the API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

impl AuthMethod {
    /// Apply `f` to every user-provided string, keeping the variant.
    pub fn try_map<E>(
        &self,
        mut f: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<AuthMethod, E> {
        Ok(match self {
            AuthMethod::None => AuthMethod::None,
            AuthMethod::BearerToken { token } => AuthMethod::BearerToken { token: f(token)? },
            AuthMethod::BasicAuth { username, password } => AuthMethod::BasicAuth {
                username: f(username)?,
                password: f(password)?,
            },
            AuthMethod::ApiKey {
                key,
                value,
                location,
            } => AuthMethod::ApiKey {
                key: f(key)?,
                value: f(value)?,
                location: *location,
            },
        })
    }

    /// Query pair contributed to the URL, if the scheme puts one there.
    pub fn query_pair(&self) -> Option<(&str, &str)> {
        match self {
            AuthMethod::ApiKey {
                key,
                value,
                location: ApiKeyLocation::Query,
            } if !key.trim().is_empty() => Some((key.trim(), value.trim())),
            _ => None,
        }
    }
}
