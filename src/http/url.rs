use reqwest::Url;

use super::request::{RenderedParameter, RenderedRequest};
use crate::auth::AuthMethod;
use crate::error::{DispatchError, Result};

const DEFAULT_SCHEME: &str = "http://";

/// Final URL for a rendered request: segment bindings substituted, then the
/// enabled query parameters and any query-placed API key appended.
pub fn compose_url(rendered: &RenderedRequest) -> Result<Url> {
    compose(&rendered.url, &rendered.parameters, &rendered.authentication)
}

pub fn compose(base: &str, parameters: &[RenderedParameter], auth: &AuthMethod) -> Result<Url> {
    let base = base.trim();
    let with_scheme = if base.contains("://") {
        base.to_string()
    } else {
        format!("{DEFAULT_SCHEME}{base}")
    };
    let mut url = Url::parse(&with_scheme).map_err(|e| DispatchError::InvalidUrl {
        url: with_scheme.clone(),
        reason: e.to_string(),
    })?;

    let bindings: Vec<&RenderedParameter> = parameters.iter().filter(|p| p.path_segment).collect();
    if !bindings.is_empty() {
        let path = url
            .path()
            .split('/')
            .map(|segment| {
                segment
                    .strip_prefix(':')
                    .and_then(|name| bindings.iter().find(|p| p.name == name))
                    .map(|p| urlencoding::encode(&p.value).into_owned())
                    .unwrap_or_else(|| segment.to_string())
            })
            .collect::<Vec<_>>()
            .join("/");
        url.set_path(&path);
    }

    let mut pairs: Vec<(&str, &str)> = parameters
        .iter()
        .filter(|p| !p.path_segment && !p.name.is_empty())
        .map(|p| (p.name.as_str(), p.value.as_str()))
        .collect();
    if let Some(pair) = auth.query_pair() {
        pairs.push(pair);
    }
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }

    Ok(url)
}
