use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
}

fn root_path() -> String {
    "/".to_string()
}

impl Cookie {
    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let domain = self.domain.trim_start_matches('.');
        let domain_ok = host.eq_ignore_ascii_case(domain)
            || host
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", domain.to_ascii_lowercase()));
        domain_ok && path_matches(url.path(), &self.path)
    }
}

/// RFC 6265 path-match: `/api` covers `/api` and `/api/x`, never `/apiary`.
fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => rest.is_empty() || cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Cookies shared by every request of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieJar {
    pub id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn empty(workspace_id: &str) -> Self {
        Self {
            id: format!("jar_{workspace_id}"),
            workspace_id: workspace_id.to_string(),
            cookies: Vec::new(),
        }
    }

    /// `Cookie` header value for `url`, if any cookie applies.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|cookie| cookie.matches(url))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, domain: &str, path: &str) -> Cookie {
        Cookie {
            name: name.into(),
            value: "1".into(),
            domain: domain.into(),
            path: path.into(),
        }
    }

    #[test]
    fn header_includes_matching_domain_and_subdomains() {
        let jar = CookieJar {
            cookies: vec![
                cookie("a", "example.com", "/"),
                cookie("b", ".example.com", "/api"),
                cookie("c", "other.com", "/"),
            ],
            ..CookieJar::empty("wrk_1")
        };

        let url = Url::parse("https://api.example.com/api/users").unwrap();
        assert_eq!(jar.header_for(&url).as_deref(), Some("a=1; b=1"));

        let outside = Url::parse("https://example.com/web").unwrap();
        assert_eq!(jar.header_for(&outside).as_deref(), Some("a=1"));

        let exact = Url::parse("https://api.example.com/api").unwrap();
        assert_eq!(jar.header_for(&exact).as_deref(), Some("a=1; b=1"));

        let sibling = Url::parse("https://api.example.com/apiary").unwrap();
        assert_eq!(jar.header_for(&sibling).as_deref(), Some("a=1"));
    }

    #[test]
    fn empty_jar_has_no_header() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(CookieJar::empty("wrk_1").header_for(&url), None);
    }
}
