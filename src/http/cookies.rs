use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|at| at <= now).unwrap_or(false)
    }

    fn matches(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or_default();
        let domain = self.domain.trim_start_matches('.');
        let host_ok = host.eq_ignore_ascii_case(domain)
            || host.to_ascii_lowercase().ends_with(&format!(".{}", domain.to_ascii_lowercase()));
        let path = url.path();
        let path_ok = path == self.path
            || (path.starts_with(&self.path)
                && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/')));
        let scheme_ok = !self.secure || url.scheme() == "https";
        host_ok && path_ok && scheme_ok
    }
}

/// Cookies received through `Set-Cookie`, replayed on matching requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one `Set-Cookie` header received from `url`. A `Max-Age` of
    /// zero or less, or an `Expires` in the past, deletes the cookie.
    pub fn store(&mut self, url: &Url, header: &str) {
        let mut parts = header.split(';');
        let (name, value) = match parts.next().and_then(|pair| pair.split_once('=')) {
            Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
            None => return,
        };
        if name.is_empty() {
            return;
        }

        let mut cookie = Cookie::new(name, value, url.host_str().unwrap_or_default());
        cookie.path = default_path(url);
        let now = Utc::now();

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((key, val)) => (key.trim().to_ascii_lowercase(), val.trim()),
                None => (attribute.trim().to_ascii_lowercase(), ""),
            };
            match key.as_str() {
                "domain" if !val.is_empty() => cookie.domain = val.trim_start_matches('.').to_string(),
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "max-age" => {
                    if let Ok(seconds) = val.parse::<i64>() {
                        cookie.expires = Some(now + Duration::seconds(seconds));
                    }
                }
                "expires" if cookie.expires.is_none() => {
                    if let Ok(at) = DateTime::parse_from_rfc2822(val) {
                        cookie.expires = Some(at.with_timezone(&Utc));
                    }
                }
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        self.cookies.retain(|c| {
            !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
        });

        if cookie.is_expired(now) {
            debug!(name = %cookie.name, "cookie deleted");
        } else {
            debug!(name = %cookie.name, domain = %cookie.domain, "cookie stored");
            self.cookies.push(cookie);
        }
    }

    /// `Cookie` header value for a request to `url`.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let now = Utc::now();
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| !c.is_expired(now) && c.matches(url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|c| c.value.as_str())
    }

    pub fn set(&mut self, cookie: Cookie) {
        self.cookies
            .retain(|c| !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path));
        self.cookies.push(cookie);
    }

    pub fn remove(&mut self, name: &str) {
        self.cookies.retain(|c| c.name != name);
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_store_and_replay() {
        let mut jar = CookieJar::new();
        jar.store(&url("http://app.test/login"), "session=abc; Path=/; HttpOnly");
        jar.store(&url("http://app.test/admin/x"), "scoped=1");

        assert_eq!(jar.value("session"), Some("abc"));
        assert!(jar.get("session").unwrap().http_only);
        assert_eq!(jar.header_for(&url("http://app.test/")).as_deref(), Some("session=abc"));
        assert_eq!(
            jar.header_for(&url("http://app.test/admin/page")).as_deref(),
            Some("session=abc; scoped=1")
        );
        assert!(jar.header_for(&url("http://other.test/")).is_none());
    }

    #[test]
    fn test_domain_cookies_cover_subdomains() {
        let mut jar = CookieJar::new();
        jar.store(&url("http://app.test/"), "wide=1; Domain=.app.test");
        assert!(jar.header_for(&url("http://api.app.test/")).is_some());
    }

    #[test]
    fn test_expiry_deletes() {
        let mut jar = CookieJar::new();
        jar.store(&url("http://app.test/"), "a=1");
        jar.store(&url("http://app.test/"), "b=1");
        jar.store(&url("http://app.test/"), "a=; Max-Age=0");
        jar.store(&url("http://app.test/"), "b=; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        assert!(jar.is_empty());
    }

    #[test]
    fn test_secure_cookies_need_https() {
        let mut jar = CookieJar::new();
        jar.store(&url("https://app.test/"), "s=1; Secure");
        assert!(jar.header_for(&url("http://app.test/")).is_none());
        assert!(jar.header_for(&url("https://app.test/")).is_some());
    }
}
