use super::{Assertion, AssertionFailure, Negatable, Outcome};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlComponent {
    Scheme,
    User,
    Password,
    Host,
    Port,
    Path,
    Query,
    Fragment,
}

/// Components compared when none are named: the host is ignored so the
/// same test passes against any server.
pub const DEFAULT_COMPONENTS: &[UrlComponent] =
    &[UrlComponent::Path, UrlComponent::Query, UrlComponent::Fragment];

impl UrlComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlComponent::Scheme => "scheme",
            UrlComponent::User => "user",
            UrlComponent::Password => "password",
            UrlComponent::Host => "host",
            UrlComponent::Port => "port",
            UrlComponent::Path => "path",
            UrlComponent::Query => "query",
            UrlComponent::Fragment => "fragment",
        }
    }

    /// Decoded value of this component, `None` when absent.
    pub fn extract(&self, url: &Url) -> Option<String> {
        let raw = match self {
            UrlComponent::Scheme => Some(url.scheme().to_string()),
            UrlComponent::User => Some(url.username().to_string()).filter(|u| !u.is_empty()),
            UrlComponent::Password => url.password().map(str::to_string),
            UrlComponent::Host => url.host_str().map(str::to_string),
            // explicit ports only; the parser already drops a scheme's default
            UrlComponent::Port => url.port().map(|p| p.to_string()),
            UrlComponent::Path => Some(url.path().to_string()),
            UrlComponent::Query => url.query().map(str::to_string).filter(|q| !q.is_empty()),
            UrlComponent::Fragment => url.fragment().map(str::to_string).filter(|f| !f.is_empty()),
        }?;
        Some(percent_decode_str(&raw).decode_utf8_lossy().into_owned())
    }
}

impl fmt::Display for UrlComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative inputs such as `/login?next=1` are read against a placeholder
/// origin so they can be compared with absolute ones.
fn parse_lenient(input: &str) -> Option<Url> {
    Url::parse(input)
        .ok()
        .or_else(|| Url::parse("http://localhost/").ok()?.join(input).ok())
}

#[derive(Debug, Clone)]
pub struct UrlEquals {
    actual: String,
    expected: String,
    components: Vec<UrlComponent>,
}

impl UrlEquals {
    pub fn new(actual: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            actual: actual.into(),
            expected: expected.into(),
            components: DEFAULT_COMPONENTS.to_vec(),
        }
    }

    pub fn with_components(mut self, components: &[UrlComponent]) -> Self {
        self.components = components.to_vec();
        self
    }

    fn mismatches(&self) -> std::result::Result<Vec<UrlComponent>, String> {
        let actual = parse_lenient(&self.actual).ok_or_else(|| format!("unparsable URL '{}'", self.actual))?;
        let expected =
            parse_lenient(&self.expected).ok_or_else(|| format!("unparsable URL '{}'", self.expected))?;
        Ok(self
            .components
            .iter()
            .copied()
            .filter(|c| c.extract(&actual) != c.extract(&expected))
            .collect())
    }

    fn compared(&self) -> String {
        self.components
            .iter()
            .map(UrlComponent::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Assertion for UrlEquals {
    fn description(&self) -> String {
        format!("URL equals '{}' ({})", self.expected, self.compared())
    }

    fn evaluate(&self) -> Outcome {
        let mismatches = self.mismatches().map_err(AssertionFailure::new)?;
        if mismatches.is_empty() {
            return Ok(());
        }
        let differing: Vec<&str> = mismatches.iter().map(UrlComponent::as_str).collect();
        Err(AssertionFailure::new(format!(
            "expected URL '{}', got '{}'",
            self.expected, self.actual
        ))
        .with_context("differing", differing.join(", ")))
    }
}

impl Negatable for UrlEquals {
    fn negated_failure(&self) -> AssertionFailure {
        AssertionFailure::new(format!(
            "expected URL to differ from '{}' ({})",
            self.expected,
            self.compared()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::not;

    #[test]
    fn test_host_is_ignored_by_default() {
        let check = UrlEquals::new("http://localhost/a?b=1#c", "http://example.com/a?b=1#c");
        assert!(check.evaluate().is_ok());

        let with_host = check.with_components(&[UrlComponent::Host, UrlComponent::Path]);
        let failure = with_host.evaluate().unwrap_err();
        assert_eq!(failure.context("differing"), Some("host"));
    }

    #[test]
    fn test_components_are_percent_decoded() {
        assert!(UrlEquals::new("http://localhost/caf%C3%A9?q=a%20b", "/café?q=a b")
            .evaluate()
            .is_ok());
    }

    #[test]
    fn test_relative_expected_url() {
        assert!(UrlEquals::new("http://localhost:8000/login", "/login").evaluate().is_ok());
        assert!(UrlEquals::new("http://localhost/login", "/logout").evaluate().is_err());
        assert!(not(UrlEquals::new("http://localhost/login", "/logout")).evaluate().is_ok());
    }

    #[test]
    fn test_only_explicit_ports_are_compared() {
        let port = [UrlComponent::Port];
        assert!(UrlEquals::new("http://a:443/", "https://a/")
            .with_components(&port)
            .evaluate()
            .is_err());
        assert!(UrlEquals::new("https://a/", "http://a/")
            .with_components(&port)
            .evaluate()
            .is_ok());
        assert!(UrlEquals::new("http://a:80/", "http://a/")
            .with_components(&port)
            .evaluate()
            .is_ok());
    }

    #[test]
    fn test_empty_query_equals_missing_query() {
        assert!(UrlEquals::new("http://localhost/a?", "/a").evaluate().is_ok());
    }
}
