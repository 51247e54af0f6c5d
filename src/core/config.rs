use crate::errors::{BrowserError, Result};
use crate::types::Viewport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub browser: ChromeConfig,
    pub session: SessionConfig,
    pub artifacts: ArtifactConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromeConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    pub args: Vec<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub base_url: String,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub wait_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub source_dir: PathBuf,
    pub screenshot_dir: PathBuf,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            disable_images: false,
            args: vec![],
            timeout_ms: 30000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_string(),
            follow_redirects: true,
            max_redirects: 10,
            wait_timeout_ms: 5000,
            poll_interval_ms: 100,
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("var/browser/source"),
            screenshot_dir: PathBuf::from("var/browser/screenshots"),
        }
    }
}

impl Config {
    /// Defaults overlaid with the `BROWSER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup("BROWSER_BASE_URL") {
            url::Url::parse(&url)
                .map_err(|e| BrowserError::Configuration(format!("BROWSER_BASE_URL: {}", e)))?;
            self.session.base_url = url;
        }

        if let Some(value) = lookup("BROWSER_FOLLOW_REDIRECTS") {
            self.session.follow_redirects = parse_bool("BROWSER_FOLLOW_REDIRECTS", &value)?;
        }

        if let Some(value) = lookup("BROWSER_HEADLESS") {
            self.browser.headless = parse_bool("BROWSER_HEADLESS", &value)?;
        }

        if let Some(value) = lookup("BROWSER_TIMEOUT") {
            self.session.wait_timeout_ms = value.trim().parse().map_err(|_| {
                BrowserError::Configuration(format!(
                    "BROWSER_TIMEOUT must be a number of milliseconds, got '{}'",
                    value
                ))
            })?;
        }

        if let Some(dir) = lookup("BROWSER_SOURCE_DIR") {
            self.artifacts.source_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("BROWSER_SCREENSHOT_DIR") {
            self.artifacts.screenshot_dir = PathBuf::from(dir);
        }

        Ok(self)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.session.base_url = base_url.into();
        self
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(BrowserError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.browser.headless);
        assert!(config.session.follow_redirects);
        assert_eq!(config.session.base_url, "http://localhost/");
        assert_eq!(config.artifacts.source_dir, PathBuf::from("var/browser/source"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides(lookup(&[
                ("BROWSER_BASE_URL", "https://app.test/"),
                ("BROWSER_FOLLOW_REDIRECTS", "0"),
                ("BROWSER_HEADLESS", "false"),
                ("BROWSER_TIMEOUT", "250"),
                ("BROWSER_SOURCE_DIR", "/tmp/sources"),
            ]))
            .unwrap();

        assert_eq!(config.session.base_url, "https://app.test/");
        assert!(!config.session.follow_redirects);
        assert!(!config.browser.headless);
        assert_eq!(config.session.wait_timeout_ms, 250);
        assert_eq!(config.artifacts.source_dir, PathBuf::from("/tmp/sources"));
    }

    #[test]
    fn test_invalid_env_values_are_rejected() {
        let result = Config::default().with_overrides(lookup(&[("BROWSER_TIMEOUT", "soon")]));
        assert!(matches!(result, Err(BrowserError::Configuration(_))));

        let result =
            Config::default().with_overrides(lookup(&[("BROWSER_FOLLOW_REDIRECTS", "maybe")]));
        assert!(matches!(result, Err(BrowserError::Configuration(_))));

        let result = Config::default().with_overrides(lookup(&[("BROWSER_BASE_URL", "not a url")]));
        assert!(matches!(result, Err(BrowserError::Configuration(_))));
    }
}
