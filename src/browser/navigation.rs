use super::session::Browser;
use crate::core::driver::{Driver, HttpAware, ProfileAware, Visual};
use crate::dom::{IntoSelector, SelectorKind};
use crate::errors::{BrowserError, Result};
use crate::http::Exchange;
use crate::types::ElementRect;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

impl<D: Driver> Browser<D> {
    /// Polls `condition` until it holds or the configured wait timeout runs
    /// out. Errors from the condition end the wait immediately.
    pub fn wait_until(
        &self,
        description: &str,
        mut condition: impl FnMut(&Self) -> Result<bool>,
    ) -> Result<&Self> {
        let timeout = Duration::from_millis(self.config().session.wait_timeout_ms);
        let interval = Duration::from_millis(self.config().session.poll_interval_ms.max(1));
        let started = Instant::now();
        loop {
            if condition(self)? {
                debug!(condition = description, elapsed = ?started.elapsed(), "wait satisfied");
                return Ok(self);
            }
            if started.elapsed() >= timeout {
                return Err(BrowserError::Timeout(format!(
                    "{} not met within {}ms",
                    description,
                    timeout.as_millis()
                )));
            }
            thread::sleep(interval);
        }
    }

    /// Waits for at least one match to exist in the document.
    pub fn wait_for_element(&self, selector: impl IntoSelector) -> Result<&Self> {
        let selector = selector.into_selector(SelectorKind::Auto);
        self.wait_until(&format!("element \"{}\"", selector), |browser| {
            Ok(!browser.find(&selector)?.is_empty())
        })
    }
}

/// Redirect control for backends that see raw responses.
impl<D: HttpAware> Browser<D> {
    /// Keeps 3xx responses as the current page until followed by hand.
    pub fn intercept_redirects(&self) -> &Self {
        self.driver_mut().set_follow_redirects(false);
        self
    }

    pub fn follow_redirects_automatically(&self) -> &Self {
        self.driver_mut().set_follow_redirects(true);
        self
    }

    pub fn follows_redirects(&self) -> bool {
        self.driver().follows_redirects()
    }

    pub fn follow_redirect(&self) -> Result<&Self> {
        self.driver_mut().follow_redirect()?;
        Ok(self)
    }

    pub fn follow_redirects(&self) -> Result<&Self> {
        self.driver_mut().follow_redirects()?;
        Ok(self)
    }
}

impl<D: ProfileAware> Browser<D> {
    /// The last request/response pair with its timing.
    pub fn profile(&self) -> Option<Exchange> {
        self.driver().profile().cloned()
    }
}

impl<D: Visual> Browser<D> {
    /// Plain pause, for pages animating on a timer.
    pub fn wait(&self, millis: u64) -> &Self {
        thread::sleep(Duration::from_millis(millis));
        self
    }

    fn visible(&self, selector: &crate::dom::Selector) -> Result<bool> {
        match self.find(selector)?.first() {
            Some(node) => self.driver_mut().is_visible(&node),
            None => Ok(false),
        }
    }

    pub fn wait_until_visible(&self, selector: impl IntoSelector) -> Result<&Self> {
        let selector = selector.into_selector(SelectorKind::Auto);
        self.wait_until(&format!("\"{}\" visible", selector), |browser| {
            browser.visible(&selector)
        })
    }

    pub fn wait_until_not_visible(&self, selector: impl IntoSelector) -> Result<&Self> {
        let selector = selector.into_selector(SelectorKind::Auto);
        self.wait_until(&format!("\"{}\" hidden", selector), |browser| {
            Ok(!browser.visible(&selector)?)
        })
    }

    pub fn wait_until_see_in(&self, selector: &str, text: &str) -> Result<&Self> {
        self.wait_until(&format!("'{}' in \"{}\"", text, selector), |browser| {
            Ok(browser.find(selector)?.visible_text().contains(text))
        })
    }

    pub fn wait_until_not_see_in(&self, selector: &str, text: &str) -> Result<&Self> {
        self.wait_until(&format!("no '{}' in \"{}\"", text, selector), |browser| {
            Ok(!browser.find(selector)?.visible_text().contains(text))
        })
    }

    pub fn screenshot(&self) -> Result<Vec<u8>> {
        self.driver_mut().screenshot()
    }

    /// `data:image/png;base64,...`, ready to embed in a report.
    pub fn screenshot_data_uri(&self) -> Result<String> {
        Ok(crate::utils::screenshot::to_data_uri(&self.screenshot()?))
    }

    pub fn save_screenshot(&self, path: impl AsRef<Path>) -> Result<&Self> {
        let path = path.as_ref();
        self.driver_mut().save_screenshot(path)?;
        info!(path = %path.display(), "saved screenshot");
        Ok(self)
    }

    /// Writes `<name>.png` under the configured screenshot directory.
    pub fn take_screenshot(&self, name: &str) -> Result<PathBuf> {
        let path = self
            .config()
            .artifacts
            .screenshot_dir
            .join(format!("{}.png", crate::testing::normalize_test_name(name)));
        self.save_screenshot(&path)?;
        Ok(path)
    }

    pub fn execute_script(&self, script: &str) -> Result<Value> {
        self.driver_mut().execute_script(script)
    }

    pub fn element_rect(&self, selector: impl IntoSelector) -> Result<Option<ElementRect>> {
        let node = self.get(selector)?;
        self.driver_mut().element_rect(&node)
    }
}

#[cfg(test)]
mod tests {
    use crate::browser::{Browser, KernelDriver};
    use crate::core::config::Config;
    use crate::errors::BrowserError;
    use crate::http::{Method, Request, Response};
    use std::cell::Cell;

    fn app(request: &Request) -> Response {
        match request.path() {
            "/old" => Response::redirect(301, "/middle"),
            "/middle" => Response::redirect(302, "/new"),
            "/new" => Response::html("<h1>New home</h1>"),
            _ => Response::html("<p>Start</p>"),
        }
    }

    fn quick() -> Browser<KernelDriver> {
        let mut config = Config::default();
        config.session.wait_timeout_ms = 30;
        config.session.poll_interval_ms = 5;
        Browser::kernel_with_config(app, config)
    }

    #[test]
    fn test_wait_until_polls() {
        let browser = quick();
        browser.visit("/").unwrap();
        let calls = Cell::new(0);
        browser
            .wait_until("third call", |_| {
                calls.set(calls.get() + 1);
                Ok(calls.get() >= 3)
            })
            .unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_wait_for_missing_element_times_out() {
        let browser = quick();
        browser.visit("/").unwrap();
        browser.wait_for_element("p").unwrap();
        match browser.wait_for_element(".spinner") {
            Err(BrowserError::Timeout(message)) => assert!(message.contains(".spinner")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_stepping_through_redirects() {
        let browser = quick();
        browser.intercept_redirects();
        assert!(!browser.follows_redirects());

        browser.visit("/old").unwrap();
        assert_eq!(browser.status_code().unwrap(), 301);
        browser.follow_redirect().unwrap();
        assert_eq!(browser.current_url().unwrap().path(), "/middle");
        browser.follow_redirects().unwrap();
        assert_eq!(browser.status_code().unwrap(), 200);
        assert_eq!(browser.current_url().unwrap().path(), "/new");

        browser.follow_redirects_automatically().visit("/old").unwrap();
        assert_eq!(browser.current_url().unwrap().path(), "/new");
    }

    #[test]
    fn test_profile_reports_the_last_exchange() {
        let browser = quick();
        assert!(browser.profile().is_none());
        browser.request(Method::Get, "/", Default::default()).unwrap();
        let exchange = browser.profile().unwrap();
        assert_eq!(exchange.request.method, Method::Get);
        assert_eq!(exchange.response.status, 200);
    }
}
