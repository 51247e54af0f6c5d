use crate::core::config::{ArtifactConfig, Config};
use crate::core::driver::{Driver, Interactive, Visual};
use crate::core::session::{SessionCache, SessionState};
use crate::dom::{Document, FieldValue, Node, NodeKind, SessionHandle};
use crate::errors::{BrowserError, Result};
use crate::http::{Cookie, CookieJar, HttpOptions, Method};
use crate::types::ElementRect;
use crate::utils::javascript;
use headless_chrome::{Browser as ChromeProcess, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const BACKEND: &str = "chrome";

/// Real browser backend. The DOM is read back from Chrome on every access;
/// field writes go through JavaScript on the node's CSS path.
pub struct ChromeDriver {
    config: Config,
    process: Option<ChromeProcess>,
    tab: Option<Arc<Tab>>,
    handle: Option<SessionHandle>,
    cache: SessionCache,
    generation: u64,
    token: Option<String>,
    visited: bool,
}

impl ChromeDriver {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            process: None,
            tab: None,
            handle: None,
            cache: SessionCache::new(),
            generation: 0,
            token: None,
            visited: false,
        }
    }

    fn tab(&self) -> Result<Arc<Tab>> {
        self.tab.clone().ok_or(BrowserError::NotStarted)
    }

    fn launch(&mut self) -> Result<()> {
        let browser = &self.config.browser;
        let window_size_arg = format!(
            "--window-size={},{}",
            browser.viewport.width, browser.viewport.height
        );
        let user_agent_arg = browser
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];
        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }
        if browser.disable_images {
            args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
        }
        for arg in &browser.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(browser.headless)
            .args(args)
            .build()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let process =
            ChromeProcess::new(launch_options).map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        let tab = process
            .new_tab()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        tab.set_default_timeout(Duration::from_millis(browser.timeout_ms));

        info!(headless = browser.headless, "chrome launched");
        self.process = Some(process);
        self.tab = Some(tab);
        Ok(())
    }

    fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self
            .tab()?
            .evaluate(script, false)
            .map_err(|e| BrowserError::JavaScriptFailed(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn wait_for_load(&self) -> Result<()> {
        self.tab()?
            .wait_until_navigated()
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    /// Runs `body` with `el` bound to the live element behind `node`.
    fn on_element(&mut self, node: &Node, body: &str) -> Result<Value> {
        let live = self.generation()?;
        self.cache.ensure_current(node, live)?;
        let script = javascript::on_element(&node.css_path(), body)?;
        match self.evaluate(&script)? {
            Value::String(encoded) => Ok(serde_json::from_str(&encoded)?),
            _ => Ok(Value::Null),
        }
    }

    fn read_document(&self, generation: u64) -> Result<Document> {
        let tab = self.tab()?;
        let source = tab
            .get_content()
            .map_err(|e| BrowserError::ChromeError(e.to_string()))?;
        Ok(Document::parse_snapshot(&source, generation, Some(tab.get_url())))
    }
}

impl Interactive for ChromeDriver {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn bind(&mut self, handle: SessionHandle) {
        self.handle = Some(handle);
    }

    fn handle(&self) -> Option<SessionHandle> {
        self.handle.clone()
    }

    /// A document without our token on `window` is a new document.
    fn generation(&mut self) -> Result<Option<u64>> {
        if !self.visited || self.tab.is_none() {
            return Ok(None);
        }
        let fresh = uuid::Uuid::new_v4().to_string();
        let token = self
            .evaluate(&javascript::stamp_token(&fresh))?
            .as_str()
            .map(str::to_string)
            .unwrap_or_default();

        if self.token.as_deref() != Some(token.as_str()) {
            self.generation += 1;
            debug!(generation = self.generation, "new document in chrome");
            self.token = Some(token);
        }
        Ok(Some(self.generation))
    }

    fn document(&mut self) -> Result<Rc<Document>> {
        let live = self.generation()?;
        match self.cache.state(live) {
            SessionState::NotStarted => Err(BrowserError::NotStarted),
            // same document, but scripts may have changed it
            SessionState::Active(generation) => {
                let document = self.read_document(generation)?;
                Ok(self.cache.refresh(document))
            }
            SessionState::Stale { live, .. } => {
                let document = self.read_document(live)?;
                self.cache.document(Some(live), |_| Ok(document))
            }
        }
    }

    fn field_value(&mut self, field: &Node) -> Result<FieldValue> {
        let body = match field.kind() {
            NodeKind::Checkbox | NodeKind::Radio => "return el.checked ? (el.value || 'on') : null;",
            NodeKind::Multiselect => {
                "return Array.from(el.selectedOptions).map(function (o) { return o.value; });"
            }
            NodeKind::Combobox => {
                "return el.selectedIndex >= 0 ? el.options[el.selectedIndex].value : null;"
            }
            NodeKind::File => {
                "return Array.from(el.files || []).map(function (f) { return f.name; });"
            }
            NodeKind::Input | NodeKind::Textarea => "return el.value;",
            _ => return Ok(field.static_value()),
        };
        let value = self.on_element(field, body)?;
        Ok(match value {
            Value::String(s) => FieldValue::Single(s),
            Value::Array(items) => FieldValue::Multiple(
                items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => FieldValue::None,
        })
    }

    fn set_value(&mut self, field: &Node, value: &str) -> Result<()> {
        let body = format!(
            "el.focus(); el.value = {}; {} return true;",
            serde_json::to_string(value)?,
            javascript::FIRE_CHANGE
        );
        self.on_element(field, &body)?;
        Ok(())
    }

    fn set_checked(&mut self, field: &Node, checked: bool) -> Result<()> {
        let body = format!(
            "if (el.checked !== {0}) {{ el.click(); }} if (el.checked !== {0}) {{ el.checked = {0}; }} return el.checked;",
            checked
        );
        self.on_element(field, &body)?;
        Ok(())
    }

    fn select_option(&mut self, field: &Node, value: &str, additive: bool) -> Result<()> {
        let body = format!(
            "var wanted = {}; var found = false; \
             Array.from(el.options).forEach(function (o) {{ \
               if (o.value === wanted) {{ o.selected = true; found = true; }} \
               else if (!{}) {{ o.selected = false; }} }}); \
             if (found) {{ {} }} return found;",
            serde_json::to_string(value)?,
            additive,
            javascript::FIRE_CHANGE
        );
        match self.on_element(field, &body)? {
            Value::Bool(true) => Ok(()),
            _ => Err(BrowserError::OptionNotFound(value.to_string())),
        }
    }

    fn deselect_option(&mut self, field: &Node, value: Option<&str>) -> Result<()> {
        let body = format!(
            "var wanted = {}; Array.from(el.options).forEach(function (o) {{ \
               if (wanted === null || o.value === wanted) {{ o.selected = false; }} }}); \
             {} return true;",
            serde_json::to_string(&value)?,
            javascript::FIRE_CHANGE
        );
        self.on_element(field, &body)?;
        Ok(())
    }

    fn attach_files(&mut self, field: &Node, paths: &[PathBuf]) -> Result<()> {
        let live = self.generation()?;
        self.cache.ensure_current(field, live)?;
        let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();

        let tab = self.tab()?;
        let element = tab
            .find_element(&field.css_path())
            .map_err(|e| BrowserError::ElementNotFound(e.to_string()))?;
        element
            .set_input_files(&refs)
            .map_err(|e| BrowserError::ChromeError(e.to_string()))?;
        debug!(field = %field, files = refs.len(), "attached files");
        Ok(())
    }

    fn click(&mut self, node: &Node) -> Result<()> {
        let live = self.generation()?;
        self.cache.ensure_current(node, live)?;
        let tab = self.tab()?;
        debug!(node = %node, "click");
        tab.find_element(&node.css_path())
            .map_err(|e| BrowserError::ElementNotFound(e.to_string()))?
            .click()
            .map_err(|e| BrowserError::ChromeError(e.to_string()))?;
        self.wait_for_load()
    }

    fn submit(&mut self, form: &Node, submitter: Option<&Node>) -> Result<()> {
        if let Some(button) = submitter {
            return self.click(button);
        }
        self.on_element(
            form,
            "if (el.requestSubmit) { el.requestSubmit(); } else { el.submit(); } return true;",
        )?;
        self.wait_for_load()
    }

    fn submitted_values(&mut self, form: &Node) -> Result<Vec<(String, String)>> {
        let value = self.on_element(
            form,
            "return Array.from(new FormData(el)).filter(function (e) { return typeof e[1] === 'string'; });",
        )?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Driver for ChromeDriver {
    type Client = Option<Arc<Tab>>;

    fn start(&mut self) -> Result<()> {
        if self.process.is_none() {
            self.launch()?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.process.is_some() {
            info!("closing chrome");
        }
        self.tab = None;
        self.process = None;
        self.visited = false;
        self.token = None;
        self.cache.clear();
        Ok(())
    }

    /// A fresh process is the only reliable blank slate (cookies, storage).
    fn reset(&mut self) -> Result<()> {
        let was_started = self.is_started();
        self.stop()?;
        if was_started {
            self.start()?;
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.process.is_some()
    }

    fn visit(&mut self, url: &str) -> Result<()> {
        self.start()?;
        let target = match self.tab()?.get_url() {
            current if self.visited => Url::parse(&current)?.join(url)?,
            _ => Url::parse(&self.config.session.base_url)?.join(url)?,
        };
        info!(url = %target, "navigating");
        self.tab()?
            .navigate_to(target.as_str())
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        self.wait_for_load()?;
        self.visited = true;
        Ok(())
    }

    fn request(&mut self, method: Method, url: &str, options: HttpOptions) -> Result<()> {
        if method != Method::Get {
            return Err(BrowserError::unsupported(BACKEND, format!("{} requests", method)));
        }
        let only_query = HttpOptions {
            query: options.query.clone(),
            ..HttpOptions::default()
        };
        if options != only_query {
            return Err(BrowserError::unsupported(
                BACKEND,
                "request options other than query",
            ));
        }
        let mut target = match Url::parse(url) {
            Ok(url) => url,
            Err(_) => Url::parse(&self.config.session.base_url)?.join(url)?,
        };
        let query = options.flat_query();
        if !query.is_empty() {
            target.query_pairs_mut().extend_pairs(query);
        }
        self.visit(target.as_str())
    }

    fn current_url(&mut self) -> Result<Url> {
        if !self.visited {
            return Err(BrowserError::NotStarted);
        }
        Ok(Url::parse(&self.tab()?.get_url())?)
    }

    fn content(&mut self) -> Result<String> {
        if !self.visited {
            return Err(BrowserError::NotStarted);
        }
        self.tab()?
            .get_content()
            .map_err(|e| BrowserError::ChromeError(e.to_string()))
    }

    fn back(&mut self) -> Result<()> {
        self.evaluate("history.back()")?;
        self.wait_for_load()
    }

    fn forward(&mut self) -> Result<()> {
        self.evaluate("history.forward()")?;
        self.wait_for_load()
    }

    fn refresh(&mut self) -> Result<()> {
        self.tab()?
            .reload(false, None)
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        self.wait_for_load()
    }

    fn cookies(&mut self) -> Result<CookieJar> {
        let cookies = self
            .tab()?
            .get_cookies()
            .map_err(|e| BrowserError::ChromeError(e.to_string()))?;
        let mut jar = CookieJar::new();
        for cookie in cookies {
            let mut converted = Cookie::new(cookie.name, cookie.value, cookie.domain);
            converted.path = cookie.path;
            converted.secure = cookie.secure;
            converted.http_only = cookie.http_only;
            jar.set(converted);
        }
        Ok(jar)
    }

    fn client(&self) -> Self::Client {
        self.tab.clone()
    }

    fn save_state(&mut self, artifacts: &ArtifactConfig, name: &str) -> Result<Vec<PathBuf>> {
        if !self.visited {
            return Ok(vec![]);
        }
        let mut written = Vec::new();

        std::fs::create_dir_all(&artifacts.source_dir)?;
        let source = artifacts.source_dir.join(format!("{}.txt", name));
        std::fs::write(&source, self.content()?)?;
        written.push(source);

        let screenshot = artifacts.screenshot_dir.join(format!("{}.png", name));
        self.save_screenshot(&screenshot)?;
        written.push(screenshot);

        info!(files = written.len(), "saved browser state");
        Ok(written)
    }
}

impl Visual for ChromeDriver {
    fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.tab()?
            .capture_screenshot(
                headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
                None,
                None,
                true,
            )
            .map_err(|e| BrowserError::ChromeError(e.to_string()))
    }

    fn execute_script(&mut self, script: &str) -> Result<Value> {
        self.evaluate(script)
    }

    fn is_visible(&mut self, node: &Node) -> Result<bool> {
        let value = self.on_element(node, javascript::IS_VISIBLE)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn element_rect(&mut self, node: &Node) -> Result<Option<ElementRect>> {
        let value = self.on_element(
            node,
            "var r = el.getBoundingClientRect(); return { x: r.x, y: r.y, width: r.width, height: r.height };",
        )?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
