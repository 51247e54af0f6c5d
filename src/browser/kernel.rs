use crate::core::config::{ArtifactConfig, SessionConfig};
use crate::core::driver::{Driver, HttpAware, Interactive, ProfileAware};
use crate::core::session::SessionCache;
use crate::dom::{Document, FieldValue, Node, NodeKind, SessionHandle};
use crate::errors::{BrowserError, Result};
use crate::http::{CookieJar, Exchange, HttpOptions, Kernel, Method, ParamValue, Request, Response};
use chrono::Utc;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, info};
use url::Url;

const BACKEND: &str = "kernel";

#[derive(Debug, Clone)]
struct HistoryEntry {
    method: Method,
    url: Url,
    options: HttpOptions,
}

/// Simulated browser: every request is handed to an in-process `Kernel`,
/// nothing touches the network.
pub struct KernelDriver {
    kernel: Rc<RefCell<dyn Kernel>>,
    config: SessionConfig,
    handle: Option<SessionHandle>,
    started: bool,
    generation: u64,
    response: Option<Response>,
    url: Option<Url>,
    exchange: Option<Exchange>,
    last_request: Option<(Method, HttpOptions)>,
    cookies: CookieJar,
    cache: SessionCache,
    history: Vec<HistoryEntry>,
    cursor: usize,
    default_options: HttpOptions,
    follow_redirects: bool,
}

impl KernelDriver {
    pub fn new(kernel: impl Kernel + 'static, config: &SessionConfig) -> Self {
        Self {
            kernel: Rc::new(RefCell::new(kernel)),
            follow_redirects: config.follow_redirects,
            config: config.clone(),
            handle: None,
            started: false,
            generation: 0,
            response: None,
            url: None,
            exchange: None,
            last_request: None,
            cookies: CookieJar::new(),
            cache: SessionCache::new(),
            history: Vec::new(),
            cursor: 0,
            default_options: HttpOptions::new(),
        }
    }

    /// Options merged under every request this driver sends.
    pub fn with_default_options(mut self, options: HttpOptions) -> Self {
        self.default_options = options;
        self
    }

    pub fn set_default_options(&mut self, options: HttpOptions) {
        self.default_options = options;
    }

    pub fn default_options(&self) -> &HttpOptions {
        &self.default_options
    }

    pub fn cookie_jar_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn live(&self) -> Option<u64> {
        self.response.as_ref().map(|_| self.generation)
    }

    fn resolve_url(&self, target: &str) -> Result<Url> {
        let base = match &self.url {
            Some(url) => url.clone(),
            None => Url::parse(&self.config.base_url)?,
        };
        Ok(base.join(target)?)
    }

    fn build_request(&self, method: Method, mut url: Url, options: &HttpOptions) -> Result<Request> {
        let query = options.flat_query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut request = Request::new(method, url);
        for (name, value) in options.effective_headers() {
            request.headers.insert(&name, value);
        }
        if !request.headers.contains("Cookie") {
            if let Some(cookie) = self.cookies.header_for(&request.url) {
                request.headers.insert("Cookie", cookie);
            }
        }
        request.parameters = options.flat_parameters();
        request.files = options
            .files
            .iter()
            .flat_map(|(name, paths)| paths.iter().map(move |path| (name.clone(), path.clone())))
            .collect();
        request.server = options.server.clone();
        request.body = options.effective_body()?;
        Ok(request)
    }

    /// Sends one request and adopts its response as the live page.
    fn dispatch(&mut self, method: Method, url: Url, options: &HttpOptions) -> Result<()> {
        let request = self.build_request(method, url, options)?;
        debug!(method = %request.method, url = %request.url, "dispatching to kernel");

        let started_at = Utc::now();
        let clock = Instant::now();
        let response = self.kernel.borrow_mut().handle(&request);
        let duration = clock.elapsed();

        for header in response.headers.get_all("Set-Cookie") {
            self.cookies.store(&request.url, header);
        }

        self.generation += 1;
        self.url = Some(request.url.clone());
        self.response = Some(response.clone());
        self.last_request = Some((method, options.clone()));
        self.exchange = Some(Exchange {
            request,
            response,
            started_at,
            duration,
        });
        Ok(())
    }

    fn navigate(&mut self, entry: HistoryEntry, record: bool) -> Result<()> {
        info!(method = %entry.method, url = %entry.url, "request");
        self.dispatch(entry.method, entry.url.clone(), &entry.options)?;

        if record {
            if !self.history.is_empty() {
                self.history.truncate(self.cursor + 1);
            }
            self.history.push(entry);
            self.cursor = self.history.len() - 1;
        }

        if self.follow_redirects {
            self.follow_until_settled(self.config.max_redirects)?;
        }
        Ok(())
    }

    fn follow_until_settled(&mut self, limit: usize) -> Result<()> {
        let mut hops = 0;
        while self.response.as_ref().map(Response::is_redirect).unwrap_or(false) {
            if hops == limit {
                return Err(BrowserError::NavigationFailed(format!(
                    "gave up after {} redirects",
                    limit
                )));
            }
            self.hop()?;
            hops += 1;
        }
        Ok(())
    }

    /// Follows the pending redirect; the hop replaces the current history
    /// entry.
    fn hop(&mut self) -> Result<()> {
        let response = self.response.as_ref().ok_or(BrowserError::NotStarted)?;
        if !response.is_redirect() {
            return Err(BrowserError::NavigationFailed(format!(
                "no redirect to follow, last status was {}",
                response.status
            )));
        }
        let status = response.status;
        let location = response
            .location()
            .ok_or_else(|| BrowserError::NavigationFailed(format!("{} without Location", status)))?
            .to_string();
        let target = self.resolve_url(&location)?;

        let (method, options) = match (status, &self.last_request) {
            (307 | 308, Some((method, options))) => (*method, options.clone()),
            _ => (Method::Get, self.default_options.clone()),
        };
        info!(status, to = %target, "following redirect");

        self.dispatch(method, target.clone(), &options)?;
        let entry = HistoryEntry {
            method,
            url: target,
            options,
        };
        match self.history.get_mut(self.cursor) {
            Some(current) => *current = entry,
            None => {
                self.history.push(entry);
                self.cursor = self.history.len() - 1;
            }
        }
        Ok(())
    }

    /// The form a field belongs to, or the root element for formless ones.
    fn scope_of(&self, node: &Node) -> Result<Node> {
        node.form()
            .or_else(|| node.wrap(node.document().root_element()))
            .ok_or_else(|| BrowserError::ElementNotFound(format!("form scope of {}", node)))
    }

    fn owning_form(&self, node: &Node) -> Result<Node> {
        node.form()
            .ok_or_else(|| BrowserError::ElementNotFound(format!("form owning {}", node)))
    }

    fn current_entry(&self) -> Result<HistoryEntry> {
        self.history
            .get(self.cursor)
            .cloned()
            .ok_or(BrowserError::NotStarted)
    }
}

impl Interactive for KernelDriver {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn bind(&mut self, handle: SessionHandle) {
        self.handle = Some(handle);
    }

    fn handle(&self) -> Option<SessionHandle> {
        self.handle.clone()
    }

    fn generation(&mut self) -> Result<Option<u64>> {
        Ok(self.live())
    }

    fn document(&mut self) -> Result<Rc<Document>> {
        let live = self.live();
        let response = &self.response;
        let url = self.url.as_ref().map(Url::to_string);
        self.cache.document(live, |generation| {
            let body = response.as_ref().map(|r| r.body.as_str()).unwrap_or_default();
            Ok(Document::parse_snapshot(body, generation, url))
        })
    }

    fn field_value(&mut self, field: &Node) -> Result<FieldValue> {
        self.cache.ensure_current(field, self.live())?;
        if !field.kind().is_field() {
            return Ok(field.static_value());
        }
        let scope = self.scope_of(field)?;
        self.cache.form(&scope).value_of(field)
    }

    fn set_value(&mut self, field: &Node, value: &str) -> Result<()> {
        self.cache.ensure_current(field, self.live())?;
        let scope = self.scope_of(field)?;
        debug!(field = %field, "fill");
        self.cache.form(&scope).set_value(field, value)
    }

    fn set_checked(&mut self, field: &Node, checked: bool) -> Result<()> {
        self.cache.ensure_current(field, self.live())?;
        let scope = self.scope_of(field)?;
        self.cache.form(&scope).set_checked(field, checked)
    }

    fn select_option(&mut self, field: &Node, value: &str, additive: bool) -> Result<()> {
        self.cache.ensure_current(field, self.live())?;
        let scope = self.scope_of(field)?;
        self.cache.form(&scope).select_option(field, value, additive)
    }

    fn deselect_option(&mut self, field: &Node, value: Option<&str>) -> Result<()> {
        self.cache.ensure_current(field, self.live())?;
        let scope = self.scope_of(field)?;
        self.cache.form(&scope).deselect_option(field, value)
    }

    fn attach_files(&mut self, field: &Node, paths: &[PathBuf]) -> Result<()> {
        self.cache.ensure_current(field, self.live())?;
        let scope = self.scope_of(field)?;
        self.cache.form(&scope).set_files(field, paths)
    }

    fn click(&mut self, node: &Node) -> Result<()> {
        self.cache.ensure_current(node, self.live())?;

        if node.tag() == "a" {
            let href = node.attr("href").ok_or_else(|| {
                BrowserError::unsupported(BACKEND, format!("click on {} without href", node))
            })?;
            debug!(link = %node, href = %href, "following link");
            return self.visit(&href);
        }

        if node.kind() == NodeKind::Button {
            let button_type = node
                .attr("type")
                .map(|t| t.to_lowercase())
                .unwrap_or_else(|| "submit".to_string());
            return match button_type.as_str() {
                "submit" | "image" => {
                    let form = self.owning_form(node)?;
                    self.submit(&form, Some(node))
                }
                "reset" => {
                    let form = self.owning_form(node)?;
                    debug!(form = %form, "reset");
                    self.cache.form(&form).reset();
                    Ok(())
                }
                _ => Err(BrowserError::unsupported(
                    BACKEND,
                    format!("click on script button {}", node),
                )),
            };
        }

        Err(BrowserError::unsupported(BACKEND, format!("click on {}", node)))
    }

    fn submit(&mut self, form: &Node, submitter: Option<&Node>) -> Result<()> {
        self.cache.ensure_current(form, self.live())?;
        if form.kind() != NodeKind::Form {
            return Err(BrowserError::invalid_type("form", form.kind().as_str()));
        }

        let (values, files) = {
            let state = self.cache.form(form);
            (state.values(submitter), state.files())
        };

        let pick = |attr: &str| {
            submitter
                .and_then(|s| s.attr(&format!("form{}", attr)))
                .or_else(|| form.attr(attr))
                .filter(|v| !v.trim().is_empty())
        };
        let method: Method = pick("method")
            .and_then(|m| m.parse().ok())
            .unwrap_or(Method::Get);
        let mut action = match pick("action") {
            Some(action) => self.resolve_url(&action)?,
            None => self.url.clone().ok_or(BrowserError::NotStarted)?,
        };
        action.set_fragment(None);
        info!(method = %method, action = %action, fields = values.len(), "submitting form");

        if method == Method::Get {
            action.set_query(None);
            if !values.is_empty() {
                action.query_pairs_mut().extend_pairs(values);
            }
            return self.request(Method::Get, action.as_str(), HttpOptions::new());
        }

        let mut options = HttpOptions::new();
        let mut parameters: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in values {
            parameters.entry(name).or_default().push(value);
        }
        options.parameters = parameters
            .into_iter()
            .map(|(name, mut values)| {
                let value = if values.len() == 1 {
                    ParamValue::One(values.remove(0))
                } else {
                    ParamValue::Many(values)
                };
                (name, value)
            })
            .collect();
        for (name, path) in files {
            options.files.entry(name).or_default().push(path);
        }
        self.request(method, action.as_str(), options)
    }

    fn submitted_values(&mut self, form: &Node) -> Result<Vec<(String, String)>> {
        self.cache.ensure_current(form, self.live())?;
        Ok(self.cache.form(form).values(None))
    }
}

impl Driver for KernelDriver {
    type Client = Rc<RefCell<dyn Kernel>>;

    fn start(&mut self) -> Result<()> {
        if !self.started {
            debug!("kernel session started");
            self.started = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.reset()?;
        self.started = false;
        Ok(())
    }

    /// The generation counter keeps climbing so nodes from before the reset
    /// stay stale.
    fn reset(&mut self) -> Result<()> {
        self.response = None;
        self.url = None;
        self.exchange = None;
        self.last_request = None;
        self.cookies.clear();
        self.cache.clear();
        self.history.clear();
        self.cursor = 0;
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn visit(&mut self, url: &str) -> Result<()> {
        self.request(Method::Get, url, HttpOptions::new())
    }

    fn request(&mut self, method: Method, url: &str, options: HttpOptions) -> Result<()> {
        self.start()?;
        let target = self.resolve_url(url)?;
        let options = self.default_options.clone().merged(&options);
        self.navigate(
            HistoryEntry {
                method,
                url: target,
                options,
            },
            true,
        )
    }

    fn current_url(&mut self) -> Result<Url> {
        self.url.clone().ok_or(BrowserError::NotStarted)
    }

    fn content(&mut self) -> Result<String> {
        self.response
            .as_ref()
            .map(|r| r.body.clone())
            .ok_or(BrowserError::NotStarted)
    }

    fn back(&mut self) -> Result<()> {
        if self.history.is_empty() || self.cursor == 0 {
            return Err(BrowserError::NavigationFailed("no previous page in history".into()));
        }
        self.cursor -= 1;
        let entry = self.current_entry()?;
        self.navigate(entry, false)
    }

    fn forward(&mut self) -> Result<()> {
        if self.cursor + 1 >= self.history.len() {
            return Err(BrowserError::NavigationFailed("no next page in history".into()));
        }
        self.cursor += 1;
        let entry = self.current_entry()?;
        self.navigate(entry, false)
    }

    fn refresh(&mut self) -> Result<()> {
        let entry = self.current_entry()?;
        self.navigate(entry, false)
    }

    fn cookies(&mut self) -> Result<CookieJar> {
        Ok(self.cookies.clone())
    }

    fn client(&self) -> Self::Client {
        self.kernel.clone()
    }

    fn save_state(&mut self, artifacts: &ArtifactConfig, name: &str) -> Result<Vec<PathBuf>> {
        let body = match &self.response {
            Some(response) => response.body.clone(),
            None => return Ok(vec![]),
        };
        std::fs::create_dir_all(&artifacts.source_dir)?;
        let path = artifacts.source_dir.join(format!("{}.txt", name));
        std::fs::write(&path, body)?;
        info!(path = %path.display(), "saved page source");
        Ok(vec![path])
    }
}

impl HttpAware for KernelDriver {
    fn response(&self) -> Result<&Response> {
        self.response.as_ref().ok_or(BrowserError::NotStarted)
    }

    fn set_follow_redirects(&mut self, follow: bool) {
        self.follow_redirects = follow;
    }

    fn follows_redirects(&self) -> bool {
        self.follow_redirects
    }

    fn follow_redirect(&mut self) -> Result<()> {
        self.hop()
    }

    fn follow_redirects(&mut self) -> Result<()> {
        self.follow_until_settled(self.config.max_redirects)
    }
}

impl ProfileAware for KernelDriver {
    fn profile(&self) -> Option<&Exchange> {
        self.exchange.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::driver::share;

    fn app(request: &Request) -> Response {
        match request.path() {
            "/" => Response::html("<a href=\"/about\">About</a><p>home</p>"),
            "/about" => Response::html("<p>about</p>"),
            "/old" => Response::redirect(302, "/middle"),
            "/middle" => Response::redirect(301, "/about"),
            "/keep" => Response::redirect(307, "/echo"),
            "/echo" => Response::html(format!(
                "<p>{} {}</p>",
                request.method,
                request.parameter("q").unwrap_or("-")
            )),
            "/login" => Response::html("ok").with_header("Set-Cookie", "sid=abc; Path=/"),
            "/whoami" => Response::html(request.header("Cookie").unwrap_or("anonymous").to_string()),
            "/loop" => Response::redirect(302, "/loop"),
            _ => Response::not_found(),
        }
    }

    fn driver() -> Rc<RefCell<KernelDriver>> {
        share(KernelDriver::new(app, &SessionConfig::default()))
    }

    #[test]
    fn test_not_started_before_first_request() {
        let driver = driver();
        let mut driver = driver.borrow_mut();
        assert!(matches!(driver.document(), Err(BrowserError::NotStarted)));
        assert!(matches!(driver.current_url(), Err(BrowserError::NotStarted)));
        assert!(!driver.is_started());
    }

    #[test]
    fn test_visit_resolves_against_base_url() {
        let driver = driver();
        let mut driver = driver.borrow_mut();
        driver.visit("/about").unwrap();
        assert_eq!(driver.current_url().unwrap().as_str(), "http://localhost/about");
        assert_eq!(driver.status_code().unwrap(), 200);
        assert!(driver.content().unwrap().contains("about"));
        assert!(driver.is_started());
    }

    #[test]
    fn test_generation_moves_with_each_response() {
        let driver = driver();
        driver.borrow_mut().visit("/").unwrap();
        let link = driver.borrow_mut().crawler().unwrap().filter("a").first().unwrap();
        let first = driver.borrow_mut().generation().unwrap();

        link.click().unwrap();
        assert_eq!(driver.borrow_mut().current_url().unwrap().path(), "/about");
        assert!(driver.borrow_mut().generation().unwrap() > first);
        assert!(matches!(link.click(), Err(BrowserError::StaleNode { .. })));
    }

    #[test]
    fn test_redirects_are_followed_and_intercepted() {
        let driver = driver();
        let mut driver = driver.borrow_mut();
        driver.visit("/old").unwrap();
        assert_eq!(driver.current_url().unwrap().path(), "/about");

        driver.set_follow_redirects(false);
        driver.visit("/old").unwrap();
        assert_eq!(driver.status_code().unwrap(), 302);
        driver.follow_redirect().unwrap();
        assert_eq!(driver.current_url().unwrap().path(), "/middle");
        driver.follow_redirects().unwrap();
        assert_eq!(driver.status_code().unwrap(), 200);
        assert!(matches!(driver.follow_redirect(), Err(BrowserError::NavigationFailed(_))));
    }

    #[test]
    fn test_temporary_redirect_keeps_method() {
        let driver = driver();
        let mut driver = driver.borrow_mut();
        driver
            .request(Method::Post, "/keep", HttpOptions::new().with_parameter("q", "x"))
            .unwrap();
        assert!(driver.content().unwrap().contains("POST x"));
    }

    #[test]
    fn test_redirect_loop_is_bounded() {
        let driver = driver();
        let result = driver.borrow_mut().visit("/loop");
        assert!(matches!(result, Err(BrowserError::NavigationFailed(_))));
    }

    #[test]
    fn test_cookies_round_trip() {
        let driver = driver();
        let mut driver = driver.borrow_mut();
        driver.visit("/login").unwrap();
        assert_eq!(driver.cookies().unwrap().value("sid"), Some("abc"));
        driver.visit("/whoami").unwrap();
        assert_eq!(driver.content().unwrap(), "sid=abc");
    }

    #[test]
    fn test_history_navigation() {
        let driver = driver();
        let mut driver = driver.borrow_mut();
        driver.visit("/").unwrap();
        driver.visit("/about").unwrap();
        driver.back().unwrap();
        assert_eq!(driver.current_url().unwrap().path(), "/");
        driver.forward().unwrap();
        assert_eq!(driver.current_url().unwrap().path(), "/about");
        assert!(driver.forward().is_err());
        driver.refresh().unwrap();
        assert_eq!(driver.history_len(), 2);
    }

    #[test]
    fn test_default_options_and_profile() {
        let driver = share(
            KernelDriver::new(
                |request: &Request| Response::html(request.header("X-Token").unwrap_or("none").to_string()),
                &SessionConfig::default(),
            )
            .with_default_options(HttpOptions::new().with_header("x-token", "t1")),
        );
        let mut driver = driver.borrow_mut();
        driver.visit("/").unwrap();
        assert_eq!(driver.content().unwrap(), "t1");

        let exchange = driver.profile().unwrap();
        assert_eq!(exchange.request.method, Method::Get);
        assert_eq!(exchange.response.status, 200);
    }

    #[test]
    fn test_reset_clears_everything() {
        let driver = driver();
        let mut driver = driver.borrow_mut();
        driver.visit("/login").unwrap();
        driver.reset().unwrap();
        assert!(driver.cookies().unwrap().is_empty());
        assert!(matches!(driver.content(), Err(BrowserError::NotStarted)));
        assert!(matches!(driver.refresh(), Err(BrowserError::NotStarted)));
    }
}
