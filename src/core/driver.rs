use crate::core::config::ArtifactConfig;
use crate::dom::{Crawler, Document, FieldValue, Node, SessionHandle};
use crate::errors::Result;
use crate::http::{CookieJar, Exchange, HttpOptions, Method, Response};
use crate::types::ElementRect;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use url::Url;

/// DOM snapshot access and form interaction. Nodes hold a weak handle to
/// this capability and route their mutations through it.
///
/// Implementations must not call the session-aware `Node` readers
/// (`value()`, `is_checked()` ...) on nodes they are handed, only the
/// structural ones, since the session is already borrowed.
pub trait Interactive {
    fn backend(&self) -> &'static str;

    /// Stores the handle nodes created by this session will carry.
    fn bind(&mut self, handle: SessionHandle);

    fn handle(&self) -> Option<SessionHandle>;

    /// Generation of the live response, `None` before the first load.
    fn generation(&mut self) -> Result<Option<u64>>;

    /// Current snapshot, reparsed when the live response changed.
    fn document(&mut self) -> Result<Rc<Document>>;

    fn crawler(&mut self) -> Result<Crawler> {
        Ok(Crawler::new(self.document()?, self.handle()))
    }

    fn field_value(&mut self, field: &Node) -> Result<FieldValue>;

    fn set_value(&mut self, field: &Node, value: &str) -> Result<()>;

    fn set_checked(&mut self, field: &Node, checked: bool) -> Result<()>;

    fn select_option(&mut self, field: &Node, value: &str, additive: bool) -> Result<()>;

    /// `None` clears the whole selection.
    fn deselect_option(&mut self, field: &Node, value: Option<&str>) -> Result<()>;

    fn attach_files(&mut self, field: &Node, paths: &[PathBuf]) -> Result<()>;

    fn click(&mut self, node: &Node) -> Result<()>;

    fn submit(&mut self, form: &Node, submitter: Option<&Node>) -> Result<()>;

    /// Name/value pairs `form` would submit without a submitter.
    fn submitted_values(&mut self, form: &Node) -> Result<Vec<(String, String)>>;
}

/// Wraps a driver for shared use and hands it the weak handle its nodes
/// will carry.
pub fn share<D: Interactive + 'static>(driver: D) -> Rc<RefCell<D>> {
    let shared = Rc::new(RefCell::new(driver));
    let erased: Rc<RefCell<dyn Interactive>> = shared.clone();
    shared.borrow_mut().bind(Rc::downgrade(&erased));
    shared
}

/// Lifecycle and navigation shared by every backend.
pub trait Driver: Interactive + 'static {
    /// Raw transport handed to callbacks that ask for it.
    type Client: Clone + 'static;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Back to a blank session: no page, no cookies, no history.
    fn reset(&mut self) -> Result<()>;

    fn is_started(&self) -> bool;

    fn visit(&mut self, url: &str) -> Result<()>;

    fn request(&mut self, method: Method, url: &str, options: HttpOptions) -> Result<()>;

    fn current_url(&mut self) -> Result<Url>;

    fn content(&mut self) -> Result<String>;

    fn back(&mut self) -> Result<()>;

    fn forward(&mut self) -> Result<()>;

    fn refresh(&mut self) -> Result<()>;

    fn cookies(&mut self) -> Result<CookieJar>;

    fn client(&self) -> Self::Client;

    /// Writes whatever helps diagnose a failure (page source, screenshot)
    /// and returns the files written.
    fn save_state(&mut self, artifacts: &ArtifactConfig, name: &str) -> Result<Vec<PathBuf>>;
}

/// Backends that see raw HTTP responses.
pub trait HttpAware: Driver {
    fn response(&self) -> Result<&Response>;

    fn status_code(&self) -> Result<u16> {
        Ok(self.response()?.status)
    }

    /// When off, a 3xx response is kept as the current page.
    fn set_follow_redirects(&mut self, follow: bool);

    fn follows_redirects(&self) -> bool;

    /// Follows exactly one pending redirect.
    fn follow_redirect(&mut self) -> Result<()>;

    /// Follows redirects until a non-redirect response.
    fn follow_redirects(&mut self) -> Result<()>;
}

/// Backends that can report the last request/response exchange.
pub trait ProfileAware: Driver {
    fn profile(&self) -> Option<&Exchange>;
}

/// Backends that render pages.
pub trait Visual: Driver {
    fn screenshot(&mut self) -> Result<Vec<u8>>;

    fn save_screenshot(&mut self, path: &Path) -> Result<()> {
        let png = self.screenshot()?;
        crate::utils::screenshot::save_png(&png, path)
    }

    fn execute_script(&mut self, script: &str) -> Result<serde_json::Value>;

    fn is_visible(&mut self, node: &Node) -> Result<bool>;

    fn element_rect(&mut self, node: &Node) -> Result<Option<ElementRect>>;
}
