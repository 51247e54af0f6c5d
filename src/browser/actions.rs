use super::session::Browser;
use crate::core::driver::Driver;
use crate::dom::{Crawler, IntoSelector, Node, NodeKind, Selector, SelectorKind};
use crate::errors::{BrowserError, Result};
use crate::http::{CookieJar, HttpOptions, Method};
use std::path::Path;
use tracing::{debug, info};
use url::Url;

/// Reading the page and acting on it.
impl<D: Driver> Browser<D> {
    pub fn visit(&self, url: &str) -> Result<&Self> {
        self.driver_mut().visit(url)?;
        Ok(self)
    }

    /// Non-GET requests need a backend that speaks HTTP directly.
    pub fn request(&self, method: Method, url: &str, options: HttpOptions) -> Result<&Self> {
        self.driver_mut().request(method, url, options)?;
        Ok(self)
    }

    pub fn back(&self) -> Result<&Self> {
        self.driver_mut().back()?;
        Ok(self)
    }

    pub fn forward(&self) -> Result<&Self> {
        self.driver_mut().forward()?;
        Ok(self)
    }

    pub fn reload(&self) -> Result<&Self> {
        self.driver_mut().refresh()?;
        Ok(self)
    }

    pub fn current_url(&self) -> Result<Url> {
        self.driver_mut().current_url()
    }

    pub fn content(&self) -> Result<String> {
        self.driver_mut().content()
    }

    pub fn cookies(&self) -> Result<CookieJar> {
        self.driver_mut().cookies()
    }

    /// Crawler over the current snapshot, nodes bound to this session.
    pub fn crawler(&self) -> Result<Crawler> {
        self.driver_mut().crawler()
    }

    pub fn title(&self) -> Result<Option<String>> {
        Ok(self.driver_mut().document()?.title())
    }

    /// Visible text of the whole page.
    pub fn text(&self) -> Result<String> {
        Ok(self.crawler()?.visible_text())
    }

    /// Every match of `selector`, `auto` kind unless it says otherwise.
    pub fn find(&self, selector: impl IntoSelector) -> Result<Crawler> {
        self.find_as(selector, SelectorKind::Auto)
    }

    pub fn find_as(&self, selector: impl IntoSelector, default: SelectorKind) -> Result<Crawler> {
        let crawler = self.crawler()?;
        crawler.find_as(selector, default)
    }

    pub fn find_all(&self, selector: impl IntoSelector) -> Result<Vec<Node>> {
        Ok(self.find(selector)?.nodes())
    }

    /// First match, or `ElementNotFound`.
    pub fn get(&self, selector: impl IntoSelector) -> Result<Node> {
        self.first(selector.into_selector(SelectorKind::Auto))
    }

    pub fn field(&self, selector: impl IntoSelector) -> Result<Node> {
        self.first(selector.into_selector(SelectorKind::Field))
    }

    /// The miss message is the selector itself, which already names its kind.
    fn first(&self, selector: Selector) -> Result<Node> {
        let kind = selector.kind();
        self.find_as(&selector, kind)?
            .first()
            .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()))
    }

    pub fn click(&self, selector: impl IntoSelector) -> Result<&Self> {
        let node = self.first(selector.into_selector(SelectorKind::Clickable))?;
        debug!(node = %node, "click");
        node.click()?;
        Ok(self)
    }

    pub fn click_link(&self, text: &str) -> Result<&Self> {
        let node = self.first(Selector::link(text))?;
        node.click()?;
        Ok(self)
    }

    pub fn press_button(&self, text: &str) -> Result<&Self> {
        let node = self.first(Selector::button(text))?;
        node.click()?;
        Ok(self)
    }

    pub fn fill(&self, field: impl IntoSelector, value: &str) -> Result<&Self> {
        self.field(field)?.fill(value)?;
        Ok(self)
    }

    pub fn check(&self, field: impl IntoSelector) -> Result<&Self> {
        self.field(field)?.check()?;
        Ok(self)
    }

    pub fn uncheck(&self, field: impl IntoSelector) -> Result<&Self> {
        self.field(field)?.uncheck()?;
        Ok(self)
    }

    /// Checkbox, radio group or select, see `Node::select`.
    pub fn select(&self, field: impl IntoSelector, value: &str) -> Result<&Self> {
        self.field(field)?.select(value)?;
        Ok(self)
    }

    pub fn select_multiple(&self, field: impl IntoSelector, values: &[&str]) -> Result<&Self> {
        self.field(field)?.select_multiple(values)?;
        Ok(self)
    }

    pub fn unselect(&self, field: impl IntoSelector) -> Result<&Self> {
        self.field(field)?.unselect()?;
        Ok(self)
    }

    pub fn deselect(&self, field: impl IntoSelector, value: &str) -> Result<&Self> {
        self.field(field)?.deselect(value)?;
        Ok(self)
    }

    pub fn attach<P: AsRef<Path>>(&self, field: impl IntoSelector, paths: &[P]) -> Result<&Self> {
        self.field(field)?.attach(paths)?;
        Ok(self)
    }

    /// Submits the form `selector` points at, or the form owning it.
    pub fn submit(&self, selector: impl IntoSelector) -> Result<&Self> {
        self.get(selector)?.submit()?;
        Ok(self)
    }

    /// Fills `values` inside the button's form, then presses the button.
    pub fn submit_form(&self, button: impl IntoSelector, values: &[(&str, &str)]) -> Result<&Self> {
        let button = self.first(button.into_selector(SelectorKind::Clickable))?;
        let form = button
            .form()
            .ok_or_else(|| BrowserError::ElementNotFound(format!("form owning {}", button)))?;
        info!(form = %form, fields = values.len(), "filling form");

        for (name, value) in values {
            let field = form
                .crawler()
                .find_as(*name, SelectorKind::Field)?
                .first()
                .ok_or_else(|| BrowserError::ElementNotFound(format!("field '{}' in {}", name, form)))?;
            match field.kind() {
                NodeKind::Checkbox if value.is_empty() => field.uncheck()?,
                NodeKind::Checkbox | NodeKind::Radio | NodeKind::Combobox | NodeKind::Multiselect => {
                    field.select(value)?
                }
                _ => field.fill(value)?,
            }
        }
        button.click()?;
        Ok(self)
    }

    /// Page source, or the outer HTML of every match of `selector`.
    pub fn dump(&self, selector: Option<&str>) -> Result<String> {
        match selector {
            None => self.content(),
            Some(selector) => Ok(self.find(selector)?.html()),
        }
    }

    pub fn save_source(&self, path: impl AsRef<Path>) -> Result<&Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.content()?)?;
        info!(path = %path.display(), "saved page source");
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::KernelDriver;
    use crate::dom::FieldValue;
    use crate::http::{Request, Response};

    // posted parameters come back sorted by name
    const FORM: &str = r#"
        <form action="/submit" method="post">
          <label for="f1">Name</label><input id="f1" name="name">
          <input type="checkbox" name="opt[]" value="a">
          <input type="checkbox" name="opt[]" value="b">
          <input type="checkbox" name="opt[]" value="c">
          <select name="color"><option value="r">Red</option><option value="g">Green</option></select>
          <button id="save">Save</button>
        </form>
        <a href="/other">Other page</a>"#;

    fn app(request: &Request) -> Response {
        match request.path() {
            "/submit" => {
                let fields: Vec<String> = request
                    .parameters
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                Response::html(format!("<pre>{}</pre>", fields.join("&")))
            }
            "/other" => Response::html("<h1>Other</h1>"),
            _ => Response::html(FORM),
        }
    }

    fn browser() -> Browser<KernelDriver> {
        let browser = Browser::kernel(app);
        browser.visit("/").unwrap();
        browser
    }

    #[test]
    fn test_fill_and_read_back_by_label() {
        let browser = browser();
        browser.fill("Name", "Ada").unwrap();
        assert_eq!(browser.field("name").unwrap().value().unwrap(), FieldValue::Single("Ada".into()));
    }

    #[test]
    fn test_submit_by_button_text() {
        let browser = browser();
        browser
            .fill("Name", "Ada")
            .unwrap()
            .select("color", "Green")
            .unwrap()
            .click("Save")
            .unwrap();
        assert_eq!(browser.current_url().unwrap().path(), "/submit");
        assert_eq!(browser.text().unwrap(), "color=g&name=Ada");
    }

    #[test]
    fn test_second_of_same_named_checkboxes() {
        let browser = browser();
        let boxes = browser.find_all("input[type=checkbox]").unwrap();
        boxes[1].check().unwrap();
        browser.submit("form").unwrap();
        assert_eq!(browser.text().unwrap(), "color=r&name=&opt[]=b");
    }

    #[test]
    fn test_submit_form_helper() {
        let browser = browser();
        browser
            .submit_form("Save", &[("name", "Bob"), ("color", "Red")])
            .unwrap();
        assert_eq!(browser.text().unwrap(), "color=r&name=Bob");
    }

    #[test]
    fn test_links_and_history() {
        let browser = browser();
        browser.click_link("Other").unwrap();
        assert_eq!(browser.title().unwrap(), None);
        assert_eq!(browser.get("h1").unwrap().text(), "Other");
        browser.back().unwrap();
        assert_eq!(browser.current_url().unwrap().path(), "/");
    }

    #[test]
    fn test_missing_elements() {
        let browser = browser();
        assert!(matches!(browser.click("Nope"), Err(BrowserError::ElementNotFound(_))));
        assert!(browser.find("css~>.nothing").unwrap().is_empty());
    }

    #[test]
    fn test_missing_element_message_names_the_kind_once() {
        let browser = browser();
        match browser.field("nope") {
            Err(error) => assert_eq!(error.to_string(), "Element not found: field 'nope'"),
            Ok(node) => panic!("unexpected {}", node),
        }
        match browser.click_link("Nowhere") {
            Err(error) => assert_eq!(error.to_string(), "Element not found: link 'Nowhere'"),
            Ok(_) => panic!("clicked a missing link"),
        }
    }

    #[test]
    fn test_dump_and_save_source() {
        let browser = browser();
        assert!(browser.dump(None).unwrap().contains("<form"));
        assert_eq!(browser.dump(Some("#save")).unwrap(), "<button id=\"save\">Save</button>");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump/page.html");
        browser.save_source(&path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("Other page"));
    }

    #[test]
    fn test_node_operations_outlive_facade_borrows() {
        let browser = browser();
        let input = browser.field("name").unwrap();
        input.fill("x").unwrap();
        browser.fill("name", "y").unwrap();
        assert_eq!(input.value().unwrap(), FieldValue::Single("y".into()));
    }
}
