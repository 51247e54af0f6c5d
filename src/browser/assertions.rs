use super::session::Browser;
use crate::assertion::{
    not, Contains, CountEquals, Equals, Expectation, Failure, Matches, UrlComponent, UrlEquals,
};
use crate::core::driver::{Driver, HttpAware, Visual};
use crate::dom::{FieldValue, IntoSelector, Node, Selector, SelectorKind};
use crate::errors::{BrowserError, Result};
use regex::Regex;
use serde_json::Value;

fn flatten(value: &FieldValue) -> String {
    match value {
        FieldValue::None => String::new(),
        FieldValue::Single(value) => value.clone(),
        FieldValue::Multiple(values) => values.join(","),
    }
}

/// Assertions every backend supports. Each reads what it needs from the
/// page, then hands the check to the browser's failure handler.
impl<D: Driver> Browser<D> {
    /// First match of `selector`. A miss is reported through the failure
    /// handler and comes back as `None` when the handler lets it pass.
    fn subject(&self, selector: Selector) -> Result<Option<Node>> {
        match self.find_as(&selector, selector.kind())?.first() {
            Some(node) => Ok(Some(node)),
            None => {
                self.assert_that(&Failure::new(format!("{} not found", selector)))?;
                Ok(None)
            }
        }
    }

    fn field_subject(&self, field: &str) -> Result<Option<Node>> {
        self.subject(Selector::parse(field, SelectorKind::Field))
    }

    pub fn assert_see(&self, text: &str) -> Result<&Self> {
        self.assert_that(&Contains::new("page", self.text()?, text))
    }

    pub fn assert_dont_see(&self, text: &str) -> Result<&Self> {
        self.assert_that(&not(Contains::new("page", self.text()?, text)))
    }

    /// Visible text of every element matching `selector`.
    pub fn assert_see_in(&self, selector: &str, text: &str) -> Result<&Self> {
        let found = self.find(selector)?;
        self.assert_that(&Contains::new(format!("\"{}\"", selector), found.visible_text(), text))
    }

    pub fn assert_dont_see_in(&self, selector: &str, text: &str) -> Result<&Self> {
        let found = self.find(selector)?;
        self.assert_that(&not(Contains::new(format!("\"{}\"", selector), found.visible_text(), text)))
    }

    /// Raw page source, markup included.
    pub fn assert_contains(&self, html: &str) -> Result<&Self> {
        self.assert_that(&Contains::new("page source", self.content()?, html))
    }

    pub fn assert_not_contains(&self, html: &str) -> Result<&Self> {
        self.assert_that(&not(Contains::new("page source", self.content()?, html)))
    }

    pub fn assert_see_matches(&self, pattern: &str) -> Result<&Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| BrowserError::Configuration(format!("invalid pattern: {}", e)))?;
        self.assert_that(&Matches::new("page", self.text()?, regex))
    }

    pub fn assert_see_element(&self, selector: impl IntoSelector) -> Result<&Self> {
        let selector = selector.into_selector(SelectorKind::Auto);
        let count = self.find(&selector)?.count();
        self.assert_that(&Expectation::that(
            count > 0,
            format!("an element matching \"{}\"", selector),
        ))
    }

    pub fn assert_dont_see_element(&self, selector: impl IntoSelector) -> Result<&Self> {
        let selector = selector.into_selector(SelectorKind::Auto);
        let count = self.find(&selector)?.count();
        self.assert_that(&not(Expectation::that(
            count > 0,
            format!("an element matching \"{}\"", selector),
        )))
    }

    pub fn assert_element_count(&self, selector: &str, expected: usize) -> Result<&Self> {
        let count = self.find(selector)?.count();
        self.assert_that(&CountEquals::new(selector, count, expected))
    }

    pub fn assert_attribute_contains(&self, selector: &str, attribute: &str, value: &str) -> Result<&Self> {
        let node = match self.subject(Selector::parse(selector, SelectorKind::Auto))? {
            Some(node) => node,
            None => return Ok(self),
        };
        let actual = node.attr(attribute).unwrap_or_default();
        self.assert_that(&Contains::new(
            format!("attribute '{}' of \"{}\"", attribute, selector),
            actual,
            value,
        ))
    }

    pub fn assert_attribute_not_contains(
        &self,
        selector: &str,
        attribute: &str,
        value: &str,
    ) -> Result<&Self> {
        let node = match self.subject(Selector::parse(selector, SelectorKind::Auto))? {
            Some(node) => node,
            None => return Ok(self),
        };
        let actual = node.attr(attribute).unwrap_or_default();
        self.assert_that(&not(Contains::new(
            format!("attribute '{}' of \"{}\"", attribute, selector),
            actual,
            value,
        )))
    }

    /// Multiselect values compare as a comma-joined list.
    pub fn assert_field_equals(&self, field: &str, expected: &str) -> Result<&Self> {
        let node = match self.field_subject(field)? {
            Some(node) => node,
            None => return Ok(self),
        };
        let actual = flatten(&node.value()?);
        self.assert_that(&Equals::new(format!("field '{}'", field), actual.as_str(), expected))
    }

    pub fn assert_field_not_equals(&self, field: &str, expected: &str) -> Result<&Self> {
        let node = match self.field_subject(field)? {
            Some(node) => node,
            None => return Ok(self),
        };
        let actual = flatten(&node.value()?);
        self.assert_that(&not(Equals::new(format!("field '{}'", field), actual.as_str(), expected)))
    }

    fn is_selected(node: &Node, value: &str) -> Result<bool> {
        let selected = node.selected_values()?;
        if selected.iter().any(|v| v == value) {
            return Ok(true);
        }
        if node.kind().is_select() {
            let by_text = node
                .options()
                .into_iter()
                .filter(|option| selected.contains(&option.option_value()))
                .any(|option| option.text() == value);
            return Ok(by_text);
        }
        Ok(false)
    }

    /// Select option (value or text), checked radio value, or checkbox value.
    pub fn assert_selected(&self, field: &str, value: &str) -> Result<&Self> {
        let node = match self.field_subject(field)? {
            Some(node) => node,
            None => return Ok(self),
        };
        let selected = Self::is_selected(&node, value)?;
        self.assert_that(&Expectation::that(
            selected,
            format!("'{}' to be selected in field '{}'", value, field),
        ))
    }

    pub fn assert_not_selected(&self, field: &str, value: &str) -> Result<&Self> {
        let node = match self.field_subject(field)? {
            Some(node) => node,
            None => return Ok(self),
        };
        let selected = Self::is_selected(&node, value)?;
        self.assert_that(&not(Expectation::that(
            selected,
            format!("'{}' to be selected in field '{}'", value, field),
        )))
    }

    pub fn assert_checked(&self, field: &str) -> Result<&Self> {
        let checked = match self.field_subject(field)? {
            Some(node) => node.is_checked()?,
            None => return Ok(self),
        };
        self.assert_that(&Expectation::that(checked, format!("field '{}' to be checked", field)))
    }

    pub fn assert_not_checked(&self, field: &str) -> Result<&Self> {
        let checked = match self.field_subject(field)? {
            Some(node) => node.is_checked()?,
            None => return Ok(self),
        };
        self.assert_that(&not(Expectation::that(checked, format!("field '{}' to be checked", field))))
    }

    pub fn assert_title(&self, expected: &str) -> Result<&Self> {
        let title = self.title()?.unwrap_or_default();
        self.assert_that(&Equals::new("title", title.as_str(), expected))
    }

    pub fn assert_title_contains(&self, text: &str) -> Result<&Self> {
        self.assert_that(&Contains::new("title", self.title()?.unwrap_or_default(), text))
    }

    /// Compares path, query and fragment, so any host matches.
    pub fn assert_url(&self, expected: &str) -> Result<&Self> {
        let actual = self.current_url()?;
        self.assert_that(&UrlEquals::new(actual.as_str(), expected))
    }

    pub fn assert_url_components(&self, expected: &str, components: &[UrlComponent]) -> Result<&Self> {
        let actual = self.current_url()?;
        self.assert_that(&UrlEquals::new(actual.as_str(), expected).with_components(components))
    }

    pub fn assert_not_url(&self, expected: &str) -> Result<&Self> {
        let actual = self.current_url()?;
        self.assert_that(&not(UrlEquals::new(actual.as_str(), expected)))
    }
}

/// Assertions on the raw HTTP response.
impl<D: HttpAware> Browser<D> {
    pub fn status_code(&self) -> Result<u16> {
        self.driver().status_code()
    }

    pub fn response_header(&self, name: &str) -> Result<Option<String>> {
        Ok(self.driver().response()?.headers.get(name).map(str::to_string))
    }

    pub fn assert_status(&self, expected: u16) -> Result<&Self> {
        let status = self.status_code()?;
        self.assert_that(&Equals::new("status code", status, expected))
    }

    pub fn assert_successful(&self) -> Result<&Self> {
        let status = self.status_code()?;
        self.assert_that(&Expectation::that(
            (200..300).contains(&status),
            format!("a successful response, got {}", status),
        ))
    }

    pub fn assert_redirected(&self) -> Result<&Self> {
        let status = self.status_code()?;
        self.assert_that(&Expectation::that(
            (300..400).contains(&status),
            format!("a redirect response, got {}", status),
        ))
    }

    /// The pending redirect points at `expected`; redirects must be
    /// intercepted for this to see one.
    pub fn assert_redirected_to(&self, expected: &str) -> Result<&Self> {
        self.assert_redirected()?;
        let location = self.response_header("Location")?.unwrap_or_default();
        self.assert_that(&UrlEquals::new(location, expected))
    }

    pub fn assert_header(&self, name: &str, expected: &str) -> Result<&Self> {
        let actual = self.response_header(name)?;
        self.assert_that(&Equals::new(
            format!("header '{}'", name),
            actual.as_deref(),
            Some(expected),
        ))
    }

    pub fn assert_header_contains(&self, name: &str, text: &str) -> Result<&Self> {
        let actual = self.response_header(name)?.unwrap_or_default();
        self.assert_that(&Contains::new(format!("header '{}'", name), actual, text))
    }

    pub fn assert_header_missing(&self, name: &str) -> Result<&Self> {
        let present = self.response_header(name)?.is_some();
        self.assert_that(&not(Expectation::that(present, format!("header '{}'", name))))
    }

    pub fn response_json(&self) -> Result<Value> {
        self.driver().response()?.body_json()
    }

    pub fn assert_json(&self, expected: &Value) -> Result<&Self> {
        let actual = self.response_json()?;
        self.assert_that(&Equals::new("JSON body", &actual, expected))
    }

    /// `pointer` is an RFC 6901 JSON pointer such as `/user/name`.
    pub fn assert_json_pointer(&self, pointer: &str, expected: &Value) -> Result<&Self> {
        let body = self.response_json()?;
        let actual = body.pointer(pointer);
        self.assert_that(&Equals::new(format!("JSON at {}", pointer), actual, Some(expected)))
    }
}

/// Assertions that need a rendering backend.
impl<D: Visual> Browser<D> {
    pub fn assert_visible(&self, selector: impl IntoSelector) -> Result<&Self> {
        let selector = selector.into_selector(SelectorKind::Auto);
        let node = match self.subject(selector)? {
            Some(node) => node,
            None => return Ok(self),
        };
        let visible = self.driver_mut().is_visible(&node)?;
        self.assert_that(&Expectation::that(visible, format!("{} to be visible", node)))
    }

    /// A missing element counts as not visible.
    pub fn assert_not_visible(&self, selector: impl IntoSelector) -> Result<&Self> {
        let selector = selector.into_selector(SelectorKind::Auto);
        let visible = match self.find(&selector)?.first() {
            Some(node) => self.driver_mut().is_visible(&node)?,
            None => false,
        };
        self.assert_that(&not(Expectation::that(
            visible,
            format!("\"{}\" to be visible", selector),
        )))
    }
}
