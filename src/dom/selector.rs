use crate::dom::crawler::Crawler;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Separates an embedded kind from the locator: `"link~>Sign in"`.
pub const SEPARATOR: &str = "~>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    Auto,
    Css,
    Id,
    Field,
    FieldForName,
    FieldForLabel,
    Clickable,
    Link,
    Button,
    Image,
    XPath,
    Callback,
}

impl SelectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorKind::Auto => "auto",
            SelectorKind::Css => "css",
            SelectorKind::Id => "id",
            SelectorKind::Field => "field",
            SelectorKind::FieldForName => "field-for-name",
            SelectorKind::FieldForLabel => "field-for-label",
            SelectorKind::Clickable => "clickable",
            SelectorKind::Link => "link",
            SelectorKind::Button => "button",
            SelectorKind::Image => "image",
            SelectorKind::XPath => "xpath",
            SelectorKind::Callback => "callback",
        }
    }

    /// Kinds that may appear as a string prefix. `callback` never does.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        let kind = match prefix.trim().to_ascii_lowercase().as_str() {
            "auto" => SelectorKind::Auto,
            "css" => SelectorKind::Css,
            "id" => SelectorKind::Id,
            "field" => SelectorKind::Field,
            "field-for-name" => SelectorKind::FieldForName,
            "field-for-label" => SelectorKind::FieldForLabel,
            "clickable" => SelectorKind::Clickable,
            "link" => SelectorKind::Link,
            "button" => SelectorKind::Button,
            "image" => SelectorKind::Image,
            "xpath" => SelectorKind::XPath,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-supplied resolution function. The returned box is downcast to a
/// `Node`, `Vec<Node>`, `Crawler`, `Option<Node>` or `()`.
#[derive(Clone)]
pub struct Resolver {
    pub(crate) f: Rc<dyn Fn(&Crawler) -> Box<dyn Any>>,
    pub(crate) returns: &'static str,
}

#[derive(Clone)]
pub enum SelectorValue {
    Locator(String),
    Callback(Resolver),
}

#[derive(Clone)]
pub struct Selector {
    kind: SelectorKind,
    value: SelectorValue,
}

impl Selector {
    pub fn new(kind: SelectorKind, locator: impl Into<String>) -> Self {
        // a string can never become a callback
        let kind = if kind == SelectorKind::Callback {
            SelectorKind::Auto
        } else {
            kind
        };
        Self {
            kind,
            value: SelectorValue::Locator(locator.into()),
        }
    }

    pub fn callback<F, R>(f: F) -> Self
    where
        F: Fn(&Crawler) -> R + 'static,
        R: Any,
    {
        Self {
            kind: SelectorKind::Callback,
            value: SelectorValue::Callback(Resolver {
                f: Rc::new(move |crawler| Box::new(f(crawler)) as Box<dyn Any>),
                returns: std::any::type_name::<R>(),
            }),
        }
    }

    /// Splits `"<kind>~><locator>"`. Without a separator, or with a kind that
    /// is not recognized, the whole input is a locator of `default` kind.
    pub fn parse(input: &str, default: SelectorKind) -> Self {
        if let Some((prefix, locator)) = input.split_once(SEPARATOR) {
            if let Some(kind) = SelectorKind::from_prefix(prefix) {
                return Self::new(kind, locator);
            }
        }
        Self::new(default, input)
    }

    pub fn css(locator: impl Into<String>) -> Self {
        Self::new(SelectorKind::Css, locator)
    }

    pub fn id(locator: impl Into<String>) -> Self {
        Self::new(SelectorKind::Id, locator)
    }

    pub fn xpath(locator: impl Into<String>) -> Self {
        Self::new(SelectorKind::XPath, locator)
    }

    pub fn field(locator: impl Into<String>) -> Self {
        Self::new(SelectorKind::Field, locator)
    }

    pub fn link(locator: impl Into<String>) -> Self {
        Self::new(SelectorKind::Link, locator)
    }

    pub fn button(locator: impl Into<String>) -> Self {
        Self::new(SelectorKind::Button, locator)
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub fn value(&self) -> &SelectorValue {
        &self.value
    }

    pub fn locator(&self) -> Option<&str> {
        match &self.value {
            SelectorValue::Locator(locator) => Some(locator),
            SelectorValue::Callback(_) => None,
        }
    }

    /// Back to the string form, for error messages and round-tripping.
    pub fn encode(&self) -> String {
        match &self.value {
            SelectorValue::Locator(locator) => format!("{}{}{}", self.kind, SEPARATOR, locator),
            SelectorValue::Callback(resolver) => format!("callback({})", resolver.returns),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            SelectorValue::Locator(locator) => write!(f, "{} '{}'", self.kind, locator),
            SelectorValue::Callback(resolver) => write!(f, "callback returning {}", resolver.returns),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.encode()).finish()
    }
}

/// Anything accepted where a locator is expected. `default` is the kind used
/// when the value does not carry one.
pub trait IntoSelector {
    fn into_selector(self, default: SelectorKind) -> Selector;
}

impl IntoSelector for Selector {
    fn into_selector(self, _default: SelectorKind) -> Selector {
        self
    }
}

impl IntoSelector for &Selector {
    fn into_selector(self, _default: SelectorKind) -> Selector {
        self.clone()
    }
}

impl IntoSelector for &str {
    fn into_selector(self, default: SelectorKind) -> Selector {
        Selector::parse(self, default)
    }
}

impl IntoSelector for String {
    fn into_selector(self, default: SelectorKind) -> Selector {
        Selector::parse(&self, default)
    }
}

impl IntoSelector for &String {
    fn into_selector(self, default: SelectorKind) -> Selector {
        Selector::parse(self, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedded_kind() {
        let selector = Selector::parse("link~>Sign in", SelectorKind::Auto);
        assert_eq!(selector.kind(), SelectorKind::Link);
        assert_eq!(selector.locator(), Some("Sign in"));

        let selector = Selector::parse("xpath~>//a[@href]", SelectorKind::Clickable);
        assert_eq!(selector.kind(), SelectorKind::XPath);
        assert_eq!(selector.locator(), Some("//a[@href]"));
    }

    #[test]
    fn test_unknown_kind_falls_back_to_default() {
        let selector = Selector::parse("banana~>x", SelectorKind::Field);
        assert_eq!(selector.kind(), SelectorKind::Field);
        assert_eq!(selector.locator(), Some("banana~>x"));

        let selector = Selector::parse("callback~>x", SelectorKind::Auto);
        assert_eq!(selector.kind(), SelectorKind::Auto);

        let selector = "Email".into_selector(SelectorKind::Clickable);
        assert_eq!(selector.kind(), SelectorKind::Clickable);
    }

    #[test]
    fn test_encoding() {
        assert_eq!(Selector::css("a.b").encode(), "css~>a.b");
        let cb = Selector::callback(|_: &Crawler| 42u8);
        assert_eq!(cb.kind(), SelectorKind::Callback);
        assert!(cb.locator().is_none());
        assert_eq!(cb.encode(), "callback(u8)");
    }
}
