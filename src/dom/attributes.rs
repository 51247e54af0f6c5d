use scraper::node::Element;

/// Read-only view over the attributes of a parsed element.
#[derive(Clone, Copy)]
pub struct Attributes<'a> {
    element: &'a Element,
}

impl<'a> Attributes<'a> {
    pub(crate) fn new(element: &'a Element) -> Self {
        Self { element }
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.element.attr(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.element.attr(name).is_some()
    }

    /// Attribute value compared case-insensitively, as HTML enumerated
    /// attributes (`type`, `method`) are.
    pub fn is(&self, name: &str, expected: &str) -> bool {
        self.get(name)
            .map(|value| value.trim().eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }

    pub fn id(&self) -> Option<&'a str> {
        self.get("id")
    }

    pub fn classes(&self) -> Vec<&'a str> {
        self.get("class")
            .map(|class| class.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }

    pub fn all(&self) -> Vec<(&'a str, &'a str)> {
        let mut attrs: Vec<_> = self.element.attrs().collect();
        attrs.sort_by(|a, b| a.0.cmp(b.0));
        attrs
    }

    pub fn len(&self) -> usize {
        self.element.attrs().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Attributes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.all()).finish()
    }
}
