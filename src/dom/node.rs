use crate::core::Interactive;
use crate::dom::attributes::Attributes;
use crate::dom::crawler::Crawler;
use crate::dom::document::{normalize_whitespace, visible_text, Document};
use crate::dom::kind::{classify, NodeKind};
use crate::dom::selector::IntoSelector;
use crate::errors::{BrowserError, Result};
use ego_tree::NodeId;
use scraper::ElementRef;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

pub type SessionHandle = Weak<RefCell<dyn Interactive>>;

/// One element of a parsed document. Nodes found through an interactive
/// session keep a weak handle on it; statically parsed nodes do not.
#[derive(Clone)]
pub struct Node {
    document: Rc<Document>,
    id: NodeId,
    kind: NodeKind,
    session: Option<SessionHandle>,
}

impl Node {
    pub(crate) fn new(
        document: Rc<Document>,
        id: NodeId,
        session: Option<SessionHandle>,
    ) -> Option<Self> {
        let kind = {
            let element = document.element(id)?;
            let value = element.value();
            classify(value.name(), |name| value.attr(name))
        };

        Some(Self {
            document,
            id,
            kind,
            session,
        })
    }

    /// Re-wraps a related node of the same document through the same
    /// classification.
    pub(crate) fn wrap(&self, id: NodeId) -> Option<Node> {
        Node::new(self.document.clone(), id, self.session.clone())
    }

    pub(crate) fn element(&self) -> ElementRef<'_> {
        // construction guarantees the id points at an element
        self.document
            .element(self.id)
            .unwrap_or_else(|| self.document.html().root_element())
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn tag(&self) -> &str {
        self.element().value().name()
    }

    pub fn attributes(&self) -> Attributes<'_> {
        Attributes::new(self.element().value())
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.attributes().get(name).map(str::to_string)
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.document
    }

    pub fn node_id(&self) -> NodeId {
        self.id
    }

    pub fn generation(&self) -> Option<u64> {
        self.document.generation()
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub(crate) fn interactive(&self) -> Result<Rc<RefCell<dyn Interactive>>> {
        self.session
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(BrowserError::Detached)
    }

    pub fn is_same(&self, other: &Node) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.document, &other.document)
    }

    /// Normalized visible text.
    pub fn text(&self) -> String {
        visible_text(self.element())
    }

    /// Text content exactly as parsed.
    pub fn raw_text(&self) -> String {
        self.element().text().collect()
    }

    pub fn inner_html(&self) -> String {
        self.element().inner_html()
    }

    pub fn outer_html(&self) -> String {
        self.element().html()
    }

    pub fn parent(&self) -> Option<Node> {
        self.element()
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|parent| self.wrap(parent.id()))
    }

    pub fn ancestors(&self) -> Vec<Node> {
        self.element()
            .ancestors()
            .filter_map(ElementRef::wrap)
            .filter_map(|el| self.wrap(el.id()))
            .collect()
    }

    pub fn children(&self) -> Vec<Node> {
        self.element()
            .children()
            .filter_map(ElementRef::wrap)
            .filter_map(|el| self.wrap(el.id()))
            .collect()
    }

    pub fn siblings(&self) -> Vec<Node> {
        match self.element().parent() {
            Some(parent) => parent
                .children()
                .filter(|child| child.id() != self.id)
                .filter_map(ElementRef::wrap)
                .filter_map(|el| self.wrap(el.id()))
                .collect(),
            None => vec![],
        }
    }

    pub fn closest(&self, tag: &str) -> Option<Node> {
        self.ancestors()
            .into_iter()
            .find(|node| node.tag().eq_ignore_ascii_case(tag))
    }

    pub fn crawler(&self) -> Crawler {
        Crawler::from_nodes(self.document.clone(), vec![self.id], self.session.clone())
    }

    /// Descendants matching a CSS selector.
    pub fn filter(&self, css: &str) -> Crawler {
        self.crawler().filter(css)
    }

    /// Resolves a locator below this node.
    pub fn find(&self, selector: impl IntoSelector) -> Result<Crawler> {
        self.crawler().find(selector)
    }

    pub fn position_in_document(&self) -> usize {
        self.document.position(self.id)
    }

    /// Positional path like `/html/body/form[2]/input[3]`, indexes counted
    /// among same-tag siblings.
    pub fn path(&self) -> String {
        let mut segments = Vec::new();
        let mut current = Some(self.element());

        while let Some(el) = current {
            let name = el.value().name().to_string();
            let same_tag: Vec<_> = match el.parent() {
                Some(parent) => parent
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|sibling| sibling.value().name() == name)
                    .map(|sibling| sibling.id())
                    .collect(),
                None => vec![el.id()],
            };

            if same_tag.len() > 1 {
                let index = same_tag.iter().position(|id| *id == el.id()).unwrap_or(0) + 1;
                segments.push(format!("{}[{}]", name, index));
            } else {
                segments.push(name);
            }

            current = el.parent().and_then(ElementRef::wrap);
        }

        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// Unique CSS path using `:nth-child`, usable against a live DOM.
    pub fn css_path(&self) -> String {
        let mut segments = Vec::new();
        let mut current = Some(self.element());

        while let Some(el) = current {
            let name = el.value().name().to_string();
            let parent = el.parent().and_then(ElementRef::wrap);

            match parent {
                Some(parent) => {
                    let index = parent
                        .children()
                        .filter_map(ElementRef::wrap)
                        .position(|sibling| sibling.id() == el.id())
                        .unwrap_or(0)
                        + 1;
                    segments.push(format!("{}:nth-child({})", name, index));
                }
                None => segments.push(name),
            }

            current = parent;
        }

        segments.reverse();
        segments.join(" > ")
    }

    pub(crate) fn normalized_attr(&self, name: &str) -> Option<String> {
        self.attributes().get(name).map(normalize_whitespace)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("tag", &self.tag())
            .field("path", &self.path())
            .field("generation", &self.generation())
            .field("interactive", &self.session.is_some())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> at {}", self.tag(), self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Crawler {
        Crawler::new(
            Rc::new(Document::parse(
                r#"<html><body>
                    <div id="wrap">
                        <form id="f1"><input name="a"><input name="b"><button>Go</button></form>
                        <form id="f2"><select name="s"><option>One</option></select></form>
                    </div>
                </body></html>"#,
            )),
            None,
        )
    }

    #[test]
    fn test_relationships_rewrap_through_classification() {
        let input = page().filter("input[name=b]").first().unwrap();
        assert_eq!(input.kind(), NodeKind::Input);

        let parent = input.parent().unwrap();
        assert_eq!(parent.kind(), NodeKind::Form);

        let siblings = input.siblings();
        assert_eq!(siblings.len(), 2);
        assert_eq!(siblings[1].kind(), NodeKind::Button);

        let ancestors: Vec<_> = input.ancestors().iter().map(|n| n.tag().to_string()).collect();
        assert_eq!(ancestors, vec!["form", "div", "body", "html"]);

        let form = page().filter("#f2").first().unwrap();
        assert_eq!(form.children()[0].kind(), NodeKind::Combobox);
        assert_eq!(input.closest("div").unwrap().attr("id").as_deref(), Some("wrap"));
    }

    #[test]
    fn test_paths() {
        let input = page().filter("input[name=b]").first().unwrap();
        assert_eq!(input.path(), "/html/body/div/form[1]/input[2]");
        assert_eq!(
            input.css_path(),
            "html > body:nth-child(2) > div:nth-child(1) > form:nth-child(1) > input:nth-child(2)"
        );
    }

    #[test]
    fn test_static_nodes_are_detached() {
        let input = page().filter("input").first().unwrap();
        assert!(input.session().is_none());
        assert!(matches!(input.interactive(), Err(BrowserError::Detached)));
        assert_eq!(input.generation(), None);
    }
}
