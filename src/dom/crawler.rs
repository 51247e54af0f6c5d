use crate::dom::document::{normalize_whitespace, visible_text, Document};
use crate::dom::node::{Node, SessionHandle};
use crate::dom::selector::{IntoSelector, SelectorKind};
use crate::dom::{strategy, xpath};
use crate::errors::Result;
use ego_tree::NodeId;
use std::fmt;
use std::rc::Rc;

/// An ordered, duplicate-free set of elements from one document.
#[derive(Clone)]
pub struct Crawler {
    document: Rc<Document>,
    nodes: Vec<NodeId>,
    session: Option<SessionHandle>,
}

impl Crawler {
    /// The whole document, rooted at its `<html>` element.
    pub fn new(document: Rc<Document>, session: Option<SessionHandle>) -> Self {
        let root = document.root_element();
        Self {
            document,
            nodes: vec![root],
            session,
        }
    }

    pub fn from_nodes(
        document: Rc<Document>,
        mut nodes: Vec<NodeId>,
        session: Option<SessionHandle>,
    ) -> Self {
        document.sort(&mut nodes);
        nodes.retain(|id| document.element(*id).is_some());
        Self {
            document,
            nodes,
            session,
        }
    }

    /// Parses a standalone document with no session behind it.
    pub fn parse(source: &str) -> Self {
        Self::new(Rc::new(Document::parse(source)), None)
    }

    pub(crate) fn with_nodes(&self, nodes: Vec<NodeId>) -> Self {
        Self::from_nodes(self.document.clone(), nodes, self.session.clone())
    }

    pub fn empty(&self) -> Self {
        self.with_nodes(vec![])
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.document
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub(crate) fn ids(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .filter_map(|id| Node::new(self.document.clone(), *id, self.session.clone()))
            .collect()
    }

    pub fn first(&self) -> Option<Node> {
        self.eq(0)
    }

    pub fn last(&self) -> Option<Node> {
        self.nodes.len().checked_sub(1).and_then(|index| self.eq(index))
    }

    pub fn eq(&self, index: usize) -> Option<Node> {
        let id = *self.nodes.get(index)?;
        Node::new(self.document.clone(), id, self.session.clone())
    }

    /// Elements at or below the current set matching a CSS selector. An
    /// invalid selector matches nothing.
    pub fn filter(&self, css: &str) -> Crawler {
        match self.document.select_css(&self.nodes, css) {
            Some(ids) => self.with_nodes(ids),
            None => self.empty(),
        }
    }

    /// Evaluates an XPath expression with each current element as context.
    pub fn filter_xpath(&self, expression: &str) -> Crawler {
        match xpath::evaluate(&self.document, &self.nodes, expression) {
            Ok(ids) => self.with_nodes(ids),
            Err(_) => self.empty(),
        }
    }

    /// Resolves a locator against this fragment. A miss is an empty crawler;
    /// only a callback returning an unusable type is an error.
    pub fn find(&self, selector: impl IntoSelector) -> Result<Crawler> {
        strategy::resolve(&selector.into_selector(SelectorKind::Auto), self)
    }

    pub fn find_as(&self, selector: impl IntoSelector, default: SelectorKind) -> Result<Crawler> {
        strategy::resolve(&selector.into_selector(default), self)
    }

    /// Keeps the nodes the predicate accepts.
    pub fn reduce(&self, predicate: impl Fn(&Node) -> bool) -> Crawler {
        let kept = self
            .nodes()
            .into_iter()
            .filter(|node| predicate(node))
            .map(|node| node.node_id())
            .collect();
        self.with_nodes(kept)
    }

    /// Text of the first node, normalized.
    pub fn text(&self) -> String {
        self.first().map(|node| node.text()).unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.nodes().iter().map(Node::text).collect()
    }

    /// All visible text across the set, joined and normalized.
    pub fn visible_text(&self) -> String {
        let parts: Vec<String> = self
            .nodes
            .iter()
            .filter_map(|id| self.document.element(*id))
            .map(visible_text)
            .collect();
        normalize_whitespace(&parts.join(" "))
    }

    /// Outer HTML of every node, concatenated.
    pub fn html(&self) -> String {
        self.nodes().iter().map(Node::outer_html).collect()
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.first().and_then(|node| node.attr(name))
    }
}

impl fmt::Debug for Crawler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crawler")
            .field("count", &self.nodes.len())
            .field("generation", &self.document.generation())
            .field("interactive", &self.session.is_some())
            .finish()
    }
}

impl IntoIterator for &Crawler {
    type Item = Node;
    type IntoIter = std::vec::IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes().into_iter()
    }
}
