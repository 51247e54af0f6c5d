use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, Node as RawNode, Selector as CssSelector};
use std::collections::HashMap;
use std::fmt;

/// A parsed page. Interactive sessions stamp every snapshot with the
/// generation of the response it was parsed from; static parses carry none.
pub struct Document {
    html: Html,
    order: HashMap<NodeId, usize>,
    generation: Option<u64>,
    url: Option<String>,
}

impl Document {
    pub fn parse(source: &str) -> Self {
        Self::build(Html::parse_document(source), None, None)
    }

    pub fn parse_snapshot(source: &str, generation: u64, url: Option<String>) -> Self {
        Self::build(Html::parse_document(source), Some(generation), url)
    }

    fn build(html: Html, generation: Option<u64>, url: Option<String>) -> Self {
        let order = html
            .tree
            .root()
            .descendants()
            .enumerate()
            .map(|(index, node)| (node.id(), index))
            .collect();

        Self {
            html,
            order,
            generation,
            url,
        }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn source(&self) -> String {
        self.html.html()
    }

    pub fn title(&self) -> Option<String> {
        let selector = CssSelector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|title| normalize_whitespace(&title.text().collect::<String>()))
    }

    pub(crate) fn tree_root(&self) -> NodeId {
        self.html.tree.root().id()
    }

    pub(crate) fn root_element(&self) -> NodeId {
        self.html.root_element().id()
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<NodeRef<'_, RawNode>> {
        self.html.tree.get(id)
    }

    pub(crate) fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.node(id).and_then(ElementRef::wrap)
    }

    pub(crate) fn position(&self, id: NodeId) -> usize {
        self.order.get(&id).copied().unwrap_or(usize::MAX)
    }

    /// Sorts ids into document order and drops duplicates.
    pub(crate) fn sort(&self, ids: &mut Vec<NodeId>) {
        ids.sort_by_key(|id| self.position(*id));
        ids.dedup();
    }

    /// Every element at or below the given context nodes, in document order.
    pub(crate) fn candidates(&self, context: &[NodeId]) -> Vec<ElementRef<'_>> {
        let mut ids = Vec::new();
        for id in context {
            if let Some(node) = self.node(*id) {
                ids.extend(node.descendants().filter(|n| n.value().is_element()).map(|n| n.id()));
            }
        }
        self.sort(&mut ids);
        ids.into_iter().filter_map(|id| self.element(id)).collect()
    }

    /// Every element in the document, in document order.
    pub(crate) fn all_elements(&self) -> Vec<ElementRef<'_>> {
        self.candidates(&[self.tree_root()])
    }

    pub(crate) fn element_by_id(&self, id: &str) -> Option<ElementRef<'_>> {
        self.all_elements()
            .into_iter()
            .find(|el| el.value().attr("id") == Some(id))
    }

    pub(crate) fn select_css(&self, context: &[NodeId], css: &str) -> Option<Vec<NodeId>> {
        let selector = CssSelector::parse(css).ok()?;
        Some(
            self.candidates(context)
                .into_iter()
                .filter(|el| selector.matches(el))
                .map(|el| el.id())
                .collect(),
        )
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("generation", &self.generation)
            .field("url", &self.url)
            .field("nodes", &self.order.len())
            .finish()
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text a reader would see: script, style and template contents are skipped.
pub(crate) fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    collect_text(*element, &mut parts);
    normalize_whitespace(&parts.join(" "))
}

fn collect_text<'a>(node: NodeRef<'a, RawNode>, parts: &mut Vec<&'a str>) {
    for child in node.children() {
        match child.value() {
            RawNode::Text(text) => parts.push(&**text),
            RawNode::Element(el) => {
                if !matches!(el.name(), "script" | "style" | "template" | "head") {
                    collect_text(child, parts);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_order_and_css() {
        let doc = Document::parse(
            "<html><body><p id='a'>One</p><div><p id='b'>Two</p></div><p id='c'>Three</p></body></html>",
        );
        let ids = doc.select_css(&[doc.tree_root()], "p").unwrap();
        let names: Vec<_> = ids
            .iter()
            .map(|id| doc.element(*id).unwrap().value().attr("id").unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(doc.select_css(&[doc.tree_root()], "p[").is_none());
    }

    #[test]
    fn test_visible_text_skips_scripts() {
        let doc = Document::parse(
            "<html><head><title> My   Page </title></head><body><h1>Hello</h1><script>var x = 1;</script><p>World\n  again</p></body></html>",
        );
        let body = doc.select_css(&[doc.tree_root()], "body").unwrap()[0];
        assert_eq!(visible_text(doc.element(body).unwrap()), "Hello World again");
        assert_eq!(doc.title().as_deref(), Some("My Page"));
    }

    #[test]
    fn test_snapshot_metadata() {
        let doc = Document::parse_snapshot("<p>x</p>", 7, Some("http://localhost/x".into()));
        assert_eq!(doc.generation(), Some(7));
        assert_eq!(doc.url(), Some("http://localhost/x"));
        assert_eq!(Document::parse("<p>x</p>").generation(), None);
    }
}
