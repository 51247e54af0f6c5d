use crate::dom::crawler::Crawler;
use crate::dom::document::normalize_whitespace;
use crate::dom::kind::NodeKind;
use crate::dom::node::Node;
use crate::dom::selector::{Resolver, Selector, SelectorKind, SelectorValue};
use crate::dom::xpath;
use crate::errors::{BrowserError, Result};
use ego_tree::NodeId;
use tracing::debug;

/// One concrete way of turning a locator into elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Css,
    Id,
    XPath,
    Link,
    Button,
    Image,
    FieldByName,
    FieldByLabel,
}

/// Strategies tried for a kind, in priority order. The first one that
/// matches anything wins.
pub fn strategies(kind: SelectorKind) -> &'static [Strategy] {
    use Strategy::*;
    match kind {
        SelectorKind::Auto => &[Css, Button, Link, Id, FieldByName, FieldByLabel],
        SelectorKind::Clickable => &[Button, Link, Id, Css, Image, FieldByName, FieldByLabel],
        SelectorKind::Field => &[FieldByName, FieldByLabel, Id, Css],
        SelectorKind::Css => &[Css],
        SelectorKind::Id => &[Id],
        SelectorKind::XPath => &[XPath],
        SelectorKind::Link => &[Link],
        SelectorKind::Button => &[Button],
        SelectorKind::Image => &[Image],
        SelectorKind::FieldForName => &[FieldByName],
        SelectorKind::FieldForLabel => &[FieldByLabel],
        SelectorKind::Callback => &[],
    }
}

pub fn resolve(selector: &Selector, fragment: &Crawler) -> Result<Crawler> {
    let locator = match selector.value() {
        SelectorValue::Callback(resolver) => return resolve_callback(resolver, fragment),
        SelectorValue::Locator(locator) => locator,
    };

    for strategy in strategies(selector.kind()) {
        // a strategy that cannot evaluate the locator simply matches nothing
        let ids = strategy.apply(locator, fragment).unwrap_or_default();
        if !ids.is_empty() {
            debug!(
                selector = %selector,
                strategy = ?strategy,
                matches = ids.len(),
                "selector resolved"
            );
            return Ok(fragment.with_nodes(ids));
        }
    }

    debug!(selector = %selector, "selector matched nothing");
    Ok(fragment.empty())
}

fn resolve_callback(resolver: &Resolver, fragment: &Crawler) -> Result<Crawler> {
    let returned = (resolver.f)(fragment);

    let returned = match returned.downcast::<Crawler>() {
        Ok(crawler) => return Ok(*crawler),
        Err(other) => other,
    };
    let returned = match returned.downcast::<Node>() {
        Ok(node) => return Ok(node.crawler()),
        Err(other) => other,
    };
    let returned = match returned.downcast::<Option<Node>>() {
        Ok(node) => return Ok(node.map(|n| n.crawler()).unwrap_or_else(|| fragment.empty())),
        Err(other) => other,
    };
    let returned = match returned.downcast::<Vec<Node>>() {
        Ok(nodes) => {
            let ids = nodes
                .iter()
                .filter(|node| std::rc::Rc::ptr_eq(node.document(), fragment.document()))
                .map(Node::node_id)
                .collect();
            return Ok(fragment.with_nodes(ids));
        }
        Err(other) => other,
    };
    if returned.is::<()>() {
        return Ok(fragment.empty());
    }

    Err(BrowserError::InvalidSelectorCallback(format!(
        "expected a node, a list of nodes, a crawler or nothing, got {}",
        resolver.returns
    )))
}

impl Strategy {
    /// `None` when the locator cannot be evaluated by this strategy.
    fn apply(&self, locator: &str, fragment: &Crawler) -> Option<Vec<NodeId>> {
        match self {
            Strategy::Css => fragment.document().select_css(fragment.ids(), locator),
            Strategy::XPath => xpath::evaluate(fragment.document(), fragment.ids(), locator).ok(),
            Strategy::Id => Some(by_id(locator, fragment)),
            Strategy::Link => Some(by_link(locator, fragment)),
            Strategy::Button => Some(by_button(locator, fragment)),
            Strategy::Image => Some(by_image(locator, fragment)),
            Strategy::FieldByName => Some(by_field_name(locator, fragment)),
            Strategy::FieldByLabel => Some(by_label(locator, fragment)),
        }
    }
}

fn candidates(fragment: &Crawler) -> Vec<Node> {
    let document = fragment.document();
    document
        .candidates(fragment.ids())
        .into_iter()
        .filter_map(|el| Node::new(document.clone(), el.id(), fragment.session().cloned()))
        .collect()
}

fn ids(nodes: impl IntoIterator<Item = Node>) -> Vec<NodeId> {
    nodes.into_iter().map(|node| node.node_id()).collect()
}

fn folded(text: &str) -> String {
    normalize_whitespace(text).to_lowercase()
}

/// Runs each tier in turn and keeps the first non-empty one.
fn tiered(nodes: &[Node], tiers: &[&dyn Fn(&Node) -> bool]) -> Vec<NodeId> {
    for tier in tiers {
        let matched: Vec<Node> = nodes.iter().filter(|node| tier(node)).cloned().collect();
        if !matched.is_empty() {
            return ids(matched);
        }
    }
    vec![]
}

fn by_id(locator: &str, fragment: &Crawler) -> Vec<NodeId> {
    let wanted = locator.strip_prefix('#').unwrap_or(locator);
    if wanted.is_empty() {
        return vec![];
    }
    ids(candidates(fragment)
        .into_iter()
        .filter(|node| node.attributes().id() == Some(wanted)))
}

fn by_link(locator: &str, fragment: &Crawler) -> Vec<NodeId> {
    let needle = folded(locator);
    if needle.is_empty() {
        return vec![];
    }
    let links: Vec<Node> = candidates(fragment)
        .into_iter()
        .filter(|node| node.tag() == "a")
        .collect();

    let exact = |node: &Node| folded(&node.text()) == needle;
    let partial = |node: &Node| folded(&node.text()).contains(&needle);
    let titled = |node: &Node| {
        let title_matches = node
            .attr("title")
            .map(|title| folded(&title).contains(&needle))
            .unwrap_or(false);
        title_matches
            || node.filter("img").nodes().iter().any(|img| {
                img.attr("alt")
                    .map(|alt| folded(&alt).contains(&needle))
                    .unwrap_or(false)
            })
    };

    tiered(&links, &[&exact, &partial, &titled])
}

fn button_label(node: &Node) -> String {
    if node.tag() == "button" {
        return folded(&node.text());
    }
    let value = node.attr("value").or_else(|| node.attr("alt")).unwrap_or_default();
    folded(&value)
}

fn by_button(locator: &str, fragment: &Crawler) -> Vec<NodeId> {
    let needle = folded(locator);
    if needle.is_empty() {
        return vec![];
    }
    let buttons: Vec<Node> = candidates(fragment)
        .into_iter()
        .filter(|node| node.kind() == NodeKind::Button)
        .collect();

    let exact = |node: &Node| {
        button_label(node) == needle
            || node.attr("alt").map(|alt| folded(&alt) == needle).unwrap_or(false)
    };
    let identified = |node: &Node| {
        node.attributes().id() == Some(locator) || node.attributes().get("name") == Some(locator)
    };
    let partial = |node: &Node| button_label(node).contains(&needle);

    tiered(&buttons, &[&exact, &identified, &partial])
}

fn by_image(locator: &str, fragment: &Crawler) -> Vec<NodeId> {
    let needle = folded(locator);
    if needle.is_empty() {
        return vec![];
    }
    let images: Vec<Node> = candidates(fragment)
        .into_iter()
        .filter(|node| {
            node.tag() == "img" || (node.tag() == "input" && node.attributes().is("type", "image"))
        })
        .collect();

    let alt = |node: &Node| node.attr("alt").map(|alt| folded(&alt)).unwrap_or_default();
    let exact = |node: &Node| alt(node) == needle;
    let partial = |node: &Node| alt(node).contains(&needle);

    tiered(&images, &[&exact, &partial])
}

fn by_field_name(locator: &str, fragment: &Crawler) -> Vec<NodeId> {
    ids(candidates(fragment).into_iter().filter(|node| {
        matches!(node.tag(), "input" | "select" | "textarea")
            && node.attributes().get("name") == Some(locator)
    }))
}

fn by_label(locator: &str, fragment: &Crawler) -> Vec<NodeId> {
    let needle = folded(locator);
    if needle.is_empty() {
        return vec![];
    }
    let labels: Vec<Node> = candidates(fragment)
        .into_iter()
        .filter(|node| node.kind() == NodeKind::Label)
        .collect();

    let exact = |node: &Node| folded(&node.text()) == needle;
    let partial = |node: &Node| folded(&node.text()).contains(&needle);

    let document = fragment.document();
    let matched = tiered(&labels, &[&exact, &partial]);
    matched
        .into_iter()
        .filter_map(|id| Node::new(document.clone(), id, fragment.session().cloned()))
        .filter_map(|label| label.labelled_field())
        .map(|field| field.node_id())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> Crawler {
        Crawler::parse(html)
    }

    fn resolve_str(html: &str, kind: SelectorKind, locator: &str) -> Crawler {
        resolve(&Selector::new(kind, locator), &page(html)).unwrap()
    }

    #[test]
    fn test_every_kind_returns_empty_on_miss() {
        let html = "<html><body><p>nothing here</p></body></html>";
        for kind in [
            SelectorKind::Auto,
            SelectorKind::Css,
            SelectorKind::Id,
            SelectorKind::Field,
            SelectorKind::FieldForName,
            SelectorKind::FieldForLabel,
            SelectorKind::Clickable,
            SelectorKind::Link,
            SelectorKind::Button,
            SelectorKind::Image,
            SelectorKind::XPath,
        ] {
            assert!(resolve_str(html, kind, "missing").is_empty(), "{}", kind);
        }
    }

    #[test]
    fn test_auto_prefers_button_text_over_id() {
        let html = r#"<div id="Save">wrong</div><button id="save">Save</button>"#;
        let found = resolve_str(html, SelectorKind::Auto, "Save");
        assert_eq!(found.count(), 1);
        assert_eq!(found.first().unwrap().tag(), "button");
    }

    #[test]
    fn test_auto_uses_css_first() {
        let html = r#"<p class="save">css</p><button>.save</button>"#;
        let found = resolve_str(html, SelectorKind::Auto, ".save");
        assert_eq!(found.first().unwrap().tag(), "p");
    }

    #[test]
    fn test_erroring_strategy_falls_through() {
        // not valid CSS, so the button text strategy is reached
        let html = r#"<button>Save (draft)</button>"#;
        let found = resolve_str(html, SelectorKind::Auto, "Save (draft)");
        assert_eq!(found.first().unwrap().tag(), "button");
    }

    #[test]
    fn test_link_tiers() {
        let html = r#"
            <a href="/a">Read more about us</a>
            <a href="/b">read MORE</a>
            <a href="/c" title="Profile settings">⚙</a>
            <a href="/d"><img alt="Company logo"></a>
        "#;
        let exact = resolve_str(html, SelectorKind::Link, "Read more");
        assert_eq!(exact.attr("href").as_deref(), Some("/b"));

        let partial = resolve_str(html, SelectorKind::Link, "about");
        assert_eq!(partial.attr("href").as_deref(), Some("/a"));

        let titled = resolve_str(html, SelectorKind::Link, "profile");
        assert_eq!(titled.attr("href").as_deref(), Some("/c"));

        let image = resolve_str(html, SelectorKind::Link, "logo");
        assert_eq!(image.attr("href").as_deref(), Some("/d"));
    }

    #[test]
    fn test_button_tiers() {
        let html = r#"
            <input type="submit" value="Send message" name="send">
            <button id="cancel-btn">Cancel</button>
            <input type="image" alt="Go">
        "#;
        assert_eq!(
            resolve_str(html, SelectorKind::Button, "send message").attr("name").as_deref(),
            Some("send")
        );
        assert_eq!(
            resolve_str(html, SelectorKind::Button, "cancel-btn").text(),
            "Cancel"
        );
        assert_eq!(
            resolve_str(html, SelectorKind::Button, "Send").attr("name").as_deref(),
            Some("send")
        );
        assert_eq!(
            resolve_str(html, SelectorKind::Button, "go").attr("type").as_deref(),
            Some("image")
        );
    }

    #[test]
    fn test_label_association() {
        let html = r#"<label for="f1">Name</label><input id="f1" name="name">
            <label>Full address <textarea name="address"></textarea></label>"#;
        let field = resolve_str(html, SelectorKind::Field, "Name");
        assert_eq!(field.attr("name").as_deref(), Some("name"));

        let nested = resolve_str(html, SelectorKind::FieldForLabel, "address");
        assert_eq!(nested.first().unwrap().kind(), NodeKind::Textarea);
    }

    #[test]
    fn test_field_prefers_name_over_label() {
        let html = r#"<label for="a">email</label><input id="a" name="contact">
            <input name="email">"#;
        let field = resolve_str(html, SelectorKind::Field, "email");
        assert_eq!(field.attr("name").as_deref(), Some("email"));
    }

    #[test]
    fn test_clickable_finds_images() {
        let html = r#"<img alt="Close dialog" src="x.png">"#;
        let found = resolve_str(html, SelectorKind::Clickable, "close");
        assert_eq!(found.first().unwrap().tag(), "img");
    }

    #[test]
    fn test_candidates_are_limited_to_fragment() {
        let crawler = page(r#"<div id="a"><button>Go</button></div><div id="b"><p>x</p></div>"#);
        let b = crawler.filter("#b");
        let found = resolve(&Selector::button("Go"), &b).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_callback_return_types() {
        let crawler = page("<ul><li>a</li><li>b</li></ul>");

        let node = Selector::callback(|c: &Crawler| c.filter("li").last().unwrap());
        assert_eq!(resolve(&node, &crawler).unwrap().text(), "b");

        let list = Selector::callback(|c: &Crawler| c.filter("li").nodes());
        assert_eq!(resolve(&list, &crawler).unwrap().count(), 2);

        let fragment = Selector::callback(|c: &Crawler| c.filter("ul"));
        assert_eq!(resolve(&fragment, &crawler).unwrap().count(), 1);

        let maybe = Selector::callback(|c: &Crawler| c.filter("table").first());
        assert!(resolve(&maybe, &crawler).unwrap().is_empty());

        let nothing = Selector::callback(|_: &Crawler| ());
        assert!(resolve(&nothing, &crawler).unwrap().is_empty());

        let invalid = Selector::callback(|_: &Crawler| "li");
        let err = resolve(&invalid, &crawler).unwrap_err();
        assert!(matches!(err, BrowserError::InvalidSelectorCallback(ref m) if m.contains("&str")));
    }

    #[test]
    fn test_xpath_kind() {
        let found = resolve_str(
            "<ul><li>a</li><li class='x'>b</li></ul>",
            SelectorKind::XPath,
            "//li[@class='x']",
        );
        assert_eq!(found.text(), "b");
    }
}
