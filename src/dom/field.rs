use crate::dom::document::normalize_whitespace;
use crate::dom::kind::NodeKind;
use crate::dom::node::Node;
use crate::errors::{BrowserError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Value of a form field as a browser would submit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl FieldValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            FieldValue::Single(value) => Some(value),
            FieldValue::Multiple(values) => values.first().map(String::as_str),
            FieldValue::None => None,
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            FieldValue::None => vec![],
            FieldValue::Single(value) => vec![value.clone()],
            FieldValue::Multiple(values) => values.clone(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FieldValue::None)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::None => f.write_str("(none)"),
            FieldValue::Single(value) => f.write_str(value),
            FieldValue::Multiple(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}

/// Structural reads. These only look at the parsed markup and never touch
/// the session, so drivers are free to call them.
impl Node {
    pub fn name(&self) -> Option<String> {
        self.attr("name")
    }

    pub fn is_disabled(&self) -> bool {
        if self.attributes().has("disabled") {
            return true;
        }
        self.ancestors()
            .iter()
            .any(|a| a.tag() == "fieldset" && a.attributes().has("disabled"))
    }

    /// Owning form: the one named by a `form="id"` attribute, else the
    /// nearest ancestor form.
    pub fn form(&self) -> Option<Node> {
        if self.kind() == NodeKind::Form {
            return Some(self.clone());
        }

        if let Some(form_id) = self.attributes().get("form") {
            return self
                .document()
                .element_by_id(form_id)
                .and_then(|el| self.wrap(el.id()))
                .filter(|node| node.kind() == NodeKind::Form);
        }

        self.closest("form")
    }

    /// The `label[for]` pointing at this node's id, else an ancestor label.
    pub fn label(&self) -> Option<Node> {
        if let Some(id) = self.attributes().id() {
            let target = self.document().all_elements().into_iter().find(|el| {
                el.value().name() == "label" && el.value().attr("for") == Some(id)
            });
            if let Some(label) = target.and_then(|el| self.wrap(el.id())) {
                return Some(label);
            }
        }

        self.closest("label")
    }

    /// For a label: the field it points at through `for`, else the first
    /// field nested inside it.
    pub fn labelled_field(&self) -> Option<Node> {
        if self.kind() != NodeKind::Label {
            return None;
        }

        if let Some(target) = self.attributes().get("for") {
            return self
                .document()
                .element_by_id(target)
                .and_then(|el| self.wrap(el.id()))
                .filter(|node| node.kind().is_field());
        }

        self.descendants()
            .into_iter()
            .find(|node| node.kind().is_field())
    }

    pub(crate) fn descendants(&self) -> Vec<Node> {
        self.document()
            .candidates(&[self.node_id()])
            .into_iter()
            .filter(|el| el.id() != self.node_id())
            .filter_map(|el| self.wrap(el.id()))
            .collect()
    }

    /// Every field sharing this field's name inside the same form, in
    /// document order. Unnamed fields are a collection of one.
    pub fn collection(&self) -> Vec<Node> {
        let name = match self.name() {
            Some(name) => name,
            None => return vec![self.clone()],
        };
        let form = self.form();

        self.document()
            .all_elements()
            .into_iter()
            .filter(|el| el.value().attr("name") == Some(name.as_str()))
            .filter_map(|el| self.wrap(el.id()))
            .filter(|node| node.kind().is_field())
            .filter(|node| match (&form, node.form()) {
                (Some(a), Some(b)) => a.is_same(&b),
                (None, None) => true,
                _ => false,
            })
            .collect()
    }

    /// Index of this field within `collection()`.
    pub fn position(&self) -> usize {
        self.collection()
            .iter()
            .position(|node| node.is_same(self))
            .unwrap_or(0)
    }

    pub fn options(&self) -> Vec<Node> {
        if !self.kind().is_select() {
            return vec![];
        }
        self.descendants()
            .into_iter()
            .filter(|node| node.kind() == NodeKind::Option)
            .collect()
    }

    /// Submitted value of an option: its `value` attribute, else its text.
    pub fn option_value(&self) -> String {
        self.attr("value").unwrap_or_else(|| self.text())
    }

    /// Option whose value or text matches case-insensitively, exact matches
    /// first, then substring matches.
    pub fn option_matching(&self, text: &str) -> Option<Node> {
        let needle = normalize_whitespace(text).to_lowercase();
        let options = self.options();

        let exact = options.iter().find(|option| {
            option.option_value().to_lowercase() == needle || option.text().to_lowercase() == needle
        });
        if let Some(option) = exact {
            return Some(option.clone());
        }

        options
            .into_iter()
            .find(|option| {
                option.option_value().to_lowercase().contains(&needle)
                    || option.text().to_lowercase().contains(&needle)
            })
    }

    /// The `value` a checked toggle submits.
    pub fn toggle_value(&self) -> String {
        self.attr("value").unwrap_or_else(|| "on".to_string())
    }

    pub fn is_multiple(&self) -> bool {
        self.attributes().has("multiple")
    }

    pub(crate) fn static_checked(&self) -> bool {
        self.attributes().has("checked")
    }

    pub(crate) fn static_selected(&self) -> Vec<String> {
        let options = self.options();
        let selected: Vec<String> = options
            .iter()
            .filter(|option| option.attributes().has("selected"))
            .map(Node::option_value)
            .collect();

        match self.kind() {
            NodeKind::Combobox => match selected.last() {
                Some(value) => vec![value.clone()],
                None => options.first().map(Node::option_value).into_iter().collect(),
            },
            _ => selected,
        }
    }

    /// Value as written in the markup, ignoring any session state.
    pub fn static_value(&self) -> FieldValue {
        match self.kind() {
            NodeKind::Input | NodeKind::Button => {
                FieldValue::Single(self.attr("value").unwrap_or_default())
            }
            NodeKind::Textarea => FieldValue::Single(self.raw_text()),
            NodeKind::Checkbox | NodeKind::Radio => {
                if self.static_checked() {
                    FieldValue::Single(self.toggle_value())
                } else {
                    FieldValue::None
                }
            }
            NodeKind::Combobox => self
                .static_selected()
                .into_iter()
                .next()
                .map(FieldValue::Single)
                .unwrap_or(FieldValue::None),
            NodeKind::Multiselect => FieldValue::Multiple(self.static_selected()),
            NodeKind::Option => FieldValue::Single(self.option_value()),
            _ => FieldValue::None,
        }
    }
}

/// Session-aware reads and writes. Nodes from an interactive session route
/// through it; static nodes read their markup and refuse to mutate.
impl Node {
    pub fn value(&self) -> Result<FieldValue> {
        if self.session().is_none() {
            return Ok(self.static_value());
        }
        self.interactive()?.borrow_mut().field_value(self)
    }

    pub fn is_checked(&self) -> Result<bool> {
        self.expect_kind(&[NodeKind::Checkbox, NodeKind::Radio])?;
        Ok(!self.value()?.is_none())
    }

    /// For a radio, the value of the checked member of its group.
    pub fn selected_value(&self) -> Result<Option<String>> {
        match self.kind() {
            NodeKind::Radio => {
                for member in self.collection() {
                    if member.kind() == NodeKind::Radio {
                        if let Some(value) = member.value()?.as_single() {
                            return Ok(Some(value.to_string()));
                        }
                    }
                }
                Ok(None)
            }
            NodeKind::Checkbox | NodeKind::Combobox | NodeKind::Multiselect => {
                Ok(self.value()?.as_single().map(str::to_string))
            }
            other => Err(BrowserError::invalid_type("select, radio or checkbox", other.as_str())),
        }
    }

    pub fn selected_values(&self) -> Result<Vec<String>> {
        match self.kind() {
            NodeKind::Multiselect => Ok(self.value()?.to_vec()),
            _ => Ok(self.selected_value()?.into_iter().collect()),
        }
    }

    /// Visible text of the selected option.
    pub fn selected_text(&self) -> Result<Option<String>> {
        self.expect_kind(&[NodeKind::Combobox, NodeKind::Multiselect])?;
        let selected = match self.selected_value()? {
            Some(value) => value,
            None => return Ok(None),
        };
        Ok(self
            .options()
            .into_iter()
            .find(|option| option.option_value() == selected)
            .map(|option| option.text()))
    }

    pub fn fill(&self, value: &str) -> Result<()> {
        self.expect_kind(&[NodeKind::Input, NodeKind::Textarea])?;
        self.interactive()?.borrow_mut().set_value(self, value)
    }

    pub fn check(&self) -> Result<()> {
        self.expect_kind(&[NodeKind::Checkbox, NodeKind::Radio])?;
        self.interactive()?.borrow_mut().set_checked(self, true)
    }

    pub fn uncheck(&self) -> Result<()> {
        self.expect_kind(&[NodeKind::Checkbox])?;
        self.interactive()?.borrow_mut().set_checked(self, false)
    }

    /// Checkbox: ticks it. Radio: checks the group member with this value.
    /// Combobox: selects the matching option. Multiselect: adds the matching
    /// option to the selection.
    pub fn select(&self, value: &str) -> Result<()> {
        match self.kind() {
            NodeKind::Checkbox => self.check(),
            NodeKind::Radio => {
                let wanted = value.trim().to_lowercase();
                let member = self
                    .collection()
                    .into_iter()
                    .filter(|member| member.kind() == NodeKind::Radio)
                    .find(|member| member.toggle_value().to_lowercase() == wanted)
                    .ok_or_else(|| {
                        BrowserError::OptionNotFound(format!(
                            "no radio valued '{}' in group '{}'",
                            value,
                            self.name().unwrap_or_default()
                        ))
                    })?;
                self.interactive()?.borrow_mut().set_checked(&member, true)
            }
            NodeKind::Combobox | NodeKind::Multiselect => {
                let option = self.option_matching(value).ok_or_else(|| {
                    BrowserError::OptionNotFound(format!(
                        "no option matching '{}' in select '{}'",
                        value,
                        self.name().unwrap_or_default()
                    ))
                })?;
                let additive = self.kind() == NodeKind::Multiselect;
                self.interactive()?
                    .borrow_mut()
                    .select_option(self, &option.option_value(), additive)
            }
            other => Err(BrowserError::invalid_type("select, radio or checkbox", other.as_str())),
        }
    }

    pub fn select_multiple(&self, values: &[&str]) -> Result<()> {
        self.expect_kind(&[NodeKind::Multiselect])?;
        for value in values {
            self.select(value)?;
        }
        Ok(())
    }

    /// Checkbox: unticks it (a no-op when already clear). Multiselect:
    /// clears the selection.
    pub fn unselect(&self) -> Result<()> {
        match self.kind() {
            NodeKind::Checkbox => self.uncheck(),
            NodeKind::Multiselect => self.interactive()?.borrow_mut().deselect_option(self, None),
            other => Err(BrowserError::invalid_type("checkbox or multiselect", other.as_str())),
        }
    }

    /// Drops one option from a multiselect's selection.
    pub fn deselect(&self, value: &str) -> Result<()> {
        self.expect_kind(&[NodeKind::Multiselect])?;
        let option = self
            .option_matching(value)
            .ok_or_else(|| BrowserError::OptionNotFound(value.to_string()))?;
        self.interactive()?
            .borrow_mut()
            .deselect_option(self, Some(&option.option_value()))
    }

    pub fn attach<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        self.expect_kind(&[NodeKind::File])?;

        if paths.len() > 1 && !self.is_multiple() {
            return Err(BrowserError::Configuration(format!(
                "cannot attach {} files to non-multiple file input '{}'",
                paths.len(),
                self.name().unwrap_or_default()
            )));
        }

        let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        if let Some(missing) = paths.iter().find(|path| !path.is_file()) {
            return Err(BrowserError::Configuration(format!(
                "file '{}' does not exist",
                missing.display()
            )));
        }

        self.interactive()?.borrow_mut().attach_files(self, &paths)
    }

    pub fn click(&self) -> Result<()> {
        self.interactive()?.borrow_mut().click(self)
    }

    /// Submits the owning form; on a button, clicks it so it is sent along.
    pub fn submit(&self) -> Result<()> {
        if self.kind() == NodeKind::Button {
            return self.click();
        }
        let form = self
            .form()
            .ok_or_else(|| BrowserError::ElementNotFound(format!("form owning {}", self)))?;
        self.interactive()?.borrow_mut().submit(&form, None)
    }

    /// Name/value pairs the owning form would submit right now.
    pub fn form_values(&self) -> Result<Vec<(String, String)>> {
        let form = self
            .form()
            .ok_or_else(|| BrowserError::ElementNotFound(format!("form owning {}", self)))?;
        self.interactive()?.borrow_mut().submitted_values(&form)
    }

    pub(crate) fn expect_kind(&self, kinds: &[NodeKind]) -> Result<()> {
        if kinds.contains(&self.kind()) {
            return Ok(());
        }
        let expected: Vec<_> = kinds.iter().map(NodeKind::as_str).collect();
        Err(BrowserError::invalid_type(expected.join(" or "), self.kind().as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Crawler, Document};
    use std::rc::Rc;

    fn crawler(html: &str) -> Crawler {
        Crawler::new(Rc::new(Document::parse(html)), None)
    }

    const FORM: &str = r#"
        <form id="profile">
            <label for="f1">Name</label><input id="f1" name="name" value="Ada">
            <label>Bio <textarea name="bio">Hello</textarea></label>
            <input type="checkbox" name="opt[]" value="a">
            <input type="checkbox" name="opt[]" value="b" checked>
            <input type="checkbox" name="opt[]" value="c">
            <input type="checkbox" name="agree" checked>
            <input type="radio" name="size" value="s">
            <input type="radio" name="size" value="m" checked>
            <select name="color"><option value="r">Red</option><option value="g">Green</option></select>
            <select name="tags" multiple><option selected>x</option><option>y</option><option selected>z</option></select>
            <fieldset disabled><input name="locked"></fieldset>
            <input type="file" name="doc">
        </form>
        <input name="outside" form="profile">
        <form id="other"><input name="name"></form>
    "#;

    fn field(page: &Crawler, css: &str) -> Node {
        page.filter(css).first().unwrap()
    }

    #[test]
    fn test_labels_and_forms() {
        let page = crawler(FORM);
        let name = field(&page, "#f1");
        assert_eq!(name.label().unwrap().text(), "Name");
        assert_eq!(name.form().unwrap().attr("id").as_deref(), Some("profile"));

        let bio = field(&page, "textarea");
        assert_eq!(bio.label().unwrap().kind(), NodeKind::Label);
        assert_eq!(bio.label().unwrap().labelled_field().unwrap(), bio);

        let outside = field(&page, "input[name=outside]");
        assert_eq!(outside.form().unwrap().attr("id").as_deref(), Some("profile"));

        assert!(field(&page, "input[name=locked]").is_disabled());
        assert!(!name.is_disabled());
    }

    #[test]
    fn test_collection_is_scoped_to_form_in_document_order() {
        let page = crawler(FORM);
        let second = page.filter("input[name='opt[]']").eq(1).unwrap();
        let values: Vec<_> = second.collection().iter().map(Node::toggle_value).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
        assert_eq!(second.position(), 1);

        let name = field(&page, "#f1");
        assert_eq!(name.collection().len(), 1);
    }

    #[test]
    fn test_static_values() {
        let page = crawler(FORM);
        assert_eq!(field(&page, "#f1").value().unwrap(), FieldValue::Single("Ada".into()));
        assert_eq!(field(&page, "textarea").value().unwrap().as_single(), Some("Hello"));
        assert_eq!(field(&page, "input[name=agree]").value().unwrap().as_single(), Some("on"));
        assert!(field(&page, "input[value=a]").value().unwrap().is_none());

        let radio = field(&page, "input[value=s]");
        assert!(!radio.is_checked().unwrap());
        assert_eq!(radio.selected_value().unwrap().as_deref(), Some("m"));

        let color = field(&page, "select[name=color]");
        assert_eq!(color.kind(), NodeKind::Combobox);
        assert_eq!(color.selected_value().unwrap().as_deref(), Some("r"));
        assert_eq!(color.selected_text().unwrap().as_deref(), Some("Red"));

        let tags = field(&page, "select[name=tags]");
        assert_eq!(tags.selected_values().unwrap(), vec!["x", "z"]);
    }

    #[test]
    fn test_option_matching_prefers_exact() {
        let page = crawler(
            r#"<select name="s"><option value="1">Green apple</option><option value="2">green</option><option value="3">Blue</option></select>"#,
        );
        let select = field(&page, "select");
        assert_eq!(select.option_matching("GREEN").unwrap().option_value(), "2");
        assert_eq!(select.option_matching("apple").unwrap().option_value(), "1");
        assert_eq!(select.option_matching("3").unwrap().text(), "Blue");
        assert!(select.option_matching("purple").is_none());
    }

    #[test]
    fn test_static_nodes_refuse_mutation() {
        let page = crawler(FORM);
        assert!(matches!(field(&page, "#f1").fill("x"), Err(BrowserError::Detached)));
        assert!(matches!(
            field(&page, "#f1").check(),
            Err(BrowserError::InvalidElementType { .. })
        ));
    }

    #[test]
    fn test_attach_validates_before_the_session() {
        let page = crawler(FORM);
        let file = field(&page, "input[type=file]");

        let err = file.attach(&["/tmp/a.txt", "/tmp/b.txt"]).unwrap_err();
        assert!(matches!(err, BrowserError::Configuration(_)));

        let err = file.attach(&["/definitely/not/here.txt"]).unwrap_err();
        assert!(matches!(err, BrowserError::Configuration(_)));
    }
}
