use crate::dom::{FieldValue, Node, NodeKind};
use crate::errors::{BrowserError, Result};
use ego_tree::NodeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Cache identity of a form: its place in the document plus a hash of its
/// text, since forms rarely carry a stable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    position: usize,
    path: String,
    text_hash: u64,
}

impl Fingerprint {
    pub fn of(scope: &Node) -> Self {
        let mut hasher = DefaultHasher::new();
        scope.text().hash(&mut hasher);
        Self {
            position: scope.position_in_document(),
            path: scope.path(),
            text_hash: hasher.finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryState {
    Text(String),
    Toggle { checked: bool, value: String },
    Select {
        options: Vec<String>,
        selected: Vec<String>,
        multiple: bool,
    },
    Files(Vec<PathBuf>),
    Button { value: String },
}

#[derive(Debug, Clone)]
pub struct FieldEntry {
    pub node: NodeId,
    pub name: Option<String>,
    pub kind: NodeKind,
    pub disabled: bool,
    pub state: EntryState,
}

impl FieldEntry {
    fn parse(node: &Node) -> Self {
        let state = match node.kind() {
            NodeKind::Checkbox | NodeKind::Radio => EntryState::Toggle {
                checked: node.static_checked(),
                value: node.toggle_value(),
            },
            NodeKind::Combobox | NodeKind::Multiselect => EntryState::Select {
                options: node.options().iter().map(Node::option_value).collect(),
                selected: node.static_selected(),
                multiple: node.kind() == NodeKind::Multiselect,
            },
            NodeKind::File => EntryState::Files(vec![]),
            NodeKind::Button => EntryState::Button {
                value: node.attr("value").unwrap_or_default(),
            },
            _ => EntryState::Text(node.static_value().as_single().unwrap_or_default().to_string()),
        };

        Self {
            node: node.node_id(),
            name: node.name(),
            kind: node.kind(),
            disabled: node.is_disabled(),
            state,
        }
    }

    fn value(&self) -> FieldValue {
        match &self.state {
            EntryState::Text(value) => FieldValue::Single(value.clone()),
            EntryState::Toggle { checked, value } => {
                if *checked {
                    FieldValue::Single(value.clone())
                } else {
                    FieldValue::None
                }
            }
            EntryState::Select {
                selected, multiple, ..
            } => {
                if *multiple {
                    FieldValue::Multiple(selected.clone())
                } else {
                    selected
                        .first()
                        .cloned()
                        .map(FieldValue::Single)
                        .unwrap_or(FieldValue::None)
                }
            }
            EntryState::Files(paths) => match paths.len() {
                0 => FieldValue::None,
                1 => FieldValue::Single(paths[0].display().to_string()),
                _ => FieldValue::Multiple(paths.iter().map(|p| p.display().to_string()).collect()),
            },
            EntryState::Button { value } => FieldValue::Single(value.clone()),
        }
    }
}

/// Mutable field state of one form (or of the fields outside any form),
/// parsed once per snapshot.
#[derive(Debug, Clone)]
pub struct FormState {
    fingerprint: Fingerprint,
    entries: Vec<FieldEntry>,
    initial: Vec<FieldEntry>,
}

impl FormState {
    /// `scope` is a form element, or the document's root element for fields
    /// that belong to no form.
    pub fn parse(scope: &Node) -> Self {
        let is_form = scope.kind() == NodeKind::Form;
        let entries: Vec<FieldEntry> = scope
            .document()
            .all_elements()
            .into_iter()
            .filter_map(|el| scope.wrap(el.id()))
            .filter(|node| node.kind().is_field() || node.kind() == NodeKind::Button)
            .filter(|node| match node.form() {
                Some(owner) => is_form && owner.is_same(scope),
                None => !is_form,
            })
            .map(|node| FieldEntry::parse(&node))
            .collect();

        Self {
            fingerprint: Fingerprint::of(scope),
            initial: entries.clone(),
            entries,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    /// Index of the entry backing `node`: same-named fields are told apart
    /// by their position in `Node::collection()` order.
    fn locate(&self, node: &Node) -> Result<usize> {
        let found = match node.name() {
            Some(name) => {
                let position = node.position();
                self.entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.kind.is_field() && e.name.as_deref() == Some(name.as_str()))
                    .nth(position)
                    .map(|(index, _)| index)
            }
            None => self.entries.iter().position(|e| e.node == node.node_id()),
        };
        found.ok_or_else(|| BrowserError::ElementNotFound(format!("form field for {}", node)))
    }

    fn entry_mut(&mut self, node: &Node) -> Result<&mut FieldEntry> {
        let index = self.locate(node)?;
        Ok(&mut self.entries[index])
    }

    pub fn value_of(&self, node: &Node) -> Result<FieldValue> {
        if node.kind() == NodeKind::Button {
            return Ok(node.static_value());
        }
        Ok(self.entries[self.locate(node)?].value())
    }

    pub fn set_value(&mut self, node: &Node, value: &str) -> Result<()> {
        let entry = self.entry_mut(node)?;
        match &mut entry.state {
            EntryState::Text(current) => {
                *current = value.to_string();
                Ok(())
            }
            _ => Err(BrowserError::invalid_type("text field", entry.kind.as_str())),
        }
    }

    /// Checking a radio clears the rest of its group.
    pub fn set_checked(&mut self, node: &Node, checked: bool) -> Result<()> {
        let index = self.locate(node)?;
        let (name, kind) = (self.entries[index].name.clone(), self.entries[index].kind);

        if kind == NodeKind::Radio && checked {
            for (i, entry) in self.entries.iter_mut().enumerate() {
                if i != index && entry.kind == NodeKind::Radio && entry.name == name {
                    if let EntryState::Toggle { checked, .. } = &mut entry.state {
                        *checked = false;
                    }
                }
            }
        }

        match &mut self.entries[index].state {
            EntryState::Toggle { checked: current, .. } => {
                *current = checked;
                Ok(())
            }
            _ => Err(BrowserError::invalid_type("checkbox or radio", kind.as_str())),
        }
    }

    /// `additive` keeps the current selection (multiselects); otherwise the
    /// option replaces it.
    pub fn select_option(&mut self, node: &Node, value: &str, additive: bool) -> Result<()> {
        let entry = self.entry_mut(node)?;
        let kind = entry.kind;
        match &mut entry.state {
            EntryState::Select {
                options, selected, ..
            } => {
                if !options.iter().any(|option| option == value) {
                    return Err(BrowserError::OptionNotFound(value.to_string()));
                }
                if !additive {
                    selected.clear();
                }
                if !selected.iter().any(|s| s == value) {
                    selected.push(value.to_string());
                }
                // keep option order
                let order = options.clone();
                selected.sort_by_key(|s| order.iter().position(|o| o == s));
                Ok(())
            }
            _ => Err(BrowserError::invalid_type("select", kind.as_str())),
        }
    }

    pub fn deselect_option(&mut self, node: &Node, value: Option<&str>) -> Result<()> {
        let entry = self.entry_mut(node)?;
        let kind = entry.kind;
        match &mut entry.state {
            EntryState::Select { selected, .. } => {
                match value {
                    Some(value) => selected.retain(|s| s != value),
                    None => selected.clear(),
                }
                Ok(())
            }
            _ => Err(BrowserError::invalid_type("select", kind.as_str())),
        }
    }

    pub fn set_files(&mut self, node: &Node, paths: &[PathBuf]) -> Result<()> {
        let entry = self.entry_mut(node)?;
        let kind = entry.kind;
        match &mut entry.state {
            EntryState::Files(current) => {
                *current = paths.to_vec();
                Ok(())
            }
            _ => Err(BrowserError::invalid_type("file", kind.as_str())),
        }
    }

    pub fn reset(&mut self) {
        self.entries = self.initial.clone();
    }

    /// Name/value pairs as submitted: enabled, named fields in document
    /// order, plus the submitting button when it has a name.
    pub fn values(&self, submitter: Option<&Node>) -> Vec<(String, String)> {
        let mut values = Vec::new();
        for entry in &self.entries {
            let name = match (&entry.name, entry.disabled) {
                (Some(name), false) => name,
                _ => continue,
            };
            match &entry.state {
                EntryState::Files(_) => {}
                EntryState::Button { value } => {
                    if submitter.map(|s| s.node_id() == entry.node).unwrap_or(false) {
                        values.push((name.clone(), value.clone()));
                    }
                }
                _ => {
                    for value in entry.value().to_vec() {
                        values.push((name.clone(), value));
                    }
                }
            }
        }
        values
    }

    pub fn files(&self) -> Vec<(String, PathBuf)> {
        self.entries
            .iter()
            .filter(|entry| !entry.disabled)
            .filter_map(|entry| match (&entry.name, &entry.state) {
                (Some(name), EntryState::Files(paths)) => {
                    Some(paths.iter().map(|p| (name.clone(), p.clone())).collect::<Vec<_>>())
                }
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Crawler;

    const PAGE: &str = r#"<html><body>
        <form id="f" action="/save">
            <input name="title" value="Draft">
            <input type="checkbox" name="opt[]" value="a">
            <input type="checkbox" name="opt[]" value="b">
            <input type="checkbox" name="opt[]" value="c">
            <input type="radio" name="size" value="s" checked>
            <input type="radio" name="size" value="m">
            <select name="tags" multiple><option>x</option><option>y</option><option>z</option></select>
            <input name="locked" value="1" disabled>
            <input type="file" name="doc">
            <button name="action" value="publish">Publish</button>
            <button name="action" value="draft">Save draft</button>
        </form>
        <input name="loose" value="free">
    </body></html>"#;

    fn setup() -> (Crawler, FormState) {
        let page = Crawler::parse(PAGE);
        let form = page.filter("form").first().unwrap();
        let state = FormState::parse(&form);
        (page, state)
    }

    #[test]
    fn test_same_named_fields_are_positional() {
        let (page, mut state) = setup();
        let second = page.filter("input[name='opt[]']").eq(1).unwrap();
        state.set_checked(&second, true).unwrap();

        let opts: Vec<_> = state
            .values(None)
            .into_iter()
            .filter(|(name, _)| name == "opt[]")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(opts, vec!["b"]);
    }

    #[test]
    fn test_radio_group_is_exclusive() {
        let (page, mut state) = setup();
        let medium = page.filter("input[value=m]").first().unwrap();
        let small = page.filter("input[value=s]").first().unwrap();
        state.set_checked(&medium, true).unwrap();

        assert_eq!(state.value_of(&medium).unwrap().as_single(), Some("m"));
        assert!(state.value_of(&small).unwrap().is_none());
    }

    #[test]
    fn test_multiselect_is_additive_and_ordered() {
        let (page, mut state) = setup();
        let tags = page.filter("select").first().unwrap();
        state.select_option(&tags, "z", true).unwrap();
        state.select_option(&tags, "x", true).unwrap();
        assert_eq!(state.value_of(&tags).unwrap().to_vec(), vec!["x", "z"]);

        state.deselect_option(&tags, Some("x")).unwrap();
        assert_eq!(state.value_of(&tags).unwrap().to_vec(), vec!["z"]);
        state.deselect_option(&tags, None).unwrap();
        assert!(state.value_of(&tags).unwrap().to_vec().is_empty());

        assert!(matches!(
            state.select_option(&tags, "nope", true),
            Err(BrowserError::OptionNotFound(_))
        ));
    }

    #[test]
    fn test_submitted_values() {
        let (page, mut state) = setup();
        let title = page.filter("input[name=title]").first().unwrap();
        state.set_value(&title, "Final").unwrap();
        let draft = page.filter("button").eq(1).unwrap();

        let values = state.values(Some(&draft));
        assert_eq!(
            values,
            vec![
                ("title".to_string(), "Final".to_string()),
                ("size".to_string(), "s".to_string()),
                ("action".to_string(), "draft".to_string()),
            ]
        );

        state.reset();
        assert_eq!(state.value_of(&title).unwrap().as_single(), Some("Draft"));
    }

    #[test]
    fn test_formless_fields_have_their_own_scope() {
        let page = Crawler::parse(PAGE);
        let root = page.first().unwrap();
        let state = FormState::parse(&root);
        assert_eq!(state.entries().len(), 1);
        assert_eq!(state.values(None), vec![("loose".to_string(), "free".to_string())]);
    }

    #[test]
    fn test_fingerprint_tracks_structure_and_text() {
        let a = Crawler::parse("<form><input name=a></form><form><p>x</p></form>");
        let b = Crawler::parse("<form><input name=a></form><form><p>y</p></form>");
        let first = |c: &Crawler| Fingerprint::of(&c.filter("form").eq(1).unwrap());
        assert_ne!(first(&a), first(&b));
        assert_eq!(
            Fingerprint::of(&a.filter("form").first().unwrap()),
            Fingerprint::of(&b.filter("form").first().unwrap())
        );
    }
}
