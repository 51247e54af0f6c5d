use serde::{Deserialize, Serialize};
use std::fmt;

/// What a node is, decided once from its tag and (for `input`) its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Form,
    Label,
    Textarea,
    Checkbox,
    Radio,
    File,
    Button,
    Input,
    Option,
    Multiselect,
    Combobox,
    Generic,
}

pub fn classify<'a>(tag: &str, attr: impl Fn(&str) -> Option<&'a str>) -> NodeKind {
    match tag.to_ascii_lowercase().as_str() {
        "form" => NodeKind::Form,
        "label" => NodeKind::Label,
        "textarea" => NodeKind::Textarea,
        "button" => NodeKind::Button,
        "option" => NodeKind::Option,
        "select" if attr("multiple").is_some() => NodeKind::Multiselect,
        "select" => NodeKind::Combobox,
        "input" => {
            let input_type = attr("type")
                .map(|t| t.trim().to_ascii_lowercase())
                .unwrap_or_default();
            match input_type.as_str() {
                "checkbox" => NodeKind::Checkbox,
                "radio" => NodeKind::Radio,
                "file" => NodeKind::File,
                "submit" | "button" | "reset" | "image" => NodeKind::Button,
                _ => NodeKind::Input,
            }
        }
        _ => NodeKind::Generic,
    }
}

impl NodeKind {
    pub fn is_field(&self) -> bool {
        matches!(
            self,
            NodeKind::Textarea
                | NodeKind::Checkbox
                | NodeKind::Radio
                | NodeKind::File
                | NodeKind::Input
                | NodeKind::Multiselect
                | NodeKind::Combobox
        )
    }

    pub fn is_select(&self) -> bool {
        matches!(self, NodeKind::Multiselect | NodeKind::Combobox)
    }

    pub fn is_toggle(&self) -> bool {
        matches!(self, NodeKind::Checkbox | NodeKind::Radio)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Form => "form",
            NodeKind::Label => "label",
            NodeKind::Textarea => "textarea",
            NodeKind::Checkbox => "checkbox",
            NodeKind::Radio => "radio",
            NodeKind::File => "file",
            NodeKind::Button => "button",
            NodeKind::Input => "input",
            NodeKind::Option => "option",
            NodeKind::Multiselect => "multiselect",
            NodeKind::Combobox => "combobox",
            NodeKind::Generic => "node",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(tag: &str, attrs: &[(&'static str, &'static str)]) -> NodeKind {
        let attrs = attrs.to_vec();
        classify(tag, move |name| {
            attrs.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
        })
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(kind("form", &[]), NodeKind::Form);
        assert_eq!(kind("label", &[]), NodeKind::Label);
        assert_eq!(kind("textarea", &[]), NodeKind::Textarea);
        assert_eq!(kind("input", &[("type", "checkbox")]), NodeKind::Checkbox);
        assert_eq!(kind("input", &[("type", "RADIO")]), NodeKind::Radio);
        assert_eq!(kind("input", &[("type", "file")]), NodeKind::File);
        for t in ["submit", "button", "reset", "image"] {
            assert_eq!(kind("input", &[("type", t)]), NodeKind::Button);
        }
        assert_eq!(kind("button", &[]), NodeKind::Button);
        assert_eq!(kind("input", &[]), NodeKind::Input);
        assert_eq!(kind("input", &[("type", "email")]), NodeKind::Input);
        assert_eq!(kind("option", &[]), NodeKind::Option);
        assert_eq!(kind("select", &[("multiple", "")]), NodeKind::Multiselect);
        assert_eq!(kind("select", &[]), NodeKind::Combobox);
        assert_eq!(kind("div", &[]), NodeKind::Generic);
        assert_eq!(kind("a", &[("type", "checkbox")]), NodeKind::Generic);
    }

    #[test]
    fn test_field_kinds() {
        assert!(NodeKind::Combobox.is_field());
        assert!(NodeKind::File.is_field());
        assert!(!NodeKind::Button.is_field());
        assert!(!NodeKind::Option.is_field());
        assert!(NodeKind::Radio.is_toggle());
    }
}
