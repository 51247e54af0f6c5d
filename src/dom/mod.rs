pub mod attributes;
pub mod crawler;
pub mod document;
pub mod field;
pub mod kind;
pub mod node;
pub mod selector;
pub mod strategy;
pub mod xpath;

pub use attributes::Attributes;
pub use crawler::Crawler;
pub use document::{normalize_whitespace, Document};
pub use field::FieldValue;
pub use kind::{classify, NodeKind};
pub use node::{Node, SessionHandle};
pub use selector::{IntoSelector, Selector, SelectorKind, SEPARATOR};
pub use strategy::{resolve, Strategy};
