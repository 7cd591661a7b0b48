//! XML elements kept verbatim from a loaded vault.
//!
//! KeePass clients store settings the model does not interpret (auto-type
//! associations, plugin custom data, custom icons, quality flags). They are
//! held as opaque subtrees on the owning [`Entry`](crate::model::Entry),
//! [`Group`](crate::model::Group) or [`Metadata`](crate::model::Metadata)
//! and written back unchanged on save.

use crate::model::field::ProtectedValue;

/// One element with its attributes, text and children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Character content. Empty for protected elements.
    pub text: String,
    /// Unmasked content of a `Protected="True"` element.
    pub protected: Option<ProtectedValue>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// An element with no attributes, text or children.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// An element holding only text.
    #[must_use]
    pub fn with_text(name: &str, text: &str) -> Self {
        Self {
            text: text.to_owned(),
            ..Self::new(name)
        }
    }

    /// First direct child named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Text of the first descendant reached by following `path`.
    #[must_use]
    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        path.iter()
            .try_fold(self, |node, name| node.child(name))
            .map(|node| node.text.as_str())
    }
}
