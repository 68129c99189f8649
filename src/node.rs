use crate::document::Document;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// What a node is, and the data only that kind of node carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node. Parent of the root element and of any
    /// comment, PI or doctype outside it. There is exactly one per [`Document`].
    Document,
    Element {
        name: String,
        attributes: HashMap<String, String>, // q:attr="val" => {"q:attr": "val"}
    },
    Text(String),
    CData(String),
    Comment(String),
    PI(String),
    DocType(String),
}

#[derive(Debug)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<Node>,
    pub(crate) children: Vec<Node>,
}

/// Represents a node of the document tree.
///
/// This struct only contains a unique usize id and implements trait `Copy`.
/// So you do not need to bother with having a reference.
///
/// Because the actual data of the node is stored in [`Document`],
/// most methods takes `&Document` or `&mut Document` as its first argument.
///
/// A removed node keeps its id, but is no longer reachable from the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    id: usize,
}

impl Node {
    pub(crate) fn new_in(document: &mut Document, kind: NodeKind) -> Node {
        let node = Node {
            id: document.store.len(),
        };
        document.store.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        node
    }

    pub(crate) fn container() -> (Node, NodeData) {
        let data = NodeData {
            kind: NodeKind::Document,
            parent: None,
            children: Vec::new(),
        };
        (Node { id: 0 }, data)
    }

    pub fn is_container(&self) -> bool {
        self.id == 0
    }

    /// Returns true if this handle was created by `document`.
    pub fn is_in(&self, document: &Document) -> bool {
        self.id < document.store.len()
    }

    /// Returns true if `name` can be used as an element or attribute name.
    pub fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_alphabetic() || c == '_' || c == ':' => {}
            _ => return false,
        }
        chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'))
    }
}

impl Node {
    fn data<'a>(&self, document: &'a Document) -> &'a NodeData {
        &document.store[self.id]
    }

    fn mut_data<'a>(&self, document: &'a mut Document) -> &'a mut NodeData {
        &mut document.store[self.id]
    }

    pub fn kind<'a>(&self, document: &'a Document) -> &'a NodeKind {
        &self.data(document).kind
    }

    pub fn is_element(&self, document: &Document) -> bool {
        matches!(self.kind(document), NodeKind::Element { .. })
    }

    /// Raw element name, including its namespace prefix.
    /// `None` for anything but elements.
    pub fn name<'a>(&self, document: &'a Document) -> Option<&'a str> {
        match self.kind(document) {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Name without namespace prefix.
    ///
    /// `<prefix:name>` -> `"name"`.
    pub fn local_name<'a>(&self, document: &'a Document) -> Option<&'a str> {
        self.name(document).map(|name| match name.split_once(':') {
            Some((_, local)) => local,
            None => name,
        })
    }

    pub fn attributes<'a>(&self, document: &'a Document) -> Option<&'a HashMap<String, String>> {
        match self.kind(document) {
            NodeKind::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn attribute<'a>(&self, document: &'a Document, name: &str) -> Option<&'a str> {
        self.attributes(document)?.get(name).map(|v| v.as_str())
    }

    fn mut_attributes<'a>(
        &self,
        document: &'a mut Document,
    ) -> Result<&'a mut HashMap<String, String>> {
        match &mut self.mut_data(document).kind {
            NodeKind::Element { attributes, .. } => Ok(attributes),
            _ => Err(Error::Invariant(
                "Only elements can have attributes".to_string(),
            )),
        }
    }

    /// Sets or overwrites an attribute.
    ///
    /// # Errors
    ///
    /// - [`Error::Invariant`]: Node is not an element, or `name` is not a valid xml name.
    pub fn set_attribute<S: Into<String>>(
        &self,
        document: &mut Document,
        name: &str,
        value: S,
    ) -> Result<()> {
        if !Self::is_valid_name(name) {
            return Err(Error::Invariant(format!("Invalid attribute name {:?}", name)));
        }
        self.mut_attributes(document)?
            .insert(name.to_string(), value.into());
        Ok(())
    }

    /// Removes an attribute, returning its value if it was present.
    pub fn remove_attribute(&self, document: &mut Document, name: &str) -> Result<Option<String>> {
        Ok(self.mut_attributes(document)?.remove(name))
    }

    pub fn parent(&self, document: &Document) -> Option<Node> {
        self.data(document).parent
    }

    pub fn has_parent(&self, document: &Document) -> bool {
        self.parent(document).is_some()
    }

    pub fn children<'a>(&self, document: &'a Document) -> &'a [Node] {
        &self.data(document).children
    }

    pub fn has_children(&self, document: &Document) -> bool {
        !self.children(document).is_empty()
    }

    pub fn child_elements(&self, document: &Document) -> Vec<Node> {
        self.children(document)
            .iter()
            .filter(|node| node.is_element(document))
            .copied()
            .collect()
    }

    fn _descendants(&self, document: &Document, nodes: &mut Vec<Node>) {
        for node in self.children(document) {
            nodes.push(*node);
            node._descendants(document, nodes);
        }
    }

    /// All nodes under this one, in document order.
    pub fn descendants(&self, document: &Document) -> Vec<Node> {
        let mut nodes = Vec::new();
        self._descendants(document, &mut nodes);
        nodes
    }

    /// Position among its parent's children.
    pub fn index_in_parent(&self, document: &Document) -> Option<usize> {
        let parent = self.parent(document)?;
        parent.children(document).iter().position(|n| n == self)
    }

    fn build_text_content(&self, document: &Document, buf: &mut String) {
        match self.kind(document) {
            NodeKind::Text(text) | NodeKind::CData(text) => buf.push_str(text),
            NodeKind::Element { .. } | NodeKind::Document => {
                for child in self.children(document) {
                    child.build_text_content(document, buf);
                }
            }
            _ => {}
        }
    }

    /// Text nodes and CDATA under this node concatenated.
    /// For comments, PIs and doctypes, their own content.
    ///
    /// Implementation of [Node.textContent](https://developer.mozilla.org/en-US/docs/Web/API/Node/textContent)
    pub fn text_content(&self, document: &Document) -> String {
        match self.kind(document) {
            NodeKind::Comment(text) | NodeKind::PI(text) | NodeKind::DocType(text) => {
                text.clone()
            }
            _ => {
                let mut buf = String::new();
                self.build_text_content(document, &mut buf);
                buf
            }
        }
    }

    /// Replaces the value of this node.
    ///
    /// An element loses all of its children and gets a single text node instead.
    /// Other nodes have their content replaced.
    ///
    /// # Errors
    ///
    /// - [`Error::Invariant`]: Called on the document node.
    pub fn set_text_content<S: Into<String>>(&self, document: &mut Document, text: S) -> Result<()> {
        let text = text.into();
        match &mut self.mut_data(document).kind {
            NodeKind::Document => {
                return Err(Error::Invariant(
                    "Cannot replace the content of the document node".to_string(),
                ))
            }
            NodeKind::Element { .. } => {}
            NodeKind::Text(content)
            | NodeKind::CData(content)
            | NodeKind::Comment(content)
            | NodeKind::PI(content)
            | NodeKind::DocType(content) => {
                *content = text;
                return Ok(());
            }
        }
        let old = std::mem::take(&mut self.mut_data(document).children);
        for child in old {
            child.mut_data(document).parent = None;
        }
        if !text.is_empty() {
            let node = document.create_text(text);
            self.push_child(document, node)?;
        }
        Ok(())
    }

    /// Checks that `child` can be appended to this node, without changing anything.
    pub(crate) fn check_push_child(&self, document: &Document, child: Node) -> Result<()> {
        if let NodeKind::Document = child.kind(document) {
            return Err(Error::Invariant(
                "The document node cannot have a parent".to_string(),
            ));
        }
        if child.has_parent(document) {
            return Err(Error::Invariant(
                "Node already has a parent. Call detach() before changing parent.".to_string(),
            ));
        }
        match self.kind(document) {
            NodeKind::Element { .. } => Ok(()),
            NodeKind::Document => match child.kind(document) {
                NodeKind::Element { .. } if document.root_element().is_some() => Err(
                    Error::Invariant("Document already has a root element".to_string()),
                ),
                NodeKind::Text(_) | NodeKind::CData(_) => Err(Error::Invariant(
                    "Text cannot be placed outside of the root element".to_string(),
                )),
                _ => Ok(()),
            },
            _ => Err(Error::Invariant(
                "Only elements and the document node can have children".to_string(),
            )),
        }
    }

    /// Equivalent to `vec.push()`.
    ///
    /// # Errors
    ///
    /// - [`Error::Invariant`]: `child` already has a parent, this node can't have
    ///   children, or the document node would end up with two root elements.
    pub fn push_child(&self, document: &mut Document, child: Node) -> Result<()> {
        self.check_push_child(document, child)?;
        child.mut_data(document).parent = Some(*self);
        self.mut_data(document).children.push(child);
        Ok(())
    }

    /// Removes this node from its parent.
    ///
    /// # Errors
    ///
    /// - [`Error::Invariant`]: Called on the document node, or on a node without a parent.
    pub fn detach(&self, document: &mut Document) -> Result<()> {
        if self.is_container() {
            return Err(Error::Invariant(
                "The document node cannot be detached".to_string(),
            ));
        }
        let parent = self
            .parent(document)
            .ok_or_else(|| Error::Invariant("Node has no parent".to_string()))?;
        parent.mut_data(document).children.retain(|n| n != self);
        self.mut_data(document).parent = None;
        Ok(())
    }

    /// Walks up to the topmost ancestor, recording the child index taken at each level.
    /// Indexes start at 1 so that attributes (0) sort before children.
    ///
    /// `positions` caches sibling indexes. The first lookup under a parent records all of its
    /// children, so sorting many siblings scans each parent once.
    pub(crate) fn order_key(
        &self,
        document: &Document,
        positions: &mut HashMap<Node, usize>,
    ) -> Vec<usize> {
        let mut key = Vec::new();
        let mut node = *self;
        while let Some(parent) = node.parent(document) {
            let idx = match positions.get(&node) {
                Some(idx) => *idx,
                None => {
                    for (i, sibling) in parent.children(document).iter().enumerate() {
                        positions.insert(*sibling, i);
                    }
                    positions.get(&node).copied().unwrap_or_default()
                }
            };
            key.push(idx + 1);
            node = parent;
        }
        key.reverse();
        key
    }
}
