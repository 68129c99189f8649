//! XPath value types
//!
//! XPath 1.0 has four data types: node-set, boolean, number, and string.

use crate::document::Document;
use crate::node::Node;
use std::cmp::Ordering;
use std::collections::HashMap;

/// One item of a match set.
///
/// Attributes are not tree nodes, so they are addressed through the element owning them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Node(Node),
    Attribute(Node, String),
}

impl NodeRef {
    /// The tree node, or `None` for an attribute.
    pub fn node(&self) -> Option<Node> {
        match self {
            NodeRef::Node(node) => Some(*node),
            NodeRef::Attribute(..) => None,
        }
    }

    /// The tree node itself, or the element owning the attribute.
    pub fn owner(&self) -> Node {
        match self {
            NodeRef::Node(node) => *node,
            NodeRef::Attribute(owner, _) => *owner,
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, NodeRef::Attribute(..))
    }

    /// XPath string-value: text content for tree nodes, the value for attributes.
    pub fn string_value(&self, document: &Document) -> String {
        match self {
            NodeRef::Node(node) => node.text_content(document),
            NodeRef::Attribute(owner, name) => owner
                .attribute(document, name)
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Element or attribute name. Empty for other nodes.
    pub fn name<'a>(&'a self, document: &'a Document) -> &'a str {
        match self {
            NodeRef::Node(node) => node.name(document).unwrap_or_default(),
            NodeRef::Attribute(_, name) => name,
        }
    }

    fn order_key<'a>(
        &'a self,
        document: &Document,
        positions: &mut HashMap<Node, usize>,
    ) -> (Vec<usize>, Option<&'a str>) {
        match self {
            NodeRef::Node(node) => (node.order_key(document, positions), None),
            NodeRef::Attribute(owner, name) => {
                let mut key = owner.order_key(document, positions);
                key.push(0);
                (key, Some(name))
            }
        }
    }
}

/// Sorts in document order and removes duplicates.
pub(crate) fn sort_document_order(document: &Document, nodes: &mut Vec<NodeRef>) {
    if nodes.len() > 1 {
        let mut positions = HashMap::new();
        let mut keyed: Vec<_> = nodes
            .drain(..)
            .map(|n| {
                let (key, name) = n.order_key(document, &mut positions);
                let name = name.map(|s| s.to_string());
                (key, name, n)
            })
            .collect();
        keyed.sort_by(|a, b| match a.0.cmp(&b.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            ord => ord,
        });
        nodes.extend(keyed.into_iter().map(|(_, _, n)| n));
        nodes.dedup();
    }
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A set of nodes, in document order without duplicates
    Nodes(Vec<NodeRef>),
    Number(f64),
    String(String),
    Boolean(bool),
}

impl Value {
    pub fn is_nodes(&self) -> bool {
        matches!(self, Value::Nodes(_))
    }

    pub fn as_nodes(&self) -> Option<&[NodeRef]> {
        match self {
            Value::Nodes(nodes) => Some(nodes),
            _ => None,
        }
    }

    pub fn into_nodes(self) -> Option<Vec<NodeRef>> {
        match self {
            Value::Nodes(nodes) => Some(nodes),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert to boolean (XPath boolean() function semantics)
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    /// Convert to number (XPath number() function semantics)
    pub fn to_number(&self, document: &Document) -> f64 {
        match self {
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            _ => parse_number(&self.to_string_value(document)),
        }
    }

    /// Convert to string (XPath string() function semantics)
    ///
    /// A node-set converts to the string-value of its first node.
    pub fn to_string_value(&self, document: &Document) -> String {
        match self {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|n| n.string_value(document))
                .unwrap_or_default(),
            Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
        }
    }
}

pub(crate) fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    // XPath numbers have no exponent, sign prefix other than '-', or inf/nan spelling
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<NodeRef>> for Value {
    fn from(nodes: Vec<NodeRef>) -> Self {
        Value::Nodes(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_boolean_conversion() {
        assert!(!Value::Nodes(vec![]).to_boolean());
        assert!(Value::Boolean(true).to_boolean());
        assert!(Value::Number(1.0).to_boolean());
        assert!(!Value::Number(0.0).to_boolean());
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(Value::String("hello".to_string()).to_boolean());
        assert!(!Value::String(String::new()).to_boolean());
    }

    #[test]
    fn test_number_conversion() {
        let doc = Document::new();
        assert_eq!(Value::Boolean(true).to_number(&doc), 1.0);
        assert_eq!(Value::String(" 42 ".to_string()).to_number(&doc), 42.0);
        assert_eq!(Value::String("-1.5".to_string()).to_number(&doc), -1.5);
        assert!(Value::String("abc".to_string()).to_number(&doc).is_nan());
        assert!(Value::String("1e3".to_string()).to_number(&doc).is_nan());
        assert!(Value::Nodes(vec![]).to_number(&doc).is_nan());
    }

    #[test]
    fn test_string_conversion() {
        let doc = Document::new();
        assert_eq!(Value::Boolean(false).to_string_value(&doc), "false");
        assert_eq!(Value::Number(42.0).to_string_value(&doc), "42");
        assert_eq!(Value::Number(3.25).to_string_value(&doc), "3.25");
        assert_eq!(Value::Number(f64::NAN).to_string_value(&doc), "NaN");
        assert_eq!(Value::Number(f64::NEG_INFINITY).to_string_value(&doc), "-Infinity");
    }

    #[test]
    fn test_sort_document_order() {
        let doc = Document::from_str(r#"<a x="1"><b y="2"/><c/></a>"#).unwrap();
        let a = doc.root_element().unwrap();
        let b = a.child_elements(&doc)[0];
        let c = a.child_elements(&doc)[1];
        let mut nodes = vec![
            NodeRef::Node(c),
            NodeRef::Attribute(b, "y".to_string()),
            NodeRef::Node(b),
            NodeRef::Node(a),
            NodeRef::Attribute(a, "x".to_string()),
            NodeRef::Node(c),
        ];
        sort_document_order(&doc, &mut nodes);
        assert_eq!(
            nodes,
            vec![
                NodeRef::Node(a),
                NodeRef::Attribute(a, "x".to_string()),
                NodeRef::Node(b),
                NodeRef::Attribute(b, "y".to_string()),
                NodeRef::Node(c),
            ]
        );
    }

    #[test]
    fn test_sort_wide_siblings() {
        let mut xml = String::from("<r><a>");
        for i in 0..2000 {
            xml.push_str(&format!("<x n=\"{}\"/>", i));
        }
        xml.push_str("</a><b><y/><y/></b></r>");
        let doc = Document::from_str(&xml).unwrap();
        let parents = doc.root_element().unwrap().child_elements(&doc);
        let expected: Vec<NodeRef> = parents[0]
            .children(&doc)
            .iter()
            .chain(parents[1].children(&doc))
            .map(|node| NodeRef::Node(*node))
            .collect();
        let mut nodes = expected.clone();
        nodes.reverse();
        nodes.push(expected[1000].clone());
        sort_document_order(&doc, &mut nodes);
        assert_eq!(nodes, expected);
    }
}
