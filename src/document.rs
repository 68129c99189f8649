use crate::error::Result;
use crate::node::{Node, NodeData, NodeKind};
use crate::parser::{DocumentParser, ReadOptions};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::str::FromStr;

/// Options when writing xml.
///
/// With `indent_size` above 0, children of elements holding only other elements go on
/// their own indented lines. Elements with text are written as they are.
/// The default of 0 writes the tree exactly as it is in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub indent_char: u8,
    pub indent_size: usize,
}

impl Default for WriteOptions {
    fn default() -> WriteOptions {
        WriteOptions {
            indent_char: b' ',
            indent_size: 0,
        }
    }
}

/// Represents a XML document.
///
/// All nodes live in an arena owned by the document, and [`Node`] is an index into it.
/// The document node ([`Document::container()`]) sits above the root element.
///
/// # Examples
/// ```
/// use xml_session::Document;
/// use std::str::FromStr;
///
/// let mut doc = Document::from_str(r#"<?xml version="1.0" encoding="UTF-8"?>
/// <package>
///     <metadata>
///         <author>Lewis Carol</author>
///     </metadata>
/// </package>
/// "#).unwrap();
/// let metadata = doc.root_element().unwrap().child_elements(&doc)[0];
/// let author = metadata.child_elements(&doc)[0];
/// author.set_text_content(&mut doc, "Lewis Carroll").unwrap();
/// assert!(doc.write_str().unwrap().contains("<author>Lewis Carroll</author>"));
/// ```
#[derive(Debug)]
pub struct Document {
    pub(crate) store: Vec<NodeData>,
    container: Node,

    pub(crate) version: String,
    pub(crate) standalone: Option<bool>,
}

impl Document {
    /// Create a blank new xml document, version 1.0.
    pub fn new() -> Document {
        let (container, container_data) = Node::container();
        Document {
            store: vec![container_data],
            container,
            version: "1.0".to_string(),
            standalone: None,
        }
    }

    /// The document node. Its children are the root element and top level
    /// comments, PIs and doctype.
    pub fn container(&self) -> Node {
        self.container
    }

    pub fn is_empty(&self) -> bool {
        !self.container.has_children(self)
    }

    /// Get the root element of document.
    pub fn root_element(&self) -> Option<Node> {
        self.container
            .children(self)
            .iter()
            .find(|node| node.is_element(self))
            .copied()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Number of nodes ever created in this document, including removed ones.
    pub fn node_count(&self) -> usize {
        self.store.len()
    }

    /// Create a new element without a parent. Use [`Node::push_child()`] to place it.
    pub fn create_element<S: Into<String>>(&mut self, name: S) -> Node {
        Node::new_in(
            self,
            NodeKind::Element {
                name: name.into(),
                attributes: HashMap::new(),
            },
        )
    }

    /// Create a new text node without a parent.
    pub fn create_text<S: Into<String>>(&mut self, text: S) -> Node {
        Node::new_in(self, NodeKind::Text(text.into()))
    }

    /// Create any kind of node without a parent.
    /// A [`NodeKind::Document`] node can never be placed in the tree.
    pub fn create_node(&mut self, kind: NodeKind) -> Node {
        Node::new_in(self, kind)
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

// Read and write
impl Document {
    /// Parses xml string.
    ///
    /// # Errors
    ///
    /// - [`Error::Parse`]: Could not read XML.
    ///
    /// [`Error::Parse`]: crate::Error::Parse
    pub fn parse_str(str: &str) -> Result<Document> {
        DocumentParser::parse_bytes(str.as_bytes(), ReadOptions::default())
    }

    pub fn parse_str_with_opts(str: &str, opts: ReadOptions) -> Result<Document> {
        DocumentParser::parse_bytes(str.as_bytes(), opts)
    }

    /// Parses xml from reader. The content is decoded to UTF-8 first,
    /// looking at the byte order mark and the xml declaration.
    ///
    /// # Errors
    ///
    /// - [`Error::Parse`]: Could not decode or read XML.
    /// - [`Error::Io`]: IO Error
    ///
    /// [`Error::Parse`]: crate::Error::Parse
    /// [`Error::Io`]: crate::Error::Io
    pub fn parse_reader<R: Read>(reader: R) -> Result<Document> {
        DocumentParser::parse_reader(reader, ReadOptions::default())
    }

    pub fn parse_reader_with_opts<R: Read>(reader: R, opts: ReadOptions) -> Result<Document> {
        DocumentParser::parse_reader(reader, opts)
    }

    /// Writes document as xml string.
    pub fn write_str(&self) -> Result<String> {
        self.write_str_with_opts(&WriteOptions::default())
    }

    pub fn write_str_with_opts(&self, opts: &WriteOptions) -> Result<String> {
        let mut buf: Vec<u8> = Vec::with_capacity(200);
        self.write_with_opts(&mut buf, opts)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Writes a single node and everything under it, without the xml declaration.
    /// Passing [`Document::container()`] writes every top level node.
    pub fn write_node_str(&self, node: Node, opts: &WriteOptions) -> Result<String> {
        let mut buf: Vec<u8> = Vec::with_capacity(200);
        let mut writer = Writer::new(&mut buf);
        if node.is_container() {
            self.write_top_level(&mut writer, opts, false)?;
        } else {
            self.write_node(&mut writer, node, opts, 0)?;
        }
        Ok(String::from_utf8(buf)?)
    }

    /// Write document to writer. Will be written in UTF-8.
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        self.write_with_opts(writer, &WriteOptions::default())
    }

    pub fn write_with_opts(&self, writer: &mut impl Write, opts: &WriteOptions) -> Result<()> {
        let mut writer = Writer::new(writer);
        self.write_decl(&mut writer)?;
        self.write_top_level(&mut writer, opts, true)?;
        writer.write_event(Event::Eof)?;
        Ok(())
    }

    fn write_decl(&self, writer: &mut Writer<impl Write>) -> Result<()> {
        let standalone = self.standalone.map(|yes| match yes {
            true => "yes".as_bytes(),
            false => "no".as_bytes(),
        });
        writer.write_event(Event::Decl(BytesDecl::new(
            self.version.as_bytes(),
            Some("UTF-8".as_bytes()),
            standalone,
        )))?;
        Ok(())
    }

    // Top level nodes go on their own lines.
    fn write_top_level(
        &self,
        writer: &mut Writer<impl Write>,
        opts: &WriteOptions,
        after_decl: bool,
    ) -> Result<()> {
        for (i, child) in self.container().children(self).iter().enumerate() {
            if after_decl || i > 0 {
                writer.write(b"\n")?;
            }
            self.write_node(writer, *child, opts, 0)?;
        }
        Ok(())
    }

    fn write_node(
        &self,
        writer: &mut Writer<impl Write>,
        node: Node,
        opts: &WriteOptions,
        depth: usize,
    ) -> Result<()> {
        match node.kind(self) {
            NodeKind::Document => self.write_top_level(writer, opts, false)?,
            NodeKind::Element { name, attributes } => {
                self.write_element(writer, node, name, attributes, opts, depth)?
            }
            NodeKind::Text(text) => {
                writer.write_event(Event::Text(BytesText::from_plain_str(text)))?;
            }
            // Comment, CData, PI and DocType content is kept raw.
            NodeKind::DocType(text) => {
                let content = format!(" {}", text);
                writer.write_event(Event::DocType(BytesText::from_escaped_str(&content)))?;
            }
            NodeKind::Comment(text) => {
                writer.write_event(Event::Comment(BytesText::from_escaped_str(text)))?;
            }
            NodeKind::CData(text) => {
                writer.write_event(Event::CData(BytesText::from_escaped_str(text)))?;
            }
            NodeKind::PI(text) => {
                writer.write_event(Event::PI(BytesText::from_escaped_str(text)))?;
            }
        };
        Ok(())
    }

    fn write_element(
        &self,
        writer: &mut Writer<impl Write>,
        element: Node,
        name: &str,
        attributes: &HashMap<String, String>,
        opts: &WriteOptions,
        depth: usize,
    ) -> Result<()> {
        let name_bytes = name.as_bytes();
        let mut start = BytesStart::borrowed_name(name_bytes);
        // attributes are unordered in memory; sort them so output is stable
        let mut attrs: Vec<(&String, &String)> = attributes.iter().collect();
        attrs.sort();
        for (key, val) in attrs {
            start.push_attribute((key.as_str(), val.as_str()));
        }
        let children = element.children(self);
        if children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        // Indenting text would change it, so only element content is indented.
        let indent = opts.indent_size > 0
            && !children.iter().any(|child| {
                matches!(child.kind(self), NodeKind::Text(_) | NodeKind::CData(_))
            });
        writer.write_event(Event::Start(start))?;
        for child in children {
            if indent {
                Self::write_line_break(writer, opts, depth + 1)?;
            }
            self.write_node(writer, *child, opts, depth + 1)?;
        }
        if indent {
            Self::write_line_break(writer, opts, depth)?;
        }
        writer.write_event(Event::End(BytesEnd::borrowed(name_bytes)))?;
        Ok(())
    }

    fn write_line_break(
        writer: &mut Writer<impl Write>,
        opts: &WriteOptions,
        depth: usize,
    ) -> Result<()> {
        let mut line = Vec::with_capacity(1 + opts.indent_size * depth);
        line.push(b'\n');
        line.resize(1 + opts.indent_size * depth, opts.indent_char);
        writer.write(&line)?;
        Ok(())
    }
}

impl FromStr for Document {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Document> {
        Document::parse_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_element() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <basic>
            Text
            <c />
        </basic>
        "#;
        let mut document = Document::from_str(xml).unwrap();
        let basic = document.root_element().unwrap();
        let p = document.create_element("p");
        basic.push_child(&mut document, p).unwrap();
        assert_eq!(p.parent(&document).unwrap(), basic);
        assert_eq!(*basic.children(&document).last().unwrap(), p);
    }

    #[test]
    fn test_write_sorted_attributes() {
        let mut doc = Document::new();
        let root = doc.create_element("root");
        doc.container().push_child(&mut doc, root).unwrap();
        root.set_attribute(&mut doc, "b", "2").unwrap();
        root.set_attribute(&mut doc, "a", "<&>").unwrap();
        let inner = doc.create_element("inner");
        root.push_child(&mut doc, inner).unwrap();
        inner.set_text_content(&mut doc, "1 < 2").unwrap();

        let opts = WriteOptions {
            indent_char: b' ',
            indent_size: 4,
        };
        let expected = r#"<?xml version="1.0" encoding="UTF-8"?>
<root a="&lt;&amp;&gt;" b="2">
    <inner>1 &lt; 2</inner>
</root>"#;
        assert_eq!(doc.write_str_with_opts(&opts).unwrap(), expected);
        assert_eq!(
            doc.write_str().unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root a=\"&lt;&amp;&gt;\" b=\"2\"><inner>1 &lt; 2</inner></root>"
        );
    }

    #[test]
    fn test_indent_skips_mixed_content() {
        let xml = "<a><p>Hello <b>world</b>!</p><q><![CDATA[x]]><r/></q><s><t/></s></a>";
        let doc = Document::from_str(xml).unwrap();
        let opts = WriteOptions {
            indent_char: b' ',
            indent_size: 2,
        };
        let expected = "<a>\n  <p>Hello <b>world</b>!</p>\n  <q><![CDATA[x]]><r/></q>\n  <s>\n    <t/>\n  </s>\n</a>";
        assert_eq!(doc.write_node_str(doc.container(), &opts).unwrap(), expected);
    }

    #[test]
    fn test_write_without_indent() {
        let doc = Document::from_str("<a><b>x</b><c/></a>").unwrap();
        let opts = WriteOptions {
            indent_char: b' ',
            indent_size: 0,
        };
        assert_eq!(
            doc.write_str_with_opts(&opts).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a><b>x</b><c/></a>"
        );
        let b = doc.root_element().unwrap().child_elements(&doc)[0];
        assert_eq!(doc.write_node_str(b, &opts).unwrap(), "<b>x</b>");
    }

    #[test]
    fn test_fresh_document() {
        let doc = Document::new();
        assert!(doc.is_empty());
        assert!(doc.root_element().is_none());
        assert_eq!(doc.version(), "1.0");
        assert_eq!(
            doc.write_str().unwrap(),
            r#"<?xml version="1.0" encoding="UTF-8"?>"#
        );
    }
}
