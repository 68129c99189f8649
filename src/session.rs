use crate::document::{Document, WriteOptions};
use crate::error::{Error, Result};
use crate::node::{Node, NodeKind};
use crate::parser::ReadOptions;
use crate::xpath::{NodeRef, QueryEngine, Value, XPathEngine};
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Options for [`DocumentSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Save to the bound path after every successful mutation.
    pub autosave: bool,
    pub read: ReadOptions,
    pub write: WriteOptions,
}

impl Default for SessionOptions {
    fn default() -> SessionOptions {
        SessionOptions {
            autosave: true,
            read: ReadOptions::default(),
            write: WriteOptions::default(),
        }
    }
}

/// An XML document bound to a file, queried and edited through path expressions.
///
/// Every mutating call resolves its expression once, checks that the operation
/// applies to every matched item, then applies it to all of them in document order.
/// If one item cannot take the change, nothing is changed.
///
/// With autosave on, the file is rewritten after every successful mutation.
///
/// # Examples
/// ```no_run
/// use xml_session::DocumentSession;
///
/// let mut session = DocumentSession::open("fruits.xml", true)?;
/// session.replace_value("/document/fruits/fruit", "Kiwi", None)?;
/// let count = session.evaluate("count(//fruit)", None)?;
/// assert_eq!(count.as_number(), Some(3.0));
/// # Ok::<(), xml_session::Error>(())
/// ```
#[derive(Debug)]
pub struct DocumentSession<Q: QueryEngine = XPathEngine> {
    path: PathBuf,
    options: SessionOptions,
    document: Document,
    engine: Q,
}

impl DocumentSession<XPathEngine> {
    /// Opens `path` with default options besides `autosave`.
    ///
    /// A missing file gives an empty document, which is only written once saved.
    ///
    /// # Errors
    ///
    /// - [`Error::Parse`]: The file is not well-formed XML, or not in the encoding it declares.
    /// - [`Error::Io`]: The file exists but can't be read.
    pub fn open<P: AsRef<Path>>(path: P, autosave: bool) -> Result<Self> {
        let options = SessionOptions {
            autosave,
            ..SessionOptions::default()
        };
        Self::open_with(path, options)
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: SessionOptions) -> Result<Self> {
        Self::with_engine(path, options, XPathEngine::new())
    }
}

impl<Q: QueryEngine> DocumentSession<Q> {
    /// Opens `path`, evaluating expressions with `engine`.
    pub fn with_engine<P: AsRef<Path>>(path: P, options: SessionOptions, engine: Q) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let document = match File::open(&path) {
            Ok(file) => {
                let document =
                    Document::parse_reader_with_opts(BufReader::new(file), options.read.clone())?;
                debug!(
                    path = %path.display(),
                    nodes = document.node_count(),
                    "loaded document"
                );
                document
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "file not found, starting a fresh document");
                Document::new()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(DocumentSession {
            path,
            options,
            document,
            engine,
        })
    }

    /// The path [`save()`](Self::save) writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn autosave(&self) -> bool {
        self.options.autosave
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn engine(&self) -> &Q {
        &self.engine
    }

    /// String-value of a matched item: the text content of a node, or the value of an attribute.
    pub fn value(&self, item: &NodeRef) -> String {
        item.string_value(&self.document)
    }

    /// Nodes matching `expression`, in document order.
    /// `root` is the context node, the document node if `None`.
    ///
    /// # Errors
    ///
    /// - [`Error::Query`]: Invalid expression, or it evaluates to something other than nodes.
    pub fn query(&self, expression: &str, root: Option<Node>) -> Result<Vec<NodeRef>> {
        self.evaluate(expression, root)?.into_nodes().ok_or_else(|| {
            Error::Query(format!("{:?} does not evaluate to a node-set", expression))
        })
    }

    /// Evaluates `expression`. The result may be nodes, a number, a string or a boolean.
    pub fn evaluate(&self, expression: &str, root: Option<Node>) -> Result<Value> {
        let scope = self.scope(root)?;
        tracing::trace!(expression, "evaluating");
        self.engine.evaluate(&self.document, expression, scope)
    }

    fn scope(&self, root: Option<Node>) -> Result<Node> {
        match root {
            Some(node) if !node.is_in(&self.document) => Err(Error::Invariant(
                "Scope node does not belong to this document".to_string(),
            )),
            Some(node) => Ok(node),
            None => Ok(self.document.container()),
        }
    }

    /// Replaces the value of every match. Elements lose their children
    /// and get a single text node, attributes and other nodes get new content.
    pub fn replace_value(&mut self, expression: &str, value: &str, root: Option<Node>) -> Result<()> {
        let matched = self.query(expression, root)?;
        for item in &matched {
            if let NodeRef::Node(node) = item {
                if node.is_container() {
                    return Err(Error::Invariant(
                        "Cannot replace the value of the document node".to_string(),
                    ));
                }
            }
        }
        for item in &matched {
            match item {
                NodeRef::Node(node) => node.set_text_content(&mut self.document, value)?,
                NodeRef::Attribute(owner, name) => {
                    owner.set_attribute(&mut self.document, name.as_str(), value)?
                }
            }
        }
        self.finish("replace_value", expression, matched.len())
    }

    /// Appends a new element `name` to every matched element, holding `value` as text if given.
    ///
    /// The document node may be matched while the document has no root element,
    /// which creates it.
    pub fn add_child(
        &mut self,
        expression: &str,
        name: &str,
        value: Option<&str>,
        root: Option<Node>,
    ) -> Result<()> {
        if !Node::is_valid_name(name) {
            return Err(Error::Invariant(format!("Invalid element name {:?}", name)));
        }
        let matched = self.query(expression, root)?;
        let mut parents = Vec::with_capacity(matched.len());
        for item in &matched {
            match item {
                NodeRef::Node(node) if node.is_element(&self.document) => parents.push(*node),
                NodeRef::Node(node) if node.is_container() => {
                    if self.document.root_element().is_some() || matched.len() > 1 {
                        return Err(Error::Invariant(
                            "Document already has a root element".to_string(),
                        ));
                    }
                    parents.push(*node);
                }
                _ => {
                    return Err(Error::Invariant(format!(
                        "Cannot add a child to {}",
                        describe(&self.document, item)
                    )))
                }
            }
        }
        for parent in parents {
            let child = self.document.create_element(name);
            if let Some(value) = value {
                child.set_text_content(&mut self.document, value)?;
            }
            parent.push_child(&mut self.document, child)?;
        }
        self.finish("add_child", expression, matched.len())
    }

    /// Removes every match from the document. Attributes are removed from their element.
    pub fn remove(&mut self, expression: &str, root: Option<Node>) -> Result<()> {
        let matched = self.query(expression, root)?;
        let root_element = self.document.root_element();
        for item in &matched {
            if let NodeRef::Node(node) = item {
                if node.is_container() || Some(*node) == root_element {
                    return Err(Error::Invariant(format!(
                        "Cannot remove {}",
                        describe(&self.document, item)
                    )));
                }
                if !node.has_parent(&self.document) {
                    return Err(Error::Invariant("Node has no parent".to_string()));
                }
            }
        }
        for item in &matched {
            match item {
                NodeRef::Node(node) => node.detach(&mut self.document)?,
                NodeRef::Attribute(owner, name) => {
                    owner.remove_attribute(&mut self.document, name)?;
                }
            }
        }
        self.finish("remove", expression, matched.len())
    }

    /// Sets attribute `name` to `value` on every matched element, overwriting any previous value.
    pub fn set_attribute(
        &mut self,
        expression: &str,
        name: &str,
        value: &str,
        root: Option<Node>,
    ) -> Result<()> {
        if !Node::is_valid_name(name) {
            return Err(Error::Invariant(format!("Invalid attribute name {:?}", name)));
        }
        let elements = self.matched_elements(expression, root, "set an attribute on")?;
        for element in &elements {
            element.set_attribute(&mut self.document, name, value)?;
        }
        self.finish("set_attribute", expression, elements.len())
    }

    /// Removes attribute `name` from every matched element that has it.
    pub fn remove_attribute(&mut self, expression: &str, name: &str, root: Option<Node>) -> Result<()> {
        let elements = self.matched_elements(expression, root, "remove an attribute from")?;
        for element in &elements {
            element.remove_attribute(&mut self.document, name)?;
        }
        self.finish("remove_attribute", expression, elements.len())
    }

    fn matched_elements(
        &self,
        expression: &str,
        root: Option<Node>,
        action: &str,
    ) -> Result<Vec<Node>> {
        self.query(expression, root)?
            .iter()
            .map(|item| match item {
                NodeRef::Node(node) if node.is_element(&self.document) => Ok(*node),
                _ => Err(Error::Invariant(format!(
                    "Cannot {} {}",
                    action,
                    describe(&self.document, item)
                ))),
            })
            .collect()
    }

    fn finish(&self, operation: &str, expression: &str, matched: usize) -> Result<()> {
        debug!(operation, expression, matched, "applied mutation");
        if self.options.autosave {
            self.save()?;
        }
        Ok(())
    }

    /// Writes the document to the bound path, replacing the file atomically.
    pub fn save(&self) -> Result<()> {
        self.write_to(&self.path)
    }

    /// Writes the document to `path`. The session stays bound to its own path.
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_to(path.as_ref())
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        let mut buf: Vec<u8> = Vec::new();
        self.document.write_with_opts(&mut buf, &self.options.write)?;

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&buf)?;
        file.as_file().sync_all()?;
        // temp files are created owner-only; keep the mode of the file being replaced
        if let Ok(metadata) = fs::metadata(path) {
            fs::set_permissions(file.path(), metadata.permissions())?;
        }
        file.persist(path)?;
        debug!(path = %path.display(), bytes = buf.len(), "saved document");
        Ok(())
    }

    /// Serializes the whole document with its xml declaration,
    /// or only the subtree under `root` without one.
    pub fn get_xml(&self, root: Option<Node>) -> Result<String> {
        match self.scope(root)? {
            node if node.is_container() => self.document.write_str_with_opts(&self.options.write),
            node => self.document.write_node_str(node, &self.options.write),
        }
    }
}

fn describe(document: &Document, item: &NodeRef) -> String {
    match item {
        NodeRef::Attribute(_, name) => format!("attribute {:?}", name),
        NodeRef::Node(node) => match node.kind(document) {
            NodeKind::Document => "the document node".to_string(),
            NodeKind::Element { name, .. } => format!("element <{}>", name),
            NodeKind::Text(_) => "a text node".to_string(),
            NodeKind::CData(_) => "a CDATA section".to_string(),
            NodeKind::Comment(_) => "a comment".to_string(),
            NodeKind::PI(_) => "a processing instruction".to_string(),
            NodeKind::DocType(_) => "the doctype".to_string(),
        },
    }
}
