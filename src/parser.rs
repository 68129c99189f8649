use crate::document::Document;
use crate::error::{Error, Result};
use crate::node::{Node, NodeKind};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;

/// Options when parsing xml.
///
/// `empty_text_node`: `<tag></tag>` gets an empty text node as its child, while `<tag />` doesn't.
///
/// `require_decl`: Fail with [`Error::Parse`] if the document doesn't start with an xml declaration.
///
/// `trim_text`: Trim whitespace around text and drop whitespace-only text.
/// Off by default, so text is kept as written and saving reproduces the layout of the file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadOptions {
    pub empty_text_node: bool,
    pub require_decl: bool,
    pub trim_text: bool,
}

pub(crate) struct DocumentParser {
    document: Document,
    read_opts: ReadOptions,
}

impl DocumentParser {
    fn new(opts: ReadOptions) -> DocumentParser {
        DocumentParser {
            document: Document::new(),
            read_opts: opts,
        }
    }

    pub(crate) fn parse_reader<R: Read>(mut reader: R, opts: ReadOptions) -> Result<Document> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::parse_bytes(&bytes, opts)
    }

    pub(crate) fn parse_bytes(bytes: &[u8], opts: ReadOptions) -> Result<Document> {
        let text = decode(bytes)?;
        let mut parser = DocumentParser::new(opts);
        parser.parse_content(Reader::from_str(&text))?;
        tracing::trace!(nodes = parser.document.node_count(), "parsed document");
        Ok(parser.document)
    }

    fn handle_decl(&mut self, ev: &BytesDecl) -> Result<()> {
        self.document.version = String::from_utf8(ev.version()?.to_vec())?;
        self.document.standalone = match ev.standalone() {
            Some(res) => {
                let val = std::str::from_utf8(&*res?)?.to_lowercase();
                if val == "yes" {
                    Some(true)
                } else if val == "no" {
                    Some(false)
                } else {
                    return Err(Error::Parse(
                        "Standalone Document Declaration has non boolean value".to_string(),
                    ));
                }
            }
            None => None,
        };
        Ok(())
    }

    fn handle_bytes_start(&mut self, element_stack: &[Node], ev: &BytesStart) -> Result<Node> {
        let mut attributes = HashMap::new();
        for attr in ev.attributes() {
            let attr = attr?;
            let key = String::from_utf8(attr.key.to_vec())?;
            let value = String::from_utf8(attr.unescaped_value()?.to_vec())?;
            attributes.insert(key, value);
        }
        let name = String::from_utf8(ev.name().to_vec())?;
        let element = Node::new_in(&mut self.document, NodeKind::Element { name, attributes });
        self.push_node(element_stack, element)?;
        Ok(element)
    }

    // Tree errors while reading mean the input itself is not well-formed.
    fn push_node(&mut self, element_stack: &[Node], node: Node) -> Result<()> {
        let parent = *element_stack
            .last()
            .ok_or_else(|| Error::Parse("Closing tag without opening tag".to_string()))?;
        parent
            .push_child(&mut self.document, node)
            .map_err(|err| match err {
                Error::Invariant(msg) => Error::Parse(msg),
                err => err,
            })
    }

    fn push_raw(&mut self, element_stack: &[Node], kind: NodeKind) -> Result<()> {
        let node = Node::new_in(&mut self.document, kind);
        self.push_node(element_stack, node)
    }

    // Returns if document parsing is finished.
    fn handle_event(&mut self, element_stack: &mut Vec<Node>, event: Event) -> Result<bool> {
        match event {
            Event::Start(ref ev) => {
                let element = self.handle_bytes_start(element_stack, ev)?;
                element_stack.push(element);
            }
            Event::End(_) => {
                if element_stack.len() <= 1 {
                    return Err(Error::Parse(
                        "Closing tag without opening tag".to_string(),
                    ));
                }
                // quick-xml checks if tag names match for us
                if let Some(elem) = element_stack.pop() {
                    // distinguish <tag></tag> and <tag />
                    if self.read_opts.empty_text_node && !elem.has_children(&self.document) {
                        self.push_raw(&[elem], NodeKind::Text(String::new()))?;
                    }
                }
            }
            Event::Empty(ref ev) => {
                self.handle_bytes_start(element_stack, ev)?;
            }
            Event::Text(ev) => {
                let mut content = String::from_utf8(ev.unescaped()?.to_vec())?;
                if self.read_opts.trim_text {
                    content = content.trim().to_string();
                }
                // whitespace between top level nodes has nowhere to go
                let top_level = element_stack.len() == 1;
                if content.is_empty() || (top_level && content.trim().is_empty()) {
                    return Ok(false);
                }
                self.push_raw(element_stack, NodeKind::Text(content))?;
            }
            Event::DocType(ev) => {
                let content = String::from_utf8(ev.to_vec())?;
                self.push_raw(element_stack, NodeKind::DocType(content.trim().to_string()))?;
            }
            // Comment and PI content is not escaped.
            Event::Comment(ev) => {
                let content = String::from_utf8(ev.to_vec())?;
                self.push_raw(element_stack, NodeKind::Comment(content))?;
            }
            // the reader hands CDATA over escaped
            Event::CData(ev) => {
                let content = String::from_utf8(ev.unescaped()?.to_vec())?;
                self.push_raw(element_stack, NodeKind::CData(content))?;
            }
            Event::PI(ev) => {
                let content = String::from_utf8(ev.to_vec())?;
                self.push_raw(element_stack, NodeKind::PI(content))?;
            }
            Event::Decl(ev) => {
                self.handle_decl(&ev)?;
            }
            Event::Eof => {
                if element_stack.len() > 1 {
                    return Err(Error::Parse(format!(
                        "Unclosed tag <{}>",
                        element_stack
                            .last()
                            .and_then(|e| e.name(&self.document))
                            .unwrap_or_default()
                    )));
                }
                if self.document.root_element().is_none() {
                    return Err(Error::Parse("Document has no root element".to_string()));
                }
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn parse_content(&mut self, mut reader: Reader<&[u8]>) -> Result<()> {
        let mut buf = Vec::with_capacity(200); // reduce time increasing capacity at start.
        let mut element_stack: Vec<Node> = vec![self.document.container()];
        let mut first = true;

        loop {
            buf.clear();
            let ev = reader.read_event(&mut buf)?;
            // untrimmed, the reader reports an empty text before every tag
            if let Event::Text(ref text) = ev {
                if text.is_empty() {
                    continue;
                }
            }
            if first && self.read_opts.require_decl && !matches!(ev, Event::Decl(_)) {
                return Err(Error::Parse(
                    "Didn't find XML Declaration at the start of file".to_string(),
                ));
            }
            first = false;
            if self.handle_event(&mut element_stack, ev)? {
                return Ok(());
            }
        }
    }
}

/// Decodes raw bytes to UTF-8, looking at the BOM first and the xml declaration second.
fn decode(bytes: &[u8]) -> Result<Cow<'_, str>> {
    let (init_encoding, bom_len) = match Encoding::for_bom(bytes) {
        Some((encoding, len)) => (Some(encoding), len),
        None => match bytes {
            [0x00, 0x3c, 0x00, 0x3f, ..] => (Some(UTF_16BE), 0),
            [0x3c, 0x00, 0x3f, 0x00, ..] => (Some(UTF_16LE), 0),
            _ => (None, 0),
        },
    };
    let body = &bytes[bom_len..];
    // a BOM wins over whatever the declaration says
    let encoding = match init_encoding {
        Some(encoding) => encoding,
        None => match declared_encoding(body)? {
            Some(label) => Encoding::for_label(label.as_bytes())
                .ok_or_else(|| Error::Parse(format!("Unknown encoding {:?}", label)))?,
            None => UTF_8,
        },
    };
    // Encoding::for_label("UTF-16") defaults to UTF-16 LE, but ascii compatible bytes can't be UTF-16.
    let encoding = if (encoding == UTF_16LE || encoding == UTF_16BE) && init_encoding.is_none() {
        UTF_8
    } else {
        encoding
    };
    tracing::trace!(encoding = encoding.name(), "decoding xml");
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| Error::Parse(format!("Content is not valid {}", encoding.name())))
}

// Reads only the xml declaration, which is ascii in every ascii compatible encoding.
fn declared_encoding(bytes: &[u8]) -> Result<Option<String>> {
    if !bytes.starts_with(b"<?xml") {
        return Ok(None);
    }
    let end = match bytes.windows(2).position(|w| w == b"?>") {
        Some(pos) => pos + 2,
        None => return Err(Error::Parse("Unterminated XML Declaration".to_string())),
    };
    let mut reader = Reader::from_reader(&bytes[..end]);
    reader.trim_text(true);
    let mut buf = Vec::new();
    match reader.read_event(&mut buf)? {
        Event::Decl(ev) => match ev.encoding() {
            Some(res) => Ok(Some(String::from_utf8(res?.to_vec())?)),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}
