use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;
use xml_session::{Document, Error, Node, NodeKind, ReadOptions, WriteOptions};

#[derive(Clone)]
struct TStr(pub String);

impl PartialEq<Self> for TStr {
    fn eq(&self, other: &Self) -> bool {
        self.0.trim() == other.0.trim()
    }
}

impl fmt::Debug for TStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\n{}\n", self.0.trim())
    }
}

fn to_yaml(doc: &Document) -> String {
    render_document(doc, false)
}

// Whitespace-only text left out, as indenting adds it around element content.
fn to_yaml_without_layout(doc: &Document) -> String {
    render_document(doc, true)
}

fn render_document(doc: &Document, skip_layout: bool) -> String {
    let mut buf = String::new();
    let mut depth: usize = 0;
    write_line("Root:", depth, &mut buf);
    depth += 1;
    let container = doc.container();
    render_nodes(doc, container.children(doc), depth, skip_layout, &mut buf);
    buf
}

fn escape_newlines(text: &str) -> String {
    text.replace('\n', r"\n").replace('\r', r"\r")
}

fn render_nodes(
    doc: &Document,
    nodes: &[Node],
    depth: usize,
    skip_layout: bool,
    buf: &mut String,
) {
    for node in nodes {
        match node.kind(doc) {
            NodeKind::Element { name, attributes } => {
                render_element(doc, *node, name, attributes, depth, skip_layout, buf)
            }
            NodeKind::Text(text) if skip_layout && text.trim().is_empty() => {}
            NodeKind::Text(text) => {
                write_line(&format!("- Text: \"{}\"", escape_newlines(text)), depth, buf)
            }
            NodeKind::Comment(text) => write_line(
                &format!("- Comment: \"{}\"", escape_newlines(text)),
                depth,
                buf,
            ),
            NodeKind::CData(text) => {
                write_line(&format!("- CData: \"{}\"", escape_newlines(text)), depth, buf)
            }
            NodeKind::DocType(text) => write_line(
                &format!("- DocType: \"{}\"", escape_newlines(text)),
                depth,
                buf,
            ),
            NodeKind::PI(text) => {
                write_line(&format!("- PI: \"{}\"", escape_newlines(text)), depth, buf)
            }
            NodeKind::Document => unreachable!("document node is never a child"),
        }
    }
}

fn render_element(
    doc: &Document,
    elem: Node,
    name: &str,
    attrs: &HashMap<String, String>,
    mut depth: usize,
    skip_layout: bool,
    buf: &mut String,
) {
    write_line("- Element:", depth, buf);
    depth += 2;

    write_line(&format!("name: {}", name), depth, buf);

    if !attrs.is_empty() {
        write_line("attributes:", depth, buf);
        write_hashmap_alphabetical(attrs, depth, buf);
    }

    let mut inner = String::new();
    render_nodes(doc, elem.children(doc), depth + 1, skip_layout, &mut inner);
    if !inner.is_empty() {
        write_line("children:", depth, buf);
        buf.push_str(&inner);
    }
}

fn write_hashmap_alphabetical(map: &HashMap<String, String>, depth: usize, buf: &mut String) {
    let mut entries = Vec::new();
    for (key, val) in map.iter() {
        entries.push((key, val))
    }
    entries.sort_by_key(|x| x.0);
    for entry in entries {
        write_line(&format!("{}: \"{}\"", entry.0, entry.1), depth + 1, buf);
    }
}

fn write_line(text: &str, depth: usize, buf: &mut String) {
    let indent = " ".repeat(depth * 2);
    writeln!(buf, "{}{}", indent, text).unwrap();
}

// main test functions
//////////////////////

const NODES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE note>
<!-- before root -->
<note importance="high" logged="true"><to>Tove &amp; Jani</to><from/><body>Don't forget <b>me</b> this weekend!</body><empty></empty><![CDATA[<raw> & text]]><?render fast?></note>
"#;

const NODES_YAML: &str = r#"
Root:
  - DocType: "note"
  - Comment: " before root "
  - Element:
      name: note
      attributes:
        importance: "high"
        logged: "true"
      children:
        - Element:
            name: to
            children:
              - Text: "Tove & Jani"
        - Element:
            name: from
        - Element:
            name: body
            children:
              - Text: "Don't forget "
              - Element:
                  name: b
                  children:
                    - Text: "me"
              - Text: " this weekend!"
        - Element:
            name: empty
        - CData: "<raw> & text"
        - PI: "render fast"
"#;

const NODES_EMPTY_TEXT_YAML: &str = r#"
Root:
  - DocType: "note"
  - Comment: " before root "
  - Element:
      name: note
      attributes:
        importance: "high"
        logged: "true"
      children:
        - Element:
            name: to
            children:
              - Text: "Tove & Jani"
        - Element:
            name: from
        - Element:
            name: body
            children:
              - Text: "Don't forget "
              - Element:
                  name: b
                  children:
                    - Text: "me"
              - Text: " this weekend!"
        - Element:
            name: empty
            children:
              - Text: ""
        - CData: "<raw> & text"
        - PI: "render fast"
"#;

// read(write(doc)) should be doc, whatever the options.
// Indented output only differs in whitespace-only text.
fn test_write(doc: &Document, read_opts: &ReadOptions, write_opts: &WriteOptions) -> TStr {
    let render: fn(&Document) -> String = if write_opts.indent_size == 0 {
        to_yaml
    } else {
        to_yaml_without_layout
    };
    let expected = TStr(render(doc));
    let written_xml = doc.write_str_with_opts(write_opts).unwrap();
    let new_doc = Document::parse_str_with_opts(&written_xml, read_opts.clone()).unwrap();
    let result = TStr(render(&new_doc));
    assert!(
        expected == result,
        "\nwritten:\n{}\n===expected==={:?}\n===result==={:?}\nWRITING\n",
        written_xml,
        expected,
        result,
    );
    expected
}

fn read_result(xml: &str, read_opts: &ReadOptions) -> TStr {
    match Document::parse_str_with_opts(xml, read_opts.clone()) {
        Ok(doc) => TStr(to_yaml(&doc)),
        Err(error) => {
            let debug_str = format!("{:?}", error);
            let variant_name = debug_str.split('(').next().unwrap();
            TStr(format!("error: {}", variant_name))
        }
    }
}

fn test<F>(xml: &str, expected: F)
where
    F: Fn(&ReadOptions) -> &'static str,
{
    let empty_text_node = [true, false];
    let require_decl = [true, false];
    let indent_size = [0usize, 2, 4];

    for (etn, decl, indent) in empty_text_node
        .iter()
        .cartesian_product(require_decl.iter())
        .cartesian_product(indent_size.iter())
        .map(|((a, b), c)| (a, b, c))
    {
        let read_opts = ReadOptions {
            empty_text_node: *etn,
            require_decl: *decl,
            trim_text: false,
        };
        let write_opts = WriteOptions {
            indent_char: b' ',
            indent_size: *indent,
        };
        let expected = TStr(expected(&read_opts).to_string());
        let result = read_result(xml, &read_opts);
        assert!(
            expected == result,
            "\noptions: {:?}\n===expected==={:?}===result==={:?}\nREADING\n",
            read_opts,
            expected,
            result,
        );
        if let Ok(doc) = Document::parse_str_with_opts(xml, read_opts.clone()) {
            test_write(&doc, &read_opts, &write_opts);
        }
    }
}

#[test]
fn nodes() {
    test(NODES_XML, |opts| {
        if opts.empty_text_node {
            NODES_EMPTY_TEXT_YAML
        } else {
            NODES_YAML
        }
    })
}

#[test]
fn no_declaration() {
    test("<a><b x=\"1\"/></a>", |opts| {
        if opts.require_decl {
            "error: Parse"
        } else {
            "Root:\n  - Element:\n      name: a\n      children:\n        - Element:\n            name: b\n            attributes:\n              x: \"1\""
        }
    })
}

const LAYOUT_XML: &str = "<list>\n  <item> one </item>\n  <item/>\n</list>";

const LAYOUT_YAML: &str = r#"
Root:
  - Element:
      name: list
      children:
        - Text: "\n  "
        - Element:
            name: item
            children:
              - Text: " one "
        - Text: "\n  "
        - Element:
            name: item
        - Text: "\n"
"#;

const LAYOUT_TRIMMED_YAML: &str = r#"
Root:
  - Element:
      name: list
      children:
        - Element:
            name: item
            children:
              - Text: "one"
        - Element:
            name: item
"#;

#[test]
fn layout_text() {
    let verbatim = ReadOptions::default();
    assert_eq!(read_result(LAYOUT_XML, &verbatim), TStr(LAYOUT_YAML.to_string()));
    let trimmed = ReadOptions {
        trim_text: true,
        ..ReadOptions::default()
    };
    assert_eq!(
        read_result(LAYOUT_XML, &trimmed),
        TStr(LAYOUT_TRIMMED_YAML.to_string())
    );

    // existing layout is text, so indenting leaves it alone
    let doc = Document::parse_str(LAYOUT_XML).unwrap();
    let opts = WriteOptions {
        indent_char: b' ',
        indent_size: 4,
    };
    assert_eq!(doc.write_node_str(doc.container(), &opts).unwrap(), LAYOUT_XML);
    // trimmed, the list holds only elements and gets indented
    let doc = Document::parse_str_with_opts(LAYOUT_XML, trimmed).unwrap();
    assert_eq!(
        doc.write_node_str(doc.container(), &opts).unwrap(),
        "<list>\n    <item>one</item>\n    <item/>\n</list>"
    );
}

#[test]
fn not_well_formed() {
    for xml in [
        "<?xml version=\"1.0\"?><a><b></a>",
        "<?xml version=\"1.0\"?><a></a><b></b>",
        "<?xml version=\"1.0\"?><a>",
        "<?xml version=\"1.0\"?>",
    ] {
        assert!(
            matches!(Document::parse_str(xml), Err(Error::Parse(_))),
            "{} should not parse",
            xml
        );
    }
}

// Structure as an independent parser sees it, text included as written.
fn roxml_yaml(xml: &str) -> TStr {
    fn render(node: roxmltree::Node, depth: usize, buf: &mut String) {
        for child in node.children() {
            if child.is_element() {
                write_line("- Element:", depth, buf);
                write_line(&format!("name: {}", child.tag_name().name()), depth + 2, buf);
                let mut attrs: Vec<(&str, &str)> = child
                    .attributes()
                    .iter()
                    .map(|a| (a.name(), a.value()))
                    .collect();
                if !attrs.is_empty() {
                    attrs.sort();
                    write_line("attributes:", depth + 2, buf);
                    for (k, v) in attrs {
                        write_line(&format!("{}: \"{}\"", k, v), depth + 3, buf);
                    }
                }
                if child.has_children() {
                    let mut inner = String::new();
                    render(child, depth + 3, &mut inner);
                    if !inner.is_empty() {
                        write_line("children:", depth + 2, buf);
                        buf.push_str(&inner);
                    }
                }
            } else if child.is_text() {
                let text = child.text().unwrap_or_default();
                write_line(&format!("- Text: \"{}\"", escape_newlines(text)), depth, buf);
            } else if child.is_comment() {
                let text = child.text().unwrap_or_default();
                write_line(&format!("- Comment: \"{}\"", escape_newlines(text)), depth, buf);
            } else if let Some(pi) = child.pi() {
                let content = match pi.value {
                    Some(value) => format!("{} {}", pi.target, value),
                    None => pi.target.to_string(),
                };
                write_line(&format!("- PI: \"{}\"", content), depth, buf);
            }
        }
    }
    let doc = roxmltree::Document::parse(xml).unwrap();
    let mut buf = String::new();
    write_line("Root:", 0, &mut buf);
    render(doc.root(), 1, &mut buf);
    TStr(buf)
}

const CATALOG_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<?xml-stylesheet href="catalog.xsl"?>
<catalog>
    <!-- books -->
    <book id="bk101" lang="en">
        <author>Gambardella, Matthew</author>
        <title>XML &lt;Developer&gt;'s Guide</title>
        <price currency="USD">44.95</price>
    </book>
    <book id="bk102">
        <author>Ralls, Kim</author>
        <title>Midnight Rain</title>
        <description>A former architect battles corporate zombies, &quot;an evil sorceress&quot; &amp; her own childhood.</description>
    </book>
    <shelf/>
</catalog>"#;

#[test]
fn round_trip_matches_independent_parser() {
    let original = roxml_yaml(CATALOG_XML);
    let doc = Document::parse_str(CATALOG_XML).unwrap();
    assert_eq!(TStr(to_yaml(&doc)), original);

    for indent_size in [0, 4] {
        let opts = WriteOptions {
            indent_char: b' ',
            indent_size,
        };
        let written = doc.write_str_with_opts(&opts).unwrap();
        assert_eq!(roxml_yaml(&written), original, "written:\n{}", written);
    }
}
