//! XPath evaluator
//!
//! Walks the AST against the document arena. Node-sets are kept in document order.

use super::parser::{Axis, BinaryOp, Expr, NodeTest, PathStart, Step};
use super::value::{format_number, parse_number, sort_document_order, NodeRef, Value};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::node::{Node, NodeKind};

/// Evaluation context: the context node, its position and the context size.
struct Context<'a> {
    document: &'a Document,
    node: NodeRef,
    position: usize,
    size: usize,
}

impl<'a> Context<'a> {
    fn with_node(&self, node: NodeRef, position: usize, size: usize) -> Context<'a> {
        Context {
            document: self.document,
            node,
            position,
            size,
        }
    }
}

/// Evaluates a compiled expression with `scope` as the context node.
pub(crate) fn evaluate(document: &Document, expr: &Expr, scope: Node) -> Result<Value> {
    let ctx = Context {
        document,
        node: NodeRef::Node(scope),
        position: 1,
        size: 1,
    };
    eval(expr, &ctx)
}

fn eval(expr: &Expr, ctx: &Context) -> Result<Value> {
    match expr {
        Expr::Literal(s) => Ok(Value::String(s.clone())),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Negate(inner) => Ok(Value::Number(-eval(inner, ctx)?.to_number(ctx.document))),
        Expr::Binary(left, op, right) => eval_binary(left, *op, right, ctx),
        Expr::Union(left, right) => {
            let mut nodes = expect_nodes(eval(left, ctx)?, "|")?;
            nodes.extend(expect_nodes(eval(right, ctx)?, "|")?);
            sort_document_order(ctx.document, &mut nodes);
            Ok(Value::Nodes(nodes))
        }
        Expr::Function(name, args) => eval_function(name, args, ctx),
        Expr::Filter(primary, predicates) => {
            let nodes = expect_nodes(eval(primary, ctx)?, "a predicate")?;
            Ok(Value::Nodes(apply_predicates(nodes, predicates, ctx)?))
        }
        Expr::Path(start, steps) => {
            let mut nodes = match start {
                PathStart::Root => vec![NodeRef::Node(tree_root(ctx.document, &ctx.node))],
                PathStart::Context => vec![ctx.node.clone()],
                PathStart::Expr(expr) => expect_nodes(eval(expr, ctx)?, "a path")?,
            };
            for step in steps {
                nodes = eval_step(step, &nodes, ctx)?;
            }
            Ok(Value::Nodes(nodes))
        }
    }
}

fn expect_nodes(value: Value, usage: &str) -> Result<Vec<NodeRef>> {
    value
        .into_nodes()
        .ok_or_else(|| Error::Query(format!("Only node-sets can be used with {}", usage)))
}

// Topmost ancestor of the context node: the document node, unless the context was detached.
fn tree_root(document: &Document, node: &NodeRef) -> Node {
    let mut node = node.owner();
    while let Some(parent) = node.parent(document) {
        node = parent;
    }
    node
}

fn eval_step(step: &Step, input: &[NodeRef], ctx: &Context) -> Result<Vec<NodeRef>> {
    let mut output = Vec::new();
    for node in input {
        let candidates: Vec<NodeRef> = axis_nodes(ctx.document, node, step.axis)
            .into_iter()
            .filter(|n| node_test(ctx.document, n, &step.node_test, step.axis))
            .collect();
        output.extend(apply_predicates(candidates, &step.predicates, ctx)?);
    }
    sort_document_order(ctx.document, &mut output);
    Ok(output)
}

/// Nodes along an axis, in axis order (reverse axes nearest first).
fn axis_nodes(document: &Document, node: &NodeRef, axis: Axis) -> Vec<NodeRef> {
    let tree_node = match node {
        NodeRef::Node(n) => *n,
        NodeRef::Attribute(owner, _) => {
            return match axis {
                Axis::SelfAxis | Axis::DescendantOrSelf => vec![node.clone()],
                Axis::Parent => vec![NodeRef::Node(*owner)],
                Axis::Ancestor | Axis::AncestorOrSelf => {
                    let mut nodes = Vec::new();
                    if axis == Axis::AncestorOrSelf {
                        nodes.push(node.clone());
                    }
                    nodes.push(NodeRef::Node(*owner));
                    nodes.extend(ancestors(document, *owner));
                    nodes
                }
                _ => Vec::new(),
            };
        }
    };
    let wrap = |nodes: Vec<Node>| nodes.into_iter().map(NodeRef::Node).collect::<Vec<_>>();
    match axis {
        Axis::Child => wrap(tree_node.children(document).to_vec()),
        Axis::Descendant => wrap(tree_node.descendants(document)),
        Axis::DescendantOrSelf => {
            let mut nodes = vec![NodeRef::Node(tree_node)];
            nodes.extend(wrap(tree_node.descendants(document)));
            nodes
        }
        Axis::Parent => wrap(tree_node.parent(document).into_iter().collect()),
        Axis::Ancestor => ancestors(document, tree_node),
        Axis::AncestorOrSelf => {
            let mut nodes = vec![NodeRef::Node(tree_node)];
            nodes.extend(ancestors(document, tree_node));
            nodes
        }
        Axis::FollowingSibling | Axis::PrecedingSibling => {
            let (parent, idx) = match (
                tree_node.parent(document),
                tree_node.index_in_parent(document),
            ) {
                (Some(parent), Some(idx)) => (parent, idx),
                _ => return Vec::new(),
            };
            let siblings = parent.children(document);
            if axis == Axis::FollowingSibling {
                wrap(siblings[idx + 1..].to_vec())
            } else {
                wrap(siblings[..idx].iter().rev().copied().collect())
            }
        }
        Axis::SelfAxis => vec![NodeRef::Node(tree_node)],
        Axis::Attribute => match tree_node.attributes(document) {
            Some(attributes) => {
                let mut names: Vec<&String> = attributes.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .map(|name| NodeRef::Attribute(tree_node, name.clone()))
                    .collect()
            }
            None => Vec::new(),
        },
    }
}

fn ancestors(document: &Document, node: Node) -> Vec<NodeRef> {
    let mut nodes = Vec::new();
    let mut current = node.parent(document);
    while let Some(parent) = current {
        nodes.push(NodeRef::Node(parent));
        current = parent.parent(document);
    }
    nodes
}

fn node_test(document: &Document, node: &NodeRef, test: &NodeTest, axis: Axis) -> bool {
    // principal node type is attribute on the attribute axis, element elsewhere
    let principal = match node {
        NodeRef::Attribute(..) => axis == Axis::Attribute,
        NodeRef::Node(n) => axis != Axis::Attribute && n.is_element(document),
    };
    match test {
        NodeTest::Node => true,
        NodeTest::Any => principal,
        NodeTest::Name(name) => principal && node.name(document) == name.as_str(),
        NodeTest::Prefix(prefix) => {
            principal
                && node
                    .name(document)
                    .split_once(':')
                    .map_or(false, |(p, _)| p == prefix)
        }
        NodeTest::Text => matches!(
            node.node().map(|n| n.kind(document)),
            Some(NodeKind::Text(_)) | Some(NodeKind::CData(_))
        ),
        NodeTest::Comment => matches!(
            node.node().map(|n| n.kind(document)),
            Some(NodeKind::Comment(_))
        ),
        NodeTest::PI(target) => match node.node().map(|n| n.kind(document)) {
            Some(NodeKind::PI(content)) => match target {
                Some(target) => content.split_whitespace().next() == Some(target.as_str()),
                None => true,
            },
            _ => false,
        },
    }
}

fn apply_predicates(
    mut nodes: Vec<NodeRef>,
    predicates: &[Expr],
    ctx: &Context,
) -> Result<Vec<NodeRef>> {
    for predicate in predicates {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.into_iter().enumerate() {
            let inner = ctx.with_node(node.clone(), i + 1, size);
            let keep = match eval(predicate, &inner)? {
                Value::Number(n) => n == (i + 1) as f64,
                value => value.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        nodes = kept;
    }
    Ok(nodes)
}

fn eval_binary(left: &Expr, op: BinaryOp, right: &Expr, ctx: &Context) -> Result<Value> {
    let doc = ctx.document;
    match op {
        BinaryOp::Or => Ok(Value::Boolean(
            eval(left, ctx)?.to_boolean() || eval(right, ctx)?.to_boolean(),
        )),
        BinaryOp::And => Ok(Value::Boolean(
            eval(left, ctx)?.to_boolean() && eval(right, ctx)?.to_boolean(),
        )),
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            Ok(Value::Boolean(compare(doc, op, &l, &r)))
        }
        _ => {
            let l = eval(left, ctx)?.to_number(doc);
            let r = eval(right, ctx)?.to_number(doc);
            let n = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                _ => l % r,
            };
            Ok(Value::Number(n))
        }
    }
}

// XPath 1.0 comparison rules: node-sets compare true if any member does.
fn compare(doc: &Document, op: BinaryOp, left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Nodes(a), Value::Nodes(b)) => {
            let right_values: Vec<Value> = b
                .iter()
                .map(|n| Value::String(n.string_value(doc)))
                .collect();
            a.iter().any(|n| {
                let l = Value::String(n.string_value(doc));
                right_values.iter().any(|r| compare_scalars(doc, op, &l, r))
            })
        }
        (Value::Nodes(nodes), scalar) => compare_nodes_scalar(doc, op, nodes, scalar, false),
        (scalar, Value::Nodes(nodes)) => compare_nodes_scalar(doc, op, nodes, scalar, true),
        _ => compare_scalars(doc, op, left, right),
    }
}

fn compare_nodes_scalar(
    doc: &Document,
    op: BinaryOp,
    nodes: &[NodeRef],
    scalar: &Value,
    nodes_on_right: bool,
) -> bool {
    let ordered = |node_value: Value| {
        if nodes_on_right {
            compare_scalars(doc, op, scalar, &node_value)
        } else {
            compare_scalars(doc, op, &node_value, scalar)
        }
    };
    match scalar {
        Value::Boolean(_) => ordered(Value::Boolean(!nodes.is_empty())),
        Value::Number(_) => nodes
            .iter()
            .any(|n| ordered(Value::Number(parse_number(&n.string_value(doc))))),
        _ => nodes
            .iter()
            .any(|n| ordered(Value::String(n.string_value(doc)))),
    }
}

// Neither side is a node-set here.
fn compare_scalars(doc: &Document, op: BinaryOp, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::NotEq => {
            let equal = match (left, right) {
                (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                    left.to_boolean() == right.to_boolean()
                }
                (Value::Number(_), _) | (_, Value::Number(_)) => {
                    left.to_number(doc) == right.to_number(doc)
                }
                _ => left.to_string_value(doc) == right.to_string_value(doc),
            };
            equal == (op == BinaryOp::Eq)
        }
        _ => {
            let (l, r) = (left.to_number(doc), right.to_number(doc));
            match op {
                BinaryOp::Lt => l < r,
                BinaryOp::LtEq => l <= r,
                BinaryOp::Gt => l > r,
                _ => l >= r,
            }
        }
    }
}

fn eval_function(name: &str, args: &[Expr], ctx: &Context) -> Result<Value> {
    let doc = ctx.document;
    let arg = |i: usize| eval(&args[i], ctx);
    // string argument, or the context node's string-value when omitted
    let string_arg = |i: usize| -> Result<String> {
        match args.get(i) {
            Some(expr) => Ok(eval(expr, ctx)?.to_string_value(doc)),
            None => Ok(ctx.node.string_value(doc)),
        }
    };
    let value = match name {
        "last" => Value::Number(ctx.size as f64),
        "position" => Value::Number(ctx.position as f64),
        "count" => Value::Number(expect_nodes(arg(0)?, "count()")?.len() as f64),
        "name" | "local-name" => {
            let node = match args.first() {
                Some(expr) => expect_nodes(eval(expr, ctx)?, "name()")?.into_iter().next(),
                None => Some(ctx.node.clone()),
            };
            let full = node.as_ref().map(|n| n.name(doc)).unwrap_or_default();
            let name = if name == "local-name" {
                full.split_once(':').map_or(full, |(_, local)| local)
            } else {
                full
            };
            Value::String(name.to_string())
        }
        "string" => Value::String(string_arg(0)?),
        "concat" => {
            let mut s = String::new();
            for expr in args {
                s.push_str(&eval(expr, ctx)?.to_string_value(doc));
            }
            Value::String(s)
        }
        "starts-with" => Value::Boolean(string_arg(0)?.starts_with(&string_arg(1)?)),
        "contains" => Value::Boolean(string_arg(0)?.contains(&string_arg(1)?)),
        "substring-before" => {
            let (s, pat) = (string_arg(0)?, string_arg(1)?);
            Value::String(s.find(&pat).map(|i| s[..i].to_string()).unwrap_or_default())
        }
        "substring-after" => {
            let (s, pat) = (string_arg(0)?, string_arg(1)?);
            Value::String(
                s.find(&pat)
                    .map(|i| s[i + pat.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        "substring" => {
            let s = string_arg(0)?;
            let start = round(arg(1)?.to_number(doc));
            let end = match args.get(2) {
                Some(expr) => start + round(eval(expr, ctx)?.to_number(doc)),
                None => f64::INFINITY,
            };
            let sub: String = s
                .chars()
                .enumerate()
                .filter(|(i, _)| {
                    let p = (*i + 1) as f64;
                    p >= start && p < end
                })
                .map(|(_, c)| c)
                .collect();
            Value::String(sub)
        }
        "string-length" => Value::Number(string_arg(0)?.chars().count() as f64),
        "normalize-space" => Value::String(
            string_arg(0)?
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "not" => Value::Boolean(!arg(0)?.to_boolean()),
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "boolean" => Value::Boolean(arg(0)?.to_boolean()),
        "number" => match args.first() {
            Some(expr) => Value::Number(eval(expr, ctx)?.to_number(doc)),
            None => Value::Number(parse_number(&ctx.node.string_value(doc))),
        },
        "sum" => Value::Number(
            expect_nodes(arg(0)?, "sum()")?
                .iter()
                .map(|n| parse_number(&n.string_value(doc)))
                .sum(),
        ),
        "floor" => Value::Number(arg(0)?.to_number(doc).floor()),
        "ceiling" => Value::Number(arg(0)?.to_number(doc).ceil()),
        "round" => Value::Number(round(arg(0)?.to_number(doc))),
        _ => return Err(Error::Query(format!("Unknown function {}()", name))),
    };
    tracing::trace!(function = name, value = %describe_value(&value, doc), "xpath function");
    Ok(value)
}

// XPath round(): halves go towards positive infinity.
fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

fn describe_value(value: &Value, doc: &Document) -> String {
    match value {
        Value::Nodes(nodes) => format!("{} node(s)", nodes.len()),
        Value::Number(n) => format_number(*n),
        other => other.to_string_value(doc),
    }
}
