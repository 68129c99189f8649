//! XPath parser
//!
//! Recursive descent parser for XPath 1.0 expressions. Function names and
//! their arity are checked here, so a bad call fails before anything runs.

use super::lexer::{Lexer, Token};
use crate::error::{Error, Result};

/// XPath expression AST node
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
    /// Primary expression with predicates
    Filter(Box<Expr>, Vec<Expr>),
    Path(PathStart, Vec<Step>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathStart {
    /// `/...`
    Root,
    /// relative path
    Context,
    /// `(expr)/...` or `f()/...`
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Step {
        Step {
            axis: Axis::DescendantOrSelf,
            node_test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    SelfAxis,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Result<Axis> {
        match name {
            "child" => Ok(Axis::Child),
            "descendant" => Ok(Axis::Descendant),
            "descendant-or-self" => Ok(Axis::DescendantOrSelf),
            "parent" => Ok(Axis::Parent),
            "ancestor" => Ok(Axis::Ancestor),
            "ancestor-or-self" => Ok(Axis::AncestorOrSelf),
            "following-sibling" => Ok(Axis::FollowingSibling),
            "preceding-sibling" => Ok(Axis::PrecedingSibling),
            "self" => Ok(Axis::SelfAxis),
            "attribute" => Ok(Axis::Attribute),
            "following" | "preceding" | "namespace" => {
                Err(Error::Query(format!("Unsupported axis {}", name)))
            }
            _ => Err(Error::Query(format!("Unknown axis {}", name))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeTest {
    /// `*`
    Any,
    Name(String),
    /// `prefix:*`
    Prefix(String),
    Node,
    Text,
    Comment,
    PI(Option<String>),
}

// name, min args, max args
const FUNCTIONS: &[(&str, usize, usize)] = &[
    ("last", 0, 0),
    ("position", 0, 0),
    ("count", 1, 1),
    ("name", 0, 1),
    ("local-name", 0, 1),
    ("string", 0, 1),
    ("concat", 2, usize::MAX),
    ("starts-with", 2, 2),
    ("contains", 2, 2),
    ("substring-before", 2, 2),
    ("substring-after", 2, 2),
    ("substring", 2, 3),
    ("string-length", 0, 1),
    ("normalize-space", 0, 1),
    ("not", 1, 1),
    ("true", 0, 0),
    ("false", 0, 0),
    ("boolean", 1, 1),
    ("number", 0, 1),
    ("sum", 1, 1),
    ("floor", 1, 1),
    ("ceiling", 1, 1),
    ("round", 1, 1),
];

/// Parses a whole expression.
pub(crate) fn parse(input: &str) -> Result<Expr> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        input,
    };
    let expr = parser.parse_expr()?;
    match parser.current() {
        None => Ok(expr),
        Some(token) => Err(parser.error(&format!("Unexpected {:?}", token))),
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl<'a> Parser<'a> {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.current() == Some(token)
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.check(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("Expected {:?}", token)))
        }
    }

    fn error(&self, msg: &str) -> Error {
        Error::Query(format!("{} in {:?}", msg, self.input))
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or_expr()
    }

    fn parse_binary(
        &mut self,
        next: fn(&mut Self) -> Result<Expr>,
        op_for: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        while let Some(op) = self.current().and_then(op_for) {
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_or_expr(&mut self) -> Result<Expr> {
        self.parse_binary(Self::parse_and_expr, |t| match t {
            Token::Or => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        self.parse_binary(Self::parse_equality_expr, |t| match t {
            Token::And => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn parse_equality_expr(&mut self) -> Result<Expr> {
        self.parse_binary(Self::parse_relational_expr, |t| match t {
            Token::Eq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::NotEq),
            _ => None,
        })
    }

    fn parse_relational_expr(&mut self) -> Result<Expr> {
        self.parse_binary(Self::parse_additive_expr, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::LtEq),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        })
    }

    fn parse_additive_expr(&mut self) -> Result<Expr> {
        self.parse_binary(Self::parse_multiplicative_expr, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Expr> {
        self.parse_binary(Self::parse_unary_expr, |t| match t {
            Token::Multiply => Some(BinaryOp::Mul),
            Token::Div => Some(BinaryOp::Div),
            Token::Mod => Some(BinaryOp::Mod),
            _ => None,
        })
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        if self.check(&Token::Minus) {
            self.pos += 1;
            let expr = self.parse_unary_expr()?;
            Ok(Expr::Negate(Box::new(expr)))
        } else {
            self.parse_union_expr()
        }
    }

    fn parse_union_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_path_expr()?;
        while self.check(&Token::Pipe) {
            self.pos += 1;
            let right = self.parse_path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.current(),
            Some(
                Token::Name(_)
                    | Token::Star
                    | Token::At
                    | Token::Dot
                    | Token::DoubleDot
                    | Token::Axis(_)
                    | Token::NodeType(_)
            )
        )
    }

    fn parse_path_expr(&mut self) -> Result<Expr> {
        match self.current() {
            Some(Token::Slash) => {
                self.pos += 1;
                let mut steps = Vec::new();
                if self.starts_step() {
                    self.parse_relative_path(&mut steps)?;
                }
                Ok(Expr::Path(PathStart::Root, steps))
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![Step::descendant_or_self()];
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path(PathStart::Root, steps))
            }
            _ if self.starts_step() => {
                let mut steps = Vec::new();
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path(PathStart::Context, steps))
            }
            _ => {
                let primary = self.parse_primary_expr()?;
                let predicates = self.parse_predicates()?;
                let filter = if predicates.is_empty() {
                    primary
                } else {
                    Expr::Filter(Box::new(primary), predicates)
                };
                let mut steps = Vec::new();
                match self.current() {
                    Some(Token::Slash) => self.pos += 1,
                    Some(Token::DoubleSlash) => {
                        self.pos += 1;
                        steps.push(Step::descendant_or_self());
                    }
                    _ => return Ok(filter),
                }
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path(PathStart::Expr(Box::new(filter)), steps))
            }
        }
    }

    fn parse_relative_path(&mut self, steps: &mut Vec<Step>) -> Result<()> {
        steps.push(self.parse_step()?);
        loop {
            match self.current() {
                Some(Token::Slash) => self.pos += 1,
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(Step::descendant_or_self());
                }
                _ => return Ok(()),
            }
            steps.push(self.parse_step()?);
        }
    }

    fn parse_step(&mut self) -> Result<Step> {
        let axis = match self.current() {
            Some(Token::Dot) => {
                self.pos += 1;
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    node_test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            Some(Token::DoubleDot) => {
                self.pos += 1;
                return Ok(Step {
                    axis: Axis::Parent,
                    node_test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            Some(Token::Axis(name)) => {
                let axis = Axis::from_name(name)?;
                self.pos += 1;
                self.expect(Token::DoubleColon)?;
                axis
            }
            Some(Token::At) => {
                self.pos += 1;
                Axis::Attribute
            }
            _ => Axis::Child,
        };
        let node_test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            node_test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest> {
        match self.advance() {
            Some(Token::Star) => Ok(NodeTest::Any),
            Some(Token::Name(name)) => match name.strip_suffix(":*") {
                Some(prefix) => Ok(NodeTest::Prefix(prefix.to_string())),
                None => Ok(NodeTest::Name(name)),
            },
            Some(Token::NodeType(kind)) => {
                self.expect(Token::LeftParen)?;
                let test = match kind.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => match self.current() {
                        Some(Token::Literal(target)) => {
                            let target = target.clone();
                            self.pos += 1;
                            NodeTest::PI(Some(target))
                        }
                        _ => NodeTest::PI(None),
                    },
                };
                self.expect(Token::RightParen)?;
                Ok(test)
            }
            other => Err(self.error(&format!("Expected a node test, found {:?}", other))),
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.check(&Token::LeftBracket) {
            self.pos += 1;
            predicates.push(self.parse_expr()?);
            self.expect(Token::RightBracket)?;
        }
        Ok(predicates)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::LeftParen) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Function(name)) => self.parse_function_call(name),
            Some(Token::Variable(name)) => {
                Err(self.error(&format!("Variables are not supported (${})", name)))
            }
            Some(token) => Err(self.error(&format!("Unexpected {:?}", token))),
            None => Err(self.error("Unexpected end of expression")),
        }
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expr> {
        let (min, max) = FUNCTIONS
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, min, max)| (*min, *max))
            .ok_or_else(|| self.error(&format!("Unknown function {}()", name)))?;
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RightParen) {
            args.push(self.parse_expr()?);
            while self.check(&Token::Comma) {
                self.pos += 1;
                args.push(self.parse_expr()?);
            }
        }
        self.expect(Token::RightParen)?;
        if args.len() < min || args.len() > max {
            return Err(self.error(&format!(
                "Wrong number of arguments for {}(): {}",
                name,
                args.len()
            )));
        }
        Ok(Expr::Function(name, args))
    }
}
