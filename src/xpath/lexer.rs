//! XPath lexer
//!
//! Splits an expression into tokens. `*` and the operator names `and`, `or`,
//! `mod`, `div` are ambiguous in XPath; which one is meant depends on the
//! token before them.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,       // /
    DoubleSlash, // //
    Dot,         // .
    DoubleDot,   // ..
    At,          // @
    Pipe,        // |
    Comma,       // ,
    DoubleColon, // ::
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,

    Plus,
    Minus,
    Multiply,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Mod,
    Div,

    /// `*` used as a name test
    Star,
    /// QName, or `prefix:*`
    Name(String),
    /// Name followed by `(`, other than a node type
    Function(String),
    /// node, text, comment, processing-instruction
    NodeType(String),
    /// Name followed by `::`
    Axis(String),
    Variable(String),
    Literal(String),
    Number(f64),
}

impl Token {
    // A `*` or operator name after one of these is a name test, not an operator.
    fn starts_operand(&self) -> bool {
        matches!(
            self,
            Token::At
                | Token::DoubleColon
                | Token::LeftParen
                | Token::LeftBracket
                | Token::Comma
                | Token::Slash
                | Token::DoubleSlash
                | Token::Pipe
                | Token::Plus
                | Token::Minus
                | Token::Multiply
                | Token::Eq
                | Token::NotEq
                | Token::Lt
                | Token::LtEq
                | Token::Gt
                | Token::GtEq
                | Token::And
                | Token::Or
                | Token::Mod
                | Token::Div
        )
    }
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Lexer {
            input,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>> {
        loop {
            self.skip_whitespace();
            let c = match self.peek() {
                Some(c) => c,
                None => return Ok(self.tokens),
            };
            let token = self.next_token(c)?;
            self.tokens.push(token);
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.remaining().chars().nth(offset)
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance(c.len_utf8());
            } else {
                break;
            }
        }
    }

    fn operator_expected(&self) -> bool {
        match self.tokens.last() {
            Some(token) => !token.starts_operand(),
            None => false,
        }
    }

    fn error(&self, msg: &str) -> Error {
        Error::Query(format!("{} at position {} in {:?}", msg, self.pos, self.input))
    }

    fn next_token(&mut self, c: char) -> Result<Token> {
        let single = |lexer: &mut Self, token: Token| -> Result<Token> {
            lexer.advance(1);
            Ok(token)
        };
        match c {
            '/' => {
                if self.peek_at(1) == Some('/') {
                    self.advance(2);
                    Ok(Token::DoubleSlash)
                } else {
                    single(self, Token::Slash)
                }
            }
            '.' => match self.peek_at(1) {
                Some('.') => {
                    self.advance(2);
                    Ok(Token::DoubleDot)
                }
                Some(d) if d.is_ascii_digit() => self.read_number(),
                _ => single(self, Token::Dot),
            },
            '@' => single(self, Token::At),
            '|' => single(self, Token::Pipe),
            ',' => single(self, Token::Comma),
            '(' => single(self, Token::LeftParen),
            ')' => single(self, Token::RightParen),
            '[' => single(self, Token::LeftBracket),
            ']' => single(self, Token::RightBracket),
            '+' => single(self, Token::Plus),
            '-' => single(self, Token::Minus),
            '=' => single(self, Token::Eq),
            '*' => {
                if self.operator_expected() {
                    single(self, Token::Multiply)
                } else {
                    single(self, Token::Star)
                }
            }
            '!' => {
                if self.peek_at(1) == Some('=') {
                    self.advance(2);
                    Ok(Token::NotEq)
                } else {
                    Err(self.error("Expected '=' after '!'"))
                }
            }
            '<' => {
                if self.peek_at(1) == Some('=') {
                    self.advance(2);
                    Ok(Token::LtEq)
                } else {
                    single(self, Token::Lt)
                }
            }
            '>' => {
                if self.peek_at(1) == Some('=') {
                    self.advance(2);
                    Ok(Token::GtEq)
                } else {
                    single(self, Token::Gt)
                }
            }
            ':' => {
                if self.peek_at(1) == Some(':') {
                    self.advance(2);
                    Ok(Token::DoubleColon)
                } else {
                    Err(self.error("Unexpected ':'"))
                }
            }
            '"' | '\'' => self.read_literal(c),
            '$' => {
                self.advance(1);
                match self.read_ncname() {
                    Some(name) => Ok(Token::Variable(name)),
                    None => Err(self.error("Expected variable name after '$'")),
                }
            }
            c if c.is_ascii_digit() => self.read_number(),
            c if is_name_start(c) => self.read_name(),
            c => Err(self.error(&format!("Unexpected character {:?}", c))),
        }
    }

    fn read_literal(&mut self, quote: char) -> Result<Token> {
        self.advance(1);
        match self.remaining().find(quote) {
            Some(end) => {
                let literal = self.remaining()[..end].to_string();
                self.advance(end + 1);
                Ok(Token::Literal(literal))
            }
            None => Err(self.error("Unterminated string literal")),
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let rest = self.remaining();
        let mut seen_dot = false;
        let len = rest
            .char_indices()
            .find(|&(_, c)| {
                if c == '.' && !seen_dot {
                    seen_dot = true;
                    false
                } else {
                    !c.is_ascii_digit()
                }
            })
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let number = rest[..len]
            .parse::<f64>()
            .map_err(|_| self.error("Invalid number"))?;
        self.advance(len);
        Ok(Token::Number(number))
    }

    fn read_ncname(&mut self) -> Option<String> {
        let rest = self.remaining();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start(c) => {}
            _ => return None,
        }
        let len = chars
            .find(|&(_, c)| !is_name_char(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.advance(len);
        Some(rest[..len].to_string())
    }

    fn read_name(&mut self) -> Result<Token> {
        let operator_expected = self.operator_expected();
        let mut name = self.read_ncname().unwrap_or_default();

        if operator_expected {
            return match name.as_str() {
                "and" => Ok(Token::And),
                "or" => Ok(Token::Or),
                "mod" => Ok(Token::Mod),
                "div" => Ok(Token::Div),
                _ => Err(self.error(&format!("Expected an operator, found {:?}", name))),
            };
        }

        // prefix:local or prefix:*
        if self.peek() == Some(':') && self.peek_at(1) != Some(':') {
            self.advance(1);
            if self.peek() == Some('*') {
                self.advance(1);
                name.push_str(":*");
                return Ok(Token::Name(name));
            }
            match self.read_ncname() {
                Some(local) => {
                    name.push(':');
                    name.push_str(&local);
                }
                None => return Err(self.error("Expected local name after prefix")),
            }
        }

        // Look past whitespace to see what kind of name this is.
        let rest = self.remaining().trim_start();
        if rest.starts_with("::") {
            Ok(Token::Axis(name))
        } else if rest.starts_with('(') {
            match name.as_str() {
                "node" | "text" | "comment" | "processing-instruction" => {
                    Ok(Token::NodeType(name))
                }
                _ => Ok(Token::Function(name)),
            }
        } else {
            Ok(Token::Name(name))
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap()
    }

    #[test]
    fn test_path() {
        assert_eq!(
            lex("/document//fruit[@id='2']"),
            vec![
                Token::Slash,
                Token::Name("document".to_string()),
                Token::DoubleSlash,
                Token::Name("fruit".to_string()),
                Token::LeftBracket,
                Token::At,
                Token::Name("id".to_string()),
                Token::Eq,
                Token::Literal("2".to_string()),
                Token::RightBracket,
            ]
        );
    }

    #[test]
    fn test_star_and_operator_names() {
        assert_eq!(
            lex("* * 2"),
            vec![Token::Star, Token::Multiply, Token::Number(2.0)]
        );
        assert_eq!(
            lex("div div div"),
            vec![
                Token::Name("div".to_string()),
                Token::Div,
                Token::Name("div".to_string())
            ]
        );
        assert_eq!(
            lex("a/@*"),
            vec![
                Token::Name("a".to_string()),
                Token::Slash,
                Token::At,
                Token::Star
            ]
        );
    }

    #[test]
    fn test_functions_and_axes() {
        assert_eq!(
            lex("count (child::text())"),
            vec![
                Token::Function("count".to_string()),
                Token::LeftParen,
                Token::Axis("child".to_string()),
                Token::DoubleColon,
                Token::NodeType("text".to_string()),
                Token::LeftParen,
                Token::RightParen,
                Token::RightParen,
            ]
        );
        assert_eq!(lex("p:*"), vec![Token::Name("p:*".to_string())]);
        assert_eq!(lex("p:a"), vec![Token::Name("p:a".to_string())]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex(".5"), vec![Token::Number(0.5)]);
        assert_eq!(lex("12.25"), vec![Token::Number(12.25)]);
        assert_eq!(lex("3."), vec![Token::Number(3.0)]);
    }

    #[test]
    fn test_errors() {
        assert!(Lexer::new("'open").tokenize().is_err());
        assert!(Lexer::new("a ! b").tokenize().is_err());
        assert!(Lexer::new("a # b").tokenize().is_err());
        assert!(Lexer::new("a b").tokenize().is_err());
    }
}
