//! Tokenizer for the `expr` language.

use crate::error::{ScriptError, ScriptResult};

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    Ident(String),
    // Keywords
    Var,
    If,
    Else,
    While,
    Return,
    Throw,
    True,
    False,
    Null,
    Undefined,
    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Semi,
    Assign,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    And,
    Or,
    Eof,
}

/// A token with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
}

/// Splits source text into tokens.
pub fn tokenize(source: &str) -> ScriptResult<Vec<Token>> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.tok == Tok::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) -> ScriptResult<()> {
        loop {
            match (self.peek(), self.peek_next()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.line;
                    self.pos += 2;
                    loop {
                        match self.bump() {
                            Some('*') if self.eat('/') => break,
                            Some(_) => {}
                            None => {
                                return Err(ScriptError::compile(start, "unterminated comment"))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> ScriptResult<Token> {
        self.skip_trivia()?;
        let line = self.line;
        let Some(c) = self.bump() else {
            return Ok(Token { tok: Tok::Eof, line });
        };

        let tok = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            '.' => Tok::Dot,
            ',' => Tok::Comma,
            ';' => Tok::Semi,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Tok::StrictEq
                    } else {
                        Tok::Eq
                    }
                } else {
                    Tok::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Tok::StrictNotEq
                    } else {
                        Tok::NotEq
                    }
                } else {
                    Tok::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    Tok::Le
                } else {
                    Tok::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Tok::Ge
                } else {
                    Tok::Gt
                }
            }
            '&' if self.eat('&') => Tok::And,
            '|' if self.eat('|') => Tok::Or,
            '"' | '\'' => self.string(c, line)?,
            c if c.is_ascii_digit() => self.number(c, line)?,
            c if c.is_alphabetic() || c == '_' || c == '$' => self.word(c),
            other => {
                return Err(ScriptError::compile(
                    line,
                    format!("unexpected character '{other}'"),
                ))
            }
        };
        Ok(Token { tok, line })
    }

    fn string(&mut self, quote: char, line: u32) -> ScriptResult<Tok> {
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Tok::Str(value)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some(c) => c,
                        None => break,
                    };
                    value.push(escaped);
                }
                Some('\n') | None => break,
                Some(c) => value.push(c),
            }
        }
        Err(ScriptError::compile(line, "unterminated string literal"))
    }

    fn number(&mut self, first: char, line: u32) -> ScriptResult<Tok> {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            let fraction = c == '.' && self.peek_next().is_some_and(|n| n.is_ascii_digit());
            if c.is_ascii_digit() || fraction {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        text.parse()
            .map(Tok::Number)
            .map_err(|_| ScriptError::compile(line, format!("invalid number '{text}'")))
    }

    fn word(&mut self, first: char) -> Tok {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        match text.as_str() {
            "var" | "let" | "const" => Tok::Var,
            "if" => Tok::If,
            "else" => Tok::Else,
            "while" => Tok::While,
            "return" => Tok::Return,
            "throw" => Tok::Throw,
            "true" => Tok::True,
            "false" => Tok::False,
            "null" => Tok::Null,
            "undefined" => Tok::Undefined,
            _ => Tok::Ident(text),
        }
    }
}
