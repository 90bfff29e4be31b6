//! Tokenizer for mapping source
//!
//! Whitespace other than newlines is insignificant and `#` starts a comment
//! running to end of line. Newlines are emitted as tokens because they end
//! rules and separate block entries.

use std::fmt;

use crate::error::{LexError, LexErrorKind};

/// A 1-based line/column position in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Line number, starting at 1
    pub line: usize,
    /// Column number in characters, starting at 1
    pub column: usize,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token categories
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare identifier (`user`, `trim`, `Status`)
    Ident(String),
    /// Quoted string literal with escapes already processed
    Str(String),
    /// Integer literal
    Int(i64),
    /// Floating point literal
    Float(f64),
    /// `true` or `false`
    Bool(bool),
    /// `null`
    Null,
    /// `@config`
    ConfigSection,
    /// `@aliases`
    AliasesSection,
    /// `@lookups`
    LookupsSection,
    /// `@functions`
    FunctionsSection,
    /// `@now`
    Now,
    /// `@uuid`
    Uuid,
    /// `@compute`
    Compute,
    /// `@call`
    Call,
    /// `@Name` reference to an alias or lookup table
    Reference(String),
    /// `@{` opening an inline lookup table
    AtBrace,
    /// `:`
    Colon,
    /// `|`
    Pipe,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `/`
    Slash,
    /// `??`
    DoubleQuestion,
    /// `?`
    Question,
    /// `*`
    Star,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// End of a source line
    Newline,
    /// End of input
    Eof,
}

impl TokenKind {
    /// Short description used in parser diagnostics
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Str(s) => format!("string \"{s}\""),
            Self::Int(n) => format!("number {n}"),
            Self::Float(n) => format!("number {n}"),
            Self::Bool(b) => format!("'{b}'"),
            Self::Null => "'null'".to_string(),
            Self::ConfigSection => "'@config'".to_string(),
            Self::AliasesSection => "'@aliases'".to_string(),
            Self::LookupsSection => "'@lookups'".to_string(),
            Self::FunctionsSection => "'@functions'".to_string(),
            Self::Now => "'@now'".to_string(),
            Self::Uuid => "'@uuid'".to_string(),
            Self::Compute => "'@compute'".to_string(),
            Self::Call => "'@call'".to_string(),
            Self::Reference(name) => format!("reference '@{name}'"),
            Self::AtBrace => "'@{'".to_string(),
            Self::Colon => "':'".to_string(),
            Self::Pipe => "'|'".to_string(),
            Self::Plus => "'+'".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Slash => "'/'".to_string(),
            Self::DoubleQuestion => "'??'".to_string(),
            Self::Question => "'?'".to_string(),
            Self::Star => "'*'".to_string(),
            Self::Dot => "'.'".to_string(),
            Self::Comma => "','".to_string(),
            Self::LBrace => "'{'".to_string(),
            Self::RBrace => "'}'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Newline => "end of line".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

/// A token with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token category and payload
    pub kind: TokenKind,
    /// Position of the first character
    pub span: Span,
}

/// Tokenize mapping source into a token stream terminated by [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn push(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token { kind, span });
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(&c) = self.chars.peek() {
            let span = self.span();
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '#' => {
                    while self.chars.peek().is_some_and(|&c| c != '\n') {
                        self.bump();
                    }
                }
                '\n' => {
                    self.bump();
                    self.push(TokenKind::Newline, span);
                }
                '"' | '\'' => {
                    let s = self.read_string(c, span)?;
                    self.push(TokenKind::Str(s), span);
                }
                '-' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                    let kind = self.read_number(span)?;
                    self.push(kind, span);
                }
                c if c.is_ascii_digit() => {
                    let kind = self.read_number(span)?;
                    self.push(kind, span);
                }
                '@' => {
                    let kind = self.read_directive(span)?;
                    self.push(kind, span);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let word = self.read_word();
                    let kind = match word.as_str() {
                        "true" => TokenKind::Bool(true),
                        "false" => TokenKind::Bool(false),
                        "null" => TokenKind::Null,
                        _ => TokenKind::Ident(word),
                    };
                    self.push(kind, span);
                }
                '?' => {
                    self.bump();
                    if self.chars.peek() == Some(&'?') {
                        self.bump();
                        self.push(TokenKind::DoubleQuestion, span);
                    } else {
                        self.push(TokenKind::Question, span);
                    }
                }
                _ => {
                    let kind = match c {
                        ':' => TokenKind::Colon,
                        '|' => TokenKind::Pipe,
                        '+' => TokenKind::Plus,
                        '-' => TokenKind::Minus,
                        '/' => TokenKind::Slash,
                        '*' => TokenKind::Star,
                        '.' => TokenKind::Dot,
                        ',' => TokenKind::Comma,
                        '{' => TokenKind::LBrace,
                        '}' => TokenKind::RBrace,
                        '[' => TokenKind::LBracket,
                        ']' => TokenKind::RBracket,
                        '(' => TokenKind::LParen,
                        ')' => TokenKind::RParen,
                        other => {
                            return Err(LexError::new(
                                LexErrorKind::InvalidCharacter,
                                format!("unexpected character '{other}'"),
                                span,
                            ));
                        }
                    };
                    self.bump();
                    self.push(kind, span);
                }
            }
        }
        let span = self.span();
        self.push(TokenKind::Eof, span);
        Ok(self.tokens)
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn read_string(&mut self, quote: char, start: Span) -> Result<String, LexError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(LexError::new(
                        LexErrorKind::UnterminatedString,
                        "unterminated string literal",
                        start,
                    ));
                }
                Some(c) if c == quote => return Ok(value),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                    None => {
                        return Err(LexError::new(
                            LexErrorKind::UnterminatedString,
                            "unterminated string literal",
                            start,
                        ));
                    }
                },
                Some(c) => value.push(c),
            }
        }
    }

    fn read_number(&mut self, start: Span) -> Result<TokenKind, LexError> {
        let mut text = String::new();
        if self.chars.peek() == Some(&'-') {
            text.push('-');
            self.bump();
        }
        while let Some(&c) = self.chars.peek().filter(|c| c.is_ascii_digit()) {
            text.push(c);
            self.bump();
        }
        let mut is_float = false;
        if self.chars.peek() == Some(&'.') && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(&c) = self.chars.peek().filter(|c| c.is_ascii_digit()) {
                text.push(c);
                self.bump();
            }
        }
        if let Some(&c) = self.chars.peek().filter(|c| c.is_alphabetic() || **c == '_') {
            return Err(LexError::new(
                LexErrorKind::InvalidNumber,
                format!("invalid character '{c}' in number '{text}'"),
                start,
            ));
        }
        let invalid = || {
            LexError::new(
                LexErrorKind::InvalidNumber,
                format!("number '{text}' is out of range"),
                start,
            )
        };
        if is_float {
            text.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(TokenKind::Float)
                .ok_or_else(invalid)
        } else {
            text.parse::<i64>().map(TokenKind::Int).map_err(|_| invalid())
        }
    }

    fn read_directive(&mut self, start: Span) -> Result<TokenKind, LexError> {
        self.bump();
        if self.chars.peek() == Some(&'{') {
            self.bump();
            return Ok(TokenKind::AtBrace);
        }
        let word = self.read_word();
        let kind = match word.as_str() {
            "" => {
                return Err(LexError::new(
                    LexErrorKind::InvalidCharacter,
                    "'@' must be followed by a name or '{'",
                    start,
                ));
            }
            "config" => TokenKind::ConfigSection,
            "aliases" => TokenKind::AliasesSection,
            "lookups" => TokenKind::LookupsSection,
            "functions" => TokenKind::FunctionsSection,
            "now" => TokenKind::Now,
            "uuid" => TokenKind::Uuid,
            "compute" => TokenKind::Compute,
            "call" => TokenKind::Call,
            _ => TokenKind::Reference(word),
        };
        Ok(kind)
    }
}
