//! Logical-line scanner
//!
//! Splits Python source into logical lines. Bracketed expressions, backslash
//! continuations and multi-line strings fold into the line they start on.
//! Comments are kept per physical line so exclusion pragmas can be matched.

use std::collections::BTreeMap;
use thiserror::Error;

/// Tokenizer failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GrammarError {
    /// String literal not closed before end of line or end of input
    #[error("line {line}: unterminated string literal")]
    UnterminatedString {
        /// Line the literal starts on
        line: u32,
    },

    /// Closing bracket without a matching opener
    #[error("line {line}: unmatched '{bracket}'")]
    UnmatchedBracket {
        /// Line of the closing bracket
        line: u32,
        /// The closing bracket
        bracket: char,
    },

    /// Input ended inside brackets
    #[error("line {line}: '{bracket}' was never closed")]
    UnclosedBracket {
        /// Line of the opening bracket
        line: u32,
        /// The opening bracket
        bracket: char,
    },

    /// Backslash continuation at end of input
    #[error("line {line}: unexpected end of input after line continuation")]
    DanglingContinuation {
        /// Line ending in the backslash
        line: u32,
    },

    /// Exclusion pattern failed to compile
    #[error("invalid exclusion pattern: {0}")]
    Pattern(String),
}

/// Significant token kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identifier or keyword
    Name(String),
    /// String literal
    Str {
        /// f-string
        formatted: bool,
    },
    /// Numeric literal
    Number,
    /// `...`
    Ellipsis,
    /// Any other operator or delimiter character
    Op(char),
}

impl Token {
    /// True if this is the identifier `word`
    #[must_use]
    pub fn is_name(&self, word: &str) -> bool {
        matches!(self, Self::Name(name) if name == word)
    }
}

/// One logical line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Physical line the statement starts on
    pub first_line: u32,
    /// Last physical line the statement touches
    pub last_line: u32,
    /// Indentation column of the first token
    pub indent: usize,
    /// Tokens with bracket nesting flattened
    pub tokens: Vec<Token>,
    /// Bracket nesting depth of each token
    depths: Vec<usize>,
}

impl LogicalLine {
    /// True when the last token at bracket depth zero is `:`
    ///
    /// Such a line is a compound header whose body starts on the next line.
    #[must_use]
    pub fn opens_block(&self) -> bool {
        self.tokens
            .iter()
            .zip(&self.depths)
            .rev()
            .find(|(_, depth)| **depth == 0)
            .is_some_and(|(token, _)| *token == Token::Op(':'))
    }

    /// First token, skipping a leading `async`
    #[must_use]
    pub fn keyword(&self) -> Option<&Token> {
        match self.tokens.first() {
            Some(first) if first.is_name("async") => self.tokens.get(1),
            first => first,
        }
    }

    /// Physical lines spanned by this logical line
    pub fn lines(&self) -> impl Iterator<Item = u32> {
        self.first_line..=self.last_line
    }
}

/// Scanner output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// Logical lines in source order
    pub lines: Vec<LogicalLine>,
    /// Comment text (including `#`) by physical line
    pub comments: BTreeMap<u32, String>,
}

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn closing(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    scan: Scan,
    current: Option<LogicalLine>,
    brackets: Vec<(char, u32)>,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            scan: Scan::default(),
            current: None,
            brackets: Vec::new(),
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn push(&mut self, token: Token, indent: usize) {
        let depth = self.brackets.len();
        let line = self.line;
        let current = self.current.get_or_insert_with(|| LogicalLine {
            first_line: line,
            last_line: line,
            indent,
            tokens: Vec::new(),
            depths: Vec::new(),
        });
        current.tokens.push(token);
        current.depths.push(depth);
        current.last_line = current.last_line.max(line);
    }

    fn finish_line(&mut self) {
        if let Some(done) = self.current.take() {
            self.scan.lines.push(done);
        }
    }

    fn newline(&mut self) {
        self.line += 1;
        if let Some(current) = self.current.as_mut() {
            current.last_line = current.last_line.max(self.line);
        }
    }

    /// Measure leading whitespace of a physical line; tabs advance to the next
    /// multiple of eight
    fn indentation(&mut self) -> usize {
        let mut column = 0;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => column += 1,
                '\t' => column = (column / 8 + 1) * 8,
                '\x0c' => column = 0,
                _ => break,
            }
            self.pos += 1;
        }
        column
    }

    fn comment(&mut self) {
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c != '\n' && c != '\r') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.scan.comments.insert(self.line, text);
    }

    fn string(&mut self, formatted: bool, indent: usize) -> Result<(), GrammarError> {
        let start_line = self.line;
        let quote = self.peek(0).unwrap_or('"');
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        self.push(Token::Str { formatted }, indent);

        loop {
            let Some(c) = self.peek(0) else {
                return Err(GrammarError::UnterminatedString { line: start_line });
            };
            match c {
                '\\' => {
                    self.pos += 1;
                    match self.peek(0) {
                        Some('\n') => self.newline(),
                        Some('\r') => {
                            if self.peek(1) == Some('\n') {
                                self.pos += 1;
                            }
                            self.newline();
                        }
                        _ => {}
                    }
                    self.pos += 1;
                }
                '\n' | '\r' if !triple => {
                    return Err(GrammarError::UnterminatedString { line: start_line });
                }
                '\n' => {
                    self.pos += 1;
                    self.newline();
                }
                '\r' => {
                    self.pos += 1;
                    if self.peek(0) != Some('\n') {
                        self.newline();
                    }
                }
                c if c == quote => {
                    if !triple {
                        self.pos += 1;
                        return Ok(());
                    }
                    if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                        self.pos += 3;
                        return Ok(());
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn number(&mut self) {
        while let Some(c) = self.peek(0) {
            if is_ident_char(c) || c == '.' {
                self.pos += 1;
                if matches!(c, 'e' | 'E') && matches!(self.peek(0), Some('+' | '-')) {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn run(mut self) -> Result<Scan, GrammarError> {
        let mut at_line_start = true;
        let mut continued = false;
        let mut indent = 0;

        while let Some(c) = self.peek(0) {
            if at_line_start {
                at_line_start = false;
                let column = self.indentation();
                if self.current.is_none() {
                    indent = column;
                }
                continue;
            }

            match c {
                '\n' | '\r' => {
                    self.pos += 1;
                    if c == '\r' && self.peek(0) == Some('\n') {
                        self.pos += 1;
                    }
                    if self.brackets.is_empty() && !continued {
                        self.finish_line();
                        self.line += 1;
                    } else {
                        self.newline();
                    }
                    continued = false;
                    at_line_start = true;
                }
                ' ' | '\t' | '\x0c' => self.pos += 1,
                '#' => self.comment(),
                '\\' if matches!(self.peek(1), Some('\n' | '\r')) => {
                    self.pos += 1;
                    continued = true;
                }
                '\\' if self.peek(1).is_none() => {
                    return Err(GrammarError::DanglingContinuation { line: self.line });
                }
                '"' | '\'' => self.string(false, indent)?,
                c if is_ident_start(c) => {
                    let start = self.pos;
                    while self.peek(0).is_some_and(is_ident_char) {
                        self.pos += 1;
                    }
                    let word: String = self.chars[start..self.pos].iter().collect();
                    let lower = word.to_ascii_lowercase();
                    if matches!(self.peek(0), Some('"' | '\''))
                        && STRING_PREFIXES.contains(&lower.as_str())
                    {
                        self.string(lower.contains('f'), indent)?;
                    } else {
                        self.push(Token::Name(word), indent);
                    }
                }
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) =>
                {
                    self.number();
                    self.push(Token::Number, indent);
                }
                '.' if self.peek(1) == Some('.') && self.peek(2) == Some('.') => {
                    self.pos += 3;
                    self.push(Token::Ellipsis, indent);
                }
                '(' | '[' | '{' => {
                    self.push(Token::Op(c), indent);
                    self.brackets.push((c, self.line));
                    self.pos += 1;
                }
                ')' | ']' | '}' => {
                    match self.brackets.pop() {
                        Some((open, _)) if closing(open) == c => {}
                        _ => {
                            return Err(GrammarError::UnmatchedBracket {
                                line: self.line,
                                bracket: c,
                            })
                        }
                    }
                    self.push(Token::Op(c), indent);
                    self.pos += 1;
                }
                _ => {
                    self.push(Token::Op(c), indent);
                    self.pos += 1;
                }
            }
        }

        if let Some(&(bracket, line)) = self.brackets.first() {
            return Err(GrammarError::UnclosedBracket { line, bracket });
        }
        self.finish_line();
        Ok(self.scan)
    }
}

/// Split `source` into logical lines and per-line comments
///
/// # Errors
///
/// Returns a [`GrammarError`] for unterminated strings or unbalanced
/// brackets.
pub fn scan(source: &str) -> Result<Scan, GrammarError> {
    Scanner::new(source).run()
}
