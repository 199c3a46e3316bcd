//! # Scanning Module
//!
//! Both parsers in this crate (the assembly parser and the source-language
//! parser) are tokenless and operate directly on the raw text. This module
//! holds the cursor they share: it tracks the 1-based line and column of the
//! next unread character, skips the space-only whitespace and `#` comments
//! that both languages use, and renders diagnostics that point at the
//! offending cell of the source.

use std::fmt;

/// A fatal syntax diagnostic pointing at one position in a source file.
///
/// Rendered as `<file>:<line>:<column>: error: <message>` followed by the
/// source line and a caret under the offending column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub source_line: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{}:{}:{}: error: {}",
            self.file, self.line, self.column, self.message
        )?;
        writeln!(f, "    {}", self.source_line)?;
        write!(f, "    {}^", " ".repeat(self.column.saturating_sub(1) as usize))
    }
}

/// Characters that can appear in a multi-character operator.
const SYMBOL_CHARS: &str = "+-=<>!.&|";

/// A cursor over one source file.
pub struct Scanner<'a> {
    file: &'a str,
    source: &'a str,
    rest: &'a str,
    line: u32,
    column: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(file: &'a str, source: &'a str) -> Self {
        Scanner {
            file,
            source,
            rest: source,
            line: 1,
            column: 1,
        }
    }

    /// Build a diagnostic at the current position.
    pub fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            file: self.file.to_string(),
            line: self.line,
            column: self.column,
            message: message.into(),
            source_line: self.current_line().to_string(),
        }
    }

    /// The full text of the line containing the cursor, without its newline.
    fn current_line(&self) -> &'a str {
        let offset = self.source.len() - self.rest.len();
        let start = self.source[..offset].rfind('\n').map_or(0, |i| i + 1);
        let end = self.source[start..]
            .find('\n')
            .map_or(self.source.len(), |i| start + i);
        &self.source[start..end]
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// The next unread character, if any.
    pub fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.rest.starts_with(prefix)
    }

    /// Consume one character, failing at end of input.
    pub fn get(&mut self) -> Result<char, SyntaxError> {
        match self.peek() {
            Some(c) => {
                self.advance(c.len_utf8());
                Ok(c)
            }
            None => Err(self.error("Unexpected end of input.")),
        }
    }

    /// Move the cursor forward, maintaining the line and column counters.
    pub fn advance(&mut self, amount: usize) {
        debug_assert!(amount <= self.rest.len());
        for c in self.rest[..amount].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.rest = &self.rest[amount..];
    }

    /// Skip spaces and `#` comments. Newlines are significant in both
    /// languages and are never skipped here.
    pub fn skip_spaces(&mut self) {
        loop {
            let skip = self.rest.len() - self.rest.trim_start_matches(' ').len();
            self.advance(skip);
            if !self.rest.starts_with('#') {
                break;
            }
            let comment = self.rest.find('\n').unwrap_or(self.rest.len());
            self.advance(comment);
        }
    }

    /// Require an exact token, skipping leading spaces.
    pub fn eat(&mut self, token: &str) -> Result<(), SyntaxError> {
        self.skip_spaces();
        if !self.rest.starts_with(token) {
            return Err(self.error(format!("Expected {:?}.", token)));
        }
        self.advance(token.len());
        Ok(())
    }

    /// Require a newline, or the end of the input.
    pub fn expect_newline(&mut self) -> Result<(), SyntaxError> {
        self.skip_spaces();
        match self.peek() {
            None => Ok(()),
            Some('\n') => {
                self.advance(1);
                Ok(())
            }
            Some(_) => Err(self.error("Expected newline.")),
        }
    }

    /// Skip spaces, then look at the alphanumeric word under the cursor
    /// without consuming it. Empty when the cursor is not on a word.
    pub fn peek_name(&mut self) -> &'a str {
        self.skip_spaces();
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(self.rest.len());
        &self.rest[..end]
    }

    pub fn consume_name(&mut self, word: &str) -> bool {
        if self.peek_name() == word {
            self.advance(word.len());
            true
        } else {
            false
        }
    }

    pub fn eat_name(&mut self, word: &str) -> Result<(), SyntaxError> {
        if self.consume_name(word) {
            Ok(())
        } else {
            Err(self.error(format!("Expected {:?}.", word)))
        }
    }

    /// Parse an identifier: `[A-Za-z][A-Za-z0-9]*`.
    pub fn parse_name(&mut self) -> Result<String, SyntaxError> {
        let name = self.peek_name();
        if name.is_empty() {
            return Err(self.error("Expected name."));
        }
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(self.error("Names cannot start with numbers."));
        }
        self.advance(name.len());
        Ok(name.to_string())
    }

    /// Skip spaces, then look at the operator characters under the cursor
    /// without consuming them.
    pub fn peek_symbol(&mut self) -> &'a str {
        self.skip_spaces();
        let end = self
            .rest
            .find(|c: char| !SYMBOL_CHARS.contains(c))
            .unwrap_or(self.rest.len());
        &self.rest[..end]
    }

    pub fn consume_symbol(&mut self, symbol: &str) -> bool {
        if self.peek_symbol() == symbol {
            self.advance(symbol.len());
            true
        } else {
            false
        }
    }

    pub fn eat_symbol(&mut self, symbol: &str) -> Result<(), SyntaxError> {
        if self.consume_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(format!("Expected {:?}.", symbol)))
        }
    }

    /// Parse a decimal integer, with an optional leading minus sign.
    pub fn parse_i64(&mut self) -> Result<i64, SyntaxError> {
        let digits_from = if self.rest.starts_with('-') { 1 } else { 0 };
        let end = self.rest[digits_from..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(self.rest.len(), |i| digits_from + i);
        let text = &self.rest[..end];
        if end == digits_from {
            return Err(self.error("Expected numeric literal."));
        }
        match text.parse() {
            Ok(value) => {
                self.advance(end);
                Ok(value)
            }
            Err(_) => Err(self.error("Expected numeric literal.")),
        }
    }

    /// Parse a double-quoted string literal with `\\`, `\"` and `\n` escapes.
    /// The cursor must be on the opening quote.
    pub fn parse_string_literal(&mut self) -> Result<String, SyntaxError> {
        self.eat("\"")?;
        let mut value = String::new();
        loop {
            match self.get()? {
                '"' => return Ok(value),
                '\\' => match self.get()? {
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    'n' => value.push('\n'),
                    _ => return Err(self.error("Invalid escape sequence.")),
                },
                c => value.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_line_and_column() {
        let mut scan = Scanner::new("x", "ab\ncd");
        scan.advance(4);
        let error = scan.error("boom");
        assert_eq!(error.line, 2);
        assert_eq!(error.column, 2);
        assert_eq!(error.source_line, "cd");
    }

    #[test]
    fn renders_caret_diagnostics() {
        let mut scan = Scanner::new("test.is", "var 9x;\n");
        scan.advance(4);
        let text = scan.error("Expected name.").to_string();
        assert!(text.starts_with("test.is:1:5: error: Expected name."));
        assert!(text.ends_with("    var 9x;\n        ^"));
    }

    #[test]
    fn skips_spaces_and_comments_but_not_newlines() {
        let mut scan = Scanner::new("x", "  # comment\nword");
        scan.skip_spaces();
        assert_eq!(scan.peek(), Some('\n'));
        scan.expect_newline().unwrap();
        assert_eq!(scan.peek_name(), "word");
    }

    #[test]
    fn parses_signed_integers() {
        let mut scan = Scanner::new("x", "-42,");
        assert_eq!(scan.parse_i64().unwrap(), -42);
        assert_eq!(scan.peek(), Some(','));
        assert!(Scanner::new("x", "-").parse_i64().is_err());
    }

    #[test]
    fn parses_string_escapes() {
        let mut scan = Scanner::new("x", r#""a\\b\"c\n""#);
        assert_eq!(scan.parse_string_literal().unwrap(), "a\\b\"c\n");
        assert!(Scanner::new("x", r#""\q""#).parse_string_literal().is_err());
    }
}
