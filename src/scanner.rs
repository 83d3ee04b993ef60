//! Module `scanner` implements the on-demand, try-match lexer for expression
//! text.
//!
//! Unlike a streaming lexer, the scanner exposes independent
//! "try-match-and-advance" operations over a fixed source buffer and a
//! mutable cursor: each matcher either consumes a token and reports what it
//! found, or declines and leaves the cursor untouched.  The evaluator's
//! [`Scanner::next_token`] dispatcher tries the matchers in a fixed priority
//! order so no classification is ambiguous.
//!
//! # Core rules
//!
//! - Whitespace is always skipped before attempting a match.
//! - Matchers return found/not-found and never fail, except for genuinely
//!   malformed quoted strings, unterminated groups, and unterminated escape
//!   sequences, which raise a lex error immediately.
//! - Operator matching uses maximal munch against the registered operator
//!   tables: the longest registered operator string that prefixes the input
//!   wins, so `<=` is chosen over `<`.
//! - The raw-word reader memoizes its result per cursor position, so
//!   repeated peeks at the same spot cost nothing.

use log::debug;
use memchr::memchr2;
use phf::phf_map;

use crate::error::{BasicError, Result};
use crate::ops::Operators;
use crate::token::Token;

/// Single-character backslash escapes (compile-time perfect hash).
static ESCAPES: phf::Map<u8, u8> = phf_map! {
    b'n' => b'\n',
    b'r' => b'\r',
    b't' => b'\t',
    b'b' => 0x08u8,
    b'f' => 0x0Cu8,
    b'"' => b'"',
    b'\'' => b'\'',
    b'\\' => b'\\',
};

/// A matched group: the raw text between the brackets and its top-level
/// comma-separated arguments.  A comma inside a deeper nesting level or a
/// quoted string never splits.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub open: u8,
    pub inner: String,
    pub args: Vec<String>,
}

/// Try-match scanner over one expression's source text.
pub struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    word_memo: Option<(usize, usize)>,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str, line: usize) -> Self {
        debug!("Scanner created over {} bytes (line {})", src.len(), line);

        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line,
            word_memo: None,
        }
    }

    // ───────────────────────── primitive helpers ────────────────────────

    #[inline(always)]
    fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline(always)]
    pub fn is_at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.len()
    }

    /// Remaining unconsumed text.
    pub fn rest(&self) -> &'a str {
        &self.src[self.pos.min(self.src.len())..]
    }

    /// Advance the cursor past any whitespace.
    pub fn skip_whitespace(&mut self) {
        while self.pos < self.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// Maximal run of non-whitespace at the cursor, memoized per position.
    pub fn peek_word(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        if self.pos >= self.len() {
            return None;
        }

        if let Some((start, end)) = self.word_memo {
            if start == self.pos {
                return Some(&self.src[start..end]);
            }
        }

        let mut end = self.pos;
        while end < self.len() && !self.bytes[end].is_ascii_whitespace() {
            end += 1;
        }
        self.word_memo = Some((self.pos, end));

        Some(&self.src[self.pos..end])
    }

    /// Identifier run starting at `at`: leading letter or underscore, then
    /// alphanumerics/underscores.  Returns the end index without advancing.
    fn identifier_end(&self, at: usize) -> Option<usize> {
        let first = *self.bytes.get(at)?;
        if !(first.is_ascii_alphabetic() || first == b'_') {
            return None;
        }

        let mut end = at + 1;
        while end < self.len()
            && (self.bytes[end].is_ascii_alphanumeric() || self.bytes[end] == b'_')
        {
            end += 1;
        }
        Some(end)
    }

    /// Peek the identifier at the cursor without consuming it.  Used to tell
    /// a malformed function call apart from a truly invalid expression.
    pub fn peek_identifier(&mut self) -> Option<String> {
        self.skip_whitespace();
        let end = self.identifier_end(self.pos)?;
        Some(self.src[self.pos..end].to_string())
    }

    // ───────────────────────────── matchers ─────────────────────────────

    /// Numeric literal: optional sign, digits, optional fraction, optional
    /// exponent.  The sign is only consumed when `allow_sign` is set (i.e.
    /// where a unary operator would also have been legal).
    pub fn try_number(&mut self, allow_sign: bool) -> Option<f64> {
        self.skip_whitespace();
        let start = self.pos;
        let mut i = self.pos;

        if allow_sign && matches!(self.bytes.get(i), Some(b'+') | Some(b'-')) {
            i += 1;
        }

        let digits_start = i;
        while i < self.len() && self.bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits_start {
            return None;
        }

        if self.bytes.get(i) == Some(&b'.')
            && self.bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
        {
            i += 1;
            while i < self.len() && self.bytes[i].is_ascii_digit() {
                i += 1;
            }
        }

        if matches!(self.bytes.get(i), Some(b'e') | Some(b'E')) {
            let mark = i;
            let mut j = i + 1;
            if matches!(self.bytes.get(j), Some(b'+') | Some(b'-')) {
                j += 1;
            }
            let exp_start = j;
            while j < self.len() && self.bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = if j > exp_start { j } else { mark };
        }

        // `123abc` is not a number followed by an identifier; decline and
        // let the caller report the malformed token.
        if self
            .bytes
            .get(i)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            return None;
        }

        let n: f64 = self.src[start..i].parse().ok()?;
        self.pos = i;
        Some(n)
    }

    /// Hexadecimal literal: `0x` followed by hex digits.
    pub fn try_hex(&mut self) -> Option<f64> {
        self.skip_whitespace();
        if self.bytes.get(self.pos) != Some(&b'0')
            || !matches!(self.bytes.get(self.pos + 1), Some(b'x') | Some(b'X'))
        {
            return None;
        }

        let digits_start = self.pos + 2;
        let mut i = digits_start;
        while i < self.len() && self.bytes[i].is_ascii_hexdigit() {
            i += 1;
        }
        if i == digits_start
            || self
                .bytes
                .get(i)
                .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            return None;
        }

        let n = i64::from_str_radix(&self.src[digits_start..i], 16).ok()?;
        self.pos = i;
        Some(n as f64)
    }

    /// Boolean literal (`true` / `false`, case-insensitive).  A trailing `$`
    /// means this is a variable named `true`, not a literal.
    pub fn try_bool(&mut self) -> Option<bool> {
        self.skip_whitespace();
        let end = self.identifier_end(self.pos)?;
        if self.bytes.get(end) == Some(&b'$') {
            return None;
        }

        let word = &self.src[self.pos..end];
        let value = if word.eq_ignore_ascii_case("true") {
            true
        } else if word.eq_ignore_ascii_case("false") {
            false
        } else {
            return None;
        };

        self.pos = end;
        Some(value)
    }

    /// The `null` literal.
    pub fn try_null(&mut self) -> bool {
        self.skip_whitespace();
        let Some(end) = self.identifier_end(self.pos) else {
            return false;
        };
        if self.bytes.get(end) == Some(&b'$') {
            return false;
        }
        if !self.src[self.pos..end].eq_ignore_ascii_case("null") {
            return false;
        }

        self.pos = end;
        true
    }

    /// Quoted string (single or double quotes) with backslash escapes.
    /// Unterminated quotes and escapes are immediate lex errors.
    pub fn try_string(&mut self) -> Result<Option<String>> {
        self.skip_whitespace();
        let quote = match self.bytes.get(self.pos) {
            Some(q @ (b'"' | b'\'')) => *q,
            _ => return Ok(None),
        };

        let mut out = String::new();
        let mut i = self.pos + 1;

        loop {
            // Bulk-skip to the next interesting byte.
            let Some(offset) = memchr2(quote, b'\\', &self.bytes[i..]) else {
                return Err(BasicError::lex(self.line, "Unterminated string"));
            };
            out.push_str(&self.src[i..i + offset]);
            let j = i + offset;

            if self.bytes[j] == quote {
                self.pos = j + 1;
                return Ok(Some(out));
            }

            // Backslash escape.
            let Some(&escape) = self.bytes.get(j + 1) else {
                return Err(BasicError::lex(self.line, "Unterminated escape sequence"));
            };

            if escape == b'u' {
                let hex = self
                    .src
                    .get(j + 2..j + 6)
                    .filter(|h| h.bytes().all(|b| b.is_ascii_hexdigit()))
                    .ok_or_else(|| {
                        BasicError::lex(self.line, "Unterminated escape sequence")
                    })?;
                let code = u32::from_str_radix(hex, 16).expect("hex digits verified");
                let ch = char::from_u32(code).ok_or_else(|| {
                    BasicError::lex(self.line, format!("Invalid unicode escape \\u{}", hex))
                })?;
                out.push(ch);
                i = j + 6;
            } else if let Some(&mapped) = ESCAPES.get(&escape) {
                out.push(mapped as char);
                i = j + 2;
            } else {
                return Err(BasicError::lex(
                    self.line,
                    format!("Invalid escape sequence \\{}", escape as char),
                ));
            }
        }
    }

    /// Grouped expression / argument list after whitespace.
    pub fn try_group(&mut self) -> Result<Option<Group>> {
        self.skip_whitespace();
        self.group_at()
    }

    /// Grouped expression / argument list at the exact cursor position
    /// (no whitespace skip; variable indices and call groups must be
    /// adjacent to their identifier).
    fn group_at(&mut self) -> Result<Option<Group>> {
        let open = match self.bytes.get(self.pos) {
            Some(b @ (b'(' | b'[')) => *b,
            _ => return Ok(None),
        };

        let mut depth = 0usize;
        let mut splits: Vec<usize> = Vec::new();
        let mut i = self.pos;

        while i < self.len() {
            match self.bytes[i] {
                b'(' | b'[' => depth += 1,
                b')' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        let inner = self.src[self.pos + 1..i].to_string();
                        let args = split_at(&inner, &splits, self.pos + 1);
                        self.pos = i + 1;
                        return Ok(Some(Group { open, inner, args }));
                    }
                }
                b'"' | b'\'' => {
                    i = skip_quoted(self.bytes, i, self.line)?;
                    continue;
                }
                b',' if depth == 1 => splits.push(i),
                _ => {}
            }
            i += 1;
        }

        Err(BasicError::lex(self.line, "Unterminated group"))
    }

    /// Variable reference: identifier immediately followed by the `$` sigil,
    /// then zero or more adjacent bracketed index groups.
    pub fn try_variable(&mut self) -> Result<Option<(String, Vec<String>)>> {
        self.skip_whitespace();
        let Some(end) = self.identifier_end(self.pos) else {
            return Ok(None);
        };
        if self.bytes.get(end) != Some(&b'$') {
            return Ok(None);
        }

        let name = self.src[self.pos..end].to_string();
        self.pos = end + 1;

        let mut indices = Vec::new();
        while self.bytes.get(self.pos) == Some(&b'[') {
            let group = self.group_at()?.expect("open bracket verified");
            indices.push(group.inner.trim().to_string());
        }

        Ok(Some((name, indices)))
    }

    /// Macro token: `@` followed by an identifier.
    pub fn try_macro(&mut self) -> Option<String> {
        self.skip_whitespace();
        if self.bytes.get(self.pos) != Some(&b'@') {
            return None;
        }
        let end = self.identifier_end(self.pos + 1)?;
        let name = self.src[self.pos + 1..end].to_string();
        self.pos = end;
        Some(name)
    }

    /// Function call: identifier immediately followed by a parenthesized
    /// argument group, with no whitespace in between.
    pub fn try_call(&mut self) -> Result<Option<(String, Vec<String>)>> {
        self.skip_whitespace();
        let Some(end) = self.identifier_end(self.pos) else {
            return Ok(None);
        };
        if self.bytes.get(end) != Some(&b'(') {
            return Ok(None);
        }

        let name = self.src[self.pos..end].to_string();
        self.pos = end;
        let group = self.group_at()?.expect("open paren verified");

        Ok(Some((name, group.args)))
    }

    // ──────────────────────────── dispatcher ────────────────────────────

    /// Produce the next token, trying matchers in the fixed priority order:
    /// group-open, string, unary operator (only legal when the previous
    /// token was absent, a binary operator, or another unary), function
    /// call, null, variable, macro, hexadecimal, boolean, numeric, binary
    /// operator.  Returns `Ok(None)` at end of input.
    pub fn next_token(&mut self, ops: &Operators, unary_legal: bool) -> Result<Option<Token>> {
        if self.is_at_end() {
            return Ok(None);
        }

        if self.bytes[self.pos] == b'(' {
            let group = self.group_at()?.expect("open paren verified");
            debug!("Scanned group ({})", group.inner);
            return Ok(Some(Token::Group(group.inner)));
        }

        if let Some(s) = self.try_string()? {
            return Ok(Some(Token::Str(s)));
        }

        if unary_legal {
            if let Some((len, op)) = ops.match_unary(self.rest()) {
                self.pos += len;
                debug!("Scanned unary operator {}", op.text);
                return Ok(Some(Token::Unary(op)));
            }
        }

        if let Some((name, args)) = self.try_call()? {
            return Ok(Some(Token::Call { name, args }));
        }

        if self.try_null() {
            return Ok(Some(Token::Null));
        }

        if let Some((name, indices)) = self.try_variable()? {
            return Ok(Some(Token::Variable { name, indices }));
        }

        if let Some(name) = self.try_macro() {
            return Ok(Some(Token::Macro(name)));
        }

        if let Some(n) = self.try_hex() {
            return Ok(Some(Token::Number(n)));
        }

        if let Some(b) = self.try_bool() {
            return Ok(Some(Token::Bool(b)));
        }

        if let Some(n) = self.try_number(unary_legal) {
            return Ok(Some(Token::Number(n)));
        }

        if let Some((len, op)) = ops.match_binary(self.rest()) {
            self.pos += len;
            debug!("Scanned binary operator {}", op.text);
            return Ok(Some(Token::Binary(op)));
        }

        let word = self.peek_word().unwrap_or(self.rest());
        Err(BasicError::lex(
            self.line,
            format!("Unrecognized token '{}'", word),
        ))
    }
}

/// Skip a quoted run starting at the opening quote; returns the index one
/// past the closing quote.  Escapes are honored but not decoded.
pub(crate) fn skip_quoted(bytes: &[u8], start: usize, line: usize) -> Result<usize> {
    let quote = bytes[start];
    let mut i = start + 1;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }

    Err(BasicError::lex(line, "Unterminated string"))
}

/// Slice `inner` at the recorded comma positions (absolute byte offsets,
/// `base` being the offset of `inner`'s first byte), trimming each piece.
fn split_at(inner: &str, splits: &[usize], base: usize) -> Vec<String> {
    if inner.trim().is_empty() {
        return Vec::new();
    }

    let mut args = Vec::with_capacity(splits.len() + 1);
    let mut start = 0usize;
    for &abs in splits {
        let rel = abs - base;
        args.push(inner[start..rel].trim().to_string());
        start = rel + 1;
    }
    args.push(inner[start..].trim().to_string());
    args
}

/// Split `text` at top-level commas, honoring quoted strings and bracketed
/// groups.  Used by statement parsing (PRINT argument lists).
pub fn split_arguments(text: &str, line: usize) -> Result<Vec<String>> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut args = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i, line)?;
                continue;
            }
            b',' if depth == 0 => {
                args.push(text[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    args.push(text[start..].trim().to_string());
    Ok(args)
}
