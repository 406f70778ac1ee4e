// src/core/tokenizer.rs

use crate::{
    constants::{ESCAPE_CHARACTER, INLINE_VALUE_SEPARATOR, LONG_NAME_PREFIX, SHORT_NAME_PREFIX},
    core::config::TokenizerOptions,
    models::{Token, TokenType},
};
use std::borrow::Cow;

/// A lazy, single-pass tokenizer over a raw command string.
///
/// The tokenizer borrows the input and never allocates unless a token contains quote
/// characters that have to be removed. It is `Clone`, which is how the tree search
/// explores alternatives: each candidate works on its own copy and the original
/// position is left untouched.
///
/// # Rules
/// - Tokens are separated by the delimiter, except inside a quoted span.
/// - `--name` is a long name; `--name=value` is a long name followed by a value.
/// - `-n` (a dash and exactly one character) is a short name.
/// - Everything else is a value. A segment that contained quotes is always a value.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    rest: &'a str,
    options: TokenizerOptions,
    /// The value half of a `--name=value` segment, yielded on the next call.
    pending_value: Option<&'a str>,
    /// Set once the last segment has been split off. A trailing delimiter leaves an empty
    /// `rest` that is still a segment of its own.
    finished: bool,
}

/// A raw segment between two delimiters.
struct Segment<'a> {
    raw: &'a str,
    quoted: bool,
}

impl<'a> Tokenizer<'a> {
    /// A tokenizer over `input`. Nothing is split until the first call to `next`.
    pub fn new(input: &'a str, options: TokenizerOptions) -> Self {
        Self {
            rest: input,
            options,
            pending_value: None,
            finished: input.is_empty(),
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&self) -> Option<Token<'a>> {
        self.clone().next()
    }

    /// Returns `true` when no tokens remain.
    pub fn is_exhausted(&self) -> bool {
        self.peek().is_none()
    }

    /// Splits off the next raw segment, honoring quoted spans.
    fn next_segment(&mut self) -> Option<Segment<'a>> {
        if self.finished {
            return None;
        }

        let quote = self.options.quote_character;
        let mut in_quotes = false;
        let mut quoted = false;
        let mut escaped = false;
        let mut end = None;

        for (i, c) in self.rest.char_indices() {
            if escaped {
                escaped = false;
                if c == quote {
                    continue;
                }
            }
            if c == ESCAPE_CHARACTER {
                escaped = true;
            } else if c == quote {
                in_quotes = !in_quotes;
                quoted = true;
            } else if c == self.options.delimiter && !in_quotes {
                end = Some(i);
                break;
            }
        }

        let raw = match end {
            Some(i) => {
                let raw = self.rest.get(..i).unwrap_or_default();
                let skip = i + self.options.delimiter.len_utf8();
                self.rest = self.rest.get(skip..).unwrap_or_default();
                raw
            }
            None => {
                self.finished = true;
                std::mem::take(&mut self.rest)
            }
        };

        Some(Segment { raw, quoted })
    }

    /// Removes unescaped quote characters and unescapes `\"`.
    fn unquote(&self, raw: &'a str) -> Cow<'a, str> {
        let quote = self.options.quote_character;
        if !raw.contains(quote) && !raw.contains(ESCAPE_CHARACTER) {
            return Cow::Borrowed(raw);
        }

        let mut text = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();
        while let Some(c) = chars.next() {
            if c == ESCAPE_CHARACTER && chars.peek() == Some(&quote) {
                text.push(quote);
                chars.next();
            } else if c != quote {
                text.push(c);
            }
        }
        Cow::Owned(text)
    }

    fn classify(&mut self, segment: Segment<'a>) -> Token<'a> {
        let raw = segment.raw;
        if segment.quoted && !raw.starts_with(LONG_NAME_PREFIX) {
            return Token::value(self.unquote(raw));
        }

        if let Some(name) = raw.strip_prefix(LONG_NAME_PREFIX)
            && !name.is_empty()
        {
            if let Some((name, value)) = name.split_once(INLINE_VALUE_SEPARATOR) {
                self.pending_value = Some(value);
                return Token::long_name(name);
            }
            if !segment.quoted {
                return Token::long_name(name);
            }
        }

        if !segment.quoted
            && !raw.starts_with(LONG_NAME_PREFIX)
            && let Some(name) = raw.strip_prefix(SHORT_NAME_PREFIX)
            && name.chars().count() == 1
        {
            return Token::short_name(name);
        }

        Token::value(self.unquote(raw))
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(value) = self.pending_value.take() {
            return Some(Token::value(self.unquote(value)));
        }

        loop {
            let segment = self.next_segment()?;
            if segment.raw.is_empty() && !segment.quoted && self.options.ignore_empty_values {
                continue;
            }
            let token = self.classify(segment);
            log::trace!("Token: {:?}", token);
            return Some(token);
        }
    }
}

/// Collects the types of all tokens of `input`; used for diagnostics and tests.
pub fn token_types(input: &str, options: TokenizerOptions) -> Vec<TokenType> {
    Tokenizer::new(input, options)
        .map(|token| token.token_type)
        .collect()
}

// MARK: --- UNIT TESTS ---
