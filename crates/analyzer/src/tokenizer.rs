//! Word/punctuation tokenizer.
//!
//! Offsets are character (Unicode scalar) positions, half-open.

use textq_core::TokenSpan;

/// Characters that may join two alphanumeric runs into one token
/// (`well-known`, `don't`, `snake_case`).
const WORD_JOINERS: &[char] = &['-', '\'', '\u{2019}', '_'];

/// Characters that may join two digit runs (`3.14`, `1,000`).
const NUMBER_JOINERS: &[char] = &['.', ','];

/// Sentence terminators; a mixed run of these forms a single token (`?!`, `...`).
pub(crate) const TERMINATORS: &[char] = &['.', '!', '?', '\u{2026}'];

/// Split `text` into tokens. Every non-whitespace character belongs to exactly one token.
pub fn tokenize(text: &str) -> Vec<TokenSpan> {
    let chars: Vec<char> = text.chars().collect();
    tokenize_chars(&chars)
}

pub(crate) fn tokenize_chars(chars: &[char]) -> Vec<TokenSpan> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        if c.is_alphanumeric() {
            i = word_end(chars, i);
        } else if TERMINATORS.contains(&c) {
            while i < chars.len() && TERMINATORS.contains(&chars[i]) {
                i += 1;
            }
        } else {
            while i < chars.len() && chars[i] == c {
                i += 1;
            }
        }

        tokens.push(TokenSpan {
            text: chars[start..i].iter().collect(),
            start,
            end: i,
        });
    }

    tokens
}

fn word_end(chars: &[char], mut i: usize) -> usize {
    loop {
        while i < chars.len() && chars[i].is_alphanumeric() {
            i += 1;
        }

        let (Some(&joiner), Some(&next)) = (chars.get(i), chars.get(i + 1)) else {
            return i;
        };
        let prev = chars[i - 1];

        let joins_word = WORD_JOINERS.contains(&joiner) && next.is_alphanumeric();
        let joins_number = NUMBER_JOINERS.contains(&joiner)
            && prev.is_ascii_digit()
            && next.is_ascii_digit();

        if joins_word || joins_number {
            i += 1;
        } else {
            return i;
        }
    }
}
