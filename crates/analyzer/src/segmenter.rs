//! Rule-based sentence segmentation.
//!
//! A sentence ends after a run of terminators (`.`, `!`, `?`, `…`), optionally
//! followed by closing quotes/brackets, when the next non-space character does
//! not continue the sentence. A blank line always ends a sentence.

use textq_core::{AnalysisResult, Span};

use crate::analyzer::{Analyzer, AnalyzerError};
use crate::tokenizer::{TERMINATORS, tokenize_chars};

const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '\u{bb}', '\u{201d}', '\u{2019}'];

/// Default analyzer: rule-based sentence splitting plus [`crate::tokenizer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleSegmenter;

impl RuleSegmenter {
    pub fn new() -> Self {
        Self
    }

    /// Sentence spans for `text` (character offsets, whitespace trimmed).
    pub fn sentences(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        sentence_spans(&chars)
    }
}

impl Analyzer for RuleSegmenter {
    fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalyzerError> {
        let chars: Vec<char> = text.chars().collect();
        Ok(AnalysisResult {
            sentences: sentence_spans(&chars),
            tokens: tokenize_chars(&chars),
        })
    }
}

fn sentence_spans(chars: &[char]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' && blank_line_follows(chars, i) {
            push_trimmed(&mut spans, chars, start, i);
            start = i;
            i += 1;
            continue;
        }

        if !TERMINATORS.contains(&c) {
            i += 1;
            continue;
        }

        let run_start = i;
        while i < chars.len() && TERMINATORS.contains(&chars[i]) {
            i += 1;
        }
        while i < chars.len() && CLOSERS.contains(&chars[i]) {
            i += 1;
        }

        if ends_sentence(chars, run_start, i) {
            push_trimmed(&mut spans, chars, start, i);
            start = i;
        }
    }

    push_trimmed(&mut spans, chars, start, chars.len());
    spans
}

/// Decide whether the terminator run `[run_start, end)` closes a sentence.
fn ends_sentence(chars: &[char], run_start: usize, end: usize) -> bool {
    let Some(&after) = chars.get(end) else {
        return true;
    };
    if !after.is_whitespace() {
        // "3.14", "e.g.x", "file.txt"
        return false;
    }

    let next = chars[end..].iter().find(|c| !c.is_whitespace());
    let Some(&next) = next else {
        return true;
    };
    if next.is_lowercase() {
        return false;
    }

    // A single '.' after a lone capital letter is an initial ("J. Smith").
    let single_dot = end - run_start == 1 && chars[run_start] == '.';
    if single_dot && is_initial(chars, run_start) {
        return false;
    }

    true
}

fn is_initial(chars: &[char], dot: usize) -> bool {
    if dot == 0 || !chars[dot - 1].is_uppercase() {
        return false;
    }
    dot == 1 || !chars[dot - 2].is_alphanumeric()
}

fn blank_line_follows(chars: &[char], newline: usize) -> bool {
    chars[newline + 1..]
        .iter()
        .take_while(|c| c.is_whitespace())
        .any(|&c| c == '\n')
}

fn push_trimmed(spans: &mut Vec<Span>, chars: &[char], mut start: usize, mut end: usize) {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if start < end {
        spans.push(Span::new(start, end));
    }
}
