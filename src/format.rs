//! Inline `**bold**` formatting for message content.

use std::sync::OnceLock;

use regex::{Matches, Regex};

static BOLD_PATTERN: OnceLock<Regex> = OnceLock::new();

fn bold_pattern() -> &'static Regex {
    BOLD_PATTERN.get_or_init(|| Regex::new(r"\*\*.*?\*\*").expect("bold pattern is valid"))
}

/// A run of message text, either plain or emphasized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment<'a> {
    Plain(&'a str),
    /// Text that was wrapped in `**`, delimiters stripped.
    Bold(&'a str),
}

impl<'a> Fragment<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Fragment::Plain(s) | Fragment::Bold(s) => s,
        }
    }
}

/// Lazy iterator returned by [`format_inline`].
pub struct InlineFragments<'a> {
    text: &'a str,
    matches: Matches<'static, 'a>,
    cursor: usize,
    queued: Option<Fragment<'a>>,
}

/// Split `content` on non-greedy `**...**` runs.
///
/// Fragments come out in source order with nothing merged. Empty plain runs
/// (around a match at either end, or between two adjacent matches) are skipped.
/// A bold run never spans a newline.
pub fn format_inline(content: &str) -> InlineFragments<'_> {
    InlineFragments {
        text: content,
        matches: bold_pattern().find_iter(content),
        cursor: 0,
        queued: None,
    }
}

impl<'a> Iterator for InlineFragments<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(fragment) = self.queued.take() {
            return Some(fragment);
        }

        match self.matches.next() {
            Some(m) => {
                let plain = &self.text[self.cursor..m.start()];
                self.cursor = m.end();

                let delimited = m.as_str();
                let bold = Fragment::Bold(&delimited[2..delimited.len() - 2]);

                if plain.is_empty() {
                    Some(bold)
                } else {
                    self.queued = Some(bold);
                    Some(Fragment::Plain(plain))
                }
            }
            None if self.cursor < self.text.len() => {
                let rest = &self.text[self.cursor..];
                self.cursor = self.text.len();
                Some(Fragment::Plain(rest))
            }
            None => None,
        }
    }
}
