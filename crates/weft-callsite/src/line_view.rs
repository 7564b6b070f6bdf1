//! Allocation-minimizing views over rendered stack lines.
//!
//! Call-site extraction runs on hot assembly paths, so parsing a multi-line
//! stack text must not allocate one string per line. A [`StackLineView`] is
//! a read-only window `[start, end)` into the original buffer; every derived
//! view narrows the window, and nothing is copied until
//! [`StackLineView::to_text`].

use crate::classify::is_user_code;
use crate::config::config;

/// A read-only window over one rendered frame line inside a larger buffer.
///
/// Invariant: `0 <= start <= end <= buffer.len()`, both offsets on char
/// boundaries. All operations honor the window; they never read or match
/// text adjacent to it, even when the underlying buffer continues.
#[derive(Debug, Clone, Copy)]
pub struct StackLineView<'a> {
    buffer: &'a str,
    start: usize,
    end: usize,
}

impl<'a> StackLineView<'a> {
    /// Creates a view over `buffer[start..end]`.
    ///
    /// Panics when the bounds are out of range or off char boundaries, the
    /// same as slicing `buffer` directly.
    pub fn new(buffer: &'a str, start: usize, end: usize) -> Self {
        let _ = &buffer[start..end];
        Self { buffer, start, end }
    }

    /// The window content as a borrowed slice of the original buffer.
    pub fn as_str(&self) -> &'a str {
        &self.buffer[self.start..self.end]
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Narrows the window to exclude leading and trailing whitespace.
    pub fn trim(self) -> Self {
        let content = self.as_str();
        let trimmed_start = content.trim_start();
        let start = self.start + (content.len() - trimmed_start.len());
        let trimmed = trimmed_start.trim_end();
        Self {
            buffer: self.buffer,
            start,
            end: start + trimmed.len(),
        }
    }

    /// Windowed substring search.
    pub fn contains(&self, needle: &str) -> bool {
        self.as_str().contains(needle)
    }

    /// Windowed prefix check.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.as_str().starts_with(prefix)
    }

    /// Whether the windowed row is caller code per the frame classifier.
    pub fn is_user_code(&self) -> bool {
        is_user_code(self.as_str())
    }

    /// Truncates at the first `'('`, dropping a `(file:line)` suffix. A row
    /// with no `'('` is returned unchanged.
    pub fn without_location_suffix(self) -> Self {
        match self.as_str().find('(') {
            Some(offset) => Self {
                buffer: self.buffer,
                start: self.start,
                end: self.start + offset,
            },
            None => self,
        }
    }

    /// Strips the configured internal namespace prefix when present.
    pub fn without_internal_prefix(self) -> Self {
        let prefix = config().internal_prefix.as_str();
        if self.as_str().starts_with(prefix) {
            Self {
                buffer: self.buffer,
                start: self.start + prefix.len(),
                end: self.end,
            }
        } else {
            self
        }
    }

    /// Materializes the window as an owned string. The only allocating
    /// operation on a view.
    pub fn to_text(&self) -> String {
        self.as_str().to_string()
    }
}

/// Lazily enumerates trimmed, non-blank line views of `source`. Blank and
/// whitespace-only lines are skipped entirely, not counted.
pub fn trimmed_nonempty_lines(source: &str) -> TrimmedLines<'_> {
    TrimmedLines { source, index: 0 }
}

pub struct TrimmedLines<'a> {
    source: &'a str,
    index: usize,
}

impl<'a> Iterator for TrimmedLines<'a> {
    type Item = StackLineView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.source.len() {
            let rest = &self.source[self.index..];
            let (line_len, step) = match rest.find('\n') {
                Some(newline) => (newline, newline + 1),
                None => (rest.len(), rest.len()),
            };
            let start = self.index;
            self.index += step;
            let view = StackLineView::new(self.source, start, start + line_len).trim();
            if !view.is_empty() {
                return Some(view);
            }
        }
        None
    }
}
