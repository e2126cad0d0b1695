//! Segmenter: split parsed document text into model-sized chunks.
//!
//! Segmentation is lossless: concatenating the segment texts gives back the
//! input byte for byte. Separators stay attached to the segment they end.
//! Within each window of `max_chars` characters the cut goes after the last
//! of, in order of preference:
//!
//! 1. a page break (`\n---\n` between pages, or a form feed)
//! 2. a blank line
//! 3. a newline
//! 4. any whitespace
//!
//! and only when the window has none of these is it cut hard at
//! `max_chars`, always on a char boundary.

use crate::model::Segment;

const PAGE_BREAK: &str = "\n---\n";
const FORM_FEED: char = '\x0c';

/// Split `text` into segments of at most `max_chars` characters.
///
/// The returned iterator is lazy and `Clone`; cloning it before consuming
/// restarts segmentation from the beginning. A `max_chars` of zero is
/// treated as one.
pub fn segment(text: &str, max_chars: usize) -> Segments<'_> {
    Segments {
        text,
        pos: 0,
        index: 0,
        max_chars: max_chars.max(1),
    }
}

/// Lazy iterator over the [`Segment`]s of a text. See [`segment`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    pos: usize,
    index: usize,
    max_chars: usize,
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.pos >= self.text.len() {
            return None;
        }
        let rest = &self.text[self.pos..];
        let cut = match rest.char_indices().nth(self.max_chars) {
            None => rest.len(),
            Some((window_end, _)) => find_cut(&rest[..window_end]),
        };

        let seg = Segment {
            index: self.index,
            text: rest[..cut].to_string(),
        };
        self.pos += cut;
        self.index += 1;
        Some(seg)
    }
}

/// Byte offset just past the preferred separator in `window`, or the
/// window's end when it has none.
fn find_cut(window: &str) -> usize {
    let page_break = window
        .rfind(PAGE_BREAK)
        .map(|i| i + PAGE_BREAK.len())
        .max(window.rfind(FORM_FEED).map(|i| i + FORM_FEED.len_utf8()));

    page_break
        .or_else(|| window.rfind("\n\n").map(|i| i + 2))
        .or_else(|| window.rfind('\n').map(|i| i + 1))
        .or_else(|| {
            window
                .char_indices()
                .rev()
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, c)| i + c.len_utf8())
        })
        .unwrap_or(window.len())
}
