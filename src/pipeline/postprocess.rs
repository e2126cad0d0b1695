//! Deterministic text cleanup on both sides of the model call.
//!
//! * [`clean_segment_text`] normalises parsed report text before it is put
//!   in a prompt. Parsed PDFs are full of hard-wrapped lines padded with
//!   runs of spaces, and the odd U+2028/U+2029 separator that some JSON
//!   encoders choke on.
//! * [`clean_response`] undoes common model quirks before the row grammar
//!   runs: an outer code fence despite the prompt, CRLF line endings and
//!   invisible Unicode.
//!
//! The table helpers ([`is_table_row`], [`is_separator_row`],
//! [`split_cells`]) are shared with the row parser.

use once_cell::sync::Lazy;
use regex::Regex;

// ── Model input ─────────────────────────────────────────────────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());

/// Normalise report text for the prompt.
///
/// 1. U+2028 / U+2029 become spaces
/// 2. CRLF → LF
/// 3. Runs of non-newline whitespace collapse to one space
/// 4. Lines are trimmed and blank lines dropped
pub fn clean_segment_text(input: &str) -> String {
    let s = input.replace(['\u{2028}', '\u{2029}'], " ");
    let s = normalise_line_endings(&s);
    let s = RE_SPACES.replace_all(&s, " ");
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Model output ────────────────────────────────────────────────────────────

/// Apply all response cleanup rules, in order:
///
/// 1. Strip an outer code fence (models sometimes disobey the prompt)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
pub fn clean_response(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    remove_invisible_chars(&s)
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Table helpers ───────────────────────────────────────────────────────────

/// A line that starts and ends with `|`.
pub fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

/// A row made only of `|`, `-`, `:` and spaces, with at least one dash.
pub fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') || !trimmed.contains('-') {
        return false;
    }
    trimmed
        .chars()
        .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

/// Trimmed cell contents of a table row, without the outer pipes.
pub fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|c| c.trim().to_string()).collect()
}
