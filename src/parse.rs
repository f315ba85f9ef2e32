//! Line classification and entry splitting shared by the basis set and
//! pseudopotential modules, plus the fixed-width float rendering both
//! serializers use. Both CP2K formats have no schema tags; entry boundaries
//! are inferred purely from the shape of each line.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Cp2kFileError, Result};

static EMPTY_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(#.*)?$").unwrap());

// 1-3 letter element symbol, then at least one identifier. Body lines are all
// numeric, so they never match.
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z]{1,3})\s+(\S.*)$").unwrap());

/// True for lines both formats ignore anywhere in a file: blank lines and `#`
/// comments.
pub fn is_blank_or_comment(line: &str) -> bool {
    EMPTY_LINE.is_match(line)
}

/// Recognizes the shape of an entry header, returning the element symbol and
/// the remainder of the line. Only detects where a new entry starts; full
/// header parsing happens in the per-format parsers. Lines that don't match
/// are continuation lines, not errors.
pub fn match_header(line: &str) -> Option<(&str, &str)> {
    let caps = HEADER.captures(line)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Lazily groups the non-blank lines of a multi-entry file into per-entry
/// line groups. A new group opens at each header-shaped line once the current
/// group has content, so consecutive entries need no separator; the trailing
/// group is yielded at end of input. Malformed content only surfaces later,
/// when a group is handed to a parser.
pub struct EntryIter<'a> {
    lines: std::str::Lines<'a>,
    current: Vec<&'a str>,
}

impl<'a> EntryIter<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            current: Vec::new(),
        }
    }
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = Vec<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            if is_blank_or_comment(line) {
                continue;
            }

            if match_header(line).is_some() && !self.current.is_empty() {
                return Some(std::mem::replace(&mut self.current, vec![line.trim()]));
            }

            self.current.push(line.trim());
        }

        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

/// Splits an entry header line into the element and its identifiers.
/// Identifiers are ordered longest-first before picking the primary name:
/// some sets specify the valence electron count with an `<IDENTIFIER>-qN`
/// form, and that more specific identifier wins. The remaining identifiers
/// become extra aliases.
///
/// Returns `(element, name, tags, aliases)`.
pub(crate) fn split_identifiers(line: &str) -> Result<(String, String, Vec<String>, Vec<String>)> {
    let mut toks: Vec<&str> = line.split_whitespace().collect();

    if toks.len() < 2 || toks[0].len() > 3 || !toks[0].chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Cp2kFileError::MalformedHeader {
            line: line.to_string(),
        });
    }

    let element = toks.remove(0).to_string();

    // Stable, so equal-length identifiers keep their file order.
    toks.sort_by_key(|t| std::cmp::Reverse(t.len()));

    let name = toks.remove(0).to_string();
    let tags = name.split('-').map(str::to_string).collect();

    let mut aliases = vec![name.clone()];
    aliases.extend(toks.into_iter().map(str::to_string));

    Ok((element, name, tags, aliases))
}

/// Helper to prevent repetition in the row parsers.
pub(crate) fn parse_float_row(line: &str) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| Cp2kFileError::MalformedCoefficientRow {
                    line: line.to_string(),
                })
        })
        .collect()
}

/// Fixed-width, fixed-precision float rendering. CP2K expects Python-style
/// `{:> #14.12f}` columns; `format!` has no blank-sign flag, so the sign slot
/// is handled here.
#[derive(Clone, Copy, Debug)]
pub struct FloatFormat {
    pub width: usize,
    /// Fractional digits.
    pub precision: usize,
    /// Reserve a leading blank on non-negative values, so they line up with
    /// negative ones.
    pub blank_sign: bool,
}

impl FloatFormat {
    pub const fn new(width: usize, precision: usize, blank_sign: bool) -> Self {
        Self {
            width,
            precision,
            blank_sign,
        }
    }

    pub fn format(&self, v: f64) -> String {
        let mut s = format!("{:.prec$}", v, prec = self.precision);
        if self.blank_sign && !s.starts_with('-') {
            s.insert(0, ' ');
        }

        format!("{s:>width$}", width = self.width)
    }
}
