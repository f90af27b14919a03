mod parsers;
mod scanner;

use parsers::{
    is_block_comment_end, is_block_comment_start, is_line_comment_start, matches_tag,
    try_start_dollar_quote,
};
use scanner::{State, scan_ordinal};

use crate::error::ArrowSqlError;

/// Placeholder convention a backend binds parameters with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// Ordinal placeholders like `$1`, bound by index (`PostgreSQL`).
    Ordinal,
    /// A single positional token `?`, bound strictly by position (`SQLite`, Flight SQL).
    Positional,
}

impl PlaceholderStyle {
    /// The token a positional backend expects in place of every ordinal placeholder.
    pub const POSITIONAL_TOKEN: &'static str = "?";
}

/// One `$N` occurrence in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdinalPlaceholder {
    /// Byte offset of the `$`.
    pub start: usize,
    /// Byte offset one past the last digit.
    pub end: usize,
    /// The 1-based ordinal (`$3` is 3).
    pub index: usize,
}

/// A query rewritten to positional placeholders plus the payload column bound to each `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalQuery {
    pub sql: String,
    /// Zero-based payload column index for each `?`, in text order.
    pub binding_order: Vec<usize>,
}

/// Find every ordinal placeholder in `sql`, in text order.
///
/// Quoted strings, quoted identifiers, comments, and dollar-quoted bodies are skipped via a
/// lightweight state machine. Indices are parsed numerically, so `$10` is ten.
///
/// # Errors
/// Returns `ArrowSqlError::ArgumentError` for `$0` or an index that does not fit in `usize`.
pub fn ordinal_placeholders(sql: &str) -> Result<Vec<OrdinalPlaceholder>, ArrowSqlError> {
    let mut found = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    } else if let Some((digits_end, index)) = scan_ordinal(bytes, idx)? {
                        found.push(OrdinalPlaceholder {
                            start: idx,
                            end: digits_end,
                            index,
                        });
                        idx = digits_end - 1;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    idx += 1;
                    if depth == 1 {
                        state = State::Normal;
                    } else {
                        state = State::BlockComment(depth - 1);
                    }
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }

        idx += 1;
    }

    Ok(found)
}

/// Highest ordinal referenced by `sql`, or 0 when it has no placeholders.
///
/// # Errors
/// Propagates scanning errors from [`ordinal_placeholders`].
pub fn max_ordinal(sql: &str) -> Result<usize, ArrowSqlError> {
    Ok(ordinal_placeholders(sql)?
        .iter()
        .map(|p| p.index)
        .max()
        .unwrap_or(0))
}

/// Rewrite every `$N` in `sql` to `?` and report which payload column each `?` binds.
///
/// For `"... $2 ... $1"` the binding order is `[1, 0]`: the first `?` takes the second
/// payload column. A placeholder used twice yields its column twice.
///
/// # Errors
/// Propagates scanning errors from [`ordinal_placeholders`].
pub fn rewrite_to_positional(sql: &str) -> Result<PositionalQuery, ArrowSqlError> {
    let placeholders = ordinal_placeholders(sql)?;
    let mut out = String::with_capacity(sql.len());
    let mut copied_to = 0;
    let mut binding_order = Vec::with_capacity(placeholders.len());

    for placeholder in &placeholders {
        out.push_str(&sql[copied_to..placeholder.start]);
        out.push_str(PlaceholderStyle::POSITIONAL_TOKEN);
        copied_to = placeholder.end;
        binding_order.push(placeholder.index - 1);
    }
    out.push_str(&sql[copied_to..]);

    Ok(PositionalQuery {
        sql: out,
        binding_order,
    })
}
