use crate::error::ArrowSqlError;

/// Lexical context of the placeholder scan. `$N` only counts as a placeholder in `Normal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    /// Nesting depth of `/* ... */`.
    BlockComment(u32),
    /// Inside `$tag$ ... $tag$`.
    DollarQuoted(String),
}

/// Read the ordinal of a `$N` placeholder whose `$` sits at `dollar`.
///
/// Returns the index one past the last digit and the ordinal, or `None` when no digits
/// follow the `$`.
///
/// # Errors
/// `$0` and ordinals that overflow `usize` are rejected as `ArgumentError`.
pub(super) fn scan_ordinal(
    bytes: &[u8],
    dollar: usize,
) -> Result<Option<(usize, usize)>, ArrowSqlError> {
    let start = dollar + 1;
    let end = start
        + bytes
            .get(start..)
            .unwrap_or_default()
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
    if end == start {
        return Ok(None);
    }

    let ordinal = bytes[start..end].iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(10)?.checked_add(usize::from(b - b'0'))
    });
    match ordinal {
        None => Err(ArrowSqlError::ArgumentError(format!(
            "placeholder ${} is out of range",
            String::from_utf8_lossy(&bytes[start..end])
        ))),
        Some(0) => Err(ArrowSqlError::ArgumentError(
            "placeholder $0 is not valid; ordinal placeholders start at $1".into(),
        )),
        Some(ordinal) => Ok(Some((end, ordinal))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_multi_digit_ordinals() {
        assert_eq!(scan_ordinal(b"a = $12 AND", 4).unwrap(), Some((7, 12)));
        assert_eq!(scan_ordinal(b"$1", 0).unwrap(), Some((2, 1)));
        assert_eq!(scan_ordinal(b"$tag$", 0).unwrap(), None);
        assert_eq!(scan_ordinal(b"$", 0).unwrap(), None);
    }

    #[test]
    fn rejects_zero_and_overflow() {
        assert!(scan_ordinal(b"$0", 0).is_err());
        assert!(scan_ordinal(b"$99999999999999999999999", 0).is_err());
    }
}
