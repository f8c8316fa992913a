//! Escaping for free-form strings inside comma-separated records.
//!
//! Target ids and property values may contain any character, but records are
//! comma separated and newline terminated. `encode` replaces the separators
//! with `$`-escapes:
//!
//! | raw  | encoded |
//! |------|---------|
//! | `$`  | `$$`    |
//! | `,`  | `$k`    |
//! | `\n` | `$n`    |
//! | `\r` | `$r`    |

use crate::error::{CoreError, Result};

/// Escape a string so it contains no `,`, `\n` or `\r`.
pub fn encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '$' => out.push_str("$$"),
            ',' => out.push_str("$k"),
            '\n' => out.push_str("$n"),
            '\r' => out.push_str("$r"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse [`encode`].
pub fn decode(encoded: &str) -> Result<String> {
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('$') => out.push('$'),
            Some('k') => out.push(','),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                return Err(CoreError::MalformedEncoding(format!(
                    "unknown escape ${} in {:?}",
                    other, encoded
                )))
            }
            None => {
                return Err(CoreError::MalformedEncoding(format!(
                    "dangling escape in {:?}",
                    encoded
                )))
            }
        }
    }
    Ok(out)
}
