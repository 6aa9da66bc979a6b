//! Reading task pairs and writing results.

use std::fmt::Display;
use std::io::{self, Write};

use crate::error::{BunchError, Result};

/// Parse whitespace-separated integer pairs, one per line.
///
/// Blank lines are skipped. Any other line must hold exactly two integers.
///
/// # Errors
///
/// Returns [`BunchError::InvalidInput`] with the 1-based line number of the
/// first malformed line.
///
/// # Examples
///
/// ```
/// use taskbunch::input::parse_pairs;
///
/// let pairs = parse_pairs("2 3\n\n10\t20\n").unwrap();
/// assert_eq!(pairs, vec![(2, 3), (10, 20)]);
/// assert!(parse_pairs("1 2 3").is_err());
/// ```
pub fn parse_pairs(text: &str) -> Result<Vec<(i64, i64)>> {
    let mut pairs = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line_no = number + 1;
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        let second = fields.next().ok_or_else(|| BunchError::InvalidInput {
            line: line_no,
            reason: "expected two integers, found one".to_string(),
        })?;
        if fields.next().is_some() {
            return Err(BunchError::InvalidInput {
                line: line_no,
                reason: "expected two integers, found more".to_string(),
            });
        }
        pairs.push((parse_int(first, line_no)?, parse_int(second, line_no)?));
    }
    Ok(pairs)
}

fn parse_int(field: &str, line: usize) -> Result<i64> {
    field.parse().map_err(|e| BunchError::InvalidInput {
        line,
        reason: format!("'{field}' is not an integer: {e}"),
    })
}

/// Write one result per line.
pub fn write_results<W, T>(mut out: W, results: &[T]) -> io::Result<()>
where
    W: Write,
    T: Display,
{
    for result in results {
        writeln!(out, "{result}")?;
    }
    out.flush()
}
