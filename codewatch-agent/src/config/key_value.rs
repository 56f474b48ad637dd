//! The `key=value;key=value` strings used to configure publishers.

use tracing::warn;

/// Parse a `;`-separated list of `key=value` pairs.
///
/// Whitespace around pairs, keys and values is trimmed and empty segments are
/// ignored. A segment without `=` or with an empty key is skipped with a
/// warning. The value is everything after the first `=`.
pub fn parse_key_values(input: &str) -> Vec<(String, String)> {
    input
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| match segment.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Some((key.trim().to_string(), value.trim().to_string()))
            }
            _ => {
                warn!(segment = %segment, "Ignoring malformed configuration segment");
                None
            }
        })
        .collect()
}
