//! Materialized-path codec for threaded posts.
//!
//! A post's path is the chain of post ids from the thread root down to the
//! post itself, stored as a single `.`-joined string (`"1.2.4"`). The stored
//! form is opaque outside this module; repositories decode it into a
//! `Vec<Id>` whose element-wise ordering (prefix before descendant) is the
//! sort key for depth-first thread listings.

use crate::models::Id;

/// Separator between ancestor ids in the stored form.
pub const SEPARATOR: char = '.';

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty path")]
    Empty,
    #[error("invalid path segment {0:?}")]
    Segment(String),
}

/// Join an ancestor chain into the stored string form.
pub fn encode(ids: &[Id]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// Split a stored path back into its ancestor chain.
///
/// A malformed value indicates corrupt rows, not caller error; callers treat
/// it as fatal for the request.
pub fn decode(raw: &str) -> Result<Vec<Id>, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    raw.split(SEPARATOR)
        .map(|seg| {
            seg.parse::<Id>()
                .map_err(|_| DecodeError::Segment(seg.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_chain() {
        assert_eq!(encode(&[1, 2, 4]), "1.2.4");
        assert_eq!(encode(&[7]), "7");
    }

    #[test]
    fn decodes_chain() {
        assert_eq!(decode("1.2.4").unwrap(), vec![1, 2, 4]);
        assert_eq!(decode("7").unwrap(), vec![7]);
    }

    #[test]
    fn round_trip() {
        for raw in ["1", "1.2", "10.2.33.4"] {
            assert_eq!(encode(&decode(raw).unwrap()), raw);
        }
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(decode("").unwrap_err(), DecodeError::Empty);
        assert_eq!(
            decode("1.x.3").unwrap_err(),
            DecodeError::Segment("x".into())
        );
        assert_eq!(decode("1..3").unwrap_err(), DecodeError::Segment("".into()));
    }

    #[test]
    fn decoded_paths_order_depth_first() {
        // Element-wise comparison, not string comparison: a parent sorts
        // immediately before its subtree and 10 sorts after 2.
        let mut paths = vec![
            decode("2").unwrap(),
            decode("1.3").unwrap(),
            decode("1.2.4").unwrap(),
            decode("1").unwrap(),
            decode("1.2").unwrap(),
            decode("1.10").unwrap(),
        ];
        paths.sort();
        assert_eq!(
            paths,
            vec![
                vec![1],
                vec![1, 2],
                vec![1, 2, 4],
                vec![1, 3],
                vec![1, 10],
                vec![2],
            ]
        );
    }
}
