//! Sort specification and direction normalization

use crate::core::error::{QueryError, QueryOutcome};
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of one sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Wire value used in a sort document (`1` / `-1`)
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Ascending => f.write_str("ASCENDING"),
            SortDirection::Descending => f.write_str("DESCENDING"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    /// Case-insensitive match against `ASCENDING` / `DESCENDING`
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if token.eq_ignore_ascii_case("ASCENDING") {
            Ok(SortDirection::Ascending)
        } else if token.eq_ignore_ascii_case("DESCENDING") {
            Ok(SortDirection::Descending)
        } else {
            Err(QueryError::InvalidSortDirection {
                token: token.to_string(),
            })
        }
    }
}

/// Raw `[field, direction]` pairs as supplied by the caller
pub type RawSort = Vec<(String, String)>;

/// Normalized, ordered sort keys
///
/// Order is significant: results are ordered by the first key, ties broken
/// by the following keys in listed order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    keys: Vec<(String, SortDirection)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key; a repeated field keeps its first position and takes the new direction
    pub fn push(&mut self, field: impl Into<String>, direction: SortDirection) {
        let field = field.into();
        match self.keys.iter_mut().find(|(existing, _)| *existing == field) {
            Some(entry) => entry.1 = direction,
            None => self.keys.push((field, direction)),
        }
    }

    pub fn with(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.push(field, direction);
        self
    }

    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Build the ordered sort document sent to the server
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for (field, direction) in &self.keys {
            doc.insert(field.clone(), Bson::Int32(direction.as_i32()));
        }
        doc
    }
}

/// Normalize caller-supplied sort tokens
///
/// `None` stays `None` (server default order). The first unrecognized token
/// fails the whole call with [`QueryError::InvalidSortDirection`] carrying the
/// token as written.
pub fn normalize_sort(raw: Option<&[(String, String)]>) -> QueryOutcome<Option<SortSpec>> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let mut spec = SortSpec::new();
    for (field, token) in raw {
        spec.push(field.clone(), token.parse()?);
    }
    Ok(Some(spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawSort {
        pairs
            .iter()
            .map(|(f, d)| (f.to_string(), d.to_string()))
            .collect()
    }

    #[test]
    fn test_absent_sort_stays_absent() {
        assert_eq!(normalize_sort(None).unwrap(), None);
    }

    #[test]
    fn test_casing_does_not_matter() {
        for token in ["ascending", "ASCENDING", "Ascending", "aScEnDiNg"] {
            assert_eq!(token.parse::<SortDirection>().unwrap(), SortDirection::Ascending);
        }
        for token in ["descending", "DESCENDING", "Descending"] {
            assert_eq!(token.parse::<SortDirection>().unwrap(), SortDirection::Descending);
        }
    }

    #[test]
    fn test_invalid_token_reports_original_literal() {
        let input = raw(&[("name", "ASCENDING"), ("age", "Desc")]);
        let err = normalize_sort(Some(&input)).unwrap_err();

        match err {
            QueryError::InvalidSortDirection { token } => assert_eq!(token, "Desc"),
            other => panic!("expected InvalidSortDirection, got {other:?}"),
        }
    }

    #[test]
    fn test_numeric_tokens_are_rejected() {
        let input = raw(&[("name", "1")]);
        assert!(normalize_sort(Some(&input)).is_err());
    }

    #[test]
    fn test_order_is_preserved() {
        let input = raw(&[("z", "ascending"), ("a", "DESCENDING"), ("m", "Ascending")]);
        let spec = normalize_sort(Some(&input)).unwrap().unwrap();

        let fields: Vec<&str> = spec.keys().iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["z", "a", "m"]);

        let doc = spec.to_document();
        let keys: Vec<&String> = doc.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(doc.get_i32("a").unwrap(), -1);
    }

    #[test]
    fn test_duplicate_field_keeps_first_position() {
        let spec = SortSpec::new()
            .with("name", SortDirection::Ascending)
            .with("age", SortDirection::Ascending)
            .with("name", SortDirection::Descending);

        assert_eq!(
            spec.keys(),
            &[
                ("name".to_string(), SortDirection::Descending),
                ("age".to_string(), SortDirection::Ascending),
            ]
        );
    }

    #[test]
    fn test_empty_list_is_an_empty_spec() {
        let spec = normalize_sort(Some(&[])).unwrap().unwrap();
        assert!(spec.is_empty());
        assert!(spec.to_document().is_empty());
    }
}
