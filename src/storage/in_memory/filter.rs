//! Filter document evaluation for the in-memory backend
//!
//! Supported: implicit equality, dotted paths, array element matching,
//! `$eq $ne $gt $gte $lt $lte $in $nin $exists $size $regex $options $not`
//! on fields and `$and $or $nor` at any document level. Anything else is
//! rejected the way the server rejects it, as an operation error.

use super::compare::{compare_values, type_rank, values_equal};
use crate::core::{QueryError, QueryOutcome};
use bson::{Bson, Document};
use std::cmp::Ordering;

fn unsupported(message: impl Into<String>) -> QueryError {
    QueryError::OperationError {
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Every value reachable through a dotted path
///
/// Arrays along the way are traversed: `a.b` reaches `b` in every document
/// element of `a`, and a numeric segment addresses an element directly.
pub(crate) fn resolve_path<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(value) = doc.get(segments[0]) {
        descend(value, &segments[1..], &mut out);
    }
    out
}

fn descend<'a>(value: &'a Bson, segments: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*head) {
                descend(next, rest, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(index) = head.parse::<usize>()
                && let Some(item) = items.get(index)
            {
                descend(item, rest, out);
            }
            for item in items {
                if let Bson::Document(_) = item {
                    descend(item, segments, out);
                }
            }
        }
        _ => {}
    }
}

/// Candidates plus the elements of any array candidate
fn flatten<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(*value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Does `doc` satisfy `filter`? An empty filter matches everything.
pub(crate) fn matches(doc: &Document, filter: &Document) -> QueryOutcome<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => all_match(doc, condition, "$and")?,
            "$or" => {
                let clauses = clause_list(condition, "$or")?;
                let mut any = false;
                for clause in clauses {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let clauses = clause_list(condition, "$nor")?;
                let mut none = true;
                for clause in clauses {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(unsupported(format!("unknown top level operator: {op}")));
            }
            path => field_matches(doc, path, condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_match(doc: &Document, condition: &Bson, op: &str) -> QueryOutcome<bool> {
    for clause in clause_list(condition, op)? {
        if !matches(doc, clause)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clause_list<'a>(condition: &'a Bson, op: &str) -> QueryOutcome<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(unsupported(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(unsupported(format!("{op} must be a nonempty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => Ok(clause),
            _ => Err(unsupported(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(doc) if doc.keys().next().is_some_and(|k| k.starts_with('$')) => {
            Some(doc)
        }
        _ => None,
    }
}

fn field_matches(doc: &Document, path: &str, condition: &Bson) -> QueryOutcome<bool> {
    let values = resolve_path(doc, path);
    condition_holds(&values, condition)
}

fn condition_holds(values: &[&Bson], condition: &Bson) -> QueryOutcome<bool> {
    if let Some(operators) = is_operator_document(condition) {
        for (op, arg) in operators {
            if !operator_holds(values, op, arg, operators)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    if let Bson::RegularExpression(re) = condition {
        let compiled = compile_regex(&re.pattern, &re.options)?;
        return Ok(any_string_matches(values, &compiled));
    }

    Ok(equals_any(values, condition))
}

/// Equality with array semantics; `null` also matches a missing field
fn equals_any(values: &[&Bson], target: &Bson) -> bool {
    if matches!(target, Bson::Null) && values.is_empty() {
        return true;
    }
    flatten(values)
        .into_iter()
        .any(|value| values_equal(value, target))
}

fn operator_holds(
    values: &[&Bson],
    op: &str,
    arg: &Bson,
    siblings: &Document,
) -> QueryOutcome<bool> {
    match op {
        "$eq" => Ok(equals_any(values, arg)),
        "$ne" => Ok(!equals_any(values, arg)),
        "$gt" => Ok(compares(values, arg, |o| o == Ordering::Greater)),
        "$gte" => Ok(compares(values, arg, |o| o != Ordering::Less)),
        "$lt" => Ok(compares(values, arg, |o| o == Ordering::Less)),
        "$lte" => Ok(compares(values, arg, |o| o != Ordering::Greater)),
        "$in" => in_list(values, arg, "$in"),
        "$nin" => in_list(values, arg, "$nin").map(|found| !found),
        "$exists" => Ok(truthy(arg) != values.is_empty()),
        "$size" => {
            let Some(size) = integral(arg) else {
                return Err(unsupported("$size needs a number"));
            };
            Ok(values.iter().any(|value| match value {
                Bson::Array(items) => i64::try_from(items.len()).is_ok_and(|len| len == size),
                _ => false,
            }))
        }
        "$regex" => {
            let options = match siblings.get("$options") {
                Some(Bson::String(options)) => options.as_str(),
                Some(_) => return Err(unsupported("$options has to be a string")),
                None => "",
            };
            let compiled = match arg {
                Bson::String(pattern) => compile_regex(pattern, options)?,
                Bson::RegularExpression(re) => {
                    let merged = format!("{}{}", re.options, options);
                    compile_regex(&re.pattern, &merged)?
                }
                _ => return Err(unsupported("$regex has to be a string")),
            };
            Ok(any_string_matches(values, &compiled))
        }
        "$options" => {
            if siblings.contains_key("$regex") {
                Ok(true)
            } else {
                Err(unsupported("$options needs a $regex"))
            }
        }
        "$not" => match arg {
            Bson::Document(_) | Bson::RegularExpression(_) => {
                condition_holds(values, arg).map(|held| !held)
            }
            _ => Err(unsupported("$not needs a regex or a document")),
        },
        other => Err(unsupported(format!("unknown operator: {other}"))),
    }
}

/// Ordered comparison; only values in the same type bracket qualify
fn compares(values: &[&Bson], arg: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    flatten(values).into_iter().any(|value| {
        type_rank(value) == type_rank(arg) && accept(compare_values(value, arg))
    })
}

fn in_list(values: &[&Bson], arg: &Bson, op: &str) -> QueryOutcome<bool> {
    let Bson::Array(candidates) = arg else {
        return Err(unsupported(format!("{op} needs an array")));
    };
    for candidate in candidates {
        let hit = match candidate {
            Bson::RegularExpression(re) => {
                any_string_matches(values, &compile_regex(&re.pattern, &re.options)?)
            }
            _ => equals_any(values, candidate),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(f) => *f != 0.0,
        _ => true,
    }
}

fn integral(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

fn compile_regex(pattern: &str, options: &str) -> QueryOutcome<regex::Regex> {
    let mut builder = regex::RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(unsupported(format!("invalid flag in regex options: {other}"))),
        };
    }
    builder
        .build()
        .map_err(|e| unsupported(format!("Regular expression is invalid: {e}")))
}

fn any_string_matches(values: &[&Bson], re: &regex::Regex) -> bool {
    flatten(values).into_iter().any(|value| match value {
        Bson::String(s) | Bson::Symbol(s) => re.is_match(s),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn sample() -> Document {
        doc! {
            "name": "alpha",
            "os": "linux",
            "version": 3,
            "tags": ["db", "prod"],
            "owner": { "team": "infra", "size": 4 },
            "hosts": [ { "name": "h1", "port": 27017 }, { "name": "h2", "port": 27018 } ],
        }
    }

    #[test]
    fn empty_filter_matches() {
        assert!(matches(&sample(), &doc! {}).unwrap());
    }

    #[test]
    fn implicit_equality_and_numeric_widths() {
        assert!(matches(&sample(), &doc! { "os": "linux", "version": 3.0 }).unwrap());
        assert!(!matches(&sample(), &doc! { "os": "windows" }).unwrap());
    }

    #[test]
    fn array_contains_scalar() {
        assert!(matches(&sample(), &doc! { "tags": "prod" }).unwrap());
        assert!(matches(&sample(), &doc! { "tags": ["db", "prod"] }).unwrap());
    }

    #[test]
    fn dotted_paths_reach_nested_and_array_documents() {
        assert!(matches(&sample(), &doc! { "owner.team": "infra" }).unwrap());
        assert!(matches(&sample(), &doc! { "hosts.port": 27018 }).unwrap());
        assert!(matches(&sample(), &doc! { "hosts.0.name": "h1" }).unwrap());
        assert!(!matches(&sample(), &doc! { "hosts.1.name": "h1" }).unwrap());
    }

    #[test]
    fn comparison_operators() {
        assert!(matches(&sample(), &doc! { "version": { "$gt": 2, "$lte": 3 } }).unwrap());
        assert!(!matches(&sample(), &doc! { "version": { "$lt": 3 } }).unwrap());
        // strings never compare against numbers
        assert!(!matches(&sample(), &doc! { "name": { "$gt": 0 } }).unwrap());
    }

    #[test]
    fn null_matches_missing_field() {
        assert!(matches(&sample(), &doc! { "retired": null }).unwrap());
        assert!(matches(&sample(), &doc! { "retired": { "$exists": false } }).unwrap());
        assert!(!matches(&sample(), &doc! { "name": { "$exists": false } }).unwrap());
    }

    #[test]
    fn in_nin_and_ne() {
        assert!(matches(&sample(), &doc! { "os": { "$in": ["mac", "linux"] } }).unwrap());
        assert!(matches(&sample(), &doc! { "os": { "$nin": ["mac"] } }).unwrap());
        assert!(!matches(&sample(), &doc! { "tags": { "$ne": "db" } }).unwrap());
    }

    #[test]
    fn logical_operators() {
        let filter = doc! { "$or": [ { "os": "mac" }, { "owner.size": { "$gte": 4 } } ] };
        assert!(matches(&sample(), &filter).unwrap());

        let filter = doc! { "$nor": [ { "os": "linux" } ] };
        assert!(!matches(&sample(), &filter).unwrap());

        let filter = doc! { "$and": [ { "os": "linux" }, { "version": 3 } ] };
        assert!(matches(&sample(), &filter).unwrap());
    }

    #[test]
    fn regex_with_options() {
        let filter = doc! { "name": { "$regex": "^ALP", "$options": "i" } };
        assert!(matches(&sample(), &filter).unwrap());

        let filter = doc! { "name": { "$not": { "$regex": "^alp" } } };
        assert!(!matches(&sample(), &filter).unwrap());
    }

    #[test]
    fn size_operator() {
        assert!(matches(&sample(), &doc! { "tags": { "$size": 2 } }).unwrap());
        assert!(!matches(&sample(), &doc! { "tags": { "$size": 1 } }).unwrap());
    }

    #[test]
    fn unknown_operators_are_operation_errors() {
        let err = matches(&sample(), &doc! { "version": { "$near": 1 } }).unwrap_err();
        assert_eq!(err.error_code(), "OPERATION_ERROR");

        let err = matches(&sample(), &doc! { "$where": "true" }).unwrap_err();
        assert!(err.to_string().contains("$where"));
    }

    #[test]
    fn invalid_regex_is_an_operation_error() {
        let err = matches(&sample(), &doc! { "name": { "$regex": "(" } }).unwrap_err();
        assert_eq!(err.error_code(), "OPERATION_ERROR");
    }
}
