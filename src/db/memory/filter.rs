//! Query evaluation for the memory store
//!
//! A working subset of the MongoDB query, update and projection language.

use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::entity::ID_FIELD;
use crate::types::{HolderError, Result};

fn unsupported(what: &str) -> HolderError {
    HolderError::Backend(format!("Unsupported by memory store: {}", what))
}

/// Resolve a dotted path inside a document
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Ordering between two values of comparable types
fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match compare(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Equality as a query sees it: null matches missing, arrays match members
fn field_equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(actual) => values_equal(actual, expected),
    }
}

fn compare_field(value: Option<&Bson>, arg: &Bson, accept: fn(Ordering) -> bool) -> bool {
    value
        .and_then(|actual| compare(actual, arg))
        .map(accept)
        .unwrap_or(false)
}

fn operator_matches(value: Option<&Bson>, op: &str, arg: &Bson) -> Result<bool> {
    let matched = match op {
        "$eq" => field_equals(value, arg),
        "$ne" => !field_equals(value, arg),
        "$gt" => compare_field(value, arg, |o| o == Ordering::Greater),
        "$gte" => compare_field(value, arg, |o| o != Ordering::Less),
        "$lt" => compare_field(value, arg, |o| o == Ordering::Less),
        "$lte" => compare_field(value, arg, |o| o != Ordering::Greater),
        "$in" | "$nin" => {
            let candidates = arg
                .as_array()
                .ok_or_else(|| HolderError::Backend(format!("{} needs an array", op)))?;
            let found = candidates.iter().any(|c| field_equals(value, c));
            if op == "$in" {
                found
            } else {
                !found
            }
        }
        "$exists" => {
            let wanted = arg.as_bool().unwrap_or(true);
            value.is_some() == wanted
        }
        other => return Err(unsupported(other)),
    };
    Ok(matched)
}

fn is_operator_doc(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn clauses<'a>(op: &str, arg: &'a Bson) -> Result<Vec<&'a Document>> {
    arg.as_array()
        .ok_or_else(|| HolderError::Backend(format!("{} needs an array", op)))?
        .iter()
        .map(|clause| {
            clause
                .as_document()
                .ok_or_else(|| HolderError::Backend(format!("{} clauses must be documents", op)))
        })
        .collect()
}

/// Whether `doc` satisfies `filter`
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => return Err(unsupported(op)),
            path => {
                let value = lookup(doc, path);
                match condition {
                    Bson::Document(ops) if is_operator_doc(ops) => {
                        let mut all = true;
                        for (op, arg) in ops {
                            if !operator_matches(value, op, arg)? {
                                all = false;
                                break;
                            }
                        }
                        all
                    }
                    expected => field_equals(value, expected),
                }
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Total order used for sorting: missing and null first, then by type rank
fn sort_order(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    fn rank(value: Option<&Bson>) -> u8 {
        match value {
            None | Some(Bson::Null) => 0,
            Some(v) if as_number(v).is_some() => 1,
            Some(Bson::String(_)) => 2,
            Some(Bson::Document(_)) => 3,
            Some(Bson::Array(_)) => 4,
            Some(Bson::ObjectId(_)) => 6,
            Some(Bson::Boolean(_)) => 7,
            Some(Bson::DateTime(_)) => 8,
            Some(_) => 9,
        }
    }

    match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b))),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Stable multi-key sort; `1` ascending, `-1` descending
pub(crate) fn sort_documents(docs: &mut [Document], sort: &Document) {
    if sort.is_empty() {
        return;
    }
    let keys: Vec<(&str, bool)> = sort
        .iter()
        .map(|(key, dir)| (key.as_str(), as_number(dir).unwrap_or(1.0) >= 0.0))
        .collect();

    docs.sort_by(|a, b| {
        for (key, ascending) in &keys {
            let ordering = sort_order(lookup(a, key), lookup(b, key));
            let ordering = if *ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(nested)) => set_path(nested, rest, value),
                _ => Err(HolderError::Backend(format!(
                    "Cannot set '{}': '{}' is not a document",
                    path, head
                ))),
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(nested)) = doc.get_mut(head) {
                unset_path(nested, rest);
            }
        }
    }
}

fn touches_id(path: &str) -> bool {
    path == ID_FIELD
        || path
            .strip_prefix(ID_FIELD)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Apply `$set` / `$unset` to a document, returning whether it changed
pub(crate) fn apply_update(doc: &mut Document, update: &Document) -> Result<bool> {
    if update.is_empty() {
        return Err(HolderError::Backend("Update document is empty".into()));
    }
    // Checked up front so a rejected update leaves the document untouched
    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| HolderError::Backend(format!("{} needs a document", op)))?;
        if let Some(path) = fields.keys().find(|path| touches_id(path)) {
            return Err(HolderError::Backend(format!(
                "Performing an update on the path '{}' would modify the immutable field '{}'",
                path, ID_FIELD
            )));
        }
    }

    let before = doc.clone();
    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| HolderError::Backend(format!("{} needs a document", op)))?;
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(doc, path, value.clone())?;
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(doc, path);
                }
            }
            other => return Err(unsupported(other)),
        }
    }
    Ok(*doc != before)
}

/// Inclusion or exclusion projection; `_id` is kept unless excluded
pub(crate) fn project(doc: Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return doc;
    }
    let truthy = |v: &Bson| match v {
        Bson::Boolean(b) => *b,
        other => as_number(other).map(|n| n != 0.0).unwrap_or(true),
    };
    let inclusive = projection
        .iter()
        .any(|(key, value)| key != "_id" && truthy(value));

    if inclusive {
        let keep_id = projection.get("_id").map(truthy).unwrap_or(true);
        doc.into_iter()
            .filter(|(key, _)| {
                (key == "_id" && keep_id)
                    || projection.get(key.as_str()).map(truthy).unwrap_or(false)
            })
            .collect()
    } else {
        doc.into_iter()
            .filter(|(key, _)| !projection.contains_key(key.as_str()))
            .collect()
    }
}
