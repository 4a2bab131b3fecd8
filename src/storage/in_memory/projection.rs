//! Projection for the in-memory backend
//!
//! A projection is either inclusive (`{"name": 1}`) or exclusive
//! (`{"secret": 0}`); `_id` is included unless excluded explicitly and is the
//! only field allowed to break that rule. Dotted paths project into
//! sub-documents and into documents inside arrays. Field order of the source
//! document is preserved.

use crate::core::{QueryError, QueryOutcome};
use bson::{Bson, Document};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Include,
    Exclude,
}

#[derive(Debug, Default)]
struct Tree {
    children: BTreeMap<String, Node>,
}

#[derive(Debug)]
enum Node {
    Leaf,
    Branch(Tree),
}

impl Tree {
    fn insert(&mut self, path: &str) {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match rest {
            None => {
                self.children.insert(head.to_string(), Node::Leaf);
            }
            Some(rest) => {
                let node = self
                    .children
                    .entry(head.to_string())
                    .or_insert_with(|| Node::Branch(Tree::default()));
                // a whole-field entry already covers the sub-path
                if let Node::Branch(tree) = node {
                    tree.insert(rest);
                }
            }
        }
    }
}

/// Compiled projection
#[derive(Debug)]
pub(crate) struct Projection {
    mode: Mode,
    tree: Tree,
    include_id: bool,
}

fn flag(field: &str, value: &Bson) -> QueryOutcome<bool> {
    match value {
        Bson::Boolean(b) => Ok(*b),
        Bson::Int32(n) => Ok(*n != 0),
        Bson::Int64(n) => Ok(*n != 0),
        Bson::Double(f) => Ok(*f != 0.0),
        _ => Err(QueryError::OperationError {
            message: format!("unsupported projection value for field '{field}'"),
        }),
    }
}

impl Projection {
    pub(crate) fn compile(spec: &Document) -> QueryOutcome<Self> {
        let mut mode = None;
        let mut include_id = true;
        let mut tree = Tree::default();

        for (field, value) in spec {
            let keep = flag(field, value)?;
            if field == "_id" {
                include_id = keep;
                continue;
            }
            let field_mode = if keep { Mode::Include } else { Mode::Exclude };
            match mode {
                None => mode = Some(field_mode),
                Some(existing) if existing != field_mode => {
                    let message = match existing {
                        Mode::Include => format!("Cannot do exclusion on field {field} in inclusion projection"),
                        Mode::Exclude => format!("Cannot do inclusion on field {field} in exclusion projection"),
                    };
                    return Err(QueryError::OperationError { message });
                }
                Some(_) => {}
            }
            tree.insert(field);
        }

        // only `_id` listed: `{_id: 0}` excludes it, `{_id: 1}` keeps just it
        let mode = mode.unwrap_or(if include_id { Mode::Include } else { Mode::Exclude });

        Ok(Self {
            mode,
            tree,
            include_id,
        })
    }

    pub(crate) fn apply(&self, doc: &Document) -> Document {
        let mut out = match self.mode {
            Mode::Include => include(doc, &self.tree),
            Mode::Exclude => exclude(doc, &self.tree),
        };

        match (self.mode, self.include_id, doc.get("_id")) {
            (Mode::Include, true, Some(id)) => {
                if !out.contains_key("_id") {
                    // keep `_id` first, as the server does
                    let mut with_id = Document::new();
                    with_id.insert("_id", id.clone());
                    for (key, value) in out {
                        with_id.insert(key, value);
                    }
                    out = with_id;
                }
            }
            (_, false, _) => {
                out.remove("_id");
            }
            _ => {}
        }
        out
    }
}

fn include(doc: &Document, tree: &Tree) -> Document {
    let mut out = Document::new();
    for (key, value) in doc {
        match tree.children.get(key) {
            Some(Node::Leaf) => {
                out.insert(key.clone(), value.clone());
            }
            Some(Node::Branch(sub)) => {
                if let Some(projected) = include_value(value, sub) {
                    out.insert(key.clone(), projected);
                }
            }
            None => {}
        }
    }
    out
}

fn include_value(value: &Bson, tree: &Tree) -> Option<Bson> {
    match value {
        Bson::Document(doc) => Some(Bson::Document(include(doc, tree))),
        Bson::Array(items) => Some(Bson::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Bson::Document(_) | Bson::Array(_) => include_value(item, tree),
                    _ => None,
                })
                .collect(),
        )),
        _ => None,
    }
}

fn exclude(doc: &Document, tree: &Tree) -> Document {
    let mut out = Document::new();
    for (key, value) in doc {
        match tree.children.get(key) {
            Some(Node::Leaf) => {}
            Some(Node::Branch(sub)) => {
                out.insert(key.clone(), exclude_value(value, sub));
            }
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

fn exclude_value(value: &Bson, tree: &Tree) -> Bson {
    match value {
        Bson::Document(doc) => Bson::Document(exclude(doc, tree)),
        Bson::Array(items) => {
            Bson::Array(items.iter().map(|item| exclude_value(item, tree)).collect())
        }
        other => other.clone(),
    }
}
