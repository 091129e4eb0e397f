//! Request body splitting.
//!
//! The body must be a JSON object with a `content` array. Each item is
//! stamped with its original position (`"index"`) and dealt out by
//! `i % n`; every sibling keeps all other top-level fields.

use axum::body::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

/// Field holding the splittable items.
pub const CONTENT_FIELD: &str = "content";
/// Field stamped on every object item.
pub const INDEX_FIELD: &str = "index";

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("body is not a JSON object")]
    NotAnObject,

    #[error("no content specified")]
    MissingContent,

    #[error("cannot split a non list of content")]
    ContentNotArray,

    #[error(
        "the length of the content ({items}) is lower than the number of underlying apps ({backends}), toggle split to False"
    )]
    NotEnoughContent { items: usize, backends: usize },

    #[error("no backend available to split across")]
    NoBackends,
}

/// Split `body` into `parts` sibling bodies.
pub fn split_body(body: &[u8], parts: usize) -> Result<Vec<Bytes>, SplitError> {
    if parts == 0 {
        return Err(SplitError::NoBackends);
    }

    let mut object = match serde_json::from_slice::<Value>(body)? {
        Value::Object(map) => map,
        _ => return Err(SplitError::NotAnObject),
    };

    let items = match object.remove(CONTENT_FIELD) {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(SplitError::ContentNotArray),
        None => return Err(SplitError::MissingContent),
    };

    if items.len() < parts {
        return Err(SplitError::NotEnoughContent {
            items: items.len(),
            backends: parts,
        });
    }

    let mut groups: Vec<Vec<Value>> = vec![Vec::with_capacity(items.len() / parts + 1); parts];
    for (i, mut item) in items.into_iter().enumerate() {
        if let Value::Object(fields) = &mut item {
            fields.insert(INDEX_FIELD.to_string(), Value::from(i));
        }
        groups[i % parts].push(item);
    }

    groups
        .into_iter()
        .map(|group| {
            let mut sibling: Map<String, Value> = object.clone();
            sibling.insert(CONTENT_FIELD.to_string(), Value::Array(group));
            Ok(Bytes::from(serde_json::to_vec(&Value::Object(sibling))?))
        })
        .collect()
}
