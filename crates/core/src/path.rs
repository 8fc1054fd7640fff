//! JSON paths: parsing, normalization, projection, and patching.
//!
//! A path identifies a location inside a JSON document. Accepted input
//! grammar:
//!
//! - empty string or `$` — the document root
//! - dot-separated keys: `a.b.c`
//! - bracketed integer indices: `[0]`, `foo[2]`, `a.b[3].c`
//! - all-digit dot segments are index shorthand: `a.2.b` ≡ `a[2].b`
//! - an optional `$.` / `$[` prefix is accepted and stripped
//!
//! The canonical form is `$` followed by `.key` and `[n]` segments;
//! `Display` always emits it, so `normalize(normalize(p)) == normalize(p)`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// One step of a path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object member lookup
    Key(String),
    /// Array element lookup
    Index(usize),
}

/// A normalized path into a JSON document.
///
/// Construct via [`FromStr`] (`"a.b[2]".parse()?`) or [`JsonPath::root`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    /// The document root (`$`)
    pub fn root() -> Self {
        JsonPath {
            segments: Vec::new(),
        }
    }

    /// Build a path from pre-parsed segments
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        JsonPath { segments }
    }

    /// Whether this path addresses the whole document
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path's segments, in traversal order
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments (0 for the root)
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the path has no segments (same as [`JsonPath::is_root`])
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for JsonPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s == "$" {
            return Ok(JsonPath::root());
        }

        // Strip the optional root marker. A bare `$` not followed by
        // `.` or `[` is part of a key, not a root marker.
        let body = if let Some(rest) = s.strip_prefix("$.") {
            rest
        } else if s.starts_with("$[") {
            &s[1..]
        } else {
            s
        };

        let mut segments = Vec::new();
        let mut rest = body;
        let mut after_segment = false;

        while !rest.is_empty() {
            if let Some(bracketed) = rest.strip_prefix('[') {
                let close = bracketed
                    .find(']')
                    .ok_or_else(|| Error::invalid_path(s, "unterminated '['"))?;
                let digits = &bracketed[..close];
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::invalid_path(
                        s,
                        "bracket index must be an unsigned integer",
                    ));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| Error::invalid_path(s, "index out of range"))?;
                segments.push(PathSegment::Index(index));
                rest = &bracketed[close + 1..];
            } else {
                let key_part = if after_segment {
                    rest.strip_prefix('.').ok_or_else(|| {
                        Error::invalid_path(s, "expected '.' or '[' between segments")
                    })?
                } else {
                    rest
                };
                let end = key_part
                    .find(['.', '['])
                    .unwrap_or(key_part.len());
                let token = &key_part[..end];
                if token.is_empty() {
                    return Err(Error::invalid_path(s, "empty segment"));
                }
                // All-digit dot segments are index shorthand (`a.2.b`).
                if token.bytes().all(|b| b.is_ascii_digit()) {
                    let index = token
                        .parse::<usize>()
                        .map_err(|_| Error::invalid_path(s, "index out of range"))?;
                    segments.push(PathSegment::Index(index));
                } else {
                    segments.push(PathSegment::Key(token.to_string()));
                }
                rest = &key_part[end..];
            }
            after_segment = true;
        }

        Ok(JsonPath { segments })
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(k) => write!(f, ".{}", k)?,
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

/// Project the value at `path` inside `doc`.
///
/// Returns `None` if traversal hits a missing key/index or a node of the
/// wrong shape. An `Index` segment applied to an object addresses the
/// stringified key, mirroring how patching vivifies objects for numeric
/// segments.
pub fn get_at_path<'a>(
    doc: &'a serde_json::Value,
    path: &JsonPath,
) -> Option<&'a serde_json::Value> {
    let mut node = doc;
    for segment in path.segments() {
        node = match (segment, node) {
            (PathSegment::Key(k), serde_json::Value::Object(map)) => map.get(k)?,
            (PathSegment::Index(i), serde_json::Value::Array(arr)) => arr.get(*i)?,
            (PathSegment::Index(i), serde_json::Value::Object(map)) => {
                map.get(&i.to_string())?
            }
            _ => return None,
        };
    }
    Some(node)
}

/// Assign `value` at `path` inside `doc`, creating missing intermediates.
///
/// Semantics:
/// - the root path replaces `doc` entirely
/// - a missing intermediate becomes an empty object, for key and index
///   segments alike
/// - an index segment on an existing array pads with nulls when past the
///   end; on an object it addresses the stringified key
/// - a non-container in the way is replaced by an object
///
/// Assignment never fails; patch plans rely on this when they are applied
/// at commit time.
pub fn set_at_path(doc: &mut serde_json::Value, path: &JsonPath, value: serde_json::Value) {
    set_inner(doc, path.segments(), value)
}

fn set_inner(node: &mut serde_json::Value, segments: &[PathSegment], value: serde_json::Value) {
    use serde_json::Value;

    let Some((segment, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    match segment {
        PathSegment::Key(k) => {
            if !node.is_object() {
                *node = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(map) = node {
                let slot = map.entry(k.clone()).or_insert(Value::Null);
                set_inner(slot, rest, value);
            }
        }
        PathSegment::Index(i) => match node {
            Value::Array(arr) => {
                if *i >= arr.len() {
                    arr.resize(i + 1, Value::Null);
                }
                set_inner(&mut arr[*i], rest, value);
            }
            _ => {
                if !node.is_object() {
                    *node = Value::Object(serde_json::Map::new());
                }
                if let Value::Object(map) = node {
                    let slot = map.entry(i.to_string()).or_insert(Value::Null);
                    set_inner(slot, rest, value);
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> JsonPath {
        s.parse().expect("valid path")
    }

    // === Parsing and normalization ===

    #[test]
    fn root_forms() {
        assert!(path("").is_root());
        assert!(path("$").is_root());
        assert_eq!(path("").to_string(), "$");
    }

    #[test]
    fn dotted_keys() {
        let p = path("a.b.c");
        assert_eq!(
            p.segments(),
            &[
                PathSegment::Key("a".into()),
                PathSegment::Key("b".into()),
                PathSegment::Key("c".into()),
            ]
        );
        assert_eq!(p.to_string(), "$.a.b.c");
    }

    #[test]
    fn dollar_prefix_is_stripped() {
        assert_eq!(path("$.a.b"), path("a.b"));
        assert_eq!(path("$[0]"), path("[0]"));
    }

    #[test]
    fn bracket_indices() {
        let p = path("a.b[3].c");
        assert_eq!(
            p.segments(),
            &[
                PathSegment::Key("a".into()),
                PathSegment::Key("b".into()),
                PathSegment::Index(3),
                PathSegment::Key("c".into()),
            ]
        );
        assert_eq!(p.to_string(), "$.a.b[3].c");
    }

    #[test]
    fn digit_dot_segments_become_indices() {
        assert_eq!(path("a.2.b"), path("a[2].b"));
        assert_eq!(path("a.2.b").to_string(), "$.a[2].b");
    }

    #[test]
    fn leading_bracket() {
        assert_eq!(path("[1]").segments(), &[PathSegment::Index(1)]);
    }

    #[test]
    fn chained_brackets() {
        assert_eq!(
            path("xs[0][1]").segments(),
            &[
                PathSegment::Key("xs".into()),
                PathSegment::Index(0),
                PathSegment::Index(1),
            ]
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["a.b", "$.a.b", "a.2.b", "xs[0][1]", "$", ""] {
            let once = path(input);
            let twice = path(&once.to_string());
            assert_eq!(once, twice, "input {:?}", input);
        }
    }

    #[test]
    fn mixed_digit_keys_stay_keys() {
        assert_eq!(
            path("a2.b").segments()[0],
            PathSegment::Key("a2".into())
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["a..b", "a.", ".a", "a[", "a[x]", "a[]", "a[1)b"] {
            let result: Result<JsonPath> = bad.parse();
            assert!(result.is_err(), "expected parse failure for {:?}", bad);
        }
    }

    // === Projection ===

    #[test]
    fn get_root_returns_doc() {
        let doc = json!({"a": 1});
        assert_eq!(get_at_path(&doc, &JsonPath::root()), Some(&doc));
    }

    #[test]
    fn get_nested() {
        let doc = json!({"a": {"b": [10, 20, 30]}});
        assert_eq!(get_at_path(&doc, &path("a.b[1]")), Some(&json!(20)));
        assert_eq!(get_at_path(&doc, &path("a.b")), Some(&json!([10, 20, 30])));
    }

    #[test]
    fn get_missing_is_none() {
        let doc = json!({"a": {"b": 1}});
        assert_eq!(get_at_path(&doc, &path("a.c")), None);
        assert_eq!(get_at_path(&doc, &path("a.b.c")), None);
        assert_eq!(get_at_path(&doc, &path("a.b[0]")), None);
    }

    #[test]
    fn get_index_on_object_uses_string_key() {
        let doc = json!({"a": {"2": "x"}});
        assert_eq!(get_at_path(&doc, &path("a[2]")), Some(&json!("x")));
    }

    // === Patching ===

    #[test]
    fn set_root_replaces_doc() {
        let mut doc = json!({"a": 1});
        set_at_path(&mut doc, &JsonPath::root(), json!([1, 2]));
        assert_eq!(doc, json!([1, 2]));
    }

    #[test]
    fn set_existing_key() {
        let mut doc = json!({"a": {"b": 1}});
        set_at_path(&mut doc, &path("a.b"), json!(2));
        assert_eq!(doc, json!({"a": {"b": 2}}));
    }

    #[test]
    fn set_vivifies_missing_objects() {
        let mut doc = json!({});
        set_at_path(&mut doc, &path("a.b.c"), json!(true));
        assert_eq!(doc, json!({"a": {"b": {"c": true}}}));
    }

    #[test]
    fn set_vivifies_objects_for_index_segments() {
        // A missing intermediate becomes an object even for a numeric
        // segment; the index addresses the stringified key.
        let mut doc = json!({});
        set_at_path(&mut doc, &path("a[2].c"), json!(1));
        assert_eq!(doc, json!({"a": {"2": {"c": 1}}}));
    }

    #[test]
    fn set_index_in_existing_array() {
        let mut doc = json!(["A", "B", "C"]);
        set_at_path(&mut doc, &path("[1]"), json!("BB"));
        assert_eq!(doc, json!(["A", "BB", "C"]));
    }

    #[test]
    fn set_index_past_end_pads_with_null() {
        let mut doc = json!({"xs": [1]});
        set_at_path(&mut doc, &path("xs[3]"), json!(4));
        assert_eq!(doc, json!({"xs": [1, null, null, 4]}));
    }

    #[test]
    fn set_replaces_scalar_in_the_way() {
        let mut doc = json!({"a": 5});
        set_at_path(&mut doc, &path("a.b"), json!(1));
        assert_eq!(doc, json!({"a": {"b": 1}}));
    }

    #[test]
    fn later_patches_observe_earlier_ones() {
        let mut doc = json!({});
        set_at_path(&mut doc, &path("a.b"), json!([1]));
        set_at_path(&mut doc, &path("a.b[1]"), json!(2));
        assert_eq!(doc, json!({"a": {"b": [1, 2]}}));
    }
}
