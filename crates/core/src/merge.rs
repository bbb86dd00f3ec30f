//! Non-destructive overrides for fixed-shape records.
//!
//! A record type implements [`Merge`] against its patch type, a mirror of the
//! record where every field is optional. Absent patch fields leave the base
//! alone, scalars and arrays replace wholesale, and nested sections recurse.
//! Nullable leaves use `Option<Option<T>>` so a patch can tell "no change"
//! (absent) from "clear it" (`null`).

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

pub trait Merge {
    type Patch;

    /// Returns `self` with `patch` applied. `self` is left untouched.
    fn merge(&self, patch: &Self::Patch) -> Self;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    #[error("overrides must be a JSON object")]
    NotAnObject,
    #[error("invalid overrides: {0}")]
    InvalidShape(String),
}

/// A patch leaf, or the base value when the patch leaves it out.
pub(crate) fn leaf<T: Clone>(base: &T, patch: &Option<T>) -> T {
    patch.clone().unwrap_or_else(|| base.clone())
}

/// Combines two patch leaves; the later one wins when present.
pub(crate) fn later<T: Clone>(earlier: &Option<T>, newer: &Option<T>) -> Option<T> {
    newer.clone().or_else(|| earlier.clone())
}

pub(crate) fn section<T: Merge + Clone>(base: &T, patch: &Option<T::Patch>) -> T {
    match patch {
        Some(patch) => base.merge(patch),
        None => base.clone(),
    }
}

/// Combines two optional section patches field by field.
pub(crate) fn combine<P: Merge<Patch = P> + Clone>(
    earlier: &Option<P>,
    newer: &Option<P>,
) -> Option<P> {
    match (earlier, newer) {
        (Some(earlier), Some(newer)) => Some(earlier.merge(newer)),
        (None, newer) => newer.clone(),
        (earlier, None) => earlier.clone(),
    }
}

/// Deserialises a present field, `null` included, as `Some(..)`.
///
/// Pair with `#[serde(default)]` so an absent field stays `None`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Deserialises a field that may be left out but never cleared.
///
/// Pair with `#[serde(default)]`. An explicit `null` is an error rather than
/// "no change".
pub fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Wraps `value` in one object per path segment, outermost first.
///
/// `nest_at_path(&["ratings", "notes"], json!("x"))` is
/// `{"ratings": {"notes": "x"}}`. An empty path returns `value` itself.
pub fn nest_at_path(path: &[&str], value: Value) -> Value {
    path.iter().rev().fold(value, |inner, key| {
        let mut object = Map::new();
        object.insert((*key).to_string(), inner);
        Value::Object(object)
    })
}

/// Parses a JSON value into a typed patch, rejecting non-objects and unknown
/// or mistyped fields.
pub fn parse_patch<P: for<'de> Deserialize<'de>>(value: Value) -> Result<P, PatchError> {
    if !value.is_object() {
        return Err(PatchError::NotAnObject);
    }
    serde_json::from_value(value).map_err(|e| PatchError::InvalidShape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nest_at_path_builds_minimal_object() {
        assert_eq!(
            nest_at_path(&["ratings", "notes"], json!("updated")),
            json!({ "ratings": { "notes": "updated" } })
        );
        assert_eq!(nest_at_path(&[], json!({ "a": 1 })), json!({ "a": 1 }));
    }

    #[test]
    fn test_leaf_and_later_helpers() {
        assert_eq!(leaf(&1, &None), 1);
        assert_eq!(leaf(&1, &Some(2)), 2);
        assert_eq!(later(&Some(1), &None), Some(1));
        assert_eq!(later(&Some(1), &Some(3)), Some(3));
        assert_eq!(later::<i32>(&None, &None), None);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        #[serde(default, deserialize_with = "double_option")]
        note: Option<Option<String>>,
    }

    #[test]
    fn test_double_option_distinguishes_absent_from_null() {
        let absent: Probe = serde_json::from_value(json!({})).unwrap();
        let null: Probe = serde_json::from_value(json!({ "note": null })).unwrap();
        let set: Probe = serde_json::from_value(json!({ "note": "x" })).unwrap();
        assert_eq!(absent.note, None);
        assert_eq!(null.note, Some(None));
        assert_eq!(set.note, Some(Some("x".to_string())));
    }

    #[test]
    fn test_parse_patch_rejects_non_objects() {
        assert_eq!(
            parse_patch::<Probe>(json!([1, 2])),
            Err(PatchError::NotAnObject)
        );
        assert_eq!(parse_patch::<Probe>(Value::Null), Err(PatchError::NotAnObject));
        assert!(matches!(
            parse_patch::<Probe>(json!({ "note": 5 })),
            Err(PatchError::InvalidShape(_))
        ));
    }
}
