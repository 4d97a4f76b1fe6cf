//! Structural matching of live objects against expected patterns
//!
//! The engine only depends on the [`Checker`] trait. [`PartialMatch`] is the
//! default: an expected object is a partial view of the actual one.

use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::common::{Error, Result};

/// Values substituted into `($name)` placeholders of an expected pattern
pub type Bindings = BTreeMap<String, Value>;

/// A single difference between an actual object and its expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Dotted path to the field, `[i]` for array elements
    pub path: String,
    pub message: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Compares an actual object with an expected pattern
pub trait Checker: Send + Sync {
    /// Returns every mismatch found; an empty list means the object matches
    fn check(&self, actual: &Value, bindings: &Bindings, expected: &Value) -> Result<Vec<Mismatch>>;
}

/// Subset matching
///
/// Maps in the expectation must be a subset of the actual map, arrays must
/// have the same length and match element-wise, scalars must be equal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PartialMatch;

impl Checker for PartialMatch {
    fn check(
        &self,
        actual: &Value,
        bindings: &Bindings,
        expected: &Value,
    ) -> Result<Vec<Mismatch>> {
        let mut mismatches = Vec::new();
        compare(actual, expected, bindings, "", &mut mismatches)?;
        Ok(mismatches)
    }
}

fn compare(
    actual: &Value,
    expected: &Value,
    bindings: &Bindings,
    path: &str,
    out: &mut Vec<Mismatch>,
) -> Result<()> {
    match expected {
        Value::Object(expected_map) => {
            let Some(actual_map) = actual.as_object() else {
                out.push(type_mismatch(path, actual, "object"));
                return Ok(());
            };
            for (key, expected_value) in expected_map {
                let child = join(path, key);
                match actual_map.get(key) {
                    Some(actual_value) => {
                        compare(actual_value, expected_value, bindings, &child, out)?
                    }
                    None => out.push(Mismatch {
                        path: child,
                        message: "Required value: field not found in the input object".to_string(),
                    }),
                }
            }
        }
        Value::Array(expected_items) => {
            let Some(actual_items) = actual.as_array() else {
                out.push(type_mismatch(path, actual, "array"));
                return Ok(());
            };
            if actual_items.len() != expected_items.len() {
                out.push(Mismatch {
                    path: path.to_string(),
                    message: format!(
                        "Invalid value: {} items: Expected {} items",
                        actual_items.len(),
                        expected_items.len()
                    ),
                });
                return Ok(());
            }
            for (i, (a, e)) in actual_items.iter().zip(expected_items).enumerate() {
                compare(a, e, bindings, &format!("{path}[{i}]"), out)?;
            }
        }
        Value::String(s) => {
            let resolved = substitute(s, bindings)?;
            if actual != resolved.as_ref() {
                out.push(invalid_value(path, actual, &resolved));
            }
        }
        scalar => {
            if actual != scalar {
                out.push(invalid_value(path, actual, scalar));
            }
        }
    }
    Ok(())
}

/// Replace a `($name)` string with its bound value
fn substitute<'a>(s: &'a str, bindings: &'a Bindings) -> Result<Cow<'a, Value>> {
    match s.strip_prefix("($").and_then(|rest| rest.strip_suffix(')')) {
        Some(name) => bindings
            .get(name)
            .map(Cow::Borrowed)
            .ok_or_else(|| Error::Check(format!("undefined binding '${name}'"))),
        None => Ok(Cow::Owned(Value::String(s.to_string()))),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn invalid_value(path: &str, actual: &Value, expected: &Value) -> Mismatch {
    Mismatch {
        path: path.to_string(),
        message: format!("Invalid value: {actual}: Expected value: {expected}"),
    }
}

fn type_mismatch(path: &str, actual: &Value, expected_type: &str) -> Mismatch {
    Mismatch {
        path: path.to_string(),
        message: format!("Invalid value: {actual}: Expected value of type {expected_type}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(actual: Value, expected: Value) -> Vec<String> {
        PartialMatch
            .check(&actual, &Bindings::new(), &expected)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_subset_matches() {
        let actual = json!({"spec": {"replicas": 2, "paused": false}, "status": {}});
        assert!(check(actual, json!({"spec": {"replicas": 2}})).is_empty());
    }

    #[test]
    fn test_scalar_mismatch() {
        let actual = json!({"spec": {"replicas": 3}});
        assert_eq!(
            check(actual, json!({"spec": {"replicas": 2}})),
            vec!["spec.replicas: Invalid value: 3: Expected value: 2"]
        );
    }

    #[test]
    fn test_missing_field() {
        assert_eq!(
            check(json!({"spec": {}}), json!({"spec": {"replicas": 2}})),
            vec!["spec.replicas: Required value: field not found in the input object"]
        );
    }

    #[test]
    fn test_arrays_match_element_wise() {
        let actual = json!({"items": [{"a": 1, "b": 2}, {"a": 3}]});
        assert!(check(actual.clone(), json!({"items": [{"a": 1}, {"a": 3}]})).is_empty());
        assert_eq!(
            check(actual.clone(), json!({"items": [{"a": 1}, {"a": 4}]})),
            vec!["items[1].a: Invalid value: 3: Expected value: 4"]
        );
        assert_eq!(check(actual, json!({"items": [{"a": 1}]})).len(), 1);
    }

    #[test]
    fn test_binding_substitution() {
        let mut bindings = Bindings::new();
        bindings.insert("namespace".to_string(), json!("kubestep-abc"));
        let actual = json!({"metadata": {"namespace": "kubestep-abc"}});
        let expected = json!({"metadata": {"namespace": "($namespace)"}});
        assert!(PartialMatch.check(&actual, &bindings, &expected).unwrap().is_empty());
    }

    #[test]
    fn test_undefined_binding_is_an_error() {
        let actual = json!({"metadata": {"namespace": "kubestep-abc"}});
        let expected = json!({"metadata": {"namespace": "($missing)"}});
        let err = PartialMatch.check(&actual, &Bindings::new(), &expected).unwrap_err();
        assert_eq!(err.to_string(), "check failed: undefined binding '$missing'");
    }
}
