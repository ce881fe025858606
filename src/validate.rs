//! Typed decoding of normalized provider output.
//!
//! Every task wrapper funnels its result through [`decode`]: a shape mismatch
//! becomes [`InferenceError::OutputValidation`] naming the expected shape and
//! carrying the serde error as its source.

use crate::error::{InferenceError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode `value` into `T`, describing the shape as `expected` on failure.
pub fn decode<T: DeserializeOwned>(value: Value, expected: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|cause| InferenceError::OutputValidation {
        expected: expected.to_string(),
        cause,
    })
}

/// Wrap a single object into a one-element array; arrays pass unchanged.
pub fn to_array(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        other => Value::Array(vec![other]),
    }
}

/// Unwrap one level of batching: `[[a, b]]` becomes `[a, b]`.
///
/// Pipelines served for a single input frequently answer with a batch of one.
pub fn first_batch(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.first().is_some_and(Value::is_array) => {
            items.swap_remove(0)
        }
        other => to_array(other),
    }
}

/// Decode `[T]`, accepting a bare `T` or a batch of one `[[T]]`.
pub fn decode_list<T: DeserializeOwned>(value: Value, expected: &str) -> Result<Vec<T>> {
    decode(first_batch(value), expected)
}

/// Decode the first element of an array, or a bare object.
pub fn decode_first<T: DeserializeOwned>(value: Value, expected: &str) -> Result<T> {
    let first = match value {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    };
    decode(first, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Label {
        label: String,
        score: f64,
    }

    #[test]
    fn mismatch_names_expected_shape() {
        let err = decode::<Vec<Label>>(
            json!([{"label": 1}]),
            "Array<{label: string, score: number}>",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected Array<{label: string, score: number}>. Use the raw request() call if the provider returns a different shape."
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn batches_of_one_are_unwrapped() {
        let labels: Vec<Label> = decode_list(
            json!([[{"label": "POSITIVE", "score": 0.9}, {"label": "NEGATIVE", "score": 0.1}]]),
            "labels",
        )
        .unwrap();
        assert_eq!(labels.len(), 2);

        let single: Vec<Label> =
            decode_list(json!({"label": "POSITIVE", "score": 0.9}), "labels").unwrap();
        assert_eq!(single[0].label, "POSITIVE");
    }

    #[test]
    fn first_element_of_empty_array_is_an_error() {
        assert!(decode_first::<Label>(json!([]), "label").is_err());
        let first: Label = decode_first(json!([{"label": "a", "score": 1.0}]), "label").unwrap();
        assert_eq!(first.score, 1.0);
    }
}
