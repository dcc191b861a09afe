// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint delta merge semantics.
//!
//! Both base and delta are treated as structured state bags, JSON-encoded.
//! The merge is right-biased key overlay for objects, element-wise add for
//! equal-length numeric arrays, and falls back to the unchanged base for
//! anything it can't classify — the merge function is pure and total.

use serde_json::Value;

pub fn merge(base: &[u8], delta: &[u8]) -> Vec<u8> {
    let (Ok(base_val), Ok(delta_val)) =
        (serde_json::from_slice::<Value>(base), serde_json::from_slice::<Value>(delta))
    else {
        tracing::warn!("checkpoint delta did not parse as JSON; keeping base unchanged");
        return base.to_vec();
    };

    match merge_values(&base_val, &delta_val) {
        Some(merged) => serde_json::to_vec(&merged).unwrap_or_else(|_| base.to_vec()),
        None => {
            tracing::warn!("checkpoint delta shape unrecognized; keeping base unchanged");
            base.to_vec()
        }
    }
}

fn merge_values(base: &Value, delta: &Value) -> Option<Value> {
    match (base, delta) {
        (Value::Object(b), Value::Object(d)) => {
            let mut out = b.clone();
            for (k, v) in d {
                out.insert(k.clone(), v.clone());
            }
            Some(Value::Object(out))
        }
        (Value::Array(b), Value::Array(d)) if b.len() == d.len() && is_numeric_array(b) && is_numeric_array(d) => {
            let summed = b
                .iter()
                .zip(d.iter())
                .map(|(x, y)| {
                    let sum = x.as_f64().unwrap_or(0.0) + y.as_f64().unwrap_or(0.0);
                    serde_json::Number::from_f64(sum)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                })
                .collect();
            Some(Value::Array(summed))
        }
        _ => None,
    }
}

fn is_numeric_array(arr: &[Value]) -> bool {
    arr.iter().all(|v| v.is_number())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_merge_is_right_biased_key_overlay() {
        let base = serde_json::to_vec(&serde_json::json!({"a": 1, "b": 2})).unwrap();
        let delta = serde_json::to_vec(&serde_json::json!({"b": 20, "c": 3})).unwrap();
        let merged: Value = serde_json::from_slice(&merge(&base, &delta)).unwrap();
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 20, "c": 3}));
    }

    #[test]
    fn numeric_array_merge_is_elementwise_add() {
        let base = serde_json::to_vec(&serde_json::json!([1.0, 2.0, 3.0])).unwrap();
        let delta = serde_json::to_vec(&serde_json::json!([0.5, 0.5, 0.5])).unwrap();
        let merged: Value = serde_json::from_slice(&merge(&base, &delta)).unwrap();
        assert_eq!(merged, serde_json::json!([1.5, 2.5, 3.5]));
    }

    #[test]
    fn unrecognized_shape_returns_base_unchanged() {
        let base = serde_json::to_vec(&serde_json::json!("scalar-state")).unwrap();
        let delta = serde_json::to_vec(&serde_json::json!("scalar-delta")).unwrap();
        assert_eq!(merge(&base, &delta), base);
    }

    #[test]
    fn mismatched_array_lengths_fall_back_to_base() {
        let base = serde_json::to_vec(&serde_json::json!([1, 2, 3])).unwrap();
        let delta = serde_json::to_vec(&serde_json::json!([1, 2])).unwrap();
        assert_eq!(merge(&base, &delta), base);
    }

    #[test]
    fn fold_merge_applies_deltas_in_order() {
        let base = serde_json::to_vec(&serde_json::json!({"step": 0})).unwrap();
        let deltas = vec![
            serde_json::to_vec(&serde_json::json!({"step": 1})).unwrap(),
            serde_json::to_vec(&serde_json::json!({"step": 2, "extra": true})).unwrap(),
        ];
        let folded = deltas.iter().fold(base, |acc, d| merge(&acc, d));
        let result: Value = serde_json::from_slice(&folded).unwrap();
        assert_eq!(result, serde_json::json!({"step": 2, "extra": true}));
    }
}
