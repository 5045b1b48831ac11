//! Structural ordering for JSON values.
//!
//! Comparison values order: numbers numerically, strings lexicographically,
//! booleans with `false < true`, arrays element-wise then by length, objects
//! by sorted `(key, value)` pairs. Values of different types order by a fixed
//! type rank so every comparison is total.

use std::cmp::Ordering;

use serde_json::Value;

/// Rank used to order values of different types.
///
/// `null < bool < number < string < array < object`
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total structural ordering over JSON values.
pub fn value_cmp(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            // Integers and floats compare numerically, not by representation.
            let xf = x.as_f64().unwrap_or(f64::NAN);
            let yf = y.as_f64().unwrap_or(f64::NAN);
            xf.total_cmp(&yf)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xe, ye) in x.iter().zip(y.iter()) {
                let ord = value_cmp(xe, ye);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            // Map iteration is key-sorted, so pairwise walk is deterministic.
            for ((xk, xv), (yk, yv)) in x.iter().zip(y.iter()) {
                let key_ord = xk.cmp(yk);
                if key_ord != Ordering::Equal {
                    return key_ord;
                }
                let val_ord = value_cmp(xv, yv);
                if val_ord != Ordering::Equal {
                    return val_ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => unreachable!("type ranks matched"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_numerically_across_representations() {
        assert_eq!(value_cmp(&json!(1), &json!(1.0)), Ordering::Equal);
        assert_eq!(value_cmp(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(value_cmp(&json!(2.5), &json!(2)), Ordering::Greater);
    }

    #[test]
    fn booleans_order_false_before_true() {
        assert_eq!(value_cmp(&json!(false), &json!(true)), Ordering::Less);
    }

    #[test]
    fn strings_order_lexicographically() {
        assert_eq!(value_cmp(&json!("fair"), &json!("poor")), Ordering::Less);
        assert_eq!(value_cmp(&json!("poor"), &json!("poor")), Ordering::Equal);
    }

    #[test]
    fn arrays_and_objects_compare_structurally() {
        assert_eq!(value_cmp(&json!([1, 2]), &json!([1, 2])), Ordering::Equal);
        assert_eq!(value_cmp(&json!([1, 2]), &json!([1, 3])), Ordering::Less);
        assert_eq!(value_cmp(&json!([1]), &json!([1, 0])), Ordering::Less);
        assert_eq!(
            value_cmp(&json!({"a": 1, "b": 2}), &json!({"b": 2, "a": 1})),
            Ordering::Equal
        );
    }

    #[test]
    fn mixed_types_order_by_rank() {
        assert_eq!(value_cmp(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(value_cmp(&json!(5), &json!("5")), Ordering::Less);
        assert_eq!(value_cmp(&json!("x"), &json!([])), Ordering::Less);
    }
}
