//! Conversion of decoded s-expressions into caller-facing values.
//!
//! Normalized results are plain [`serde_json::Value`]s:
//!
//! | s-expression              | normalized                       |
//! |---------------------------|----------------------------------|
//! | `nil`, `()`               | `null`                           |
//! | `t`                       | `true`                           |
//! | `42`, `1.5`, `"text"`     | number / string                  |
//! | other symbols             | string                           |
//! | `(:a 1 :b 2)`             | `{"a": 1, "b": 2}`               |
//! | `(1 2 3)`                 | `[1, 2, 3]`                      |
//! | `("Ann" . "ann@x.org")`   | `["Ann", "ann@x.org"]`           |

use serde_json::{Map, Number, Value};

use super::sexp::{Sexp, KEYWORD_MARKER};

/// Types that can be turned into a normalized result.
///
/// Implemented for [`Sexp`] and for [`Value`] itself, so normalizing an already
/// normalized value is a no-op apart from stripping stray key markers.
pub trait Normalize {
    /// Produce the normalized form of `self`.
    fn normalize(&self) -> Value;
}

impl Normalize for Sexp {
    fn normalize(&self) -> Value {
        match self {
            _ if self.is_nil() => Value::Null,
            _ if self.is_true() => Value::Bool(true),
            Sexp::Integer(n) => Value::Number((*n).into()),
            Sexp::Float(x) => Number::from_f64(*x).map_or(Value::Null, Value::Number),
            Sexp::String(s) | Sexp::Symbol(s) => Value::String(s.clone()),
            Sexp::List(items) if is_plist(items) => {
                let mut map = Map::with_capacity(items.len() / 2);
                for pair in items.chunks_exact(2) {
                    if let Some(key) = pair[0].as_keyword() {
                        map.insert(key.to_string(), pair[1].normalize());
                    }
                }
                Value::Object(map)
            }
            Sexp::List(items) => Value::Array(items.iter().map(Normalize::normalize).collect()),
            Sexp::Pair(car, cdr) => Value::Array(vec![car.normalize(), cdr.normalize()]),
        }
    }
}

impl Normalize for Value {
    fn normalize(&self) -> Value {
        match self {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (strip_marker(k).to_string(), v.normalize()))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(Normalize::normalize).collect()),
            scalar => scalar.clone(),
        }
    }
}

/// Convenience wrapper around [`Normalize::normalize`].
pub fn normalize<T: Normalize + ?Sized>(value: &T) -> Value {
    value.normalize()
}

/// A list folds into a mapping when every even position holds a `:keyword`.
fn is_plist(items: &[Sexp]) -> bool {
    !items.is_empty()
        && items.len() % 2 == 0
        && items.iter().step_by(2).all(|k| k.as_keyword().is_some())
}

fn strip_marker(key: &str) -> &str {
    key.strip_prefix(KEYWORD_MARKER).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::sexp::parse;

    fn norm(text: &str) -> Value {
        parse(text).unwrap().normalize()
    }

    #[test]
    fn reserved_symbols() {
        assert_eq!(norm("nil"), Value::Null);
        assert_eq!(norm("()"), Value::Null);
        assert_eq!(norm("t"), Value::Bool(true));
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(norm("42"), json!(42));
        assert_eq!(norm("-2.5"), json!(-2.5));
        assert_eq!(norm("\"hello\""), json!("hello"));
        assert_eq!(norm("inbox"), json!("inbox"));
    }

    #[test]
    fn scalar_normalization_is_idempotent() {
        for text in ["42", "1.25", "\"x y\"", "nil", "t", "sym"] {
            let once = norm(text);
            assert_eq!(once.normalize(), once, "not idempotent for {text}");
        }
    }

    #[test]
    fn plist_folds_into_mapping() {
        assert_eq!(norm("(:a 1 :b 2)"), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn plist_keeps_key_order() {
        let value = norm("(:z 1 :a 2 :m 3)");
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn nested_values_normalize_recursively() {
        let value = norm(
            "(:docid 7 :flags (seen replied) :thread (:level 1 :empty-parent nil) \
             :from ((\"Ann\" . \"ann@example.com\")) :draft t)",
        );
        assert_eq!(
            value,
            json!({
                "docid": 7,
                "flags": ["seen", "replied"],
                "thread": {"level": 1, "empty-parent": null},
                "from": [["Ann", "ann@example.com"]],
                "draft": true,
            })
        );
    }

    #[test]
    fn lists_without_keywords_stay_lists() {
        assert_eq!(norm("(1 2 3)"), json!([1, 2, 3]));
        assert_eq!(norm("(:a 1 :b)"), json!([":a", 1, ":b"]));
        assert_eq!(norm("(:a 1 2 3)"), json!([":a", 1, 2, 3]));
        assert_eq!(norm("((:a 1) (:a 2))"), json!([{"a": 1}, {"a": 2}]));
    }

    #[test]
    fn mapping_input_strips_markers() {
        let value = json!({":docid": 1, "path": {":inner": [ {":x": true} ]}});
        assert_eq!(
            normalize(&value),
            json!({"docid": 1, "path": {"inner": [{"x": true}]}})
        );
    }

    #[test]
    fn non_finite_float_becomes_null() {
        assert_eq!(Sexp::Float(f64::NAN).normalize(), Value::Null);
    }
}
