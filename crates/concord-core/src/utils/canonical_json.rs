//! Canonical JSON serialization for consensus comparison.
//!
//! Two payloads agree iff their canonical strings are byte-identical. Object keys are
//! emitted in sorted order at every depth so `{"a":1,"b":2}` and `{"b":2,"a":1}` land in the
//! same bucket; everything else (numbers, escapes, array order) is serialized exactly as
//! `serde_json` prints it in compact form.

use serde_json::Value;
use std::fmt::Write;

/// Serialize `value` into its canonical compact form.
#[must_use]
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::with_capacity(64);
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(arr) => {
            out.push('[');
            for (index, element) in arr.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(element, out);
            }
            out.push(']');
        }
        Value::Object(obj) => {
            let mut sorted_keys: Vec<&String> = obj.keys().collect();
            sorted_keys.sort_unstable();

            out.push('{');
            for (index, key) in sorted_keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                if let Some(value) = obj.get(key) {
                    write_canonical(value, out);
                }
            }
            out.push('}');
        }
        // Scalars print as compact JSON already
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    let _ = write!(out, "{}", Value::from(s));
}
