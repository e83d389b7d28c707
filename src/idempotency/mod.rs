//! Idempotency key derivation.
//!
//! Canonicalizes a JSON value to a stable byte string before hashing, so
//! semantically-equal inputs (reordered object keys, `1` vs `1.0`) derive
//! the same key.

pub mod outbox;

use serde_json::Value;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Opaque, stable identifier for a set of inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdempotencyKey([u8; 32]);

impl IdempotencyKey {
    /// SHA-256 of `task_id | step_id | tool_id | canonical(params)`.
    /// `workflow_id` is folded in too so keys can't collide across
    /// workflows that happen to reuse task/step ids.
    pub fn derive(workflow_id: &str, task_id: &str, step_id: &str, tool_id: &str, params: &Value) -> Self {
        let canonical = canonicalize(params);
        let mut hasher = Sha256::new();
        hasher.update(workflow_id.as_bytes());
        hasher.update([0]);
        hasher.update(task_id.as_bytes());
        hasher.update([0]);
        hasher.update(step_id.as_bytes());
        hasher.update([0]);
        hasher.update(tool_id.as_bytes());
        hasher.update([0]);
        hasher.update(canonical.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

/// Renders a JSON value into a canonical string: object keys sorted
/// ascending by codepoint, arrays preserve order, numbers normalized to
/// their shortest unambiguous decimal form, strings NFC-normalized, and
/// `null` distinguishable from a missing field (the latter simply omits the
/// key, which this function can't observe — that distinction is the
/// caller's responsibility at construction time).
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => {
            out.push('"');
            out.push_str(&s.nfc().collect::<String>().replace('"', "\\\""));
            out.push('"');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.chars().cmp(b.chars()));
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('"');
                out.push_str(&key.nfc().collect::<String>());
                out.push_str("\":");
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

/// Normalizes `1` and `1.0` to the same representation, and otherwise uses
/// the shortest round-tripping decimal form.
fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
            return format!("{}", f as i64);
        }
        // `{}` on f64 already produces the shortest round-tripping form.
        return format!("{f}");
    }
    n.to_string()
}
