//! Key-pattern based redaction, applied at node close (spec §4.4: "Redaction is
//! applied at node close, not at dispatch").

use regex::RegexSet;
use serde_json::Value;

/// Placeholder substituted for any value whose key matches a sensitive pattern.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// A compiled set of key-name patterns considered sensitive.
///
/// Matching is case-insensitive and applies to object keys at any depth;
/// array elements and scalar roots are left untouched (nothing to key on).
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    patterns: RegexSet,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self::with_key_patterns(&[
            "password",
            "passwd",
            "token",
            "secret",
            "api_key",
            "apikey",
            "authorization",
            "credential",
            "private_key",
        ])
    }
}

impl RedactionPolicy {
    /// Build a policy from a list of case-insensitive substring patterns.
    ///
    /// Panics only on malformed regex input, which a `&'static str` literal
    /// list under our control never produces.
    pub fn with_key_patterns(patterns: &[&str]) -> Self {
        let anchored: Vec<String> = patterns.iter().map(|p| format!("(?i){p}")).collect();
        Self {
            patterns: RegexSet::new(anchored).expect("static redaction patterns must compile"),
        }
    }

    /// A policy that never redacts anything (useful for tests and for
    /// resources explicitly marked as already-sanitized).
    pub fn none() -> Self {
        Self {
            patterns: RegexSet::new(Vec::<String>::new()).expect("empty set always compiles"),
        }
    }

    fn key_is_sensitive(&self, key: &str) -> bool {
        self.patterns.is_match(key)
    }

    /// Return a redacted copy of `value`. Object keys matching a sensitive
    /// pattern have their value replaced by [`REDACTED_MARKER`]; nested
    /// objects/arrays are walked recursively.
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    if self.key_is_sensitive(k) {
                        out.insert(k.clone(), Value::String(REDACTED_MARKER.to_string()));
                    } else {
                        out.insert(k.clone(), self.redact(v));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_matching_keys_at_any_depth() {
        let policy = RedactionPolicy::default();
        let input = json!({
            "user": "alice",
            "password": "hunter2",
            "nested": { "api_key": "sk-abc", "note": "fine" },
        });
        let redacted = policy.redact(&input);
        assert_eq!(redacted["user"], json!("alice"));
        assert_eq!(redacted["password"], json!(REDACTED_MARKER));
        assert_eq!(redacted["nested"]["api_key"], json!(REDACTED_MARKER));
        assert_eq!(redacted["nested"]["note"], json!("fine"));
    }

    #[test]
    fn none_policy_is_a_no_op() {
        let policy = RedactionPolicy::none();
        let input = json!({"password": "hunter2"});
        assert_eq!(policy.redact(&input), input);
    }

    #[test]
    fn matches_are_case_insensitive() {
        let policy = RedactionPolicy::default();
        let input = json!({"API_KEY": "sk-abc"});
        assert_eq!(policy.redact(&input)["API_KEY"], json!(REDACTED_MARKER));
    }
}
