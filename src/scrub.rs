//! Redaction of sensitive data before it reaches logs or telemetry.
//!
//! Scrubbing is for observability only. Request bodies sent over the wire are
//! never passed through here.
//!
//! ```rust
//! use penguin_api_client::scrub::scrub;
//!
//! assert_eq!(
//!     scrub("Authorization: Bearer abc.def123"),
//!     "Authorization: [REDACTED]"
//! );
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Marker substituted for every redacted value.
pub const REDACTED: &str = "[REDACTED]";

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

/// Builds a rule for `key=value`, `key: value` and `"key": "value"` shapes.
/// The key and separator are kept, the value is replaced.
fn pair_rule(key: &str) -> Rule {
    let pattern = format!(r#"(?i)([a-z_-]*{key})(["']?\s*[:=]\s*["']?)[^\s&"',;}}]+"#);
    Rule {
        pattern: Regex::new(&pattern).expect("valid key/value scrub pattern"),
        replacement: "${1}${2}[REDACTED]",
    }
}

fn value_rule(pattern: &str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("valid scrub pattern"),
        replacement: REDACTED,
    }
}

// Order matters: bearer credentials go before the key/value rules so that
// `token: Bearer abc` loses the whole credential.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        value_rule(r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*"),
        value_rule(r"\beyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+"),
        pair_rule("token"),
        pair_rule(r"api[_-]?key"),
        pair_rule("secret"),
        value_rule(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
        value_rule(r"\b(?:\d{4}[ -]?){3}\d{4}\b"),
        value_rule(r"\b\d{3}-\d{2}-\d{4}\b"),
        pair_rule(r"passw(?:or)?d"),
        pair_rule(r"session[_-]?id"),
    ]
});

/// Key fragments whose values are always redacted in structured payloads.
/// Keys are compared lowercased with `_` and `-` removed.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "secret",
    "authorization",
    "apikey",
    "sessionid",
    "cookie",
    "ssn",
    "cardnumber",
];

/// Redact sensitive substrings from `text`.
///
/// Idempotent: `scrub(&scrub(x)) == scrub(x)`.
pub fn scrub(text: &str) -> String {
    let mut current = text.to_string();
    for rule in RULES.iter() {
        let replaced = rule.pattern.replace_all(&current, rule.replacement).into_owned();
        current = replaced;
    }
    current
}

/// Check whether a structured field name denotes a secret.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    SENSITIVE_KEYS.iter().any(|fragment| normalized.contains(fragment))
}

/// Redact a JSON value recursively.
///
/// Values stored under sensitive keys are replaced wholesale; every other
/// string is passed through [`scrub`].
pub fn scrub_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(scrub(s)),
        Value::Array(items) => Value::Array(items.iter().map(scrub_value).collect()),
        Value::Object(map) => Value::Object(scrub_map(map)),
        other => other.clone(),
    }
}

/// Redact every entry of a JSON object.
pub fn scrub_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let scrubbed = if is_sensitive_key(key) {
                Value::String(REDACTED.to_string())
            } else {
                scrub_value(value)
            };
            (key.clone(), scrubbed)
        })
        .collect()
}
