//! Canonical Input Hashing & IO Key (C1)
//!
//! Produces stable, cross-platform fingerprints for arbitrary input data and
//! combines them with call-site metadata into a lookup key unique per
//! recorded IO edge.
//!
//! Canonicalisation order, applied before hashing:
//! 1. sort associative-container entries by key
//! 2. preserve ordered-sequence order
//! 3. round floats to 6 decimals, leave integers exact
//! 4. normalize strings (CRLF/CR -> LF, trim, collapse internal space runs
//!    while preserving leading indentation)
//! 5. emit canonical UTF-8 JSON: ASCII escapes, sorted keys, compact
//!    separators, no insignificant whitespace
//! 6. hash with the configured algorithm

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FingerprintError;

/// Hash algorithms the manifest is allowed to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    Blake3,
    Blake2b,
    Sha256,
    Sha3_256,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Blake3
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HashAlgorithm::Blake3 => "blake3",
            HashAlgorithm::Blake2b => "blake2b",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha3_256 => "sha3_256",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blake3" => Ok(HashAlgorithm::Blake3),
            "blake2b" => Ok(HashAlgorithm::Blake2b),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha3_256" => Ok(HashAlgorithm::Sha3_256),
            other => Err(FingerprintError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Tagged variant used for the canonicalisation pass, replacing the
/// dynamic scalar/map/list typing of the distilled source with an explicit
/// representation (see spec redesign note on dynamic payload typing).
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<CanonicalValue>),
    Map(BTreeMap<String, CanonicalValue>),
}

fn normalize_string(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unified.trim();

    let mut out = Vec::new();
    for line in trimmed.split('\n') {
        let leading = line.len() - line.trim_start().len();
        let content = line.trim_start();
        if content.is_empty() {
            out.push(String::new());
            continue;
        }
        let mut collapsed = String::with_capacity(content.len());
        let mut prev_space = false;
        for ch in content.chars() {
            if ch == ' ' {
                if !prev_space {
                    collapsed.push(' ');
                }
                prev_space = true;
            } else {
                collapsed.push(ch);
                prev_space = false;
            }
        }
        out.push(format!("{}{}", " ".repeat(leading), collapsed));
    }
    out.join("\n")
}

/// Canonicalize a `serde_json::Value` tree into a [`CanonicalValue`].
pub fn canonicalize(value: &Value) -> CanonicalValue {
    match value {
        Value::Null => CanonicalValue::Null,
        Value::Bool(b) => CanonicalValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CanonicalValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CanonicalValue::Int(u as i64)
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                let rounded = (f * 1_000_000.0).round() / 1_000_000.0;
                CanonicalValue::Float(rounded)
            }
        }
        Value::String(s) => CanonicalValue::Str(normalize_string(s)),
        Value::Array(items) => CanonicalValue::List(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map.iter() {
                out.insert(k.clone(), canonicalize(v));
            }
            CanonicalValue::Map(out)
        }
    }
}

/// Emit canonical UTF-8 JSON: sorted keys (via `BTreeMap`), ASCII escapes,
/// compact separators, no insignificant whitespace.
pub fn to_canonical_json(value: &CanonicalValue) -> String {
    let mut out = String::new();
    write_canonical_json(value, &mut out);
    out
}

fn write_canonical_json(value: &CanonicalValue, out: &mut String) {
    match value {
        CanonicalValue::Null => out.push_str("null"),
        CanonicalValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        CanonicalValue::Int(i) => out.push_str(&i.to_string()),
        CanonicalValue::Float(f) => {
            if f.fract() == 0.0 && f.is_finite() {
                out.push_str(&format!("{:.1}", f));
            } else {
                out.push_str(&f.to_string());
            }
        }
        CanonicalValue::Str(s) => {
            out.push('"');
            for ch in s.chars() {
                match ch {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                        out.push_str(&format!("\\u{:04x}", c as u32));
                    }
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        CanonicalValue::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(item, out);
            }
            out.push(']');
        }
        CanonicalValue::Map(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(&CanonicalValue::Str(k.clone()), out);
                out.push(':');
                write_canonical_json(v, out);
            }
            out.push('}');
        }
    }
}

fn digest_hex(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        HashAlgorithm::Blake2b => {
            use blake2::Digest;
            let mut hasher = blake2::Blake2b512::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Sha256 => {
            use sha2::Digest;
            let mut hasher = sha2::Sha256::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Sha3_256 => {
            use sha3::Digest;
            let mut hasher = sha3::Sha3_256::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        }
    }
}

/// Fingerprint arbitrary JSON input with the configured algorithm.
pub fn fingerprint(value: &Value, algorithm: HashAlgorithm) -> String {
    let canonical = canonicalize(value);
    let json = to_canonical_json(&canonical);
    digest_hex(algorithm, json.as_bytes())
}

/// Unique, stable key for one recorded IO edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoKey {
    pub event_type: String,
    pub adapter: String,
    pub agent_id: String,
    pub tool_name: String,
    pub call_index: u64,
    pub input_fingerprint: String,
}

impl IoKey {
    pub fn to_canonical_string(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            self.event_type,
            self.adapter,
            self.agent_id,
            self.tool_name,
            self.call_index,
            self.input_fingerprint
        )
    }
}

impl fmt::Display for IoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

/// Construct an [`IoKey`] from call-site metadata and the raw input value.
pub fn make_key(
    event_type: &str,
    adapter: &str,
    agent_id: &str,
    tool_name: &str,
    call_index: u64,
    input: &Value,
    algorithm: HashAlgorithm,
) -> IoKey {
    IoKey {
        event_type: event_type.to_string(),
        adapter: adapter.to_string(),
        agent_id: agent_id.to_string(),
        tool_name: tool_name.to_string(),
        call_index,
        input_fingerprint: fingerprint(input, algorithm),
    }
}

/// A tiny hex encoder so the crate does not need the `hex` crate purely for
/// this; kept local since only used for the non-BLAKE3 fallback algorithms.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_key_order_insensitive() {
        let a = json!({"temperature": 0.7, "prompt": "hi"});
        let b = json!({"prompt": "hi", "temperature": 0.7});
        assert_eq!(
            fingerprint(&a, HashAlgorithm::Blake3),
            fingerprint(&b, HashAlgorithm::Blake3)
        );
    }

    #[test]
    fn fingerprint_normalizes_whitespace() {
        let a = json!("hello    world\r\n\r\nhow?");
        let b = json!("hello world\n\nhow?");
        assert_eq!(
            fingerprint(&a, HashAlgorithm::Blake3),
            fingerprint(&b, HashAlgorithm::Blake3)
        );
    }

    #[test]
    fn fingerprint_detects_value_changes() {
        let a = json!({"prompt": "hi", "temperature": 0.7});
        let b = json!({"prompt": "hi", "temperature": 0.8});
        assert_ne!(
            fingerprint(&a, HashAlgorithm::Blake3),
            fingerprint(&b, HashAlgorithm::Blake3)
        );
    }

    #[test]
    fn io_key_round_trips_through_display() {
        let key = make_key(
            "llm_call",
            "langchain",
            "agent-1",
            "gpt-4",
            0,
            &json!({"prompt": "hi"}),
            HashAlgorithm::Blake3,
        );
        let s = key.to_canonical_string();
        assert_eq!(s.matches(':').count(), 5);
        assert_eq!(s, key.to_string());
    }

    #[test]
    fn sha256_fallback_is_stable() {
        let a = json!({"x": 1});
        let h1 = fingerprint(&a, HashAlgorithm::Sha256);
        let h2 = fingerprint(&a, HashAlgorithm::Sha256);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }
}
