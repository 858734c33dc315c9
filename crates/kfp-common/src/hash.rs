//! Order-independent content hashing for resource versions
//!
//! Every field is followed by a zero separator byte so that adjacent fields
//! cannot be confused (`"ab" + "c"` hashes differently from `"a" + "bc"`).
//! Maps are written key-sorted and lists are sorted before writing, so two
//! specs with the same content always produce the same version regardless
//! of insertion order.
//!
//! Digests are SHA-256 (aws-lc-rs) for stability across toolchain versions.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use aws_lc_rs::digest;

use crate::crd::{Artifact, NamedValue, OutputArtifact};

const FIELD_SEPARATOR: &[u8] = &[0];

/// Number of digest bytes kept in a short version string
const VERSION_BYTES: usize = 3;

/// A key/value shaped item that can be written as a sorted list
pub trait KeyValue {
    /// Sort key and first written field
    fn key(&self) -> &str;
    /// Tie breaker and second written field
    fn value(&self) -> &str;
}

impl KeyValue for NamedValue {
    fn key(&self) -> &str {
        &self.name
    }
    fn value(&self) -> &str {
        &self.value
    }
}

impl KeyValue for OutputArtifact {
    fn key(&self) -> &str {
        &self.name
    }
    fn value(&self) -> &str {
        &self.path
    }
}

impl KeyValue for Artifact {
    fn key(&self) -> &str {
        &self.name
    }
    fn value(&self) -> &str {
        &self.location
    }
}

/// Incremental hasher over resource fields
pub struct ObjectHasher {
    ctx: digest::Context,
}

impl Default for ObjectHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectHasher {
    /// Start a new hash
    pub fn new() -> Self {
        Self {
            ctx: digest::Context::new(&digest::SHA256),
        }
    }

    /// Write a string followed by the field separator
    pub fn write_string_field(&mut self, value: &str) {
        self.ctx.update(value.as_bytes());
        self.write_field_separator();
    }

    /// Write a string map in key order, terminated by a separator
    pub fn write_map_field(&mut self, map: &BTreeMap<String, String>) {
        for (key, value) in map {
            self.write_string_field(key);
            self.write_string_field(value);
        }
        self.write_field_separator();
    }

    /// Write a map of JSON values in key order
    ///
    /// Values are written in canonical form (object keys sorted, no
    /// insignificant whitespace). Null values contribute only their key.
    pub fn write_json_map_field(&mut self, map: &BTreeMap<String, serde_json::Value>) {
        for (key, value) in map {
            self.write_string_field(key);
            if value.is_null() {
                continue;
            }
            self.write_string_field(&canonical_json(value));
        }
    }

    /// Write a list after sorting a copy of it with `cmp`
    pub fn write_list<T, C, W>(&mut self, items: &[T], mut cmp: C, mut write: W)
    where
        T: Clone,
        C: FnMut(&T, &T) -> Ordering,
        W: FnMut(&mut Self, &T),
    {
        let mut sorted = items.to_vec();
        sorted.sort_by(|a, b| cmp(a, b));
        for item in &sorted {
            write(self, item);
        }
        self.write_field_separator();
    }

    /// Write a key/value list sorted by key, then value
    pub fn write_kv_list_field<T: KeyValue + Clone>(&mut self, items: &[T]) {
        self.write_list(
            items,
            |a, b| a.key().cmp(b.key()).then_with(|| a.value().cmp(b.value())),
            |hasher, item| {
                hasher.write_string_field(item.key());
                hasher.write_string_field(item.value());
            },
        );
    }

    /// Write a bare separator
    pub fn write_field_separator(&mut self) {
        self.ctx.update(FIELD_SEPARATOR);
    }

    /// Finish and return the full digest
    pub fn sum(self) -> Vec<u8> {
        self.ctx.finish().as_ref().to_vec()
    }

    /// Finish and return the short hex version
    pub fn version(self) -> String {
        short_hex(&self.sum())
    }
}

/// Lowercase hex of the leading digest bytes used as a version
pub fn short_hex(digest: &[u8]) -> String {
    digest
        .iter()
        .take(VERSION_BYTES)
        .fold(String::with_capacity(VERSION_BYTES * 2), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

fn canonical_json(value: &serde_json::Value) -> String {
    // serde_json maps are ordered by key, so serializing is canonical.
    serde_json::to_string(value).unwrap_or_default()
}
