// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convoflow contributors

//! Content hashing for cache keys
//!
//! Uses BLAKE3 for fast, secure content hashing. Structured payloads are
//! serialized to canonical JSON (sorted keys, no whitespace) before hashing so
//! that map ordering never changes a key.

use blake3::Hasher;
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use std::path::Path;

use crate::errors::{ConvoflowError, ConvoflowResult};

const READ_CHUNK: usize = 8192;

/// Incremental content hasher
pub struct ContentHasher {
    hasher: Hasher,
}

impl ContentHasher {
    /// Create a new content hasher
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash arbitrary bytes
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Stream a reader into the hash in fixed-size chunks
    pub fn update_reader<R: Read>(&mut self, mut reader: R) -> std::io::Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            self.hasher.update(&buf[..n]);
        }
    }

    /// Finalize and get the hex digest
    pub fn finalize(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute a quick hash of a string
pub fn hash_string(s: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(s.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Compute the streaming hash of a file's bytes
pub fn hash_file(path: &Path) -> ConvoflowResult<String> {
    let file = std::fs::File::open(path).map_err(|e| ConvoflowError::FileReadError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let mut hasher = ContentHasher::new();
    hasher
        .update_reader(std::io::BufReader::new(file))
        .map_err(|e| ConvoflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    Ok(hasher.finalize())
}

/// Hash any serializable payload through its canonical JSON form
pub fn hash_payload<T: Serialize + ?Sized>(payload: &T) -> ConvoflowResult<String> {
    let value = serde_json::to_value(payload)?;
    Ok(hash_string(&to_canonical_json(&value)))
}

/// Serialize a JSON value canonically: object keys sorted, no whitespace
pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
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
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a plain string cannot fail
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
