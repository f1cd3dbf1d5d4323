use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Builds a JSON object whose keys serialize in lexicographic order.
///
/// Entries are sorted before insertion so the output is the same whether or not
/// `serde_json` was built with `preserve_order`.
pub(crate) fn canonical_object<const N: usize>(mut entries: [(&str, Value); N]) -> Value {
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key.to_string(), value);
    }
    Value::Object(map)
}

/// Hashes the compact JSON text of a canonical value.
pub(crate) fn canonical_hash(value: &Value) -> String {
    sha256_hex(value.to_string().as_bytes())
}
