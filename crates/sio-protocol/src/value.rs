use serde_json::Number;

/// A JSON-like value that additionally admits raw byte-string leaves.
///
/// Plain [`serde_json::Value`] has no way to carry a byte string, but
/// Socket.IO payloads routinely do (a file chunk nested inside an event's
/// argument list, for instance). `Value` is the in-memory shape the codec
/// walks to find those leaves; [`crate::Packet::encode`] replaces each one
/// with a `{"_placeholder":true,"num":N}` marker and hands the raw bytes
/// back separately as wire attachments.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(items.into_iter().collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True if this value or anything nested inside it is a [`Value::Bytes`] leaf.
    pub fn contains_binary_leaf(&self) -> bool {
        match self {
            Value::Bytes(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_binary_leaf),
            Value::Object(fields) => fields.iter().any(|(_, v)| v.contains_binary_leaf()),
            _ => false,
        }
    }

    /// Count of binary leaves anywhere inside this value. Byte strings are
    /// terminal: we never recurse *into* one looking for more leaves.
    pub fn count_binary_leaves(&self) -> usize {
        match self {
            Value::Bytes(_) => 1,
            Value::Array(items) => items.iter().map(Value::count_binary_leaves).sum(),
            Value::Object(fields) => fields.iter().map(|(_, v)| v.count_binary_leaves()).sum(),
            _ => 0,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(fields) => {
                Value::Object(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            // Lossy: bytes have no JSON-native representation. Only reached
            // when a binary leaf escapes into a context expecting plain
            // JSON (e.g. the `environ` argument passed to a connect
            // handler); represented as a byte array rather than dropped.
            Value::Bytes(bytes) => {
                serde_json::Value::Array(bytes.into_iter().map(|b| serde_json::Value::Number(b.into())).collect())
            }
            Value::Array(items) => serde_json::Value::Array(items.into_iter().map(Value::into).collect()),
            Value::Object(fields) => {
                serde_json::Value::Object(fields.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Value {
    fn from(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Value::Object(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
    }
}

/// Walk `value`, replacing every [`Value::Bytes`] leaf with a placeholder
/// object and appending the raw bytes (in the order visited) to `out`.
pub(crate) fn extract_binary(value: &Value, out: &mut Vec<Vec<u8>>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(bytes) => {
            let num = out.len();
            out.push(bytes.clone());
            placeholder_json(num)
        }
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| extract_binary(v, out)).collect())
        }
        Value::Object(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), extract_binary(v, out)))
                .collect(),
        ),
    }
}

fn placeholder_json(num: usize) -> serde_json::Value {
    serde_json::json!({ "_placeholder": true, "num": num })
}

/// Returns the attachment index if `fields` is a placeholder object.
///
/// Accepts either key order, as the spec requires — a decoder must not
/// assume `_placeholder` precedes `num`.
fn placeholder_index(fields: &[(String, Value)]) -> Option<usize> {
    let is_placeholder = fields
        .iter()
        .any(|(k, v)| k == "_placeholder" && matches!(v, Value::Bool(true)));
    if !is_placeholder {
        return None;
    }
    fields.iter().find_map(|(k, v)| match (k.as_str(), v) {
        ("num", Value::Number(n)) => n.as_u64().map(|n| n as usize),
        _ => None,
    })
}

/// Walk `value`, replacing every placeholder object with the corresponding
/// entry from `attachments`. Called once a packet's reassembly is complete.
pub(crate) fn fill_placeholders(value: Value, attachments: &[Vec<u8>]) -> Value {
    match value {
        Value::Object(fields) => match placeholder_index(&fields) {
            Some(num) if num < attachments.len() => Value::Bytes(attachments[num].clone()),
            _ => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, fill_placeholders(v, attachments)))
                    .collect(),
            ),
        },
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| fill_placeholders(v, attachments)).collect())
        }
        other => other,
    }
}
