// src/firestore_value.rs
//
// Firestore REST documents wrap every value in a typed envelope
// (`{"stringValue": "x"}`, `{"integerValue": "12"}`, ...). The dashboard works on
// plain JSON, so documents are unwrapped on read and wrapped again on write.

use serde_json::{json, Map, Number, Value};

/// Converts a document's `fields` object into a plain JSON object.
pub fn fields_to_json(fields: &Map<String, Value>) -> Value {
    let mut out = Map::with_capacity(fields.len());
    for (key, typed) in fields {
        out.insert(key.clone(), decode_value(typed));
    }
    Value::Object(out)
}

pub fn decode_value(typed: &Value) -> Value {
    let Some(obj) = typed.as_object() else {
        return Value::Null;
    };

    if let Some(s) = obj.get("stringValue") {
        return s.clone();
    }
    if let Some(raw) = obj.get("integerValue") {
        // Encoded as a decimal string on the wire.
        let parsed = match raw {
            Value::String(s) => s.parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        };
        return parsed.map(Value::from).unwrap_or(Value::Null);
    }
    if let Some(raw) = obj.get("doubleValue") {
        let parsed = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        };
        return parsed
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Some(b) = obj.get("booleanValue") {
        return b.clone();
    }
    if obj.contains_key("nullValue") {
        return Value::Null;
    }
    if let Some(ts) = obj.get("timestampValue") {
        return ts.clone();
    }
    if let Some(reference) = obj.get("referenceValue") {
        return reference.clone();
    }
    if let Some(bytes) = obj.get("bytesValue") {
        return bytes.clone();
    }
    if let Some(geo) = obj.get("geoPointValue") {
        return geo.clone();
    }
    if let Some(map) = obj.get("mapValue") {
        return match map.get("fields").and_then(Value::as_object) {
            Some(fields) => fields_to_json(fields),
            None => Value::Object(Map::new()),
        };
    }
    if let Some(array) = obj.get("arrayValue") {
        let values = array
            .get("values")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }

    Value::Null
}

pub fn encode_value(plain: &Value) -> Value {
    match plain {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Converts a plain JSON object into a Firestore `fields` object.
pub fn encode_fields(map: &Map<String, Value>) -> Value {
    let mut fields = Map::with_capacity(map.len());
    for (key, value) in map {
        fields.insert(key.clone(), encode_value(value));
    }
    Value::Object(fields)
}
