//! MessagePack to JSON rendering
//!
//! A payload is decoded into a dynamic [`rmpv::Value`] and mapped onto JSON.
//! MessagePack types that JSON cannot hold are rendered explicitly:
//!
//! - `bin` becomes a base64 string (standard alphabet, padded)
//! - the timestamp extension (type -1) becomes an RFC 3339 string in UTC
//! - any other extension becomes `{"type": <i8>, "data": "<base64>"}`
//! - non-string map keys become their JSON text, so `1` is keyed as `"1"`
//! - NaN and infinities become `null`

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use rmpv::Value as MsgValue;
use serde_json::{Map, Number, Value as JsonValue};

use crate::error::WriterError;

/// Extension type reserved for timestamps
pub const TIMESTAMP_EXT: i8 = -1;

/// Decode the MessagePack value at the start of `payload` as compact JSON.
pub fn to_json(payload: &[u8]) -> Result<Vec<u8>, WriterError> {
    let mut reader = payload;
    let value = rmpv::decode::read_value(&mut reader)?;
    Ok(serde_json::to_vec(&convert(value))?)
}

pub fn convert(value: MsgValue) -> JsonValue {
    match value {
        MsgValue::Nil => JsonValue::Null,
        MsgValue::Boolean(b) => JsonValue::Bool(b),
        MsgValue::Integer(n) => n
            .as_u64()
            .map(JsonValue::from)
            .or_else(|| n.as_i64().map(JsonValue::from))
            .unwrap_or(JsonValue::Null),
        // Through the shortest f32 text, so 0.1f32 prints as 0.1
        MsgValue::F32(f) => float(f.to_string().parse().unwrap_or(f64::from(f))),
        MsgValue::F64(f) => float(f),
        MsgValue::String(s) => JsonValue::String(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        MsgValue::Binary(bytes) => JsonValue::String(STANDARD.encode(bytes)),
        MsgValue::Array(items) => JsonValue::Array(items.into_iter().map(convert).collect()),
        MsgValue::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                map.insert(map_key(key), convert(value));
            }
            JsonValue::Object(map)
        }
        MsgValue::Ext(TIMESTAMP_EXT, data) => match timestamp(&data) {
            Some(ts) => JsonValue::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => ext_object(TIMESTAMP_EXT, &data),
        },
        MsgValue::Ext(kind, data) => ext_object(kind, &data),
    }
}

fn float(f: f64) -> JsonValue {
    Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

fn map_key(key: MsgValue) -> String {
    match convert(key) {
        JsonValue::String(s) => s,
        other => other.to_string(),
    }
}

fn ext_object(kind: i8, data: &[u8]) -> JsonValue {
    serde_json::json!({ "type": kind, "data": STANDARD.encode(data) })
}

/// Parse the 32, 64 and 96-bit timestamp layouts
fn timestamp(data: &[u8]) -> Option<DateTime<Utc>> {
    let (secs, nanos) = match data.len() {
        4 => (i64::from(u32::from_be_bytes(data.try_into().ok()?)), 0),
        8 => {
            let raw = u64::from_be_bytes(data.try_into().ok()?);
            ((raw & 0x3_ffff_ffff) as i64, (raw >> 34) as u32)
        }
        12 => {
            let nanos = u32::from_be_bytes(data[..4].try_into().ok()?);
            let secs = i64::from_be_bytes(data[4..].try_into().ok()?);
            (secs, nanos)
        }
        _ => return None,
    };
    if nanos >= 1_000_000_000 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(secs, nanos)
}
