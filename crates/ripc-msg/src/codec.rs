//! ---
//! ripc_section: "02-messaging-ipc-data-model"
//! ripc_subsection: "module"
//! ripc_type: "source"
//! ripc_scope: "code"
//! ripc_description: "Envelope codec between keyed mappings and JSON text."
//! ripc_version: "v0.1.0"
//! ripc_owner: "tbd"
//! ---
use serde::de::value::Error as CheckError;
use serde::ser::{self, Error as _, Serializer};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::{IpcError, Result};

/// Keyed mapping carried on the wire as a single JSON object.
pub type Envelope = Map<String, JsonValue>;

/// Encode an envelope into its canonical JSON text.
pub fn encode(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|err| IpcError::InvalidEnvelope(err.to_string()))
}

/// Convert any serializable value into an envelope.
///
/// Fails with [`IpcError::InvalidEnvelope`] if serialization fails (for
/// example a map with non-string keys), if the value holds a NaN or infinite
/// float, or if the value is not map-shaped.
pub fn to_envelope<T: Serialize + ?Sized>(value: &T) -> Result<Envelope> {
    // serde_json would quietly write non-finite floats as `null`
    value
        .serialize(FiniteFloats)
        .map_err(|err| IpcError::InvalidEnvelope(err.to_string()))?;
    match serde_json::to_value(value) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(other) => Err(IpcError::InvalidEnvelope(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(err) => Err(IpcError::InvalidEnvelope(err.to_string())),
    }
}

/// Validate and encode any serializable value in one step.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    encode(&to_envelope(value)?)
}

/// Decode wire text, checking JSON syntax only.
///
/// Arrays and scalars are returned as-is; use [`decode_envelope`] when an
/// object is required.
pub fn decode(text: &str) -> Result<JsonValue> {
    serde_json::from_str(text).map_err(|err| IpcError::MalformedEnvelope(err.to_string()))
}

/// Decode wire text that must contain a JSON object.
pub fn decode_envelope(text: &str) -> Result<Envelope> {
    match decode(text)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(IpcError::MalformedEnvelope(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Serializer that only walks a value and fails on the first float JSON
/// cannot represent.
#[derive(Clone, Copy)]
struct FiniteFloats;

type Checked = std::result::Result<(), CheckError>;

fn check_float(value: f64) -> Checked {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CheckError::custom(format!("{value} cannot be represented in JSON")))
    }
}

impl Serializer for FiniteFloats {
    type Ok = ();
    type Error = CheckError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Checked {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Checked {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Checked {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Checked {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Checked {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> Checked {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Checked {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Checked {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Checked {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Checked {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> Checked {
        Ok(())
    }
    fn serialize_f32(self, value: f32) -> Checked {
        check_float(f64::from(value))
    }
    fn serialize_f64(self, value: f64) -> Checked {
        check_float(value)
    }
    fn serialize_char(self, _: char) -> Checked {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Checked {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Checked {
        Ok(())
    }
    fn serialize_none(self) -> Checked {
        Ok(())
    }
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Checked {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Checked {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Checked {
        Ok(())
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Checked {
        Ok(())
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }
    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, CheckError> {
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, CheckError> {
        Ok(self)
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, CheckError> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, CheckError> {
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, CheckError> {
        Ok(self)
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, CheckError> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, CheckError> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Checked {
        key.serialize(*self)
    }
    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    const PRINTER_JSON: &str = r#"{"msg":"Printer on fire!!","severity":10}"#;

    fn printer_envelope() -> Envelope {
        let mut map = Envelope::new();
        map.insert("msg".into(), json!("Printer on fire!!"));
        map.insert("severity".into(), json!(10));
        map
    }

    #[test]
    fn encode_produces_compact_json() {
        assert_eq!(encode(&printer_envelope()).unwrap(), PRINTER_JSON);
    }

    #[test]
    fn decode_accepts_objects() {
        let decoded = decode(PRINTER_JSON).unwrap();
        assert_eq!(decoded, JsonValue::Object(printer_envelope()));
    }

    #[test]
    fn decode_and_encode_preserve_nested_values() {
        let original = json!({
            "msg": "status",
            "flags": [true, false],
            "detail": {"tray": 2, "paper": null},
        });
        let text = encode_value(&original).unwrap();
        assert_eq!(decode(&text).unwrap(), original);
    }

    #[test]
    fn decode_rejects_garbage() {
        let tricky = r#"{"msg": "This is tricky", "severity": float('nan')}"#;
        assert!(matches!(decode(tricky), Err(IpcError::MalformedEnvelope(_))));
        assert!(matches!(decode("('bad', 'stuff')"), Err(IpcError::MalformedEnvelope(_))));
        assert!(matches!(decode(""), Err(IpcError::MalformedEnvelope(_))));
    }

    #[test]
    fn decode_returns_non_objects_as_is() {
        assert_eq!(decode("[1, 2]").unwrap(), json!([1, 2]));
        assert_eq!(decode("\"text\"").unwrap(), json!("text"));
    }

    #[test]
    fn decode_envelope_requires_an_object() {
        assert_eq!(decode_envelope(PRINTER_JSON).unwrap(), printer_envelope());
        let err = decode_envelope("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn to_envelope_rejects_non_mappings() {
        assert!(matches!(
            to_envelope(&("bad", "stuff")),
            Err(IpcError::InvalidEnvelope(_))
        ));
        assert!(matches!(to_envelope(&42), Err(IpcError::InvalidEnvelope(_))));
        assert!(matches!(to_envelope(&()), Err(IpcError::InvalidEnvelope(_))));
    }

    #[test]
    fn to_envelope_rejects_unencodable_members() {
        let mut bogus: BTreeMap<(u8, u8), bool> = BTreeMap::new();
        bogus.insert((0, 2), true);
        assert!(matches!(
            encode_value(&bogus),
            Err(IpcError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        #[derive(Serialize)]
        struct Reading {
            value: f64,
        }

        assert!(matches!(
            encode_value(&Reading { value: f64::NAN }),
            Err(IpcError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            to_envelope(&Reading { value: f64::INFINITY }),
            Err(IpcError::InvalidEnvelope(_))
        ));

        let mut nested: BTreeMap<&str, Vec<Option<f32>>> = BTreeMap::new();
        nested.insert("samples", vec![Some(1.5), Some(f32::NEG_INFINITY)]);
        let err = to_envelope(&nested).unwrap_err();
        assert!(err.to_string().contains("-inf"));

        let envelope = to_envelope(&Reading { value: 0.25 }).unwrap();
        assert_eq!(envelope["value"], json!(0.25));
    }

    #[test]
    fn to_envelope_accepts_structs() {
        #[derive(Serialize)]
        struct Job {
            name: &'static str,
            copies: u32,
        }

        let envelope = to_envelope(&Job {
            name: "report",
            copies: 3,
        })
        .unwrap();
        assert_eq!(envelope["name"], json!("report"));
        assert_eq!(envelope["copies"], json!(3));
    }
}
