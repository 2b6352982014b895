//! Cache record encoding.
//!
//! A stored record is a JSON object mapping the storage key to the value:
//! `{"<storage key>": <value>}`. The key is repeated inside the record even
//! though the backend already addresses the record by it; records written by
//! either backend stay readable by the other as long as this layout holds.
//!
//! Wrapping a single key into a [`CacheEntry`] before encoding happens here
//! and nowhere else.

use std::collections::BTreeMap;

use serde::de::{DeserializeOwned, Error as _};
use serde::ser;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CacheError;

/// Mapping from storage key to value, as held inside one stored record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheEntry(BTreeMap<String, Value>);

impl CacheEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `value` into an entry holding only `key`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Encode` if `value` has no JSON representation
    /// (for example a map whose keys are not strings, or a NaN or infinite
    /// float anywhere inside it).
    pub fn single<T>(key: &str, value: &T) -> Result<Self, CacheError>
    where
        T: Serialize + ?Sized,
    {
        // serde_json writes non-finite floats as `null`, which would not
        // decode back into the original type.
        value.serialize(FiniteFloats).map_err(CacheError::Encode)?;
        let value = serde_json::to_value(value).map_err(CacheError::Encode)?;
        let mut entry = Self::new();
        entry.insert(key, value);
        Ok(entry)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes the value bound to `key` and deserializes it into `T`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Decode` if the entry does not contain `key` or
    /// the value does not fit `T`.
    pub fn take<T>(mut self, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        let value = self.0.remove(key).ok_or_else(|| {
            CacheError::Decode(serde_json::Error::custom(format!(
                "record does not contain key `{key}`"
            )))
        })?;

        serde_json::from_value(value).map_err(CacheError::Decode)
    }
}

/// Serializes an entry into a stored record.
pub fn encode(entry: &CacheEntry) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(entry).map_err(CacheError::Encode)
}

/// Parses a stored record.
pub fn decode(bytes: &[u8]) -> Result<CacheEntry, CacheError> {
    serde_json::from_slice(bytes).map_err(CacheError::Decode)
}

/// Builds the stored record for one `key`/`value` pair.
pub fn encode_value<T>(key: &str, value: &T) -> Result<Vec<u8>, CacheError>
where
    T: Serialize + ?Sized,
{
    encode(&CacheEntry::single(key, value)?)
}

/// Reads the value bound to `key` out of a stored record.
pub fn decode_value<T>(key: &str, bytes: &[u8]) -> Result<T, CacheError>
where
    T: DeserializeOwned,
{
    decode(bytes)?.take(key)
}

/// Walks a value and fails on the first NaN or infinite float.
#[derive(Clone, Copy)]
struct FiniteFloats;

fn non_finite(value: f64) -> serde_json::Error {
    <serde_json::Error as ser::Error>::custom(format!("{value} has no JSON representation"))
}

impl ser::Serializer for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_f32(self, v: f32) -> Result<(), Self::Error> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), Self::Error> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(non_finite(v))
        }
    }

    fn serialize_bool(self, _: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_char(self, _: char) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_some<T>(self, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_newtype_struct<T>(self, _: &'static str, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(self)
    }

    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        key.serialize(*self)
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, _: &'static str, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, _: &'static str, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Session {
        user_id: u64,
        roles: Vec<String>,
        remember: bool,
    }

    #[test]
    fn test_encode_decode() {
        let mut entry = CacheEntry::new();
        entry.insert("foo", json!("bar"));

        let bytes = encode(&entry).unwrap();
        let out = decode(&bytes).unwrap();

        assert_eq!(out, entry);
        assert_eq!(out.get("foo"), Some(&json!("bar")));
    }

    #[test]
    fn test_round_trip_structured_value() {
        let session = Session {
            user_id: 42,
            roles: vec!["admin".into(), "editor".into()],
            remember: true,
        };

        let bytes = encode_value("session:42", &session).unwrap();
        let out: Session = decode_value("session:42", &bytes).unwrap();

        assert_eq!(out, session);
    }

    #[test]
    fn test_record_repeats_storage_key() {
        let bytes = encode_value("ugo:foo", "bar").unwrap();

        assert_eq!(bytes, br#"{"ugo:foo":"bar"}"#.to_vec());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let mut first = CacheEntry::new();
        first.insert("b", json!(2));
        first.insert("a", json!(1));

        let mut second = CacheEntry::new();
        second.insert("a", json!(1));
        second.insert("b", json!(2));

        assert_eq!(encode(&first).unwrap(), encode(&second).unwrap());
    }

    #[test]
    fn test_unrepresentable_value_is_encode_error() {
        let mut value = HashMap::new();
        value.insert((1, 2), "tuple keys have no JSON form");

        let result = encode_value("foo", &value);

        assert!(matches!(result, Err(CacheError::Encode(_))));
    }

    #[test]
    fn test_nan_is_encode_error() {
        let result = encode_value("foo", &f64::NAN);

        assert!(matches!(result, Err(CacheError::Encode(_))));
    }

    #[test]
    fn test_positive_infinity_is_encode_error() {
        let result = encode_value("foo", &f64::INFINITY);

        assert!(matches!(result, Err(CacheError::Encode(_))));
    }

    #[test]
    fn test_negative_infinity_is_encode_error() {
        let result = encode_value("foo", &f32::NEG_INFINITY);

        assert!(matches!(result, Err(CacheError::Encode(_))));
    }

    #[test]
    fn test_nested_non_finite_float_is_encode_error() {
        let mut readings = BTreeMap::new();
        readings.insert("sensor-a".to_string(), vec![1.5, f64::NAN]);

        let result = CacheEntry::single("foo", &readings);

        assert!(matches!(result, Err(CacheError::Encode(_))));
    }

    #[test]
    fn test_finite_floats_round_trip() {
        let bytes = encode_value("foo", &vec![0.5_f64, -2.25, f64::MAX]).unwrap();
        let out: Vec<f64> = decode_value("foo", &bytes).unwrap();

        assert_eq!(out, vec![0.5, -2.25, f64::MAX]);
    }

    #[test]
    fn test_truncated_record_is_decode_error() {
        let bytes = encode_value("foo", "bar").unwrap();

        let result = decode(&bytes[..bytes.len() - 3]);

        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_non_json_record_is_decode_error() {
        let result = decode(&[0xff, 0x00, 0x13, 0x37]);

        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_missing_key_is_decode_error() {
        let bytes = encode_value("foo", "bar").unwrap();

        let result: Result<String, _> = decode_value("other", &bytes);

        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_type_mismatch_is_decode_error() {
        let bytes = encode_value("foo", "bar").unwrap();

        let result: Result<u64, _> = decode_value("foo", &bytes);

        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_single_holds_exactly_one_pair() {
        let entry = CacheEntry::single("foo", &[1, 2, 3]).unwrap();

        assert_eq!(entry.len(), 1);
        assert!(!entry.is_empty());
        assert_eq!(entry.get("foo"), Some(&json!([1, 2, 3])));
    }
}
