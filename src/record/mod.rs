//! Strongly-typed attribute records
//!
//! An [`AttributeRecord`] is the per-URI metadata container: an ordered map
//! from string keys to typed [`Value`]s. Accessors check the stored type and
//! fail with [`RecordError::TypeMismatch`] instead of coercing.
//!
//! # Example
//!
//! ```
//! use recrawl::record::{AttributeRecord, ValueType};
//!
//! let mut record = AttributeRecord::new();
//! record.put_int("status", 200);
//! assert_eq!(record.get_int("status").unwrap(), 200);
//! assert!(record.get_string("status").is_err());
//! assert_eq!(record.type_of("missing"), ValueType::Undefined);
//! ```

pub mod keys;
mod value;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use value::{ByteStream, FromValue, OpaqueObject, Value, ValueType};

use crate::utils::error::RecordError;

/// Result alias for record access
pub type RecordResult<T> = std::result::Result<T, RecordError>;

/// Ordered, strongly-typed key/value record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeRecord {
    entries: BTreeMap<String, Value>,
}

impl AttributeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Remove every entry, closing held streams first
    pub fn clear(&mut self) {
        self.close();
        self.entries.clear();
    }

    /// Type tag of the value under `key`, [`ValueType::Undefined`] if absent
    pub fn type_of(&self, key: &str) -> ValueType {
        self.entries
            .get(key)
            .map(Value::value_type)
            .unwrap_or(ValueType::Undefined)
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_value_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    /// Checked typed read
    pub fn get<'a, T: FromValue<'a>>(&'a self, key: &str) -> RecordResult<T> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| RecordError::NoSuchKey(key.to_string()))?;

        T::from_value(value).ok_or_else(|| RecordError::TypeMismatch {
            key: key.to_string(),
            expected: T::TYPE,
            found: value.value_type(),
        })
    }

    /// Store a value, replacing whatever was there regardless of type
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    // ------------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------------

    pub fn get_int(&self, key: &str) -> RecordResult<i32> {
        self.get(key)
    }

    pub fn get_long(&self, key: &str) -> RecordResult<i64> {
        self.get(key)
    }

    pub fn get_string(&self, key: &str) -> RecordResult<&str> {
        self.get(key)
    }

    pub fn get_date(&self, key: &str) -> RecordResult<DateTime<Utc>> {
        self.get(key)
    }

    pub fn get_record(&self, key: &str) -> RecordResult<&AttributeRecord> {
        self.get(key)
    }

    pub fn get_stream(&self, key: &str) -> RecordResult<&ByteStream> {
        self.get(key)
    }

    pub fn get_object(&self, key: &str) -> RecordResult<&OpaqueObject> {
        self.get(key)
    }

    pub fn get_int_array(&self, key: &str) -> RecordResult<&[i32]> {
        self.get(key)
    }

    pub fn get_long_array(&self, key: &str) -> RecordResult<&[i64]> {
        self.get(key)
    }

    pub fn get_string_array(&self, key: &str) -> RecordResult<&[String]> {
        self.get(key)
    }

    pub fn get_date_array(&self, key: &str) -> RecordResult<&[DateTime<Utc>]> {
        self.get(key)
    }

    pub fn get_record_array(&self, key: &str) -> RecordResult<&[Option<AttributeRecord>]> {
        self.get(key)
    }

    pub fn get_stream_array(&self, key: &str) -> RecordResult<&[ByteStream]> {
        self.get(key)
    }

    pub fn put_int(&mut self, key: impl Into<String>, value: i32) {
        self.put(key, value);
    }

    pub fn put_long(&mut self, key: impl Into<String>, value: i64) {
        self.put(key, value);
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, Value::String(value.into()));
    }

    pub fn put_date(&mut self, key: impl Into<String>, value: DateTime<Utc>) {
        self.put(key, value);
    }

    pub fn put_record(&mut self, key: impl Into<String>, value: AttributeRecord) {
        self.put(key, value);
    }

    pub fn put_stream(&mut self, key: impl Into<String>, value: ByteStream) {
        self.put(key, value);
    }

    pub fn put_record_array(&mut self, key: impl Into<String>, value: Vec<Option<AttributeRecord>>) {
        self.put(key, value);
    }

    pub fn put_string_array(&mut self, key: impl Into<String>, value: Vec<String>) {
        self.put(key, value);
    }

    // ------------------------------------------------------------------------
    // Copying and merging
    // ------------------------------------------------------------------------

    /// Copy the listed keys from `other`
    ///
    /// A key is copied when `clobber` is set or the key is absent here.
    /// Keys missing from `other` are skipped. Streams and objects are shared,
    /// not duplicated.
    pub fn copy_keys_from<I, K>(&mut self, keys: I, other: &AttributeRecord, clobber: bool)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            let key = key.as_ref();
            if !clobber && self.contains_key(key) {
                continue;
            }
            if let Some(value) = other.entries.get(key) {
                self.entries.insert(key.to_string(), value.clone());
            }
        }
    }

    /// Copy every key of `other`, replacing existing entries
    pub fn copy_from(&mut self, other: &AttributeRecord) {
        self.copy_keys_from(other.keys(), other, true);
    }

    /// Merge every key of `other`, keeping entries already present here
    pub fn merge_missing_from(&mut self, other: &AttributeRecord) {
        self.copy_keys_from(other.keys(), other, false);
    }

    /// Deep copy
    ///
    /// Nested records and record arrays are copied recursively; primitive
    /// arrays are copied one level. Streams and opaque objects cannot be
    /// duplicated and fail with [`RecordError::Uncloneable`].
    pub fn deep_clone(&self) -> RecordResult<AttributeRecord> {
        let mut copy = AttributeRecord::new();
        for (key, value) in &self.entries {
            let cloned = match value {
                Value::Record(r) => Value::Record(r.deep_clone()?),
                Value::RecordArray(slots) => {
                    let mut out = Vec::with_capacity(slots.len());
                    for slot in slots {
                        out.push(slot.as_ref().map(AttributeRecord::deep_clone).transpose()?);
                    }
                    Value::RecordArray(out)
                }
                Value::Stream(_) | Value::Object(_) | Value::StreamArray(_) | Value::ObjectArray(_) => {
                    return Err(RecordError::Uncloneable {
                        key: key.clone(),
                        value_type: value.value_type(),
                    });
                }
                primitive => primitive.clone(),
            };
            copy.entries.insert(key.clone(), cloned);
        }
        Ok(copy)
    }

    /// Snapshot of the listed keys only
    pub fn project<I, K>(&self, keys: I) -> AttributeRecord
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut out = AttributeRecord::new();
        out.copy_keys_from(keys, self, true);
        out
    }

    /// Whether every value survives serialization
    pub fn is_persistable(&self) -> bool {
        self.entries.values().all(Value::is_persistable)
    }

    /// Close every byte stream held directly or in nested records
    pub fn close(&mut self) {
        for value in self.entries.values_mut() {
            match value {
                Value::Stream(s) => s.close(),
                Value::StreamArray(streams) => streams.iter().for_each(ByteStream::close),
                Value::Record(r) => r.close(),
                Value::RecordArray(slots) => slots.iter_mut().flatten().for_each(|r| r.close()),
                _ => {}
            }
        }
    }
}

impl fmt::Display for AttributeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}
