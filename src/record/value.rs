//! Typed values stored in an [`AttributeRecord`]

use std::any::Any;
use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AttributeRecord;

// ============================================================================
// Type Discriminator
// ============================================================================

/// Runtime type tag of a record value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Key is not present
    Undefined,
    Record,
    Date,
    Int,
    Long,
    String,
    Stream,
    Object,
    RecordArray,
    DateArray,
    IntArray,
    LongArray,
    StringArray,
    StreamArray,
    ObjectArray,
}

impl ValueType {
    /// Whether this tag names an array type
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Self::RecordArray
                | Self::DateArray
                | Self::IntArray
                | Self::LongArray
                | Self::StringArray
                | Self::StreamArray
                | Self::ObjectArray
        )
    }

    /// Element type of an array tag, or the tag itself for scalars
    pub fn element(&self) -> ValueType {
        match self {
            Self::RecordArray => Self::Record,
            Self::DateArray => Self::Date,
            Self::IntArray => Self::Int,
            Self::LongArray => Self::Long,
            Self::StringArray => Self::String,
            Self::StreamArray => Self::Stream,
            Self::ObjectArray => Self::Object,
            other => *other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Record => "record",
            Self::Date => "date",
            Self::Int => "int",
            Self::Long => "long",
            Self::String => "string",
            Self::Stream => "stream",
            Self::Object => "object",
            Self::RecordArray => "record[]",
            Self::DateArray => "date[]",
            Self::IntArray => "int[]",
            Self::LongArray => "long[]",
            Self::StringArray => "string[]",
            Self::StreamArray => "stream[]",
            Self::ObjectArray => "object[]",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Byte Streams and Opaque Objects
// ============================================================================

/// Shared, closable byte stream held by a record
///
/// Clones share the same underlying reader; closing any clone closes all.
#[derive(Clone)]
pub struct ByteStream {
    inner: Arc<Mutex<Option<Box<dyn Read + Send>>>>,
}

impl ByteStream {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(reader)))),
        }
    }

    /// Read from the stream; a closed stream reads as EOF
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }

    /// Drain the remaining bytes
    pub fn read_to_end(&self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(reader) => reader.read_to_end(buf),
            None => Ok(0),
        }
    }

    /// Release the underlying reader. Safe to call repeatedly.
    pub fn close(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Whether two handles refer to the same stream
    pub fn same_stream(&self, other: &ByteStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opaque shared object reference
#[derive(Clone)]
pub struct OpaqueObject(Arc<dyn Any + Send + Sync>);

impl OpaqueObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for OpaqueObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OpaqueObject(..)")
    }
}

// ============================================================================
// Value
// ============================================================================

/// A single typed value
///
/// Streams and opaque objects are process-local and are never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Value {
    Record(AttributeRecord),
    Date(DateTime<Utc>),
    Int(i32),
    Long(i64),
    String(String),
    #[serde(skip)]
    Stream(ByteStream),
    #[serde(skip)]
    Object(OpaqueObject),
    RecordArray(Vec<Option<AttributeRecord>>),
    DateArray(Vec<DateTime<Utc>>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    StringArray(Vec<String>),
    #[serde(skip)]
    StreamArray(Vec<ByteStream>),
    #[serde(skip)]
    ObjectArray(Vec<OpaqueObject>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Record(_) => ValueType::Record,
            Self::Date(_) => ValueType::Date,
            Self::Int(_) => ValueType::Int,
            Self::Long(_) => ValueType::Long,
            Self::String(_) => ValueType::String,
            Self::Stream(_) => ValueType::Stream,
            Self::Object(_) => ValueType::Object,
            Self::RecordArray(_) => ValueType::RecordArray,
            Self::DateArray(_) => ValueType::DateArray,
            Self::IntArray(_) => ValueType::IntArray,
            Self::LongArray(_) => ValueType::LongArray,
            Self::StringArray(_) => ValueType::StringArray,
            Self::StreamArray(_) => ValueType::StreamArray,
            Self::ObjectArray(_) => ValueType::ObjectArray,
        }
    }

    /// Whether the value can be written to durable storage
    pub fn is_persistable(&self) -> bool {
        match self {
            Self::Stream(_) | Self::Object(_) | Self::StreamArray(_) | Self::ObjectArray(_) => {
                false
            }
            Self::Record(r) => r.is_persistable(),
            Self::RecordArray(slots) => slots.iter().flatten().all(|r| r.is_persistable()),
            _ => true,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Stream(a), Self::Stream(b)) => a.same_stream(b),
            (Self::RecordArray(a), Self::RecordArray(b)) => a == b,
            (Self::DateArray(a), Self::DateArray(b)) => a == b,
            (Self::IntArray(a), Self::IntArray(b)) => a == b,
            (Self::LongArray(a), Self::LongArray(b)) => a == b,
            (Self::StringArray(a), Self::StringArray(b)) => a == b,
            (Self::StreamArray(a), Self::StreamArray(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_stream(y))
            }
            // opaque objects have no equality
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(r) => write!(f, "{r}"),
            Self::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Stream(_) => f.write_str("<stream>"),
            Self::Object(_) => f.write_str("<object>"),
            Self::RecordArray(slots) => {
                f.write_str("[")?;
                for (i, slot) in slots.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match slot {
                        Some(r) => write!(f, "{r}")?,
                        None => f.write_str("null")?,
                    }
                }
                f.write_str("]")
            }
            Self::DateArray(v) => write_list(f, v.iter().map(|d| d.to_rfc3339())),
            Self::IntArray(v) => write_list(f, v.iter()),
            Self::LongArray(v) => write_list(f, v.iter()),
            Self::StringArray(v) => write_list(f, v.iter().map(|s| format!("{s:?}"))),
            Self::StreamArray(v) => write_list(f, v.iter().map(|_| "<stream>")),
            Self::ObjectArray(v) => write_list(f, v.iter().map(|_| "<object>")),
        }
    }
}

fn write_list<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value! {
    AttributeRecord => Record,
    DateTime<Utc> => Date,
    i32 => Int,
    i64 => Long,
    String => String,
    ByteStream => Stream,
    OpaqueObject => Object,
    Vec<Option<AttributeRecord>> => RecordArray,
    Vec<DateTime<Utc>> => DateArray,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
    Vec<String> => StringArray,
    Vec<ByteStream> => StreamArray,
    Vec<OpaqueObject> => ObjectArray,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

// ============================================================================
// Typed Extraction
// ============================================================================

/// Borrowing conversion from a [`Value`] used by the checked accessors
pub trait FromValue<'a>: Sized {
    /// Type tag this conversion accepts
    const TYPE: ValueType;

    fn from_value(value: &'a Value) -> Option<Self>;
}

macro_rules! impl_from_value_copy {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> FromValue<'a> for $ty {
                const TYPE: ValueType = ValueType::$variant;

                fn from_value(value: &'a Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

macro_rules! impl_from_value_ref {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> FromValue<'a> for &'a $ty {
                const TYPE: ValueType = ValueType::$variant;

                fn from_value(value: &'a Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_value_copy! {
    i32 => Int,
    i64 => Long,
    DateTime<Utc> => Date,
}

macro_rules! impl_from_value_slice {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> FromValue<'a> for &'a [$ty] {
                const TYPE: ValueType = ValueType::$variant;

                fn from_value(value: &'a Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.as_slice()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_value_ref! {
    AttributeRecord => Record,
    ByteStream => Stream,
    OpaqueObject => Object,
}

impl_from_value_slice! {
    Option<AttributeRecord> => RecordArray,
    DateTime<Utc> => DateArray,
    i32 => IntArray,
    i64 => LongArray,
    String => StringArray,
    ByteStream => StreamArray,
    OpaqueObject => ObjectArray,
}

impl<'a> FromValue<'a> for &'a str {
    const TYPE: ValueType = ValueType::String;

    fn from_value(value: &'a Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}
