//! Pluggable body codec.
//!
//! # Design
//! The engine never depends on a serialization format. A `Codec` moves
//! type-erased values to and from bytes, and every type must be registered
//! with the codec before it can cross the wire. Using an unregistered type
//! is a named error rather than a silent fallback.
//!
//! `JsonCodec` is the serde_json-backed implementation. Registration
//! monomorphizes a pair of erased functions per type and keys them by
//! `TypeId`.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::http::APPLICATION_JSON;

/// Errors raised while encoding or decoding a typed body.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The type was never registered with the codec.
    #[error("must register type `{type_name}` with the codec first")]
    Unregistered { type_name: &'static str },

    /// The input was absent or empty.
    #[error("invalid input")]
    InvalidInput,

    /// The erased value was not of the type the codec expected.
    #[error("value is not a `{type_name}`")]
    TypeMismatch { type_name: &'static str },

    #[error("serialization failed: {0}")]
    Serialize(String),

    #[error("deserialization failed: {0}")]
    Deserialize(String),
}

/// Identity of a type crossing the codec boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeKey {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Serialize and deserialize registered types to and from bytes.
pub trait Codec: Send + Sync {
    /// Value of the `Content-Type` header for encoded bodies.
    fn content_type(&self) -> &str;

    fn serialize(&self, key: TypeKey, value: &dyn Any) -> Result<Vec<u8>, CodecError>;

    fn deserialize(&self, key: TypeKey, input: &[u8]) -> Result<Box<dyn Any + Send>, CodecError>;
}

impl dyn Codec {
    pub fn encode<T: Any>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        self.serialize(TypeKey::of::<T>(), value)
    }

    pub fn decode<T: Any>(&self, input: &[u8]) -> Result<T, CodecError> {
        let key = TypeKey::of::<T>();
        self.deserialize(key, input)?
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| CodecError::TypeMismatch {
                type_name: key.name,
            })
    }
}

type SerializeFn = fn(&dyn Any) -> Result<Vec<u8>, CodecError>;
type DeserializeFn = fn(&[u8]) -> Result<Box<dyn Any + Send>, CodecError>;

struct Entry {
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

/// JSON codec over serde_json with explicit per-type registration.
#[derive(Default)]
pub struct JsonCodec {
    entries: HashMap<TypeId, Entry>,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self) -> &mut Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.entries.insert(
            TypeId::of::<T>(),
            Entry {
                serialize: serialize_erased::<T>,
                deserialize: deserialize_erased::<T>,
            },
        );
        self
    }

    /// Builder-style `register`.
    pub fn with<T>(mut self) -> Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.register::<T>();
        self
    }

    pub fn is_registered<T: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    fn entry(&self, key: TypeKey) -> Result<&Entry, CodecError> {
        self.entries.get(&key.id).ok_or(CodecError::Unregistered {
            type_name: key.name,
        })
    }
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        APPLICATION_JSON
    }

    fn serialize(&self, key: TypeKey, value: &dyn Any) -> Result<Vec<u8>, CodecError> {
        (self.entry(key)?.serialize)(value)
    }

    fn deserialize(&self, key: TypeKey, input: &[u8]) -> Result<Box<dyn Any + Send>, CodecError> {
        let entry = self.entry(key)?;
        if input.is_empty() {
            return Err(CodecError::InvalidInput);
        }
        (entry.deserialize)(input)
    }
}

fn serialize_erased<T: Serialize + 'static>(value: &dyn Any) -> Result<Vec<u8>, CodecError> {
    let value = value
        .downcast_ref::<T>()
        .ok_or(CodecError::TypeMismatch {
            type_name: type_name::<T>(),
        })?;
    serde_json::to_vec(value).map_err(|e| CodecError::Serialize(e.to_string()))
}

fn deserialize_erased<T: DeserializeOwned + Send + 'static>(
    input: &[u8],
) -> Result<Box<dyn Any + Send>, CodecError> {
    let value: T =
        serde_json::from_slice(input).map_err(|e| CodecError::Deserialize(e.to_string()))?;
    Ok(Box::new(value))
}
