//! Type-tagged serialization registry.
//!
//! Every value crossing the wire is encoded as `[tag: 1 byte]` followed by
//! the type's own encoding. The registry maps a Rust type to its serializer
//! and a tag byte back to the type, and the two mappings are bijective:
//! no two types share a tag, no type owns two tags, and decoding an unknown
//! tag is an error, never a fallback.
//!
//! The lifecycle is strictly two-phase: all registrations happen through
//! [`RegistryBuilder`] at process start, then [`RegistryBuilder::build`]
//! freezes the table into a [`SerializerRegistry`] that is shared and read
//! without synchronization for the rest of the process lifetime.
//!
//! # Example
//!
//! ```
//! use wirerpc_common::serialize::SerializerRegistry;
//!
//! let registry = SerializerRegistry::builtin();
//! let bytes = registry.serialize(&"hi".to_string()).unwrap();
//! let back: String = registry.deserialize(&bytes).unwrap();
//! assert_eq!(back, "hi");
//! ```

pub mod args;
pub mod builtin;


use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::protocol::error::{Result, RpcError};

pub use args::{decode_args, encode_args};

/// Encoder/decoder for one value type.
///
/// `tag` is the byte prefixed to every encoded value of `T`; `size_hint`
/// lets the registry size the output buffer in one allocation.
pub trait Serializer<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    fn tag(&self) -> u8;

    fn size_hint(&self, value: &T) -> usize;

    fn encode(&self, value: &T, buf: &mut BytesMut) -> Result<()>;

    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// Type-erased registry entry. The typed serializer lives behind closures
/// keyed by `TypeId` on the encode side and by tag byte on the decode side.
struct Entry {
    tag: u8,
    type_name: &'static str,
    size_hint: Box<dyn Fn(&dyn Any) -> usize + Send + Sync>,
    encode: Box<dyn Fn(&dyn Any, &mut BytesMut) -> Result<()> + Send + Sync>,
    decode: Box<dyn Fn(&[u8]) -> Result<Box<dyn Any + Send>> + Send + Sync>,
}

/// Write-phase half of the registry lifecycle.
///
/// Registrations are rejected, not overwritten: a duplicate tag or a
/// duplicate type fails with [`RpcError::Registration`].
#[derive(Default)]
pub struct RegistryBuilder {
    by_type: HashMap<TypeId, Arc<Entry>>,
    by_tag: HashMap<u8, Arc<Entry>>,
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder").finish_non_exhaustive()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-loaded with the builtin serializers (see [`builtin`]).
    pub fn with_builtins() -> Result<Self> {
        Self::new()
            .register(builtin::StringSerializer)?
            .register(builtin::U64Serializer)?
            .register(builtin::UnitSerializer)?
            .register(builtin::BytesSerializer)?
            .register(builtin::RpcRequestSerializer)
    }

    /// Registers a serializer for `T`.
    ///
    /// # Errors
    ///
    /// Fails with [`RpcError::Registration`] if the serializer's tag or the
    /// type `T` is already registered.
    pub fn register<T, S>(mut self, serializer: S) -> Result<Self>
    where
        T: Send + 'static,
        S: Serializer<T>,
    {
        let tag = serializer.tag();
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();

        if let Some(existing) = self.by_tag.get(&tag) {
            return Err(RpcError::Registration(format!(
                "tag {tag} already registered for {}",
                existing.type_name
            )));
        }
        if let Some(existing) = self.by_type.get(&type_id) {
            return Err(RpcError::Registration(format!(
                "type {type_name} already registered under tag {}",
                existing.tag
            )));
        }

        let serializer = Arc::new(serializer);
        let entry = Arc::new(Entry {
            tag,
            type_name,
            size_hint: {
                let serializer = serializer.clone();
                Box::new(move |value| match value.downcast_ref::<T>() {
                    Some(value) => serializer.size_hint(value),
                    None => 0,
                })
            },
            encode: {
                let serializer = serializer.clone();
                Box::new(move |value, buf| {
                    let value = value.downcast_ref::<T>().ok_or_else(|| {
                        RpcError::Serialization(format!("value is not a {type_name}"))
                    })?;
                    serializer.encode(value, buf)
                })
            },
            decode: Box::new(move |bytes| {
                let value = serializer.decode(bytes)?;
                Ok(Box::new(value) as Box<dyn Any + Send>)
            }),
        });

        self.by_type.insert(type_id, entry.clone());
        self.by_tag.insert(tag, entry);
        Ok(self)
    }

    /// Freezes the registration table. No entries can be added afterward.
    pub fn build(self) -> SerializerRegistry {
        SerializerRegistry {
            by_type: self.by_type,
            by_tag: self.by_tag,
        }
    }
}

/// Read-phase half of the registry lifecycle: immutable, safe for
/// unsynchronized concurrent reads.
pub struct SerializerRegistry {
    by_type: HashMap<TypeId, Arc<Entry>>,
    by_tag: HashMap<u8, Arc<Entry>>,
}

impl SerializerRegistry {
    /// A frozen registry holding only the builtin serializers.
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            RegistryBuilder::with_builtins()
                .expect("builtin tags are distinct")
                .build(),
        )
    }

    /// Encodes `value` as `[tag][type-specific encoding]`.
    ///
    /// # Errors
    ///
    /// Fails with [`RpcError::Serialization`] if `T` was never registered.
    pub fn serialize<T: Any + Send>(&self, value: &T) -> Result<Vec<u8>> {
        let entry = self.by_type.get(&TypeId::of::<T>()).ok_or_else(|| {
            RpcError::Serialization(format!(
                "no serializer registered for type {}",
                std::any::type_name::<T>()
            ))
        })?;

        let value: &dyn Any = value;
        let mut buf = BytesMut::with_capacity(1 + (entry.size_hint)(value));
        buf.put_u8(entry.tag);
        (entry.encode)(value, &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Reads the leading tag byte, looks up the registered decoder, and
    /// decodes the remainder as a `T`.
    ///
    /// # Errors
    ///
    /// Fails with [`RpcError::Serialization`] if the buffer is empty, the
    /// tag matches no registration, or the tag's type is not `T`.
    pub fn deserialize<T: Any + Send>(&self, bytes: &[u8]) -> Result<T> {
        let (&tag, rest) = bytes.split_first().ok_or_else(|| {
            RpcError::Serialization("empty buffer: missing type tag".to_string())
        })?;

        let entry = self
            .by_tag
            .get(&tag)
            .ok_or_else(|| RpcError::Serialization(format!("unknown type tag: {tag}")))?;

        let value = (entry.decode)(rest)?;
        value.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
            RpcError::Serialization(format!(
                "type mismatch: tag {tag} decodes to {}, expected {}",
                entry.type_name,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Tag registered for `T`, if any.
    pub fn tag_of<T: Any>(&self) -> Option<u8> {
        self.by_type.get(&TypeId::of::<T>()).map(|entry| entry.tag)
    }
}
