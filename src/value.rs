// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::serde::{Deserializable, DeserializeError, Serializable, SerializeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// User defined key
pub type UserKey = i64;

/// User defined value
pub type UserValue = i64;

/// Reserved value that marks a key as deleted
///
/// Deleting a key writes this value under the key. The tombstone shadows
/// older versions of the key until a compaction reaches the last level,
/// where it is physically dropped.
pub const TOMBSTONE: UserValue = UserValue::MIN;

/// Represents a single entry of a run
///
/// # Disk representation
///
/// \[key; 8 bytes] \[value; 8 bytes]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Value {
    /// User-defined key
    pub key: UserKey,

    /// User-defined value, or [`TOMBSTONE`]
    pub value: UserValue,
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_tombstone() {
            write!(f, "{}:T", self.key)
        } else {
            write!(f, "{}:{}", self.key, self.value)
        }
    }
}

impl From<(UserKey, UserValue)> for Value {
    fn from((key, value): (UserKey, UserValue)) -> Self {
        Self::new(key, value)
    }
}

impl From<Value> for (UserKey, UserValue) {
    fn from(val: Value) -> Self {
        (val.key, val.value)
    }
}

impl Value {
    /// Size of a serialized entry in bytes
    pub const ENCODED_SIZE: usize = std::mem::size_of::<UserKey>() + std::mem::size_of::<UserValue>();

    /// Creates a new [`Value`].
    #[must_use]
    pub fn new(key: UserKey, value: UserValue) -> Self {
        Self { key, value }
    }

    /// Creates a tombstone for the given key.
    #[must_use]
    pub fn new_tombstone(key: UserKey) -> Self {
        Self::new(key, TOMBSTONE)
    }

    /// Returns `true` if the entry marks a deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value == TOMBSTONE
    }

    /// Decodes a single record slice.
    pub(crate) fn from_record(mut record: &[u8]) -> Result<Self, DeserializeError> {
        if record.len() != Self::ENCODED_SIZE {
            return Err(DeserializeError::InvalidRecordLength(record.len()));
        }
        Self::deserialize(&mut record)
    }
}

impl Serializable for Value {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), SerializeError> {
        writer.write_i64::<BigEndian>(self.key)?;
        writer.write_i64::<BigEndian>(self.value)?;
        Ok(())
    }
}

impl Deserializable for Value {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DeserializeError> {
        let key = reader.read_i64::<BigEndian>()?;
        let value = reader.read_i64::<BigEndian>()?;
        Ok(Self::new(key, value))
    }
}
