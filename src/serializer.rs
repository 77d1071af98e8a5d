/// Pluggable codecs for replicating values between blackboards.
///
/// A [`Serializer`] turns a [`Value`] into an opaque byte payload and back.
/// Serializers write through [`WBytes`], which lets them size the output
/// buffer exactly before encoding into it, and read through [`RBytes`].
///
/// Three codecs ship with the crate:
///
/// - [`BincodeSerializer`]: compact binary encoding of any value kind
/// - [`JsonSerializer`]: human-readable encoding of any value kind
/// - [`TypedSerializer`]: binary encoding of a single kind, without the tag
use crate::error::{BlackboardError, BlackboardResult};
use crate::value::{Value, Variant};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Read access to a serialized payload.
pub trait RBytes {
    fn as_slice(&self) -> &[u8];

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write access to a payload buffer.
///
/// Callers resize to the final encoded length, then write into the slice.
pub trait WBytes {
    fn as_mut_slice(&mut self) -> &mut [u8];

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize the buffer, returning false if the size cannot be honoured.
    fn resize(&mut self, size: usize) -> bool;
}

impl RBytes for Vec<u8> {
    fn as_slice(&self) -> &[u8] {
        self
    }
}

impl WBytes for Vec<u8> {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        self
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn resize(&mut self, size: usize) -> bool {
        Vec::resize(self, size, 0);
        true
    }
}

/// Codec for one key's values.
pub trait Serializer: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Encode `value` into `out`, replacing its contents.
    fn serialize(&self, value: &Value, out: &mut dyn WBytes) -> BlackboardResult<()>;

    /// Decode a value from `bytes`.
    fn deserialize(&self, bytes: &dyn RBytes) -> BlackboardResult<Value>;
}

fn write_exact(out: &mut dyn WBytes, encoded: &[u8]) -> BlackboardResult<()> {
    if !out.resize(encoded.len()) {
        return Err(BlackboardError::Serialization(format!(
            "Output buffer cannot hold {} bytes",
            encoded.len()
        )));
    }
    out.as_mut_slice().copy_from_slice(encoded);
    Ok(())
}

/// Bincode encoding of the full tagged value.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn name(&self) -> &str {
        "bincode"
    }

    fn serialize(&self, value: &Value, out: &mut dyn WBytes) -> BlackboardResult<()> {
        let size = bincode::serialized_size(value)? as usize;
        if !out.resize(size) {
            return Err(BlackboardError::Serialization(format!(
                "Output buffer cannot hold {} bytes",
                size
            )));
        }
        bincode::serialize_into(out.as_mut_slice(), value)?;
        Ok(())
    }

    fn deserialize(&self, bytes: &dyn RBytes) -> BlackboardResult<Value> {
        Ok(bincode::deserialize(bytes.as_slice())?)
    }
}

/// JSON encoding of the full tagged value.
///
/// Non-finite floats are written as the strings `"inf"`, `"-inf"` and `"NaN"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn serialize(&self, value: &Value, out: &mut dyn WBytes) -> BlackboardResult<()> {
        let encoded = serde_json::to_vec(value)?;
        write_exact(out, &encoded)
    }

    fn deserialize(&self, bytes: &dyn RBytes) -> BlackboardResult<Value> {
        Ok(serde_json::from_slice(bytes.as_slice())?)
    }
}

/// Bincode encoding of a single kind `T`, without the value tag.
///
/// Serializing a value of another kind fails with `TypeMismatch`.
pub struct TypedSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer for TypedSerializer<T>
where
    T: Variant + Serialize + DeserializeOwned,
{
    fn name(&self) -> &str {
        "typed"
    }

    fn serialize(&self, value: &Value, out: &mut dyn WBytes) -> BlackboardResult<()> {
        let inner = value.get::<T>()?;
        let encoded = bincode::serialize(inner)?;
        write_exact(out, &encoded)
    }

    fn deserialize(&self, bytes: &dyn RBytes) -> BlackboardResult<Value> {
        let inner: T = bincode::deserialize(bytes.as_slice())?;
        Ok(inner.into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Pose;
    use serde_json::json;

    fn all_kinds() -> Vec<Value> {
        vec![
            Value::from(true),
            Value::from(-17i64),
            Value::from(2.75),
            Value::from("hello"),
            Value::from(vec![0u8, 1, 254, 255]),
            Value::from(Pose::planar(1.5, -3.0, 0.25)),
            Value::from(json!({"battery": 0.8, "tags": ["a", "b"]})),
        ]
    }

    fn roundtrip(serializer: &dyn Serializer, value: &Value) -> Value {
        let mut buffer = Vec::new();
        serializer.serialize(value, &mut buffer).unwrap();
        serializer.deserialize(&buffer).unwrap()
    }

    #[test]
    fn test_bincode_every_kind() {
        for value in all_kinds() {
            assert_eq!(roundtrip(&BincodeSerializer, &value), value);
        }
    }

    #[test]
    fn test_json_every_kind() {
        for value in all_kinds() {
            assert_eq!(roundtrip(&JsonSerializer, &value), value);
        }
    }

    #[test]
    fn test_typed_serializer() {
        let serializer = TypedSerializer::<Pose>::new();
        let value = Value::from(Pose::planar(4.0, 5.0, 6.0));
        assert_eq!(roundtrip(&serializer, &value), value);

        let mut buffer = Vec::new();
        let result = serializer.serialize(&Value::from(1i64), &mut buffer);
        assert!(matches!(result, Err(BlackboardError::TypeMismatch { .. })));
    }

    #[test]
    fn test_output_is_sized_exactly() {
        let value = Value::from("exact");
        let mut buffer = vec![0xAA; 512];
        BincodeSerializer.serialize(&value, &mut buffer).unwrap();
        assert_eq!(
            buffer.len(),
            bincode::serialized_size(&value).unwrap() as usize
        );
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let garbage = vec![0xFFu8, 0xFF, 0xFF];
        assert!(BincodeSerializer.deserialize(&garbage).is_err());
        assert!(JsonSerializer.deserialize(&garbage).is_err());
    }
}
