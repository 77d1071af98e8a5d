/// Type-erased values stored on the blackboard.
///
/// A [`Value`] holds exactly one value of one of the supported kinds. The
/// kind is a runtime tag: typed extraction through [`Value::get`] checks it
/// and reports a [`BlackboardError::TypeMismatch`] rather than converting.
use crate::error::{BlackboardError, BlackboardResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Runtime tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Pose,
    Json,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
            ValueKind::Pose => "pose",
            ValueKind::Json => "json",
        };
        f.write_str(name)
    }
}

/// A 6-DoF pose, the most common observation exchanged between robots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    #[serde(with = "lossless_f64")]
    pub x: f64,
    #[serde(with = "lossless_f64")]
    pub y: f64,
    #[serde(with = "lossless_f64")]
    pub z: f64,
    #[serde(with = "lossless_f64")]
    pub roll: f64,
    #[serde(with = "lossless_f64")]
    pub pitch: f64,
    #[serde(with = "lossless_f64")]
    pub yaw: f64,
}

impl Pose {
    /// Planar pose (z, roll and pitch zero).
    pub fn planar(x: f64, y: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            yaw,
            ..Self::default()
        }
    }
}

/// A value of one of the supported kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    #[serde(with = "lossless_f64")]
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Pose(Pose),
    #[serde(with = "json_as_text")]
    Json(JsonValue),
}

/// Carries JSON values as text so non-self-describing formats (bincode)
/// can encode them.
mod json_as_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value as JsonValue;

    pub fn serialize<S>(value: &JsonValue, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<JsonValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(serde::de::Error::custom)
    }
}

/// Floats that survive human-readable formats.
///
/// JSON has no literal for infinities or NaN, so in human-readable formats
/// those are written as the strings `"inf"`, `"-inf"` and `"NaN"`. Binary
/// formats get the plain `f64`.
mod lossless_f64 {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if !serializer.is_human_readable() || value.is_finite() {
            return serializer.serialize_f64(*value);
        }
        let text = if value.is_nan() {
            "NaN"
        } else if value.is_sign_positive() {
            "inf"
        } else {
            "-inf"
        };
        serializer.serialize_str(text)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(FloatVisitor)
        } else {
            deserializer.deserialize_f64(FloatVisitor)
        }
    }

    struct FloatVisitor;

    impl Visitor<'_> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, \"inf\", \"-inf\" or \"NaN\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" => Ok(f64::NAN),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}

impl Value {
    /// The runtime tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Pose(_) => ValueKind::Pose,
            Value::Json(_) => ValueKind::Json,
        }
    }

    /// Borrow the contained value as `T`.
    ///
    /// Fails with `TypeMismatch` if the value holds a different kind.
    pub fn get<T: Variant>(&self) -> BlackboardResult<&T> {
        T::from_value(self).ok_or_else(|| {
            let err = BlackboardError::TypeMismatch {
                expected: T::KIND,
                found: self.kind(),
            };
            tracing::error!("{}", err);
            err
        })
    }

    /// Check whether the value holds a `T`.
    pub fn is<T: Variant>(&self) -> bool {
        self.kind() == T::KIND
    }
}

/// Rust types that can be stored in a [`Value`].
pub trait Variant: Sized + Clone {
    /// The tag this type maps to.
    const KIND: ValueKind;

    /// Borrow `Self` out of a value holding [`Self::KIND`].
    fn from_value(value: &Value) -> Option<&Self>;

    /// Wrap `self` in a value.
    fn into_value(self) -> Value;
}

macro_rules! impl_variant {
    ($ty:ty, $variant:ident) => {
        impl Variant for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn from_value(value: &Value) -> Option<&Self> {
                match value {
                    Value::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }

        impl From<$ty> for Value {
            fn from(inner: $ty) -> Self {
                Value::$variant(inner)
            }
        }
    };
}

impl_variant!(bool, Bool);
impl_variant!(i64, Int);
impl_variant!(f64, Float);
impl_variant!(String, Text);
impl_variant!(Vec<u8>, Bytes);
impl_variant!(Pose, Pose);
impl_variant!(JsonValue, Json);

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}
