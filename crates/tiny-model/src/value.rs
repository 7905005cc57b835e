//! Tagged field values and primitive conversion.
//!
//! [`Value`] is the payload of every field slot, list element and dynamic
//! extension. Primitive targets are reached through [`Value::convert_to`],
//! which never fails: an unconvertible or out-of-range source yields the
//! target's zero value.

use serde::{Deserialize, Serialize};

use crate::list::TinyList;
use crate::object::TinyObject;
use crate::reference::{EntityRef, EnumRef};
use crate::schema::TypeCode;

// ---------------------------------------------------------------------------
// Asset handles
// ---------------------------------------------------------------------------

/// Kind of external resource an [`AssetHandle`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Texture2D,
    Sprite,
    Tile,
    Tilemap,
    AudioClip,
    AnimationClip,
    Font,
    Other,
}

/// Opaque handle to an asset owned by the host's asset database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetHandle {
    pub guid: String,
    pub kind: AssetKind,
}

impl AssetHandle {
    pub fn new(guid: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            guid: guid.into(),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single field value.
///
/// `Object` and `List` own their child containers; assigning one into a
/// container deep-copies it under the receiving container.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
    Object(TinyObject),
    List(TinyList),
    Enum(EnumRef),
    Entity(EntityRef),
    Asset(AssetHandle),
}

/// Intermediate form used by [`Value::convert_to`].
enum Scalar<'a> {
    Int(i128),
    Float(f64),
    Bool(bool),
    Text(&'a str),
    Opaque,
}

impl Value {
    /// The type code this value would have as a dynamic extension.
    pub fn type_code(&self) -> TypeCode {
        match self {
            Value::Null => TypeCode::Unknown,
            Value::Int8(_) => TypeCode::Int8,
            Value::Int16(_) => TypeCode::Int16,
            Value::Int32(_) => TypeCode::Int32,
            Value::Int64(_) => TypeCode::Int64,
            Value::UInt8(_) => TypeCode::UInt8,
            Value::UInt16(_) => TypeCode::UInt16,
            Value::UInt32(_) => TypeCode::UInt32,
            Value::UInt64(_) => TypeCode::UInt64,
            Value::Float32(_) => TypeCode::Float32,
            Value::Float64(_) => TypeCode::Float64,
            Value::Bool(_) => TypeCode::Boolean,
            Value::String(_) => TypeCode::String,
            Value::Object(_) => TypeCode::Struct,
            Value::List(_) => TypeCode::Unknown,
            Value::Enum(_) => TypeCode::Enum,
            Value::Entity(_) => TypeCode::EntityReference,
            Value::Asset(_) => TypeCode::Asset,
        }
    }

    /// Short variant name, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::Bool(_) => "Bool",
            Value::String(_) => "String",
            Value::Object(_) => "Object",
            Value::List(_) => "List",
            Value::Enum(_) => "Enum",
            Value::Entity(_) => "Entity",
            Value::Asset(_) => "Asset",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric, boolean, string or null: anything [`Value::convert_to`]
    /// understands as a source.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Int8(_)
                | Value::Int16(_)
                | Value::Int32(_)
                | Value::Int64(_)
                | Value::UInt8(_)
                | Value::UInt16(_)
                | Value::UInt32(_)
                | Value::UInt64(_)
                | Value::Float32(_)
                | Value::Float64(_)
                | Value::Bool(_)
                | Value::String(_)
        )
    }

    pub fn as_object(&self) -> Option<&TinyObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut TinyObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&TinyList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut TinyList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer variant that fits in `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self.scalar() {
            Scalar::Int(i) => i64::try_from(i).ok(),
            _ => None,
        }
    }

    /// Numeric payload widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self.scalar() {
            Scalar::Int(i) => Some(i as f64),
            Scalar::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Zero value of a primitive type code. `Null` for everything else.
    pub fn zero(code: TypeCode) -> Value {
        match code {
            TypeCode::Int8 => Value::Int8(0),
            TypeCode::Int16 => Value::Int16(0),
            TypeCode::Int32 => Value::Int32(0),
            TypeCode::Int64 => Value::Int64(0),
            TypeCode::UInt8 => Value::UInt8(0),
            TypeCode::UInt16 => Value::UInt16(0),
            TypeCode::UInt32 => Value::UInt32(0),
            TypeCode::UInt64 => Value::UInt64(0),
            TypeCode::Float32 => Value::Float32(0.0),
            TypeCode::Float64 => Value::Float64(0.0),
            TypeCode::Boolean => Value::Bool(false),
            TypeCode::String => Value::String(String::new()),
            _ => Value::Null,
        }
    }

    /// Convert a scalar into the primitive type `code`.
    ///
    /// Integer targets are range checked (out of range yields zero); floats
    /// round half to even before narrowing; strings are parsed; booleans map
    /// to `0`/`1`. Non-scalar sources yield the zero value, and `Null`
    /// converted to `String` yields the empty string. Non-primitive targets
    /// return the value unchanged.
    pub fn convert_to(&self, code: TypeCode) -> Value {
        let scalar = self.scalar();
        match code {
            TypeCode::Int8 => int_in_range(&scalar, i8::MIN as i128, i8::MAX as i128)
                .map_or(Value::Int8(0), |v| Value::Int8(v as i8)),
            TypeCode::Int16 => int_in_range(&scalar, i16::MIN as i128, i16::MAX as i128)
                .map_or(Value::Int16(0), |v| Value::Int16(v as i16)),
            TypeCode::Int32 => int_in_range(&scalar, i32::MIN as i128, i32::MAX as i128)
                .map_or(Value::Int32(0), |v| Value::Int32(v as i32)),
            TypeCode::Int64 => int_in_range(&scalar, i64::MIN as i128, i64::MAX as i128)
                .map_or(Value::Int64(0), |v| Value::Int64(v as i64)),
            TypeCode::UInt8 => int_in_range(&scalar, 0, u8::MAX as i128)
                .map_or(Value::UInt8(0), |v| Value::UInt8(v as u8)),
            TypeCode::UInt16 => int_in_range(&scalar, 0, u16::MAX as i128)
                .map_or(Value::UInt16(0), |v| Value::UInt16(v as u16)),
            TypeCode::UInt32 => int_in_range(&scalar, 0, u32::MAX as i128)
                .map_or(Value::UInt32(0), |v| Value::UInt32(v as u32)),
            TypeCode::UInt64 => int_in_range(&scalar, 0, u64::MAX as i128)
                .map_or(Value::UInt64(0), |v| Value::UInt64(v as u64)),
            TypeCode::Float32 => Value::Float32(to_float(&scalar) as f32),
            TypeCode::Float64 => Value::Float64(to_float(&scalar)),
            TypeCode::Boolean => Value::Bool(match scalar {
                Scalar::Int(i) => i != 0,
                Scalar::Float(f) => f != 0.0,
                Scalar::Bool(b) => b,
                Scalar::Text(s) => s.trim().eq_ignore_ascii_case("true"),
                Scalar::Opaque => false,
            }),
            TypeCode::String => Value::String(match scalar {
                Scalar::Int(i) => i.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Bool(b) => b.to_string(),
                Scalar::Text(s) => s.to_owned(),
                Scalar::Opaque => String::new(),
            }),
            _ => self.clone(),
        }
    }

    fn scalar(&self) -> Scalar<'_> {
        match self {
            Value::Int8(v) => Scalar::Int(*v as i128),
            Value::Int16(v) => Scalar::Int(*v as i128),
            Value::Int32(v) => Scalar::Int(*v as i128),
            Value::Int64(v) => Scalar::Int(*v as i128),
            Value::UInt8(v) => Scalar::Int(*v as i128),
            Value::UInt16(v) => Scalar::Int(*v as i128),
            Value::UInt32(v) => Scalar::Int(*v as i128),
            Value::UInt64(v) => Scalar::Int(*v as i128),
            Value::Float32(v) => Scalar::Float(*v as f64),
            Value::Float64(v) => Scalar::Float(*v),
            Value::Bool(v) => Scalar::Bool(*v),
            Value::String(s) => Scalar::Text(s),
            _ => Scalar::Opaque,
        }
    }
}

/// Round half to even.
fn round_even(f: f64) -> f64 {
    let rounded = f.round();
    if (f - f.trunc()).abs() == 0.5 {
        2.0 * (f / 2.0).round()
    } else {
        rounded
    }
}

fn int_in_range(scalar: &Scalar<'_>, min: i128, max: i128) -> Option<i128> {
    let value = match *scalar {
        Scalar::Int(i) => i,
        Scalar::Float(f) => {
            if !f.is_finite() {
                return None;
            }
            let r = round_even(f);
            if r < min as f64 || r > max as f64 {
                return None;
            }
            r as i128
        }
        Scalar::Bool(b) => b as i128,
        Scalar::Text(s) => s.trim().parse::<i128>().ok()?,
        Scalar::Opaque => return None,
    };
    (min..=max).contains(&value).then_some(value)
}

fn to_float(scalar: &Scalar<'_>) -> f64 {
    match *scalar {
        Scalar::Int(i) => i as f64,
        Scalar::Float(f) => f,
        Scalar::Bool(b) => {
            if b {
                1.0
            } else {
                0.0
            }
        }
        Scalar::Text(s) => s.trim().parse().unwrap_or(0.0),
        Scalar::Opaque => 0.0,
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

impl_from! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    String => String,
    TinyObject => Object,
    TinyList => List,
    EnumRef => Enum,
    EntityRef => Entity,
    AssetHandle => Asset,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_and_narrowing() {
        assert_eq!(Value::Int8(-3).convert_to(TypeCode::Int64), Value::Int64(-3));
        assert_eq!(Value::Int32(300).convert_to(TypeCode::UInt8), Value::UInt8(0));
        assert_eq!(Value::Int32(-1).convert_to(TypeCode::UInt32), Value::UInt32(0));
        assert_eq!(Value::UInt64(u64::MAX).convert_to(TypeCode::Int64), Value::Int64(0));
    }

    #[test]
    fn floats_round_half_to_even() {
        assert_eq!(Value::Float64(2.5).convert_to(TypeCode::Int32), Value::Int32(2));
        assert_eq!(Value::Float64(3.5).convert_to(TypeCode::Int32), Value::Int32(4));
        assert_eq!(Value::Float32(-1.6).convert_to(TypeCode::Int16), Value::Int16(-2));
        assert_eq!(Value::Float64(f64::NAN).convert_to(TypeCode::Int32), Value::Int32(0));
        assert_eq!(Value::Float64(1e20).convert_to(TypeCode::Int32), Value::Int32(0));
    }

    #[test]
    fn strings_and_bools() {
        assert_eq!(Value::from("42").convert_to(TypeCode::Int32), Value::Int32(42));
        assert_eq!(Value::from("4.2").convert_to(TypeCode::Int32), Value::Int32(0));
        assert_eq!(Value::from("4.25").convert_to(TypeCode::Float64), Value::Float64(4.25));
        assert_eq!(Value::from("TRUE").convert_to(TypeCode::Boolean), Value::Bool(true));
        assert_eq!(Value::Bool(true).convert_to(TypeCode::UInt8), Value::UInt8(1));
        assert_eq!(Value::Int32(0).convert_to(TypeCode::Boolean), Value::Bool(false));
        assert_eq!(Value::Int32(7).convert_to(TypeCode::String), Value::from("7"));
    }

    #[test]
    fn null_and_opaque_yield_zero() {
        assert_eq!(Value::Null.convert_to(TypeCode::Float32), Value::Float32(0.0));
        assert_eq!(Value::Null.convert_to(TypeCode::String), Value::from(""));
        let obj = Value::Object(TinyObject::default());
        assert_eq!(obj.convert_to(TypeCode::Int32), Value::Int32(0));
    }

    #[test]
    fn non_primitive_target_is_identity() {
        let v = Value::Int32(9);
        assert_eq!(v.convert_to(TypeCode::Struct), v);
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::UInt16(12).as_i64(), Some(12));
        assert_eq!(Value::Null.as_i64(), None);
        assert_eq!(Value::Int32(2).as_f64(), Some(2.0));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::default().is_null());
    }
}
