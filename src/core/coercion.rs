//! Argument coercion between wire-tagged JSON values and concrete types.
//!
//! A producer tags every argument with a textual type name (`"int64"`,
//! `"uint16"`, `"float64"`, `"bool"`, `"string"`, ...). JSON decoding widens
//! numbers — a Go producer emits every number as a 64-bit float — so the
//! consumer narrows each value back down to its declared tag, rejecting
//! anything that would fall outside the target range.

use super::signature::TaskArg;
use serde_json::Value;

/// The supported argument and return type tags.
///
/// The tag space mirrors the primitive numerics plus `bool` and `string`;
/// anything else on the wire is rejected during coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Bool,
    String,
}

impl ArgKind {
    /// Parses a wire tag into a kind. Returns `None` for unrecognized tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "int8" => Some(ArgKind::Int8),
            "int16" => Some(ArgKind::Int16),
            "int32" => Some(ArgKind::Int32),
            "int64" => Some(ArgKind::Int64),
            "uint8" => Some(ArgKind::Uint8),
            "uint16" => Some(ArgKind::Uint16),
            "uint32" => Some(ArgKind::Uint32),
            "uint64" => Some(ArgKind::Uint64),
            "float32" => Some(ArgKind::Float32),
            "float64" => Some(ArgKind::Float64),
            "bool" => Some(ArgKind::Bool),
            "string" => Some(ArgKind::String),
            _ => None,
        }
    }

    /// Returns the canonical wire tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            ArgKind::Int8 => "int8",
            ArgKind::Int16 => "int16",
            ArgKind::Int32 => "int32",
            ArgKind::Int64 => "int64",
            ArgKind::Uint8 => "uint8",
            ArgKind::Uint16 => "uint16",
            ArgKind::Uint32 => "uint32",
            ArgKind::Uint64 => "uint64",
            ArgKind::Float32 => "float32",
            ArgKind::Float64 => "float64",
            ArgKind::Bool => "bool",
            ArgKind::String => "string",
        }
    }
}

impl std::fmt::Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A concrete argument or return value after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
}

impl ArgValue {
    pub fn kind(&self) -> ArgKind {
        match self {
            ArgValue::Int8(_) => ArgKind::Int8,
            ArgValue::Int16(_) => ArgKind::Int16,
            ArgValue::Int32(_) => ArgKind::Int32,
            ArgValue::Int64(_) => ArgKind::Int64,
            ArgValue::Uint8(_) => ArgKind::Uint8,
            ArgValue::Uint16(_) => ArgKind::Uint16,
            ArgValue::Uint32(_) => ArgKind::Uint32,
            ArgValue::Uint64(_) => ArgKind::Uint64,
            ArgValue::Float32(_) => ArgKind::Float32,
            ArgValue::Float64(_) => ArgKind::Float64,
            ArgValue::Bool(_) => ArgKind::Bool,
            ArgValue::String(_) => ArgKind::String,
        }
    }

    /// Converts the value into its JSON wire representation.
    pub fn into_json(self) -> Value {
        match self {
            ArgValue::Int8(v) => Value::from(v),
            ArgValue::Int16(v) => Value::from(v),
            ArgValue::Int32(v) => Value::from(v),
            ArgValue::Int64(v) => Value::from(v),
            ArgValue::Uint8(v) => Value::from(v),
            ArgValue::Uint16(v) => Value::from(v),
            ArgValue::Uint32(v) => Value::from(v),
            ArgValue::Uint64(v) => Value::from(v),
            ArgValue::Float32(v) => Value::from(v),
            ArgValue::Float64(v) => Value::from(v),
            ArgValue::Bool(v) => Value::from(v),
            ArgValue::String(v) => Value::from(v),
        }
    }
}

macro_rules! impl_from_for_arg_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ArgValue {
                fn from(v: $ty) -> Self {
                    ArgValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_arg_value!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    String => String,
);

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::String(v.to_string())
    }
}

/// Coerces a wire argument to the expected parameter kind.
///
/// The declared tag must name a supported type and must equal the expected
/// kind; the JSON value is then narrowed to that kind. The returned error is
/// a human-readable reason, wrapped into [`CoreError::WrongArgType`] by the
/// dispatch layer, which knows the argument position.
///
/// [`CoreError::WrongArgType`]: super::error::CoreError::WrongArgType
pub fn coerce(arg: &TaskArg, expected: ArgKind) -> Result<ArgValue, String> {
    let declared = ArgKind::from_tag(&arg.type_name)
        .ok_or_else(|| format!("unrecognized type tag {:?}", arg.type_name))?;
    if declared != expected {
        return Err(format!(
            "argument tagged {} where {} is expected",
            declared.tag(),
            expected.tag()
        ));
    }
    narrow(&arg.value, expected)
}

/// Narrows a decoded JSON value to the given kind, checking value range.
fn narrow(value: &Value, kind: ArgKind) -> Result<ArgValue, String> {
    match kind {
        ArgKind::Int8 => narrow_signed(value, i8::MIN as i64, i8::MAX as i64, kind)
            .map(|v| ArgValue::Int8(v as i8)),
        ArgKind::Int16 => narrow_signed(value, i16::MIN as i64, i16::MAX as i64, kind)
            .map(|v| ArgValue::Int16(v as i16)),
        ArgKind::Int32 => narrow_signed(value, i32::MIN as i64, i32::MAX as i64, kind)
            .map(|v| ArgValue::Int32(v as i32)),
        ArgKind::Int64 => {
            narrow_signed(value, i64::MIN, i64::MAX, kind).map(ArgValue::Int64)
        }
        ArgKind::Uint8 => {
            narrow_unsigned(value, u8::MAX as u64, kind).map(|v| ArgValue::Uint8(v as u8))
        }
        ArgKind::Uint16 => {
            narrow_unsigned(value, u16::MAX as u64, kind).map(|v| ArgValue::Uint16(v as u16))
        }
        ArgKind::Uint32 => {
            narrow_unsigned(value, u32::MAX as u64, kind).map(|v| ArgValue::Uint32(v as u32))
        }
        ArgKind::Uint64 => narrow_unsigned(value, u64::MAX, kind).map(ArgValue::Uint64),
        ArgKind::Float32 => {
            let f = value
                .as_f64()
                .ok_or_else(|| expected_number(value, kind))?;
            if f.is_finite() && f.abs() > f32::MAX as f64 {
                return Err(out_of_range(value, kind));
            }
            Ok(ArgValue::Float32(f as f32))
        }
        ArgKind::Float64 => value
            .as_f64()
            .map(ArgValue::Float64)
            .ok_or_else(|| expected_number(value, kind)),
        ArgKind::Bool => value
            .as_bool()
            .map(ArgValue::Bool)
            .ok_or_else(|| format!("expected a boolean, got {}", json_type_name(value))),
        ArgKind::String => value
            .as_str()
            .map(|s| ArgValue::String(s.to_string()))
            .ok_or_else(|| format!("expected a string, got {}", json_type_name(value))),
    }
}

fn narrow_signed(value: &Value, min: i64, max: i64, kind: ArgKind) -> Result<i64, String> {
    if let Some(i) = value.as_i64() {
        if i < min || i > max {
            return Err(out_of_range(value, kind));
        }
        return Ok(i);
    }
    if value.as_u64().is_some() {
        // Only reached for magnitudes past i64::MAX.
        return Err(out_of_range(value, kind));
    }
    if let Some(f) = value.as_f64() {
        if !f.is_finite() || f.fract() != 0.0 {
            return Err(format!(
                "expected an integral value for {}, got {}",
                kind.tag(),
                f
            ));
        }
        if f < min as f64 || f > max as f64 {
            return Err(out_of_range(value, kind));
        }
        return Ok(f as i64);
    }
    Err(expected_number(value, kind))
}

fn narrow_unsigned(value: &Value, max: u64, kind: ArgKind) -> Result<u64, String> {
    if let Some(u) = value.as_u64() {
        if u > max {
            return Err(out_of_range(value, kind));
        }
        return Ok(u);
    }
    if value.as_i64().is_some() {
        // as_u64 already covers the non-negative range, so this is negative.
        return Err(out_of_range(value, kind));
    }
    if let Some(f) = value.as_f64() {
        if !f.is_finite() || f.fract() != 0.0 {
            return Err(format!(
                "expected an integral value for {}, got {}",
                kind.tag(),
                f
            ));
        }
        if f < 0.0 || f > max as f64 {
            return Err(out_of_range(value, kind));
        }
        return Ok(f as u64);
    }
    Err(expected_number(value, kind))
}

fn out_of_range(value: &Value, kind: ArgKind) -> String {
    format!("value {} out of range for {}", value, kind.tag())
}

fn expected_number(value: &Value, kind: ArgKind) -> String {
    format!(
        "expected a number for {}, got {}",
        kind.tag(),
        json_type_name(value)
    )
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn arg(tag: &str, value: Value) -> TaskArg {
        TaskArg {
            type_name: tag.to_string(),
            value,
        }
    }

    #[test]
    fn test_exact_tag_matches() {
        assert_eq!(
            coerce(&arg("int64", json!(5)), ArgKind::Int64),
            Ok(ArgValue::Int64(5))
        );
        assert_eq!(
            coerce(&arg("bool", json!(true)), ArgKind::Bool),
            Ok(ArgValue::Bool(true))
        );
        assert_eq!(
            coerce(&arg("string", json!("hi")), ArgKind::String),
            Ok(ArgValue::String("hi".to_string()))
        );
    }

    #[test]
    fn test_widened_float_narrows_to_integer() {
        // A Go producer encodes every number as float64; 7.0 must coerce
        // back to the declared uint16.
        assert_eq!(
            coerce(&arg("uint16", json!(7.0)), ArgKind::Uint16),
            Ok(ArgValue::Uint16(7))
        );
        assert_eq!(
            coerce(&arg("int8", json!(-3.0)), ArgKind::Int8),
            Ok(ArgValue::Int8(-3))
        );
    }

    #[test]
    fn test_narrowing_rejects_out_of_range() {
        assert!(coerce(&arg("uint16", json!(70000)), ArgKind::Uint16).is_err());
        assert!(coerce(&arg("int8", json!(200)), ArgKind::Int8).is_err());
        assert!(coerce(&arg("uint8", json!(-1)), ArgKind::Uint8).is_err());
        assert!(coerce(&arg("int32", json!(1e12)), ArgKind::Int32).is_err());
    }

    #[test]
    fn test_fractional_value_rejected_for_integer_tags() {
        let err = coerce(&arg("int64", json!(1.5)), ArgKind::Int64).unwrap_err();
        assert!(err.contains("integral"), "unexpected reason: {err}");
    }

    #[test]
    fn test_unrecognized_tag() {
        let err = coerce(&arg("complex128", json!(1)), ArgKind::Int64).unwrap_err();
        assert!(err.contains("unrecognized type tag"), "{err}");
    }

    #[test]
    fn test_tag_mismatch() {
        let err = coerce(&arg("string", json!("x")), ArgKind::Int64).unwrap_err();
        assert!(err.contains("int64 is expected"), "{err}");
    }

    #[test]
    fn test_json_type_mismatch() {
        assert!(coerce(&arg("int64", json!("5")), ArgKind::Int64).is_err());
        assert!(coerce(&arg("bool", json!(1)), ArgKind::Bool).is_err());
        assert!(coerce(&arg("string", json!(5)), ArgKind::String).is_err());
    }

    #[test]
    fn test_uint64_full_range() {
        let max = u64::MAX;
        assert_eq!(
            coerce(&arg("uint64", json!(max)), ArgKind::Uint64),
            Ok(ArgValue::Uint64(max))
        );
        // Past i64::MAX a JSON integer is stored unsigned; it must not
        // sneak into a signed target.
        assert!(coerce(&arg("int64", json!(max)), ArgKind::Int64).is_err());
    }

    #[test]
    fn test_float32_range_check() {
        assert!(coerce(&arg("float32", json!(1e300)), ArgKind::Float32).is_err());
        assert_eq!(
            coerce(&arg("float32", json!(1.25)), ArgKind::Float32),
            Ok(ArgValue::Float32(1.25))
        );
    }

    #[test]
    fn test_every_tag_round_trips_through_from_tag() {
        for kind in [
            ArgKind::Int8,
            ArgKind::Int16,
            ArgKind::Int32,
            ArgKind::Int64,
            ArgKind::Uint8,
            ArgKind::Uint16,
            ArgKind::Uint32,
            ArgKind::Uint64,
            ArgKind::Float32,
            ArgKind::Float64,
            ArgKind::Bool,
            ArgKind::String,
        ] {
            assert_eq!(ArgKind::from_tag(kind.tag()), Some(kind));
        }
    }
}
