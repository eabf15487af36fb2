// used to print out readable forms of a data type
use std::fmt;
// used when parsing type names and literals
use std::str::FromStr;

use crate::error::{DapError, Result};

/// The thirteen DAP type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
    Str,
    Url,
    Array,
    Structure,
    Sequence,
    Grid,
}

impl TypeTag {
    pub const SCALARS: [TypeTag; 9] = [
        TypeTag::Byte,
        TypeTag::Int16,
        TypeTag::UInt16,
        TypeTag::Int32,
        TypeTag::UInt32,
        TypeTag::Float32,
        TypeTag::Float64,
        TypeTag::Str,
        TypeTag::Url,
    ];
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Byte => "Byte",
            TypeTag::Int16 => "Int16",
            TypeTag::UInt16 => "UInt16",
            TypeTag::Int32 => "Int32",
            TypeTag::UInt32 => "UInt32",
            TypeTag::Float32 => "Float32",
            TypeTag::Float64 => "Float64",
            TypeTag::Str => "String",
            TypeTag::Url => "Url",
            TypeTag::Array => "Array",
            TypeTag::Structure => "Structure",
            TypeTag::Sequence => "Sequence",
            TypeTag::Grid => "Grid",
        }
    }
    pub fn is_scalar(&self) -> bool {
        Self::SCALARS.contains(self)
    }
    pub fn is_numeric(&self) -> bool {
        self.is_scalar() && !matches!(self, TypeTag::Str | TypeTag::Url)
    }
    /// Structure, Sequence and Grid own named child variables.
    pub fn is_constructor(&self) -> bool {
        matches!(self, TypeTag::Structure | TypeTag::Sequence | TypeTag::Grid)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TypeTag {
    type Err = DapError;
    fn from_str(s: &str) -> Result<TypeTag> {
        let tag = match s {
            "Byte" => TypeTag::Byte,
            "Int16" => TypeTag::Int16,
            "UInt16" => TypeTag::UInt16,
            "Int32" => TypeTag::Int32,
            "UInt32" => TypeTag::UInt32,
            "Float32" => TypeTag::Float32,
            "Float64" => TypeTag::Float64,
            "String" | "Str" => TypeTag::Str,
            "Url" => TypeTag::Url,
            "Array" => TypeTag::Array,
            "Structure" => TypeTag::Structure,
            "Sequence" => TypeTag::Sequence,
            "Grid" => TypeTag::Grid,
            _ => return Err(DapError::Dataset(format!("Unknown type name `{s}'"))),
        };
        Ok(tag)
    }
}

/// A materialized scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float32(f32),
    Float64(f64),
    Str(String),
    Url(String),
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Byte(_) => TypeTag::Byte,
            Value::Int16(_) => TypeTag::Int16,
            Value::UInt16(_) => TypeTag::UInt16,
            Value::Int32(_) => TypeTag::Int32,
            Value::UInt32(_) => TypeTag::UInt32,
            Value::Float32(_) => TypeTag::Float32,
            Value::Float64(_) => TypeTag::Float64,
            Value::Str(_) => TypeTag::Str,
            Value::Url(_) => TypeTag::Url,
        }
    }

    /// Types a literal from a constraint expression the way constants are
    /// manufactured: Int32 if it fits, then UInt32, then Float64, else a string.
    pub fn from_literal(text: &str) -> Value {
        if let Ok(i) = text.parse::<i32>() {
            Value::Int32(i)
        } else if let Ok(u) = text.parse::<u32>() {
            Value::UInt32(u)
        } else if let Ok(f) = text.parse::<f64>() {
            Value::Float64(f)
        } else {
            Value::Str(text.to_string())
        }
    }

    /// Converts text into a value of a given scalar type (`buf2val`).
    pub fn parse_as(tag: TypeTag, text: &str) -> Result<Value> {
        fn num<T: FromStr>(tag: TypeTag, text: &str) -> Result<T> {
            text.trim()
                .parse::<T>()
                .map_err(|_| DapError::malformed(format!("`{text}' is not a valid {tag} value")))
        }
        let value = match tag {
            TypeTag::Byte => Value::Byte(num(tag, text)?),
            TypeTag::Int16 => Value::Int16(num(tag, text)?),
            TypeTag::UInt16 => Value::UInt16(num(tag, text)?),
            TypeTag::Int32 => Value::Int32(num(tag, text)?),
            TypeTag::UInt32 => Value::UInt32(num(tag, text)?),
            TypeTag::Float32 => Value::Float32(num(tag, text)?),
            TypeTag::Float64 => Value::Float64(num(tag, text)?),
            TypeTag::Str => Value::Str(text.to_string()),
            TypeTag::Url => Value::Url(text.to_string()),
            _ => return Err(DapError::invariant(format!("{tag} is not a scalar type"))),
        };
        Ok(value)
    }

    /// Converts a JSON scalar into a value of the declared type.
    pub fn from_json(tag: TypeTag, json: &serde_json::Value) -> Result<Value> {
        let bad = || DapError::Dataset(format!("`{json}' is not a valid {tag} value"));
        let int = |json: &serde_json::Value| json.as_i64().ok_or_else(bad);
        let value = match tag {
            TypeTag::Byte => Value::Byte(u8::try_from(int(json)?).map_err(|_| bad())?),
            TypeTag::Int16 => Value::Int16(i16::try_from(int(json)?).map_err(|_| bad())?),
            TypeTag::UInt16 => Value::UInt16(u16::try_from(int(json)?).map_err(|_| bad())?),
            TypeTag::Int32 => Value::Int32(i32::try_from(int(json)?).map_err(|_| bad())?),
            TypeTag::UInt32 => Value::UInt32(u32::try_from(int(json)?).map_err(|_| bad())?),
            TypeTag::Float32 => Value::Float32(json.as_f64().ok_or_else(bad)? as f32),
            TypeTag::Float64 => Value::Float64(json.as_f64().ok_or_else(bad)?),
            TypeTag::Str => Value::Str(json.as_str().ok_or_else(bad)?.to_string()),
            TypeTag::Url => Value::Url(json.as_str().ok_or_else(bad)?.to_string()),
            _ => return Err(DapError::Dataset(format!("{tag} is not a scalar type"))),
        };
        Ok(value)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Byte(v) => Some(v as f64),
            Value::Int16(v) => Some(v as f64),
            Value::UInt16(v) => Some(v as f64),
            Value::Int32(v) => Some(v as f64),
            Value::UInt32(v) => Some(v as f64),
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            Value::Str(_) | Value::Url(_) => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Url(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Str(s) | Value::Url(s) => {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
        }
    }
}
