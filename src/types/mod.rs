pub mod object;
pub mod primitive;
pub mod reference;
pub mod stream;

pub use object::*;
pub use primitive::*;
pub use reference::*;
pub use stream::*;

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(PdfReference),
}

impl PdfValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PdfValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfValue::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut PdfArray> {
        match self {
            PdfValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfValue::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut PdfDictionary> {
        match self {
            PdfValue::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfValue::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&PdfReference> {
        match self {
            PdfValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// True for a name equal to `name` (with or without the leading slash).
    pub fn is_name(&self, name: &str) -> bool {
        self.as_name().map(|n| n == name).unwrap_or(false)
    }

    /// True if this is the name `name`, or an array containing it.
    pub fn is_or_has_name(&self, name: &str) -> bool {
        match self {
            PdfValue::Name(n) => n == name,
            PdfValue::Array(a) => a.iter().any(|v| v.is_name(name)),
            _ => false,
        }
    }

    /// Serialize a scalar to PDF syntax. Containers and streams are the
    /// unparser's job and panic here in debug builds only through the
    /// fallback branch being unreachable for them.
    pub fn unparse_scalar(&self) -> String {
        match self {
            PdfValue::Null => "null".to_string(),
            PdfValue::Boolean(true) => "true".to_string(),
            PdfValue::Boolean(false) => "false".to_string(),
            PdfValue::Integer(i) => i.to_string(),
            PdfValue::Real(r) => format_real(*r),
            PdfValue::String(s) => s.unparse(matches!(s, PdfString::Hexadecimal(_))),
            PdfValue::Name(n) => n.normalized(),
            PdfValue::Reference(r) => r.to_string(),
            PdfValue::Array(a) => a.to_string(),
            PdfValue::Dictionary(d) => d.to_string(),
            PdfValue::Stream(s) => s.dict.to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PdfValue::Null => "null",
            PdfValue::Boolean(_) => "boolean",
            PdfValue::Integer(_) => "integer",
            PdfValue::Real(_) => "real",
            PdfValue::String(_) => "string",
            PdfValue::Name(_) => "name",
            PdfValue::Array(_) => "array",
            PdfValue::Dictionary(_) => "dictionary",
            PdfValue::Stream(_) => "stream",
            PdfValue::Reference(_) => "reference",
        }
    }
}

impl fmt::Display for PdfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unparse_scalar())
    }
}

impl From<i64> for PdfValue {
    fn from(v: i64) -> Self {
        PdfValue::Integer(v)
    }
}

impl From<&str> for PdfValue {
    fn from(v: &str) -> Self {
        PdfValue::Name(PdfName::new(v))
    }
}

impl From<PdfReference> for PdfValue {
    fn from(v: PdfReference) -> Self {
        PdfValue::Reference(v)
    }
}
