//! Structural type mapping for protocol documents
//!
//! Operations describe their input and output structures with an explicit,
//! ordered field table. Primitive fields map to XML Schema type tokens; any
//! compound field falls back to a synthesized `tns:<field><kind>` name for
//! which no schema is generated.

use thiserror::Error;

pub const STRING: &str = "xsd:string";
pub const INT32: &str = "xsd:int";
pub const INT64: &str = "xsd:long";
pub const BOOL: &str = "xsd:boolean";
pub const FLOAT32: &str = "xsd:float";
pub const FLOAT64: &str = "xsd:double";

/// Structural kind of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Int32,
    Int64,
    Bool,
    Float32,
    Float64,
    Struct(Vec<FieldSchema>),
    List(Box<FieldKind>),
    Map,
    Optional(Box<FieldKind>),
}

impl FieldKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Bool => "bool",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Struct(_) => "struct",
            Self::List(_) => "list",
            Self::Map => "map",
            Self::Optional(_) => "option",
        }
    }

    pub fn fields(&self) -> Option<&[FieldSchema]> {
        match self {
            Self::Struct(fields) => Some(fields),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported kind: {0}")]
pub struct UnsupportedKind(pub &'static str);

/// A field as declared: its source name, optional wire tag and kind.
///
/// The tag follows the `"<wire name>,required"` convention. An empty first
/// token keeps the declared name.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub tag: Option<&'static str>,
    pub kind: FieldKind,
}

impl FieldSchema {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            tag: None,
            kind,
        }
    }

    pub fn of<T: Schema + ?Sized>(name: &'static str) -> Self {
        Self::new(name, T::kind())
    }

    pub fn tagged(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }
}

/// A field resolved for the wire, in declaration order.
///
/// `declared` is the name the Rust type serializes under; `name` is what
/// appears on the wire and in the protocol document.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub declared: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldDescriptor {
    pub fn type_token(&self) -> String {
        type_token(&self.name, &self.kind)
    }
}

/// Types that can describe their own structure to the registry.
pub trait Schema {
    fn kind() -> FieldKind;
}

macro_rules! primitive_schema {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Schema for $ty {
                fn kind() -> FieldKind {
                    FieldKind::$kind
                }
            }
        )*
    };
}

primitive_schema! {
    String => String,
    str => String,
    i32 => Int32,
    i64 => Int64,
    bool => Bool,
    f32 => Float32,
    f64 => Float64,
}

impl<T: Schema> Schema for Vec<T> {
    fn kind() -> FieldKind {
        FieldKind::List(Box::new(T::kind()))
    }
}

impl<T: Schema> Schema for Option<T> {
    fn kind() -> FieldKind {
        FieldKind::Optional(Box::new(T::kind()))
    }
}

impl<K, V> Schema for std::collections::HashMap<K, V> {
    fn kind() -> FieldKind {
        FieldKind::Map
    }
}

pub fn map_primitive(kind: &FieldKind) -> Result<&'static str, UnsupportedKind> {
    match kind {
        FieldKind::String => Ok(STRING),
        FieldKind::Int32 => Ok(INT32),
        FieldKind::Int64 => Ok(INT64),
        FieldKind::Bool => Ok(BOOL),
        FieldKind::Float32 => Ok(FLOAT32),
        FieldKind::Float64 => Ok(FLOAT64),
        other => Err(UnsupportedKind(other.kind_name())),
    }
}

/// Schema token for a field, falling back to a namespaced synthetic name for
/// compound kinds. The synthetic type is never defined in the document.
pub fn type_token(wire_name: &str, kind: &FieldKind) -> String {
    match map_primitive(kind) {
        Ok(token) => token.to_string(),
        Err(_) => format!("tns:{wire_name}{}", kind.kind_name()),
    }
}

pub fn resolve_field_name(field: &FieldSchema) -> (String, bool) {
    let mut name = field.name.to_string();
    let mut required = false;

    let Some(tag) = field.tag else {
        return (name, required);
    };

    for (index, token) in tag.split(',').map(str::trim).enumerate() {
        if index == 0 {
            if !token.is_empty() {
                name = token.to_string();
            }
        } else if token == "required" {
            required = true;
            break;
        }
    }

    (name, required)
}

pub fn resolve_field(field: &FieldSchema) -> FieldDescriptor {
    let (name, required) = resolve_field_name(field);
    FieldDescriptor {
        name,
        declared: field.name.to_string(),
        kind: field.kind.clone(),
        required,
    }
}
