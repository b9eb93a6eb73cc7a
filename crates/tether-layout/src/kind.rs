use crate::descriptor::LayoutDescriptor;
use crate::SchemaError;
use std::fmt;
use std::mem;
use std::sync::Arc;

/// The closed set of scalar representations that can cross the boundary.
///
/// Signed and unsigned kinds of the same width share storage but are never
/// interchangeable: a value tagged `I32` is not accepted where `U32` is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    /// Platform-word signed integer.
    ISize,
    /// Platform-word unsigned integer.
    USize,
    F32,
    F64,
    /// Raw address (data or code), platform-word wide.
    Ptr,
}

impl ScalarKind {
    /// Every scalar kind, in declaration order.
    pub const ALL: [ScalarKind; 13] = [
        ScalarKind::I8,
        ScalarKind::U8,
        ScalarKind::I16,
        ScalarKind::U16,
        ScalarKind::I32,
        ScalarKind::U32,
        ScalarKind::I64,
        ScalarKind::U64,
        ScalarKind::ISize,
        ScalarKind::USize,
        ScalarKind::F32,
        ScalarKind::F64,
        ScalarKind::Ptr,
    ];

    /// Storage width in bytes on the host.
    pub const fn size_bytes(self) -> usize {
        match self {
            ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
            ScalarKind::ISize | ScalarKind::USize | ScalarKind::Ptr => mem::size_of::<usize>(),
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64 | ScalarKind::ISize
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ScalarKind::I8 => "i8",
            ScalarKind::U8 => "u8",
            ScalarKind::I16 => "i16",
            ScalarKind::U16 => "u16",
            ScalarKind::I32 => "i32",
            ScalarKind::U32 => "u32",
            ScalarKind::I64 => "i64",
            ScalarKind::U64 => "u64",
            ScalarKind::ISize => "isize",
            ScalarKind::USize => "usize",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::Ptr => "ptr",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a pointer-typed field or parameter points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pointee {
    /// `void *` or anything the boundary does not need to know about.
    Opaque,
    Scalar(ScalarKind),
    /// A record declared elsewhere, referenced by name only (no ownership, no layout).
    Record(String),
}

/// Declared kind of a field, parameter or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Scalar(ScalarKind),
    Pointer(Pointee),
    /// Function pointer with a fixed signature.
    Callback(Arc<FnSignature>),
    /// Aggregate embedded by value. Only valid as a field.
    Record(Arc<LayoutDescriptor>),
    /// Only valid as a return kind.
    Void,
}

impl Kind {
    pub fn opaque_pointer() -> Self {
        Kind::Pointer(Pointee::Opaque)
    }

    pub fn pointer_to(kind: ScalarKind) -> Self {
        Kind::Pointer(Pointee::Scalar(kind))
    }

    pub fn pointer_to_record(name: impl Into<String>) -> Self {
        Kind::Pointer(Pointee::Record(name.into()))
    }

    pub fn callback(signature: FnSignature) -> Self {
        Kind::Callback(Arc::new(signature))
    }

    /// The scalar representation this kind travels as, if it has one.
    ///
    /// Pointers and callbacks travel as [`ScalarKind::Ptr`]; records and `void` have
    /// no scalar representation.
    pub fn wire_kind(&self) -> Option<ScalarKind> {
        match self {
            Kind::Scalar(kind) => Some(*kind),
            Kind::Pointer(_) | Kind::Callback(_) => Some(ScalarKind::Ptr),
            Kind::Record(_) | Kind::Void => None,
        }
    }

    /// True for kinds that may legally carry a null address.
    pub fn is_address(&self) -> bool {
        matches!(
            self,
            Kind::Pointer(_) | Kind::Callback(_) | Kind::Scalar(ScalarKind::Ptr)
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Scalar(kind) => write!(f, "{}", kind),
            Kind::Pointer(Pointee::Opaque) => f.write_str("*void"),
            Kind::Pointer(Pointee::Scalar(kind)) => write!(f, "*{}", kind),
            Kind::Pointer(Pointee::Record(name)) => write!(f, "*{}", name),
            Kind::Callback(signature) => write!(f, "{}", signature),
            Kind::Record(layout) => f.write_str(layout.name()),
            Kind::Void => f.write_str("void"),
        }
    }
}

/// Calling-convention shape of a signature: only what the machine code cares about.
///
/// Signatures that differ in pointee or record names but share a shape can share the
/// same generated call code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbiShape {
    pub params: Vec<ScalarKind>,
    pub ret: Option<ScalarKind>,
}

/// Declared parameter and return kinds of a native function or callback.
#[derive(Debug, Clone, PartialEq)]
pub struct FnSignature {
    params: Vec<Kind>,
    ret: Kind,
}

impl FnSignature {
    /// Creates a signature, rejecting kinds that cannot be passed by value.
    pub fn new(params: Vec<Kind>, ret: Kind) -> Result<Self, SchemaError> {
        for (index, param) in params.iter().enumerate() {
            if param.wire_kind().is_none() {
                return Err(SchemaError::UnsupportedSignature {
                    position: format!("parameter {}", index),
                    kind: param.to_string(),
                });
            }
        }
        if let Kind::Record(_) = ret {
            return Err(SchemaError::UnsupportedSignature {
                position: "return".to_string(),
                kind: ret.to_string(),
            });
        }
        Ok(FnSignature { params, ret })
    }

    pub fn params(&self) -> &[Kind] {
        &self.params
    }

    pub fn ret(&self) -> &Kind {
        &self.ret
    }

    pub fn abi_shape(&self) -> AbiShape {
        AbiShape {
            // Parameters are validated in `new`, so every one has a wire kind.
            params: self.params.iter().filter_map(Kind::wire_kind).collect(),
            ret: self.ret.wire_kind(),
        }
    }
}

impl fmt::Display for FnSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fn(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")?;
        if self.ret != Kind::Void {
            write!(f, " -> {}", self.ret)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_kinds() {
        assert_eq!(Kind::Scalar(ScalarKind::U16).wire_kind(), Some(ScalarKind::U16));
        assert_eq!(Kind::pointer_to(ScalarKind::I32).wire_kind(), Some(ScalarKind::Ptr));
        assert_eq!(Kind::Void.wire_kind(), None);
    }

    #[test]
    fn test_signature_display() {
        let sig = FnSignature::new(
            vec![Kind::Scalar(ScalarKind::I32), Kind::pointer_to(ScalarKind::I32)],
            Kind::Scalar(ScalarKind::U64),
        )
        .unwrap();
        assert_eq!(sig.to_string(), "fn(i32, *i32) -> u64");

        let void_sig = FnSignature::new(vec![], Kind::Void).unwrap();
        assert_eq!(void_sig.to_string(), "fn()");
        assert_eq!(void_sig.abi_shape(), AbiShape { params: vec![], ret: None });
    }

    #[test]
    fn test_void_parameter_rejected() {
        let err = FnSignature::new(vec![Kind::Void], Kind::Void).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedSignature { .. }));
    }
}
