use crate::handle::StructHandle;
use std::fmt;
use tether_layout::ScalarKind;

/// Width of one argument or return slot exchanged with generated call code.
pub const SLOT_BYTES: usize = 8;

/// A scalar tagged with its exact kind.
///
/// Conversions to and from raw storage copy native-endian bytes of exactly the
/// kind's width, so values round-trip bit for bit (including NaN payloads).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    ISize(isize),
    USize(usize),
    F32(f32),
    F64(f64),
    Ptr(usize),
}

// Copies the first `size_of::<$ty>()` bytes of `$src` into a `$ty`.
macro_rules! from_ne {
    ($ty:ty, $src:expr) => {{
        let mut buf = [0u8; std::mem::size_of::<$ty>()];
        buf.copy_from_slice(&$src[..std::mem::size_of::<$ty>()]);
        <$ty>::from_ne_bytes(buf)
    }};
}

impl ScalarValue {
    pub const fn null() -> Self {
        ScalarValue::Ptr(0)
    }

    /// The all-zero value of `kind`.
    pub fn zero(kind: ScalarKind) -> Self {
        ScalarValue::from_slot(kind, 0)
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::I8(_) => ScalarKind::I8,
            ScalarValue::U8(_) => ScalarKind::U8,
            ScalarValue::I16(_) => ScalarKind::I16,
            ScalarValue::U16(_) => ScalarKind::U16,
            ScalarValue::I32(_) => ScalarKind::I32,
            ScalarValue::U32(_) => ScalarKind::U32,
            ScalarValue::I64(_) => ScalarKind::I64,
            ScalarValue::U64(_) => ScalarKind::U64,
            ScalarValue::ISize(_) => ScalarKind::ISize,
            ScalarValue::USize(_) => ScalarKind::USize,
            ScalarValue::F32(_) => ScalarKind::F32,
            ScalarValue::F64(_) => ScalarKind::F64,
            ScalarValue::Ptr(_) => ScalarKind::Ptr,
        }
    }

    /// Writes the value's native-endian bytes into the start of `dst`.
    ///
    /// Panics if `dst` is shorter than the kind's width.
    pub fn write_bytes(&self, dst: &mut [u8]) {
        match *self {
            ScalarValue::I8(v) => dst[..1].copy_from_slice(&v.to_ne_bytes()),
            ScalarValue::U8(v) => dst[..1].copy_from_slice(&v.to_ne_bytes()),
            ScalarValue::I16(v) => dst[..2].copy_from_slice(&v.to_ne_bytes()),
            ScalarValue::U16(v) => dst[..2].copy_from_slice(&v.to_ne_bytes()),
            ScalarValue::I32(v) => dst[..4].copy_from_slice(&v.to_ne_bytes()),
            ScalarValue::U32(v) => dst[..4].copy_from_slice(&v.to_ne_bytes()),
            ScalarValue::I64(v) => dst[..8].copy_from_slice(&v.to_ne_bytes()),
            ScalarValue::U64(v) => dst[..8].copy_from_slice(&v.to_ne_bytes()),
            ScalarValue::F32(v) => dst[..4].copy_from_slice(&v.to_bits().to_ne_bytes()),
            ScalarValue::F64(v) => dst[..8].copy_from_slice(&v.to_bits().to_ne_bytes()),
            ScalarValue::ISize(v) => {
                let bytes = v.to_ne_bytes();
                dst[..bytes.len()].copy_from_slice(&bytes)
            }
            ScalarValue::USize(v) | ScalarValue::Ptr(v) => {
                let bytes = v.to_ne_bytes();
                dst[..bytes.len()].copy_from_slice(&bytes)
            }
        }
    }

    /// Reads a value of `kind` from the start of `src`.
    ///
    /// Panics if `src` is shorter than the kind's width.
    pub fn read_bytes(kind: ScalarKind, src: &[u8]) -> Self {
        match kind {
            ScalarKind::I8 => ScalarValue::I8(from_ne!(i8, src)),
            ScalarKind::U8 => ScalarValue::U8(from_ne!(u8, src)),
            ScalarKind::I16 => ScalarValue::I16(from_ne!(i16, src)),
            ScalarKind::U16 => ScalarValue::U16(from_ne!(u16, src)),
            ScalarKind::I32 => ScalarValue::I32(from_ne!(i32, src)),
            ScalarKind::U32 => ScalarValue::U32(from_ne!(u32, src)),
            ScalarKind::I64 => ScalarValue::I64(from_ne!(i64, src)),
            ScalarKind::U64 => ScalarValue::U64(from_ne!(u64, src)),
            ScalarKind::ISize => ScalarValue::ISize(from_ne!(isize, src)),
            ScalarKind::USize => ScalarValue::USize(from_ne!(usize, src)),
            ScalarKind::F32 => ScalarValue::F32(f32::from_bits(from_ne!(u32, src))),
            ScalarKind::F64 => ScalarValue::F64(f64::from_bits(from_ne!(u64, src))),
            ScalarKind::Ptr => ScalarValue::Ptr(from_ne!(usize, src)),
        }
    }

    /// Packs the value into an argument slot: its bytes first, the rest zeroed.
    pub fn to_slot(&self) -> u64 {
        let mut buf = [0u8; SLOT_BYTES];
        self.write_bytes(&mut buf);
        u64::from_ne_bytes(buf)
    }

    /// Unpacks a value of `kind` from an argument or return slot.
    pub fn from_slot(kind: ScalarKind, slot: u64) -> Self {
        ScalarValue::read_bytes(kind, &slot.to_ne_bytes())
    }

    /// Raw representation zero-extended to 64 bits, for bit-exact comparisons.
    pub fn bits(&self) -> u64 {
        let width = self.kind().size_bytes();
        let mut buf = [0u8; SLOT_BYTES];
        self.write_bytes(&mut buf);
        let mut bits = [0u8; SLOT_BYTES];
        if cfg!(target_endian = "little") {
            bits[..width].copy_from_slice(&buf[..width]);
        } else {
            bits[SLOT_BYTES - width..].copy_from_slice(&buf[..width]);
        }
        u64::from_ne_bytes(bits)
    }

    pub fn as_address(&self) -> Option<usize> {
        match *self {
            ScalarValue::Ptr(address) => Some(address),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::I8(v) => write!(f, "{}i8", v),
            ScalarValue::U8(v) => write!(f, "{}u8", v),
            ScalarValue::I16(v) => write!(f, "{}i16", v),
            ScalarValue::U16(v) => write!(f, "{}u16", v),
            ScalarValue::I32(v) => write!(f, "{}i32", v),
            ScalarValue::U32(v) => write!(f, "{}u32", v),
            ScalarValue::I64(v) => write!(f, "{}i64", v),
            ScalarValue::U64(v) => write!(f, "{}u64", v),
            ScalarValue::ISize(v) => write!(f, "{}isize", v),
            ScalarValue::USize(v) => write!(f, "{}usize", v),
            ScalarValue::F32(v) => write!(f, "{}f32", v),
            ScalarValue::F64(v) => write!(f, "{}f64", v),
            ScalarValue::Ptr(0) => f.write_str("null"),
            ScalarValue::Ptr(v) => write!(f, "{:#x}", v),
        }
    }
}

/// One argument of a native invocation.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Value(ScalarValue),
    /// A reference to an owned struct, passed as its address. `None` is null.
    Struct(Option<&'a StructHandle>),
}

impl<'a> Arg<'a> {
    pub const fn null() -> Self {
        Arg::Struct(None)
    }

    /// Short description used in mismatch reports.
    pub fn describe(&self) -> String {
        match self {
            Arg::Value(value) => value.kind().to_string(),
            Arg::Struct(Some(handle)) => format!("&{}", handle.layout().name()),
            Arg::Struct(None) => "null".to_string(),
        }
    }
}

impl From<ScalarValue> for Arg<'_> {
    fn from(value: ScalarValue) -> Self {
        Arg::Value(value)
    }
}

impl<'a> From<&'a StructHandle> for Arg<'a> {
    fn from(handle: &'a StructHandle) -> Self {
        Arg::Struct(Some(handle))
    }
}
