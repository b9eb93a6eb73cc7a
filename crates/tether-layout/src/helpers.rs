use crate::descriptor::LayoutDescriptor;
use crate::kind::{Kind, ScalarKind};
use crate::schema::RecordKind;
use crate::SchemaError;
use repc::layout::{Array, BuiltinType, Record, RecordField, Type, TypeVariant};

/// Wraps a repc type variant with no annotations.
pub(crate) fn plain(variant: TypeVariant<()>) -> Type<()> {
    Type {
        layout: (),
        annotations: vec![],
        variant,
    }
}

pub(crate) fn named_field(ty: Type<()>) -> RecordField<()> {
    RecordField {
        layout: None, // Filled in by repc
        annotations: vec![],
        named: true,
        bit_width: None,
        ty,
    }
}

/// Maps a scalar kind onto the C builtin with the same size and alignment.
///
/// Platform-word kinds map to `Pointer` so they follow the target's pointer width
/// rather than `long`, which differs between LP64 and LLP64 targets.
pub(crate) fn scalar_builtin(kind: ScalarKind) -> BuiltinType {
    match kind {
        ScalarKind::I8 => BuiltinType::Char,
        ScalarKind::U8 => BuiltinType::UnsignedChar,
        ScalarKind::I16 => BuiltinType::Short,
        ScalarKind::U16 => BuiltinType::UnsignedShort,
        ScalarKind::I32 => BuiltinType::Int,
        ScalarKind::U32 => BuiltinType::UnsignedInt,
        ScalarKind::I64 => BuiltinType::LongLong,
        ScalarKind::U64 => BuiltinType::UnsignedLongLong,
        ScalarKind::F32 => BuiltinType::Float,
        ScalarKind::F64 => BuiltinType::Double,
        ScalarKind::ISize | ScalarKind::USize | ScalarKind::Ptr => BuiltinType::Pointer,
    }
}

/// Converts a field kind into the repc type used for a single element.
pub(crate) fn kind_to_repc(kind: &Kind) -> Result<Type<()>, SchemaError> {
    match kind {
        Kind::Scalar(scalar) => Ok(plain(TypeVariant::Builtin(scalar_builtin(*scalar)))),
        Kind::Pointer(_) | Kind::Callback(_) => Ok(plain(TypeVariant::Builtin(BuiltinType::Pointer))),
        Kind::Record(layout) => record_to_repc(layout),
        Kind::Void => Err(SchemaError::Other(
            "void has no storage representation".to_string(),
        )),
    }
}

/// Rebuilds the repc record type of an already computed descriptor so it can be
/// embedded in an outer record.
pub(crate) fn record_to_repc(layout: &LayoutDescriptor) -> Result<Type<()>, SchemaError> {
    let mut fields = Vec::with_capacity(layout.fields().len());
    for field in layout.fields() {
        fields.push(named_field(field_to_repc(&field.kind, field.count)?));
    }
    Ok(plain(TypeVariant::Record(Record {
        kind: repc_record_kind(layout.kind()),
        fields,
    })))
}

/// Converts a declared field (element kind plus optional count) into a repc type.
pub(crate) fn field_to_repc(kind: &Kind, count: Option<usize>) -> Result<Type<()>, SchemaError> {
    let element = kind_to_repc(kind)?;
    Ok(match count {
        Some(count) => plain(TypeVariant::Array(Array {
            element_type: Box::new(element),
            num_elements: Some(count as u64),
        })),
        None => element,
    })
}

pub(crate) fn repc_record_kind(kind: RecordKind) -> repc::layout::RecordKind {
    match kind {
        RecordKind::Struct => repc::layout::RecordKind::Struct,
        RecordKind::Union => repc::layout::RecordKind::Union,
    }
}

/// Rounds `size` up to the next multiple of `align` (a power of two).
pub(crate) fn round_up(size: usize, align: usize) -> usize {
    if align > 0 {
        (size + align - 1) & !(align - 1)
    } else {
        size
    }
}

pub(crate) fn bits_to_bytes(bits: u64) -> usize {
    (bits / 8) as usize
}
