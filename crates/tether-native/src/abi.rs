use cranelift::prelude::{types, AbiParam, Signature, Type};
use cranelift_codegen::isa::TargetIsa;
use tether_layout::{AbiShape, ScalarKind};

pub(crate) fn clif_type(kind: ScalarKind, pointer: Type) -> Type {
    match kind {
        ScalarKind::I8 | ScalarKind::U8 => types::I8,
        ScalarKind::I16 | ScalarKind::U16 => types::I16,
        ScalarKind::I32 | ScalarKind::U32 => types::I32,
        ScalarKind::I64 | ScalarKind::U64 => types::I64,
        ScalarKind::F32 => types::F32,
        ScalarKind::F64 => types::F64,
        ScalarKind::ISize | ScalarKind::USize | ScalarKind::Ptr => pointer,
    }
}

/// Sub-int parameters are extended per their signedness, as C callers expect.
fn abi_param(kind: ScalarKind, pointer: Type) -> AbiParam {
    let param = AbiParam::new(clif_type(kind, pointer));
    match kind {
        ScalarKind::I8 | ScalarKind::I16 => param.sext(),
        ScalarKind::U8 | ScalarKind::U16 => param.uext(),
        _ => param,
    }
}

/// The platform C signature for `shape`.
pub(crate) fn native_signature(shape: &AbiShape, isa: &dyn TargetIsa) -> Signature {
    let pointer = isa.pointer_type();
    let mut sig = Signature::new(isa.default_call_conv());
    sig.params
        .extend(shape.params.iter().map(|kind| abi_param(*kind, pointer)));
    if let Some(ret) = shape.ret {
        sig.returns.push(abi_param(ret, pointer));
    }
    sig
}

/// `extern "C" fn(*const u8, *const u64, *mut u64)`: the uniform shape of thunks
/// and of the callback dispatcher.
pub(crate) fn uniform_signature(isa: &dyn TargetIsa) -> Signature {
    let pointer = isa.pointer_type();
    let mut sig = Signature::new(isa.default_call_conv());
    sig.params.extend([AbiParam::new(pointer); 3]);
    sig
}
