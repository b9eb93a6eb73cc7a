use crate::config::BridgeConfig;
use crate::fault::FaultScope;
use crate::jit::JitState;
use crate::trampoline::Trampolines;
use crate::{BridgeError, FunctionRef};
use parking_lot::Mutex;
use std::sync::Arc;
use tether_layout::{Kind, LayoutDescriptor, Pointee, ScalarKind};
use tether_marshal::{Arg, ScalarValue, StructHandle, TrampolineFactory};

/// Entry point for calling native code and handing Rust callbacks to it.
///
/// Cloning is cheap and clones share generated code. The JIT lock is only held while
/// compiling, never across a native call, so callback handlers may invoke again.
#[derive(Clone)]
pub struct Bridge {
    config: BridgeConfig,
    jit: Arc<Mutex<JitState>>,
    trampolines: Arc<Trampolines>,
}

impl Bridge {
    pub fn new() -> Result<Self, BridgeError> {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Result<Self, BridgeError> {
        let jit = Arc::new(Mutex::new(JitState::new(&config)?));
        let trampolines = Arc::new(Trampolines::new(Arc::clone(&jit)));
        Ok(Bridge {
            config,
            jit,
            trampolines,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn trampolines(&self) -> &Arc<Trampolines> {
        &self.trampolines
    }

    /// Allocates a zeroed struct whose callback slots dispatch through this bridge.
    ///
    /// Each callback slot gets its own trampoline. The trampoline code and its cell stay
    /// alive until the bridge itself is dropped, also after the handle is released, so a
    /// native library holding a stale pointer hits an `Invalid` cell instead of freed memory.
    /// Long-running programs that allocate callback structs in a loop grow the JIT by one
    /// trampoline per slot per allocation.
    pub fn allocate(&self, layout: Arc<LayoutDescriptor>) -> Result<StructHandle, BridgeError> {
        let factory: Arc<dyn TrampolineFactory> = self.trampolines.clone();
        Ok(StructHandle::allocate(layout, factory)?)
    }

    /// Calls `function` with `args`, returning `None` for `void` functions.
    ///
    /// Arguments are checked against the declared signature before anything native
    /// runs. A fault raised by a callback during the call (an unbound or released slot,
    /// a panicking handler, a handler returning the wrong kind) is returned once the
    /// native function has returned.
    pub fn invoke(&self, function: &FunctionRef, args: &[Arg<'_>]) -> Result<Option<ScalarValue>, BridgeError> {
        let slots = marshal_args(function, args)?;
        let shape = function.signature().abi_shape();
        let thunk = self.jit.lock().thunk(&shape)?;

        log::trace!("Invoking `{}` with {:?}", function.display_name(), args);
        let mut ret = 0u64;
        let scope = FaultScope::enter();
        // SAFETY: the thunk was compiled for this signature's shape and the arguments
        // were checked against it; the address is trusted per `FunctionRef`.
        unsafe { thunk(function.address() as *const u8, slots.as_ptr(), &mut ret) };
        if let Some(fault) = scope.finish() {
            return Err(fault);
        }

        let result = shape.ret.map(|kind| ScalarValue::from_slot(kind, ret));
        log::trace!("`{}` returned {:?}", function.display_name(), result);
        Ok(result)
    }
}

fn marshal_args(function: &FunctionRef, args: &[Arg<'_>]) -> Result<Vec<u64>, BridgeError> {
    let mismatch = |reason: String| BridgeError::SignatureMismatch {
        function: function.display_name(),
        reason,
    };
    let params = function.signature().params();
    if params.len() != args.len() {
        return Err(mismatch(format!(
            "expected {} arguments, got {}",
            params.len(),
            args.len()
        )));
    }
    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (kind, arg))| {
            marshal_arg(kind, arg).ok_or_else(|| {
                mismatch(format!(
                    "argument {} expects {}, got {}",
                    index,
                    kind,
                    arg.describe()
                ))
            })
        })
        .collect()
}

/// Packs `arg` into a slot if it is acceptable for a parameter of `kind`.
fn marshal_arg(kind: &Kind, arg: &Arg<'_>) -> Option<u64> {
    match (kind, arg) {
        (Kind::Scalar(expected), Arg::Value(value)) if value.kind() == *expected => Some(value.to_slot()),
        (Kind::Pointer(_) | Kind::Callback(_), Arg::Value(value @ ScalarValue::Ptr(_))) => Some(value.to_slot()),
        (Kind::Pointer(_) | Kind::Callback(_) | Kind::Scalar(ScalarKind::Ptr), Arg::Struct(None)) => {
            Some(ScalarValue::null().to_slot())
        }
        (Kind::Pointer(Pointee::Opaque) | Kind::Scalar(ScalarKind::Ptr), Arg::Struct(Some(handle))) => {
            Some(ScalarValue::Ptr(handle.address()).to_slot())
        }
        (Kind::Pointer(Pointee::Record(name)), Arg::Struct(Some(handle))) if handle.layout().name() == name => {
            Some(ScalarValue::Ptr(handle.address()).to_slot())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshal_arg_rules() {
        let i32_kind = Kind::Scalar(ScalarKind::I32);
        assert_eq!(marshal_arg(&i32_kind, &Arg::Value(ScalarValue::I32(-1))), Some(ScalarValue::I32(-1).to_slot()));
        assert_eq!(marshal_arg(&i32_kind, &Arg::Value(ScalarValue::U32(1))), None);
        assert_eq!(marshal_arg(&i32_kind, &Arg::null()), None);

        let ptr = Kind::pointer_to(ScalarKind::I32);
        assert_eq!(marshal_arg(&ptr, &Arg::null()), Some(0));
        assert_eq!(marshal_arg(&ptr, &Arg::Value(ScalarValue::Ptr(0x10))), Some(ScalarValue::Ptr(0x10).to_slot()));
        assert_eq!(marshal_arg(&ptr, &Arg::Value(ScalarValue::USize(0x10))), None);
    }
}
