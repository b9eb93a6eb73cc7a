//! Cranelift JIT that produces call thunks and callback trampolines.
//!
//! A *thunk* adapts the uniform `(target, args, ret)` shape to a concrete native
//! signature so that Rust can call any supported function without knowing its type
//! statically. A *trampoline* goes the other way: it has the concrete native signature
//! of a callback and forwards into the Rust dispatcher with the uniform shape.

use crate::abi::{clif_type, native_signature, uniform_signature};
use crate::config::BridgeConfig;
use crate::BridgeError;
use cranelift::prelude::*;
use cranelift_codegen::isa::TargetIsa;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Module};
use rustc_hash::FxHashMap;
use std::mem;
use std::sync::Arc;
use target_lexicon::Triple;
use tether_layout::AbiShape;
use tether_marshal::SLOT_BYTES;

/// Entry point of a compiled thunk.
pub(crate) type ThunkFn = unsafe extern "C" fn(*const u8, *const u64, *mut u64);

pub(crate) struct JitState {
    module: JITModule,
    ctx: codegen::Context,
    builder_ctx: FunctionBuilderContext,
    isa: Arc<dyn TargetIsa>,
    thunks: FxHashMap<AbiShape, ThunkFn>,
}

// SAFETY: the module owns its code memory outright and is only touched behind the
// bridge's mutex.
unsafe impl Send for JitState {}

impl JitState {
    pub(crate) fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let mut flag_builder = settings::builder();
        flag_builder.set("opt_level", config.opt_level.as_setting())?;
        flag_builder.set("enable_verifier", if config.verify { "true" } else { "false" })?;
        // The JIT maps code at arbitrary addresses and patches absolute relocations.
        flag_builder.set("is_pic", "false")?;
        flag_builder.set("use_colocated_libcalls", "false")?;
        let flags = settings::Flags::new(flag_builder);

        let host = Triple::host();
        match host.pointer_width() {
            Ok(width) if width.bytes() as usize == mem::size_of::<usize>() => {}
            _ => {
                return Err(BridgeError::IsaSetup(format!(
                    "Unsupported pointer width on host `{}`",
                    host
                )))
            }
        }

        let isa_builder = cranelift_native::builder()
            .map_err(|e| BridgeError::IsaSetup(format!("Host target lookup failed: {}", e)))?;
        let isa = isa_builder
            .finish(flags)
            .map_err(|e| BridgeError::IsaSetup(format!("ISA construction failed: {}", e)))?;
        log::debug!(
            "JIT ready for {} (opt_level={}, verify={})",
            isa.triple(),
            config.opt_level.as_setting(),
            config.verify
        );

        let builder = JITBuilder::with_isa(isa.clone(), default_libcall_names());
        let module = JITModule::new(builder);
        let ctx = module.make_context();

        Ok(JitState {
            module,
            ctx,
            builder_ctx: FunctionBuilderContext::new(),
            isa,
            thunks: FxHashMap::default(),
        })
    }

    /// Returns the thunk for `shape`, compiling it on first use.
    pub(crate) fn thunk(&mut self, shape: &AbiShape) -> Result<ThunkFn, BridgeError> {
        if let Some(thunk) = self.thunks.get(shape) {
            return Ok(*thunk);
        }
        let code = self.compile_thunk(shape)?;
        // SAFETY: the code was generated with exactly the uniform signature.
        let thunk = unsafe { mem::transmute::<*const u8, ThunkFn>(code) };
        self.thunks.insert(shape.clone(), thunk);
        Ok(thunk)
    }

    /// Loads each argument from its slot, calls `target` with the native signature and
    /// stores the result into the return slot.
    fn compile_thunk(&mut self, shape: &AbiShape) -> Result<*const u8, BridgeError> {
        let pointer = self.isa.pointer_type();
        let native_sig = native_signature(shape, &*self.isa);
        let sig = uniform_signature(&*self.isa);

        self.ctx.func.signature = sig.clone();
        {
            let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);

            let params = builder.block_params(entry).to_vec();
            let (target, args, ret) = (params[0], params[1], params[2]);

            let mut call_args = Vec::with_capacity(shape.params.len());
            for (index, kind) in shape.params.iter().enumerate() {
                let ty = clif_type(*kind, pointer);
                let offset = (index * SLOT_BYTES) as i32;
                call_args.push(builder.ins().load(ty, MemFlags::trusted(), args, offset));
            }

            let sig_ref = builder.import_signature(native_sig);
            let call = builder.ins().call_indirect(sig_ref, target, &call_args);
            if shape.ret.is_some() {
                let result = builder.inst_results(call)[0];
                builder.ins().store(MemFlags::trusted(), result, ret, 0);
            }
            builder.ins().return_(&[]);
            builder.finalize();
        }

        log::debug!("Compiling call thunk for {:?}", shape);
        self.define(sig)
    }

    /// Compiles an entry point with the native signature `shape` that forwards to
    /// `dispatcher(context, args, ret)` and returns whatever the dispatcher left in
    /// the return slot.
    pub(crate) fn compile_trampoline(
        &mut self,
        shape: &AbiShape,
        dispatcher: usize,
        context: usize,
    ) -> Result<*const u8, BridgeError> {
        let pointer = self.isa.pointer_type();
        let sig = native_signature(shape, &*self.isa);
        let dispatch_sig = uniform_signature(&*self.isa);

        self.ctx.func.signature = sig.clone();
        {
            let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);

            let arg_bytes = (shape.params.len().max(1) * SLOT_BYTES) as u32;
            let args_slot = builder.create_sized_stack_slot(StackSlotData::new(
                StackSlotKind::ExplicitSlot,
                arg_bytes,
                3,
            ));
            let ret_slot = builder.create_sized_stack_slot(StackSlotData::new(
                StackSlotKind::ExplicitSlot,
                SLOT_BYTES as u32,
                3,
            ));

            let params = builder.block_params(entry).to_vec();
            for (index, value) in params.into_iter().enumerate() {
                builder
                    .ins()
                    .stack_store(value, args_slot, (index * SLOT_BYTES) as i32);
            }
            let zero = builder.ins().iconst(types::I64, 0);
            builder.ins().stack_store(zero, ret_slot, 0);

            let args = builder.ins().stack_addr(pointer, args_slot, 0);
            let ret = builder.ins().stack_addr(pointer, ret_slot, 0);
            let context = builder.ins().iconst(pointer, context as i64);
            let callee = builder.ins().iconst(pointer, dispatcher as i64);
            let sig_ref = builder.import_signature(dispatch_sig);
            builder.ins().call_indirect(sig_ref, callee, &[context, args, ret]);

            match shape.ret {
                Some(kind) => {
                    let value = builder.ins().stack_load(clif_type(kind, pointer), ret_slot, 0);
                    builder.ins().return_(&[value]);
                }
                None => {
                    builder.ins().return_(&[]);
                }
            }
            builder.finalize();
        }

        log::debug!("Compiling callback trampoline for {:?}", shape);
        self.define(sig)
    }

    fn define(&mut self, sig: Signature) -> Result<*const u8, BridgeError> {
        let id = match self.module.declare_anonymous_function(&sig) {
            Ok(id) => id,
            Err(e) => {
                self.module.clear_context(&mut self.ctx);
                return Err(e.into());
            }
        };
        let defined = self.module.define_function(id, &mut self.ctx);
        self.module.clear_context(&mut self.ctx);
        defined?;
        self.module.finalize_definitions()?;
        Ok(self.module.get_finalized_function(id))
    }
}
