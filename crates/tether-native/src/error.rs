use cranelift_codegen::settings::SetError;
use tether_layout::SchemaError;
use tether_marshal::{MarshalError, SlotState};
use thiserror::Error;

/// Errors raised while resolving, validating or performing native calls.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Signature mismatch calling `{function}`: {reason}")]
    SignatureMismatch { function: String, reason: String },

    #[error("Symbol `{symbol}` not found in `{library}`: {message}")]
    SymbolNotFound {
        symbol: String,
        library: String,
        message: String,
    },

    #[error("Failed to load library `{path}`: {message}")]
    LibraryLoad { path: String, message: String },

    #[error("Native code called callback slot `{slot}` while it was {state:?}")]
    DanglingCallback { slot: String, state: SlotState },

    #[error("Callback handler for `{slot}` panicked: {message}")]
    CallbackPanicked { slot: String, message: String },

    #[error("Callback handler for `{slot}` returned {found}, expected {expected}")]
    CallbackResult {
        slot: String,
        expected: String,
        found: String,
    },

    #[error("Function address for `{0}` is null")]
    NullFunction(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Marshal(MarshalError),

    #[error("Failed during module processing: {0}")]
    Module(#[from] cranelift_module::ModuleError),

    #[error("Failed to configure Cranelift settings: {0}")]
    Settings(#[from] SetError),

    #[error("ISA setup failed: {0}")]
    IsaSetup(String),
}

impl From<MarshalError> for BridgeError {
    fn from(err: MarshalError) -> Self {
        match err {
            MarshalError::DanglingCallback { slot, state } => BridgeError::DanglingCallback { slot, state },
            other => BridgeError::Marshal(other),
        }
    }
}
