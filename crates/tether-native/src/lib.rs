//! Native side of the boundary: JIT-compiled call thunks, callback trampolines and
//! symbol resolution.
//!
//! ```no_run
//! use tether_layout::{FnSignature, Kind, ScalarKind};
//! use tether_marshal::{Arg, ScalarValue};
//! use tether_native::{Bridge, NativeLibrary};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bridge = Bridge::new()?;
//! let libc = NativeLibrary::this();
//! let abs = libc.resolve(
//!     "abs",
//!     FnSignature::new(vec![Kind::Scalar(ScalarKind::I32)], Kind::Scalar(ScalarKind::I32))?,
//! )?;
//! let result = bridge.invoke(&abs, &[Arg::Value(ScalarValue::I32(-3))])?;
//! assert_eq!(result, Some(ScalarValue::I32(3)));
//! # Ok(())
//! # }
//! ```

mod abi;
mod bridge;
mod config;
mod error;
mod fault;
mod function;
mod jit;
mod library;
mod trampoline;

pub use bridge::Bridge;
pub use config::{BridgeConfig, OptLevel};
pub use error::BridgeError;
pub use function::FunctionRef;
pub use library::NativeLibrary;
pub use trampoline::Trampolines;
