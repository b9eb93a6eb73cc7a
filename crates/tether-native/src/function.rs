use crate::BridgeError;
use libloading::Library;
use std::fmt;
use std::sync::Arc;
use tether_layout::FnSignature;

/// A callable native address together with its declared signature.
///
/// Cheap to clone. When resolved from a [`crate::NativeLibrary`] it keeps the library
/// loaded for as long as any clone exists.
#[derive(Clone)]
pub struct FunctionRef {
    name: Option<Arc<str>>,
    address: usize,
    signature: Arc<FnSignature>,
    _library: Option<Arc<Library>>,
}

impl FunctionRef {
    pub(crate) fn resolved(
        name: &str,
        address: usize,
        signature: Arc<FnSignature>,
        library: Arc<Library>,
    ) -> Self {
        FunctionRef {
            name: Some(Arc::from(name)),
            address,
            signature,
            _library: Some(library),
        }
    }

    /// Wraps an address obtained elsewhere.
    ///
    /// # Safety
    ///
    /// `address` must point at code following the platform C calling convention with
    /// exactly `signature`, and must stay valid for the life of the returned value.
    pub unsafe fn from_address(address: usize, signature: FnSignature) -> Result<Self, BridgeError> {
        if address == 0 {
            return Err(BridgeError::NullFunction("<anonymous>".to_string()));
        }
        Ok(FunctionRef {
            name: None,
            address,
            signature: Arc::new(signature),
            _library: None,
        })
    }

    /// Gives an address-only ref a name for diagnostics.
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if known, otherwise the address.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => format!("{:#x}", self.address),
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn signature(&self) -> &Arc<FnSignature> {
        &self.signature
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRef")
            .field("name", &self.name)
            .field("address", &format_args!("{:#x}", self.address))
            .field("signature", &self.signature.to_string())
            .finish()
    }
}
