//! Dynamic library loading and cached symbol lookup.

use crate::{BridgeError, FunctionRef};
use libloading::Library;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::ffi::{c_void, CString};
use std::path::Path;
use std::sync::Arc;
use tether_layout::FnSignature;

/// A loaded native library.
pub struct NativeLibrary {
    library: Arc<Library>,
    /// Path or name the library was loaded from (for diagnostics)
    path: String,
    resolved: Mutex<FxHashMap<String, FunctionRef>>,
}

impl NativeLibrary {
    fn from_library(library: Library, path: String) -> Self {
        log::debug!("Loaded native library `{}`", path);
        NativeLibrary {
            library: Arc::new(library),
            path,
            resolved: Mutex::new(FxHashMap::default()),
        }
    }

    /// Loads a library from an exact path.
    ///
    /// Loading runs the library's initialisers; the caller vouches for them.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        // SAFETY: see above.
        let library = unsafe { Library::new(path) }.map_err(|e| BridgeError::LibraryLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::from_library(library, path.display().to_string()))
    }

    /// Loads a library by base name using the platform's file name convention
    /// (`libdemo.so`, `libdemo.dylib`, `demo.dll`), searching the system paths.
    pub fn open_by_name(name: &str) -> Result<Self, BridgeError> {
        let file_name = libloading::library_filename(name);
        Self::open(Path::new(&file_name)).map_err(|e| match e {
            BridgeError::LibraryLoad { message, .. } => BridgeError::LibraryLoad {
                path: format!("{} (as {})", name, file_name.to_string_lossy()),
                message,
            },
            other => other,
        })
    }

    /// The running executable and everything it has loaded, including libc.
    #[cfg(unix)]
    pub fn this() -> Self {
        let library: Library = libloading::os::unix::Library::this().into();
        Self::from_library(library, "<self>".to_string())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Looks up `name` and pairs it with `signature`.
    ///
    /// Results are cached per name; resolving a cached name again with a different
    /// signature is a [`BridgeError::SignatureMismatch`].
    pub fn resolve(&self, name: &str, signature: FnSignature) -> Result<FunctionRef, BridgeError> {
        let mut resolved = self.resolved.lock();
        if let Some(function) = resolved.get(name) {
            if **function.signature() != signature {
                return Err(BridgeError::SignatureMismatch {
                    function: name.to_string(),
                    reason: format!(
                        "already resolved as `{}`, requested `{}`",
                        function.signature(),
                        signature
                    ),
                });
            }
            return Ok(function.clone());
        }

        let address = self.lookup(name)?;
        let function = FunctionRef::resolved(name, address, Arc::new(signature), Arc::clone(&self.library));
        log::debug!("Resolved `{}` in `{}` at {:#x}", name, self.path, address);
        resolved.insert(name.to_string(), function.clone());
        Ok(function)
    }

    fn lookup(&self, name: &str) -> Result<usize, BridgeError> {
        let not_found = |message: String| BridgeError::SymbolNotFound {
            symbol: name.to_string(),
            library: self.path.clone(),
            message,
        };
        let c_name = CString::new(name).map_err(|_| not_found("invalid symbol name".to_string()))?;
        // SAFETY: the symbol is only read as an address, never called through this type.
        let symbol = unsafe { self.library.get::<*const c_void>(c_name.as_bytes_with_nul()) }
            .map_err(|e| not_found(e.to_string()))?;
        let address = *symbol as usize;
        if address == 0 {
            return Err(BridgeError::NullFunction(name.to_string()));
        }
        Ok(address)
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library() {
        let err = NativeLibrary::open("/definitely/not/here/libnothing.so").unwrap_err();
        assert!(matches!(err, BridgeError::LibraryLoad { .. }));
    }

    #[test]
    fn test_open_by_name_reports_file_name() {
        match NativeLibrary::open_by_name("tether_no_such_lib") {
            Err(BridgeError::LibraryLoad { path, .. }) => {
                assert!(path.contains("tether_no_such_lib"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
