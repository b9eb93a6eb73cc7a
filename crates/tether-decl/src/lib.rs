//! TOML declarations of native records, callback types and function signatures.
//!
//! ```toml
//! library = "./libdemo.so"
//!
//! [constants]
//! FOO = "1 << 2"
//! BAR = "FOO + 10"
//!
//! [[enum]]
//! name = "some_values"
//! values = ["a_value", "another_value", { name = "xx", value = "another_value + 100" }]
//!
//! [[struct]]
//! name = "my_point"
//! fields = [
//!   { name = "x", type = "unsigned long" },
//!   { name = "a", type = "int", count = "BAR + 1" },
//!   { name = "proc1", type = "fn(int, *int) -> unsigned long" },
//! ]
//!
//! [callbacks]
//! cproc = "fn(int, int) -> int"
//!
//! [functions]
//! do_something = "fn(*my_point, char) -> int"
//! ```

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tether_layout::{FnSignature, LayoutDescriptor, SchemaError};
use tether_native::BridgeConfig;
use thiserror::Error;

mod raw;
mod resolve;
mod syntax;

use raw::RawFile;
use resolve::Resolver;

#[derive(Error, Debug, Diagnostic)]
pub enum DeclError {
    #[error("Failed to read `{path}`: {source}")]
    #[diagnostic(code("DECL-001"))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid declaration file: {0}")]
    #[diagnostic(
        code("DECL-002"),
        help("Check the TOML syntax and the table names: library, native, constants, enum, struct, union, callbacks, functions")
    )]
    Toml(#[from] toml::de::Error),

    #[error("Syntax error in `{item}`: {message}")]
    #[diagnostic(code("DECL-003"))]
    Syntax { item: String, message: String },

    #[error("Unknown type `{name}` in `{item}`")]
    #[diagnostic(
        code("DECL-004"),
        help("Types are scalar names (i32, unsigned long, double, ...), void, *T, fn(...) -> T, or declared records and callbacks")
    )]
    UnknownType { item: String, name: String },

    #[error("Unknown constant `{name}` in `{item}`")]
    #[diagnostic(code("DECL-005"))]
    UnknownConstant { item: String, name: String },

    #[error("`{0}` is declared more than once")]
    #[diagnostic(code("DECL-006"))]
    Duplicate(String),

    #[error("`{0}` depends on itself")]
    #[diagnostic(code("DECL-007"), help("Use a pointer to refer to a record from inside itself"))]
    Cycle(String),

    #[error("Invalid layout for `{item}`: {source}")]
    #[diagnostic(code("DECL-008"))]
    Schema {
        item: String,
        #[source]
        source: SchemaError,
    },

    #[error("Invalid `{item}`: {message}")]
    #[diagnostic(code("DECL-009"))]
    Invalid { item: String, message: String },
}

/// A fully resolved declaration file.
#[derive(Debug, Clone)]
pub struct Declarations {
    library: Option<PathBuf>,
    native: BridgeConfig,
    constants: BTreeMap<String, i64>,
    /// Enum members with their values, in declaration order.
    enums: BTreeMap<String, Vec<(String, i64)>>,
    /// Declaration order: structs first, then unions.
    record_order: Vec<String>,
    records: FxHashMap<String, Arc<LayoutDescriptor>>,
    callbacks: BTreeMap<String, Arc<FnSignature>>,
    functions: BTreeMap<String, FnSignature>,
}

impl Declarations {
    /// Reads and resolves `path`. A relative `library` path with a directory part
    /// (`./libdemo.so`) is taken relative to the file; a bare file name is left for
    /// the system search path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeclError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DeclError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut decls = Self::parse(&content)?;
        if let (Some(library), Some(dir)) = (&decls.library, path.parent()) {
            if library.is_relative() && library.components().count() > 1 {
                decls.library = Some(dir.join(library));
            }
        }
        log::debug!(
            "Loaded `{}`: {} records, {} functions",
            path.display(),
            decls.record_order.len(),
            decls.functions.len()
        );
        Ok(decls)
    }

    /// Resolves declarations from TOML text.
    pub fn parse(content: &str) -> Result<Self, DeclError> {
        let raw: RawFile = toml::from_str(content)?;
        let mut resolver = Resolver::new(&raw)?;

        for name in raw.constants.keys() {
            resolver.constant(name)?;
        }
        let mut enums = BTreeMap::new();
        for raw_enum in &raw.enums {
            let mut members = Vec::with_capacity(raw_enum.values.len());
            for member in &raw_enum.values {
                let name = member.name();
                let value = resolver.constant(name)?.ok_or_else(|| DeclError::UnknownConstant {
                    item: raw_enum.name.clone(),
                    name: name.to_string(),
                })?;
                members.push((name.to_string(), value));
            }
            enums.insert(raw_enum.name.clone(), members);
        }
        let mut record_order = Vec::new();
        for record in raw.structs.iter().chain(&raw.unions) {
            resolver.record(&record.name)?;
            record_order.push(record.name.clone());
        }
        for name in raw.callbacks.keys() {
            resolver.callback(name)?;
        }
        let mut functions = BTreeMap::new();
        for (name, src) in &raw.functions {
            let signature = resolver.signature_str(name, src)?;
            functions.insert(name.clone(), signature);
        }

        let (constants, records, callbacks) = resolver.into_parts();
        Ok(Declarations {
            library: raw.library.as_ref().map(PathBuf::from),
            native: raw.native.clone().unwrap_or_default(),
            constants: constants.into_iter().collect(),
            enums,
            record_order,
            records,
            callbacks: callbacks.into_iter().collect(),
            functions,
        })
    }

    pub fn library(&self) -> Option<&Path> {
        self.library.as_deref()
    }

    pub fn native(&self) -> &BridgeConfig {
        &self.native
    }

    pub fn constant(&self, name: &str) -> Option<i64> {
        self.constants.get(name).copied()
    }

    /// Members of the enum `name` and their values, in declaration order.
    pub fn enumeration(&self, name: &str) -> Option<&[(String, i64)]> {
        self.enums.get(name).map(Vec::as_slice)
    }

    pub fn record(&self, name: &str) -> Option<&Arc<LayoutDescriptor>> {
        self.records.get(name)
    }

    /// Records in declaration order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<LayoutDescriptor>> + '_ {
        self.record_order.iter().filter_map(|name| self.records.get(name))
    }

    pub fn callback(&self, name: &str) -> Option<&Arc<FnSignature>> {
        self.callbacks.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FnSignature> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, &FnSignature)> + '_ {
        self.functions.iter().map(|(name, sig)| (name.as_str(), sig))
    }
}
