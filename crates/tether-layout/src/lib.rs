//! Deterministic C layout of declared record schemas.
//!
//! A [`Schema`] is an ordered list of typed fields; [`describe`] turns it into a
//! [`LayoutDescriptor`] holding per-field offsets, sizes and the record's alignment,
//! computed with the host target's aggregate rules.

use repc::Target;
use thiserror::Error;

mod descriptor;
mod helpers;
mod kind;
mod record;
mod schema;

pub use descriptor::{CallbackSite, FieldLayout, LayoutDescriptor, ResolvedField};
pub use kind::{AbiShape, FnSignature, Kind, Pointee, ScalarKind};
pub use schema::{Field, RecordKind, Schema};

/// Errors raised while validating or laying out a schema or signature.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema `{0}` declares no fields")]
    Empty(String),

    #[error("Schema `{0}` has a field with an empty name")]
    EmptyFieldName(String),

    #[error("Field `{field}` is declared twice in `{schema}`")]
    DuplicateField { schema: String, field: String },

    #[error("Field `{field}` of `{schema}` has unsupported kind `{kind}`")]
    UnsupportedKind {
        schema: String,
        field: String,
        kind: String,
    },

    #[error("Field `{field}` of `{schema}` has a non-positive array length")]
    InvalidArrayLength { schema: String, field: String },

    #[error("Unsupported kind `{kind}` for {position} of a function signature")]
    UnsupportedSignature { position: String, kind: String },

    #[error("Layout computation failed: {0}")]
    Repc(#[from] repc::Error),

    #[error("No layout target is known for this host")]
    UnsupportedHost,

    #[error("Other layout error: {0}")]
    Other(String),
}

/// Computes record layouts for one target.
#[derive(Clone, Copy)]
pub struct LayoutComputer {
    target: Target,
}

impl LayoutComputer {
    pub fn new(target: Target) -> Self {
        LayoutComputer { target }
    }

    /// A computer for the target this process runs on.
    pub fn host() -> Result<Self, SchemaError> {
        repc::HOST_TARGET
            .map(LayoutComputer::new)
            .ok_or(SchemaError::UnsupportedHost)
    }

    /// Validates `schema` and computes its layout.
    pub fn describe(&self, schema: &Schema) -> Result<LayoutDescriptor, SchemaError> {
        self.compute_record_layout(schema)
    }
}

/// Computes the host layout of `schema`.
///
/// Fails with [`SchemaError`] when the schema is empty, a field is `void`, a name is
/// empty or repeated, or an array length is zero.
pub fn describe(schema: &Schema) -> Result<LayoutDescriptor, SchemaError> {
    LayoutComputer::host()?.describe(schema)
}
