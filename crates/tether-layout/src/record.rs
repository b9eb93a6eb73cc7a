use crate::descriptor::{FieldLayout, LayoutDescriptor};
use crate::helpers::{bits_to_bytes, field_to_repc, kind_to_repc, named_field, plain, repc_record_kind, round_up};
use crate::kind::Kind;
use crate::schema::{Field, Schema};
use crate::{LayoutComputer, SchemaError};
use repc::layout::{Record, TypeVariant};
use std::collections::HashSet;

impl LayoutComputer {
    /// Computes the layout of a struct or union schema.
    pub(crate) fn compute_record_layout(&self, schema: &Schema) -> Result<LayoutDescriptor, SchemaError> {
        validate(schema)?;

        let mut repc_fields = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            repc_fields.push(named_field(field_to_repc(&field.kind, field.count)?));
        }
        let record_type = plain(TypeVariant::Record(Record {
            kind: repc_record_kind(schema.kind()),
            fields: repc_fields,
        }));

        let computed = repc::compute_layout(self.target, &record_type)?;
        let repc_record = match computed.variant {
            TypeVariant::Record(record) => record,
            _ => return Err(SchemaError::Other("Expected record type".to_string())),
        };

        let mut fields = Vec::with_capacity(schema.fields().len());
        for (field, computed_field) in schema.fields().iter().zip(repc_record.fields.iter()) {
            let placement = computed_field.layout.ok_or_else(|| {
                SchemaError::Other(format!("No placement computed for field `{}`", field.name))
            })?;
            let (size_bytes, align_bytes) = self.element_size_align(&field.kind)?;
            fields.push(FieldLayout {
                name: field.name.clone(),
                kind: field.kind.clone(),
                offset: bits_to_bytes(placement.offset_bits),
                size_bytes,
                align_bytes,
                count: field.count,
                stride_bytes: round_up(size_bytes, align_bytes),
            });
        }

        let descriptor = LayoutDescriptor {
            name: schema.name().to_string(),
            kind: schema.kind(),
            size_bytes: bits_to_bytes(computed.layout.size_bits),
            align_bytes: bits_to_bytes(computed.layout.field_alignment_bits).max(1),
            fields: fields.into_boxed_slice(),
        };
        log::debug!(
            "Computed layout for `{}`: size {} align {} ({} fields)",
            descriptor.name,
            descriptor.size_bytes,
            descriptor.align_bytes,
            descriptor.fields.len()
        );
        Ok(descriptor)
    }

    /// Size and alignment of a single element of `kind`.
    fn element_size_align(&self, kind: &Kind) -> Result<(usize, usize), SchemaError> {
        if let Kind::Record(layout) = kind {
            return Ok((layout.size_bytes(), layout.align_bytes()));
        }
        let element = repc::compute_layout(self.target, &kind_to_repc(kind)?)?;
        Ok((
            bits_to_bytes(element.layout.size_bits),
            bits_to_bytes(element.layout.field_alignment_bits).max(1),
        ))
    }
}

fn validate(schema: &Schema) -> Result<(), SchemaError> {
    if schema.fields().is_empty() {
        return Err(SchemaError::Empty(schema.name().to_string()));
    }
    let mut seen = HashSet::new();
    for Field { name, kind, count } in schema.fields() {
        if name.is_empty() {
            return Err(SchemaError::EmptyFieldName(schema.name().to_string()));
        }
        if !seen.insert(name.as_str()) {
            return Err(SchemaError::DuplicateField {
                schema: schema.name().to_string(),
                field: name.clone(),
            });
        }
        if *kind == Kind::Void {
            return Err(SchemaError::UnsupportedKind {
                schema: schema.name().to_string(),
                field: name.clone(),
                kind: kind.to_string(),
            });
        }
        if *count == Some(0) {
            return Err(SchemaError::InvalidArrayLength {
                schema: schema.name().to_string(),
                field: name.clone(),
            });
        }
    }
    Ok(())
}
