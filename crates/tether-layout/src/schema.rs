use crate::kind::Kind;

/// Whether members are laid out one after another or all at offset zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Struct,
    Union,
}

/// One declared member of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: Kind,
    /// `Some(n)` for a fixed-size array of `n` elements.
    pub count: Option<usize>,
}

/// Declared shape of a native aggregate, in declaration order.
///
/// Nothing is validated until the schema is passed to [`crate::describe`].
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    kind: RecordKind,
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: impl Into<String>, kind: RecordKind) -> Self {
        Schema {
            name: name.into(),
            kind,
            fields: Vec::new(),
        }
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Schema::new(name, RecordKind::Struct)
    }

    pub fn union(name: impl Into<String>) -> Self {
        Schema::new(name, RecordKind::Union)
    }

    /// Appends a single-element field.
    pub fn field(mut self, name: impl Into<String>, kind: Kind) -> Self {
        self.fields.push(Field {
            name: name.into(),
            kind,
            count: None,
        });
        self
    }

    /// Appends a fixed-size array field.
    pub fn array(mut self, name: impl Into<String>, kind: Kind, count: usize) -> Self {
        self.fields.push(Field {
            name: name.into(),
            kind,
            count: Some(count),
        });
        self
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}
