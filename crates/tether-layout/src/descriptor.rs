use crate::kind::{FnSignature, Kind};
use crate::schema::RecordKind;
use std::sync::Arc;

/// Placement of a single field inside its record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub kind: Kind,
    /// Byte offset from the start of the enclosing record.
    pub offset: usize,
    /// Size in bytes of one element.
    pub size_bytes: usize,
    /// Alignment in bytes of one element.
    pub align_bytes: usize,
    /// `Some(n)` for arrays.
    pub count: Option<usize>,
    /// Distance in bytes between consecutive array elements.
    pub stride_bytes: usize,
}

impl FieldLayout {
    pub fn is_array(&self) -> bool {
        self.count.is_some()
    }

    /// Number of elements (1 for non-arrays).
    pub fn len(&self) -> usize {
        self.count.unwrap_or(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes covered by the whole field, all elements included.
    pub fn total_size_bytes(&self) -> usize {
        match self.count {
            Some(count) => self.stride_bytes * count,
            None => self.size_bytes,
        }
    }

    /// Offset of element `index` relative to the start of the field.
    pub fn element_offset(&self, index: usize) -> Option<usize> {
        (index < self.len()).then(|| index * self.stride_bytes)
    }
}

/// A field located by path, with its absolute offset from the outermost record.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField<'a> {
    pub offset: usize,
    pub field: &'a FieldLayout,
}

/// A function-pointer slot reachable inside a record.
#[derive(Debug, Clone)]
pub struct CallbackSite {
    /// Dotted path of the callback field (intermediate record arrays carry `[i]`).
    pub path: String,
    /// Element index when the callback field itself is an array.
    pub index: Option<usize>,
    /// Absolute byte offset of the slot.
    pub offset: usize,
    pub signature: Arc<FnSignature>,
    /// True when any enclosing record is a union.
    pub in_union: bool,
}

/// Computed memory layout of a record, matching the host's C aggregate rules.
///
/// Immutable once computed; the single source of truth for offsets on both sides of
/// the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDescriptor {
    pub(crate) name: String,
    pub(crate) kind: RecordKind,
    pub(crate) size_bytes: usize,
    pub(crate) align_bytes: usize,
    pub(crate) fields: Box<[FieldLayout]>,
}

impl LayoutDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn align_bytes(&self) -> usize {
        self.align_bytes
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by dotted path, e.g. `"origin.x"` or `"points[2].x"`.
    ///
    /// Every segment but the last must name an embedded record; array segments must
    /// carry an in-range index. The last segment never carries an index.
    pub fn resolve(&self, path: &str) -> Option<ResolvedField<'_>> {
        let mut current = self;
        let mut base = 0usize;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let (name, index) = parse_segment(segment)?;
            let field = current.field(name)?;

            if segments.peek().is_none() {
                if index.is_some() {
                    return None;
                }
                return Some(ResolvedField {
                    offset: base + field.offset,
                    field,
                });
            }

            let Kind::Record(inner) = &field.kind else {
                return None;
            };
            let element = match (field.count, index) {
                (Some(_), Some(i)) => field.element_offset(i)?,
                (None, None) => 0,
                _ => return None,
            };
            base += field.offset + element;
            current = inner.as_ref();
        }
        None
    }

    /// Every callback slot in this record, nested records included, in layout order.
    pub fn callback_sites(&self) -> Vec<CallbackSite> {
        let mut sites = Vec::new();
        collect_callback_sites(self, 0, "", false, &mut sites);
        sites
    }
}

fn parse_segment(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.find('[') {
        Some(open) => {
            let close = segment.strip_suffix(']')?;
            let index = close[open + 1..].trim().parse().ok()?;
            Some((&segment[..open], Some(index)))
        }
        None => Some((segment, None)),
    }
}

fn collect_callback_sites(
    layout: &LayoutDescriptor,
    base: usize,
    prefix: &str,
    in_union: bool,
    sites: &mut Vec<CallbackSite>,
) {
    let in_union = in_union || layout.kind == RecordKind::Union;
    for field in layout.fields.iter() {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        match &field.kind {
            Kind::Callback(signature) => {
                for i in 0..field.len() {
                    sites.push(CallbackSite {
                        path: path.clone(),
                        index: field.count.map(|_| i),
                        offset: base + field.offset + i * field.stride_bytes,
                        signature: Arc::clone(signature),
                        in_union,
                    });
                }
            }
            Kind::Record(inner) => {
                for i in 0..field.len() {
                    let element_path = match field.count {
                        Some(_) => format!("{}[{}]", path, i),
                        None => path.clone(),
                    };
                    collect_callback_sites(
                        inner,
                        base + field.offset + i * field.stride_bytes,
                        &element_path,
                        in_union,
                        sites,
                    );
                }
            }
            _ => {}
        }
    }
}
