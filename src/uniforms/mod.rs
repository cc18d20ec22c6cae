//! Host-side uniform packing.
//!
//! Kernel parameters are declared as a tree of [`UniformValue`]s, flattened
//! into a [`UniformTable`] of dotted names with byte offsets computed under
//! std140-style rules, and owned per operation by a [`UniformBlock`] that
//! repacks and uploads on demand. The computed offsets must agree
//! field-for-field with the parameter struct of the generated kernel source;
//! the packing rule is therefore wire format, not an implementation detail.
//!
//! Packing rule, in declaration order:
//! - a scalar occupies 1 slot at the current position;
//! - a 2-component vector aligns to the next even slot and occupies 2;
//! - a 3- or 4-component vector aligns to the next multiple-of-4 slot and
//!   occupies 4 (the trailing slot of a vec3 is unused);
//! - after a nested record is flattened, its last leaf absorbs the padding
//!   that brings the record's length up to a multiple of 4;
//! - the total length is rounded up to a multiple of 4.
//!
//! One slot is one `f32` (4 bytes).

use crate::errors::{TensorOpError, TensorOpResult};

/// Round up to the next even slot.
pub(crate) fn pad2(n: usize) -> usize {
    n + (n % 2)
}

/// Round up to the next multiple-of-4 slot.
pub(crate) fn pad4(n: usize) -> usize {
    n + ((4 - (n % 4)) % 4)
}

/// A typed uniform value: a scalar, a fixed-size vector, or a named group of
/// further values. A `Record` is only a grouping; it contributes no slots
/// itself, only its non-record leaves do.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Record(Vec<(String, UniformValue)>),
}

impl UniformValue {
    /// Builds a record from `(name, value)` pairs.
    pub fn record<S: Into<String>>(fields: impl IntoIterator<Item = (S, UniformValue)>) -> Self {
        UniformValue::Record(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Number of slots this value occupies, before alignment. A `Vec3` is
    /// stored as four slots; a record sums its leaves.
    fn slot_len(&self) -> usize {
        match self {
            UniformValue::Scalar(_) => 1,
            UniformValue::Vec2(_) => 2,
            UniformValue::Vec3(_) | UniformValue::Vec4(_) => 4,
            UniformValue::Record(fields) => fields.iter().map(|(_, v)| v.slot_len()).sum(),
        }
    }

    /// Writes this leaf's components at the start of `out`.
    fn write_slots(&self, out: &mut [f32]) {
        match self {
            UniformValue::Scalar(v) => out[0] = *v,
            UniformValue::Vec2(v) => out[..2].copy_from_slice(v),
            UniformValue::Vec3(v) => out[..3].copy_from_slice(v),
            UniformValue::Vec4(v) => out[..4].copy_from_slice(v),
            UniformValue::Record(_) => unreachable!("records are flattened before packing"),
        }
    }
}

/// One flattened leaf: dotted name, current value, slot offset, and the
/// padding appended after it to keep enclosing records 4-slot aligned.
#[derive(Debug, Clone)]
struct UniformEntry {
    name: String,
    value: UniformValue,
    offset: usize,
    extra_padding: usize,
}

/// Ordered table of flattened leaves with computed offsets.
#[derive(Debug, Clone)]
pub struct UniformTable {
    entries: Vec<UniformEntry>,
    len: usize,
}

impl UniformTable {
    /// Flattens a declaration list into a table. Nested records expand in
    /// place; their leaves get dotted names (`group.field`).
    pub fn build(fields: &[(String, UniformValue)]) -> Self {
        let mut entries = Vec::new();
        flatten(fields, "", &mut entries);
        let len = assign_offsets(&mut entries);
        Self { entries, len }
    }

    /// Total packed length in slots, always a multiple of 4.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, offset, slots)` for every leaf, in declaration order.
    pub fn layout(&self) -> Vec<(&str, usize, usize)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.offset, e.value.slot_len()))
            .collect()
    }

    /// Replaces the value of the named leaf. The kind of a leaf is fixed at
    /// construction; changing it is a caller bug.
    pub fn set(&mut self, name: &str, value: UniformValue) -> TensorOpResult<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| TensorOpError::UnknownUniform {
                name: name.to_string(),
            })?;
        assert_eq!(
            std::mem::discriminant(&entry.value),
            std::mem::discriminant(&value),
            "uniform {name} changed kind"
        );
        entry.value = value;
        Ok(())
    }

    /// Copies every leaf's current value to its offset. `out` must hold at
    /// least [`Self::len`] slots.
    pub fn pack_into(&self, out: &mut [f32]) {
        for entry in &self.entries {
            entry.value.write_slots(&mut out[entry.offset..]);
        }
    }
}

fn flatten(fields: &[(String, UniformValue)], prefix: &str, entries: &mut Vec<UniformEntry>) {
    for (name, value) in fields {
        let full_name = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match value {
            UniformValue::Record(children) => {
                flatten(children, &full_name, entries);
                // The record's last leaf absorbs the padding that closes the
                // record on a 4-slot boundary. Accumulated, so that nested
                // records compose.
                let record_len = value.slot_len();
                if let Some(last) = entries.last_mut() {
                    last.extra_padding += pad4(record_len) - record_len;
                }
            }
            leaf => entries.push(UniformEntry {
                name: full_name,
                value: leaf.clone(),
                offset: 0,
                extra_padding: 0,
            }),
        }
    }
}

fn assign_offsets(entries: &mut [UniformEntry]) -> usize {
    let mut offset = 0;
    for entry in entries.iter_mut() {
        match entry.value.slot_len() {
            1 => {
                entry.offset = offset;
                offset += 1;
            }
            2 => {
                entry.offset = pad2(offset);
                offset = entry.offset + 2;
            }
            _ => {
                entry.offset = pad4(offset);
                offset = entry.offset + 4;
            }
        }
        offset += entry.extra_padding;
    }
    pad4(offset)
}

/// A uniform table bound to GPU memory: the flattened table, a contiguous
/// backing buffer, and one uniform buffer handle. Owned by an operation and
/// destroyed with it.
pub struct UniformBlock {
    table: UniformTable,
    data: Vec<f32>,
    buffer: wgpu::Buffer,
}

impl UniformBlock {
    pub fn new(device: &wgpu::Device, label: &str, fields: &[(String, UniformValue)]) -> Self {
        let table = UniformTable::build(fields);
        let data = vec![0.0; table.len()];
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (table.len() * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            table,
            data,
            buffer,
        }
    }

    pub fn set(&mut self, name: &str, value: UniformValue) -> TensorOpResult<()> {
        self.table.set(name, value)
    }

    pub fn set_scalar(&mut self, name: &str, value: f32) -> TensorOpResult<()> {
        self.table.set(name, UniformValue::Scalar(value))
    }

    pub fn set_vec4(&mut self, name: &str, value: [f32; 4]) -> TensorOpResult<()> {
        self.table.set(name, UniformValue::Vec4(value))
    }

    /// Repacks every value into the backing buffer and uploads it.
    pub fn write(&mut self, queue: &wgpu::Queue) {
        self.table.pack_into(&mut self.data);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&self.data));
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}
