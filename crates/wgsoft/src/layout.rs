//! Structured buffers: a named-field layout over a flat word array.
//!
//! A [`StructLayout`] maps field names to semantic types and assigns offsets
//! respecting per-type alignment (in 4-byte words: scalars 1, 2-vectors 2,
//! 3/4-vectors and matrix rows 4). The same layout drives both the host-side
//! byte packer ([`StructuredBuffer`]) and the WGSL struct emitted by
//! [`StructLayout::to_wgsl`], so host and device agree on offsets by
//! construction and a packed buffer is portable between them.

use nalgebra::{Vector3, Vector4};

/// Semantic type of a structured-buffer field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// One f32 word.
    F32,
    /// Two f32 words, 2-word alignment.
    Vec2,
    /// Three f32 words, 4-word alignment.
    Vec3,
    /// Four f32 words, 4-word alignment.
    Vec4,
    /// Quaternion stored as a vec4 `(x, y, z, w)`.
    Quat,
    /// 3×3 matrix stored as three vec4-aligned rows (12 words).
    Mat3,
    /// One i32 word.
    I32,
    /// Two i32 words, 2-word alignment.
    IVec2,
    /// Four i32 words, 4-word alignment.
    IVec4,
}

impl FieldKind {
    /// Size in 4-byte words.
    pub fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 1,
            Self::Vec2 | Self::IVec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Quat | Self::IVec4 => 4,
            Self::Mat3 => 12,
        }
    }

    /// Alignment in 4-byte words.
    pub fn align(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 1,
            Self::Vec2 | Self::IVec2 => 2,
            _ => 4,
        }
    }

    fn wgsl_type(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Vec4 | Self::Quat => "vec4<f32>",
            Self::Mat3 => "mat3x3<f32>",
            Self::I32 => "i32",
            Self::IVec2 => "vec2<i32>",
            Self::IVec4 => "vec4<i32>",
        }
    }
}

/// A resolved field: its kind and word offset inside the struct.
#[derive(Copy, Clone, Debug)]
pub struct Field {
    /// Semantic type.
    pub kind: FieldKind,
    /// Offset from the start of the record, in words.
    pub offset: usize,
}

/// A named-field record layout.
#[derive(Clone, Debug)]
pub struct StructLayout {
    fields: Vec<(&'static str, Field)>,
    stride: usize,
}

impl StructLayout {
    /// Builds a layout from `(name, kind)` pairs, assigning aligned offsets
    /// in declaration order. The stride is padded to a multiple of 4 words.
    pub fn new(fields: &[(&'static str, FieldKind)]) -> Self {
        let mut resolved = Vec::with_capacity(fields.len());
        let mut cursor = 0usize;
        for &(name, kind) in fields {
            let align = kind.align();
            cursor = cursor.div_ceil(align) * align;
            resolved.push((name, Field { kind, offset: cursor }));
            cursor += kind.size();
        }
        let stride = cursor.div_ceil(4) * 4;
        Self {
            fields: resolved,
            stride,
        }
    }

    /// Record stride in words.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Record stride in bytes.
    pub fn stride_bytes(&self) -> usize {
        self.stride * 4
    }

    /// Looks up a field by name.
    ///
    /// # Panics
    ///
    /// Panics on an unknown name; layouts are static data, so a miss is a
    /// programming error.
    pub fn field(&self, name: &str) -> Field {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
            .unwrap_or_else(|| panic!("unknown structured-buffer field `{name}`"))
    }

    /// Byte offset of a field at a given record index.
    pub fn byte_offset(&self, index: usize, name: &str) -> usize {
        (index * self.stride + self.field(name).offset) * 4
    }

    /// Emits the equivalent WGSL struct declaration.
    ///
    /// Explicit `_pad` members fill every alignment hole and the tail, so
    /// the natural WGSL storage layout of the emitted struct reproduces the
    /// host offsets exactly.
    pub fn to_wgsl(&self, name: &str) -> String {
        use std::fmt::Write;
        let mut out = format!("struct {name} {{\n");
        let mut cursor = 0usize;
        let mut pads = 0usize;
        for (field_name, field) in &self.fields {
            while cursor < field.offset {
                let _ = writeln!(out, "    _pad{pads}: f32,");
                pads += 1;
                cursor += 1;
            }
            let _ = writeln!(out, "    {}: {},", field_name, field.kind.wgsl_type());
            cursor += field.kind.size();
        }
        while cursor < self.stride {
            let _ = writeln!(out, "    _pad{pads}: f32,");
            pads += 1;
            cursor += 1;
        }
        out.push_str("};\n");
        out
    }
}

/// A host-side array of records packed according to a [`StructLayout`].
///
/// Storage is a flat array of 4-byte words; f32 and i32 fields are written
/// as raw bits, so the memory image matches the device view byte for byte.
#[derive(Clone, Debug)]
pub struct StructuredBuffer {
    layout: StructLayout,
    len: usize,
    words: Vec<u32>,
}

impl StructuredBuffer {
    /// Allocates `len` zeroed records.
    pub fn new(layout: StructLayout, len: usize) -> Self {
        let words = vec![0u32; layout.stride * len];
        Self { layout, len, words }
    }

    /// The layout of one record.
    pub fn layout(&self) -> &StructLayout {
        &self.layout
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the buffer holds no record.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The raw word image.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Mutable access to the raw word image.
    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    /// The raw byte image.
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    #[inline]
    fn word(&self, index: usize, field: Field, lane: usize) -> u32 {
        self.words[index * self.layout.stride + field.offset + lane]
    }

    #[inline]
    fn set_word(&mut self, index: usize, field: Field, lane: usize, value: u32) {
        self.words[index * self.layout.stride + field.offset + lane] = value;
    }

    /// Writes an f32 field.
    pub fn set_f32(&mut self, index: usize, field: Field, value: f32) {
        self.set_word(index, field, 0, value.to_bits());
    }

    /// Reads an f32 field.
    pub fn get_f32(&self, index: usize, field: Field) -> f32 {
        f32::from_bits(self.word(index, field, 0))
    }

    /// Writes an i32 field.
    pub fn set_i32(&mut self, index: usize, field: Field, value: i32) {
        self.set_word(index, field, 0, value as u32);
    }

    /// Reads an i32 field.
    pub fn get_i32(&self, index: usize, field: Field) -> i32 {
        self.word(index, field, 0) as i32
    }

    /// Writes a vec3 field.
    pub fn set_vec3(&mut self, index: usize, field: Field, value: Vector3<f32>) {
        for lane in 0..3 {
            self.set_word(index, field, lane, value[lane].to_bits());
        }
    }

    /// Reads a vec3 field.
    pub fn get_vec3(&self, index: usize, field: Field) -> Vector3<f32> {
        Vector3::new(
            f32::from_bits(self.word(index, field, 0)),
            f32::from_bits(self.word(index, field, 1)),
            f32::from_bits(self.word(index, field, 2)),
        )
    }

    /// Writes a vec4 (or quaternion) field.
    pub fn set_vec4(&mut self, index: usize, field: Field, value: Vector4<f32>) {
        for lane in 0..4 {
            self.set_word(index, field, lane, value[lane].to_bits());
        }
    }

    /// Reads a vec4 (or quaternion) field.
    pub fn get_vec4(&self, index: usize, field: Field) -> Vector4<f32> {
        Vector4::new(
            f32::from_bits(self.word(index, field, 0)),
            f32::from_bits(self.word(index, field, 1)),
            f32::from_bits(self.word(index, field, 2)),
            f32::from_bits(self.word(index, field, 3)),
        )
    }

    /// Writes one lane of an ivec4 field.
    pub fn set_ivec4_lane(&mut self, index: usize, field: Field, lane: usize, value: i32) {
        self.set_word(index, field, lane, value as u32);
    }

    /// Reads one lane of an ivec4 field.
    pub fn get_ivec4_lane(&self, index: usize, field: Field, lane: usize) -> i32 {
        self.word(index, field, lane) as i32
    }
}
