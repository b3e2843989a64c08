//! Attribute binding table.
//!
//! A vertex array names one vertex buffer, an optional index buffer and
//! up to [`MAX_BINDINGS`] attribute bindings. It stores no vertex data of
//! its own; shaders resolve byte offsets through [`offset`] and read the
//! bytes from the bound buffer.
//!
//! [`offset`]: VertexArray::offset

use crate::context::{IndexBufferId, VertexBufferId};
use crate::error::RenderError;

/// Attribute slots per vertex array.
pub const MAX_BINDINGS: usize = 16;

/// Scalar type of one attribute component.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AttribKind {
    U8,
    U16,
    U32,
    #[default]
    F32,
    F64,
}

impl AttribKind {
    pub const fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// One attribute: where it starts, how far apart consecutive vertices
/// are, and its component layout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AttribBinding {
    pub offset: usize,
    pub stride: usize,
    pub components: u8,
    pub kind: AttribKind,
}

#[derive(Clone, Debug, Default)]
pub struct VertexArray {
    vbo: Option<VertexBufferId>,
    ibo: Option<IndexBufferId>,
    bindings: Vec<AttribBinding>,
}

impl VertexArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the single vertex buffer every attribute reads from.
    pub fn set_vertex_buffer(&mut self, vbo: VertexBufferId) {
        self.vbo = Some(vbo);
    }

    pub fn vertex_buffer(&self) -> Option<VertexBufferId> {
        self.vbo
    }

    pub fn set_index_buffer(&mut self, ibo: IndexBufferId) {
        self.ibo = Some(ibo);
    }

    pub fn clear_index_buffer(&mut self) {
        self.ibo = None;
    }

    pub fn index_buffer(&self) -> Option<IndexBufferId> {
        self.ibo
    }

    /// Sizes the binding table. Existing bindings within the new count
    /// are kept.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `count` exceeds [`MAX_BINDINGS`].
    pub fn set_num_bindings(&mut self, count: usize) -> Result<(), RenderError> {
        if count > MAX_BINDINGS {
            return Err(RenderError::InvalidArgument);
        }

        self.bindings.resize(count, AttribBinding::default());
        Ok(())
    }

    pub fn num_bindings(&self) -> usize {
        self.bindings.len()
    }

    /// Describes the attribute in `slot`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the slot is out of the reserved range or the
    /// component count is not 1 to 4.
    pub fn set_binding(
        &mut self,
        slot: usize,
        offset: usize,
        stride: usize,
        components: u8,
        kind: AttribKind,
    ) -> Result<(), RenderError> {
        if slot >= self.bindings.len() || components == 0 || components > 4 {
            return Err(RenderError::InvalidArgument);
        }

        self.bindings[slot] = AttribBinding {
            offset,
            stride,
            components,
            kind,
        };
        Ok(())
    }

    pub fn binding(&self, slot: usize) -> AttribBinding {
        self.bindings[slot]
    }

    /// Absolute byte offset of `vertex`'s data for the attribute in
    /// `slot`.
    #[inline]
    pub fn offset(&self, slot: usize, vertex: u32) -> usize {
        let binding = &self.bindings[slot];
        binding.offset + binding.stride * vertex as usize
    }
}
