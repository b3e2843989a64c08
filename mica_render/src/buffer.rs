//! Vertex, index and uniform storage.
//!
//! A [`VertexBuffer`] is an untyped byte blob; the schema lives in the
//! [`VertexArray`] bindings and the shaders that read through them. The
//! [`IndexBuffer`] stores 8-, 16- or 32-bit indices and always reads them
//! back widened to `u32`.
//!
//! [`VertexArray`]: crate::vertex_array::VertexArray

use bytemuck::Pod;

use crate::error::RenderError;

/// Fixed capacity of a [`UniformBuffer`] in bytes.
pub const MAX_UNIFORM_BUFFER_SIZE: usize = 1024;

/// Untyped vertex storage.
#[derive(Clone, Debug, Default)]
pub struct VertexBuffer {
    bytes: Vec<u8>,
}

impl VertexBuffer {
    /// Allocates `size` zeroed bytes.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `size` is zero.
    pub fn new(size: usize) -> Result<Self, RenderError> {
        if size == 0 {
            return Err(RenderError::InvalidArgument);
        }

        Ok(Self {
            bytes: vec![0; size],
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the write would run past the end.
    pub fn assign(&mut self, data: &[u8], offset: usize) -> Result<(), RenderError> {
        let end = offset.checked_add(data.len()).ok_or(RenderError::InvalidArgument)?;
        if end > self.bytes.len() {
            return Err(RenderError::InvalidArgument);
        }

        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Reads a `T` at the given byte offset.
    ///
    /// No alignment is required; vertex layouts pack freely.
    #[inline]
    pub fn element<T: Pod>(&self, offset: usize) -> T {
        bytemuck::pod_read_unaligned(&self.bytes[offset..offset + std::mem::size_of::<T>()])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Storage width of index elements.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U8,
    #[default]
    U16,
    U32,
}

impl IndexFormat {
    pub const fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct IndexBuffer {
    bytes: Vec<u8>,
    format: IndexFormat,
    count: usize,
}

impl IndexBuffer {
    /// Allocates room for `count` indices, optionally taking their
    /// initial bytes.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `count` is zero or `data` has the wrong size.
    pub fn new(count: usize, format: IndexFormat, data: Option<&[u8]>) -> Result<Self, RenderError> {
        if count == 0 {
            return Err(RenderError::InvalidArgument);
        }

        let size = count * format.size();
        let bytes = match data {
            Some(data) => {
                if data.len() != size {
                    return Err(RenderError::InvalidArgument);
                }
                data.to_vec()
            }
            None => vec![0; size],
        };

        Ok(Self {
            bytes,
            format,
            count,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    /// Copies raw index bytes into the buffer at a byte offset.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the write would run past the end.
    pub fn assign(&mut self, data: &[u8], offset: usize) -> Result<(), RenderError> {
        let end = offset.checked_add(data.len()).ok_or(RenderError::InvalidArgument)?;
        if end > self.bytes.len() {
            return Err(RenderError::InvalidArgument);
        }

        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Reads index `index`, widened to `u32` regardless of storage width.
    #[inline]
    pub fn index(&self, index: usize) -> u32 {
        debug_assert!(index < self.count);

        match self.format {
            IndexFormat::U8 => u32::from(self.bytes[index]),
            IndexFormat::U16 => {
                u32::from(bytemuck::pod_read_unaligned::<u16>(&self.bytes[index * 2..index * 2 + 2]))
            }
            IndexFormat::U32 => bytemuck::pod_read_unaligned(&self.bytes[index * 4..index * 4 + 4]),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Fixed-capacity opaque uniform blob.
///
/// Shaders reinterpret the contents through a caller-declared layout; the
/// buffer itself validates nothing beyond its bounds.
#[derive(Clone)]
#[repr(align(16))]
pub struct UniformBuffer {
    bytes: [u8; MAX_UNIFORM_BUFFER_SIZE],
}

impl UniformBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; MAX_UNIFORM_BUFFER_SIZE],
        }
    }

    /// Copies `data` into the arena at `offset`.
    ///
    /// `offset + data.len()` must not exceed the capacity.
    pub fn assign(&mut self, data: &[u8], offset: usize) {
        assert!(offset + data.len() <= MAX_UNIFORM_BUFFER_SIZE);
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Fills `len` bytes at `offset` with `value`.
    pub fn fill(&mut self, value: u8, offset: usize, len: usize) {
        assert!(offset + len <= MAX_UNIFORM_BUFFER_SIZE);
        self.bytes[offset..offset + len].fill(value);
    }

    /// Zeroes the whole arena.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Stores a value at the given byte offset.
    pub fn set<T: Pod>(&mut self, offset: usize, value: T) {
        self.assign(bytemuck::bytes_of(&value), offset);
    }

    /// Reinterprets the bytes at `offset` as a `T`.
    ///
    /// `offset + size_of::<T>()` must not exceed the capacity.
    #[inline]
    pub fn get<T: Pod>(&self, offset: usize) -> T {
        assert!(offset + std::mem::size_of::<T>() <= MAX_UNIFORM_BUFFER_SIZE);
        bytemuck::pod_read_unaligned(&self.bytes[offset..offset + std::mem::size_of::<T>()])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for UniformBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UniformBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniformBuffer")
            .field("capacity", &MAX_UNIFORM_BUFFER_SIZE)
            .finish()
    }
}
