//! Owned 1D/2D/3D texel storage.
//!
//! Texels are stored either in scanline order or swizzled into 4×4 (4×4×4
//! for volumes) tiles, which keeps neighboring samples of a 2D access
//! pattern in the same cache lines. Storage dimensions are rounded up to
//! multiples of 8 texels and the allocation is 32-byte aligned, so wide
//! loads that run past the logical edge stay inside the buffer.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use bytemuck::Pod;

use crate::color::{Channel, Color, ColorFormat};
use crate::error::RenderError;

/// Texels per tile edge in swizzled order.
pub const TILE_DIM: u32 = 4;
const TILE_SHIFT: u32 = 2;

const STORAGE_ALIGN: usize = 32;
const DIM_ROUND: u32 = 8;

/// Behavior of sampling coordinates outside `[0, 1)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    /// Wrap around; sampling is periodic.
    #[default]
    Repeat,
    /// Out-of-bounds samples return the zero color.
    Cutoff,
    /// Clamp to the edge texel.
    ClampEdge,
}

/// In-memory layout of the texel array.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TexelOrder {
    /// Scanline order: `x + W * (y + H * z)`.
    #[default]
    Linear,
    /// 4×4(×4) tiles in scanline order, texels within a tile in scanline
    /// order.
    Swizzled,
}

/// 32-byte aligned, zero-initialized heap storage.
struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
}

impl AlignedBuf {
    fn zeroed(len: usize) -> Result<Self, RenderError> {
        debug_assert!(len != 0);

        let layout =
            Layout::from_size_align(len, STORAGE_ALIGN).map_err(|_| RenderError::InvalidArgument)?;

        // SAFETY: `len` is non-zero, so the layout has non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };

        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(RenderError::OutOfMemory),
        }
    }

    /// Raw pointer with read/write provenance over the whole allocation.
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: The allocation is live and `len` bytes long.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: The allocation is live and `len` bytes long; `&mut self`
        // guarantees uniqueness.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: Allocated in `zeroed` with the identical layout.
        unsafe {
            alloc::dealloc(
                self.ptr.as_ptr(),
                Layout::from_size_align_unchecked(self.len, STORAGE_ALIGN),
            );
        }
    }
}

impl std::fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuf").field("len", &self.len).finish()
    }
}

// SAFETY: The buffer is plain bytes behind a unique owner.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

const fn round_dim(dim: u32) -> u32 {
    (dim + (DIM_ROUND - 1)) & !(DIM_ROUND - 1)
}

/// Flat texel index for the given layout.
///
/// All coordinates address the padded storage dimensions.
#[inline]
pub(crate) fn texel_index(
    order: TexelOrder,
    padded_width: u32,
    padded_height: u32,
    is_3d: bool,
    x: u32,
    y: u32,
    z: u32,
) -> usize {
    match order {
        TexelOrder::Linear => (x + padded_width * (y + padded_height * z)) as usize,
        TexelOrder::Swizzled => {
            let tile_x = x >> TILE_SHIFT;
            let tile_y = y >> TILE_SHIFT;
            let tiles_per_row = padded_width >> TILE_SHIFT;

            let inner_x = x & (TILE_DIM - 1);
            let inner_y = y & (TILE_DIM - 1);

            if is_3d {
                let tile_z = z >> TILE_SHIFT;
                let tiles_per_slice = tiles_per_row * (padded_height >> TILE_SHIFT);
                let tile_id = tile_x + tiles_per_row * tile_y + tiles_per_slice * tile_z;

                let inner_z = z & (TILE_DIM - 1);
                let inner = inner_x + (inner_y << TILE_SHIFT) + (inner_z << (TILE_SHIFT * 2));

                (tile_id * (TILE_DIM * TILE_DIM * TILE_DIM) + inner) as usize
            } else {
                let tile_id = tile_x + tiles_per_row * tile_y;
                let inner = inner_x + (inner_y << TILE_SHIFT);

                (tile_id * (TILE_DIM * TILE_DIM) + inner) as usize
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Texture {
    width: u16,
    height: u16,
    depth: u16,
    widthf: f32,
    heightf: f32,
    depthf: f32,
    padded_width: u32,
    padded_height: u32,
    padded_depth: u32,
    format: ColorFormat,
    bytes_per_texel: usize,
    wrap: WrapMode,
    order: TexelOrder,
    texels: Option<AlignedBuf>,
}

impl Texture {
    /// Allocates a texture. Prefer this over `Texture::default()` +
    /// [`init`] unless the two-phase lifecycle is needed.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for zero dimensions or an invalid format,
    /// `OutOfMemory` if the allocation fails.
    ///
    /// [`init`]: Self::init
    pub fn new(
        format: ColorFormat,
        width: u16,
        height: u16,
        depth: u16,
        order: TexelOrder,
    ) -> Result<Self, RenderError> {
        let mut texture = Self::default();
        texture.init(format, width, height, depth, order)?;
        Ok(texture)
    }

    /// Allocates storage for an uninitialized texture.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if storage is still live (call [`terminate`]
    /// first), otherwise as [`new`].
    ///
    /// [`terminate`]: Self::terminate
    /// [`new`]: Self::new
    pub fn init(
        &mut self,
        format: ColorFormat,
        width: u16,
        height: u16,
        depth: u16,
        order: TexelOrder,
    ) -> Result<(), RenderError> {
        if self.texels.is_some() {
            return Err(RenderError::AlreadyInitialized);
        }

        if width == 0 || height == 0 || depth == 0 || !format.is_valid() {
            return Err(RenderError::InvalidArgument);
        }

        let padded_width = round_dim(u32::from(width));
        let padded_height = round_dim(u32::from(height));
        let padded_depth = if depth > 1 {
            round_dim(u32::from(depth))
        } else {
            1
        };

        let texel_count = padded_width as usize * padded_height as usize * padded_depth as usize;
        let bytes_per_texel = format.bytes_per_pixel();

        self.texels = Some(AlignedBuf::zeroed(texel_count * bytes_per_texel)?);
        self.width = width;
        self.height = height;
        self.depth = depth;
        self.widthf = f32::from(width);
        self.heightf = f32::from(height);
        self.depthf = f32::from(depth);
        self.padded_width = padded_width;
        self.padded_height = padded_height;
        self.padded_depth = padded_depth;
        self.format = format;
        self.bytes_per_texel = bytes_per_texel;
        self.order = order;

        Ok(())
    }

    /// Releases the texel storage, returning to the uninitialized state.
    pub fn terminate(&mut self) {
        *self = Self::default();
    }

    pub fn is_initialized(&self) -> bool {
        self.texels.is_some()
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn depth(&self) -> u16 {
        self.depth
    }

    pub fn widthf(&self) -> f32 {
        self.widthf
    }

    pub fn heightf(&self) -> f32 {
        self.heightf
    }

    pub fn depthf(&self) -> f32 {
        self.depthf
    }

    pub fn format(&self) -> ColorFormat {
        self.format
    }

    pub fn bytes_per_texel(&self) -> usize {
        self.bytes_per_texel
    }

    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap
    }

    pub fn set_wrap_mode(&mut self, wrap: WrapMode) {
        self.wrap = wrap;
    }

    pub fn order(&self) -> TexelOrder {
        self.order
    }

    /// Raw texel bytes, including edge padding.
    pub fn data(&self) -> &[u8] {
        self.texels.as_ref().map(AlignedBuf::as_slice).unwrap_or(&[])
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.texels
            .as_mut()
            .map(AlignedBuf::as_mut_slice)
            .unwrap_or(&mut [])
    }

    /// Flat index of texel `(x, y, z)` under this texture's layout.
    #[inline]
    pub fn map_coordinate(&self, x: u32, y: u32, z: u32) -> usize {
        texel_index(
            self.order,
            self.padded_width,
            self.padded_height,
            self.depth > 1,
            x,
            y,
            z,
        )
    }

    /// Flat indices of the four horizontally adjacent texels starting at
    /// `(x, y, z)`.
    #[inline]
    pub fn map_coordinates(&self, x: u32, y: u32, z: u32) -> [usize; 4] {
        std::array::from_fn(|step| self.map_coordinate(x + step as u32, y, z))
    }

    /// Reads the texel at `(x, y, z)`.
    ///
    /// The channel type and count must match the texture format.
    #[inline]
    pub fn texel<T: Channel, const N: usize>(&self, x: u32, y: u32, z: u32) -> Color<T, N> {
        self.debug_check_access::<T, N>(x, y, z);

        let offset = self.map_coordinate(x, y, z) * self.bytes_per_texel;
        bytemuck::pod_read_unaligned(&self.data()[offset..offset + self.bytes_per_texel])
    }

    /// Writes the texel at `(x, y, z)`.
    #[inline]
    pub fn set_texel<T: Channel, const N: usize>(&mut self, x: u32, y: u32, z: u32, color: Color<T, N>) {
        self.debug_check_access::<T, N>(x, y, z);

        let offset = self.map_coordinate(x, y, z) * self.bytes_per_texel;
        let bytes_per_texel = self.bytes_per_texel;
        self.data_mut()[offset..offset + bytes_per_texel].copy_from_slice(bytemuck::bytes_of(&color));
    }

    /// Writes one texel from raw bytes in the texture's format.
    pub fn set_texel_bytes(&mut self, x: u32, y: u32, z: u32, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.bytes_per_texel);

        let offset = self.map_coordinate(x, y, z) * self.bytes_per_texel;
        let bytes_per_texel = self.bytes_per_texel;
        self.data_mut()[offset..offset + bytes_per_texel].copy_from_slice(bytes);
    }

    /// Uploads a tightly packed `width × height × depth` region of texels
    /// with its origin at `(x, y, z)`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the region leaves the texture or `data` does
    /// not hold exactly the region's bytes.
    pub fn set_texels(
        &mut self,
        x: u32,
        y: u32,
        z: u32,
        width: u32,
        height: u32,
        depth: u32,
        data: &[u8],
    ) -> Result<(), RenderError> {
        if x + width > u32::from(self.width)
            || y + height > u32::from(self.height)
            || z + depth > u32::from(self.depth.max(1))
        {
            return Err(RenderError::InvalidArgument);
        }

        let bytes_per_texel = self.bytes_per_texel;
        if data.len() != (width * height * depth) as usize * bytes_per_texel {
            return Err(RenderError::InvalidArgument);
        }

        let mut src = data.chunks_exact(bytes_per_texel);
        for dz in 0..depth {
            for dy in 0..height {
                for dx in 0..width {
                    let texel = src.next().unwrap();
                    self.set_texel_bytes(x + dx, y + dy, z + dz, texel);
                }
            }
        }

        Ok(())
    }

    /// Reads a texel by flat index, ignoring the swizzle layout.
    #[inline]
    pub fn raw_texel<T: Pod>(&self, index: usize) -> T {
        let size = std::mem::size_of::<T>();
        bytemuck::pod_read_unaligned(&self.data()[index * size..(index + 1) * size])
    }

    /// Wraps a normalized coordinate per the texture's wrap mode.
    ///
    /// Returns `None` when the coordinate is cut off.
    #[inline]
    pub fn wrap_coordinate(&self, uvw: f32) -> Option<f32> {
        match self.wrap {
            WrapMode::Repeat => Some(uvw.rem_euclid(1.0)),
            WrapMode::ClampEdge => Some(uvw.clamp(0.0, 1.0)),
            WrapMode::Cutoff => (0.0..1.0).contains(&uvw).then_some(uvw),
        }
    }

    /// Wraps an integer texel coordinate into `0..max`.
    #[inline]
    pub fn wrap_texel(&self, uvw: i32, max: i32) -> i32 {
        match self.wrap {
            WrapMode::Repeat => uvw.rem_euclid(max),
            _ => uvw.clamp(0, max - 1),
        }
    }

    /// A non-owning view of this texture's storage.
    ///
    /// The view's read/write operations are unsafe; see [`TextureView`].
    pub fn view(&self) -> TextureView {
        let (ptr, len) = match &self.texels {
            // The pointer is taken from the allocation itself, not through
            // a borrow of the byte slice, so views retain write access.
            Some(texels) => (texels.as_ptr(), texels.len),
            None => (std::ptr::NonNull::dangling().as_ptr(), 0),
        };

        TextureView {
            ptr,
            len,
            format: self.format,
            width: self.width,
            height: self.height,
            depth: self.depth,
            padded_width: self.padded_width,
            padded_height: self.padded_height,
            wrap: self.wrap,
            order: self.order,
            bytes_per_texel: self.bytes_per_texel,
        }
    }

    #[inline]
    fn debug_check_access<T: Channel, const N: usize>(&self, x: u32, y: u32, z: u32) {
        debug_assert!(self.is_initialized());
        debug_assert_eq!(T::KIND, self.format.channel());
        debug_assert_eq!(N, self.format.components_per_pixel());
        debug_assert!(x < self.padded_width && y < self.padded_height, "({}, {}, {})", x, y, z);
    }
}

/// Non-owning descriptor of a texture's storage.
///
/// Framebuffer attachments hold views so a texture can be scanned out by
/// worker threads without borrowing the [`Texture`] itself. The pointer
/// stays valid until the texture is terminated or destroyed; the context
/// enforces detach-before-destroy.
#[derive(Copy, Clone, Debug)]
pub struct TextureView {
    ptr: *mut u8,
    len: usize,
    format: ColorFormat,
    width: u16,
    height: u16,
    depth: u16,
    padded_width: u32,
    padded_height: u32,
    wrap: WrapMode,
    order: TexelOrder,
    bytes_per_texel: usize,
}

// SAFETY: The view is a pointer + layout metadata. Concurrent access is
// governed by the draw-scope contract: workers write disjoint texels and
// nobody else touches the storage during a dispatch.
unsafe impl Send for TextureView {}
unsafe impl Sync for TextureView {}

impl TextureView {
    pub fn format(&self) -> ColorFormat {
        self.format
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn depth(&self) -> u16 {
        self.depth
    }

    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap
    }

    pub fn order(&self) -> TexelOrder {
        self.order
    }

    pub fn bytes_per_texel(&self) -> usize {
        self.bytes_per_texel
    }

    /// Total texel capacity of the padded storage.
    pub(crate) fn texel_capacity(&self) -> usize {
        self.len / self.bytes_per_texel
    }

    /// Flat index of texel `(x, y, z)`.
    #[inline]
    pub fn map_coordinate(&self, x: u32, y: u32, z: u32) -> usize {
        texel_index(
            self.order,
            self.padded_width,
            self.padded_height,
            self.depth > 1,
            x,
            y,
            z,
        )
    }

    /// Pointer to the texel with the given flat index.
    ///
    /// # Safety
    ///
    /// `index` must be within the padded texel capacity, and all reads and
    /// writes through the pointer must be free of data races (the draw
    /// dispatch guarantees this by giving every worker disjoint texels).
    #[inline]
    pub unsafe fn texel_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.texel_capacity());

        // SAFETY: In bounds per the caller contract.
        unsafe { self.ptr.add(index * self.bytes_per_texel) }
    }

    /// Reads the texel at `(x, y, z)`.
    ///
    /// # Safety
    ///
    /// As [`texel_ptr`](Self::texel_ptr); additionally no worker may be
    /// writing this texel concurrently.
    #[inline]
    pub unsafe fn read_texel<T: Channel, const N: usize>(&self, x: u32, y: u32, z: u32) -> Color<T, N> {
        let index = self.map_coordinate(x, y, z);

        // SAFETY: Per the caller contract.
        unsafe { (self.texel_ptr(index) as *const Color<T, N>).read_unaligned() }
    }

    /// Writes the texel at `(x, y, z)`.
    ///
    /// # Safety
    ///
    /// As [`read_texel`](Self::read_texel).
    #[inline]
    pub unsafe fn write_texel<T: Channel, const N: usize>(
        &self,
        x: u32,
        y: u32,
        z: u32,
        color: Color<T, N>,
    ) {
        let index = self.map_coordinate(x, y, z);

        // SAFETY: Per the caller contract.
        unsafe {
            (self.texel_ptr(index) as *mut Color<T, N>).write_unaligned(color);
        }
    }
}
