//! The draw, blit and clear processors.
//!
//! A draw runs as two pool dispatches. The vertex phase assigns
//! primitives to workers round-robin; each worker shades, assembles,
//! clips and bins its share into its own scratch bin. The fragment phase
//! assigns each worker a contiguous band of raster rows; every worker
//! walks all bins and scan-converts the coverage that lands in its band.
//! Row bands are disjoint, so attachment writes never race.

pub(crate) mod blit;
pub(crate) mod clear;
pub(crate) mod raster;
pub(crate) mod vertex;

use std::ops::Range;

use glam::Vec4;
use half::f16;

use crate::color::{Channel, Color, ColorFormat};
use crate::framebuffer::Framebuffer;
use crate::shader::MAX_VARYINGS;
use crate::state::{DepthTest, Rect};
use crate::texture::TextureView;

/// Splits `0..total` into `workers` near-equal contiguous ranges.
pub(crate) fn partition(total: usize, workers: usize, worker: usize) -> Range<usize> {
    let base = total / workers;
    let extra = total % workers;

    let begin = worker * base + worker.min(extra);
    let len = base + usize::from(worker < extra);
    begin..begin + len
}

/// A vertex after perspective divide and viewport mapping.
///
/// `position` holds window-space x/y, screen-space depth in z and the
/// reciprocal of the clip-space w in w.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ScreenVertex {
    pub position: Vec4,
    pub varyings: [Vec4; MAX_VARYINGS],
}

/// An assembled primitive parked in a worker's bin, tagged with the
/// raster rows it may cover.
#[derive(Clone, Debug)]
pub(crate) enum BinnedPrimitive {
    Triangle {
        vertices: [ScreenVertex; 3],
        rows: Range<u32>,
    },
    Line {
        vertices: [ScreenVertex; 2],
        rows: Range<u32>,
    },
    Point {
        vertex: ScreenVertex,
    },
}

/// Per-worker, per-draw primitive scratch.
#[derive(Debug, Default)]
pub(crate) struct WorkerBin {
    pub primitives: Vec<BinnedPrimitive>,
}

impl WorkerBin {
    pub fn clear(&mut self) {
        self.primitives.clear();
    }
}

/// Pixel-space bounds of a draw: viewport ∩ scissor ∩ framebuffer, as
/// half-open x/y ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DrawBounds {
    pub x: Range<u32>,
    pub y: Range<u32>,
}

impl DrawBounds {
    pub fn new(viewport: Rect, scissor: Rect, width: u16, height: u16) -> Self {
        let clip = |rect: Rect, limit: u16| {
            let begin = u32::from(rect[0].min(limit));
            let end = (u32::from(rect[0]) + u32::from(rect[2])).min(u32::from(limit));
            begin..end.max(begin)
        };

        let vx = clip(viewport, width);
        let sx = clip(scissor, width);
        let vy = clip([viewport[1], 0, viewport[3], 0], height);
        let sy = clip([scissor[1], 0, scissor[3], 0], height);

        Self {
            x: vx.start.max(sx.start)..vx.end.min(sx.end).max(vx.start.max(sx.start)),
            y: vy.start.max(sy.start)..vy.end.min(sy.end).max(vy.start.max(sy.start)),
        }
    }

    /// The viewport rectangle used for NDC-to-window mapping, clipped to
    /// the framebuffer.
    pub fn viewport_rect(viewport: Rect, width: u16, height: u16) -> (f32, f32, f32, f32) {
        let x = viewport[0].min(width);
        let y = viewport[1].min(height);
        let w = viewport[2].min(width - x);
        let h = viewport[3].min(height - y);

        (f32::from(x), f32::from(y), f32::from(w), f32::from(h))
    }
}

/// Writes a normalized fragment color into an attachment texel.
pub(crate) type StoreFn = unsafe fn(&TextureView, u32, u32, Vec4);

/// Reads an attachment texel back as a normalized color.
pub(crate) type LoadFn = unsafe fn(&TextureView, u32, u32) -> Vec4;

/// # Safety
///
/// As [`TextureView::write_texel`].
unsafe fn store_texel<T: Channel, const N: usize>(view: &TextureView, x: u32, y: u32, color: Vec4) {
    // SAFETY: Forwarded caller contract.
    unsafe {
        view.write_texel::<T, N>(x, y, 0, Color::from_normalized(color));
    }
}

/// # Safety
///
/// As [`TextureView::read_texel`].
unsafe fn load_texel<T: Channel, const N: usize>(view: &TextureView, x: u32, y: u32) -> Vec4 {
    // SAFETY: Forwarded caller contract.
    unsafe { view.read_texel::<T, N>(x, y, 0).to_normalized() }
}

macro_rules! dispatch_format {
    ($format:expr, $op:ident) => {
        match $format {
            ColorFormat::R8Unorm => $op::<u8, 1>,
            ColorFormat::R16Unorm => $op::<u16, 1>,
            ColorFormat::R32Unorm => $op::<u32, 1>,
            ColorFormat::R64Unorm => $op::<u64, 1>,
            ColorFormat::R16Float => $op::<f16, 1>,
            ColorFormat::R32Float => $op::<f32, 1>,
            ColorFormat::R64Float => $op::<f64, 1>,
            ColorFormat::Rg8Unorm => $op::<u8, 2>,
            ColorFormat::Rg16Unorm => $op::<u16, 2>,
            ColorFormat::Rg32Unorm => $op::<u32, 2>,
            ColorFormat::Rg64Unorm => $op::<u64, 2>,
            ColorFormat::Rg16Float => $op::<f16, 2>,
            ColorFormat::Rg32Float => $op::<f32, 2>,
            ColorFormat::Rg64Float => $op::<f64, 2>,
            ColorFormat::Rgb8Unorm => $op::<u8, 3>,
            ColorFormat::Rgb16Unorm => $op::<u16, 3>,
            ColorFormat::Rgb32Unorm => $op::<u32, 3>,
            ColorFormat::Rgb64Unorm => $op::<u64, 3>,
            ColorFormat::Rgb16Float => $op::<f16, 3>,
            ColorFormat::Rgb32Float => $op::<f32, 3>,
            ColorFormat::Rgb64Float => $op::<f64, 3>,
            ColorFormat::Rgba8Unorm => $op::<u8, 4>,
            ColorFormat::Rgba16Unorm => $op::<u16, 4>,
            ColorFormat::Rgba32Unorm => $op::<u32, 4>,
            ColorFormat::Rgba64Unorm => $op::<u64, 4>,
            ColorFormat::Rgba16Float => $op::<f16, 4>,
            ColorFormat::Rgba32Float => $op::<f32, 4>,
            ColorFormat::Rgba64Float => $op::<f64, 4>,
            ColorFormat::Invalid => unreachable!("invalid format reached the pipeline"),
        }
    };
}

pub(crate) use dispatch_format;

/// Resolves the texel writer for a format once, ahead of the pixel loop.
pub(crate) fn store_fn(format: ColorFormat) -> StoreFn {
    dispatch_format!(format, store_texel)
}

/// Resolves the texel reader for a format once, ahead of the pixel loop.
pub(crate) fn load_fn(format: ColorFormat) -> LoadFn {
    dispatch_format!(format, load_texel)
}

/// Native representation of the depth attachment.
#[derive(Copy, Clone, Debug)]
pub(crate) enum DepthKind {
    U16,
    F16,
    F32,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct DepthTarget {
    pub view: TextureView,
    pub kind: DepthKind,
}

impl DepthTarget {
    pub fn new(view: TextureView) -> Self {
        let kind = match view.format() {
            ColorFormat::R16Unorm => DepthKind::U16,
            ColorFormat::R16Float => DepthKind::F16,
            ColorFormat::R32Float => DepthKind::F32,
            format => unreachable!("{:?} is not a depth format", format),
        };

        Self { view, kind }
    }

    /// Compares `depth` against the stored value. The incoming depth is
    /// converted to the buffer's native type first so equality tests are
    /// exact at the stored precision.
    ///
    /// # Safety
    ///
    /// As [`TextureView::read_texel`].
    #[inline]
    pub unsafe fn compare(&self, x: u32, y: u32, depth: f32, test: DepthTest) -> bool {
        // SAFETY: Forwarded caller contract.
        let ordering = unsafe {
            match self.kind {
                DepthKind::U16 => {
                    let stored: Color<u16, 1> = self.view.read_texel(x, y, 0);
                    u16::from_norm(f64::from(depth)).partial_cmp(&stored[0])
                }
                DepthKind::F16 => {
                    let stored: Color<f16, 1> = self.view.read_texel(x, y, 0);
                    f16::from_f32(depth).partial_cmp(&stored[0])
                }
                DepthKind::F32 => {
                    let stored: Color<f32, 1> = self.view.read_texel(x, y, 0);
                    depth.partial_cmp(&stored[0])
                }
            }
        };

        let Some(ordering) = ordering else {
            return false;
        };

        match test {
            DepthTest::Off => true,
            DepthTest::Less => ordering.is_lt(),
            DepthTest::LessEqual => ordering.is_le(),
            DepthTest::Greater => ordering.is_gt(),
            DepthTest::GreaterEqual => ordering.is_ge(),
            DepthTest::Equal => ordering.is_eq(),
            DepthTest::NotEqual => ordering.is_ne(),
        }
    }

    /// Stores `depth` in the buffer's native type.
    ///
    /// # Safety
    ///
    /// As [`TextureView::write_texel`].
    #[inline]
    pub unsafe fn write(&self, x: u32, y: u32, depth: f32) {
        // SAFETY: Forwarded caller contract.
        unsafe {
            match self.kind {
                DepthKind::U16 => {
                    self.view
                        .write_texel(x, y, 0, Color([u16::from_norm(f64::from(depth))]));
                }
                DepthKind::F16 => {
                    self.view.write_texel(x, y, 0, Color([f16::from_f32(depth)]));
                }
                DepthKind::F32 => {
                    self.view.write_texel(x, y, 0, Color([depth]));
                }
            }
        }
    }
}

/// A color attachment with its format dispatch resolved.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ColorTarget {
    pub view: TextureView,
    pub store: StoreFn,
    pub load: LoadFn,
}

/// Every render target of a draw, resolved once at dispatch time.
#[derive(Clone, Debug)]
pub(crate) struct FrameTargets {
    pub color: Vec<ColorTarget>,
    pub depth: Option<DepthTarget>,
    pub width: u16,
    pub height: u16,
}

impl FrameTargets {
    /// Snapshots a validated framebuffer.
    pub fn new(framebuffer: &Framebuffer) -> Self {
        let color = (0..framebuffer.num_color_buffers())
            .map(|slot| {
                let view = *framebuffer
                    .color_attachment(slot)
                    .expect("validated framebuffer with empty slot")
                    .view();

                ColorTarget {
                    store: store_fn(view.format()),
                    load: load_fn(view.format()),
                    view,
                }
            })
            .collect();

        let depth = framebuffer
            .depth_attachment()
            .map(|attachment| DepthTarget::new(*attachment.view()));

        let (width, height) = framebuffer.size();

        Self {
            color,
            depth,
            width,
            height,
        }
    }
}
