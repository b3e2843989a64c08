//! Parallel nearest-neighbor blitting.
//!
//! Destination rows are partitioned across workers so the inner loop
//! walks the x axis with the prefetcher. Source coordinates derive from a
//! fixed-point scale ratio, which truncates identically on every
//! platform.

use glam::Vec4;
use mica_tasks::TaskPool;

use crate::color::{Color, ColorRgba};
use crate::fixed::Fixed32;
use crate::texture::Texture;

use super::{load_fn, partition, store_fn};

/// Texel-space rectangle of a blit endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct BlitRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BlitRect {
    pub fn full(texture: &Texture) -> Self {
        Self {
            x: 0,
            y: 0,
            width: u32::from(texture.width()),
            height: u32::from(texture.height()),
        }
    }
}

/// Rescales `src_rect` of `src` onto `dst_rect` of `dst`.
///
/// Formats convert through the normalized color path. No vertical flip;
/// only surface blits flip.
pub(crate) fn texture_to_texture(
    pool: &TaskPool,
    src: &Texture,
    dst: &Texture,
    src_rect: BlitRect,
    dst_rect: BlitRect,
) {
    if src_rect.width == 0 || src_rect.height == 0 || dst_rect.width == 0 || dst_rect.height == 0 {
        return;
    }

    let src_view = src.view();
    let dst_view = dst.view();
    let load = load_fn(src.format());
    let store = store_fn(dst.format());

    let ratio_x = Fixed32::from_ratio(src_rect.width, dst_rect.width);
    let ratio_y = Fixed32::from_ratio(src_rect.height, dst_rect.height);

    pool.dispatch(|invocation| {
        let rows = partition(dst_rect.height as usize, invocation.workers, invocation.worker);

        for row in rows {
            let dst_y = dst_rect.y + row as u32;
            let src_y =
                (src_rect.y + ratio_y.scale_int(row as u32)).min(src_rect.y + src_rect.height - 1);

            for col in 0..dst_rect.width {
                let src_x =
                    (src_rect.x + ratio_x.scale_int(col)).min(src_rect.x + src_rect.width - 1);

                // SAFETY: The source is read-only for the whole dispatch
                // and every worker writes a disjoint set of destination
                // rows.
                unsafe {
                    let color = load(&src_view, src_x, src_y);
                    store(&dst_view, dst_rect.x + col, dst_y, color);
                }
            }
        }
    });
}

/// Raw pixels of a presentable surface, shareable with workers.
#[derive(Copy, Clone, Debug)]
pub(crate) struct SurfacePixels {
    pub ptr: *mut u8,
    pub width: u32,
    pub height: u32,
}

// SAFETY: Workers write disjoint destination rows; the `&mut` borrow of
// the surface is held by the caller for the whole dispatch.
unsafe impl Send for SurfacePixels {}
unsafe impl Sync for SurfacePixels {}

/// Rescales `src_rect` of `src` onto `dst_rect` of a BGRA8 window
/// surface, flipping vertically to match the top-down scanline
/// convention of the windowing backends.
pub(crate) fn texture_to_surface(
    pool: &TaskPool,
    src: &Texture,
    surface: SurfacePixels,
    src_rect: BlitRect,
    dst_rect: BlitRect,
) {
    if src_rect.width == 0 || src_rect.height == 0 || dst_rect.width == 0 || dst_rect.height == 0 {
        return;
    }

    let src_view = src.view();
    let load = load_fn(src.format());

    let ratio_x = Fixed32::from_ratio(src_rect.width, dst_rect.width);
    let ratio_y = Fixed32::from_ratio(src_rect.height, dst_rect.height);

    pool.dispatch(move |invocation| {
        let surface = surface;
        let rows = partition(dst_rect.height as usize, invocation.workers, invocation.worker);

        for row in rows {
            let dst_y = dst_rect.y + row as u32;
            if dst_y >= surface.height {
                continue;
            }
            let flipped_y = surface.height - 1 - dst_y;

            let src_y =
                (src_rect.y + ratio_y.scale_int(row as u32)).min(src_rect.y + src_rect.height - 1);

            for col in 0..dst_rect.width {
                let dst_x = dst_rect.x + col;
                if dst_x >= surface.width {
                    break;
                }

                let src_x =
                    (src_rect.x + ratio_x.scale_int(col)).min(src_rect.x + src_rect.width - 1);

                // SAFETY: Reads are unshadowed by writers; the write
                // lands in this worker's rows of the surface buffer.
                unsafe {
                    let color = load(&src_view, src_x, src_y);
                    let bgra: ColorRgba<u8> = Color::from_normalized(Vec4::new(
                        color.z, color.y, color.x, color.w,
                    ));

                    let offset = (flipped_y * surface.width + dst_x) as usize * 4;
                    std::ptr::copy_nonoverlapping(
                        bgra.0.as_ptr(),
                        surface.ptr.add(offset),
                        4,
                    );
                }
            }
        }
    });
}
