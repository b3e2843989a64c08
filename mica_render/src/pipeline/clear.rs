//! Parallel attachment fills.
//!
//! The clear color is encoded to the attachment's format once; workers
//! then stamp the pattern over disjoint texel ranges. The padded storage
//! is filled too, which keeps the loop branch-free and is unobservable
//! through the logical texel window.

use glam::DVec4;
use half::f16;
use mica_tasks::TaskPool;

use crate::color::{Channel, Color, ColorFormat};
use crate::texture::TextureView;

use super::{dispatch_format, partition};

/// Largest texel footprint (RGBA at 64 bits per channel).
const MAX_TEXEL_BYTES: usize = 32;

/// A clear color encoded in a target format.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ClearPattern {
    bytes: [u8; MAX_TEXEL_BYTES],
    len: usize,
}

fn encode<T: Channel, const N: usize>(color: DVec4) -> ClearPattern {
    let mut channels = [T::from_norm(0.0); N];
    for (slot, channel) in channels.iter_mut().enumerate() {
        *channel = T::from_norm(color[slot]);
    }

    let texel = Color(channels);
    let texel_bytes = bytemuck::bytes_of(&texel);

    let mut bytes = [0; MAX_TEXEL_BYTES];
    bytes[..texel_bytes.len()].copy_from_slice(texel_bytes);

    ClearPattern {
        bytes,
        len: texel_bytes.len(),
    }
}

/// Encodes `color` for `format`.
pub(crate) fn encode_clear_color(format: ColorFormat, color: DVec4) -> ClearPattern {
    let encoder: fn(DVec4) -> ClearPattern = dispatch_format!(format, encode);
    encoder(color)
}

/// Fills every texel of `view` with the pattern, partitioned across the
/// pool.
pub(crate) fn clear_view(pool: &TaskPool, view: &TextureView, pattern: &ClearPattern) {
    debug_assert_eq!(pattern.len, view.bytes_per_texel());

    let total = view.texel_capacity();

    pool.dispatch(|invocation| {
        let range = partition(total, invocation.workers, invocation.worker);

        for index in range {
            // SAFETY: Index ranges are disjoint across workers and within
            // the padded capacity.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    pattern.bytes.as_ptr(),
                    view.texel_ptr(index),
                    pattern.len,
                );
            }
        }
    });
}
