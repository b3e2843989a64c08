//! Filtered texture lookups over normalized UV coordinates.
//!
//! All samplers wrap coordinates per the texture's [`WrapMode`] first; a
//! cut-off coordinate short-circuits to the zero color without touching
//! texel memory. Filtering accumulates in `f32` and casts back to the
//! texture's channel type.
//!
//! [`WrapMode`]: crate::texture::WrapMode

use bytemuck::Zeroable;

use crate::color::{color_cast, Channel, Color};
use crate::texture::Texture;

#[inline]
fn tap<T: Channel, const N: usize>(texture: &Texture, x: u32, y: u32, z: u32) -> Color<f32, N> {
    color_cast(texture.texel::<T, N>(x, y, z))
}

/// Nearest-neighbor lookup.
pub fn nearest<T: Channel, const N: usize>(texture: &Texture, u: f32, v: f32) -> Color<T, N> {
    let (Some(u), Some(v)) = (texture.wrap_coordinate(u), texture.wrap_coordinate(v)) else {
        return Color::zeroed();
    };

    let x = ((texture.widthf() * u) as u32).min(u32::from(texture.width()) - 1);
    let y = ((texture.heightf() * v) as u32).min(u32::from(texture.height()) - 1);

    texture.texel(x, y, 0)
}

/// Nearest-neighbor lookup in a volume.
pub fn nearest_3d<T: Channel, const N: usize>(
    texture: &Texture,
    u: f32,
    v: f32,
    w: f32,
) -> Color<T, N> {
    let (Some(u), Some(v), Some(w)) = (
        texture.wrap_coordinate(u),
        texture.wrap_coordinate(v),
        texture.wrap_coordinate(w),
    ) else {
        return Color::zeroed();
    };

    let x = ((texture.widthf() * u) as u32).min(u32::from(texture.width()) - 1);
    let y = ((texture.heightf() * v) as u32).min(u32::from(texture.height()) - 1);
    let z = ((texture.depthf() * w) as u32).min(u32::from(texture.depth()) - 1);

    texture.texel(x, y, z)
}

#[inline]
fn bilinear_taps(texture: &Texture, u: f32, v: f32) -> (u32, u32, u32, u32, f32, f32) {
    let xf = u * texture.widthf();
    let yf = v * texture.heightf();

    let x0 = (xf as u32).min(u32::from(texture.width()) - 1);
    let y0 = (yf as u32).min(u32::from(texture.height()) - 1);
    let x1 = (x0 + 1).min(u32::from(texture.width()) - 1);
    let y1 = (y0 + 1).min(u32::from(texture.height()) - 1);

    let dx = (xf - x0 as f32).clamp(0.0, 1.0);
    let dy = (yf - y0 as f32).clamp(0.0, 1.0);

    (x0, y0, x1, y1, dx, dy)
}

/// Bilinear lookup: four clamped neighbor taps weighted by the
/// fractional texel coordinate.
pub fn bilinear<T: Channel, const N: usize>(texture: &Texture, u: f32, v: f32) -> Color<T, N> {
    let (Some(u), Some(v)) = (texture.wrap_coordinate(u), texture.wrap_coordinate(v)) else {
        return Color::zeroed();
    };

    let (x0, y0, x1, y1, dx, dy) = bilinear_taps(texture, u, v);
    let omdx = 1.0 - dx;
    let omdy = 1.0 - dy;

    let sum = tap::<T, N>(texture, x0, y0, 0) * (omdx * omdy)
        + tap::<T, N>(texture, x0, y1, 0) * (omdx * dy)
        + tap::<T, N>(texture, x1, y0, 0) * (dx * omdy)
        + tap::<T, N>(texture, x1, y1, 0) * (dx * dy);

    color_cast(sum)
}

/// Bilinear lookup in a volume; the slice is chosen nearest.
pub fn bilinear_3d<T: Channel, const N: usize>(
    texture: &Texture,
    u: f32,
    v: f32,
    w: f32,
) -> Color<T, N> {
    let (Some(u), Some(v), Some(w)) = (
        texture.wrap_coordinate(u),
        texture.wrap_coordinate(v),
        texture.wrap_coordinate(w),
    ) else {
        return Color::zeroed();
    };

    let z = ((w * texture.depthf()).round() as u32).min(u32::from(texture.depth()) - 1);
    let (x0, y0, x1, y1, dx, dy) = bilinear_taps(texture, u, v);
    let omdx = 1.0 - dx;
    let omdy = 1.0 - dy;

    let sum = tap::<T, N>(texture, x0, y0, z) * (omdx * omdy)
        + tap::<T, N>(texture, x0, y1, z) * (omdx * dy)
        + tap::<T, N>(texture, x1, y0, z) * (dx * omdy)
        + tap::<T, N>(texture, x1, y1, z) * (dx * dy);

    color_cast(sum)
}

#[inline]
fn gather_floor(coord: f32, max: u32) -> (u32, u32, f32) {
    let hi = (coord as u32).min(max - 1);
    let lo = ((coord - 1.0).max(0.0) as u32).min(max - 1);
    (hi, lo, coord.fract())
}

/// Gather-floor filtered lookup: taps at `floor(p)` and `floor(p - 1)`
/// weighted by the fractional parts.
pub fn trilinear<T: Channel, const N: usize>(texture: &Texture, u: f32, v: f32) -> Color<T, N> {
    let (Some(u), Some(v)) = (texture.wrap_coordinate(u), texture.wrap_coordinate(v)) else {
        return Color::zeroed();
    };

    let (xi, si, xf) = gather_floor(u * texture.widthf(), u32::from(texture.width()));
    let (yi, ti, yf) = gather_floor(v * texture.heightf(), u32::from(texture.height()));
    let xd = 1.0 - xf;
    let yd = 1.0 - yf;

    let sum = tap::<T, N>(texture, si, ti, 0) * (xd * yd)
        + tap::<T, N>(texture, xi, ti, 0) * (xf * yd)
        + tap::<T, N>(texture, si, yi, 0) * (xd * yf)
        + tap::<T, N>(texture, xi, yi, 0) * (xf * yf);

    color_cast(sum)
}

/// Gather-floor filtered lookup across a volume: eight taps weighted by
/// the fractional parts on every axis.
pub fn trilinear_3d<T: Channel, const N: usize>(
    texture: &Texture,
    u: f32,
    v: f32,
    w: f32,
) -> Color<T, N> {
    let (Some(u), Some(v), Some(w)) = (
        texture.wrap_coordinate(u),
        texture.wrap_coordinate(v),
        texture.wrap_coordinate(w),
    ) else {
        return Color::zeroed();
    };

    let (xi, si, xf) = gather_floor(u * texture.widthf(), u32::from(texture.width()));
    let (yi, ti, yf) = gather_floor(v * texture.heightf(), u32::from(texture.height()));
    let (zi, ri, zf) = gather_floor(w * texture.depthf(), u32::from(texture.depth()));
    let xd = 1.0 - xf;
    let yd = 1.0 - yf;
    let zd = 1.0 - zf;

    let sum = tap::<T, N>(texture, si, ti, ri) * (xd * yd * zd)
        + tap::<T, N>(texture, xi, ti, ri) * (xf * yd * zd)
        + tap::<T, N>(texture, si, yi, ri) * (xd * yf * zd)
        + tap::<T, N>(texture, si, ti, zi) * (xd * yd * zf)
        + tap::<T, N>(texture, xi, ti, zi) * (xf * yd * zf)
        + tap::<T, N>(texture, si, yi, zi) * (xd * yf * zf)
        + tap::<T, N>(texture, xi, yi, ri) * (xf * yf * zd)
        + tap::<T, N>(texture, xi, yi, zi) * (xf * yf * zf);

    color_cast(sum)
}

#[cfg(test)]
mod tests {
    use crate::color::{Color, ColorFormat};
    use crate::texture::{TexelOrder, Texture, WrapMode};

    use super::{bilinear, nearest, trilinear};

    fn checker_2x2() -> Texture {
        let mut texture =
            Texture::new(ColorFormat::Rgb8Unorm, 2, 2, 1, TexelOrder::Linear).unwrap();
        texture.set_texel(0, 0, 0, Color([255u8, 0, 0]));
        texture.set_texel(1, 0, 0, Color([0u8, 255, 0]));
        texture.set_texel(0, 1, 0, Color([0u8, 0, 255]));
        texture.set_texel(1, 1, 0, Color([255u8, 255, 255]));
        texture
    }

    #[test]
    fn nearest_picks_the_containing_texel() {
        let texture = checker_2x2();

        assert_eq!(nearest::<u8, 3>(&texture, 0.1, 0.1), Color([255, 0, 0]));
        assert_eq!(nearest::<u8, 3>(&texture, 0.9, 0.1), Color([0, 255, 0]));
        assert_eq!(nearest::<u8, 3>(&texture, 0.1, 0.9), Color([0, 0, 255]));
        assert_eq!(nearest::<u8, 3>(&texture, 0.9, 0.9), Color([255, 255, 255]));
    }

    #[test]
    fn nearest_repeat_is_periodic() {
        let texture = checker_2x2();

        for u in [0.1f32, 0.3, 0.6, 0.9] {
            for v in [0.2f32, 0.7] {
                let base: Color<u8, 3> = nearest(&texture, u, v);
                assert_eq!(nearest::<u8, 3>(&texture, u + 1.0, v), base);
                assert_eq!(nearest::<u8, 3>(&texture, u - 1.0, v), base);
                assert_eq!(nearest::<u8, 3>(&texture, u, v + 1.0), base);
            }
        }
    }

    #[test]
    fn cutoff_returns_zero_outside_the_unit_square() {
        let mut texture = checker_2x2();
        texture.set_wrap_mode(WrapMode::Cutoff);

        assert_eq!(nearest::<u8, 3>(&texture, 1.5, 0.5), Color([0, 0, 0]));
        assert_eq!(nearest::<u8, 3>(&texture, -0.5, 0.5), Color([0, 0, 0]));
        assert_eq!(bilinear::<u8, 3>(&texture, 0.5, 1.5), Color([0, 0, 0]));
        assert_ne!(nearest::<u8, 3>(&texture, 0.9, 0.9), Color([0, 0, 0]));
    }

    #[test]
    fn bilinear_averages_the_four_taps() {
        let texture = checker_2x2();

        // (0.25, 0.25) lands halfway between all four texels.
        let sample: Color<u8, 3> = bilinear(&texture, 0.25, 0.25);
        for channel in 0..3 {
            assert!(
                sample[channel].abs_diff(128) <= 1,
                "channel {}: {:?}",
                channel,
                sample
            );
        }

        // Dead center of a texel reproduces it.
        let sample: Color<u8, 3> = bilinear(&texture, 0.0, 0.0);
        assert_eq!(sample, Color([255, 0, 0]));
    }

    #[test]
    fn bilinear_is_identical_across_texel_orders() {
        let mut linear =
            Texture::new(ColorFormat::Rgba8Unorm, 16, 16, 1, TexelOrder::Linear).unwrap();
        let mut swizzled =
            Texture::new(ColorFormat::Rgba8Unorm, 16, 16, 1, TexelOrder::Swizzled).unwrap();

        for y in 0..16u32 {
            for x in 0..16u32 {
                let texel = Color([x as u8 * 16, y as u8 * 16, (x + y) as u8, 255]);
                linear.set_texel(x, y, 0, texel);
                swizzled.set_texel(x, y, 0, texel);
            }
        }

        for step_v in 0..24 {
            for step_u in 0..24 {
                let u = step_u as f32 / 23.0;
                let v = step_v as f32 / 23.0;
                assert_eq!(
                    bilinear::<u8, 4>(&linear, u, v),
                    bilinear::<u8, 4>(&swizzled, u, v),
                );
                assert_eq!(
                    nearest::<u8, 4>(&linear, u, v),
                    nearest::<u8, 4>(&swizzled, u, v),
                );
            }
        }
    }

    #[test]
    fn trilinear_blends_toward_the_floor_neighbors() {
        let mut texture =
            Texture::new(ColorFormat::R32Float, 4, 4, 1, TexelOrder::Linear).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                texture.set_texel(x, y, 0, Color([x as f32]));
            }
        }

        // Texel coordinate 2.5: taps at x=2 and x=1, weighted 0.5 each.
        let sample: Color<f32, 1> = trilinear(&texture, 2.5 / 4.0, 0.5 / 4.0);
        assert!((sample[0] - 1.5).abs() < 1.0e-4, "{:?}", sample);
    }
}
