//! Typed pixel formats and cross-format color casts.
//!
//! A [`Color`] is a fixed-size tuple of one scalar channel type. Casting
//! between channel types rescales so that full intensity maps to full
//! intensity: `U::MAX -> T::MAX` between integers, `U::MAX -> 1.0` from
//! integer to float and `1.0 -> T::MAX` back. Float-to-float casts are
//! plain numeric casts.

mod convert;

use std::ops::{Add, Index, IndexMut, Mul};

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use half::f16;

pub use convert::{
    hsl_from_hsv, hsl_from_rgb, hsv_from_hsl, hsv_from_rgb, rgb_from_hsl, rgb_from_hsv,
    rgb_from_ycocg, ycocg_from_rgb, Hsl, Hsv, YCoCg,
};

/// Scalar type of a single color channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

impl ChannelKind {
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
            Self::F16 => 2,
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F16 | Self::F32 | Self::F64)
    }
}

/// Tagged texel format: component count times channel type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    R8Unorm,
    R16Unorm,
    R32Unorm,
    R64Unorm,
    R16Float,
    R32Float,
    R64Float,

    Rg8Unorm,
    Rg16Unorm,
    Rg32Unorm,
    Rg64Unorm,
    Rg16Float,
    Rg32Float,
    Rg64Float,

    Rgb8Unorm,
    Rgb16Unorm,
    Rgb32Unorm,
    Rgb64Unorm,
    Rgb16Float,
    Rgb32Float,
    Rgb64Float,

    Rgba8Unorm,
    Rgba16Unorm,
    Rgba32Unorm,
    Rgba64Unorm,
    Rgba16Float,
    Rgba32Float,
    Rgba64Float,

    #[default]
    Invalid,
}

impl ColorFormat {
    pub const fn components_per_pixel(self) -> usize {
        match self {
            Self::R8Unorm
            | Self::R16Unorm
            | Self::R32Unorm
            | Self::R64Unorm
            | Self::R16Float
            | Self::R32Float
            | Self::R64Float => 1,
            Self::Rg8Unorm
            | Self::Rg16Unorm
            | Self::Rg32Unorm
            | Self::Rg64Unorm
            | Self::Rg16Float
            | Self::Rg32Float
            | Self::Rg64Float => 2,
            Self::Rgb8Unorm
            | Self::Rgb16Unorm
            | Self::Rgb32Unorm
            | Self::Rgb64Unorm
            | Self::Rgb16Float
            | Self::Rgb32Float
            | Self::Rgb64Float => 3,
            Self::Rgba8Unorm
            | Self::Rgba16Unorm
            | Self::Rgba32Unorm
            | Self::Rgba64Unorm
            | Self::Rgba16Float
            | Self::Rgba32Float
            | Self::Rgba64Float => 4,
            Self::Invalid => 0,
        }
    }

    pub const fn channel(self) -> ChannelKind {
        match self {
            Self::R8Unorm | Self::Rg8Unorm | Self::Rgb8Unorm | Self::Rgba8Unorm => ChannelKind::U8,
            Self::R16Unorm | Self::Rg16Unorm | Self::Rgb16Unorm | Self::Rgba16Unorm => {
                ChannelKind::U16
            }
            Self::R32Unorm | Self::Rg32Unorm | Self::Rgb32Unorm | Self::Rgba32Unorm => {
                ChannelKind::U32
            }
            Self::R64Unorm | Self::Rg64Unorm | Self::Rgb64Unorm | Self::Rgba64Unorm => {
                ChannelKind::U64
            }
            Self::R16Float | Self::Rg16Float | Self::Rgb16Float | Self::Rgba16Float => {
                ChannelKind::F16
            }
            Self::R32Float | Self::Rg32Float | Self::Rgb32Float | Self::Rgba32Float => {
                ChannelKind::F32
            }
            Self::R64Float | Self::Rg64Float | Self::Rgb64Float | Self::Rgba64Float => {
                ChannelKind::F64
            }
            // `Invalid` never reaches channel-level dispatch; every entry
            // point rejects it up front.
            Self::Invalid => ChannelKind::U8,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        self.components_per_pixel() * self.channel().bytes()
    }

    pub const fn is_float(self) -> bool {
        self.channel().is_float()
    }

    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// A single color channel scalar.
///
/// `to_norm`/`from_norm` convert through a normalized `f64` intermediate,
/// which preserves the ±1 ULP round-trip guarantee even for the 32- and
/// 64-bit integer channels (an `f32` intermediate would not).
///
/// `to_norm_f32`/`from_norm_f32` round to `f32` exactly once. The narrow
/// integer channels are defined against the single `value * (1.0 / MAX)`
/// product in `f32`; going through the `f64` intermediate first would
/// round a second time and flip the last bit for many inputs.
pub trait Channel: Pod + PartialOrd + Send + Sync + 'static {
    const KIND: ChannelKind;

    fn to_norm(self) -> f64;

    fn from_norm(norm: f64) -> Self;

    fn to_norm_f32(self) -> f32 {
        self.to_norm() as f32
    }

    fn from_norm_f32(norm: f32) -> Self {
        Self::from_norm(f64::from(norm))
    }
}

impl Channel for u8 {
    const KIND: ChannelKind = ChannelKind::U8;

    fn to_norm(self) -> f64 {
        f64::from(self) / 255.0
    }

    fn from_norm(norm: f64) -> Self {
        (norm.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    fn to_norm_f32(self) -> f32 {
        f32::from(self) * (1.0 / 255.0)
    }
}

impl Channel for u16 {
    const KIND: ChannelKind = ChannelKind::U16;

    fn to_norm(self) -> f64 {
        f64::from(self) / 65535.0
    }

    fn from_norm(norm: f64) -> Self {
        (norm.clamp(0.0, 1.0) * 65535.0).round() as u16
    }

    fn to_norm_f32(self) -> f32 {
        f32::from(self) * (1.0 / 65535.0)
    }
}

impl Channel for u32 {
    const KIND: ChannelKind = ChannelKind::U32;

    fn to_norm(self) -> f64 {
        f64::from(self) / f64::from(u32::MAX)
    }

    fn from_norm(norm: f64) -> Self {
        (norm.clamp(0.0, 1.0) * f64::from(u32::MAX)).round() as u32
    }
}

impl Channel for u64 {
    const KIND: ChannelKind = ChannelKind::U64;

    fn to_norm(self) -> f64 {
        self as f64 / u64::MAX as f64
    }

    fn from_norm(norm: f64) -> Self {
        (norm.clamp(0.0, 1.0) * u64::MAX as f64).round() as u64
    }
}

impl Channel for f16 {
    const KIND: ChannelKind = ChannelKind::F16;

    fn to_norm(self) -> f64 {
        f64::from(self.to_f32())
    }

    fn from_norm(norm: f64) -> Self {
        f16::from_f32(norm as f32)
    }

    fn to_norm_f32(self) -> f32 {
        self.to_f32()
    }

    fn from_norm_f32(norm: f32) -> Self {
        f16::from_f32(norm)
    }
}

impl Channel for f32 {
    const KIND: ChannelKind = ChannelKind::F32;

    fn to_norm(self) -> f64 {
        f64::from(self)
    }

    fn from_norm(norm: f64) -> Self {
        norm as f32
    }

    fn to_norm_f32(self) -> f32 {
        self
    }

    fn from_norm_f32(norm: f32) -> Self {
        norm
    }
}

impl Channel for f64 {
    const KIND: ChannelKind = ChannelKind::F64;

    fn to_norm(self) -> f64 {
        self
    }

    fn from_norm(norm: f64) -> Self {
        norm
    }
}

/// A size-`N` tuple of one channel type.
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(transparent)]
pub struct Color<T, const N: usize>(pub [T; N]);

// SAFETY: `repr(transparent)` over `[T; N]`, which is zeroable/pod
// whenever `T` is.
unsafe impl<T: Zeroable, const N: usize> Zeroable for Color<T, N> {}
unsafe impl<T: Pod, const N: usize> Pod for Color<T, N> {}

pub type ColorR<T> = Color<T, 1>;
pub type ColorRg<T> = Color<T, 2>;
pub type ColorRgb<T> = Color<T, 3>;
pub type ColorRgba<T> = Color<T, 4>;

pub type ColorRgb8 = ColorRgb<u8>;
pub type ColorRgba8 = ColorRgba<u8>;

impl<T: Channel, const N: usize> Color<T, N> {
    pub fn splat(value: T) -> Self {
        Self([value; N])
    }

    /// Channel values as normalized floats, missing components defaulting
    /// to black with full alpha.
    pub fn to_normalized(self) -> Vec4 {
        let mut out = Vec4::new(0.0, 0.0, 0.0, 1.0);
        for (index, channel) in self.0.into_iter().enumerate() {
            out[index] = channel.to_norm_f32();
        }
        out
    }

    pub fn from_normalized(value: Vec4) -> Self {
        let mut out = [T::from_norm(0.0); N];
        for (index, channel) in out.iter_mut().enumerate() {
            *channel = T::from_norm_f32(value[index]);
        }
        Self(out)
    }
}

impl<T, const N: usize> Index<usize> for Color<T, N> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.0[index]
    }
}

impl<T, const N: usize> IndexMut<usize> for Color<T, N> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.0[index]
    }
}

impl<const N: usize> Add for Color<f32, N> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let mut out = self.0;
        for (lhs, rhs) in out.iter_mut().zip(rhs.0) {
            *lhs += rhs;
        }
        Self(out)
    }
}

impl<const N: usize> Mul<f32> for Color<f32, N> {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self(self.0.map(|channel| channel * rhs))
    }
}

/// Rescales every channel of `color` from `U` to `T`.
pub fn color_cast<T, U, const N: usize>(color: Color<U, N>) -> Color<T, N>
where
    T: Channel,
    U: Channel,
{
    Color(color.0.map(convert_channel::<T, U>))
}

#[inline]
fn convert_channel<T: Channel, U: Channel>(channel: U) -> T {
    // An `f32` destination rounds exactly once; everything else goes
    // through the `f64` intermediate that keeps the wide integer round
    // trips within ±1 ULP.
    if T::KIND == ChannelKind::F32 {
        T::from_norm_f32(channel.to_norm_f32())
    } else {
        T::from_norm(channel.to_norm())
    }
}

#[cfg(test)]
mod tests {
    use half::f16;

    use super::{color_cast, Channel, ChannelKind, Color, ColorFormat, ColorRgb, ColorRgba};

    #[test]
    fn format_sizes() {
        assert_eq!(ColorFormat::R8Unorm.bytes_per_pixel(), 1);
        assert_eq!(ColorFormat::Rg16Unorm.bytes_per_pixel(), 4);
        assert_eq!(ColorFormat::Rgb32Float.bytes_per_pixel(), 12);
        assert_eq!(ColorFormat::Rgba64Float.bytes_per_pixel(), 32);
        assert_eq!(ColorFormat::Rgba16Float.bytes_per_pixel(), 8);
        assert_eq!(ColorFormat::Invalid.bytes_per_pixel(), 0);

        assert_eq!(ColorFormat::R64Unorm.components_per_pixel(), 1);
        assert_eq!(ColorFormat::Rgb8Unorm.components_per_pixel(), 3);
        assert_eq!(ColorFormat::Rgba32Unorm.components_per_pixel(), 4);

        assert_eq!(ColorFormat::R16Float.channel(), ChannelKind::F16);
        assert!(ColorFormat::Rg64Float.is_float());
        assert!(!ColorFormat::Rgba8Unorm.is_float());
    }

    #[test]
    fn full_intensity_maps_to_full_intensity() {
        let white: ColorRgba<u8> = Color([255; 4]);

        assert_eq!(color_cast::<u16, _, 4>(white), Color([65535; 4]));
        assert_eq!(color_cast::<u64, _, 4>(white), Color([u64::MAX; 4]));
        assert_eq!(color_cast::<f32, _, 4>(white), Color([1.0; 4]));

        let unit: ColorRgba<f32> = Color([1.0; 4]);
        assert_eq!(color_cast::<u8, _, 4>(unit), Color([255; 4]));
        assert_eq!(color_cast::<u32, _, 4>(unit), Color([u32::MAX; 4]));
    }

    #[test]
    fn u8_to_f32_matches_reference_product() {
        for value in 0..=255u8 {
            // Bit-identical to the single `f32` product, on both the cast
            // and the Vec4 bridging paths.
            let reference = f32::from(value) * (1.0 / 255.0);

            let cast: Color<f32, 1> = color_cast(Color([value]));
            assert_eq!(cast[0], reference);
            assert_eq!(Color([value]).to_normalized().x, reference);
        }
    }

    #[test]
    fn u16_to_f32_matches_reference_product() {
        for value in [0u16, 1, 2, 3, 255, 257, 32767, 32768, 65534, 65535] {
            let reference = f32::from(value) * (1.0 / 65535.0);

            let cast: Color<f32, 1> = color_cast(Color([value]));
            assert_eq!(cast[0], reference);
            assert_eq!(Color([value]).to_normalized().x, reference);
        }
    }

    #[test]
    fn widening_round_trips_are_lossless() {
        for value in [0u8, 1, 2, 63, 127, 128, 254, 255] {
            let wide: Color<u16, 1> = color_cast(Color([value]));
            let back: Color<u8, 1> = color_cast(wide);
            assert_eq!(back[0], value);

            let wide: Color<u64, 1> = color_cast(Color([value]));
            let back: Color<u8, 1> = color_cast(wide);
            assert_eq!(back[0], value);
        }

        for value in [0u32, 1, 77, u32::MAX / 3, u32::MAX - 1, u32::MAX] {
            let wide: Color<u64, 1> = color_cast(Color([value]));
            let back: Color<u32, 1> = color_cast(wide);
            assert!(back[0].abs_diff(value) <= 1);
        }
    }

    #[test]
    fn float_to_int_clamps_out_of_range() {
        let loud: ColorRgb<f32> = Color([1.5, -0.25, 0.5]);
        let cast: ColorRgb<u8> = color_cast(loud);
        assert_eq!(cast, Color([255, 0, 128]));
    }

    #[test]
    fn float_to_float_is_numeric() {
        let color: Color<f32, 2> = Color([2.5, -1.0]);
        let wide: Color<f64, 2> = color_cast(color);
        assert_eq!(wide, Color([2.5, -1.0]));

        let half: Color<f16, 2> = color_cast(color);
        assert_eq!(half[0], f16::from_f32(2.5));
    }

    #[test]
    fn normalized_vec4_defaults_alpha() {
        let color: ColorRgb<u8> = Color([255, 0, 127]);
        let vec = color.to_normalized();
        assert_eq!(vec.x, 1.0);
        assert_eq!(vec.y, 0.0);
        assert_eq!(vec.w, 1.0);

        let back = ColorRgb::<u8>::from_normalized(vec);
        assert_eq!(back, color);
    }
}
