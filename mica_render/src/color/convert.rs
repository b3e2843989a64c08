//! Conversions between RGB and the HSV/HSL/YCoCg color models.
//!
//! Hue is in degrees, `0.0..360.0`. Zero-chroma inputs (grays) always
//! report hue 0 and saturation 0 rather than leaving them undefined.

use super::{Channel, Color, ColorRgb};

const CHROMA_EPSILON: f32 = 1.0e-6;

/// Hue / saturation / value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

/// Hue / saturation / lightness.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Hsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

/// Reversible YCoCg-R decomposition of an 8-bit RGB color.
///
/// The chroma offsets keep the extra precision bit, which is what makes
/// the transform lossless.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct YCoCg {
    pub y: u8,
    pub co: i16,
    pub cg: i16,
}

fn normalize<T: Channel>(color: ColorRgb<T>) -> (f32, f32, f32) {
    (
        color[0].to_norm_f32(),
        color[1].to_norm_f32(),
        color[2].to_norm_f32(),
    )
}

fn hue_and_chroma(r: f32, g: f32, b: f32) -> (f32, f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    if delta <= CHROMA_EPSILON {
        return (0.0, 0.0, max, min);
    }

    let mut hue = 60.0
        * if (max - r).abs() <= CHROMA_EPSILON {
            ((g - b) / delta).rem_euclid(6.0)
        } else if (max - g).abs() <= CHROMA_EPSILON {
            2.0 + (b - r) / delta
        } else {
            4.0 + (r - g) / delta
        };

    if hue < 0.0 {
        hue += 360.0;
    }

    (hue, delta, max, min)
}

/// Converts an RGB color of any channel type to HSV.
pub fn hsv_from_rgb<T: Channel>(color: ColorRgb<T>) -> Hsv {
    let (r, g, b) = normalize(color);
    let (h, delta, max, _) = hue_and_chroma(r, g, b);

    let s = if max <= CHROMA_EPSILON {
        0.0
    } else {
        delta / max
    };

    Hsv { h, s, v: max }
}

/// Converts an RGB color of any channel type to HSL.
pub fn hsl_from_rgb<T: Channel>(color: ColorRgb<T>) -> Hsl {
    let (r, g, b) = normalize(color);
    let (h, delta, max, min) = hue_and_chroma(r, g, b);

    let l = 0.5 * (max + min);
    let s = if delta <= CHROMA_EPSILON {
        0.0
    } else {
        delta / (1.0 - (2.0 * l - 1.0).abs())
    };

    Hsl { h, s, l }
}

fn sector(h: f32, c: f32, x: f32) -> (f32, f32, f32) {
    if h <= 60.0 {
        (c, x, 0.0)
    } else if h <= 120.0 {
        (x, c, 0.0)
    } else if h <= 180.0 {
        (0.0, c, x)
    } else if h <= 240.0 {
        (0.0, x, c)
    } else if h <= 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    }
}

/// Converts an HSV color to RGB with channel type `T`.
pub fn rgb_from_hsv<T: Channel>(color: Hsv) -> ColorRgb<T> {
    let c = color.v * color.s;
    let x = c * (1.0 - ((color.h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = color.v - c;

    let (r, g, b) = sector(color.h, c, x);

    Color([
        T::from_norm(f64::from(r + m)),
        T::from_norm(f64::from(g + m)),
        T::from_norm(f64::from(b + m)),
    ])
}

/// Converts an HSL color to RGB with channel type `T`.
pub fn rgb_from_hsl<T: Channel>(color: Hsl) -> ColorRgb<T> {
    let c = (1.0 - (2.0 * color.l - 1.0).abs()) * color.s;
    let x = c * (1.0 - ((color.h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = color.l - 0.5 * c;

    let (r, g, b) = sector(color.h, c, x);

    Color([
        T::from_norm(f64::from(r + m)),
        T::from_norm(f64::from(g + m)),
        T::from_norm(f64::from(b + m)),
    ])
}

pub fn hsv_from_hsl(color: Hsl) -> Hsv {
    let v = color.l + color.s * color.l.min(1.0 - color.l);
    let s = if v <= CHROMA_EPSILON {
        0.0
    } else {
        2.0 * (1.0 - color.l / v)
    };

    Hsv { h: color.h, s, v }
}

pub fn hsl_from_hsv(color: Hsv) -> Hsl {
    let l = color.v * (1.0 - 0.5 * color.s);
    let denom = l.min(1.0 - l);
    let s = if denom <= CHROMA_EPSILON {
        0.0
    } else {
        (color.v - l) / denom
    };

    Hsl { h: color.h, s, l }
}

/// Forward YCoCg-R transform.
pub fn ycocg_from_rgb(color: ColorRgb<u8>) -> YCoCg {
    let r = i16::from(color[0]);
    let g = i16::from(color[1]);
    let b = i16::from(color[2]);

    let co = r - b;
    let tmp = b + (co >> 1);
    let cg = g - tmp;
    let y = tmp + (cg >> 1);

    YCoCg { y: y as u8, co, cg }
}

/// Inverse YCoCg-R transform. Exact inverse of [`ycocg_from_rgb`].
pub fn rgb_from_ycocg(color: YCoCg) -> ColorRgb<u8> {
    let tmp = i16::from(color.y) - (color.cg >> 1);
    let g = color.cg + tmp;
    let b = tmp - (color.co >> 1);
    let r = b + color.co;

    Color([r as u8, g as u8, b as u8])
}
