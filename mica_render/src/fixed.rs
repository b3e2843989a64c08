//! Unsigned 32.32 fixed-point arithmetic for the blit rescale path.
//!
//! The nearest-neighbor rescale derives integer source coordinates from a
//! constant ratio. Doing that in fixed point keeps the per-pixel work to a
//! multiply and a shift and is bit-exact across platforms, where a float
//! multiply-truncate is at the mercy of rounding mode.

/// Unsigned fixed-point scalar with 32 fractional bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fixed32(u64);

impl Fixed32 {
    pub const FRACTION_BITS: u32 = 32;

    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1 << Self::FRACTION_BITS);

    pub const fn from_int(value: u32) -> Self {
        Self((value as u64) << Self::FRACTION_BITS)
    }

    /// The ratio `numerator / denominator` as a fixed-point scale.
    ///
    /// `denominator` must be non-zero.
    pub const fn from_ratio(numerator: u32, denominator: u32) -> Self {
        Self(((numerator as u64) << Self::FRACTION_BITS) / denominator as u64)
    }

    /// Truncates to the integer part.
    pub const fn to_int(self) -> u32 {
        (self.0 >> Self::FRACTION_BITS) as u32
    }

    /// Scales an integer by this ratio, truncating the result.
    ///
    /// This is the blit inner-loop operation: `src = dst * ratio`.
    pub const fn scale_int(self, value: u32) -> u32 {
        ((value as u64 * self.0) >> Self::FRACTION_BITS) as u32
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}
