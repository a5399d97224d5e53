//! Interpolation helpers shared by the renderer, the color maps and the batch driver.

use crate::traits::Scalar;

/// Maps `x` from `[x_min, x_max]` onto `[y_min, y_max]`. The result is not
/// clamped, so values outside the source interval extrapolate linearly.
/// A degenerate source interval maps everything to `y_min`.
pub fn lin_interp<T: Scalar>(x: T, x_min: T, x_max: T, y_min: T, y_max: T) -> T {
    let span = x_max - x_min;
    if span == T::zero() {
        return y_min;
    }
    (x - x_min) * (y_max - y_min) / span + y_min
}

/// Like [`lin_interp`], but the normalized position is raised to `power`
/// first. Powers below one spend more of the output range near `y_max`.
pub fn pow_interp<T: Scalar>(x: T, power: T, x_min: T, x_max: T, y_min: T, y_max: T) -> T {
    let span = x_max - x_min;
    if span == T::zero() {
        return y_min;
    }
    let ratio = (x - x_min) / span;
    y_min + (y_max - y_min) * ratio.powf(power)
}

pub fn clamp<T: Scalar>(x: T, lo: T, hi: T) -> T {
    hi.min(lo.max(x))
}
