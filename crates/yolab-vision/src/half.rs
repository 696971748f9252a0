//! IEEE-754 binary16 <-> binary32 conversion on raw bit patterns.
//!
//! Model tensors travel as `u16` bit patterns. Narrowing truncates the
//! mantissa by default; `HalfRounding::NearestEven` is available when a model
//! is sensitive to the bias truncation introduces.

use serde::{Deserialize, Serialize};

const F16_EXP_MASK: u16 = 0x7C00;
const F16_INF: u16 = 0x7C00;
const F16_NAN: u16 = 0x7E00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalfRounding {
    /// Drop the low 13 mantissa bits.
    #[default]
    Truncate,
    /// Round half to even on the dropped bits.
    NearestEven,
}

/// Narrow with truncation.
pub fn f32_to_f16(value: f32) -> u16 {
    f32_to_f16_with(value, HalfRounding::Truncate)
}

pub fn f32_to_f16_with(value: f32, rounding: HalfRounding) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xFF) as i32;
    let mant = bits & 0x007F_FFFF;

    if exp == 0xFF {
        return sign | if mant != 0 { F16_NAN } else { F16_INF };
    }

    let half_exp = exp - 127 + 15;
    if half_exp >= 0x1F {
        return sign | F16_INF;
    }

    if half_exp <= 0 {
        // Subnormal in half precision: shift the full significand (implicit
        // bit included) down to units of 2^-24.
        let shift = (14 - half_exp) as u32;
        if shift > 24 {
            return sign;
        }
        let full = mant | 0x0080_0000;
        let kept = full >> shift;
        let rounded = match rounding {
            HalfRounding::Truncate => kept,
            HalfRounding::NearestEven => round_even(kept, full & ((1 << shift) - 1), 1 << (shift - 1)),
        };
        // A carry out of the subnormal range lands on the smallest normal.
        return sign | rounded as u16;
    }

    let kept = ((half_exp as u32) << 10) | (mant >> 13);
    let rounded = match rounding {
        HalfRounding::Truncate => kept,
        HalfRounding::NearestEven => round_even(kept, mant & 0x1FFF, 0x1000),
    };
    // Rounding may carry into the exponent, up to and including infinity.
    sign | rounded.min(F16_INF as u32) as u16
}

fn round_even(kept: u32, rest: u32, halfway: u32) -> u32 {
    if rest > halfway || (rest == halfway && kept & 1 == 1) {
        kept + 1
    } else {
        kept
    }
}

pub fn f16_to_f32(half: u16) -> f32 {
    let sign = ((half & 0x8000) as u32) << 16;
    let exp = ((half & F16_EXP_MASK) >> 10) as i32;
    let mut mant = (half & 0x03FF) as u32;

    if exp == 0x1F {
        // Keep the payload so NaN stays NaN; zero payload is infinity.
        return f32::from_bits(sign | 0x7F80_0000 | (mant << 13));
    }

    if exp == 0 {
        if mant == 0 {
            return f32::from_bits(sign);
        }
        let mut e = 1i32;
        while mant & 0x0400 == 0 {
            mant <<= 1;
            e -= 1;
        }
        mant &= 0x03FF;
        let exp32 = (e - 15 + 127) as u32;
        return f32::from_bits(sign | (exp32 << 23) | (mant << 13));
    }

    let exp32 = (exp - 15 + 127) as u32;
    f32::from_bits(sign | (exp32 << 23) | (mant << 13))
}

pub fn f32_slice_to_f16(values: &[f32], rounding: HalfRounding) -> Vec<u16> {
    values.iter().map(|&v| f32_to_f16_with(v, rounding)).collect()
}

pub fn f16_slice_to_f32(values: &[u16]) -> Vec<f32> {
    values.iter().map(|&h| f16_to_f32(h)).collect()
}
