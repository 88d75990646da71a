//! Value types carried by packets: peer identities, spatial values and
//! the fixed-point decimal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SgmError};

// ── PeerId ───────────────────────────────────────────────────────

/// Opaque platform identity of a network participant.
///
/// Issued by the transport / auth backend; the core only compares,
/// hashes and stores it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl PeerId {
    /// The "no peer" identity.
    pub const NIL: PeerId = PeerId(0);

    /// Returns `true` for any identity other than [`PeerId::NIL`].
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for PeerId {
    fn from(value: u64) -> Self {
        PeerId(value)
    }
}

// ── Vector3 / Quaternion ─────────────────────────────────────────

/// Three-component vector, encoded as three `f32` (x, y, z).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Rotation quaternion, encoded as four `f32` in w, x, y, z order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion::new(1.0, 0.0, 0.0, 0.0);

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ── Decimal ──────────────────────────────────────────────────────

/// Fixed-point decimal: a 96-bit unsigned mantissa, a sign and a
/// power-of-ten scale in `0..=28`.
///
/// On the wire it occupies 16 bytes as four little-endian `i32`:
/// `lo`, `mid`, `hi` (the mantissa) and `flags` (scale in bits 16..24,
/// sign in bit 31, every other bit zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    mantissa: u128,
    scale: u8,
    negative: bool,
}

impl Decimal {
    pub const MAX_SCALE: u8 = 28;
    const MANTISSA_LIMIT: u128 = 1 << 96;
    const SIGN_BIT: u32 = 0x8000_0000;
    const SCALE_MASK: u32 = 0x00FF_0000;

    /// `value / 10^scale`. Fails if `|value| >= 2^96` or `scale > 28`.
    pub fn new(value: i128, scale: u8) -> Result<Self> {
        let mantissa = value.unsigned_abs();
        if mantissa >= Self::MANTISSA_LIMIT || scale > Self::MAX_SCALE {
            return Err(SgmError::DecimalOutOfRange);
        }
        Ok(Self {
            mantissa,
            scale,
            negative: value < 0,
        })
    }

    /// Rebuild from the four wire words.
    pub fn from_parts(lo: i32, mid: i32, hi: i32, flags: i32) -> Result<Self> {
        let flags = flags as u32;
        if flags & !(Self::SIGN_BIT | Self::SCALE_MASK) != 0 {
            return Err(SgmError::DecimalOutOfRange);
        }
        let scale = ((flags & Self::SCALE_MASK) >> 16) as u8;
        if scale > Self::MAX_SCALE {
            return Err(SgmError::DecimalOutOfRange);
        }
        let mantissa =
            (lo as u32 as u128) | ((mid as u32 as u128) << 32) | ((hi as u32 as u128) << 64);
        Ok(Self {
            mantissa,
            scale,
            negative: flags & Self::SIGN_BIT != 0,
        })
    }

    /// The four wire words: `[lo, mid, hi, flags]`.
    pub fn to_parts(&self) -> [i32; 4] {
        let mut flags = (self.scale as u32) << 16;
        if self.negative {
            flags |= Self::SIGN_BIT;
        }
        [
            self.mantissa as u32 as i32,
            (self.mantissa >> 32) as u32 as i32,
            (self.mantissa >> 64) as u32 as i32,
            flags as i32,
        ]
    }

    /// Signed mantissa (the value before scaling).
    pub fn mantissa(&self) -> i128 {
        let m = self.mantissa as i128;
        if self.negative { -m } else { m }
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Lossy conversion for display and physics code.
    pub fn to_f64(&self) -> f64 {
        self.mantissa() as f64 / 10f64.powi(self.scale as i32)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        let scale = self.scale as usize;
        let digits = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        if self.negative && self.mantissa != 0 {
            f.write_str("-")?;
        }
        if scale == 0 {
            f.write_str(&digits)
        } else {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{int}.{frac}")
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
