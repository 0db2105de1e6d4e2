//! Size-based fee estimation
//!
//! The size model assumes standard P2PKH inputs (signature script with a
//! compressed key) and standard P2PKH outputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TransferError;
use crate::Result;

/// Fixed transaction overhead: version, locktime and the two count varints
pub const TX_OVERHEAD_BYTES: u64 = 10;
pub const P2PKH_INPUT_BYTES: u64 = 148;
pub const P2PKH_OUTPUT_BYTES: u64 = 34;

/// Price per byte of serialized transaction, in base units.
///
/// Always finite and strictly positive. Fractional rates are allowed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct FeeRate(f64);

impl FeeRate {
    pub const SLOW: FeeRate = FeeRate(1.0);
    pub const NORMAL: FeeRate = FeeRate(5.0);
    pub const FAST: FeeRate = FeeRate(10.0);
    pub const DEFAULT: FeeRate = FeeRate::NORMAL;

    pub fn new(per_byte: f64) -> Result<Self> {
        if !per_byte.is_finite() || per_byte <= 0.0 {
            return Err(TransferError::InvalidRequest(format!(
                "Fee rate must be positive, got {}",
                per_byte
            )));
        }
        Ok(Self(per_byte))
    }

    pub fn per_byte(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for FeeRate {
    type Error = TransferError;

    fn try_from(value: f64) -> Result<Self> {
        FeeRate::new(value)
    }
}

impl From<FeeRate> for f64 {
    fn from(rate: FeeRate) -> f64 {
        rate.0
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} base units/byte", self.0)
    }
}

/// Named presets offered to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeSpeed {
    Slow,
    Normal,
    Fast,
}

impl FeeSpeed {
    pub const ALL: [FeeSpeed; 3] = [FeeSpeed::Slow, FeeSpeed::Normal, FeeSpeed::Fast];

    pub fn rate(&self) -> FeeRate {
        match self {
            FeeSpeed::Slow => FeeRate::SLOW,
            FeeSpeed::Normal => FeeRate::NORMAL,
            FeeSpeed::Fast => FeeRate::FAST,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeeSpeed::Slow => "slow",
            FeeSpeed::Normal => "normal",
            FeeSpeed::Fast => "fast",
        }
    }
}

impl FromStr for FeeSpeed {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "slow" => Ok(FeeSpeed::Slow),
            "normal" => Ok(FeeSpeed::Normal),
            "fast" => Ok(FeeSpeed::Fast),
            other => Err(TransferError::InvalidRequest(format!(
                "unknown fee speed '{}', expected slow, normal or fast",
                other
            ))),
        }
    }
}

/// Estimated serialized size in bytes
pub fn estimate_size(input_count: usize, output_count: usize) -> u64 {
    TX_OVERHEAD_BYTES
        + P2PKH_INPUT_BYTES * input_count as u64
        + P2PKH_OUTPUT_BYTES * output_count as u64
}

/// `ceil(size * rate)` in base units
pub fn estimate_fee(input_count: usize, output_count: usize, rate: FeeRate) -> u64 {
    let size = estimate_size(input_count, output_count);
    (size as f64 * rate.per_byte()).ceil() as u64
}
