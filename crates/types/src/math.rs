//! # Safe Split Arithmetic
//!
//! Overflow-checked integer operations on minor-unit amounts. Every split
//! floors, and every helper that floors also reports the remainder so callers
//! can carry it instead of dropping it.

use crate::constants::BPS_DENOMINATOR;
use crate::errors::{EngineError, EngineResult};

/// Macro to generate checked arithmetic functions
macro_rules! safe_arith {
    ($fn_name:ident, $type:ty, $checked_method:ident, $context:expr) => {
        /// Checked arithmetic that maps overflow to an engine error
        pub fn $fn_name(a: $type, b: $type) -> EngineResult<$type> {
            a.$checked_method(b).ok_or(EngineError::Arithmetic($context))
        }
    };
}

safe_arith!(safe_add, i64, checked_add, "add");
safe_arith!(safe_sub, i64, checked_sub, "sub");
safe_arith!(safe_mul, i64, checked_mul, "mul");
safe_arith!(safe_add_u32, u32, checked_add, "add_u32");

/// floor(amount × bps / 10000), computed in i128 so large amounts cannot overflow
pub fn bps_share(amount: i64, bps: i64) -> EngineResult<i64> {
    if amount < 0 || !(0..=BPS_DENOMINATOR).contains(&bps) {
        return Err(EngineError::invalid("bps_share", format!("{} @ {}bps", amount, bps), "non-negative amount and bps in [0, 10000]"));
    }
    let product = (amount as i128) * (bps as i128);
    i64::try_from(product / BPS_DENOMINATOR as i128).map_err(|_| EngineError::Arithmetic("bps_share"))
}

/// Divide `total` into `parts` equal floor shares, returning (share, remainder)
pub fn split_evenly(total: i64, parts: usize) -> EngineResult<(i64, i64)> {
    if parts == 0 {
        return Err(EngineError::invalid("parts", 0, "at least one part"));
    }
    let parts = i64::try_from(parts).map_err(|_| EngineError::Arithmetic("split_evenly"))?;
    Ok((total / parts, total % parts))
}

/// Split `total` across a share table. Every entry floors; the remainder is
/// added to entry 0 so the result always sums to `total` exactly.
pub fn split_by_table<const N: usize>(total: i64, table: &[i64; N]) -> EngineResult<[i64; N]> {
    let mut out = [0i64; N];
    let mut allocated = 0i64;
    for (slot, bps) in out.iter_mut().zip(table.iter()) {
        *slot = bps_share(total, *bps)?;
        allocated = safe_add(allocated, *slot)?;
    }
    if N > 0 {
        out[0] = safe_add(out[0], safe_sub(total, allocated)?)?;
    }
    Ok(out)
}
