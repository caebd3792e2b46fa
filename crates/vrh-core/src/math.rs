//! Fixed-point helpers
//!
//! Balances are `u128`, but products such as `rate * weight * dt` overflow 128
//! bits long before they are divided back down, so every intermediate goes
//! through `U256`. Division always truncates, and always happens last.

use primitive_types::U256;

use crate::error::{DaoError, Result};
use crate::types::Timestamp;

/// Convert a `U256` back to `u128`
pub fn to_u128(value: U256, context: &'static str) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(DaoError::Overflow(context));
    }
    Ok(value.as_u128())
}

/// `a * b / c` with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(DaoError::Overflow("mul_div: division by zero"));
    }
    to_u128(U256::from(a) * U256::from(b) / U256::from(c), "mul_div")
}

/// Exact integral of a piecewise-constant rate over `[t0, t1)`.
///
/// `schedule` is a list of `(boundary, rate)` pairs sorted by boundary; each
/// rate applies from its boundary up to the next one. Time before the first
/// boundary contributes nothing.
pub fn integrate_rate(t0: Timestamp, t1: Timestamp, schedule: &[(Timestamp, u128)]) -> U256 {
    let mut total = U256::zero();
    if t1 <= t0 {
        return total;
    }
    for (i, &(start, rate)) in schedule.iter().enumerate() {
        let end = schedule
            .get(i + 1)
            .map(|&(boundary, _)| boundary)
            .unwrap_or(Timestamp::MAX);
        let lo = start.max(t0);
        let hi = end.min(t1);
        if hi > lo {
            total += U256::from(rate) * U256::from(hi - lo);
        }
    }
    total
}
