//! # VRH Core
//!
//! Shared building blocks for the VRH governance accounting engine.
//!
//! - `Address` - opaque 20-byte account / component identifier
//! - `Clock` - external, monotonically increasing time source
//! - `DaoError` - named failures with revert semantics
//! - `math` - 256-bit fixed-point helpers and the piecewise rate integral
//!
//! ## Time Model
//!
//! ```text
//!   |-------|-------|-------|-------|-------|-------|-------|-------|
//!   WEEK    : weight epochs (guild weights, commission changes)
//!   MONTH   : vesting periods (4 weeks)
//!   YEAR    : mining epochs (emission rate decays by 2^-0.25)
//!   MAXTIME : longest voting-escrow lock (4 years)
//! ```

pub mod clock;
pub mod error;
pub mod math;
pub mod types;

pub use clock::*;
pub use error::*;
pub use types::*;

pub use primitive_types::U256;

/// Protocol time and unit constants
pub mod constants {
    /// Seconds in an hour
    pub const HOUR: u64 = 3600;

    /// Seconds in a day
    pub const DAY: u64 = 86_400;

    /// Weight epoch length
    pub const WEEK: u64 = 7 * DAY;

    /// Vesting period length
    pub const MONTH: u64 = 4 * WEEK;

    /// Mining epoch length (365 days)
    pub const YEAR: u64 = 365 * DAY;

    /// Maximum voting-escrow lock: 4 years
    pub const MAXTIME: u64 = 4 * YEAR; // 126,144,000 seconds

    /// 18-decimal fixed-point unit
    pub const ONE: u128 = 1_000_000_000_000_000_000; // 10^18

    /// Token decimals
    pub const DECIMALS: u8 = 18;

    /// Percentage denominator
    pub const PERCENT: u128 = 100;
}

pub use constants::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::constants::*;
    pub use crate::error::{ensure, DaoError, Result};
    pub use crate::math::{integrate_rate, mul_div};
    pub use crate::types::*;
    pub use primitive_types::U256;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maxtime() {
        assert_eq!(MAXTIME, 126_144_000);
    }

    #[test]
    fn test_month_is_four_weeks() {
        assert_eq!(MONTH, 2_419_200);
        assert_eq!(6 * MONTH, 168 * DAY);
    }
}
