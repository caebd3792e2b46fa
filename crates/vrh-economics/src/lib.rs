//! # VRH Economics - Vote-Escrowed Guild Rewards
//!
//! Accounting model for a vote-escrow governance token whose emissions flow
//! to guilds in proportion to the locked voting power of their members.
//!
//! ## Key Features
//!
//! - **Vote escrow**: lock up to 4 years, voting power decays linearly
//! - **Guild weights**: weekly series aggregated per guild, per type, in total
//! - **Boosting**: gas-token deposits lift a member's working balance up to 2.5x
//! - **Owner commission**: up to 20% of a guild's emissions, changed one step per week
//! - **Vested minting**: 30% paid out immediately, 70% vests over 168 days
//!
//! ## Emission Schedule
//!
//! | Epoch | Starts | Rate |
//! |-------|--------|------|
//! | 0 | deploy + 1 day | 121,587,840 VRH / year |
//! | n | + n years | epoch 0 × 2^(-n/4) |
//!
//! ## Usage
//!
//! ```text
//! let ledger = Ledger::new(admin, ProtocolConfig::default(), ManualClock::new(t0))?;
//! ledger.submit(Request::new(alice, Operation::CreateLock { amount, unlock_time }));
//! ```

pub mod authority;
pub mod config;
pub mod controller;
pub mod dao;
pub mod events;
pub mod gas_escrow;
pub mod guild;
pub mod ledger;
pub mod minter;
pub mod token;
pub mod vesting;
pub mod voting_escrow;
pub mod weights;

// Re-exports
pub use authority::{Authority, MinterRole};
pub use config::{EmissionConfig, EscrowConfig, GuildConfig, ProtocolConfig, RewardConfig};
pub use controller::{GuildController, GuildType};
pub use dao::Dao;
pub use events::{DepositKind, Event, EventLog};
pub use gas_escrow::GasEscrow;
pub use guild::Guild;
pub use ledger::{Ledger, Operation, Outcome, Request, Response};
pub use minter::{MintReceipt, Minter};
pub use token::{EmissionToken, MiningUpdate, TokenLedger};
pub use vesting::{RewardVestingEscrow, VestingEntry};
pub use voting_escrow::{LockedBalance, Point, VotingEscrow};
pub use weights::WeightBook;

/// VRH token constants
pub mod constants {
    /// Token symbol
    pub const SYMBOL: &str = "VRH";

    /// Token name
    pub const NAME: &str = "Vote-escrowed Reward Hub";

    /// Rate divisor per mining epoch, 2^0.25 in 18-decimal fixed point
    pub const RATE_REDUCTION_COEFFICIENT: u64 = 1_189_207_115_002_721_024;

    /// Number of commission steps an owner may take
    pub const MAX_COMMISSION_RATE: u8 = 20;
}
