//! # Emission Token
//!
//! ERC20-like ledger with a decaying emission schedule.
//!
//! ## Mining Epochs
//!
//! ```text
//! Epoch 0: rate = 121,587,840 VRH / year
//! Epoch 1: rate = epoch 0 / 2^0.25   (~102.2M / year)
//! Epoch 2: rate = epoch 1 / 2^0.25   (~86.0M / year)
//! ...
//! ```
//!
//! The first epoch becomes available `inflation_delay` after deployment and
//! must be started explicitly (or lazily by a mint / guild checkpoint).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vrh_core::math::{integrate_rate, mul_div, to_u128};
use vrh_core::prelude::*;

use crate::authority::{Authority, MinterRole};
use crate::config::EmissionConfig;

/// Plain fungible balance ledger (also used for gas tokens)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenLedger {
    address: Address,
    name: String,
    symbol: String,
    balances: HashMap<Address, Amount>,
    total_supply: Amount,
}

impl TokenLedger {
    /// Create an empty ledger
    pub fn new(address: Address, name: &str, symbol: &str) -> Self {
        Self {
            address,
            name: name.to_string(),
            symbol: symbol.to_string(),
            balances: HashMap::new(),
            total_supply: 0,
        }
    }

    /// Token address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Token name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Balance of an account
    pub fn balance_of(&self, account: Address) -> Amount {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Total supply
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Move `value` from `from` to `to`
    pub fn transfer(&mut self, from: Address, to: Address, value: Amount) -> Result<()> {
        let balance = self.balance_of(from);
        if balance < value {
            return Err(DaoError::precondition("Insufficient balance"));
        }
        self.balances.insert(from, balance - value);
        *self.balances.entry(to).or_insert(0) += value;
        Ok(())
    }

    /// Create `value` new tokens for `to`
    pub fn credit(&mut self, to: Address, value: Amount) -> Result<()> {
        self.total_supply = self
            .total_supply
            .checked_add(value)
            .ok_or(DaoError::Overflow("token supply"))?;
        *self.balances.entry(to).or_insert(0) += value;
        Ok(())
    }
}

/// Result of advancing the mining epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningUpdate {
    /// Start of the new epoch
    pub time: Timestamp,
    /// Rate of the new epoch
    pub rate: Amount,
    /// Supply at the start of the new epoch
    pub supply: Amount,
}

/// Emission token with a decaying per-second rate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmissionToken {
    ledger: TokenLedger,
    admin: Authority,
    minter: MinterRole,
    params: EmissionConfig,

    /// -1 until the first epoch starts
    mining_epoch: i64,
    start_epoch_time: Timestamp,
    start_epoch_supply: Amount,
    rate: Amount,

    /// (epoch start, rate) for every started epoch
    rate_history: Vec<(Timestamp, Amount)>,
}

impl EmissionToken {
    /// Deploy the token; the initial supply goes to `admin`
    pub fn new(
        address: Address,
        name: &str,
        symbol: &str,
        admin: Address,
        params: EmissionConfig,
        now: Timestamp,
    ) -> Result<Self> {
        let mut ledger = TokenLedger::new(address, name, symbol);
        let initial_supply = params.initial_supply();
        ledger.credit(admin, initial_supply)?;

        Ok(Self {
            ledger,
            admin: Authority::new(admin),
            minter: MinterRole::default(),
            start_epoch_time: (now + params.inflation_delay)
                .saturating_sub(params.rate_reduction_time),
            params,
            mining_epoch: -1,
            start_epoch_supply: initial_supply,
            rate: 0,
            rate_history: Vec::new(),
        })
    }

    /// Underlying balance ledger
    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    /// Mutable balance ledger
    pub fn ledger_mut(&mut self) -> &mut TokenLedger {
        &mut self.ledger
    }

    /// Token address
    pub fn address(&self) -> Address {
        self.ledger.address
    }

    /// Admin role
    pub fn authority(&self) -> &Authority {
        &self.admin
    }

    /// Mutable admin role
    pub fn authority_mut(&mut self) -> &mut Authority {
        &mut self.admin
    }

    /// Designated minter
    pub fn minter(&self) -> Option<Address> {
        self.minter.get()
    }

    /// Current emission rate per second
    pub fn rate(&self) -> Amount {
        self.rate
    }

    /// Current mining epoch (-1 before the first)
    pub fn mining_epoch(&self) -> i64 {
        self.mining_epoch
    }

    /// Start of the current mining epoch
    pub fn start_epoch_time(&self) -> Timestamp {
        self.start_epoch_time
    }

    /// Rate that the next epoch will use
    fn next_rate(&self) -> Result<Amount> {
        if self.rate == 0 {
            Ok(self.params.initial_rate())
        } else {
            mul_div(self.rate, ONE, u128::from(self.params.rate_reduction_coefficient))
        }
    }

    fn epoch_due(&self, now: Timestamp) -> bool {
        now >= self.start_epoch_time + self.params.rate_reduction_time
    }

    fn advance_epoch(&mut self) -> Result<MiningUpdate> {
        let next_rate = self.next_rate()?;
        let mut supply = self.start_epoch_supply;
        if self.rate != 0 {
            supply += self.rate * u128::from(self.params.rate_reduction_time);
        }
        self.start_epoch_time += self.params.rate_reduction_time;
        self.mining_epoch += 1;
        self.start_epoch_supply = supply;
        self.rate = next_rate;
        self.rate_history.push((self.start_epoch_time, next_rate));

        tracing::info!(
            epoch = self.mining_epoch,
            rate = next_rate,
            "Mining epoch started at {}",
            self.start_epoch_time
        );

        Ok(MiningUpdate {
            time: self.start_epoch_time,
            rate: next_rate,
            supply,
        })
    }

    /// Start the next mining epoch
    pub fn update_mining_parameters(&mut self, now: Timestamp) -> Result<MiningUpdate> {
        if !self.epoch_due(now) {
            return Err(DaoError::precondition("too soon!"));
        }
        self.advance_epoch()
    }

    /// Start of the current epoch, advancing first if due
    pub fn start_epoch_time_write(&mut self, now: Timestamp) -> Result<Timestamp> {
        if self.epoch_due(now) {
            self.advance_epoch()?;
        }
        Ok(self.start_epoch_time)
    }

    /// Start of the next epoch, advancing first if due
    pub fn future_epoch_time_write(&mut self, now: Timestamp) -> Result<Timestamp> {
        if self.epoch_due(now) {
            self.advance_epoch()?;
        }
        Ok(self.start_epoch_time + self.params.rate_reduction_time)
    }

    /// Supply that may exist at `now`
    pub fn available_supply(&self, now: Timestamp) -> Amount {
        self.start_epoch_supply + now.saturating_sub(self.start_epoch_time) as u128 * self.rate
    }

    /// Tokens emitted over `[start, end)`; `end` may reach at most one epoch ahead
    pub fn mintable_in_timeframe(&self, start: Timestamp, end: Timestamp) -> Result<Amount> {
        if start > end {
            return Err(DaoError::precondition("start > end"));
        }
        let horizon = self.start_epoch_time + 2 * self.params.rate_reduction_time;
        if end > horizon {
            return Err(DaoError::precondition("too far in future"));
        }
        let mut schedule = self.rate_history.clone();
        schedule.push((
            self.start_epoch_time + self.params.rate_reduction_time,
            self.next_rate()?,
        ));
        to_u128(integrate_rate(start, end, &schedule), "mintable_in_timeframe")
    }

    /// Designate the minter (admin only, once)
    pub fn set_minter(&mut self, caller: Address, minter: Address) -> Result<()> {
        self.admin.ensure(caller)?;
        self.minter.set(minter)
    }

    /// Mint `value` to `to` (minter only)
    pub fn mint(&mut self, caller: Address, to: Address, value: Amount, now: Timestamp) -> Result<()> {
        self.minter.ensure(caller)?;
        if to.is_zero() {
            return Err(DaoError::precondition("zero address"));
        }
        if self.epoch_due(now) {
            self.advance_epoch()?;
        }
        let available = self.available_supply(now);
        let requested = self.ledger.total_supply + value;
        if requested > available {
            return Err(DaoError::ExceedsAllowance {
                requested,
                available,
            });
        }
        self.ledger.credit(to, value)
    }
}
