//! # Reward Vesting Escrow
//!
//! The deferred share of every mint is locked here and released linearly.
//!
//! ```text
//!   locks in period k          vesting of entry k
//!   |---- MONTH ----|------------------ 168 days ------------------|
//!   ^ lock   ^ lock ^ start_time                                   ^ fully vested
//! ```
//!
//! Locks made in the same vesting period accumulate into one entry; the entry
//! starts vesting at the first period boundary after the lock. Each user
//! numbers their entries 1, 2, 3, ... only for periods in which they locked.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use vrh_core::prelude::*;

use crate::authority::{Authority, MinterRole};
use crate::config::RewardConfig;

/// One vesting entry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingEntry {
    pub amount: Amount,
    pub slope: Amount,
    pub start_time: Timestamp,
    pub claimed: Amount,
}

impl VestingEntry {
    /// Amount released by `now`
    pub fn vested(&self, now: Timestamp, duration: u64) -> Amount {
        if now < self.start_time {
            return 0;
        }
        let elapsed = now - self.start_time;
        if elapsed >= duration {
            self.amount
        } else {
            (self.slope * u128::from(elapsed)).min(self.amount)
        }
    }

    /// Released but not yet claimed
    pub fn claimable(&self, now: Timestamp, duration: u64) -> Amount {
        self.vested(now, duration).saturating_sub(self.claimed)
    }
}

/// Per-user vesting schedule book
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardVestingEscrow {
    address: Address,
    admin: Authority,
    minter: MinterRole,
    vesting_epoch: u64,
    vesting_duration: u64,
    history: HashMap<Address, BTreeMap<u64, VestingEntry>>,
    /// (last index used, start of the period it was used in)
    last_lock: HashMap<Address, (u64, Timestamp)>,
}

impl RewardVestingEscrow {
    pub fn new(address: Address, admin: Address, config: &RewardConfig) -> Self {
        Self {
            address,
            admin: Authority::new(admin),
            minter: MinterRole::default(),
            vesting_epoch: config.vesting_epoch,
            vesting_duration: config.vesting_duration,
            history: HashMap::new(),
            last_lock: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn authority_mut(&mut self) -> &mut Authority {
        &mut self.admin
    }

    pub fn vesting_duration(&self) -> u64 {
        self.vesting_duration
    }

    /// Designate the minter (admin only, once)
    pub fn set_minter(&mut self, caller: Address, minter: Address) -> Result<()> {
        self.admin.ensure(caller)?;
        self.minter.set(minter)
    }

    pub fn minter(&self) -> Option<Address> {
        self.minter.get()
    }

    /// Index a lock made by `user` at `now` must use
    pub fn current_epoch_index(&self, user: Address, now: Timestamp) -> u64 {
        match self.last_lock.get(&user) {
            None => 1,
            Some(&(index, period)) if period == period_floor(now, self.vesting_epoch) => index,
            Some(&(index, _)) => index + 1,
        }
    }

    /// Entry `index` of `user` (zeroed if absent)
    pub fn user_vesting_history(&self, user: Address, index: u64) -> VestingEntry {
        self.history
            .get(&user)
            .and_then(|entries| entries.get(&index))
            .copied()
            .unwrap_or_default()
    }

    /// Add `amount` to `user`'s entry for the current period (minter only)
    pub fn lock_reward(
        &mut self,
        caller: Address,
        user: Address,
        amount: Amount,
        epoch_index: u64,
        now: Timestamp,
    ) -> Result<()> {
        self.minter.ensure(caller)?;
        ensure(
            epoch_index == self.current_epoch_index(user, now),
            "Invalid vesting epoch",
        )?;

        let period = period_floor(now, self.vesting_epoch);
        let duration = u128::from(self.vesting_duration);
        let start_time = period + self.vesting_epoch;
        let entry = self
            .history
            .entry(user)
            .or_default()
            .entry(epoch_index)
            .or_insert_with(|| VestingEntry {
                start_time,
                ..VestingEntry::default()
            });
        entry.amount += amount;
        entry.slope = entry.amount / duration;
        self.last_lock.insert(user, (epoch_index, period));

        tracing::debug!(%user, amount, epoch_index, "Reward locked");
        Ok(())
    }

    /// Total claimable for `user` at `now`
    pub fn get_claimable_tokens(&self, user: Address, now: Timestamp) -> Amount {
        self.history.get(&user).map_or(0, |entries| {
            entries
                .values()
                .map(|e| e.claimable(now, self.vesting_duration))
                .sum()
        })
    }

    /// Mark everything claimable as claimed and purge finished entries (minter only)
    pub fn claim(&mut self, caller: Address, user: Address, now: Timestamp) -> Result<Amount> {
        self.minter.ensure(caller)?;
        let duration = self.vesting_duration;
        let Some(entries) = self.history.get_mut(&user) else {
            return Ok(0);
        };

        let mut total = 0;
        for entry in entries.values_mut() {
            let claimable = entry.claimable(now, duration);
            entry.claimed += claimable;
            total += claimable;
            if entry.amount > 0 && now >= entry.start_time + duration {
                *entry = VestingEntry {
                    start_time: entry.start_time,
                    ..VestingEntry::default()
                };
            }
        }
        Ok(total)
    }
}
