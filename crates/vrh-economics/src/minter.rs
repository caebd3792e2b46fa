//! Minter
//!
//! Turns guild credit into tokens. Each mint pays a fixed share immediately
//! and sends the rest through the vesting escrow, then pays out whatever
//! vesting has released so far.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vrh_core::prelude::*;

use crate::controller::{Env, GuildController};
use crate::events::Event;
use crate::vesting::RewardVestingEscrow;

/// Amounts produced by one mint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    /// Tokens transferred to the user (immediate share + vesting release)
    pub minted: Amount,
    /// Tokens newly locked in vesting
    pub vesting_locked: Amount,
}

/// Minter state
#[derive(Clone, Debug)]
pub struct Minter {
    address: Address,
    immediate_release_percent: u8,
    minted: HashMap<(Address, Address), Amount>,
}

impl Minter {
    pub fn new(address: Address, immediate_release_percent: u8) -> Self {
        Self {
            address,
            immediate_release_percent,
            minted: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Credit of `user` in `guild` already turned into tokens or vesting
    pub fn minted(&self, user: Address, guild: Address) -> Amount {
        self.minted.get(&(user, guild)).copied().unwrap_or(0)
    }

    /// Mint for `user` in their current guild, or just release vesting
    pub fn mint(
        &mut self,
        user: Address,
        controller: &mut GuildController,
        vesting: &mut RewardVestingEscrow,
        env: &mut Env<'_>,
    ) -> Result<MintReceipt> {
        match controller.global_member_list(user) {
            Some(guild) => self.mint_from(user, guild, controller, vesting, env),
            None => self.settle(user, None, 0, vesting, env),
        }
    }

    /// Mint for `user` in `guild`, which they may have left
    pub fn mint_from(
        &mut self,
        user: Address,
        guild: Address,
        controller: &mut GuildController,
        vesting: &mut RewardVestingEscrow,
        env: &mut Env<'_>,
    ) -> Result<MintReceipt> {
        controller.user_checkpoint(self.address, user, guild, env)?;
        let total = controller
            .guild(guild)
            .ok_or(DaoError::UnknownGuild(guild))?
            .integrate_fraction(user);
        let delta = total - self.minted(user, guild);
        self.minted.insert((user, guild), total);

        self.settle(user, Some(guild), delta, vesting, env)
    }

    fn settle(
        &mut self,
        user: Address,
        guild: Option<Address>,
        delta: Amount,
        vesting: &mut RewardVestingEscrow,
        env: &mut Env<'_>,
    ) -> Result<MintReceipt> {
        let now = env.now;
        let immediate = delta * u128::from(self.immediate_release_percent) / PERCENT;
        let vesting_locked = delta - immediate;

        if vesting_locked > 0 {
            let index = vesting.current_epoch_index(user, now);
            vesting.lock_reward(self.address, user, vesting_locked, index, now)?;
        }
        let released = vesting.claim(self.address, user, now)?;
        let minted = immediate + released;

        if minted > 0 {
            env.token.mint(self.address, user, minted, now)?;
            env.events.emit(Event::Transfer {
                token: env.token.address(),
                from: Address::ZERO,
                to: user,
                value: minted,
            });
        }
        if delta > 0 || released > 0 {
            tracing::info!(%user, minted, vesting_locked, "Rewards minted");
            env.events.emit(Event::Minted {
                recipient: user,
                guild,
                minted,
                vesting_locked,
            });
        }

        Ok(MintReceipt {
            minted,
            vesting_locked,
        })
    }
}
