//! # Guild Controller
//!
//! Registry of guild types and guilds, owner of the weight book and of the
//! membership tables every guild operation consults.
//!
//! | Table            | Key        | Value        |
//! |------------------|------------|--------------|
//! | `owner_list`     | owner      | guild        |
//! | `member_list`    | member     | guild        |
//! | `gas_addr_escrow`| gas token  | gas escrow   |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vrh_core::prelude::*;

use crate::authority::{Authority, MinterRole};
use crate::config::GuildConfig;
use crate::events::{Event, EventLog};
use crate::gas_escrow::GasEscrow;
use crate::guild::{Guild, GuildContext};
use crate::token::EmissionToken;
use crate::voting_escrow::VotingEscrow;
use crate::weights::WeightBook;

/// Guild type with its gas escrow
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuildType {
    pub name: String,
    pub symbol: String,
    pub gas_escrow: GasEscrow,
}

/// Components outside the controller that guild operations touch
pub struct Env<'a> {
    pub escrow: &'a VotingEscrow,
    pub token: &'a mut EmissionToken,
    pub config: &'a GuildConfig,
    pub now: Timestamp,
    pub events: &'a mut EventLog,
}

/// Guild controller state
#[derive(Clone, Debug)]
pub struct GuildController {
    address: Address,
    admin: Authority,
    create_guild_admin: Authority,
    minter: MinterRole,
    types: Vec<GuildType>,
    guilds: HashMap<Address, Guild>,
    weights: WeightBook,
    owner_list: HashMap<Address, Address>,
    member_list: HashMap<Address, Address>,
    gas_addr_escrow: HashMap<Address, Address>,
}

impl GuildController {
    /// Create a controller; `admin` also administers guild creation
    pub fn new(address: Address, admin: Address, now: Timestamp) -> Self {
        Self {
            address,
            admin: Authority::new(admin),
            create_guild_admin: Authority::new(admin),
            minter: MinterRole::default(),
            types: Vec::new(),
            guilds: HashMap::new(),
            weights: WeightBook::new(now),
            owner_list: HashMap::new(),
            member_list: HashMap::new(),
            gas_addr_escrow: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn authority(&self) -> &Authority {
        &self.admin
    }

    pub fn authority_mut(&mut self) -> &mut Authority {
        &mut self.admin
    }

    pub fn create_guild_authority(&self) -> &Authority {
        &self.create_guild_admin
    }

    pub fn create_guild_authority_mut(&mut self) -> &mut Authority {
        &mut self.create_guild_admin
    }

    /// Designate the minter (admin only, once)
    pub fn set_minter(&mut self, caller: Address, minter: Address) -> Result<()> {
        self.admin.ensure(caller)?;
        self.minter.set(minter)
    }

    pub fn minter(&self) -> Option<Address> {
        self.minter.get()
    }

    pub fn weights(&self) -> &WeightBook {
        &self.weights
    }

    pub fn n_guild_types(&self) -> u32 {
        self.types.len() as u32
    }

    pub fn guild_type(&self, type_id: u32) -> Option<&GuildType> {
        self.types.get(type_id as usize)
    }

    pub fn guild(&self, guild: Address) -> Option<&Guild> {
        self.guilds.get(&guild)
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    /// Guild owned by `owner`
    pub fn guild_owner_list(&self, owner: Address) -> Option<Address> {
        self.owner_list.get(&owner).copied()
    }

    /// Guild `member` currently belongs to
    pub fn global_member_list(&self, member: Address) -> Option<Address> {
        self.member_list.get(&member).copied()
    }

    /// Gas escrow registered for `gas_token`
    pub fn gas_addr_escrow(&self, gas_token: Address) -> Option<Address> {
        self.gas_addr_escrow.get(&gas_token).copied()
    }

    /// Mutable gas escrow by escrow address
    pub fn gas_escrow_mut(&mut self, escrow: Address) -> Result<&mut GasEscrow> {
        self.types
            .iter_mut()
            .map(|t| &mut t.gas_escrow)
            .find(|g| g.address() == escrow)
            .ok_or_else(|| DaoError::precondition("Unknown gas escrow"))
    }

    // === Types ===

    /// Register a type backed by `gas_token` (admin only)
    #[allow(clippy::too_many_arguments)]
    pub fn add_type(
        &mut self,
        caller: Address,
        name: &str,
        symbol: &str,
        gas_token: Address,
        weight: Amount,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<u32> {
        self.admin.ensure(caller)?;
        ensure(
            !self.gas_addr_escrow.contains_key(&gas_token),
            "Already has gas escrow",
        )?;

        let escrow_addr = Address::derive(
            b"gas_escrow",
            &[&self.address.as_bytes()[..], &gas_token.as_bytes()[..]],
        );
        let type_id = self.weights.add_type(weight, now);
        self.types.push(GuildType {
            name: name.to_string(),
            symbol: symbol.to_string(),
            gas_escrow: GasEscrow::new(escrow_addr, gas_token),
        });
        self.gas_addr_escrow.insert(gas_token, escrow_addr);

        tracing::info!(type_id, name, %gas_token, "Guild type added");
        events.emit(Event::AddType {
            name: name.to_string(),
            type_id,
            gas_token,
            gas_escrow: escrow_addr,
        });
        if weight != 0 {
            events.emit(Event::NewTypeWeight {
                type_id,
                time: next_week(now),
                weight,
            });
        }
        Ok(type_id)
    }

    /// Schedule a new weight for `type_id` (admin only)
    pub fn change_type_weight(
        &mut self,
        caller: Address,
        type_id: u32,
        weight: Amount,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        self.admin.ensure(caller)?;
        if type_id >= self.n_guild_types() {
            return Err(DaoError::UnknownType(type_id));
        }
        let time = self.weights.change_type_weight(type_id, weight, now);
        tracing::info!(type_id, weight, time, "Type weight changed");
        events.emit(Event::NewTypeWeight {
            type_id,
            time,
            weight,
        });
        Ok(())
    }

    // === Guilds ===

    fn with_guild<R>(
        &mut self,
        env: &mut Env<'_>,
        guild: Address,
        f: impl FnOnce(&mut Guild, &mut GuildContext<'_>) -> Result<R>,
    ) -> Result<R> {
        let target = self
            .guilds
            .get_mut(&guild)
            .ok_or(DaoError::UnknownGuild(guild))?;
        let type_id = target.type_id();
        let gas = &self
            .types
            .get(type_id as usize)
            .ok_or(DaoError::UnknownType(type_id))?
            .gas_escrow;
        let mut ctx = GuildContext {
            escrow: env.escrow,
            token: &mut *env.token,
            weights: &mut self.weights,
            gas,
            member_list: &mut self.member_list,
            config: env.config,
            now: env.now,
            events: &mut *env.events,
        };
        f(target, &mut ctx)
    }

    /// Create a guild for `owner` (create-guild admin only)
    pub fn create_guild(
        &mut self,
        caller: Address,
        owner: Address,
        type_id: u32,
        commission_rate: u8,
        env: &mut Env<'_>,
    ) -> Result<Address> {
        self.create_guild_admin.ensure(caller)?;
        ensure(!self.owner_list.contains_key(&owner), "Owner already has a guild")?;
        ensure(!self.member_list.contains_key(&owner), "Already in a guild")?;
        ensure(type_id < self.n_guild_types(), "Invalid guild type")?;
        let max = env.config.max_commission_rate;
        ensure(commission_rate <= max, &format!("Maximum is {max}"))?;

        let nonce = (self.guilds.len() as u64).to_le_bytes();
        let address = Address::derive(
            b"guild",
            &[&self.address.as_bytes()[..], &owner.as_bytes()[..], &nonce[..]],
        );
        let guild = Guild::new(address, owner, type_id, commission_rate, env.token, env.now)?;
        self.weights.add_guild(address, type_id, env.now);
        self.guilds.insert(address, guild);
        self.owner_list.insert(owner, address);

        tracing::info!(guild = %address, %owner, type_id, commission_rate, "Guild created");
        env.events.emit(Event::NewGuild {
            guild: address,
            owner,
            type_id,
            commission_rate,
        });

        self.with_guild(env, address, |guild, ctx| guild.join(ctx, owner))?;
        Ok(address)
    }

    /// `user` joins `guild`
    pub fn join_guild(&mut self, user: Address, guild: Address, env: &mut Env<'_>) -> Result<()> {
        self.with_guild(env, guild, |g, ctx| g.join(ctx, user))
    }

    /// `user` leaves `guild`
    pub fn leave_guild(&mut self, user: Address, guild: Address, env: &mut Env<'_>) -> Result<()> {
        self.with_guild(env, guild, |g, ctx| g.leave(ctx, user))
    }

    /// Recompute a member's working balance
    pub fn update_working_balance(
        &mut self,
        user: Address,
        guild: Address,
        env: &mut Env<'_>,
    ) -> Result<()> {
        self.with_guild(env, guild, |g, ctx| g.update_working_balance(ctx, user))
    }

    /// Credit `user` in `guild`; the user or the minter may call
    pub fn user_checkpoint(
        &mut self,
        caller: Address,
        user: Address,
        guild: Address,
        env: &mut Env<'_>,
    ) -> Result<()> {
        if caller != user && self.minter.get() != Some(caller) {
            return Err(DaoError::unauthorized("unauthorized"));
        }
        self.with_guild(env, guild, |g, ctx| g.user_checkpoint(ctx, user))
    }

    /// Step the commission of `guild` (guild owner only)
    pub fn set_commission_rate(
        &mut self,
        caller: Address,
        guild: Address,
        increase: bool,
        env: &mut Env<'_>,
    ) -> Result<()> {
        self.with_guild(env, guild, |g, ctx| g.set_commission_rate(ctx, caller, increase))
    }

    /// Hand the caller's guild to `new_owner`, or abandon it with the zero address
    pub fn transfer_guild_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
        env: &mut Env<'_>,
    ) -> Result<()> {
        let guild = self
            .owner_list
            .get(&caller)
            .copied()
            .ok_or_else(|| DaoError::precondition("Not a guild owner"))?;
        if !new_owner.is_zero() {
            ensure(
                self.member_list.get(&new_owner) == Some(&guild),
                "New owner is not in the same guild",
            )?;
            ensure(
                !self.owner_list.contains_key(&new_owner),
                "New owner already owns a guild",
            )?;
        }

        self.with_guild(env, guild, |g, ctx| g.transfer_ownership(ctx, new_owner))?;
        self.owner_list.remove(&caller);
        if !new_owner.is_zero() {
            self.owner_list.insert(new_owner, guild);
        }
        Ok(())
    }

    // === Weights ===

    /// Fill the total weight series up to `now`
    pub fn checkpoint(&mut self, now: Timestamp) {
        self.weights.checkpoint(now);
    }

    /// Fill one guild's weight series and the total up to `now`
    pub fn checkpoint_guild(&mut self, guild: Address, now: Timestamp) -> Result<()> {
        if !self.guilds.contains_key(&guild) {
            return Err(DaoError::UnknownGuild(guild));
        }
        self.weights.checkpoint_guild(guild, now);
        Ok(())
    }

    pub fn get_guild_weight(&self, guild: Address) -> Amount {
        self.weights.get_guild_weight(guild)
    }

    pub fn guild_effective_weight(&self, guild: Address, now: Timestamp) -> Amount {
        self.weights.guild_effective_weight(guild, now)
    }

    pub fn get_weights_sum_per_type(&self, type_id: u32) -> Amount {
        self.weights.get_weights_sum_per_type(type_id)
    }

    pub fn get_type_weight(&self, type_id: u32) -> Amount {
        self.weights.get_type_weight(type_id)
    }

    pub fn get_total_weight(&self) -> U256 {
        self.weights.get_total_weight()
    }

    pub fn guild_relative_weight(&self, guild: Address, t: Timestamp) -> Result<Amount> {
        self.weights.guild_relative_weight(guild, t)
    }
}
