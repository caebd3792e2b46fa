//! # Guild
//!
//! A guild pools its members' escrow balances into one weight and shares the
//! emissions that weight earns.
//!
//! ## Reward Integral
//!
//! ```text
//!   emitted(week) = ∫ rate(t) dt × relative_weight(week)
//!   owner bonus  += emitted × commission / 100
//!   inv_supply   += emitted × (100 - commission) / 100 / working_supply
//!   fraction[u]  += working_balance[u] × Δinv_supply
//! ```
//!
//! Segments are split at week boundaries (relative weight and commission are
//! constant within a week) and at the mining-epoch boundary (rate is
//! constant within an epoch).
//!
//! ## Boost
//!
//! ```text
//!   lim = l × 40%                         unboosted floor
//!   lim += L × gas / gas_total × 60%      gas share boosts toward l
//!   working_balance = min(l, lim)         at most 2.5× the floor
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use vrh_core::math::{integrate_rate, to_u128};
use vrh_core::prelude::*;

use crate::config::GuildConfig;
use crate::events::{Event, EventLog};
use crate::gas_escrow::GasEscrow;
use crate::token::EmissionToken;
use crate::voting_escrow::VotingEscrow;
use crate::weights::WeightBook;

/// Bounded week iterations per checkpoint
const MAX_WEEK_STEPS: usize = 500;

/// Shared state a guild reads and writes during an operation
pub struct GuildContext<'a> {
    pub escrow: &'a VotingEscrow,
    pub token: &'a mut EmissionToken,
    pub weights: &'a mut WeightBook,
    pub gas: &'a GasEscrow,
    pub member_list: &'a mut HashMap<Address, Address>,
    pub config: &'a GuildConfig,
    pub now: Timestamp,
    pub events: &'a mut EventLog,
}

/// Guild state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Guild {
    address: Address,
    owner: Address,
    type_id: u32,
    created_at: Timestamp,

    commission: BTreeMap<Timestamp, u8>,
    last_change_rate: Timestamp,

    members: BTreeSet<Address>,
    balances: HashMap<Address, Amount>,
    total_balance: Amount,
    working_balances: HashMap<Address, Amount>,
    working_supply: Amount,

    period: u64,
    period_timestamp: Timestamp,
    integrate_inv_supply: U256,
    integrate_inv_supply_of: HashMap<Address, U256>,
    integrate_checkpoint_of: HashMap<Address, Timestamp>,
    integrate_fraction: HashMap<Address, Amount>,

    inflation_rate: Amount,
    future_epoch_time: Timestamp,

    total_owner_bonus: Amount,
    owner_bonus_credited: Amount,
}

impl Guild {
    /// Create a guild; the caller registers it and adds the owner as a member
    pub fn new(
        address: Address,
        owner: Address,
        type_id: u32,
        commission_rate: u8,
        token: &mut EmissionToken,
        now: Timestamp,
    ) -> Result<Self> {
        let mut commission = BTreeMap::new();
        commission.insert(now, commission_rate);

        Ok(Self {
            address,
            owner,
            type_id,
            created_at: now,
            commission,
            last_change_rate: next_week(now),
            members: BTreeSet::new(),
            balances: HashMap::new(),
            total_balance: 0,
            working_balances: HashMap::new(),
            working_supply: 0,
            period: 0,
            period_timestamp: now,
            integrate_inv_supply: U256::zero(),
            integrate_inv_supply_of: HashMap::new(),
            integrate_checkpoint_of: HashMap::new(),
            integrate_fraction: HashMap::new(),
            inflation_rate: token.rate(),
            future_epoch_time: token.future_epoch_time_write(now)?,
            total_owner_bonus: 0,
            owner_bonus_credited: 0,
        })
    }

    // === Views ===

    pub fn address(&self) -> Address {
        self.address
    }

    /// Current owner (zero once abandoned)
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn is_member(&self, user: Address) -> bool {
        self.members.contains(&user)
    }

    pub fn members(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }

    /// Escrow balance of `user` at their last checkpoint
    pub fn balance_of(&self, user: Address) -> Amount {
        self.balances.get(&user).copied().unwrap_or(0)
    }

    pub fn total_balance(&self) -> Amount {
        self.total_balance
    }

    pub fn working_balance(&self, user: Address) -> Amount {
        self.working_balances.get(&user).copied().unwrap_or(0)
    }

    pub fn working_supply(&self) -> Amount {
        self.working_supply
    }

    /// Rewards credited to `user` so far
    pub fn integrate_fraction(&self, user: Address) -> Amount {
        self.integrate_fraction.get(&user).copied().unwrap_or(0)
    }

    pub fn integrate_inv_supply(&self) -> U256 {
        self.integrate_inv_supply
    }

    pub fn integrate_checkpoint_of(&self, user: Address) -> Timestamp {
        self.integrate_checkpoint_of.get(&user).copied().unwrap_or(0)
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Commission accrued by whoever owned the guild
    pub fn total_owner_bonus(&self) -> Amount {
        self.total_owner_bonus
    }

    /// Commission in effect at `t`
    pub fn commission_rate_at(&self, t: Timestamp) -> u8 {
        self.commission
            .range(..=t)
            .next_back()
            .map_or(0, |(_, &rate)| rate)
    }

    /// Latest scheduled commission
    pub fn commission_rate(&self) -> u8 {
        self.commission.values().next_back().copied().unwrap_or(0)
    }

    pub fn last_change_rate(&self) -> Timestamp {
        self.last_change_rate
    }

    // === Accounting ===

    /// Integrate emissions up to `ctx.now` and credit `user`
    pub fn checkpoint(&mut self, ctx: &mut GuildContext<'_>, user: Option<Address>) -> Result<()> {
        let now = ctx.now;
        let period_time = self.period_timestamp;
        let mut inv = self.integrate_inv_supply;

        let rate = self.inflation_rate;
        let mut new_rate = rate;
        let prev_future_epoch = self.future_epoch_time;
        if prev_future_epoch >= period_time {
            self.future_epoch_time = ctx.token.future_epoch_time_write(now)?;
            new_rate = ctx.token.rate();
            self.inflation_rate = new_rate;
        }
        ctx.weights.checkpoint_guild(self.address, now);

        if now > period_time {
            let schedule = [(0, rate), (prev_future_epoch, new_rate)];
            let mut prev_week_time = period_time;
            let mut week_time = next_week(period_time).min(now);

            for _ in 0..MAX_WEEK_STEPS {
                let w = ctx.weights.guild_relative_weight(self.address, prev_week_time)?;
                if self.working_supply > 0 && w > 0 {
                    let integral = integrate_rate(prev_week_time, week_time, &schedule);
                    let emitted = integral * U256::from(w);
                    let commission = U256::from(self.commission_rate_at(prev_week_time));
                    let hundred = U256::from(PERCENT);

                    inv += emitted * (hundred - commission) / hundred / U256::from(self.working_supply);
                    let bonus = emitted * commission / hundred / U256::from(ONE);
                    self.total_owner_bonus += to_u128(bonus, "owner bonus")?;
                }
                if week_time == now {
                    break;
                }
                prev_week_time = week_time;
                week_time = (week_time + WEEK).min(now);
            }
        }

        self.period += 1;
        self.period_timestamp = now;
        self.integrate_inv_supply = inv;

        if let Some(user) = user {
            let last_inv = self.integrate_inv_supply_of.get(&user).copied().unwrap_or(inv);
            let delta = U256::from(self.working_balance(user)) * (inv - last_inv) / U256::from(ONE);
            let mut credit = to_u128(delta, "integrate_fraction")?;

            if user == self.owner {
                credit += self.total_owner_bonus - self.owner_bonus_credited;
                self.owner_bonus_credited = self.total_owner_bonus;
            }
            *self.integrate_fraction.entry(user).or_insert(0) += credit;
            self.integrate_inv_supply_of.insert(user, inv);
            self.integrate_checkpoint_of.insert(user, now);

            tracing::debug!(guild = %self.address, %user, credit, "Guild checkpoint");
        }
        Ok(())
    }

    fn update_liquidity_limit(&mut self, ctx: &mut GuildContext<'_>, user: Address) {
        let l = self.balance_of(user);
        let total = self.total_balance;
        let tokenless = u128::from(ctx.config.tokenless_production);

        let mut lim = l * tokenless / PERCENT;
        if ctx.now < self.created_at + ctx.config.boost_warmup {
            lim = l;
        } else {
            let gas_total = ctx.gas.total_supply();
            if gas_total > 0 {
                let boost = U256::from(total) * U256::from(ctx.gas.balance_of(user))
                    / U256::from(gas_total)
                    * U256::from(PERCENT - tokenless)
                    / U256::from(PERCENT);
                // bounded by `total`, so the cast cannot truncate
                lim += boost.min(U256::from(l)).as_u128();
            }
        }
        let lim = lim.min(l);

        let old = self.working_balance(user);
        self.working_balances.insert(user, lim);
        self.working_supply = self.working_supply + lim - old;

        ctx.events.emit(Event::UpdateLiquidityLimit {
            guild: self.address,
            user,
            original_balance: l,
            original_supply: total,
            working_balance: lim,
            working_supply: self.working_supply,
        });
    }

    /// Refresh a member's balance, working balance and weight vote
    fn refresh_member(&mut self, ctx: &mut GuildContext<'_>, user: Address) -> Result<()> {
        let balance = ctx.escrow.balance_of(user, ctx.now);
        self.total_balance = self.total_balance - self.balance_of(user) + balance;
        self.balances.insert(user, balance);
        self.update_liquidity_limit(ctx, user);

        let slope = ctx.escrow.get_last_user_slope(user).max(0) as Amount;
        ctx.weights.vote(
            user,
            self.address,
            slope,
            ctx.escrow.locked_end(user),
            ctx.now,
        )
    }

    /// Credit `user` and, if a member, refresh their boost and vote
    pub fn user_checkpoint(&mut self, ctx: &mut GuildContext<'_>, user: Address) -> Result<()> {
        self.checkpoint(ctx, Some(user))?;
        if self.is_member(user) {
            self.refresh_member(ctx, user)?;
        }
        Ok(())
    }

    /// Credit a member and recompute their working balance
    pub fn update_working_balance(&mut self, ctx: &mut GuildContext<'_>, user: Address) -> Result<()> {
        ensure(self.is_member(user), "Not in this guild")?;
        self.user_checkpoint(ctx, user)
    }

    // === Membership ===

    /// Add `user` to the guild
    pub fn join(&mut self, ctx: &mut GuildContext<'_>, user: Address) -> Result<()> {
        ensure(!ctx.member_list.contains_key(&user), "Already in a guild")?;
        ensure(ctx.escrow.balance_of(user, ctx.now) > 0, "No voting power")?;

        // no credit for time before joining
        self.checkpoint(ctx, Some(user))?;
        self.members.insert(user);
        ctx.member_list.insert(user, self.address);
        self.refresh_member(ctx, user)?;

        tracing::info!(guild = %self.address, %user, "Member joined");
        ctx.events.emit(Event::JoinGuild {
            guild: self.address,
            member: user,
        });
        Ok(())
    }

    /// Remove `user` from the guild
    pub fn leave(&mut self, ctx: &mut GuildContext<'_>, user: Address) -> Result<()> {
        ensure(user != self.owner, "Owner cannot leave guild")?;
        ensure(self.is_member(user), "Not in this guild")?;

        self.checkpoint(ctx, Some(user))?;

        self.working_supply -= self.working_balance(user);
        self.working_balances.insert(user, 0);
        self.total_balance -= self.balance_of(user);
        self.balances.insert(user, 0);
        ctx.weights.vote(user, self.address, 0, 0, ctx.now)?;

        self.members.remove(&user);
        ctx.member_list.remove(&user);

        tracing::info!(guild = %self.address, %user, "Member left");
        ctx.events.emit(Event::LeaveGuild {
            guild: self.address,
            member: user,
        });
        Ok(())
    }

    // === Owner ===

    /// Move the commission one percent up or down from the next week
    pub fn set_commission_rate(
        &mut self,
        ctx: &mut GuildContext<'_>,
        caller: Address,
        increase: bool,
    ) -> Result<()> {
        if caller != self.owner || self.owner.is_zero() {
            return Err(DaoError::unauthorized(
                "Only guild owner can change commission rate",
            ));
        }
        let current = self.commission_rate();
        let new_rate = if increase {
            let max = ctx.config.max_commission_rate;
            ensure(current < max, &format!("Maximum is {max}"))?;
            current + 1
        } else {
            ensure(current > 0, "Minimum is 0")?;
            current - 1
        };
        ensure(
            ctx.now >= self.last_change_rate + ctx.config.commission_change_delay,
            "Can only change commission rate once every week",
        )?;

        let effective = next_week(ctx.now);
        self.commission.insert(effective, new_rate);
        self.last_change_rate = ctx.now;

        tracing::info!(guild = %self.address, new_rate, effective, "Commission rate scheduled");
        ctx.events.emit(Event::SetCommissionRate {
            guild: self.address,
            commission_rate: new_rate,
            effective_time: effective,
        });
        Ok(())
    }

    /// Hand the guild to another member; the old owner is credited first
    pub fn transfer_ownership(&mut self, ctx: &mut GuildContext<'_>, new_owner: Address) -> Result<()> {
        let old_owner = self.owner;
        if !new_owner.is_zero() {
            ensure(self.is_member(new_owner), "New owner is not in the same guild")?;
        }
        self.checkpoint(ctx, Some(old_owner))?;

        if new_owner.is_zero() {
            // abandoned guilds take no commission, including pending changes
            let now = ctx.now;
            self.commission.retain(|&t, _| t < now);
            self.commission.insert(now, 0);
        } else {
            self.checkpoint(ctx, Some(new_owner))?;
        }
        self.owner = new_owner;

        tracing::info!(guild = %self.address, from = %old_owner, to = %new_owner, "Guild ownership transferred");
        ctx.events.emit(Event::TransferGuildOwnership {
            guild: self.address,
            from: old_owner,
            to: new_owner,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmissionConfig;
    use crate::token::TokenLedger;

    const DEPLOY: Timestamp = 1_600_000_000;

    struct World {
        escrow: VotingEscrow,
        token: EmissionToken,
        weights: WeightBook,
        gas: GasEscrow,
        gas_ledger: TokenLedger,
        member_list: HashMap<Address, Address>,
        config: GuildConfig,
        events: EventLog,
        now: Timestamp,
    }

    fn admin() -> Address {
        Address::from_label("admin")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn carl() -> Address {
        Address::from_label("carl")
    }

    impl World {
        fn new() -> Self {
            let mut token = EmissionToken::new(
                Address::from_label("token"),
                "Token",
                "VRH",
                admin(),
                EmissionConfig::default(),
                DEPLOY,
            )
            .unwrap();
            let now = week_floor(DEPLOY + DAY) + WEEK + HOUR;
            token.update_mining_parameters(now).unwrap();
            let escrow = VotingEscrow::new(
                Address::from_label("voting_escrow"),
                token.address(),
                admin(),
                MAXTIME,
                DEPLOY,
            );
            let gas_token = Address::from_label("gas");
            let mut gas_ledger = TokenLedger::new(gas_token, "Gas", "MOH");
            gas_ledger.credit(admin(), 1_000_000 * ONE).unwrap();
            let mut weights = WeightBook::new(DEPLOY);
            weights.add_type(ONE, now);

            let mut world = Self {
                escrow,
                token,
                weights,
                gas: GasEscrow::new(Address::from_label("gas_escrow"), gas_token),
                gas_ledger,
                member_list: HashMap::new(),
                config: GuildConfig::default(),
                events: EventLog::new(),
                now,
            };
            for (user, amount) in [(admin(), 40_000), (bob(), 50_000), (carl(), 50_000)] {
                let value = amount * ONE;
                if user != admin() {
                    world
                        .token
                        .ledger_mut()
                        .transfer(admin(), user, value)
                        .unwrap();
                }
                world
                    .escrow
                    .create_lock(
                        world.token.ledger_mut(),
                        user,
                        value,
                        now + MAXTIME,
                        now,
                        &mut world.events,
                    )
                    .unwrap();
            }
            world
        }

        fn ctx(&mut self) -> GuildContext<'_> {
            GuildContext {
                escrow: &self.escrow,
                token: &mut self.token,
                weights: &mut self.weights,
                gas: &self.gas,
                member_list: &mut self.member_list,
                config: &self.config,
                now: self.now,
                events: &mut self.events,
            }
        }

        fn create_guild(&mut self, owner: Address, commission: u8) -> Guild {
            let address = Address::from_label("guild");
            let now = self.now;
            let mut guild = Guild::new(address, owner, 0, commission, &mut self.token, now).unwrap();
            self.weights.add_guild(address, 0, now);
            let mut ctx = self.ctx();
            guild.join(&mut ctx, owner).unwrap();
            guild
        }
    }

    #[test]
    fn test_owner_is_member_and_cannot_leave() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 20);
        assert!(guild.is_member(admin()));
        world.now += 2 * WEEK + 1;
        let mut ctx = world.ctx();
        assert_eq!(
            guild.leave(&mut ctx, admin()).unwrap_err().reason(),
            "Owner cannot leave guild"
        );
    }

    #[test]
    fn test_join_twice_and_leave_non_member() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 20);
        world.now += 60;
        let mut ctx = world.ctx();
        guild.join(&mut ctx, bob()).unwrap();
        assert_eq!(guild.join(&mut ctx, bob()).unwrap_err().reason(), "Already in a guild");
        assert_eq!(guild.leave(&mut ctx, carl()).unwrap_err().reason(), "Not in this guild");
        let nobody = Address::from_label("nobody");
        assert_eq!(guild.join(&mut ctx, nobody).unwrap_err().reason(), "No voting power");
    }

    #[test]
    fn test_join_adds_projected_balance_to_weight() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 20);
        world.now += 60;
        let before = world.weights.get_guild_weight(guild.address());
        let mut ctx = world.ctx();
        guild.join(&mut ctx, bob()).unwrap();

        let now = world.now;
        let slope = world.escrow.get_last_user_slope(bob()) as u128;
        let projected = world.escrow.balance_of(bob(), now) - slope * u128::from(next_week(now) - now);
        assert_eq!(world.weights.get_guild_weight(guild.address()), before + projected);
        assert_eq!(world.member_list.get(&bob()), Some(&guild.address()));
    }

    #[test]
    fn test_sole_owner_earns_everything() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 20);
        let start = world.now;
        world.now += 3 * WEEK;
        let mut ctx = world.ctx();
        guild.update_working_balance(&mut ctx, admin()).unwrap();

        // relative weight is zero until the first boundary after creation
        let rate = world.token.rate();
        let expected = rate * u128::from(start + 3 * WEEK - next_week(start));
        let earned = guild.integrate_fraction(admin());
        assert!(earned.abs_diff(expected) * 1_000_000 < expected, "{earned} vs {expected}");
    }

    #[test]
    fn test_commission_rate_changes() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 20);
        world.now += 2 * WEEK + 1;
        let mut ctx = world.ctx();

        assert_eq!(
            guild.set_commission_rate(&mut ctx, bob(), false),
            Err(DaoError::unauthorized("Only guild owner can change commission rate"))
        );
        assert_eq!(
            guild.set_commission_rate(&mut ctx, admin(), true).unwrap_err().reason(),
            "Maximum is 20"
        );
        guild.set_commission_rate(&mut ctx, admin(), false).unwrap();
        assert_eq!(guild.commission_rate(), 19);
        assert_eq!(guild.commission_rate_at(world.now), 20);
        assert_eq!(guild.commission_rate_at(next_week(world.now)), 19);

        world.now += 600;
        let mut ctx = world.ctx();
        assert_eq!(
            guild.set_commission_rate(&mut ctx, admin(), false).unwrap_err().reason(),
            "Can only change commission rate once every week"
        );
    }

    #[test]
    fn test_commission_blocked_right_after_creation() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 5);
        world.now += WEEK;
        let mut ctx = world.ctx();
        assert_eq!(
            guild.set_commission_rate(&mut ctx, admin(), false).unwrap_err().reason(),
            "Can only change commission rate once every week"
        );
    }

    #[test]
    fn test_minimum_commission() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 0);
        world.now += 3 * WEEK;
        let mut ctx = world.ctx();
        assert_eq!(
            guild.set_commission_rate(&mut ctx, admin(), false).unwrap_err().reason(),
            "Minimum is 0"
        );
    }

    #[test]
    fn test_leave_freezes_fraction() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 20);
        world.now += WEEK;
        let mut ctx = world.ctx();
        guild.join(&mut ctx, bob()).unwrap();
        world.now += 2 * WEEK + 1;
        let mut ctx = world.ctx();
        guild.leave(&mut ctx, bob()).unwrap();
        let frozen = guild.integrate_fraction(bob());
        assert!(frozen > 0);
        assert_eq!(guild.working_balance(bob()), 0);
        assert!(!world.member_list.contains_key(&bob()));

        world.now += 3 * WEEK;
        let mut ctx = world.ctx();
        guild.user_checkpoint(&mut ctx, bob()).unwrap();
        assert_eq!(guild.integrate_fraction(bob()), frozen);
    }

    #[test]
    fn test_boost_ratio() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 0);
        let mut ctx = world.ctx();
        guild.join(&mut ctx, bob()).unwrap();
        guild.join(&mut ctx, carl()).unwrap();

        world.now += 2 * WEEK;
        world
            .gas
            .create_gas(&mut world.gas_ledger, admin(), 1_000 * ONE, &mut world.events)
            .unwrap();
        let mut ctx = world.ctx();
        for user in [admin(), bob(), carl()] {
            guild.update_working_balance(&mut ctx, user).unwrap();
        }

        let bob_balance = guild.balance_of(bob());
        assert_eq!(guild.working_balance(bob()), bob_balance * 40 / 100);
        assert_eq!(guild.working_balance(admin()), guild.balance_of(admin()));
    }

    #[test]
    fn test_transfer_to_zero_drops_commission() {
        let mut world = World::new();
        let mut guild = world.create_guild(admin(), 20);
        world.now += WEEK;
        let mut ctx = world.ctx();
        guild.transfer_ownership(&mut ctx, Address::ZERO).unwrap();
        assert_eq!(guild.owner(), Address::ZERO);
        assert_eq!(guild.commission_rate_at(world.now), 0);
        assert!(guild.is_member(admin()));
    }
}
