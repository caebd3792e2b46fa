//! # Voting Escrow
//!
//! Tokens locked for up to four years yield a voting balance that decays
//! linearly to zero at unlock.
//!
//! ```text
//!  balance
//!    ^
//!  a |\
//!    | \          slope = amount / MAXTIME
//!    |  \         bias  = slope * (end - ts)
//!    |   \
//!    +----\-----> time
//!   ts    end
//! ```
//!
//! Every lock change writes a user point and a global point. The global
//! supply decays by the sum of live slopes; the slope of each lock is
//! removed again at its end week through `slope_changes`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use vrh_core::prelude::*;

use crate::authority::Authority;
use crate::events::{DepositKind, Event, EventLog};
use crate::token::TokenLedger;

/// Bounded week iterations per checkpoint (about five years)
const MAX_WEEK_STEPS: usize = 255;

/// A decaying line `bias - slope * (t - ts)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub bias: i128,
    pub slope: i128,
    pub ts: Timestamp,
}

impl Point {
    /// Value of the line at `t`, floored at zero
    pub fn value_at(&self, t: Timestamp) -> Amount {
        let dt = t.saturating_sub(self.ts) as i128;
        let value = self.bias - self.slope * dt;
        if value > 0 {
            value as Amount
        } else {
            0
        }
    }

    fn clamp(&mut self) {
        self.bias = self.bias.max(0);
        self.slope = self.slope.max(0);
    }
}

/// Locked amount and week-aligned unlock time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedBalance {
    pub amount: Amount,
    pub end: Timestamp,
}

/// Vote-escrow ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VotingEscrow {
    address: Address,
    token: Address,
    max_time: u64,
    supply: Amount,
    locked: HashMap<Address, LockedBalance>,
    point_history: Vec<Point>,
    user_point_history: HashMap<Address, Vec<Point>>,
    slope_changes: BTreeMap<Timestamp, i128>,
    admin: Authority,
}

impl VotingEscrow {
    /// Create an escrow for `token`
    pub fn new(address: Address, token: Address, admin: Address, max_time: u64, now: Timestamp) -> Self {
        Self {
            address,
            token,
            max_time,
            supply: 0,
            locked: HashMap::new(),
            point_history: vec![Point {
                bias: 0,
                slope: 0,
                ts: now,
            }],
            user_point_history: HashMap::new(),
            slope_changes: BTreeMap::new(),
            admin: Authority::new(admin),
        }
    }

    /// Escrow address (holder of locked tokens)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Locked token address
    pub fn token(&self) -> Address {
        self.token
    }

    /// Admin role
    pub fn authority_mut(&mut self) -> &mut Authority {
        &mut self.admin
    }

    /// Total locked tokens (not decayed)
    pub fn supply(&self) -> Amount {
        self.supply
    }

    /// Current lock of `user`
    pub fn locked(&self, user: Address) -> LockedBalance {
        self.locked.get(&user).copied().unwrap_or_default()
    }

    /// Unlock time of `user`'s lock (0 if none)
    pub fn locked_end(&self, user: Address) -> Timestamp {
        self.locked(user).end
    }

    /// Global checkpoint count
    pub fn epoch(&self) -> usize {
        self.point_history.len() - 1
    }

    /// Number of points recorded for `user`
    pub fn user_point_epoch(&self, user: Address) -> usize {
        self.user_point_history.get(&user).map_or(0, Vec::len)
    }

    /// `idx`-th point of `user` (1-based, as returned by `user_point_epoch`)
    pub fn user_point_history(&self, user: Address, idx: usize) -> Option<Point> {
        let history = self.user_point_history.get(&user)?;
        idx.checked_sub(1).and_then(|i| history.get(i)).copied()
    }

    /// Slope of `user`'s latest point
    pub fn get_last_user_slope(&self, user: Address) -> i128 {
        self.user_point_history
            .get(&user)
            .and_then(|h| h.last())
            .map_or(0, |p| p.slope)
    }

    /// Voting balance of `user` at `t`
    pub fn balance_of(&self, user: Address, t: Timestamp) -> Amount {
        let Some(history) = self.user_point_history.get(&user) else {
            return 0;
        };
        // last point with ts <= t
        let idx = history.partition_point(|p| p.ts <= t);
        match idx.checked_sub(1) {
            Some(i) => history[i].value_at(t),
            None => 0,
        }
    }

    /// Total voting power at `t`
    pub fn total_supply(&self, t: Timestamp) -> Amount {
        let idx = self.point_history.partition_point(|p| p.ts <= t);
        let Some(i) = idx.checked_sub(1) else {
            return 0;
        };
        self.supply_at(self.point_history[i], t)
    }

    fn supply_at(&self, point: Point, t: Timestamp) -> Amount {
        let mut last = point;
        let mut t_i = week_floor(last.ts);
        for _ in 0..MAX_WEEK_STEPS {
            t_i += WEEK;
            let mut d_slope = 0;
            if t_i > t {
                t_i = t;
            } else {
                d_slope = self.slope_change(t_i);
            }
            last.bias -= last.slope * (t_i - last.ts) as i128;
            if t_i == t {
                break;
            }
            last.slope += d_slope;
            last.ts = t_i;
        }
        last.bias.max(0) as Amount
    }

    fn slope_change(&self, t: Timestamp) -> i128 {
        self.slope_changes.get(&t).copied().unwrap_or(0)
    }

    fn slope_for(&self, amount: Amount) -> i128 {
        (amount / u128::from(self.max_time)) as i128
    }

    /// Record global data up to `now`
    pub fn checkpoint(&mut self, now: Timestamp) {
        self.checkpoint_inner(None, LockedBalance::default(), LockedBalance::default(), now);
    }

    fn checkpoint_inner(
        &mut self,
        user: Option<Address>,
        old: LockedBalance,
        new: LockedBalance,
        now: Timestamp,
    ) {
        let mut u_old = Point::default();
        let mut u_new = Point::default();
        let mut old_dslope = 0i128;
        let mut new_dslope = 0i128;

        if user.is_some() {
            if old.end > now && old.amount > 0 {
                u_old.slope = self.slope_for(old.amount);
                u_old.bias = u_old.slope * (old.end - now) as i128;
            }
            if new.end > now && new.amount > 0 {
                u_new.slope = self.slope_for(new.amount);
                u_new.bias = u_new.slope * (new.end - now) as i128;
            }
            old_dslope = self.slope_change(old.end);
            if new.end != 0 {
                new_dslope = if new.end == old.end {
                    old_dslope
                } else {
                    self.slope_change(new.end)
                };
            }
        }

        let mut last_point = self.point_history.last().copied().unwrap_or(Point {
            bias: 0,
            slope: 0,
            ts: now,
        });
        let mut last_checkpoint = last_point.ts;

        // Fill the global history week by week
        let mut t_i = week_floor(last_checkpoint);
        for _ in 0..MAX_WEEK_STEPS {
            t_i += WEEK;
            let mut d_slope = 0;
            if t_i > now {
                t_i = now;
            } else {
                d_slope = self.slope_change(t_i);
            }
            last_point.bias -= last_point.slope * t_i.saturating_sub(last_checkpoint) as i128;
            last_point.slope += d_slope;
            last_point.clamp();
            last_checkpoint = t_i;
            last_point.ts = t_i;
            if t_i == now {
                break;
            }
            self.point_history.push(last_point);
        }

        if user.is_some() {
            last_point.slope += u_new.slope - u_old.slope;
            last_point.bias += u_new.bias - u_old.bias;
            last_point.clamp();
        }
        self.point_history.push(last_point);

        if let Some(user) = user {
            if old.end > now {
                old_dslope += u_old.slope;
                if new.end == old.end {
                    old_dslope -= u_new.slope;
                }
                self.slope_changes.insert(old.end, old_dslope);
            }
            if new.end > now && new.end > old.end {
                new_dslope -= u_new.slope;
                self.slope_changes.insert(new.end, new_dslope);
            }
            u_new.ts = now;
            self.user_point_history.entry(user).or_default().push(u_new);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn deposit(
        &mut self,
        token: &mut TokenLedger,
        payer: Address,
        user: Address,
        value: Amount,
        unlock_time: Timestamp,
        kind: DepositKind,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        let old = self.locked(user);
        let mut new = old;
        new.amount = new
            .amount
            .checked_add(value)
            .ok_or(DaoError::Overflow("locked amount"))?;
        if unlock_time != 0 {
            new.end = unlock_time;
        }

        if value != 0 {
            token.transfer(payer, self.address, value)?;
            events.emit(Event::Transfer {
                token: token.address(),
                from: payer,
                to: self.address,
                value,
            });
        }

        self.supply += value;
        self.locked.insert(user, new);
        self.checkpoint_inner(Some(user), old, new, now);

        tracing::debug!(%user, value, end = new.end, ?kind, "Lock updated");
        events.emit(Event::Deposit {
            provider: user,
            value,
            locktime: new.end,
            kind,
            ts: now,
        });
        Ok(())
    }

    /// Lock `amount` until `unlock_time` (rounded down to a week)
    pub fn create_lock(
        &mut self,
        token: &mut TokenLedger,
        user: Address,
        amount: Amount,
        unlock_time: Timestamp,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        let unlock_time = week_floor(unlock_time);
        let locked = self.locked(user);

        ensure(amount > 0, "need non-zero value")?;
        ensure(locked.amount == 0, "Withdraw old tokens first")?;
        ensure(unlock_time > now, "Can only lock until time in the future")?;
        ensure(unlock_time <= now + self.max_time, "Voting lock can be 4 years max")?;

        self.deposit(token, user, user, amount, unlock_time, DepositKind::CreateLock, now, events)
    }

    /// Add `amount` to an existing lock without changing its end
    pub fn increase_amount(
        &mut self,
        token: &mut TokenLedger,
        user: Address,
        amount: Amount,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        self.check_extendable(user, amount, now)?;
        self.deposit(token, user, user, amount, 0, DepositKind::IncreaseLockAmount, now, events)
    }

    /// Add `amount` from `payer`'s balance to `user`'s lock
    #[allow(clippy::too_many_arguments)]
    pub fn deposit_for(
        &mut self,
        token: &mut TokenLedger,
        payer: Address,
        user: Address,
        amount: Amount,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        self.check_extendable(user, amount, now)?;
        self.deposit(token, payer, user, amount, 0, DepositKind::DepositFor, now, events)
    }

    fn check_extendable(&self, user: Address, amount: Amount, now: Timestamp) -> Result<()> {
        let locked = self.locked(user);
        ensure(amount > 0, "need non-zero value")?;
        ensure(locked.amount > 0, "No existing lock found")?;
        ensure(locked.end > now, "Cannot add to expired lock. Withdraw")
    }

    /// Extend the lock to `unlock_time` (rounded down to a week)
    pub fn increase_unlock_time(
        &mut self,
        token: &mut TokenLedger,
        user: Address,
        unlock_time: Timestamp,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<()> {
        let locked = self.locked(user);
        let unlock_time = week_floor(unlock_time);

        ensure(locked.end > now, "Lock expired")?;
        ensure(locked.amount > 0, "Nothing is locked")?;
        ensure(unlock_time > locked.end, "Can only increase lock duration")?;
        ensure(unlock_time <= now + self.max_time, "Voting lock can be 4 years max")?;

        self.deposit(token, user, user, 0, unlock_time, DepositKind::IncreaseUnlockTime, now, events)
    }

    /// Return all tokens of an expired lock
    pub fn withdraw(
        &mut self,
        token: &mut TokenLedger,
        user: Address,
        now: Timestamp,
        events: &mut EventLog,
    ) -> Result<Amount> {
        let old = self.locked(user);
        ensure(now >= old.end, "The lock didn't expire")?;
        let value = old.amount;

        self.locked.insert(user, LockedBalance::default());
        self.supply -= value;
        self.checkpoint_inner(Some(user), old, LockedBalance::default(), now);

        token.transfer(self.address, user, value)?;
        events.emit(Event::Transfer {
            token: token.address(),
            from: self.address,
            to: user,
            value,
        });
        events.emit(Event::Withdraw {
            provider: user,
            value,
            ts: now,
        });
        Ok(value)
    }
}
