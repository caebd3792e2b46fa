//! # Weight Book
//!
//! Weekly time series behind guild relative weights.
//!
//! ```text
//!   guild weight  ──┐
//!   guild weight  ──┼─> type sum  × type weight ──┐
//!   guild weight  ──┘                             ├─> total weight
//!   guild weight  ──────> type sum  × type weight ─┘
//! ```
//!
//! Every series is stored at week boundaries and filled forward lazily. A
//! guild weight is the sum of its members' escrow lines projected to the next
//! boundary; it decays by the summed slope and sheds each member's slope at
//! their unlock week.

use std::collections::{BTreeMap, HashMap};
use vrh_core::math::to_u128;
use vrh_core::prelude::*;

/// Bounded week iterations per fill
const MAX_WEEK_STEPS: usize = 500;

/// Decaying weight line sampled at a week boundary
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeightPoint {
    pub bias: Amount,
    pub slope: Amount,
}

/// A member's current contribution to a guild weight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VotedSlope {
    pub slope: Amount,
    pub end: Timestamp,
}

/// One decaying series with scheduled slope drops
#[derive(Clone, Debug, Default)]
struct Series {
    points: BTreeMap<Timestamp, WeightPoint>,
    changes: BTreeMap<Timestamp, Amount>,
    last: Timestamp,
}

impl Series {
    fn point(&self, t: Timestamp) -> WeightPoint {
        self.points.get(&t).copied().unwrap_or_default()
    }

    fn point_mut(&mut self, t: Timestamp) -> &mut WeightPoint {
        self.points.entry(t).or_default()
    }

    fn decay(pt: &mut WeightPoint, drop: Amount) {
        let d_bias = pt.slope * u128::from(WEEK);
        if pt.bias > d_bias {
            pt.bias -= d_bias;
            pt.slope = pt.slope.saturating_sub(drop);
        } else {
            *pt = WeightPoint::default();
        }
    }

    /// Fill weekly points up to the first boundary after `now`
    fn fill(&mut self, now: Timestamp) -> Amount {
        let mut t = self.last;
        if t == 0 {
            return 0;
        }
        let mut pt = self.point(t);
        for _ in 0..MAX_WEEK_STEPS {
            if t > now {
                break;
            }
            t += WEEK;
            let drop = self.changes.get(&t).copied().unwrap_or(0);
            Self::decay(&mut pt, drop);
            self.points.insert(t, pt);
            if t > now {
                self.last = t;
            }
        }
        pt.bias
    }

    /// Value at week boundary `t` without storing anything
    fn project(&self, t: Timestamp) -> Amount {
        let Some((&start, &pt)) = self.points.range(..=t).next_back() else {
            return 0;
        };
        let mut pt = pt;
        let mut cursor = start;
        while cursor < t {
            cursor += WEEK;
            let drop = self.changes.get(&cursor).copied().unwrap_or(0);
            Self::decay(&mut pt, drop);
        }
        pt.bias
    }

    fn add_change(&mut self, t: Timestamp, slope: Amount) {
        *self.changes.entry(t).or_insert(0) += slope;
    }

    fn remove_change(&mut self, t: Timestamp, slope: Amount) {
        let entry = self.changes.entry(t).or_insert(0);
        *entry = entry.saturating_sub(slope);
    }
}

/// Type weight series (no decay)
#[derive(Clone, Debug, Default)]
struct TypeWeight {
    points: BTreeMap<Timestamp, Amount>,
    last: Timestamp,
}

impl TypeWeight {
    fn at(&self, t: Timestamp) -> Amount {
        self.points.get(&t).copied().unwrap_or(0)
    }

    fn fill(&mut self, now: Timestamp) -> Amount {
        let mut t = self.last;
        if t == 0 {
            return 0;
        }
        let w = self.at(t);
        for _ in 0..MAX_WEEK_STEPS {
            if t > now {
                break;
            }
            t += WEEK;
            self.points.insert(t, w);
            if t > now {
                self.last = t;
            }
        }
        w
    }
}

/// Weekly guild, type and total weight series
#[derive(Clone, Debug, Default)]
pub struct WeightBook {
    guilds: HashMap<Address, Series>,
    guild_types: HashMap<Address, u32>,
    sums: Vec<Series>,
    type_weights: Vec<TypeWeight>,
    totals: BTreeMap<Timestamp, U256>,
    time_total: Timestamp,
    votes: HashMap<(Address, Address), VotedSlope>,
}

impl WeightBook {
    /// Create an empty book; the total series starts at the current week
    pub fn new(now: Timestamp) -> Self {
        Self {
            time_total: week_floor(now),
            ..Self::default()
        }
    }

    /// Number of registered types
    pub fn n_types(&self) -> u32 {
        self.sums.len() as u32
    }

    /// Type of a registered guild
    pub fn guild_type(&self, guild: Address) -> Option<u32> {
        self.guild_types.get(&guild).copied()
    }

    /// Register a new type and return its id
    pub fn add_type(&mut self, weight: Amount, now: Timestamp) -> u32 {
        let type_id = self.n_types();
        self.sums.push(Series::default());
        self.type_weights.push(TypeWeight::default());
        if weight != 0 {
            self.change_type_weight(type_id, weight, now);
        }
        type_id
    }

    /// Schedule `weight` for `type_id` from the next week; returns that week
    pub fn change_type_weight(&mut self, type_id: u32, weight: Amount, now: Timestamp) -> Timestamp {
        let idx = type_id as usize;
        let old_weight = self.type_weights[idx].fill(now);
        let old_sum = self.sums[idx].fill(now);
        let total = self.fill_total(now);
        let next_time = next_week(now);

        let total = total + U256::from(old_sum) * U256::from(weight)
            - U256::from(old_sum) * U256::from(old_weight);
        self.totals.insert(next_time, total);
        self.type_weights[idx].points.insert(next_time, weight);
        self.type_weights[idx].last = next_time;
        self.time_total = next_time;
        next_time
    }

    /// Register a guild with zero weight
    pub fn add_guild(&mut self, guild: Address, type_id: u32, now: Timestamp) {
        let next_time = next_week(now);
        let sum = &mut self.sums[type_id as usize];
        if sum.last == 0 {
            sum.last = next_time;
        }
        self.guilds.insert(
            guild,
            Series {
                last: next_time,
                ..Series::default()
            },
        );
        self.guild_types.insert(guild, type_id);
    }

    fn fill_total(&mut self, now: Timestamp) -> U256 {
        let mut t = self.time_total;
        if t > now {
            // already checkpointed this week, refresh the pending value
            t -= WEEK;
        }
        let mut pt = self.totals.get(&t).copied().unwrap_or_default();

        for idx in 0..self.sums.len() {
            self.sums[idx].fill(now);
            self.type_weights[idx].fill(now);
        }

        for _ in 0..MAX_WEEK_STEPS {
            if t > now {
                break;
            }
            t += WEEK;
            pt = U256::zero();
            for idx in 0..self.sums.len() {
                let type_sum = self.sums[idx].point(t).bias;
                let type_weight = self.type_weights[idx].at(t);
                pt += U256::from(type_sum) * U256::from(type_weight);
            }
            self.totals.insert(t, pt);
            if t > now {
                self.time_total = t;
            }
        }
        pt
    }

    /// Fill the total (and every type) up to now
    pub fn checkpoint(&mut self, now: Timestamp) {
        self.fill_total(now);
    }

    /// Fill one guild and the total up to now
    pub fn checkpoint_guild(&mut self, guild: Address, now: Timestamp) {
        if let Some(series) = self.guilds.get_mut(&guild) {
            series.fill(now);
        }
        self.fill_total(now);
    }

    /// Replace `user`'s contribution to `guild` with `slope` until `lock_end`.
    ///
    /// Locks ending at or before the next boundary contribute nothing.
    pub fn vote(
        &mut self,
        user: Address,
        guild: Address,
        slope: Amount,
        lock_end: Timestamp,
        now: Timestamp,
    ) -> Result<()> {
        let type_id = self
            .guild_type(guild)
            .ok_or(DaoError::UnknownGuild(guild))? as usize;
        let next_time = next_week(now);

        let new_slope = if lock_end > next_time && slope > 0 {
            VotedSlope { slope, end: lock_end }
        } else {
            VotedSlope::default()
        };
        let new_bias = new_slope.slope * u128::from(new_slope.end.saturating_sub(next_time));

        let old_slope = self.votes.get(&(user, guild)).copied().unwrap_or_default();
        let old_dt = old_slope.end.saturating_sub(next_time);
        let old_bias = old_slope.slope * u128::from(old_dt);

        let series = self
            .guilds
            .get_mut(&guild)
            .ok_or(DaoError::UnknownGuild(guild))?;
        let old_weight_bias = series.fill(now);
        let old_weight_slope = series.point(next_time).slope;
        let old_sum_bias = self.sums[type_id].fill(now);
        let old_sum_slope = self.sums[type_id].point(next_time).slope;

        let guild_pt = series.point_mut(next_time);
        guild_pt.bias = (old_weight_bias + new_bias).max(old_bias) - old_bias;
        let sum_pt = self.sums[type_id].point_mut(next_time);
        sum_pt.bias = (old_sum_bias + new_bias).max(old_bias) - old_bias;

        if old_slope.end > next_time {
            series.point_mut(next_time).slope =
                (old_weight_slope + new_slope.slope).max(old_slope.slope) - old_slope.slope;
            self.sums[type_id].point_mut(next_time).slope =
                (old_sum_slope + new_slope.slope).max(old_slope.slope) - old_slope.slope;
        } else {
            series.point_mut(next_time).slope += new_slope.slope;
            self.sums[type_id].point_mut(next_time).slope += new_slope.slope;
        }

        if old_slope.end > now {
            series.remove_change(old_slope.end, old_slope.slope);
            self.sums[type_id].remove_change(old_slope.end, old_slope.slope);
        }
        if new_slope.slope > 0 {
            series.add_change(new_slope.end, new_slope.slope);
            self.sums[type_id].add_change(new_slope.end, new_slope.slope);
        }

        self.fill_total(now);
        self.votes.insert((user, guild), new_slope);
        Ok(())
    }

    /// Current contribution of `user` to `guild`
    pub fn voted_slope(&self, user: Address, guild: Address) -> VotedSlope {
        self.votes.get(&(user, guild)).copied().unwrap_or_default()
    }

    /// Guild weight at its latest scheduled point
    pub fn get_guild_weight(&self, guild: Address) -> Amount {
        self.guilds
            .get(&guild)
            .map_or(0, |series| series.point(series.last).bias)
    }

    /// Guild weight at the week boundary containing `now`
    pub fn guild_effective_weight(&self, guild: Address, now: Timestamp) -> Amount {
        self.guilds
            .get(&guild)
            .map_or(0, |series| series.project(week_floor(now)))
    }

    /// Type sum at its latest scheduled point
    pub fn get_weights_sum_per_type(&self, type_id: u32) -> Amount {
        self.sums
            .get(type_id as usize)
            .map_or(0, |series| series.point(series.last).bias)
    }

    /// Type weight at its latest scheduled point
    pub fn get_type_weight(&self, type_id: u32) -> Amount {
        self.type_weights
            .get(type_id as usize)
            .map_or(0, |tw| tw.at(tw.last))
    }

    /// Total weight at its latest scheduled point
    pub fn get_total_weight(&self) -> U256 {
        self.totals.get(&self.time_total).copied().unwrap_or_default()
    }

    /// Stored type sum at week boundary `t`
    pub fn type_sum_at(&self, type_id: u32, t: Timestamp) -> Amount {
        self.sums
            .get(type_id as usize)
            .map_or(0, |series| series.point(t).bias)
    }

    /// Stored type weight at week boundary `t`
    pub fn type_weight_at(&self, type_id: u32, t: Timestamp) -> Amount {
        self.type_weights
            .get(type_id as usize)
            .map_or(0, |tw| tw.at(t))
    }

    /// Stored total at week boundary `t`
    pub fn total_at(&self, t: Timestamp) -> U256 {
        self.totals.get(&t).copied().unwrap_or_default()
    }

    /// Share of emissions for `guild` in the week containing `t`, scaled by `ONE`
    pub fn guild_relative_weight(&self, guild: Address, t: Timestamp) -> Result<Amount> {
        let t = week_floor(t);
        let total = self.total_at(t);
        if total.is_zero() {
            return Ok(0);
        }
        let Some(type_id) = self.guild_type(guild) else {
            return Ok(0);
        };
        let type_weight = self.type_weight_at(type_id, t);
        let guild_weight = self.guilds.get(&guild).map_or(0, |s| s.point(t).bias);
        to_u128(
            U256::from(ONE) * U256::from(type_weight) * U256::from(guild_weight) / total,
            "guild_relative_weight",
        )
    }
}
