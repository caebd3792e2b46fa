//! Protocol configuration
//!
//! Every section has defaults matching the deployed protocol, so an empty
//! TOML file yields a valid configuration:
//!
//! ```toml
//! [emission]
//! initial_supply_tokens = 727200000
//! annual_emission_tokens = 121587840
//!
//! [guild]
//! tokenless_production = 40
//! boost_warmup = 1209600
//!
//! [reward]
//! immediate_release_percent = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use vrh_core::prelude::*;

/// Complete protocol configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Emission token parameters
    #[serde(default)]
    pub emission: EmissionConfig,

    /// Voting-escrow parameters
    #[serde(default)]
    pub escrow: EscrowConfig,

    /// Guild boosting and commission parameters
    #[serde(default)]
    pub guild: GuildConfig,

    /// Minting split and vesting parameters
    #[serde(default)]
    pub reward: RewardConfig,
}

impl ProtocolConfig {
    /// Parse from a TOML string and validate
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DaoError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DaoError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(DaoError::InvalidConfig(msg.to_string()));

        if self.emission.rate_reduction_time == 0 {
            return invalid("emission.rate_reduction_time must be positive");
        }
        if u128::from(self.emission.rate_reduction_coefficient) <= ONE {
            return invalid("emission.rate_reduction_coefficient must exceed 10^18");
        }
        if self.escrow.max_lock_time < WEEK {
            return invalid("escrow.max_lock_time must be at least one week");
        }
        if self.guild.tokenless_production == 0 || self.guild.tokenless_production > 100 {
            return invalid("guild.tokenless_production must be in 1..=100");
        }
        if self.guild.max_commission_rate > 100 {
            return invalid("guild.max_commission_rate must be at most 100");
        }
        if self.reward.immediate_release_percent > 100 {
            return invalid("reward.immediate_release_percent must be at most 100");
        }
        if self.reward.vesting_epoch == 0 || self.reward.vesting_duration == 0 {
            return invalid("reward vesting periods must be positive");
        }
        Ok(())
    }
}

/// Emission token configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmissionConfig {
    /// Supply minted to the deployer, in whole tokens
    #[serde(default = "default_initial_supply_tokens")]
    pub initial_supply_tokens: u64,

    /// First-year emission, in whole tokens
    #[serde(default = "default_annual_emission_tokens")]
    pub annual_emission_tokens: u64,

    /// Mining epoch length in seconds
    #[serde(default = "default_rate_reduction_time")]
    pub rate_reduction_time: u64,

    /// Rate divisor applied each epoch, 18-decimal fixed point (2^0.25)
    #[serde(default = "default_rate_reduction_coefficient")]
    pub rate_reduction_coefficient: u64,

    /// Delay before the first mining epoch can start
    #[serde(default = "default_inflation_delay")]
    pub inflation_delay: u64,
}

fn default_initial_supply_tokens() -> u64 {
    727_200_000
}

fn default_annual_emission_tokens() -> u64 {
    121_587_840
}

fn default_rate_reduction_time() -> u64 {
    YEAR
}

fn default_rate_reduction_coefficient() -> u64 {
    crate::constants::RATE_REDUCTION_COEFFICIENT
}

fn default_inflation_delay() -> u64 {
    DAY
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            initial_supply_tokens: default_initial_supply_tokens(),
            annual_emission_tokens: default_annual_emission_tokens(),
            rate_reduction_time: default_rate_reduction_time(),
            rate_reduction_coefficient: default_rate_reduction_coefficient(),
            inflation_delay: default_inflation_delay(),
        }
    }
}

impl EmissionConfig {
    /// Initial supply in smallest units
    pub fn initial_supply(&self) -> Amount {
        u128::from(self.initial_supply_tokens) * ONE
    }

    /// Emission rate of the first epoch, per second
    pub fn initial_rate(&self) -> Amount {
        u128::from(self.annual_emission_tokens) * ONE / u128::from(self.rate_reduction_time)
    }
}

/// Voting-escrow configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Longest allowed lock in seconds
    #[serde(default = "default_max_lock_time")]
    pub max_lock_time: u64,
}

fn default_max_lock_time() -> u64 {
    MAXTIME
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            max_lock_time: default_max_lock_time(),
        }
    }
}

/// Guild configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuildConfig {
    /// Unboosted share of the voting balance, percent (max boost = 100 / this)
    #[serde(default = "default_tokenless_production")]
    pub tokenless_production: u8,

    /// Period after guild creation during which every member is fully boosted
    #[serde(default = "default_boost_warmup")]
    pub boost_warmup: u64,

    /// Highest commission an owner may take, percent
    #[serde(default = "default_max_commission_rate")]
    pub max_commission_rate: u8,

    /// Minimum spacing between commission changes
    #[serde(default = "default_commission_change_delay")]
    pub commission_change_delay: u64,
}

fn default_tokenless_production() -> u8 {
    40
}

fn default_boost_warmup() -> u64 {
    2 * WEEK
}

fn default_max_commission_rate() -> u8 {
    crate::constants::MAX_COMMISSION_RATE
}

fn default_commission_change_delay() -> u64 {
    WEEK
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            tokenless_production: default_tokenless_production(),
            boost_warmup: default_boost_warmup(),
            max_commission_rate: default_max_commission_rate(),
            commission_change_delay: default_commission_change_delay(),
        }
    }
}

impl GuildConfig {
    /// Working-balance multiplier of a fully boosted member over an unboosted one
    pub fn max_boost(&self) -> f64 {
        100.0 / f64::from(self.tokenless_production)
    }
}

/// Minting split and vesting configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Share of each mint paid out immediately, percent
    #[serde(default = "default_immediate_release_percent")]
    pub immediate_release_percent: u8,

    /// Vesting period length; locks in one period share an entry
    #[serde(default = "default_vesting_epoch")]
    pub vesting_epoch: u64,

    /// Time for an entry to vest completely
    #[serde(default = "default_vesting_duration")]
    pub vesting_duration: u64,
}

fn default_immediate_release_percent() -> u8 {
    30
}

fn default_vesting_epoch() -> u64 {
    MONTH
}

fn default_vesting_duration() -> u64 {
    6 * MONTH // 168 days
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            immediate_release_percent: default_immediate_release_percent(),
            vesting_epoch: default_vesting_epoch(),
            vesting_duration: default_vesting_duration(),
        }
    }
}
