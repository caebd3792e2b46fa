//! # DAO State
//!
//! Aggregate of every protocol component, and the dispatcher that maps an
//! [`Operation`] onto them.
//!
//! ```text
//!                ┌───────────────┐
//!   lock ───────►│ VotingEscrow  │──── balances ────┐
//!                └───────────────┘                  ▼
//!                ┌───────────────┐  weights  ┌──────────────┐
//!   gas ────────►│  GasEscrow(s) │──────────►│GuildController│
//!                └───────────────┘   boost   │   └ Guilds   │
//!                                            └──────┬───────┘
//!                ┌───────────────┐   credit         │
//!                │    Minter     │◄─────────────────┘
//!                └──┬─────────┬──┘
//!            30% now│         │70% vested
//!                   ▼         ▼
//!           ┌──────────┐ ┌────────────────────┐
//!           │  Token   │◄│RewardVestingEscrow │
//!           └──────────┘ └────────────────────┘
//! ```

use std::collections::HashMap;
use vrh_core::prelude::*;

use crate::config::ProtocolConfig;
use crate::controller::{Env, GuildController};
use crate::events::{Event, EventLog};
use crate::ledger::{Operation, Outcome};
use crate::minter::Minter;
use crate::token::{EmissionToken, TokenLedger};
use crate::vesting::RewardVestingEscrow;
use crate::voting_escrow::VotingEscrow;

/// Builds the shared environment guild operations borrow
macro_rules! env {
    ($dao:ident, $now:expr) => {
        Env {
            escrow: &$dao.escrow,
            token: &mut $dao.token,
            config: &$dao.config.guild,
            now: $now,
            events: &mut $dao.events,
        }
    };
}

/// Complete protocol state
#[derive(Clone, Debug)]
pub struct Dao {
    config: ProtocolConfig,
    deployed_at: Timestamp,
    token: EmissionToken,
    gas_tokens: HashMap<Address, TokenLedger>,
    escrow: VotingEscrow,
    controller: GuildController,
    minter: Minter,
    vesting: RewardVestingEscrow,
    events: EventLog,
}

fn component(name: &str) -> Address {
    Address::derive(b"component", &[name.as_bytes()])
}

impl Dao {
    /// Deploy every component; `admin` holds every admin role and the initial supply
    pub fn new(admin: Address, config: ProtocolConfig, now: Timestamp) -> Result<Self> {
        config.validate()?;

        let token = EmissionToken::new(
            component("token"),
            crate::constants::NAME,
            crate::constants::SYMBOL,
            admin,
            config.emission.clone(),
            now,
        )?;
        let escrow = VotingEscrow::new(
            component("voting_escrow"),
            token.address(),
            admin,
            config.escrow.max_lock_time,
            now,
        );
        let controller = GuildController::new(component("guild_controller"), admin, now);
        let minter = Minter::new(component("minter"), config.reward.immediate_release_percent);
        let vesting = RewardVestingEscrow::new(component("reward_vesting"), admin, &config.reward);

        tracing::info!(%admin, now, "Protocol deployed");

        Ok(Self {
            config,
            deployed_at: now,
            token,
            gas_tokens: HashMap::new(),
            escrow,
            controller,
            minter,
            vesting,
            events: EventLog::new(),
        })
    }

    /// Deploy and designate the minter on the token, controller and vesting escrow
    pub fn bootstrap(admin: Address, config: ProtocolConfig, now: Timestamp) -> Result<Self> {
        let mut dao = Self::new(admin, config, now)?;
        let minter = dao.minter.address();
        for target in [
            dao.token.address(),
            dao.controller.address(),
            dao.vesting.address(),
        ] {
            dao.set_minter(admin, target, minter)?;
        }
        dao.events.drain();
        Ok(dao)
    }

    // === Views ===

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn deployed_at(&self) -> Timestamp {
        self.deployed_at
    }

    pub fn token(&self) -> &EmissionToken {
        &self.token
    }

    pub fn gas_token(&self, address: Address) -> Option<&TokenLedger> {
        self.gas_tokens.get(&address)
    }

    pub fn escrow(&self) -> &VotingEscrow {
        &self.escrow
    }

    pub fn controller(&self) -> &GuildController {
        &self.controller
    }

    pub fn minter(&self) -> &Minter {
        &self.minter
    }

    pub fn vesting(&self) -> &RewardVestingEscrow {
        &self.vesting
    }

    /// Events recorded since the last drain
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    // === Dispatch ===

    /// Apply `op` on behalf of `caller` at `now`
    pub fn execute(&mut self, caller: Address, op: Operation, now: Timestamp) -> Result<Outcome> {
        match op {
            Operation::Transfer { to, value } => {
                self.token.ledger_mut().transfer(caller, to, value)?;
                self.events.emit(Event::Transfer {
                    token: self.token.address(),
                    from: caller,
                    to,
                    value,
                });
                Ok(Outcome::Done)
            }
            Operation::UpdateMiningParameters => {
                let update = self.token.update_mining_parameters(now)?;
                self.events.emit(Event::UpdateMiningParameters {
                    time: update.time,
                    rate: update.rate,
                    supply: update.supply,
                });
                Ok(Outcome::Mining(update))
            }
            Operation::SetMinter { target, minter } => {
                self.set_minter(caller, target, minter)?;
                Ok(Outcome::Done)
            }

            Operation::DeployGasToken {
                name,
                symbol,
                initial_supply,
            } => {
                let nonce = (self.gas_tokens.len() as u64).to_le_bytes();
                let address = Address::derive(
                    b"gas_token",
                    &[name.as_bytes(), symbol.as_bytes(), &nonce[..]],
                );
                let mut ledger = TokenLedger::new(address, &name, &symbol);
                ledger.credit(caller, initial_supply)?;
                self.gas_tokens.insert(address, ledger);
                tracing::info!(%address, %name, %symbol, "Gas token deployed");
                self.events.emit(Event::Transfer {
                    token: address,
                    from: Address::ZERO,
                    to: caller,
                    value: initial_supply,
                });
                Ok(Outcome::Address(address))
            }
            Operation::TransferGas {
                gas_token,
                to,
                value,
            } => {
                self.gas_ledger_mut(gas_token)?.transfer(caller, to, value)?;
                self.events.emit(Event::Transfer {
                    token: gas_token,
                    from: caller,
                    to,
                    value,
                });
                Ok(Outcome::Done)
            }

            Operation::CreateLock {
                amount,
                unlock_time,
            } => {
                self.escrow.create_lock(
                    self.token.ledger_mut(),
                    caller,
                    amount,
                    unlock_time,
                    now,
                    &mut self.events,
                )?;
                Ok(Outcome::Done)
            }
            Operation::IncreaseAmount { amount } => {
                self.escrow.increase_amount(
                    self.token.ledger_mut(),
                    caller,
                    amount,
                    now,
                    &mut self.events,
                )?;
                Ok(Outcome::Done)
            }
            Operation::IncreaseUnlockTime { unlock_time } => {
                self.escrow.increase_unlock_time(
                    self.token.ledger_mut(),
                    caller,
                    unlock_time,
                    now,
                    &mut self.events,
                )?;
                Ok(Outcome::Done)
            }
            Operation::DepositFor { user, amount } => {
                self.escrow.deposit_for(
                    self.token.ledger_mut(),
                    caller,
                    user,
                    amount,
                    now,
                    &mut self.events,
                )?;
                Ok(Outcome::Done)
            }
            Operation::Withdraw => {
                let value =
                    self.escrow
                        .withdraw(self.token.ledger_mut(), caller, now, &mut self.events)?;
                Ok(Outcome::Amount(value))
            }
            Operation::CheckpointEscrow => {
                self.escrow.checkpoint(now);
                Ok(Outcome::Done)
            }

            Operation::CreateGas { gas_escrow, amount } => {
                self.with_gas_escrow(gas_escrow, |escrow, ledger, events| {
                    escrow.create_gas(ledger, caller, amount, events)
                })?;
                Ok(Outcome::Done)
            }
            Operation::IncreaseGas { gas_escrow, amount } => {
                self.with_gas_escrow(gas_escrow, |escrow, ledger, events| {
                    escrow.increase_gas(ledger, caller, amount, events)
                })?;
                Ok(Outcome::Done)
            }
            Operation::WithdrawGas { gas_escrow, amount } => {
                self.with_gas_escrow(gas_escrow, |escrow, ledger, events| {
                    escrow.withdraw_gas(ledger, caller, amount, events)
                })?;
                Ok(Outcome::Done)
            }

            Operation::AddType {
                name,
                symbol,
                gas_token,
                weight,
            } => {
                let type_id = self.controller.add_type(
                    caller,
                    &name,
                    &symbol,
                    gas_token,
                    weight,
                    now,
                    &mut self.events,
                )?;
                Ok(Outcome::TypeId(type_id))
            }
            Operation::ChangeTypeWeight { type_id, weight } => {
                self.controller
                    .change_type_weight(caller, type_id, weight, now, &mut self.events)?;
                Ok(Outcome::Done)
            }
            Operation::CreateGuild {
                owner,
                type_id,
                commission_rate,
            } => {
                let guild = self.controller.create_guild(
                    caller,
                    owner,
                    type_id,
                    commission_rate,
                    &mut env!(self, now),
                )?;
                Ok(Outcome::Address(guild))
            }
            Operation::TransferGuildOwnership { new_owner } => {
                self.controller
                    .transfer_guild_ownership(caller, new_owner, &mut env!(self, now))?;
                Ok(Outcome::Done)
            }
            Operation::Checkpoint => {
                self.controller.checkpoint(now);
                Ok(Outcome::Done)
            }
            Operation::CheckpointGuild { guild } => {
                self.controller.checkpoint_guild(guild, now)?;
                Ok(Outcome::Done)
            }

            Operation::JoinGuild { guild } => {
                self.controller
                    .join_guild(caller, guild, &mut env!(self, now))?;
                Ok(Outcome::Done)
            }
            Operation::LeaveGuild { guild } => {
                self.controller
                    .leave_guild(caller, guild, &mut env!(self, now))?;
                Ok(Outcome::Done)
            }
            Operation::UpdateWorkingBalance { guild, user } => {
                self.controller
                    .update_working_balance(user, guild, &mut env!(self, now))?;
                Ok(Outcome::Done)
            }
            Operation::UserCheckpoint { guild, user } => {
                self.controller
                    .user_checkpoint(caller, user, guild, &mut env!(self, now))?;
                Ok(Outcome::Done)
            }
            Operation::SetCommissionRate { guild, increase } => {
                self.controller
                    .set_commission_rate(caller, guild, increase, &mut env!(self, now))?;
                Ok(Outcome::Done)
            }

            Operation::Mint => {
                let receipt = self.minter.mint(
                    caller,
                    &mut self.controller,
                    &mut self.vesting,
                    &mut env!(self, now),
                )?;
                Ok(Outcome::Minted(receipt))
            }
            Operation::MintFrom { guild } => {
                let receipt = self.minter.mint_from(
                    caller,
                    guild,
                    &mut self.controller,
                    &mut self.vesting,
                    &mut env!(self, now),
                )?;
                Ok(Outcome::Minted(receipt))
            }

            Operation::CommitTransferOwnership {
                target,
                future_admin,
            } => {
                self.authority_mut(target)?.commit(caller, future_admin)?;
                self.events.emit(Event::CommitOwnership {
                    target,
                    admin: future_admin,
                });
                Ok(Outcome::Done)
            }
            Operation::ApplyTransferOwnership { target } => {
                let admin = self.authority_mut(target)?.apply(caller)?;
                tracing::info!(%target, %admin, "Admin transferred");
                self.events.emit(Event::ApplyOwnership { target, admin });
                Ok(Outcome::Done)
            }
            Operation::CommitTransferCreateGuildOwnership { future_admin } => {
                self.controller
                    .create_guild_authority_mut()
                    .commit(caller, future_admin)?;
                self.events.emit(Event::CommitOwnership {
                    target: self.controller.address(),
                    admin: future_admin,
                });
                Ok(Outcome::Done)
            }
            Operation::ApplyTransferCreateGuildOwnership => {
                let admin = self.controller.create_guild_authority_mut().apply(caller)?;
                self.events.emit(Event::ApplyOwnership {
                    target: self.controller.address(),
                    admin,
                });
                Ok(Outcome::Done)
            }
        }
    }

    fn set_minter(&mut self, caller: Address, target: Address, minter: Address) -> Result<()> {
        if target == self.token.address() {
            self.token.set_minter(caller, minter)?;
        } else if target == self.controller.address() {
            self.controller.set_minter(caller, minter)?;
        } else if target == self.vesting.address() {
            self.vesting.set_minter(caller, minter)?;
        } else {
            return Err(DaoError::precondition("Unknown component"));
        }
        self.events.emit(Event::SetMinter { target, minter });
        Ok(())
    }

    fn authority_mut(&mut self, target: Address) -> Result<&mut crate::authority::Authority> {
        if target == self.token.address() {
            Ok(self.token.authority_mut())
        } else if target == self.escrow.address() {
            Ok(self.escrow.authority_mut())
        } else if target == self.controller.address() {
            Ok(self.controller.authority_mut())
        } else if target == self.vesting.address() {
            Ok(self.vesting.authority_mut())
        } else {
            Err(DaoError::precondition("Unknown component"))
        }
    }

    fn gas_ledger_mut(&mut self, gas_token: Address) -> Result<&mut TokenLedger> {
        self.gas_tokens
            .get_mut(&gas_token)
            .ok_or_else(|| DaoError::precondition("Unknown gas token"))
    }

    fn with_gas_escrow(
        &mut self,
        gas_escrow: Address,
        f: impl FnOnce(
            &mut crate::gas_escrow::GasEscrow,
            &mut TokenLedger,
            &mut EventLog,
        ) -> Result<()>,
    ) -> Result<()> {
        let escrow = self.controller.gas_escrow_mut(gas_escrow)?;
        let ledger = self
            .gas_tokens
            .get_mut(&escrow.gas_token())
            .ok_or_else(|| DaoError::precondition("Unknown gas token"))?;
        f(escrow, ledger, &mut self.events)
    }
}
