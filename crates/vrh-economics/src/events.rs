//! Event records emitted by state transitions

use serde::{Deserialize, Serialize};
use vrh_core::prelude::*;

/// Which lock operation produced a `Deposit`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositKind {
    DepositFor,
    CreateLock,
    IncreaseLockAmount,
    IncreaseUnlockTime,
}

/// Observable event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    /// Fungible transfer on a token ledger
    Transfer {
        token: Address,
        from: Address,
        to: Address,
        value: Amount,
    },

    /// Voting-escrow lock change
    Deposit {
        provider: Address,
        value: Amount,
        locktime: Timestamp,
        kind: DepositKind,
        ts: Timestamp,
    },

    /// Expired lock withdrawn
    Withdraw {
        provider: Address,
        value: Amount,
        ts: Timestamp,
    },

    /// Gas tokens moved into a gas escrow
    GasDeposit {
        gas_escrow: Address,
        provider: Address,
        value: Amount,
    },

    /// Gas tokens moved out of a gas escrow
    GasWithdraw {
        gas_escrow: Address,
        provider: Address,
        value: Amount,
    },

    /// New guild type registered
    AddType {
        name: String,
        type_id: u32,
        gas_token: Address,
        gas_escrow: Address,
    },

    /// Type weight scheduled
    NewTypeWeight {
        type_id: u32,
        time: Timestamp,
        weight: Amount,
    },

    /// Guild created
    NewGuild {
        guild: Address,
        owner: Address,
        type_id: u32,
        commission_rate: u8,
    },

    /// Member joined a guild
    JoinGuild { guild: Address, member: Address },

    /// Member left a guild
    LeaveGuild { guild: Address, member: Address },

    /// Commission change scheduled
    SetCommissionRate {
        guild: Address,
        commission_rate: u8,
        effective_time: Timestamp,
    },

    /// Guild ownership moved (`to` may be the zero address)
    TransferGuildOwnership {
        guild: Address,
        from: Address,
        to: Address,
    },

    /// Working balance recomputed
    UpdateLiquidityLimit {
        guild: Address,
        user: Address,
        original_balance: Amount,
        original_supply: Amount,
        working_balance: Amount,
        working_supply: Amount,
    },

    /// Rewards minted to a user
    Minted {
        recipient: Address,
        guild: Option<Address>,
        minted: Amount,
        vesting_locked: Amount,
    },

    /// Mining epoch advanced
    UpdateMiningParameters {
        time: Timestamp,
        rate: Amount,
        supply: Amount,
    },

    /// Minter designated on a component
    SetMinter { target: Address, minter: Address },

    /// Admin transfer committed
    CommitOwnership { target: Address, admin: Address },

    /// Admin transfer applied
    ApplyOwnership { target: Address, admin: Address },
}

/// Append-only buffer of events produced by the call in progress
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event
    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Events recorded so far
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Take all recorded events
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
