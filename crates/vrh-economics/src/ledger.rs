//! # Ledger
//!
//! Serialized, atomic entry point to the protocol state.
//!
//! ```text
//!   Request { caller, op }
//!        │
//!        ▼
//!   clock.now() ── must not precede the last committed call
//!        │
//!        ▼
//!   clone state ──► execute ──► Ok  ──► commit, drain events
//!                           └─► Err ──► discard clone
//!        │
//!        ▼
//!   Response { outcome, events, timestamp }
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use vrh_core::prelude::*;

use crate::config::ProtocolConfig;
use crate::dao::Dao;
use crate::events::Event;
use crate::minter::MintReceipt;
use crate::token::MiningUpdate;

/// A call against the protocol
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub caller: Address,
    pub op: Operation,
}

impl Request {
    pub fn new(caller: Address, op: Operation) -> Self {
        Self { caller, op }
    }
}

/// Every state-changing operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    // === Emission token ===
    Transfer { to: Address, value: Amount },
    UpdateMiningParameters,
    SetMinter { target: Address, minter: Address },

    // === Gas tokens ===
    DeployGasToken { name: String, symbol: String, initial_supply: Amount },
    TransferGas { gas_token: Address, to: Address, value: Amount },

    // === Voting escrow ===
    CreateLock { amount: Amount, unlock_time: Timestamp },
    IncreaseAmount { amount: Amount },
    IncreaseUnlockTime { unlock_time: Timestamp },
    DepositFor { user: Address, amount: Amount },
    Withdraw,
    CheckpointEscrow,

    // === Gas escrow ===
    CreateGas { gas_escrow: Address, amount: Amount },
    IncreaseGas { gas_escrow: Address, amount: Amount },
    WithdrawGas { gas_escrow: Address, amount: Amount },

    // === Guild controller ===
    AddType { name: String, symbol: String, gas_token: Address, weight: Amount },
    ChangeTypeWeight { type_id: u32, weight: Amount },
    CreateGuild { owner: Address, type_id: u32, commission_rate: u8 },
    TransferGuildOwnership { new_owner: Address },
    Checkpoint,
    CheckpointGuild { guild: Address },

    // === Guild ===
    JoinGuild { guild: Address },
    LeaveGuild { guild: Address },
    UpdateWorkingBalance { guild: Address, user: Address },
    UserCheckpoint { guild: Address, user: Address },
    SetCommissionRate { guild: Address, increase: bool },

    // === Minter ===
    Mint,
    MintFrom { guild: Address },

    // === Admin roles ===
    CommitTransferOwnership { target: Address, future_admin: Address },
    ApplyTransferOwnership { target: Address },
    CommitTransferCreateGuildOwnership { future_admin: Address },
    ApplyTransferCreateGuildOwnership,
}

/// Value returned by a successful operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Address(Address),
    TypeId(u32),
    Amount(Amount),
    Mining(MiningUpdate),
    Minted(MintReceipt),
}

/// Result of one request
#[derive(Clone, Debug, Serialize)]
pub struct Response {
    pub outcome: std::result::Result<Outcome, DaoError>,
    pub events: Vec<Event>,
    pub timestamp: Timestamp,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

struct State {
    dao: Dao,
    last_timestamp: Timestamp,
}

/// Protocol state behind a lock, driven by a clock
pub struct Ledger<C: Clock> {
    state: RwLock<State>,
    clock: C,
}

impl<C: Clock> Ledger<C> {
    /// Deploy a fresh protocol at the clock's current time
    pub fn new(admin: Address, config: ProtocolConfig, clock: C) -> Result<Self> {
        let now = clock.now();
        let dao = Dao::bootstrap(admin, config, now)?;
        Ok(Self::from_dao(dao, clock))
    }

    /// Wrap an existing state
    pub fn from_dao(dao: Dao, clock: C) -> Self {
        let last_timestamp = dao.deployed_at();
        Self {
            state: RwLock::new(State {
                dao,
                last_timestamp,
            }),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Apply `request` atomically
    pub fn submit(&self, request: Request) -> Response {
        let now = self.clock.now();
        let mut state = self.state.write();

        if now < state.last_timestamp {
            return Response {
                outcome: Err(DaoError::precondition("Time cannot go backwards")),
                events: Vec::new(),
                timestamp: now,
            };
        }

        let mut draft = state.dao.clone();
        match draft.execute(request.caller, request.op, now) {
            Ok(outcome) => {
                let events = draft.take_events();
                state.dao = draft;
                state.last_timestamp = now;
                Response {
                    outcome: Ok(outcome),
                    events,
                    timestamp: now,
                }
            }
            Err(err) => {
                tracing::debug!(caller = %request.caller, error = %err, "Request reverted");
                Response {
                    outcome: Err(err),
                    events: Vec::new(),
                    timestamp: now,
                }
            }
        }
    }

    /// Read the committed state
    pub fn view<R>(&self, f: impl FnOnce(&Dao) -> R) -> R {
        f(&self.state.read().dao)
    }

    /// Timestamp of the last committed call
    pub fn last_timestamp(&self) -> Timestamp {
        self.state.read().last_timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const START: Timestamp = 1_600_000_000;

    fn admin() -> Address {
        Address::from_label("admin")
    }

    #[test]
    fn test_failed_request_leaves_state_untouched() {
        let ledger = Ledger::new(admin(), ProtocolConfig::default(), ManualClock::new(START)).unwrap();
        let bob = Address::from_label("bob");

        let response = ledger.submit(Request::new(bob, Operation::Transfer { to: admin(), value: 1 }));
        assert_eq!(
            response.outcome,
            Err(DaoError::precondition("Insufficient balance"))
        );
        assert!(response.events.is_empty());

        let response = ledger.submit(Request::new(admin(), Operation::Transfer { to: bob, value: 7 }));
        assert!(response.is_ok());
        assert_eq!(response.events.len(), 1);
        assert_eq!(ledger.view(|dao| dao.token().ledger().balance_of(bob)), 7);
    }

    #[test]
    fn test_time_cannot_go_backwards() {
        struct Rewind(std::sync::atomic::AtomicU64);
        impl Clock for Rewind {
            fn now(&self) -> Timestamp {
                self.0.fetch_sub(10, std::sync::atomic::Ordering::SeqCst)
            }
        }

        let ledger = Ledger::new(admin(), ProtocolConfig::default(), Rewind(START.into())).unwrap();
        let response = ledger.submit(Request::new(admin(), Operation::Checkpoint));
        assert_eq!(
            response.outcome,
            Err(DaoError::precondition("Time cannot go backwards"))
        );
    }

    #[test]
    fn test_reverted_mining_update() {
        let ledger = Ledger::new(admin(), ProtocolConfig::default(), ManualClock::new(START)).unwrap();
        let response = ledger.submit(Request::new(admin(), Operation::UpdateMiningParameters));
        assert_eq!(response.outcome, Err(DaoError::precondition("too soon!")));

        ledger.clock().advance(DAY + 1);
        let response = ledger.submit(Request::new(admin(), Operation::UpdateMiningParameters));
        assert!(matches!(response.outcome, Ok(Outcome::Mining(_))));
        assert!(matches!(
            response.events.as_slice(),
            [Event::UpdateMiningParameters { .. }]
        ));
    }

    #[test]
    fn test_concurrent_readers_see_committed_state() {
        let ledger = Arc::new(
            Ledger::new(admin(), ProtocolConfig::default(), ManualClock::new(START)).unwrap(),
        );
        let bob = Address::from_label("bob");
        let writer = {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    ledger.submit(Request::new(admin(), Operation::Transfer { to: bob, value: 1 }));
                }
            })
        };
        for _ in 0..100 {
            let total = ledger.view(|dao| {
                let ledger = dao.token().ledger();
                ledger.balance_of(bob) + ledger.balance_of(admin())
            });
            assert_eq!(total, 727_200_000 * ONE);
        }
        writer.join().unwrap();
        assert_eq!(ledger.view(|dao| dao.token().ledger().balance_of(bob)), 100);
    }

    #[test]
    fn test_request_json() {
        let request = Request::new(
            admin(),
            Operation::CreateLock {
                amount: 1_000 * ONE,
                unlock_time: START + YEAR,
            },
        );
        let json = serde_json::to_string(&request).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
