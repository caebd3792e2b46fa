//! Shared fixture for protocol-level tests
//!
//! Mirrors a fresh deployment: mining started, clock moved to the start of a
//! week plus an hour, and every funded account locked for the maximum time.

#![allow(dead_code)]

use vrh_core::prelude::*;
use vrh_economics::{Dao, Event, Ledger, Operation, Outcome, ProtocolConfig, Request, Response};

pub const GENESIS: Timestamp = 1_600_000_000;

/// Relative tolerance for quantities sampled a few seconds apart
pub const TOL: f64 = 120.0 / WEEK as f64;

pub const GAS_SUPPLY: Amount = 1_000_000_000 * ONE;

/// `2|a - b| / (a + b) <= precision`
pub fn approx(a: u128, b: u128, precision: f64) -> bool {
    if a == b {
        return true;
    }
    let (a, b) = (a as f64, b as f64);
    2.0 * (a - b).abs() / (a + b) <= precision
}

pub fn approx_u256(a: U256, b: U256, precision: f64) -> bool {
    if a == b {
        return true;
    }
    let a: f64 = a.to_string().parse().unwrap();
    let b: f64 = b.to_string().parse().unwrap();
    2.0 * (a - b).abs() / (a + b) <= precision
}

pub fn alice() -> Address {
    Address::from_label("alice")
}

pub fn bob() -> Address {
    Address::from_label("bob")
}

pub fn carl() -> Address {
    Address::from_label("carl")
}

pub fn dave() -> Address {
    Address::from_label("dave")
}

pub fn account(i: usize) -> Address {
    Address::from_label(&format!("account-{i}"))
}

pub struct Harness {
    pub ledger: Ledger<ManualClock>,
    pub gas_token: Address,
}

impl Harness {
    /// Deployment administered by alice, who holds the whole initial supply
    pub fn deploy() -> Self {
        Self::deploy_with(ProtocolConfig::default())
    }

    pub fn deploy_with(config: ProtocolConfig) -> Self {
        let ledger = Ledger::new(alice(), config, ManualClock::new(GENESIS)).unwrap();
        let mut harness = Self {
            ledger,
            gas_token: Address::ZERO,
        };

        harness.sleep(DAY + 1);
        harness.call(alice(), Operation::UpdateMiningParameters);
        harness.gas_token = harness.deploy_gas_token("Gas Escrowed Token", "MOH");
        harness
    }

    /// Fund each account, then lock it for the maximum time an hour into a week
    pub fn with_locks(locks: &[(Address, Amount)]) -> Self {
        let harness = Self::deploy();
        for &(user, amount) in locks {
            if user != alice() {
                harness.fund(user, amount);
            }
        }
        // beginning of a week, then one hour in
        harness.sleep_to_boundary(WEEK);
        harness.sleep(HOUR);
        for &(user, amount) in locks {
            harness.lock(user, amount);
        }
        harness.sleep(HOUR);
        harness
    }

    /// alice locks 40k, bob 50k
    pub fn standard() -> Self {
        Self::with_locks(&[(alice(), 40_000 * ONE), (bob(), 50_000 * ONE)])
    }

    // === Clock ===

    pub fn now(&self) -> Timestamp {
        self.ledger.clock().now()
    }

    pub fn sleep(&self, seconds: u64) -> Timestamp {
        self.ledger.clock().advance(seconds)
    }

    pub fn sleep_to_boundary(&self, period: u64) -> Timestamp {
        self.ledger.clock().advance_to_boundary(period)
    }

    // === Calls ===

    pub fn submit(&self, caller: Address, op: Operation) -> Response {
        self.ledger.submit(Request::new(caller, op))
    }

    /// Submit and panic on revert
    pub fn call(&self, caller: Address, op: Operation) -> Outcome {
        let label = format!("{op:?}");
        match self.submit(caller, op).outcome {
            Ok(outcome) => outcome,
            Err(err) => panic!("{label} reverted: {err}"),
        }
    }

    /// Submit and return the events, panicking on revert
    pub fn call_events(&self, caller: Address, op: Operation) -> Vec<Event> {
        let response = self.submit(caller, op);
        if let Err(err) = &response.outcome {
            panic!("reverted: {err}");
        }
        response.events
    }

    /// Submit and return the revert reason, panicking on success
    pub fn revert(&self, caller: Address, op: Operation) -> DaoError {
        let label = format!("{op:?}");
        match self.submit(caller, op).outcome {
            Ok(_) => panic!("{label} should have reverted"),
            Err(err) => err,
        }
    }

    pub fn view<R>(&self, f: impl FnOnce(&Dao) -> R) -> R {
        self.ledger.view(f)
    }

    // === Setup helpers ===

    pub fn deploy_gas_token(&self, name: &str, symbol: &str) -> Address {
        match self.call(
            alice(),
            Operation::DeployGasToken {
                name: name.to_string(),
                symbol: symbol.to_string(),
                initial_supply: GAS_SUPPLY,
            },
        ) {
            Outcome::Address(address) => address,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    pub fn fund(&self, user: Address, amount: Amount) {
        self.call(alice(), Operation::Transfer { to: user, value: amount });
    }

    pub fn lock(&self, user: Address, amount: Amount) {
        self.call(
            user,
            Operation::CreateLock {
                amount,
                unlock_time: self.now() + MAXTIME,
            },
        );
    }

    pub fn add_type(&self, gas_token: Address, weight: Amount) -> u32 {
        match self.call(
            alice(),
            Operation::AddType {
                name: "Gas MOH".to_string(),
                symbol: "GASMOH".to_string(),
                gas_token,
                weight,
            },
        ) {
            Outcome::TypeId(type_id) => type_id,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    pub fn new_guild(&self, owner: Address, type_id: u32, commission_rate: u8) -> Address {
        match self.call(
            alice(),
            Operation::CreateGuild {
                owner,
                type_id,
                commission_rate,
            },
        ) {
            Outcome::Address(guild) => guild,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    /// Register the default gas type, wait an hour, create a 20% guild for `owner`
    pub fn create_guild(&self, owner: Address) -> Address {
        let type_id = self.add_type(self.gas_token, ONE);
        self.sleep(HOUR);
        let guild = self.new_guild(owner, type_id, 20);
        self.call(owner, Operation::UpdateWorkingBalance { guild, user: owner });
        guild
    }

    /// Move gas tokens to `user` and deposit them in the type's escrow
    pub fn deposit_gas(&self, user: Address, amount: Amount) {
        if user != alice() {
            self.call(
                alice(),
                Operation::TransferGas {
                    gas_token: self.gas_token,
                    to: user,
                    value: amount,
                },
            );
        }
        let gas_escrow = self.gas_escrow();
        self.call(user, Operation::CreateGas { gas_escrow, amount });
    }

    pub fn gas_escrow(&self) -> Address {
        self.view(|dao| dao.controller().gas_addr_escrow(self.gas_token))
            .expect("gas type registered")
    }

    pub fn mint(&self, user: Address) -> vrh_economics::MintReceipt {
        match self.call(user, Operation::Mint) {
            Outcome::Minted(receipt) => receipt,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    // === Views ===

    pub fn integrate_fraction(&self, guild: Address, user: Address) -> Amount {
        self.view(|dao| dao.controller().guild(guild).unwrap().integrate_fraction(user))
    }

    pub fn working_balance(&self, guild: Address, user: Address) -> Amount {
        self.view(|dao| dao.controller().guild(guild).unwrap().working_balance(user))
    }

    pub fn voting_power(&self, user: Address) -> Amount {
        let now = self.now();
        self.view(|dao| dao.escrow().balance_of(user, now))
    }

    pub fn slope(&self, user: Address) -> Amount {
        self.view(|dao| dao.escrow().get_last_user_slope(user)) as Amount
    }

    pub fn guild_weight(&self, guild: Address) -> Amount {
        self.view(|dao| dao.controller().get_guild_weight(guild))
    }

    pub fn rate(&self) -> Amount {
        self.view(|dao| dao.token().rate())
    }

    pub fn vesting_entry(&self, user: Address, index: u64) -> vrh_economics::VestingEntry {
        self.view(|dao| dao.vesting().user_vesting_history(user, index))
    }

    pub fn claimable(&self, user: Address) -> Amount {
        let now = self.now();
        self.view(|dao| dao.vesting().get_claimable_tokens(user, now))
    }
}
