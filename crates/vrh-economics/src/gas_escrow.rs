//! Gas escrow
//!
//! Holds deposits of one guild type's gas token. Deposits do not decay; a
//! member's share of the escrow total drives their boost in every guild of
//! that type.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vrh_core::prelude::*;

use crate::events::{Event, EventLog};
use crate::token::TokenLedger;

/// Non-decaying deposit ledger for a gas token
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GasEscrow {
    address: Address,
    gas_token: Address,
    balances: HashMap<Address, Amount>,
    supply: Amount,
}

impl GasEscrow {
    /// Create an empty escrow for `gas_token`
    pub fn new(address: Address, gas_token: Address) -> Self {
        Self {
            address,
            gas_token,
            balances: HashMap::new(),
            supply: 0,
        }
    }

    /// Escrow address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Escrowed token
    pub fn gas_token(&self) -> Address {
        self.gas_token
    }

    /// Deposit of `user`
    pub fn balance_of(&self, user: Address) -> Amount {
        self.balances.get(&user).copied().unwrap_or(0)
    }

    /// Sum of all deposits
    pub fn total_supply(&self) -> Amount {
        self.supply
    }

    /// First deposit of `user`
    pub fn create_gas(
        &mut self,
        ledger: &mut TokenLedger,
        user: Address,
        amount: Amount,
        events: &mut EventLog,
    ) -> Result<()> {
        ensure(amount > 0, "need non-zero value")?;
        ensure(self.balance_of(user) == 0, "Withdraw old tokens first")?;
        self.deposit(ledger, user, amount, events)
    }

    /// Top up an existing deposit
    pub fn increase_gas(
        &mut self,
        ledger: &mut TokenLedger,
        user: Address,
        amount: Amount,
        events: &mut EventLog,
    ) -> Result<()> {
        ensure(amount > 0, "need non-zero value")?;
        ensure(self.balance_of(user) > 0, "No existing gas found")?;
        self.deposit(ledger, user, amount, events)
    }

    fn deposit(
        &mut self,
        ledger: &mut TokenLedger,
        user: Address,
        amount: Amount,
        events: &mut EventLog,
    ) -> Result<()> {
        ensure(ledger.address() == self.gas_token, "Wrong gas token")?;
        ledger.transfer(user, self.address, amount)?;
        *self.balances.entry(user).or_insert(0) += amount;
        self.supply += amount;

        events.emit(Event::Transfer {
            token: self.gas_token,
            from: user,
            to: self.address,
            value: amount,
        });
        events.emit(Event::GasDeposit {
            gas_escrow: self.address,
            provider: user,
            value: amount,
        });
        Ok(())
    }

    /// Return `amount` of `user`'s deposit
    pub fn withdraw_gas(
        &mut self,
        ledger: &mut TokenLedger,
        user: Address,
        amount: Amount,
        events: &mut EventLog,
    ) -> Result<()> {
        ensure(amount > 0, "need non-zero value")?;
        let balance = self.balance_of(user);
        ensure(amount <= balance, "Insufficient gas")?;
        ensure(ledger.address() == self.gas_token, "Wrong gas token")?;

        ledger.transfer(self.address, user, amount)?;
        self.balances.insert(user, balance - amount);
        self.supply -= amount;

        events.emit(Event::Transfer {
            token: self.gas_token,
            from: self.address,
            to: user,
            value: amount,
        });
        events.emit(Event::GasWithdraw {
            gas_escrow: self.address,
            provider: user,
            value: amount,
        });
        Ok(())
    }
}
