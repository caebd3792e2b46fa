//! Two-phase admin transfer
//!
//! An admin role moves in two steps: the current admin commits a successor,
//! then applies the commit. A mistyped successor can be overwritten by a new
//! commit before anything irrevocable happens.

use serde::{Deserialize, Serialize};
use vrh_core::prelude::*;

/// Admin role with a pending successor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    admin: Address,
    future_admin: Option<Address>,
}

impl Authority {
    /// Create with `admin` in charge
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            future_admin: None,
        }
    }

    /// Current admin
    pub fn admin(&self) -> Address {
        self.admin
    }

    /// Committed successor, if any
    pub fn future_admin(&self) -> Option<Address> {
        self.future_admin
    }

    /// Fail unless `caller` is the current admin
    pub fn ensure(&self, caller: Address) -> Result<()> {
        if caller != self.admin {
            return Err(DaoError::unauthorized("admin only"));
        }
        Ok(())
    }

    /// Commit `future` as the next admin
    pub fn commit(&mut self, caller: Address, future: Address) -> Result<()> {
        self.ensure(caller)?;
        self.future_admin = Some(future);
        Ok(())
    }

    /// Make the committed successor the admin
    pub fn apply(&mut self, caller: Address) -> Result<Address> {
        self.ensure(caller)?;
        let future = self
            .future_admin
            .take()
            .ok_or_else(|| DaoError::precondition("admin not set"))?;
        self.admin = future;
        Ok(future)
    }
}

/// One-time minter designation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinterRole {
    minter: Option<Address>,
}

impl MinterRole {
    /// Designated minter
    pub fn get(&self) -> Option<Address> {
        self.minter
    }

    /// Set the minter; only allowed once
    pub fn set(&mut self, minter: Address) -> Result<()> {
        if self.minter.is_some() {
            return Err(DaoError::precondition("can set the minter only once"));
        }
        self.minter = Some(minter);
        Ok(())
    }

    /// Fail unless `caller` is the minter
    pub fn ensure(&self, caller: Address) -> Result<()> {
        match self.minter {
            Some(minter) if minter == caller => Ok(()),
            _ => Err(DaoError::unauthorized("minter only")),
        }
    }
}
