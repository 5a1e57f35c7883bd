//! # Asset Transfer Port
//!
//! The engine does not custody external balances itself — it asks this port
//! to move value between parties and trusts the answer. Each call is atomic:
//! it fully succeeds or fails with no partial effect, and a failure aborts
//! whatever engine operation requested it.
//!
//! [`InMemoryAssetBank`] is the reference implementation: a checked-
//! arithmetic account book good enough for tests, local nodes, and anything
//! that doesn't need a real settlement rail behind it. Production embedders
//! implement [`AssetTransferPort`] over whatever actually moves the money.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Opaque identifier for a fungible asset.
///
/// The engine never interprets it — equality is the only operation the
/// accounting needs. Whatever addressing scheme the transfer rail uses
/// (contract addresses, ticker symbols, ISO codes) passes through intact.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    /// Wraps an external asset identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by an asset transfer port.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The debited party does not hold enough of the asset.
    #[error("insufficient balance: {account} holds {available} of {asset}, requested {requested}")]
    InsufficientBalance {
        /// The asset being moved.
        asset: AssetId,
        /// The account that was short.
        account: String,
        /// Balance actually held.
        available: u128,
        /// Amount the transfer asked for.
        requested: u128,
    },

    /// Crediting the recipient would overflow its balance.
    #[error("balance overflow crediting {account} with {amount} of {asset}")]
    Overflow {
        /// The asset being moved.
        asset: AssetId,
        /// The account whose balance would overflow.
        account: String,
        /// The credit that caused it.
        amount: u128,
    },

    /// The rail refused the transfer for a reason of its own (allowance,
    /// compliance hold, paused token — the engine doesn't care which).
    #[error("transfer rejected: {reason}")]
    Rejected {
        /// Rail-specific explanation, passed through to the caller.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// AssetTransferPort
// ---------------------------------------------------------------------------

/// Capability to move fungible value between the engine and external
/// parties.
///
/// `transfer_in` pulls from an external account into engine custody;
/// `transfer_out` pays from engine custody to an external account. Both are
/// atomic. Implementations take `&self` — they manage their own interior
/// state — and must not call back into the engine (the engine's reentrancy
/// guard turns such a callback into a clean error rather than corruption,
/// but the correct number of reentrant calls is zero).
pub trait AssetTransferPort {
    /// Pulls `amount` of `asset` from `from` into engine custody.
    fn transfer_in(&self, asset: &AssetId, from: &str, amount: u128) -> Result<(), TransferError>;

    /// Pays `amount` of `asset` from engine custody to `to`.
    fn transfer_out(&self, asset: &AssetId, to: &str, amount: u128) -> Result<(), TransferError>;
}

impl<T: AssetTransferPort + ?Sized> AssetTransferPort for std::sync::Arc<T> {
    fn transfer_in(&self, asset: &AssetId, from: &str, amount: u128) -> Result<(), TransferError> {
        (**self).transfer_in(asset, from, amount)
    }

    fn transfer_out(&self, asset: &AssetId, to: &str, amount: u128) -> Result<(), TransferError> {
        (**self).transfer_out(asset, to, amount)
    }
}

// ---------------------------------------------------------------------------
// InMemoryAssetBank
// ---------------------------------------------------------------------------

/// The account engine custody is booked under. One custody pot per bank —
/// which vault retains what is the engine's bookkeeping, not the rail's.
const CUSTODY_ACCOUNT: &str = "cascade:custody";

/// Reference port implementation: an in-memory account book.
///
/// Balances are keyed by `(asset, account)`. Custody is a regular account,
/// so the bank's books always balance: minting aside, every transfer is a
/// debit matched by an equal credit.
#[derive(Debug, Default)]
pub struct InMemoryAssetBank {
    /// `(asset, account) -> balance`, guarded for interior mutability since
    /// the port trait takes `&self`.
    book: Mutex<HashMap<(AssetId, String), u128>>,
}

impl InMemoryAssetBank {
    /// Creates an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` of `asset` to `account` out of thin air.
    ///
    /// Test/faucet helper — this is the only entry point that creates
    /// value rather than moving it.
    pub fn mint(&self, asset: &AssetId, account: &str, amount: u128) -> Result<u128, TransferError> {
        let mut book = self.book.lock();
        Self::credit(&mut book, asset, account, amount)
    }

    /// Returns an account's balance of `asset` (zero if never touched).
    pub fn balance_of(&self, asset: &AssetId, account: &str) -> u128 {
        self.book
            .lock()
            .get(&(asset.clone(), account.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the engine-custody balance of `asset`.
    pub fn custody_balance(&self, asset: &AssetId) -> u128 {
        self.balance_of(asset, CUSTODY_ACCOUNT)
    }

    fn credit(
        book: &mut HashMap<(AssetId, String), u128>,
        asset: &AssetId,
        account: &str,
        amount: u128,
    ) -> Result<u128, TransferError> {
        let balance = book.entry((asset.clone(), account.to_string())).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(TransferError::Overflow {
            asset: asset.clone(),
            account: account.to_string(),
            amount,
        })?;
        Ok(*balance)
    }

    fn debit(
        book: &mut HashMap<(AssetId, String), u128>,
        asset: &AssetId,
        account: &str,
        amount: u128,
    ) -> Result<u128, TransferError> {
        let key = (asset.clone(), account.to_string());
        let available = book.get(&key).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                asset: asset.clone(),
                account: account.to_string(),
                available,
                requested: amount,
            });
        }
        book.insert(key, available - amount);
        Ok(available - amount)
    }
}

impl AssetTransferPort for InMemoryAssetBank {
    fn transfer_in(&self, asset: &AssetId, from: &str, amount: u128) -> Result<(), TransferError> {
        let mut book = self.book.lock();
        // Debit first: an insufficient sender must not leave a stray credit.
        Self::debit(&mut book, asset, from, amount)?;
        // Custody credit can only overflow if total supply was minted past
        // u128::MAX, in which case the mint already failed.
        Self::credit(&mut book, asset, CUSTODY_ACCOUNT, amount)?;
        Ok(())
    }

    fn transfer_out(&self, asset: &AssetId, to: &str, amount: u128) -> Result<(), TransferError> {
        let mut book = self.book.lock();
        Self::debit(&mut book, asset, CUSTODY_ACCOUNT, amount)?;
        Self::credit(&mut book, asset, to, amount)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
