//! # Share Ledger
//!
//! Per-vault proportional-ownership bookkeeping. Shares are minted against
//! deposits, burned on withdrawals, and priced by the ratio of the vault's
//! retained assets to the outstanding share supply.
//!
//! Both conversion directions round **down**. The ledger therefore
//! accumulates a small positive rounding residue over time — the effective
//! price drifts up, never down, which is a gift to existing holders and
//! never a loss. The `fund` path (assets in, no shares out) has the same
//! one-sided effect, deliberately.
//!
//! Conversions always run against the *pre-operation* totals; callers pass
//! the vault's current `total_assets` in, and the ledger knows its own
//! supply. The integer-truncated display price in
//! [`Vault::display_price`](super::vault::Vault::display_price) is never
//! used here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during share bookkeeping.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Attempted to burn more shares than the holder owns.
    #[error("insufficient shares: holder {holder} has {available}, requested {requested}")]
    InsufficientShares {
        /// The holder whose balance was short.
        holder: String,
        /// Shares currently held.
        available: u128,
        /// Shares the burn asked for.
        requested: u128,
    },

    /// Arithmetic overflow in a conversion or mint.
    ///
    /// Hitting this means someone is pushing amounts within a rounding
    /// error of `u128::MAX`. That's either a bug or an attack; either way
    /// the operation is refused rather than wrapped.
    #[error("share arithmetic overflow ({context})")]
    Overflow {
        /// What was being computed when the overflow happened.
        context: &'static str,
    },
}

// ---------------------------------------------------------------------------
// ShareLedger
// ---------------------------------------------------------------------------

/// The complete share book for a single vault: per-holder balances plus the
/// outstanding total.
///
/// Invariant: `total` equals the sum of all holder balances. Both sides of
/// every mint/burn move together, and there is no other write path.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShareLedger {
    /// Share balances by holder account.
    holdings: HashMap<String, u128>,

    /// Outstanding share supply.
    total: u128,
}

impl ShareLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            holdings: HashMap::new(),
            total: 0,
        }
    }

    /// Returns the outstanding share supply.
    pub fn total(&self) -> u128 {
        self.total
    }

    /// Returns a holder's balance (zero for unknown holders).
    pub fn shares_of(&self, holder: &str) -> u128 {
        self.holdings.get(holder).copied().unwrap_or(0)
    }

    /// Number of accounts currently holding a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.holdings.len()
    }

    /// Converts an asset amount into shares at the pre-operation ratio.
    ///
    /// With no shares outstanding (fresh vault, or everything burned) the
    /// price is defined as 1 and shares mint 1:1. A vault whose assets were
    /// fully paid out while shares remain also re-prices at par — the
    /// alternative is dividing by zero. Otherwise:
    /// `shares = floor(assets · total_shares / total_assets)`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Overflow`] if the intermediate product exceeds
    /// `u128::MAX`.
    pub fn convert_to_shares(&self, assets: u128, total_assets: u128) -> Result<u128, LedgerError> {
        if self.total == 0 || total_assets == 0 {
            return Ok(assets);
        }
        let product = assets.checked_mul(self.total).ok_or(LedgerError::Overflow {
            context: "assets * total_shares",
        })?;
        Ok(product / total_assets)
    }

    /// Converts a share amount into assets at the pre-operation ratio.
    ///
    /// Mirror of [`convert_to_shares`](Self::convert_to_shares): 1:1 with
    /// no shares outstanding, floor division otherwise.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Overflow`] if the intermediate product exceeds
    /// `u128::MAX`.
    pub fn convert_to_assets(&self, shares: u128, total_assets: u128) -> Result<u128, LedgerError> {
        if self.total == 0 {
            return Ok(shares);
        }
        let product = shares
            .checked_mul(total_assets)
            .ok_or(LedgerError::Overflow {
                context: "shares * total_assets",
            })?;
        Ok(product / self.total)
    }

    /// Verifies that `mint` would succeed, without mutating anything.
    ///
    /// The operations layer calls this during planning so that the later
    /// mint cannot fail mid-apply.
    pub fn ensure_can_mint(&self, holder: &str, shares: u128) -> Result<(), LedgerError> {
        self.total.checked_add(shares).ok_or(LedgerError::Overflow {
            context: "total_shares + mint",
        })?;
        self.shares_of(holder)
            .checked_add(shares)
            .ok_or(LedgerError::Overflow {
                context: "holder balance + mint",
            })?;
        Ok(())
    }

    /// Mints `shares` to `holder`. Returns the holder's new balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Overflow`] if either the supply or the holder balance
    /// would exceed `u128::MAX`.
    pub fn mint(&mut self, holder: &str, shares: u128) -> Result<u128, LedgerError> {
        // A zero mint (a fully-forwarded deposit) must not create a
        // zero-balance book entry.
        if shares == 0 {
            return Ok(self.shares_of(holder));
        }
        self.ensure_can_mint(holder, shares)?;
        self.total += shares;
        let balance = self.holdings.entry(holder.to_string()).or_insert(0);
        *balance += shares;
        Ok(*balance)
    }

    /// Burns `shares` from `holder`. Returns the holder's new balance.
    /// Fully burned holders are dropped from the book.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientShares`] if `holder` owns fewer than
    /// `shares`.
    pub fn burn(&mut self, holder: &str, shares: u128) -> Result<u128, LedgerError> {
        let held = self.shares_of(holder);
        if held < shares {
            return Err(LedgerError::InsufficientShares {
                holder: holder.to_string(),
                available: held,
                requested: shares,
            });
        }

        let remaining = held - shares;
        if remaining == 0 {
            self.holdings.remove(holder);
        } else {
            self.holdings.insert(holder.to_string(), remaining);
        }
        self.total -= shares;
        Ok(remaining)
    }

    /// Verifies that `burn` would succeed, without mutating anything.
    pub fn ensure_can_burn(&self, holder: &str, shares: u128) -> Result<(), LedgerError> {
        let held = self.shares_of(holder);
        if held < shares {
            return Err(LedgerError::InsufficientShares {
                holder: holder.to_string(),
                available: held,
                requested: shares,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "acct:alice";
    const BOB: &str = "acct:bob";

    #[test]
    fn empty_ledger_prices_one_to_one() {
        let ledger = ShareLedger::new();
        assert_eq!(ledger.convert_to_shares(1234, 0).unwrap(), 1234);
        assert_eq!(ledger.convert_to_assets(1234, 0).unwrap(), 1234);
    }

    #[test]
    fn proportional_conversion_floors() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, 300).unwrap();

        // 100 assets into a vault holding 1000 assets / 300 shares:
        // floor(100 * 300 / 1000) = 30.
        assert_eq!(ledger.convert_to_shares(100, 1000).unwrap(), 30);

        // 7 assets: floor(7 * 300 / 1000) = floor(2.1) = 2.
        assert_eq!(ledger.convert_to_shares(7, 1000).unwrap(), 2);
    }

    #[test]
    fn conversion_inverse_floors() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, 300).unwrap();

        // 30 shares of a 1000-asset / 300-share vault: floor(30*1000/300)=100.
        assert_eq!(ledger.convert_to_assets(30, 1000).unwrap(), 100);

        // 1 share: floor(1000/300) = 3.
        assert_eq!(ledger.convert_to_assets(1, 1000).unwrap(), 3);
    }

    #[test]
    fn drained_vault_reprices_at_par() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, 500).unwrap();

        // Shares outstanding but zero assets retained (fully paid out):
        // new deposits mint 1:1 instead of dividing by zero.
        assert_eq!(ledger.convert_to_shares(100, 0).unwrap(), 100);
    }

    #[test]
    fn conversion_overflow_rejected() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, u128::MAX / 2).unwrap();

        let result = ledger.convert_to_shares(u128::MAX / 2, 1);
        assert!(matches!(result, Err(LedgerError::Overflow { .. })));
    }

    #[test]
    fn mint_accumulates_supply_and_balance() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, 100).unwrap();
        let balance = ledger.mint(ALICE, 50).unwrap();

        assert_eq!(balance, 150);
        assert_eq!(ledger.total(), 150);
        assert_eq!(ledger.shares_of(ALICE), 150);
    }

    #[test]
    fn mint_overflow_rejected() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, u128::MAX).unwrap();
        let result = ledger.mint(BOB, 1);
        assert!(matches!(result, Err(LedgerError::Overflow { .. })));
        // Nothing half-applied.
        assert_eq!(ledger.shares_of(BOB), 0);
        assert_eq!(ledger.total(), u128::MAX);
    }

    #[test]
    fn burn_reduces_supply_and_balance() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, 100).unwrap();
        let remaining = ledger.burn(ALICE, 40).unwrap();

        assert_eq!(remaining, 60);
        assert_eq!(ledger.total(), 60);
    }

    #[test]
    fn burn_to_zero_drops_holder() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, 100).unwrap();
        ledger.burn(ALICE, 100).unwrap();

        assert_eq!(ledger.shares_of(ALICE), 0);
        assert_eq!(ledger.holder_count(), 0);
        assert_eq!(ledger.total(), 0);
    }

    #[test]
    fn burn_insufficient_rejected() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, 10).unwrap();

        let result = ledger.burn(ALICE, 20);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientShares {
                available: 10,
                requested: 20,
                ..
            })
        ));
        // Balance untouched on failure.
        assert_eq!(ledger.shares_of(ALICE), 10);
    }

    #[test]
    fn burn_unknown_holder_rejected() {
        let mut ledger = ShareLedger::new();
        let result = ledger.burn(BOB, 1);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientShares { available: 0, .. })
        ));
    }

    #[test]
    fn supply_equals_sum_of_holdings() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, 70).unwrap();
        ledger.mint(BOB, 30).unwrap();
        ledger.burn(ALICE, 20).unwrap();

        assert_eq!(ledger.total(), 80);
        assert_eq!(ledger.shares_of(ALICE) + ledger.shares_of(BOB), 80);
    }

    #[test]
    fn ledger_serialization_roundtrip() {
        let mut ledger = ShareLedger::new();
        ledger.mint(ALICE, 42).unwrap();

        let json = serde_json::to_string(&ledger).expect("serialize");
        let recovered: ShareLedger = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(recovered.total(), 42);
        assert_eq!(recovered.shares_of(ALICE), 42);
    }
}
