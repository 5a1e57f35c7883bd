//! # Vault Tree — Registry, Shares & Upstream Propagation
//!
//! The tree is where money lives in Cascade. Every retained balance, every
//! minted share, every upstream push passes through this module. If the
//! ports are the engine's hands, the tree is its memory — it keeps the
//! books straight across an arbitrary-depth hierarchy.
//!
//! ## Architecture
//!
//! ```text
//! vault.rs    — The Vault entity: write-once identity, balances, children
//! registry.rs — Creation, immutable parent linkage, depth & membership
//! ledger.rs   — Per-vault share bookkeeping: mint/burn, floor conversions
//! engine.rs   — The operations: deposit/withdraw/fund/payout + propagation
//! ```
//!
//! ## Design Principles
//!
//! 1. **Parent linkage is write-once.** A vault's parent is assigned in the
//!    registry's `create` and there is no setter, anywhere. Acyclicity is a
//!    construction guarantee, not a runtime check.
//!
//! 2. **Propagation only walks upward.** The `children` sets exist for
//!    membership queries; no operation ever fans out downward.
//!
//! 3. **Split math is exact.** `upstream = floor(amount · percent / 10000)`
//!    and `retained = amount - upstream` at every level, so each level's
//!    input equals its retained plus what it pushed — the telescoping sum
//!    conserves the original contribution to the last unit.
//!
//! 4. **Serializable state.** Every struct here derives `Serialize` and
//!    `Deserialize` so an embedder can snapshot the whole forest.

pub mod engine;
pub mod ledger;
pub mod registry;
pub mod vault;

pub use engine::{EngineError, VaultEngine};
pub use ledger::{LedgerError, ShareLedger};
pub use registry::{RegistryError, VaultRegistry};
pub use vault::{BalanceView, Vault, VaultConfigView, VaultId, VaultParams};
