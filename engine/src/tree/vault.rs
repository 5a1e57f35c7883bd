//! # The Vault Entity
//!
//! A [`Vault`] is one accounting node in the tree: a retained balance of a
//! single asset, a share ledger against that balance, and a write-once link
//! to an optional parent. The identity fields (`id`, `asset`, `parent`,
//! `percent`, `tree_level`, `controller`) are set exactly once, by the
//! registry, and exposed through getters only — there is deliberately no
//! way to re-parent or re-rate a vault after creation.
//!
//! Mutation happens through a handful of `pub(crate)` methods used by the
//! operations layer. They are infallible by design: every arithmetic bound
//! is validated *before* an operation starts applying its effects, so the
//! apply path cannot half-fail (see [`engine`](super::engine) for the
//! plan-then-apply split).

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::ShareLedger;
use crate::port::asset::AssetId;

// ---------------------------------------------------------------------------
// VaultId
// ---------------------------------------------------------------------------

/// Unique identifier for a vault, assigned at creation and never reused.
///
/// Wraps a v4 UUID. The newtype keeps vault ids from being confused with
/// the other stringly identifiers floating around the boundary (accounts,
/// assets, metadata references).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaultId(Uuid);

impl VaultId {
    /// Allocates a fresh random id.
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultId({})", self.0)
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VaultId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// VaultParams
// ---------------------------------------------------------------------------

/// Creation parameters for a new vault.
///
/// This is the caller-supplied half of a vault's configuration; the registry
/// adds the derived half (id, tree level, controller, timestamps).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultParams {
    /// The single fungible asset this vault accounts for.
    pub asset: AssetId,

    /// Optional parent vault. `None` creates a root.
    pub parent: Option<VaultId>,

    /// Basis-point fraction of every incoming contribution forwarded to
    /// `parent`. Must be in `[0, 10000]`; validated by the registry.
    pub percent: u32,

    /// Opaque metadata reference (e.g. a content id resolved off-engine).
    /// Carries no accounting semantics.
    pub metadata: String,
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// One node of the vault tree.
///
/// # Thread Safety
///
/// `Vault` is `Send` but mutation is only reachable through the engine's
/// `&mut self` operations, which serialize all access. Nothing here locks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vault {
    /// Unique id, assigned at creation.
    id: VaultId,

    /// The asset this vault accounts for. Immutable.
    asset: AssetId,

    /// Parent vault, fixed permanently at creation. `None` means root.
    /// Immutability of this field is what makes the parent graph acyclic.
    parent: Option<VaultId>,

    /// Upstream split in basis points, `[0, 10000]`. Immutable.
    percent: u32,

    /// The account that created this vault. Sole principal authorized for
    /// `payout` and metadata updates.
    controller: String,

    /// Opaque metadata reference. Mutable by the controller; the engine
    /// never interprets it.
    metadata: String,

    /// Locally retained balance, in smallest units. Excludes everything
    /// already forwarded upstream.
    total_assets: u128,

    /// Cumulative amount ever forwarded to `parent`. Monotonically
    /// non-decreasing; audit counter only, never read by the accounting.
    total_upstream_sent: u128,

    /// Distance to the root: 0 for a root vault, `parent + 1` otherwise.
    /// Derived at creation and cached.
    tree_level: u32,

    /// Ids of vaults whose `parent` is this vault. Direct children only —
    /// membership is never transitive. Used for queries, never walked by
    /// propagation.
    children: HashSet<VaultId>,

    /// Per-holder share bookkeeping.
    shares: ShareLedger,

    /// When this vault was created.
    created_at: DateTime<Utc>,

    /// Last metadata update. Equals `created_at` until the first update.
    updated_at: DateTime<Utc>,
}

impl Vault {
    /// Builds a vault with zero balances. Only the registry calls this —
    /// which is exactly the point: `parent` and `percent` have no other
    /// write path.
    pub(crate) fn new(
        id: VaultId,
        controller: &str,
        params: VaultParams,
        tree_level: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            asset: params.asset,
            parent: params.parent,
            percent: params.percent,
            controller: controller.to_string(),
            metadata: params.metadata,
            total_assets: 0,
            total_upstream_sent: 0,
            tree_level,
            children: HashSet::new(),
            shares: ShareLedger::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns this vault's id.
    pub fn id(&self) -> VaultId {
        self.id
    }

    /// Returns the asset this vault accounts for.
    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// Returns the parent vault id, if any.
    pub fn parent(&self) -> Option<VaultId> {
        self.parent
    }

    /// Returns the upstream split in basis points.
    pub fn percent(&self) -> u32 {
        self.percent
    }

    /// Returns the controlling account.
    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// Returns the opaque metadata reference.
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Returns the locally retained balance.
    pub fn total_assets(&self) -> u128 {
        self.total_assets
    }

    /// Returns the total minted shares.
    pub fn total_shares(&self) -> u128 {
        self.shares.total()
    }

    /// Returns the cumulative amount forwarded upstream.
    pub fn total_upstream_sent(&self) -> u128 {
        self.total_upstream_sent
    }

    /// Returns the cached distance to the root.
    pub fn tree_level(&self) -> u32 {
        self.tree_level
    }

    /// Returns when this vault was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last metadata-update time.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Direct-membership test: true iff `candidate` was created with this
    /// vault as its parent. Never true for grandchildren.
    pub fn is_child(&self, candidate: VaultId) -> bool {
        self.children.contains(&candidate)
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Read access to the share ledger.
    pub fn shares(&self) -> &ShareLedger {
        &self.shares
    }

    /// Snapshot of assets, shares, and the display price.
    pub fn balance_view(&self) -> BalanceView {
        BalanceView {
            assets: self.total_assets,
            shares: self.shares.total(),
            price: self.display_price(),
        }
    }

    /// Integer-truncated price for display: assets per share, floored, and
    /// defined as 1 for an empty ledger. Conversions never use this — they
    /// run on the full-precision ratio in the ledger.
    pub fn display_price(&self) -> u128 {
        let shares = self.shares.total();
        if shares == 0 {
            1
        } else {
            self.total_assets / shares
        }
    }

    /// Read-only configuration snapshot for the query surface.
    pub fn config_view(&self) -> VaultConfigView {
        VaultConfigView {
            id: self.id,
            asset: self.asset.clone(),
            parent: self.parent,
            percent: self.percent,
            controller: self.controller.clone(),
            metadata: self.metadata.clone(),
            tree_level: self.tree_level,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    // -----------------------------------------------------------------------
    // Crate-internal mutation (operations layer only)
    // -----------------------------------------------------------------------

    /// Mutable access to the share ledger.
    pub(crate) fn shares_mut(&mut self) -> &mut ShareLedger {
        &mut self.shares
    }

    /// Adds `amount` to the retained balance. The caller has already
    /// validated the sum against `u128::MAX` during planning.
    pub(crate) fn credit_assets(&mut self, amount: u128) {
        self.total_assets += amount;
    }

    /// Removes `amount` from the retained balance. The caller has already
    /// checked `amount <= total_assets`.
    pub(crate) fn debit_assets(&mut self, amount: u128) {
        self.total_assets -= amount;
    }

    /// Records `amount` as forwarded upstream. Validated during planning.
    pub(crate) fn note_upstream(&mut self, amount: u128) {
        self.total_upstream_sent += amount;
    }

    /// Registers a newly created direct child.
    pub(crate) fn register_child(&mut self, child: VaultId) {
        self.children.insert(child);
    }

    /// Replaces the metadata reference and touches `updated_at`.
    pub(crate) fn set_metadata(&mut self, metadata: String) {
        self.metadata = metadata;
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Read-only balance snapshot returned by the `balance` query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    /// Locally retained assets.
    pub assets: u128,
    /// Total minted shares.
    pub shares: u128,
    /// Integer-truncated display price (1 for an empty ledger).
    pub price: u128,
}

/// Read-only configuration snapshot returned by the `config` query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfigView {
    /// Vault id.
    pub id: VaultId,
    /// The accounted asset.
    pub asset: AssetId,
    /// Parent vault, if any.
    pub parent: Option<VaultId>,
    /// Upstream split in basis points.
    pub percent: u32,
    /// Controlling account.
    pub controller: String,
    /// Opaque metadata reference.
    pub metadata: String,
    /// Cached distance to the root.
    pub tree_level: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last metadata update.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
