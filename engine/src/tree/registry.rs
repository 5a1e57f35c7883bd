//! # Vault Registry
//!
//! Creation and tree bookkeeping. The registry is the only place a
//! [`Vault`] is ever constructed, which is how the two structural
//! guarantees are enforced at the type level:
//!
//! - a vault's parent is resolved and fixed *before* the vault exists, so
//!   the parent graph cannot contain a cycle (you cannot point at a vault
//!   that hasn't been created yet, and you can never re-point);
//! - `tree_level` is computed once from the parent's cached level, so a
//!   level is always exactly one more than its parent's.
//!
//! Vaults are never destroyed. The registry only grows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::vault::{Vault, VaultConfigView, VaultId, VaultParams};
use crate::config::MAX_PERCENT_BPS;
use crate::port::asset::AssetId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The requested upstream percentage is outside `[0, 10000]`.
    #[error("invalid percent: {percent} bps exceeds the {max} bps ceiling")]
    InvalidPercent {
        /// The rejected value.
        percent: u32,
        /// The ceiling it violated.
        max: u32,
    },

    /// The creation parameters referenced a parent that does not exist.
    #[error("parent vault not found: {0}")]
    ParentNotFound(VaultId),

    /// An operation referenced a vault that does not exist.
    #[error("vault not found: {0}")]
    VaultNotFound(VaultId),

    /// Creating this vault would exceed the configured depth ceiling.
    #[error("tree depth exceeded: level {level} is beyond the ceiling of {max}")]
    DepthExceeded {
        /// The level the new vault would have occupied.
        level: u32,
        /// The configured ceiling.
        max: u32,
    },

    /// The child's asset differs from its parent's. Upstream pushes move
    /// value between the two books, so they must account the same asset.
    #[error("asset mismatch: child accounts {child}, parent accounts {parent}")]
    AssetMismatch {
        /// The asset the child asked for.
        child: AssetId,
        /// The asset the parent accounts.
        parent: AssetId,
    },
}

// ---------------------------------------------------------------------------
// VaultRegistry
// ---------------------------------------------------------------------------

/// The set of all vaults, indexed by id, plus the creation rules.
///
/// Mutation flows exclusively through the engine's serialized operations;
/// the registry itself is a plain map with invariant checks, not a
/// synchronization point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultRegistry {
    /// All vaults ever created.
    vaults: HashMap<VaultId, Vault>,

    /// Depth ceiling applied at creation (see
    /// [`EngineConfig`](crate::config::EngineConfig)).
    max_tree_depth: u32,
}

impl VaultRegistry {
    /// Creates an empty registry with the given depth ceiling.
    pub fn new(max_tree_depth: u32) -> Self {
        Self {
            vaults: HashMap::new(),
            max_tree_depth,
        }
    }

    /// Creates a new vault and registers it with its parent.
    ///
    /// `controller` is the account performing the creation; it becomes the
    /// vault's sole payout/update principal.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidPercent`] if `params.percent > 10000`.
    /// - [`RegistryError::ParentNotFound`] if the parent id is dangling.
    /// - [`RegistryError::DepthExceeded`] if the child would sit at or
    ///   beyond the depth ceiling.
    pub fn create(
        &mut self,
        controller: &str,
        params: VaultParams,
    ) -> Result<VaultId, RegistryError> {
        if params.percent > MAX_PERCENT_BPS {
            return Err(RegistryError::InvalidPercent {
                percent: params.percent,
                max: MAX_PERCENT_BPS,
            });
        }

        let tree_level = match params.parent {
            None => 0,
            Some(parent_id) => {
                let parent = self
                    .vaults
                    .get(&parent_id)
                    .ok_or(RegistryError::ParentNotFound(parent_id))?;
                if parent.asset() != &params.asset {
                    return Err(RegistryError::AssetMismatch {
                        child: params.asset,
                        parent: parent.asset().clone(),
                    });
                }
                let level = parent.tree_level() + 1;
                if level >= self.max_tree_depth {
                    return Err(RegistryError::DepthExceeded {
                        level,
                        max: self.max_tree_depth,
                    });
                }
                level
            }
        };

        let id = VaultId::generate();
        let parent = params.parent;
        self.vaults
            .insert(id, Vault::new(id, controller, params, tree_level));

        if let Some(parent_id) = parent {
            // The lookup cannot fail: the parent was resolved above and
            // vaults are never removed.
            if let Some(parent_vault) = self.vaults.get_mut(&parent_id) {
                parent_vault.register_child(id);
            }
        }

        Ok(id)
    }

    /// Looks up a vault by id.
    pub fn get(&self, id: VaultId) -> Result<&Vault, RegistryError> {
        self.vaults.get(&id).ok_or(RegistryError::VaultNotFound(id))
    }

    /// Mutable lookup, for the operations layer.
    pub(crate) fn get_mut(&mut self, id: VaultId) -> Result<&mut Vault, RegistryError> {
        self.vaults
            .get_mut(&id)
            .ok_or(RegistryError::VaultNotFound(id))
    }

    /// Returns `true` if a vault with this id exists.
    pub fn contains(&self, id: VaultId) -> bool {
        self.vaults.contains_key(&id)
    }

    /// Number of vaults ever created.
    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    /// Returns `true` if no vault has been created yet.
    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }

    /// Direct-membership query: is `candidate` a direct child of `parent`?
    /// Grandchildren, siblings, and strangers all answer `false`.
    pub fn is_child_vault(
        &self,
        parent: VaultId,
        candidate: VaultId,
    ) -> Result<bool, RegistryError> {
        Ok(self.get(parent)?.is_child(candidate))
    }

    /// Returns the cached tree level for a vault.
    pub fn tree_level(&self, id: VaultId) -> Result<u32, RegistryError> {
        Ok(self.get(id)?.tree_level())
    }

    /// Returns the read-only configuration snapshot for a vault.
    pub fn config(&self, id: VaultId) -> Result<VaultConfigView, RegistryError> {
        Ok(self.get(id)?.config_view())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
