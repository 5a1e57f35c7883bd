//! # Vault Operations & Upstream Propagation
//!
//! The operations layer ties the registry, the share ledgers, and the two
//! ports into the public contract: `create`, `deposit`, `withdraw`, `fund`,
//! `payout`, `update_metadata`, and the read-only queries.
//!
//! ## Atomicity: plan, then apply
//!
//! A contribution at a vault can ripple through every ancestor up to the
//! root, and the whole ripple must commit or vanish as one unit. Rolling
//! back a half-applied chain is a bug factory, so the engine never gets
//! into that position: every operation is split into
//!
//! 1. a **fallible phase** that touches no state — resolve vaults, walk the
//!    parent chain computing each level's split, validate every addition
//!    against `u128::MAX`, pre-check mints and burns, and finally call the
//!    asset port (the one step the engine cannot pre-validate);
//! 2. an **infallible phase** that applies the already-validated increments
//!    and emits the committed facts.
//!
//! If anything in phase 1 fails — a dangling id, an overflow, a rejected
//! transfer — the operation aborts with every vault exactly as it was.
//!
//! ## The cascade
//!
//! At each level: `upstream = floor(incoming · percent / 10000)` and
//! `retained = incoming - upstream`. The identity `incoming = retained +
//! upstream` holds exactly, and the upstream amount becomes the parent's
//! `incoming`, so the retained increments along the path telescope to the
//! original contribution. The walk terminates because every hop moves one
//! level closer to a root, and a root never pushes.
//!
//! ## Reentrancy
//!
//! Operations take `&mut self`, so the borrow checker already serializes
//! legitimate callers. The remaining hole is an [`AssetTransferPort`]
//! implementation that owns a handle to this engine and calls back in
//! mid-transfer; the [`OpGuard`] latch turns that into a clean
//! [`EngineError::Reentrant`] instead of letting the callback observe a
//! half-finished operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::ledger::LedgerError;
use super::registry::{RegistryError, VaultRegistry};
use super::vault::{BalanceView, VaultConfigView, VaultId, VaultParams};
use crate::config::{EngineConfig, BPS_DENOMINATOR};
use crate::port::asset::{AssetTransferPort, TransferError};
use crate::port::events::{EngineEvent, EventSink};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by engine operations.
///
/// Component errors pass through unchanged — a caller that wants to know
/// *which* precondition failed can match all the way down.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A registry precondition failed (unknown vault, bad percent, depth).
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A share-ledger precondition failed (insufficient shares, overflow).
    #[error("share ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The asset port refused a debit or credit. The port's reason is
    /// surfaced unchanged.
    #[error("asset transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// Zero-amount deposits, withdrawals, fundings, and payouts are
    /// rejected rather than silently no-opped.
    #[error("zero-amount operations are not permitted")]
    InvalidAmount,

    /// The caller is not the vault's controller.
    #[error("unauthorized: {caller} does not control vault {vault}")]
    Unauthorized {
        /// The vault the caller tried to act on.
        vault: VaultId,
        /// The rejected account.
        caller: String,
    },

    /// A withdrawal or payout asked for more than the vault retains.
    /// Assets already pushed upstream are not recallable through this path.
    #[error("insufficient assets: vault {vault} retains {available}, requested {requested}")]
    InsufficientAssets {
        /// The vault drawn on.
        vault: VaultId,
        /// Locally retained balance.
        available: u128,
        /// The amount requested.
        requested: u128,
    },

    /// Amount arithmetic overflowed during propagation planning.
    #[error("amount arithmetic overflow ({context})")]
    Overflow {
        /// What was being computed.
        context: &'static str,
    },

    /// A port implementation called back into the engine mid-operation.
    #[error("reentrant engine call detected")]
    Reentrant,
}

// ---------------------------------------------------------------------------
// Reentrancy guard
// ---------------------------------------------------------------------------

/// Single-flight latch over all engine operations.
///
/// The permit releases the latch on drop, so early returns and `?` exits
/// can't leave the engine wedged shut.
#[derive(Debug, Default)]
struct OpGuard {
    busy: Arc<AtomicBool>,
}

impl OpGuard {
    fn enter(&self) -> Result<OpPermit, EngineError> {
        if self.busy.swap(true, Ordering::Acquire) {
            return Err(EngineError::Reentrant);
        }
        Ok(OpPermit {
            busy: Arc::clone(&self.busy),
        })
    }
}

struct OpPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for OpPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Propagation plan
// ---------------------------------------------------------------------------

/// One level of a resolved cascade.
#[derive(Clone, Copy, Debug)]
struct PropagationStep {
    /// The vault at this level.
    vault: VaultId,
    /// Amount arriving at this level (the original contribution at the
    /// origin, the parent's upstream share thereafter).
    incoming: u128,
    /// Portion this level keeps: `incoming - upstream`.
    retained: u128,
    /// Portion pushed to the parent: `floor(incoming · percent / 10000)`.
    upstream: u128,
}

/// A fully validated cascade, origin first, root last. Applying it cannot
/// fail: every addition was checked during planning.
#[derive(Clone, Debug)]
struct PropagationPlan {
    steps: Vec<PropagationStep>,
}

impl PropagationPlan {
    /// The amount the originating vault keeps — the quantity that gets
    /// priced into shares on the deposit path.
    fn retained_at_origin(&self) -> u128 {
        self.steps.first().map(|s| s.retained).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// VaultEngine
// ---------------------------------------------------------------------------

/// The vault tree engine: registry + ledgers behind the operations
/// contract, wired to an asset port and an event sink.
///
/// Operations take `&mut self`; one top-level invocation, including its
/// entire upward cascade, runs to completion before the next is admitted.
/// Embedders that share an engine across threads put it behind a lock and
/// inherit exactly the serialization the accounting expects.
pub struct VaultEngine<P, S> {
    registry: VaultRegistry,
    config: EngineConfig,
    port: P,
    sink: S,
    guard: OpGuard,
}

impl<P: AssetTransferPort, S: EventSink> VaultEngine<P, S> {
    /// Creates an engine with no vaults.
    pub fn new(config: EngineConfig, port: P, sink: S) -> Self {
        Self {
            registry: VaultRegistry::new(config.max_tree_depth),
            config,
            port,
            sink,
            guard: OpGuard::default(),
        }
    }

    /// Read access to the registry (snapshots, queries, persistence).
    pub fn registry(&self) -> &VaultRegistry {
        &self.registry
    }

    /// The engine's construction-time configuration.
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Creates a vault. `controller` becomes the payout/update principal.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPercent`], [`RegistryError::ParentNotFound`],
    /// or [`RegistryError::DepthExceeded`], passed through.
    pub fn create(&mut self, controller: &str, params: VaultParams) -> Result<VaultId, EngineError> {
        let _permit = self.guard.enter()?;

        let id = self.registry.create(controller, params)?;
        let view = self.registry.config(id)?;

        tracing::info!(
            %id,
            asset = %view.asset,
            parent = ?view.parent,
            percent = view.percent,
            level = view.tree_level,
            "vault created"
        );
        self.sink.emit(EngineEvent::Created {
            id,
            asset: view.asset,
            parent: view.parent,
            percent: view.percent,
            controller: view.controller,
            metadata: view.metadata,
        });
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Deposit
    // -----------------------------------------------------------------------

    /// Deposits `amount` of the vault's asset, pulled from `sender`.
    ///
    /// The contribution cascades upstream; the portion the vault retains is
    /// priced into shares at the pre-operation ratio and minted to
    /// `receiver`. Returns the shares minted.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidAmount`] on zero; registry/ledger/overflow
    /// failures from planning; [`EngineError::TransferFailed`] if the pull
    /// is refused. Any failure leaves every vault untouched.
    pub fn deposit(
        &mut self,
        vault: VaultId,
        sender: &str,
        amount: u128,
        receiver: &str,
    ) -> Result<u128, EngineError> {
        let _permit = self.guard.enter()?;
        if amount == 0 {
            return Err(EngineError::InvalidAmount);
        }

        let plan = self.plan_propagation(vault, amount, true)?;
        let retained = plan.retained_at_origin();

        let origin = self.registry.get(vault)?;
        let asset = origin.asset().clone();
        let shares = origin
            .shares()
            .convert_to_shares(retained, origin.total_assets())?;
        origin.shares().ensure_can_mint(receiver, shares)?;

        // Last fallible step. Once the pull succeeds, everything below is
        // pre-validated arithmetic.
        self.port.transfer_in(&asset, sender, amount)?;

        self.apply_propagation(&plan);
        self.registry
            .get_mut(vault)
            .expect("origin vault resolved during planning")
            .shares_mut()
            .mint(receiver, shares)
            .expect("mint bounds validated during planning");

        tracing::debug!(%vault, sender, amount, retained, shares, "deposit committed");
        self.sink.emit(EngineEvent::Deposited {
            vault,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            assets: amount,
            shares,
        });
        self.emit_cascade(&plan);
        Ok(shares)
    }

    // -----------------------------------------------------------------------
    // Fund
    // -----------------------------------------------------------------------

    /// Contributes `amount` without minting shares — the donation/grant
    /// path, and the only operation that can raise the share price.
    ///
    /// With `push_upstream` false the vault keeps everything regardless of
    /// its percent; with it true the contribution cascades exactly like a
    /// deposit. On a root vault the flag makes no difference.
    ///
    /// # Errors
    ///
    /// Same failure surface as [`deposit`](Self::deposit), minus the share
    /// ledger.
    pub fn fund(
        &mut self,
        vault: VaultId,
        sender: &str,
        amount: u128,
        push_upstream: bool,
    ) -> Result<(), EngineError> {
        let _permit = self.guard.enter()?;
        if amount == 0 {
            return Err(EngineError::InvalidAmount);
        }

        let plan = self.plan_propagation(vault, amount, push_upstream)?;
        let asset = self.registry.get(vault)?.asset().clone();

        self.port.transfer_in(&asset, sender, amount)?;

        self.apply_propagation(&plan);

        tracing::debug!(%vault, sender, amount, push_upstream, "funding committed");
        self.sink.emit(EngineEvent::Funded {
            vault,
            sender: sender.to_string(),
            assets: amount,
        });
        self.emit_cascade(&plan);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Withdraw
    // -----------------------------------------------------------------------

    /// Withdraws `amount` of retained assets, burning the corresponding
    /// shares from `sender` and paying `receiver`. Returns the shares
    /// burned.
    ///
    /// Only locally retained assets are reachable — value already pushed
    /// upstream belongs to the ancestors now.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidAmount`] on zero;
    /// [`EngineError::InsufficientAssets`] past the retained balance;
    /// [`LedgerError::InsufficientShares`] if `sender`'s shares don't
    /// cover the amount; [`EngineError::TransferFailed`] if the payout leg
    /// is refused.
    pub fn withdraw(
        &mut self,
        vault: VaultId,
        sender: &str,
        amount: u128,
        receiver: &str,
    ) -> Result<u128, EngineError> {
        let _permit = self.guard.enter()?;
        if amount == 0 {
            return Err(EngineError::InvalidAmount);
        }

        let v = self.registry.get(vault)?;
        if amount > v.total_assets() {
            return Err(EngineError::InsufficientAssets {
                vault,
                available: v.total_assets(),
                requested: amount,
            });
        }
        let shares = v.shares().convert_to_shares(amount, v.total_assets())?;
        v.shares().ensure_can_burn(sender, shares)?;
        let asset = v.asset().clone();

        self.port.transfer_out(&asset, receiver, amount)?;

        let v = self
            .registry
            .get_mut(vault)
            .expect("vault resolved above");
        v.shares_mut()
            .burn(sender, shares)
            .expect("burn bounds validated above");
        v.debit_assets(amount);

        tracing::debug!(%vault, sender, amount, shares, "withdrawal committed");
        self.sink.emit(EngineEvent::Withdrawn {
            vault,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            assets: amount,
            shares,
        });
        Ok(shares)
    }

    // -----------------------------------------------------------------------
    // Payout
    // -----------------------------------------------------------------------

    /// Controller-only discretionary disbursement: pays `amount` of
    /// retained assets to `recipient` without touching shares.
    ///
    /// # Errors
    ///
    /// [`EngineError::Unauthorized`] unless `caller` is the controller;
    /// otherwise the same surface as the payout leg of
    /// [`withdraw`](Self::withdraw).
    pub fn payout(
        &mut self,
        vault: VaultId,
        caller: &str,
        amount: u128,
        recipient: &str,
    ) -> Result<(), EngineError> {
        let _permit = self.guard.enter()?;
        if amount == 0 {
            return Err(EngineError::InvalidAmount);
        }

        let v = self.registry.get(vault)?;
        if caller != v.controller() {
            return Err(EngineError::Unauthorized {
                vault,
                caller: caller.to_string(),
            });
        }
        if amount > v.total_assets() {
            return Err(EngineError::InsufficientAssets {
                vault,
                available: v.total_assets(),
                requested: amount,
            });
        }
        let asset = v.asset().clone();

        self.port.transfer_out(&asset, recipient, amount)?;

        self.registry
            .get_mut(vault)
            .expect("vault resolved above")
            .debit_assets(amount);

        tracing::debug!(%vault, recipient, amount, "payout committed");
        self.sink.emit(EngineEvent::PaidOut {
            vault,
            recipient: recipient.to_string(),
            assets: amount,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Metadata update
    // -----------------------------------------------------------------------

    /// Controller-only replacement of the opaque metadata reference.
    ///
    /// Never touches balances, shares, percent, or tree shape — those are
    /// write-once and there is deliberately no operation that changes them.
    pub fn update_metadata(
        &mut self,
        vault: VaultId,
        caller: &str,
        metadata: String,
    ) -> Result<(), EngineError> {
        let _permit = self.guard.enter()?;

        let v = self.registry.get(vault)?;
        if caller != v.controller() {
            return Err(EngineError::Unauthorized {
                vault,
                caller: caller.to_string(),
            });
        }

        self.registry
            .get_mut(vault)
            .expect("vault resolved above")
            .set_metadata(metadata.clone());

        self.sink
            .emit(EngineEvent::MetadataUpdated { vault, metadata });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Assets, shares, and display price for a vault.
    pub fn balance(&self, vault: VaultId) -> Result<BalanceView, EngineError> {
        Ok(self.registry.get(vault)?.balance_view())
    }

    /// Direct-membership query (see [`VaultRegistry::is_child_vault`]).
    pub fn is_child_vault(&self, parent: VaultId, candidate: VaultId) -> Result<bool, EngineError> {
        Ok(self.registry.is_child_vault(parent, candidate)?)
    }

    /// Cached distance to the root.
    pub fn tree_level(&self, vault: VaultId) -> Result<u32, EngineError> {
        Ok(self.registry.tree_level(vault)?)
    }

    /// Read-only configuration snapshot.
    pub fn vault_config(&self, vault: VaultId) -> Result<VaultConfigView, EngineError> {
        Ok(self.registry.config(vault)?)
    }

    /// A holder's share balance in a vault.
    pub fn shares_of(&self, vault: VaultId, holder: &str) -> Result<u128, EngineError> {
        Ok(self.registry.get(vault)?.shares().shares_of(holder))
    }

    // -----------------------------------------------------------------------
    // Propagation internals
    // -----------------------------------------------------------------------

    /// Phase 1: resolve the full cascade without touching state.
    fn plan_propagation(
        &self,
        vault: VaultId,
        amount: u128,
        push_upstream: bool,
    ) -> Result<PropagationPlan, EngineError> {
        let mut steps = Vec::new();
        self.plan_level(vault, amount, push_upstream, 0, &mut steps)?;
        Ok(PropagationPlan { steps })
    }

    /// Resolves one level and recurses into the parent while there is
    /// anything to push. The recursion is bounded twice: structurally by
    /// the strictly decreasing distance to the root, and defensively by
    /// the configured depth ceiling (tree shape is attacker-influenced).
    fn plan_level(
        &self,
        id: VaultId,
        incoming: u128,
        push_upstream: bool,
        hops: u32,
        steps: &mut Vec<PropagationStep>,
    ) -> Result<(), EngineError> {
        if hops >= self.config.max_tree_depth {
            return Err(EngineError::Registry(RegistryError::DepthExceeded {
                level: hops,
                max: self.config.max_tree_depth,
            }));
        }

        let vault = self.registry.get(id)?;
        let (retained, upstream) = match (push_upstream, vault.parent()) {
            // Not pushing, or nowhere to push: keep everything.
            (false, _) | (true, None) => (incoming, 0),
            (true, Some(_)) => {
                let upstream = incoming
                    .checked_mul(vault.percent() as u128)
                    .ok_or(EngineError::Overflow {
                        context: "incoming * percent",
                    })?
                    / BPS_DENOMINATOR;
                // Exact by construction: upstream <= incoming.
                (incoming - upstream, upstream)
            }
        };

        // Validate the apply-side additions now, so apply cannot fail.
        vault
            .total_assets()
            .checked_add(retained)
            .ok_or(EngineError::Overflow {
                context: "total_assets + retained",
            })?;
        vault
            .total_upstream_sent()
            .checked_add(upstream)
            .ok_or(EngineError::Overflow {
                context: "total_upstream_sent + upstream",
            })?;

        let parent = vault.parent();
        steps.push(PropagationStep {
            vault: id,
            incoming,
            retained,
            upstream,
        });

        if upstream > 0 {
            if let Some(parent_id) = parent {
                self.plan_level(parent_id, upstream, true, hops + 1, steps)?;
            }
        }
        Ok(())
    }

    /// Phase 2: commit a validated plan. Infallible.
    fn apply_propagation(&mut self, plan: &PropagationPlan) {
        for step in &plan.steps {
            let vault = self
                .registry
                .get_mut(step.vault)
                .expect("planned vault exists; vaults are never removed");
            vault.credit_assets(step.retained);
            if step.upstream > 0 {
                vault.note_upstream(step.upstream);
            }
        }
    }

    /// Emits the per-hop `Funded` facts for every ancestor a committed
    /// cascade reached, with the pushing vault as the sender.
    fn emit_cascade(&self, plan: &PropagationPlan) {
        for pair in plan.steps.windows(2) {
            let (child, parent) = (&pair[0], &pair[1]);
            self.sink.emit(EngineEvent::Funded {
                vault: parent.vault,
                sender: child.vault.to_string(),
                assets: parent.incoming,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
