//! # Event Sink
//!
//! Every committed operation emits one or more facts for the out-of-engine
//! indexer. The engine owns *what* happened; the indexer owns how the facts
//! are stored and queried, and never feeds anything back. Events are emitted
//! strictly after an operation has fully committed — an aborted operation
//! emits nothing.
//!
//! Three sinks ship with the crate: [`NullEventSink`] (discard),
//! [`MemoryEventSink`] (buffer, for tests and in-process hand-off), and
//! [`TracingEventSink`] (structured log emission for nodes that point a log
//! shipper at the facts).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::asset::AssetId;
use crate::tree::vault::VaultId;

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// An accounting fact emitted by the engine.
///
/// The serde encoding is tagged so a consumer can dispatch on `type`
/// without knowing the full vocabulary up front.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A vault was created.
    Created {
        /// The new vault's id.
        id: VaultId,
        /// The accounted asset.
        asset: AssetId,
        /// Parent vault, if any.
        parent: Option<VaultId>,
        /// Upstream split in basis points.
        percent: u32,
        /// The creating (and controlling) account.
        controller: String,
        /// Opaque metadata reference.
        metadata: String,
    },

    /// A deposit committed: assets pulled, the retained portion priced into
    /// shares and minted to `receiver`.
    Deposited {
        /// The vault the deposit entered at.
        vault: VaultId,
        /// The account the assets were pulled from.
        sender: String,
        /// The account the shares were minted to.
        receiver: String,
        /// The full contributed amount.
        assets: u128,
        /// Shares minted for the retained portion.
        shares: u128,
    },

    /// A withdrawal committed: shares burned, assets paid out.
    Withdrawn {
        /// The vault withdrawn from.
        vault: VaultId,
        /// The share holder whose shares were burned.
        sender: String,
        /// The account the assets were paid to.
        receiver: String,
        /// Assets paid out.
        assets: u128,
        /// Shares burned.
        shares: u128,
    },

    /// A funding committed: assets in, no shares out. Emitted once for the
    /// originating contribution and once per ancestor that received an
    /// upstream push (with the pushing vault as `sender`).
    Funded {
        /// The vault that received the assets.
        vault: VaultId,
        /// The contributing account, or the pushing child vault's id for
        /// propagated hops.
        sender: String,
        /// The amount that arrived at this vault (before its own split).
        assets: u128,
    },

    /// A discretionary payout committed: assets out, shares untouched.
    PaidOut {
        /// The vault paid out of.
        vault: VaultId,
        /// The account the assets were paid to.
        recipient: String,
        /// Assets paid out.
        assets: u128,
    },

    /// The controller replaced a vault's metadata reference.
    MetadataUpdated {
        /// The vault updated.
        vault: VaultId,
        /// The new metadata reference.
        metadata: String,
    },
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Capability to receive committed accounting facts.
///
/// Sinks are fire-and-forget: emission cannot fail and cannot abort the
/// already-committed operation that produced the fact.
pub trait EventSink {
    /// Receives one committed fact.
    fn emit(&self, event: EngineEvent);
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: EngineEvent) {
        (**self).emit(event)
    }
}

/// Discards everything. For embedders that don't index.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Buffers events in order. The test workhorse, and a reasonable hand-off
/// buffer for an in-process indexer.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemoryEventSink {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything emitted so far, in order.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    /// Drains the buffer, returning everything emitted since the last take.
    pub fn take(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if nothing has been emitted since the last take.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}

/// Emits each fact as a structured `tracing` event under the
/// `cascade::events` target. Pair with a JSON subscriber and a log shipper
/// and you have a poor man's indexer feed.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: EngineEvent) {
        match &event {
            EngineEvent::Created { id, asset, percent, .. } => {
                tracing::info!(target: "cascade::events", %id, %asset, percent, "vault created");
            }
            EngineEvent::Deposited { vault, sender, assets, shares, .. } => {
                tracing::info!(target: "cascade::events", %vault, %sender, assets, shares, "deposit");
            }
            EngineEvent::Withdrawn { vault, sender, assets, shares, .. } => {
                tracing::info!(target: "cascade::events", %vault, %sender, assets, shares, "withdraw");
            }
            EngineEvent::Funded { vault, sender, assets } => {
                tracing::info!(target: "cascade::events", %vault, %sender, assets, "funded");
            }
            EngineEvent::PaidOut { vault, recipient, assets } => {
                tracing::info!(target: "cascade::events", %vault, %recipient, assets, "payout");
            }
            EngineEvent::MetadataUpdated { vault, .. } => {
                tracing::info!(target: "cascade::events", %vault, "metadata updated");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
