// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Cascade — Hierarchical Vault Accounting Engine
//!
//! Cascade is a forest of accounting nodes ("vaults"). Each vault holds the
//! balance of exactly one fungible asset and issues proportional ownership
//! units ("shares") against it. The twist: every incoming contribution is
//! split between a locally retained portion and a basis-point slice that
//! cascades upward through an immutable parent chain, re-split at every
//! ancestor according to that ancestor's own configured percentage.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of the
//! engine:
//!
//! - **tree** — The vault tree: registry, share ledger, propagation, and the
//!   money-moving operations. This is where the accounting lives.
//! - **port** — The engine's only two windows to the outside world: the
//!   asset-transfer capability and the event-emission sink. Everything else
//!   (wallets, indexers, metadata resolution) stays on the far side.
//! - **config** — Engine constants and construction-time parameters. No
//!   ambient globals; if a number matters, it is passed in.
//!
//! ## Design Philosophy
//!
//! 1. All amounts are `u128` in smallest-unit denomination. No floating
//!    point anywhere near the books.
//! 2. Value is conserved, exactly. A contribution of `X` ends up as `X`
//!    across the path to the root — floor division at every split, with the
//!    remainder staying at the level that did the splitting.
//! 3. One operation at a time. A deposit and its entire upward cascade is a
//!    single atomic unit of work: it fully commits or it never happened.
//! 4. If it touches money, it has tests. Plural.

pub mod config;
pub mod port;
pub mod tree;

pub use config::EngineConfig;
pub use port::{
    AssetId, AssetTransferPort, EngineEvent, EventSink, InMemoryAssetBank, MemoryEventSink,
    NullEventSink, TracingEventSink, TransferError,
};
pub use tree::{
    BalanceView, EngineError, LedgerError, RegistryError, ShareLedger, Vault, VaultConfigView,
    VaultEngine, VaultId, VaultParams, VaultRegistry,
};
