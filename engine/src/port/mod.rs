//! # Ports — The Engine's Boundary
//!
//! The engine touches the outside world through exactly two capabilities,
//! both injected at construction:
//!
//! ```text
//! asset.rs  — AssetTransferPort: atomic debit/credit of fungible balances
//! events.rs — EventSink: emitted accounting facts, consumed by an indexer
//! ```
//!
//! Everything else the surrounding system does (wallet sessions, attestation
//! claims, metadata resolution, the indexer's storage) stays on the far side
//! of these traits. The engine never calls anything it wasn't handed.

pub mod asset;
pub mod events;

pub use asset::{AssetId, AssetTransferPort, InMemoryAssetBank, TransferError};
pub use events::{EngineEvent, EventSink, MemoryEventSink, NullEventSink, TracingEventSink};
