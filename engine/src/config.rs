//! # Engine Configuration & Constants
//!
//! Every magic number in Cascade lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! The distinction that matters: *constants* are part of the accounting
//! semantics and never change (basis-point denominator, percent ceiling);
//! [`EngineConfig`] carries the deployment-tunable knobs and is passed in
//! explicitly at construction. The engine reads no environment and no
//! global state.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Accounting Constants
// ---------------------------------------------------------------------------

/// The basis-point denominator. Percentages are integers in [0, 10000]:
/// 1 bp = 0.01%, 10000 bps = 100%. This avoids floating point entirely and
/// gives 0.01% granularity, which is more than sufficient for split ratios.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Upper bound for a vault's upstream percentage, in basis points.
/// A vault configured at exactly this value forwards everything to its
/// parent and retains only the floor-division remainder.
pub const MAX_PERCENT_BPS: u32 = 10_000;

/// Default ceiling on tree depth. Depth is attacker-influenced (anyone can
/// keep creating children), and propagation cost is linear in depth, so the
/// registry refuses to grow a chain past this many levels. 64 is far beyond
/// any sane funding hierarchy.
pub const DEFAULT_MAX_TREE_DEPTH: u32 = 64;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default port for the HTTP operations/query API.
pub const DEFAULT_RPC_PORT: u16 = 9850;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9851;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Construction-time parameters for a [`VaultEngine`](crate::VaultEngine).
///
/// Deliberately small. The engine's behavior is otherwise fixed by the
/// accounting constants above — configuration is for operational limits,
/// not for semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum tree depth the registry will allow at creation time, and the
    /// defensive bound on the propagation walk. A root vault sits at level
    /// 0; a vault at level `max_tree_depth - 1` cannot have children.
    pub max_tree_depth: u32,
}

impl EngineConfig {
    /// Returns the configuration with a custom depth ceiling.
    pub fn with_max_tree_depth(max_tree_depth: u32) -> Self {
        Self { max_tree_depth }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bps_constants_agree() {
        // The u32 ceiling and the u128 denominator describe the same scale.
        assert_eq!(MAX_PERCENT_BPS as u128, BPS_DENOMINATOR);
    }

    #[test]
    fn default_depth_is_nonzero() {
        // A zero depth ceiling would make even root creation impossible.
        assert!(EngineConfig::default().max_tree_depth > 0);
    }

    #[test]
    fn custom_depth_is_respected() {
        let cfg = EngineConfig::with_max_tree_depth(3);
        assert_eq!(cfg.max_tree_depth, 3);
    }

    #[test]
    fn config_serialization_roundtrip() {
        let cfg = EngineConfig::with_max_tree_depth(16);
        let json = serde_json::to_string(&cfg).expect("serialize");
        let recovered: EngineConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cfg, recovered);
    }
}
