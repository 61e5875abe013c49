use serde::{Deserialize, Serialize};

/// Node configuration fixed at startup. Mirrors the original node's
/// `DIFFICULTY` / `COINBASE_REWARD` / `CONFIRMATION` / `REMINE_ON_TAIL_CHANGE`
/// settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Leading zero bits required on a block's hash.
    pub difficulty: u32,
    /// Base coinbase payout, before fees, in value units.
    pub coinbase_reward: f64,
    /// Depth after which a block is considered final; also the failure
    /// threshold that triggers a sync.
    pub confirmation: u64,
    /// If set, an externally accepted block that advances the tail
    /// interrupts any in-progress mining job.
    pub remine_on_tail_change: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            difficulty: 20,
            coinbase_reward: 50.0,
            confirmation: 6,
            remine_on_tail_change: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = NodeConfig::default();
        assert_eq!(config.difficulty, 20);
        assert_eq!(config.confirmation, 6);
        assert!(config.remine_on_tail_change);
    }
}
