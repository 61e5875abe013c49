use clap::Parser;

/// A full node: fork-aware chain store, RSA-PSS signed transactions,
/// proof-of-work mining with cooperative cancellation, and a gossip RPC
/// surface for peer convergence.
#[derive(Parser, Debug)]
#[command(name = "fullnode")]
#[command(about = "Peer-to-peer UTXO full node")]
#[command(version)]
pub struct Cli {
    /// Address to bind the RPC listener to.
    #[arg(long, default_value = "127.0.0.1:0")]
    pub listen: String,

    /// Peers to connect to at startup (repeatable).
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// Leading zero bits required on a block's hash.
    #[arg(long, default_value_t = 20)]
    pub difficulty: u32,

    /// Base coinbase payout, before fees, in value units.
    #[arg(long, default_value_t = 50.0)]
    pub coinbase_reward: f64,

    /// Depth after which a block is considered final; also the
    /// out-of-sync failure threshold.
    #[arg(long, default_value_t = 6)]
    pub confirmation: u64,

    /// If set, an externally accepted block that advances the tail
    /// interrupts any in-progress mining job.
    #[arg(long, default_value_t = true)]
    pub remine_on_tail_change: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
