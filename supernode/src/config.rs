use clap::Parser;
use rta_common::{
    config::{COIN_VALUE, DEFAULT_NETWORK_TIMEOUT_SECONDS, DEFAULT_RTA_TX_TTL_SECONDS, VERSION},
    crypto::SecretKey,
};

// bind addresses
pub const DEFAULT_RPC_BIND_ADDRESS: &str = "127.0.0.1:28690";
// local cryptonode handling multicast/broadcast and ledger submission
pub const DEFAULT_CRYPTONODE_ADDRESS: &str = "http://127.0.0.1:28681";

// inbound routes
pub const AUTHORIZE_RTA_TX_REQUEST_PATH: &str = "/cryptonode/authorize_rta_tx_request";
pub const AUTHORIZE_RTA_TX_RESPONSE_PATH: &str = "/cryptonode/authorize_rta_tx_response";
// callback carried by terminal status broadcasts
pub const UPDATE_PAYMENT_STATUS_PATH: &str = "/core/update_payment_status";

// outbound paths on the cryptonode
pub const CRYPTONODE_RTA_PATH: &str = "/json_rpc/rta";
pub const SEND_RAW_TX_PATH: &str = "/sendrawtransaction";

// test-mode quorum defaults; production sizing derives from the sample size
// and BFT tolerance and is supplied by the deployment
pub const DEFAULT_VOTES_TO_REJECT: usize = 1;
pub const DEFAULT_VOTES_TO_APPROVE_LOW: usize = 2;
pub const DEFAULT_VOTES_TO_APPROVE_HIGH: usize = 4;
pub const DEFAULT_APPROVE_HIGH_THRESHOLD: u64 = 100 * COIN_VALUE;

#[derive(Parser, Debug, Clone)]
#[clap(version = VERSION, about = "Real-time authorization supernode")]
pub struct Config {
    /// RPC server bind address
    #[clap(long, default_value_t = String::from(DEFAULT_RPC_BIND_ADDRESS))]
    pub rpc_bind_address: String,
    /// Base URL of the local cryptonode (communication layer and ledger)
    #[clap(long, default_value_t = String::from(DEFAULT_CRYPTONODE_ADDRESS))]
    pub cryptonode_address: String,
    /// Identity secret key as hex; a fresh key is generated when omitted
    #[clap(long)]
    pub identity_key: Option<SecretKey>,
    /// Number of worker threads for the RPC server
    #[clap(long)]
    pub rpc_threads: Option<usize>,
    /// TTL in seconds for per-payment context entries
    #[clap(long, default_value_t = DEFAULT_RTA_TX_TTL_SECONDS)]
    pub rta_tx_ttl_seconds: u64,
    /// Rejected votes ending the authorization phase
    #[clap(long, default_value_t = DEFAULT_VOTES_TO_REJECT)]
    pub votes_to_reject: usize,
    /// Approved votes required below the high-value threshold
    #[clap(long, default_value_t = DEFAULT_VOTES_TO_APPROVE_LOW)]
    pub votes_to_approve_low: usize,
    /// Approved votes required above the high-value threshold
    #[clap(long, default_value_t = DEFAULT_VOTES_TO_APPROVE_HIGH)]
    pub votes_to_approve_high: usize,
    /// Payment amount in atomic units above which the high approval
    /// threshold applies
    #[clap(long, default_value_t = DEFAULT_APPROVE_HIGH_THRESHOLD)]
    pub approve_high_threshold_atomic_units: u64,
    /// Timeout in seconds for outbound multicast/broadcast/ledger calls
    #[clap(long, default_value_t = DEFAULT_NETWORK_TIMEOUT_SECONDS)]
    pub network_timeout_seconds: u64,
}

/// Quorum sizing for one deployment. The approval threshold is tiered by
/// payment value so larger payments require a larger committee.
#[derive(Debug, Clone, Copy)]
pub struct QuorumRules {
    pub votes_to_reject: usize,
    pub votes_to_approve_low: usize,
    pub votes_to_approve_high: usize,
    pub high_threshold: u64,
}

impl QuorumRules {
    pub fn votes_to_approve(&self, amount: u64) -> usize {
        if amount <= self.high_threshold {
            self.votes_to_approve_low
        } else {
            self.votes_to_approve_high
        }
    }
}

impl From<&Config> for QuorumRules {
    fn from(config: &Config) -> Self {
        QuorumRules {
            votes_to_reject: config.votes_to_reject,
            votes_to_approve_low: config.votes_to_approve_low,
            votes_to_approve_high: config.votes_to_approve_high,
            high_threshold: config.approve_high_threshold_atomic_units,
        }
    }
}

impl Default for QuorumRules {
    fn default() -> Self {
        QuorumRules {
            votes_to_reject: DEFAULT_VOTES_TO_REJECT,
            votes_to_approve_low: DEFAULT_VOTES_TO_APPROVE_LOW,
            votes_to_approve_high: DEFAULT_VOTES_TO_APPROVE_HIGH,
            high_threshold: DEFAULT_APPROVE_HIGH_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_threshold_is_tiered() {
        let rules = QuorumRules::default();
        assert_eq!(rules.votes_to_approve(50 * COIN_VALUE), 2);
        // inclusive boundary
        assert_eq!(rules.votes_to_approve(100 * COIN_VALUE), 2);
        assert_eq!(rules.votes_to_approve(100 * COIN_VALUE + 1), 4);
        assert_eq!(rules.votes_to_approve(500 * COIN_VALUE), 4);
    }
}
