pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 12 decimals
pub const COIN_DECIMALS: u8 = 12;
// 10^12 atomic units represent one coin
pub const COIN_VALUE: u64 = 10u64.pow(COIN_DECIMALS as u32);

// OK status in communication-layer acknowledgements
pub const STATUS_OK: u8 = 0;

// Every payment-scoped context entry lives this long unless refreshed
pub const DEFAULT_RTA_TX_TTL_SECONDS: u64 = 60;
// Bound for outbound multicast/broadcast/ledger calls
pub const DEFAULT_NETWORK_TIMEOUT_SECONDS: u64 = 10;
