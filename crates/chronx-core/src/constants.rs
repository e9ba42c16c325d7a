//! ─── Protocol constants ──────────────────────────────────────────────────────

// ── Chain ids ────────────────────────────────────────────────────────────────

pub const CHAIN_ID_MAINNET: u64 = 841;
pub const CHAIN_ID_TESTNET: u64 = 842;
pub const CHAIN_ID_DEVNET: u64 = 843;

// ── Store schema version ──────────────────────────────────────────────────────

pub const DB_MAJOR_VERSION: u32 = 1;
pub const DB_MINOR_VERSION: u32 = 0;

// ── Vote / sortition ──────────────────────────────────────────────────────────

/// Default VDF `lambda_bound`: upper bound on the internal security
/// parameter. Same default across all predefined chains.
pub const DEFAULT_LAMBDA_BOUND: u16 = 1500;

// ── PBFT timing ────────────────────────────────────────────────────────────────

/// Upper cap on `lambda_ms` after repeated exponential backoff.
pub const LAMBDA_MS_MAX: u32 = 60_000;

/// How many past rounds' votes the vote manager retains for a live period.
pub const VOTE_RETAIN_BACK_ROUNDS: u64 = 4;

/// How many periods ahead of the current one the vote manager will still
/// accept votes for (guards against unbounded memory growth from far-future
/// or malicious round numbers).
pub const VOTE_ACCEPT_AHEAD_PERIODS: u64 = 1;

/// Periods behind the best known peer before the node switches from light
/// sync to deep sync.
pub const DEEP_SYNC_THRESHOLD_PERIODS: u64 = 5;

/// Seconds without a packet from the syncing peer before triggering
/// reselection.
pub const SYNC_STALL_SECS: u64 = 30;

/// Seconds a misbehaving peer is blacklisted for.
pub const PEER_BLACKLIST_TIMEOUT_SECS: u64 = 600;

// ── Pool backpressure ──────────────────────────────────────────────────────────

pub const POOL_WARN_SIZE: usize = 8_000;
pub const POOL_DROP_SIZE: usize = 10_000;

// ── Store ────────────────────────────────────────────────────────────────────

pub const DEFAULT_SNAPSHOT_INTERVAL_PERIODS: u64 = 100;
pub const DEFAULT_MAX_SNAPSHOTS: u32 = 5;
