use thiserror::Error;

/// Node-wide error kinds, shared across every crate boundary (codec, crypto,
/// store, pool, dag, consensus, executor, network, node).
#[derive(Debug, Error)]
pub enum ChronxError {
    // ── Codec ────────────────────────────────────────────────────────────────
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    // ── Crypto ───────────────────────────────────────────────────────────────
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid chain id: expected {expected}, got {got}")]
    InvalidChainId { expected: u64, got: u64 },

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    // ── DAG ──────────────────────────────────────────────────────────────────
    #[error("unknown parent: {0}")]
    UnknownParent(String),

    #[error("duplicate block: {0}")]
    DuplicateBlock(String),

    #[error("invalid level: expected {expected}, got {got}")]
    InvalidLevel { expected: u64, got: u64 },

    // ── Pool ─────────────────────────────────────────────────────────────────
    #[error("queue full")]
    QueueFull,

    // ── Store ────────────────────────────────────────────────────────────────
    #[error("database corruption: {0}")]
    DbCorruption(String),

    #[error("version mismatch: column {column} expected {expected}, found {found}")]
    VersionMismatch { column: String, expected: u32, found: u32 },

    // ── Network ──────────────────────────────────────────────────────────────
    #[error("peer misbehavior: {0}")]
    PeerMisbehavior(String),

    #[error("timeout: {0}")]
    Timeout(String),

    // ── Config ───────────────────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    // ── State / execution ────────────────────────────────────────────────────
    #[error("state mismatch: {0}")]
    StateMismatch(String),

    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: u128, have: u128 },

    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    // ── Serialization / storage plumbing ─────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl From<bincode::Error> for ChronxError {
    fn from(e: bincode::Error) -> Self {
        ChronxError::Serialization(e.to_string())
    }
}
