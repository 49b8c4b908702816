//! # warden-crypto
//!
//! Cryptographic primitives for the Warden recovery core.
//!
//! The suite is fixed: BLAKE3 for hashing and commitments, ChaCha20-Poly1305
//! for challenge sealing, and Shamir secret sharing over GF(2^8). No algorithm
//! negotiation is permitted.
//!
//! ## Modules
//!
//! - [`blake3`] — Domain-separated BLAKE3 hashing and constant-time digest comparison
//! - [`chacha20`] — ChaCha20-Poly1305 AEAD encryption (RFC 8439)
//! - [`gf256`] — Constant-time GF(2^8) arithmetic over log/exp tables
//! - [`shamir`] — Shamir secret sharing (split / reconstruct)

pub mod blake3;
pub mod chacha20;
pub mod gf256;
pub mod shamir;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The secret to split is empty.
    #[error("secret must not be empty")]
    EmptySecret,

    /// Threshold outside `2..=total_shares`.
    #[error("invalid threshold {threshold} for {total_shares} shares")]
    InvalidThreshold {
        /// Requested threshold (M).
        threshold: usize,
        /// Requested share count (N).
        total_shares: usize,
    },

    /// Share count outside `1..=255`.
    #[error("invalid share count {total_shares} (maximum {max})")]
    InvalidShareCount {
        /// Requested share count (N).
        total_shares: usize,
        /// Largest representable share count.
        max: usize,
    },

    /// A share is malformed.
    #[error("invalid share: {0}")]
    InvalidShare(String),

    /// Two shares carry the same index.
    #[error("duplicate share index {0}")]
    DuplicateShareIndex(u8),

    /// Fewer shares than the threshold were supplied.
    #[error("insufficient shares: have {available}, need {required}")]
    InsufficientShares {
        /// Number of shares supplied.
        available: usize,
        /// Number of shares required.
        required: usize,
    },

    /// Division by the zero element of GF(2^8).
    #[error("division by zero in GF(2^8)")]
    DivisionByZero,

    /// Field table construction or self-test failed.
    #[error("field table error: {0}")]
    Field(#[from] gf256::TableError),

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    AeadEncryption,

    /// AEAD decryption failed (authentication tag mismatch).
    #[error("AEAD decryption failed")]
    AeadDecryption,

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
