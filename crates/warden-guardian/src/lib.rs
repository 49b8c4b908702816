//! # warden-guardian
//!
//! Guardian-based threshold recovery.
//!
//! The owner splits a master secret off-ledger and hands one share to each
//! guardian. The ledger only ever holds commitments to those shares plus a
//! hash of the master secret. To recover, a guardian opens a request carrying
//! a sealed challenge, enough guardians confirm, the requester reconstructs
//! the secret from shares exchanged out-of-band, and proves it by presenting
//! the decrypted challenge.
//!
//! ## Modules
//!
//! - [`registry`] — Guardian set, threshold and recovery policy
//! - [`commitment`] — Share commitments for guardian admission auditing
//! - [`recovery`] — Recovery request state machine
//! - [`challenge`] — Challenge sealing and proof verification

pub mod challenge;
pub mod commitment;
pub mod recovery;
pub mod registry;

use warden_crypto::CryptoError;
use warden_types::ErrorKind;

/// Error types for guardian and recovery operations.
#[derive(Debug, thiserror::Error)]
pub enum GuardianError {
    /// Threshold or share count outside `1 < M <= N <= 255`.
    #[error("invalid threshold configuration: {threshold} of {total_shares}")]
    InvalidThresholdConfiguration {
        /// Requested threshold (M).
        threshold: usize,
        /// Requested share count (N).
        total_shares: usize,
    },

    /// Recovery policy value out of range.
    #[error("invalid recovery policy: {0}")]
    InvalidRecoveryPolicy(String),

    /// Share index is zero or above the share count.
    #[error("invalid share index {index} (valid: 1..={total_shares})")]
    InvalidShareIndex {
        /// The rejected index.
        index: u8,
        /// Configured share count.
        total_shares: u8,
    },

    /// Share index already held by a live guardian.
    #[error("share index {0} already assigned")]
    DuplicateShareIndex(u8),

    /// Encrypted nickname too large.
    #[error("nickname is {len} bytes (maximum {max})")]
    InvalidNicknameSize {
        /// Supplied length.
        len: usize,
        /// Maximum length.
        max: usize,
    },

    /// Sealed challenge is malformed.
    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    /// Guardian already in the live set.
    #[error("guardian already exists: {0}")]
    GuardianAlreadyExists(String),

    /// Guardian not in the live set.
    #[error("guardian not found: {0}")]
    GuardianNotFound(String),

    /// Guardian already accepted the invitation.
    #[error("guardian already accepted: {0}")]
    GuardianAlreadyAccepted(String),

    /// Every share index already has a live guardian.
    #[error("too many guardians: have {count}, maximum is {max}")]
    TooManyGuardians {
        /// Live guardians.
        count: usize,
        /// Configured share count.
        max: usize,
    },

    /// Removal would leave fewer guardians than the threshold.
    #[error("removal would leave {remaining} guardians, threshold is {threshold}")]
    InsufficientGuardiansRemaining {
        /// Guardians left after the removal.
        remaining: usize,
        /// Configured threshold.
        threshold: usize,
    },

    /// The request id counter is exhausted.
    #[error("recovery request id overflow")]
    RequestIdOverflow,

    /// A recovery was initiated too recently.
    #[error("recovery rate limited: retry in {retry_after_secs}s")]
    RecoveryRateLimited {
        /// Seconds until the cooldown elapses.
        retry_after_secs: u64,
    },

    /// The request is past its expiry.
    #[error("recovery request {0} expired")]
    RecoveryExpired(u64),

    /// Completion attempted before the time-lock elapsed or before quorum.
    #[error("recovery request {request_id} not ready: {reason}")]
    RecoveryNotReady {
        /// The request.
        request_id: u64,
        /// What is still missing.
        reason: String,
    },

    /// The state machine does not allow this event in this state.
    #[error("invalid transition: {event:?} from {from:?}")]
    InvalidTransition {
        /// Current status.
        from: recovery::RecoveryStatus,
        /// Rejected event.
        event: recovery::RecoveryEvent,
    },

    /// Guardian set changes are frozen while a request is open.
    #[error("recovery request {0} is still open")]
    ActiveRecoveryExists(u64),

    /// Presented master secret does not match the stored hash.
    #[error("master secret does not match")]
    InvalidMasterSecret,

    /// Presented challenge plaintext does not match the stored hash.
    #[error("challenge proof does not match")]
    InvalidProof,

    /// Caller is not the account owner.
    #[error("caller is not the owner")]
    NotOwner,

    /// Caller is not an active guardian.
    #[error("caller is not an active guardian")]
    NotActiveGuardian,

    /// Underlying cryptographic failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl GuardianError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidThresholdConfiguration { .. } | Self::InvalidRecoveryPolicy(_) => {
                ErrorKind::Config
            }
            Self::InvalidShareIndex { .. }
            | Self::DuplicateShareIndex(_)
            | Self::InvalidNicknameSize { .. }
            | Self::InvalidChallenge(_) => ErrorKind::Input,
            Self::GuardianAlreadyExists(_)
            | Self::GuardianNotFound(_)
            | Self::GuardianAlreadyAccepted(_)
            | Self::TooManyGuardians { .. }
            | Self::InsufficientGuardiansRemaining { .. }
            | Self::RequestIdOverflow
            | Self::RecoveryRateLimited { .. }
            | Self::RecoveryExpired(_)
            | Self::RecoveryNotReady { .. }
            | Self::InvalidTransition { .. }
            | Self::ActiveRecoveryExists(_) => ErrorKind::State,
            Self::InvalidMasterSecret
            | Self::InvalidProof
            | Self::NotOwner
            | Self::NotActiveGuardian => ErrorKind::Auth,
            Self::Crypto(e) => crypto_kind(e),
        }
    }
}

/// Category of a [`CryptoError`].
pub fn crypto_kind(error: &CryptoError) -> ErrorKind {
    match error {
        CryptoError::EmptySecret
        | CryptoError::InvalidThreshold { .. }
        | CryptoError::InvalidShareCount { .. }
        | CryptoError::InvalidShare(_)
        | CryptoError::DuplicateShareIndex(_)
        | CryptoError::InsufficientShares { .. }
        | CryptoError::InvalidInput(_) => ErrorKind::Input,
        CryptoError::AeadDecryption => ErrorKind::Auth,
        CryptoError::DivisionByZero | CryptoError::Field(_) | CryptoError::AeadEncryption => {
            ErrorKind::Internal
        }
    }
}

/// Convenience result type for guardian operations.
pub type Result<T> = std::result::Result<T, GuardianError>;
