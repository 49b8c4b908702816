//! # warden-emergency
//!
//! Inactivity-triggered emergency access ("dead man's switch").
//!
//! The owner names up to five emergency contacts, each with an access level.
//! If the owner shows no activity for the inactivity period a countdown
//! starts; if the grace period then passes without activity, access is
//! granted to every accepted contact. The owner can cancel a countdown or
//! revoke granted access at any time.
//!
//! ## Modules
//!
//! - [`monitor`] — Countdown state machine over owner activity timestamps
//! - [`contacts`] — Emergency contact management and access checks

pub mod contacts;
pub mod monitor;

use warden_types::ErrorKind;

/// Error types for emergency access operations.
#[derive(Debug, thiserror::Error)]
pub enum EmergencyError {
    /// Inactivity period outside the allowed range.
    #[error("inactivity period {secs}s outside {min}s..={max}s")]
    InvalidInactivityPeriod {
        /// Requested period.
        secs: u64,
        /// Minimum allowed.
        min: u64,
        /// Maximum allowed.
        max: u64,
    },

    /// Grace period outside the allowed range.
    #[error("grace period {secs}s outside {min}s..={max}s")]
    InvalidGracePeriod {
        /// Requested period.
        secs: u64,
        /// Minimum allowed.
        min: u64,
        /// Maximum allowed.
        max: u64,
    },

    /// Encrypted nickname too large.
    #[error("nickname is {len} bytes (maximum {max})")]
    InvalidNicknameSize {
        /// Supplied length.
        len: usize,
        /// Maximum length.
        max: usize,
    },

    /// Sealed vault key empty or too large.
    #[error("encrypted key is {len} bytes (allowed 1..={max})")]
    InvalidEncryptedKeySize {
        /// Supplied length.
        len: usize,
        /// Maximum length.
        max: usize,
    },

    /// Contact limit reached.
    #[error("too many emergency contacts (maximum {max})")]
    TooManyContacts {
        /// Maximum live contacts.
        max: usize,
    },

    /// Contact already registered.
    #[error("emergency contact already exists: {0}")]
    ContactAlreadyExists(String),

    /// Contact not registered or revoked.
    #[error("emergency contact not found: {0}")]
    ContactNotFound(String),

    /// Contact already accepted.
    #[error("emergency contact already accepted: {0}")]
    ContactAlreadyAccepted(String),

    /// Owner has not been inactive long enough.
    #[error("inactivity period not elapsed: {remaining_secs}s remaining")]
    InactivityNotElapsed {
        /// Seconds until the countdown may start.
        remaining_secs: u64,
    },

    /// Grace period still running.
    #[error("grace period not elapsed: {remaining_secs}s remaining")]
    GracePeriodNotElapsed {
        /// Seconds until access may be granted.
        remaining_secs: u64,
    },

    /// The countdown state machine does not allow this event now.
    #[error("invalid transition: {event:?} from {from:?}")]
    InvalidTransition {
        /// Current state.
        from: monitor::CountdownState,
        /// Rejected event.
        event: monitor::CountdownEvent,
    },

    /// Caller is not the owner.
    #[error("caller is not the owner")]
    NotOwner,

    /// Caller is not a live emergency contact of this owner.
    #[error("caller is not an emergency contact")]
    NotContact,

    /// Caller is not a granted emergency contact.
    #[error("emergency access not granted")]
    AccessNotGranted,

    /// Contact's access level does not allow the operation.
    #[error("access level {0:?} does not permit this operation")]
    InsufficientAccessLevel(contacts::AccessLevel),
}

impl EmergencyError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInactivityPeriod { .. } | Self::InvalidGracePeriod { .. } => {
                ErrorKind::Config
            }
            Self::InvalidNicknameSize { .. } | Self::InvalidEncryptedKeySize { .. } => {
                ErrorKind::Input
            }
            Self::TooManyContacts { .. }
            | Self::ContactAlreadyExists(_)
            | Self::ContactNotFound(_)
            | Self::ContactAlreadyAccepted(_)
            | Self::InactivityNotElapsed { .. }
            | Self::GracePeriodNotElapsed { .. }
            | Self::InvalidTransition { .. } => ErrorKind::State,
            Self::NotOwner
            | Self::NotContact
            | Self::AccessNotGranted
            | Self::InsufficientAccessLevel(_) => ErrorKind::Auth,
        }
    }
}

/// Convenience result type for emergency access operations.
pub type Result<T> = std::result::Result<T, EmergencyError>;
