//! # warden-program
//!
//! Ledger-facing operations for guardian recovery and emergency access.
//!
//! [`Program`] owns an injected [`LedgerStore`]. Each public operation loads
//! the records it needs, applies one domain operation from `warden-guardian`
//! or `warden-emergency`, and writes the results back inside a single
//! [`LedgerStore::transact`] call. An error anywhere aborts the transaction.
//! Once the transaction commits, the resulting [`Event`]s go to the program's
//! [`EventSink`].
//!
//! ## Modules
//!
//! - [`recovery`] — Recovery config, guardian set and recovery requests
//! - [`emergency`] — Emergency access and contacts
//! - [`sweep`] — Periodic expiry and countdown transitions
//! - [`events`] — Event sinks

pub mod emergency;
pub mod events;
pub mod recovery;
pub mod sweep;

use std::sync::Arc;

use warden_emergency::EmergencyError;
use warden_guardian::GuardianError;
use warden_ledger::{LedgerError, LedgerStore};
use warden_types::events::{Event, EventKind};
use warden_types::{ErrorKind, RequestId, Timestamp};

pub use crate::events::{Discard, EventLog, EventSink};

/// Errors returned by program operations.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error(transparent)]
    Guardian(#[from] GuardianError),

    #[error(transparent)]
    Emergency(#[from] EmergencyError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("recovery config already exists for {0}")]
    RecoveryConfigExists(String),

    #[error("no recovery config for {0}")]
    RecoveryConfigNotFound(String),

    #[error("no recovery request {request_id} for {owner}")]
    RecoveryRequestNotFound { owner: String, request_id: RequestId },

    #[error("emergency access already initialized for {0}")]
    EmergencyAccessExists(String),

    #[error("no emergency access for {0}")]
    EmergencyAccessNotFound(String),

    /// Identity or proof check failed. The only auth error callers see.
    #[error("unauthorized")]
    Unauthorized,
}

impl ProgramError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Guardian(e) => e.kind(),
            Self::Emergency(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::RecoveryConfigExists(_)
            | Self::RecoveryConfigNotFound(_)
            | Self::RecoveryRequestNotFound { .. }
            | Self::EmergencyAccessExists(_)
            | Self::EmergencyAccessNotFound(_) => ErrorKind::State,
            Self::Unauthorized => ErrorKind::Auth,
        }
    }

    /// The error as it may be shown outside the core.
    ///
    /// Every [`ErrorKind::Auth`] failure collapses to [`ProgramError::Unauthorized`]
    /// so a caller cannot tell a wrong secret from a wrong proof or identity.
    pub fn public(self) -> Self {
        if self.kind() == ErrorKind::Auth {
            tracing::debug!(error = %self, "auth failure collapsed to unauthorized");
            Self::Unauthorized
        } else {
            self
        }
    }
}

pub type Result<T> = std::result::Result<T, ProgramError>;

/// Recovery and emergency access operations over a ledger.
pub struct Program<S> {
    ledger: S,
    events: Arc<dyn EventSink>,
}

impl<S: LedgerStore> Program<S> {
    /// A program that discards its events.
    pub fn new(ledger: S) -> Self {
        Self::with_events(ledger, Arc::new(Discard))
    }

    pub fn with_events(ledger: S, events: Arc<dyn EventSink>) -> Self {
        Self { ledger, events }
    }

    pub fn ledger(&self) -> &S {
        &self.ledger
    }

    pub(crate) fn emit(&self, kind: EventKind, timestamp: Timestamp) {
        tracing::debug!(owner = hex::encode(kind.owner()), event = ?kind, "event published");
        self.events.publish(Event { timestamp, kind });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_collapses_auth_errors() {
        for err in [
            ProgramError::Guardian(GuardianError::InvalidMasterSecret),
            ProgramError::Guardian(GuardianError::InvalidProof),
            ProgramError::Guardian(GuardianError::NotOwner),
            ProgramError::Guardian(GuardianError::NotActiveGuardian),
            ProgramError::Emergency(EmergencyError::NotOwner),
            ProgramError::Emergency(EmergencyError::AccessNotGranted),
        ] {
            assert!(matches!(err.public(), ProgramError::Unauthorized));
        }
    }

    #[test]
    fn test_public_keeps_other_errors() {
        let err = ProgramError::Guardian(GuardianError::RecoveryExpired(4)).public();
        assert!(matches!(
            err,
            ProgramError::Guardian(GuardianError::RecoveryExpired(4))
        ));
        assert_eq!(err.kind(), ErrorKind::State);

        let err = ProgramError::RecoveryConfigNotFound("ab".into()).public();
        assert_eq!(err.kind(), ErrorKind::State);
    }
}
