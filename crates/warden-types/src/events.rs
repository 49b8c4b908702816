//! Notification events.
//!
//! Emitted after a state change commits. Notification tooling consumes them
//! to tell owners, guardians and contacts what happened; a countdown start
//! is how an owner learns there is still time to cancel.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::{PublicKey, RequestId, Timestamp};

/// Envelope for every event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    pub kind: EventKind,
}

/// All event types.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // Guardian set
    GuardianAdded {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        #[serde_as(as = "Hex")]
        guardian: PublicKey,
        share_index: u8,
    },
    GuardianAccepted {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        #[serde_as(as = "Hex")]
        guardian: PublicKey,
    },
    GuardianRemoved {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        #[serde_as(as = "Hex")]
        guardian: PublicKey,
    },

    // Recovery
    RecoveryInitiated {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        request_id: RequestId,
        #[serde_as(as = "Hex")]
        initiator: PublicKey,
        ready_at: Timestamp,
        expires_at: Timestamp,
    },
    RecoveryConfirmed {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        request_id: RequestId,
        #[serde_as(as = "Hex")]
        guardian: PublicKey,
        participants: usize,
    },
    RecoveryCompleted {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        request_id: RequestId,
        #[serde_as(as = "Hex")]
        new_owner: PublicKey,
    },
    RecoveryCancelled {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        request_id: RequestId,
    },
    RecoveryExpired {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        request_id: RequestId,
    },

    // Emergency access
    EmergencyCountdownStarted {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        countdown_started_at: Timestamp,
        grace_period_ends: Timestamp,
    },
    EmergencyCountdownCancelled {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
    },
    EmergencyAccessActivated {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        contacts_granted: usize,
    },
    EmergencyAccessRevoked {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
    },
    EmergencyOwnershipClaimed {
        #[serde_as(as = "Hex")]
        owner: PublicKey,
        #[serde_as(as = "Hex")]
        new_owner: PublicKey,
    },
}

impl EventKind {
    /// The account the event concerns.
    pub fn owner(&self) -> &PublicKey {
        match self {
            Self::GuardianAdded { owner, .. }
            | Self::GuardianAccepted { owner, .. }
            | Self::GuardianRemoved { owner, .. }
            | Self::RecoveryInitiated { owner, .. }
            | Self::RecoveryConfirmed { owner, .. }
            | Self::RecoveryCompleted { owner, .. }
            | Self::RecoveryCancelled { owner, .. }
            | Self::RecoveryExpired { owner, .. }
            | Self::EmergencyCountdownStarted { owner, .. }
            | Self::EmergencyCountdownCancelled { owner }
            | Self::EmergencyAccessActivated { owner, .. }
            | Self::EmergencyAccessRevoked { owner }
            | Self::EmergencyOwnershipClaimed { owner, .. } => owner,
        }
    }
}
