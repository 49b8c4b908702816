//! # warden-types
//!
//! Shared domain types and protocol constants used across the Warden workspace.

pub mod events;
pub mod schema;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Common type aliases.
pub type PublicKey = [u8; 32];
pub type Hash = [u8; 32];
pub type Timestamp = u64;
pub type RequestId = u64;
pub type Bytes = Vec<u8>;

/// Seconds per day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Minimum time between two recovery initiations for the same owner (1 hour).
pub const DEFAULT_RECOVERY_COOLDOWN_SECS: u64 = 3_600;

/// Recovery requests expire this long after creation (30 days).
pub const DEFAULT_RECOVERY_EXPIRY_SECS: u64 = 30 * SECONDS_PER_DAY;

/// Default time-lock between initiation and completion (7 days).
pub const DEFAULT_RECOVERY_DELAY_SECS: u64 = 7 * SECONDS_PER_DAY;

/// Shortest configurable time-lock (1 day).
pub const MIN_RECOVERY_DELAY_SECS: u64 = SECONDS_PER_DAY;

/// Longest configurable time-lock (30 days).
pub const MAX_RECOVERY_DELAY_SECS: u64 = 30 * SECONDS_PER_DAY;

/// Maximum encrypted nickname size for guardians and contacts.
pub const MAX_NICKNAME_BYTES: usize = 64;

/// Maximum non-revoked emergency contacts per owner.
pub const MAX_EMERGENCY_CONTACTS: usize = 5;

/// Maximum size of a contact's sealed vault key.
pub const MAX_ENCRYPTED_KEY_BYTES: usize = 128;

/// Default owner inactivity before the countdown starts (90 days).
pub const DEFAULT_INACTIVITY_PERIOD_SECS: u64 = 90 * SECONDS_PER_DAY;

/// Shortest configurable inactivity period (30 days).
pub const MIN_INACTIVITY_PERIOD_SECS: u64 = 30 * SECONDS_PER_DAY;

/// Longest configurable inactivity period (365 days).
pub const MAX_INACTIVITY_PERIOD_SECS: u64 = 365 * SECONDS_PER_DAY;

/// Default grace period between countdown start and access grant (7 days).
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 7 * SECONDS_PER_DAY;

/// Shortest configurable grace period (1 day).
pub const MIN_GRACE_PERIOD_SECS: u64 = SECONDS_PER_DAY;

/// Longest configurable grace period (30 days).
pub const MAX_GRACE_PERIOD_SECS: u64 = 30 * SECONDS_PER_DAY;

/// Error category shared by every crate's error enum.
///
/// Callers outside the core only ever see the category of an [`ErrorKind::Auth`]
/// failure, never which check failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed caller input.
    Input,
    /// The operation is not valid in the current state.
    State,
    /// The caller failed an identity or proof check.
    Auth,
    /// A configuration value is out of range.
    Config,
    /// Storage or encoding failure.
    Internal,
}

/// Why control of an account is moving to a new key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferReason {
    /// A guardian-assisted recovery completed with a valid proof.
    Recovery { request_id: RequestId },
    /// An emergency contact with ownership rights claimed the account.
    Emergency,
}

/// Authorization signal handed to the storage layer.
///
/// The core never moves data itself; it only tells the storage layer that
/// `new_owner` may now act for `owner`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransfer {
    #[serde_as(as = "serde_with::Bytes")]
    pub owner: PublicKey,
    #[serde_as(as = "serde_with::Bytes")]
    pub new_owner: PublicKey,
    pub reason: TransferReason,
    pub authorized_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_bounds_ordered() {
        assert!(MIN_INACTIVITY_PERIOD_SECS <= DEFAULT_INACTIVITY_PERIOD_SECS);
        assert!(DEFAULT_INACTIVITY_PERIOD_SECS <= MAX_INACTIVITY_PERIOD_SECS);
        assert!(MIN_GRACE_PERIOD_SECS <= DEFAULT_GRACE_PERIOD_SECS);
        assert!(DEFAULT_GRACE_PERIOD_SECS <= MAX_GRACE_PERIOD_SECS);
        assert!(MIN_RECOVERY_DELAY_SECS <= DEFAULT_RECOVERY_DELAY_SECS);
        assert!(DEFAULT_RECOVERY_DELAY_SECS <= MAX_RECOVERY_DELAY_SECS);
    }

    #[test]
    fn test_transfer_reason_tagged() {
        let transfer = OwnershipTransfer {
            owner: [1u8; 32],
            new_owner: [2u8; 32],
            reason: TransferReason::Recovery { request_id: 7 },
            authorized_at: 100,
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&transfer, &mut buf).expect("encode");
        let decoded: OwnershipTransfer = ciborium::from_reader(buf.as_slice()).expect("decode");
        assert_eq!(decoded, transfer);
    }
}
