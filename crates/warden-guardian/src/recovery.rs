//! Recovery request state machine.
//!
//! ```text
//!   Initiated ──Confirm──▶ Confirmed ──Complete──▶ Completed
//!       │                      │
//!       ├──Cancel──────────────┼──────────────────▶ Cancelled
//!       └──Expire──────────────┴──────────────────▶ Expired
//! ```
//!
//! Every status change goes through [`RecoveryStatus::apply`]; anything not
//! in the table is rejected with [`GuardianError::InvalidTransition`].
//!
//! A request past `expires_at` reads as `Expired` through
//! [`RecoveryRequest::effective_status`] even before the sweeper persists it,
//! so expiry never depends on a write having happened.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use warden_types::schema::{RecordKind, Versioned};
use warden_types::{OwnershipTransfer, PublicKey, RequestId, Timestamp, TransferReason};

use crate::challenge::{self, Challenge};
use crate::registry::RecoveryConfig;
use crate::{GuardianError, Result};

/// Lifecycle of a recovery request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Initiated,
    Confirmed,
    Completed,
    Cancelled,
    Expired,
}

/// Events that move a request between states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryEvent {
    /// Enough guardians have confirmed.
    Confirm,
    /// A valid proof was presented.
    Complete,
    /// The owner withdrew the request.
    Cancel,
    /// The request outlived its expiry.
    Expire,
}

impl RecoveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    /// The transition table.
    pub fn apply(self, event: RecoveryEvent) -> Result<Self> {
        use RecoveryEvent as E;
        use RecoveryStatus as S;

        match (self, event) {
            (S::Initiated | S::Confirmed, E::Confirm) => Ok(S::Confirmed),
            (S::Confirmed, E::Complete) => Ok(S::Completed),
            (S::Initiated | S::Confirmed, E::Cancel) => Ok(S::Cancelled),
            (S::Initiated | S::Confirmed, E::Expire) => Ok(S::Expired),
            (from, event) => Err(GuardianError::InvalidTransition { from, event }),
        }
    }
}

/// A recovery attempt against one owner's configuration.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRequest {
    #[serde_as(as = "serde_with::Bytes")]
    pub owner: PublicKey,
    pub request_id: RequestId,
    #[serde_as(as = "serde_with::Bytes")]
    pub initiator: PublicKey,
    #[serde_as(as = "Option<serde_with::Bytes>")]
    pub new_owner: Option<PublicKey>,
    pub challenge: Challenge,
    pub status: RecoveryStatus,
    #[serde_as(as = "Vec<serde_with::Bytes>")]
    pub participants: Vec<PublicKey>,
    pub created_at: Timestamp,
    pub ready_at: Timestamp,
    pub expires_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl Versioned for RecoveryRequest {
    const KIND: RecordKind = RecordKind::RecoveryRequest;
    const VERSION: u16 = 1;
}

impl RecoveryRequest {
    /// Status as of `current_time`, counting an unrecorded expiry.
    pub fn effective_status(&self, current_time: Timestamp) -> RecoveryStatus {
        if !self.status.is_terminal() && current_time > self.expires_at {
            RecoveryStatus::Expired
        } else {
            self.status
        }
    }

    pub fn is_open(&self, current_time: Timestamp) -> bool {
        !self.effective_status(current_time).is_terminal()
    }

    pub fn has_confirmed(&self, guardian: &PublicKey) -> bool {
        self.participants.contains(guardian)
    }

    fn ensure_not_expired(&self, current_time: Timestamp) -> Result<()> {
        if self.effective_status(current_time) == RecoveryStatus::Expired {
            return Err(GuardianError::RecoveryExpired(self.request_id));
        }
        Ok(())
    }

    fn transition(&mut self, event: RecoveryEvent, current_time: Timestamp) -> Result<()> {
        let next = self.status.apply(event)?;
        if next.is_terminal() {
            self.closed_at = Some(current_time);
        }
        self.status = next;
        Ok(())
    }
}

/// Apply the rate limit and take the next request id.
///
/// Mutates `config` only on success. Callers persist the config in the same
/// transaction that stores the new request.
///
/// # Errors
///
/// - [`GuardianError::RecoveryRateLimited`] if the cooldown has not elapsed
/// - [`GuardianError::RequestIdOverflow`] if the counter is exhausted
pub fn reserve_request_id(config: &mut RecoveryConfig, current_time: Timestamp) -> Result<RequestId> {
    if let Some(last) = config.last_recovery_attempt {
        let elapsed = current_time.saturating_sub(last);
        if elapsed < config.policy.cooldown_secs {
            return Err(GuardianError::RecoveryRateLimited {
                retry_after_secs: config.policy.cooldown_secs - elapsed,
            });
        }
    }

    let request_id = config
        .last_request_id
        .checked_add(1)
        .ok_or(GuardianError::RequestIdOverflow)?;

    config.last_request_id = request_id;
    config.last_recovery_attempt = Some(current_time);

    Ok(request_id)
}

/// Open a recovery request.
///
/// # Errors
///
/// - [`GuardianError::NotActiveGuardian`] unless `initiator` is an active guardian
/// - [`GuardianError::InvalidChallenge`] if the sealed challenge is malformed
/// - anything [`reserve_request_id`] returns
pub fn initiate_recovery(
    config: &mut RecoveryConfig,
    initiator: PublicKey,
    challenge: Challenge,
    new_owner: Option<PublicKey>,
    current_time: Timestamp,
) -> Result<RecoveryRequest> {
    if !config.is_active_guardian(&initiator) {
        return Err(GuardianError::NotActiveGuardian);
    }
    challenge.validate()?;

    let request_id = reserve_request_id(config, current_time)?;
    let ready_at = current_time.saturating_add(config.policy.recovery_delay_secs);
    let expires_at = ready_at.saturating_add(config.policy.expiry_secs);

    tracing::info!(
        owner = hex::encode(config.owner),
        initiator = hex::encode(initiator),
        request_id,
        ready_at,
        expires_at,
        "recovery initiated"
    );

    Ok(RecoveryRequest {
        owner: config.owner,
        request_id,
        initiator,
        new_owner,
        challenge,
        status: RecoveryStatus::Initiated,
        participants: Vec::new(),
        created_at: current_time,
        ready_at,
        expires_at,
        closed_at: None,
    })
}

/// Record that `guardian` supports the request.
///
/// Idempotent: a repeat confirmation changes nothing and succeeds. Once the
/// participant count reaches the threshold the request becomes `Confirmed`.
/// No share is sent or stored.
pub fn confirm_participation(
    config: &RecoveryConfig,
    request: &mut RecoveryRequest,
    guardian: PublicKey,
    current_time: Timestamp,
) -> Result<()> {
    if !config.is_active_guardian(&guardian) {
        return Err(GuardianError::NotActiveGuardian);
    }
    request.ensure_not_expired(current_time)?;
    if request.status.is_terminal() {
        return Err(GuardianError::InvalidTransition {
            from: request.status,
            event: RecoveryEvent::Confirm,
        });
    }
    if request.has_confirmed(&guardian) {
        tracing::debug!(
            request_id = request.request_id,
            guardian = hex::encode(guardian),
            "participation already confirmed"
        );
        return Ok(());
    }

    request.participants.push(guardian);
    if request.participants.len() >= config.threshold as usize {
        request.transition(RecoveryEvent::Confirm, current_time)?;
    }

    tracing::info!(
        request_id = request.request_id,
        guardian = hex::encode(guardian),
        confirmed = request.participants.len(),
        threshold = config.threshold,
        "guardian confirmed participation"
    );

    Ok(())
}

/// Complete a request with a proof of reconstruction.
///
/// Returns the ownership transfer the storage layer must honour. The new
/// owner defaults to the initiator.
///
/// # Errors
///
/// - [`GuardianError::RecoveryExpired`] past `expires_at`
/// - [`GuardianError::RecoveryNotReady`] before `ready_at` or before quorum
/// - [`GuardianError::InvalidMasterSecret`] / [`GuardianError::InvalidProof`]
///   if the proof fails
pub fn complete_with_proof(
    config: &RecoveryConfig,
    request: &mut RecoveryRequest,
    challenge_plaintext: &[u8],
    master_secret_candidate: &[u8],
    current_time: Timestamp,
) -> Result<OwnershipTransfer> {
    request.ensure_not_expired(current_time)?;
    match request.status {
        RecoveryStatus::Confirmed => {}
        RecoveryStatus::Initiated => {
            return Err(GuardianError::RecoveryNotReady {
                request_id: request.request_id,
                reason: format!(
                    "{} of {} guardians confirmed",
                    request.participants.len(),
                    config.threshold
                ),
            });
        }
        from => {
            return Err(GuardianError::InvalidTransition {
                from,
                event: RecoveryEvent::Complete,
            });
        }
    }
    if current_time < request.ready_at {
        return Err(GuardianError::RecoveryNotReady {
            request_id: request.request_id,
            reason: format!("time-lock ends in {}s", request.ready_at - current_time),
        });
    }

    if let Err(e) = challenge::verify_proof(
        &request.challenge,
        &config.master_secret_hash,
        challenge_plaintext,
        master_secret_candidate,
    ) {
        tracing::warn!(
            owner = hex::encode(request.owner),
            request_id = request.request_id,
            error = %e,
            "recovery proof rejected"
        );
        return Err(e);
    }

    request.transition(RecoveryEvent::Complete, current_time)?;
    let new_owner = request.new_owner.unwrap_or(request.initiator);

    tracing::info!(
        owner = hex::encode(request.owner),
        new_owner = hex::encode(new_owner),
        request_id = request.request_id,
        "recovery completed"
    );

    Ok(OwnershipTransfer {
        owner: request.owner,
        new_owner,
        reason: TransferReason::Recovery {
            request_id: request.request_id,
        },
        authorized_at: current_time,
    })
}

/// Owner withdraws a request.
///
/// # Errors
///
/// [`GuardianError::RecoveryExpired`] once the request is past `expires_at`,
/// whether or not the expiry has been persisted.
pub fn cancel_recovery(
    request: &mut RecoveryRequest,
    caller: &PublicKey,
    current_time: Timestamp,
) -> Result<()> {
    if caller != &request.owner {
        return Err(GuardianError::NotOwner);
    }
    request.ensure_not_expired(current_time)?;
    request.transition(RecoveryEvent::Cancel, current_time)?;

    tracing::info!(
        owner = hex::encode(request.owner),
        request_id = request.request_id,
        "recovery cancelled"
    );

    Ok(())
}

/// Persist the expiry of a request that has passed `expires_at`.
///
/// # Errors
///
/// [`GuardianError::RecoveryNotReady`] if the request has not yet expired;
/// [`GuardianError::InvalidTransition`] if it is already terminal.
pub fn expire_recovery(request: &mut RecoveryRequest, current_time: Timestamp) -> Result<()> {
    if request.status.is_terminal() {
        return Err(GuardianError::InvalidTransition {
            from: request.status,
            event: RecoveryEvent::Expire,
        });
    }
    if current_time <= request.expires_at {
        return Err(GuardianError::RecoveryNotReady {
            request_id: request.request_id,
            reason: format!("expires in {}s", request.expires_at - current_time),
        });
    }
    request.transition(RecoveryEvent::Expire, current_time)?;

    tracing::info!(
        owner = hex::encode(request.owner),
        request_id = request.request_id,
        "recovery expired"
    );

    Ok(())
}
