//! Guardian set, threshold and recovery policy.
//!
//! A [`RecoveryConfig`] is the owner's single ledger record for recovery. It
//! holds the threshold `M`, the share count `N`, one [`GuardianRecord`] per
//! share index, the master secret hash, and the counters that recovery
//! initiation advances. Guardians are "live" until removed; the threshold
//! invariant is checked against the live count.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use warden_crypto::shamir::{Share, MAX_SHARES, MIN_THRESHOLD};
use warden_types::schema::{RecordKind, Versioned};
use warden_types::{
    Hash, PublicKey, RequestId, Timestamp, DEFAULT_RECOVERY_COOLDOWN_SECS,
    DEFAULT_RECOVERY_DELAY_SECS, DEFAULT_RECOVERY_EXPIRY_SECS, MAX_NICKNAME_BYTES,
    MAX_RECOVERY_DELAY_SECS, MIN_RECOVERY_DELAY_SECS,
};

use crate::commitment;
use crate::{GuardianError, Result};

/// Guardian lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianStatus {
    /// Added by the owner, not yet accepted.
    Invited,
    /// Accepted; may initiate and confirm recovery.
    Active,
    /// Removed by the owner.
    Removed,
}

/// One guardian and the share index it holds.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianRecord {
    #[serde_as(as = "serde_with::Bytes")]
    pub pubkey: PublicKey,
    /// Nickname encrypted by the owner's client; opaque here.
    #[serde_as(as = "Option<serde_with::Bytes>")]
    pub nickname: Option<Vec<u8>>,
    pub share_index: u8,
    #[serde_as(as = "serde_with::Bytes")]
    pub share_commitment: Hash,
    pub status: GuardianStatus,
    pub added_at: Timestamp,
}

impl GuardianRecord {
    pub fn is_live(&self) -> bool {
        self.status != GuardianStatus::Removed
    }
}

/// Guardian supplied at initialization or by `add_guardian`.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardianInvite {
    #[serde_as(as = "serde_with::Bytes")]
    pub pubkey: PublicKey,
    pub share_index: u8,
    #[serde_as(as = "serde_with::Bytes")]
    pub share_commitment: Hash,
    #[serde_as(as = "Option<serde_with::Bytes>")]
    pub nickname: Option<Vec<u8>>,
}

/// Timing rules for recovery requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Minimum seconds between two initiations. Zero disables the limit.
    pub cooldown_secs: u64,
    /// Seconds a request stays open after it becomes ready.
    pub expiry_secs: u64,
    /// Seconds between initiation and the earliest completion. Gives the
    /// owner a window to cancel a recovery they did not start.
    pub recovery_delay_secs: u64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_RECOVERY_COOLDOWN_SECS,
            expiry_secs: DEFAULT_RECOVERY_EXPIRY_SECS,
            recovery_delay_secs: DEFAULT_RECOVERY_DELAY_SECS,
        }
    }
}

impl RecoveryPolicy {
    /// Check every field is in range.
    pub fn validate(&self) -> Result<()> {
        if self.expiry_secs == 0 {
            return Err(GuardianError::InvalidRecoveryPolicy(
                "expiry must be positive".into(),
            ));
        }
        let delay_range = MIN_RECOVERY_DELAY_SECS..=MAX_RECOVERY_DELAY_SECS;
        if !delay_range.contains(&self.recovery_delay_secs) {
            return Err(GuardianError::InvalidRecoveryPolicy(format!(
                "recovery delay {}s outside {}s..={}s",
                self.recovery_delay_secs, MIN_RECOVERY_DELAY_SECS, MAX_RECOVERY_DELAY_SECS
            )));
        }
        Ok(())
    }
}

/// The owner's recovery configuration.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde_as(as = "serde_with::Bytes")]
    pub owner: PublicKey,
    pub threshold: u8,
    pub total_shares: u8,
    pub guardians: Vec<GuardianRecord>,
    #[serde_as(as = "serde_with::Bytes")]
    pub master_secret_hash: Hash,
    pub last_request_id: RequestId,
    pub last_recovery_attempt: Option<Timestamp>,
    pub policy: RecoveryPolicy,
    pub created_at: Timestamp,
    pub last_modified: Timestamp,
}

impl Versioned for RecoveryConfig {
    const KIND: RecordKind = RecordKind::RecoveryConfig;
    const VERSION: u16 = 1;
}

/// Check `1 < threshold <= total_shares <= 255`.
pub fn validate_threshold(threshold: usize, total_shares: usize) -> Result<()> {
    if threshold < MIN_THRESHOLD || threshold > total_shares || total_shares > MAX_SHARES {
        return Err(GuardianError::InvalidThresholdConfiguration {
            threshold,
            total_shares,
        });
    }
    Ok(())
}

impl RecoveryConfig {
    /// Create an empty configuration.
    ///
    /// # Errors
    ///
    /// - [`GuardianError::InvalidThresholdConfiguration`] unless `1 < M <= N <= 255`
    /// - [`GuardianError::InvalidRecoveryPolicy`] if `policy` is out of range
    pub fn new(
        owner: PublicKey,
        threshold: usize,
        total_shares: usize,
        master_secret_hash: Hash,
        policy: RecoveryPolicy,
        current_time: Timestamp,
    ) -> Result<Self> {
        validate_threshold(threshold, total_shares)?;
        policy.validate()?;

        Ok(Self {
            owner,
            threshold: threshold as u8,
            total_shares: total_shares as u8,
            guardians: Vec::new(),
            master_secret_hash,
            last_request_id: 0,
            last_recovery_attempt: None,
            policy,
            created_at: current_time,
            last_modified: current_time,
        })
    }

    /// Guardians that have not been removed.
    pub fn live_guardians(&self) -> impl Iterator<Item = &GuardianRecord> {
        self.guardians.iter().filter(|g| g.is_live())
    }

    pub fn live_count(&self) -> usize {
        self.live_guardians().count()
    }

    pub fn active_count(&self) -> usize {
        self.guardians
            .iter()
            .filter(|g| g.status == GuardianStatus::Active)
            .count()
    }

    /// True once every share index has a live guardian.
    pub fn is_fully_configured(&self) -> bool {
        self.live_count() == self.total_shares as usize
    }

    pub fn find_live(&self, pubkey: &PublicKey) -> Option<&GuardianRecord> {
        self.live_guardians().find(|g| &g.pubkey == pubkey)
    }

    pub fn is_active_guardian(&self, pubkey: &PublicKey) -> bool {
        self.find_live(pubkey)
            .is_some_and(|g| g.status == GuardianStatus::Active)
    }

    /// Add a guardian in the `Invited` state.
    ///
    /// # Errors
    ///
    /// - [`GuardianError::InvalidShareIndex`] if the index is 0 or above `N`
    /// - [`GuardianError::InvalidNicknameSize`] if the nickname exceeds 64 bytes
    /// - [`GuardianError::GuardianAlreadyExists`] if the pubkey is already live
    /// - [`GuardianError::DuplicateShareIndex`] if a live guardian holds the index
    /// - [`GuardianError::TooManyGuardians`] if all `N` indices are taken
    pub fn add_guardian(&mut self, invite: GuardianInvite, current_time: Timestamp) -> Result<()> {
        if invite.share_index == 0 || invite.share_index > self.total_shares {
            return Err(GuardianError::InvalidShareIndex {
                index: invite.share_index,
                total_shares: self.total_shares,
            });
        }
        if let Some(nickname) = &invite.nickname {
            if nickname.len() > MAX_NICKNAME_BYTES {
                return Err(GuardianError::InvalidNicknameSize {
                    len: nickname.len(),
                    max: MAX_NICKNAME_BYTES,
                });
            }
        }
        if self.find_live(&invite.pubkey).is_some() {
            return Err(GuardianError::GuardianAlreadyExists(hex::encode(
                invite.pubkey,
            )));
        }
        if self
            .live_guardians()
            .any(|g| g.share_index == invite.share_index)
        {
            return Err(GuardianError::DuplicateShareIndex(invite.share_index));
        }
        let count = self.live_count();
        if count >= self.total_shares as usize {
            return Err(GuardianError::TooManyGuardians {
                count,
                max: self.total_shares as usize,
            });
        }

        // A re-invited guardian replaces its old removed record.
        self.guardians
            .retain(|g| !(g.pubkey == invite.pubkey && g.status == GuardianStatus::Removed));
        self.guardians.push(GuardianRecord {
            pubkey: invite.pubkey,
            nickname: invite.nickname,
            share_index: invite.share_index,
            share_commitment: invite.share_commitment,
            status: GuardianStatus::Invited,
            added_at: current_time,
        });
        self.last_modified = current_time;

        tracing::info!(
            owner = hex::encode(self.owner),
            guardian = hex::encode(invite.pubkey),
            share_index = invite.share_index,
            "guardian invited"
        );

        Ok(())
    }

    /// Move a guardian from `Invited` to `Active`.
    pub fn accept_guardianship(
        &mut self,
        pubkey: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        let guardian = self
            .guardians
            .iter_mut()
            .find(|g| &g.pubkey == pubkey && g.is_live())
            .ok_or_else(|| GuardianError::GuardianNotFound(hex::encode(pubkey)))?;

        if guardian.status != GuardianStatus::Invited {
            return Err(GuardianError::GuardianAlreadyAccepted(hex::encode(pubkey)));
        }
        guardian.status = GuardianStatus::Active;
        self.last_modified = current_time;

        tracing::info!(guardian = hex::encode(pubkey), "guardianship accepted");

        Ok(())
    }

    /// Remove a guardian, refusing if fewer than `M` would remain.
    ///
    /// Logs a warning when exactly `M` remain: one more loss makes recovery
    /// impossible.
    ///
    /// # Errors
    ///
    /// - [`GuardianError::GuardianNotFound`] if the pubkey is not live
    /// - [`GuardianError::InsufficientGuardiansRemaining`] if `live - 1 < M`
    pub fn remove_guardian(&mut self, pubkey: &PublicKey, current_time: Timestamp) -> Result<()> {
        let live = self.live_count();
        let threshold = self.threshold as usize;

        let guardian = self
            .guardians
            .iter_mut()
            .find(|g| &g.pubkey == pubkey && g.is_live())
            .ok_or_else(|| GuardianError::GuardianNotFound(hex::encode(pubkey)))?;

        let remaining = live - 1;
        if remaining < threshold {
            return Err(GuardianError::InsufficientGuardiansRemaining {
                remaining,
                threshold,
            });
        }

        guardian.status = GuardianStatus::Removed;
        self.last_modified = current_time;

        if remaining == threshold {
            tracing::warn!(
                owner = hex::encode(self.owner),
                remaining,
                threshold,
                "guardian count at threshold; one more loss makes recovery impossible"
            );
        }
        tracing::info!(
            guardian = hex::encode(pubkey),
            remaining,
            "guardian removed"
        );

        Ok(())
    }

    /// Check a share against the commitment recorded for `pubkey`.
    pub fn verify_share_commitment(&self, pubkey: &PublicKey, share: &Share) -> Result<bool> {
        let guardian = self
            .find_live(pubkey)
            .ok_or_else(|| GuardianError::GuardianNotFound(hex::encode(pubkey)))?;
        if share.index != guardian.share_index {
            return Ok(false);
        }
        Ok(commitment::verify(share, pubkey, &guardian.share_commitment))
    }
}
