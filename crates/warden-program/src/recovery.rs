//! Recovery config, guardian set and recovery request operations.
//!
//! Request-id reservation and the rate-limit timestamp are written to the
//! config in the same transaction that creates the request, so two initiations
//! can never observe the same `last_request_id`.

use warden_crypto::shamir::Share;
use warden_guardian::challenge::Challenge;
use warden_guardian::recovery::{self, RecoveryRequest};
use warden_guardian::registry::{GuardianInvite, RecoveryConfig, RecoveryPolicy};
use warden_guardian::GuardianError;
use warden_ledger::{LedgerStore, LedgerTxn, RecordKey};
use warden_types::events::EventKind;
use warden_types::{Hash, OwnershipTransfer, PublicKey, RequestId, Timestamp};

use crate::{Program, ProgramError, Result};

pub(crate) fn load_config(txn: &mut dyn LedgerTxn, owner: &PublicKey) -> Result<RecoveryConfig> {
    warden_ledger::load(txn, &RecordKey::recovery_config(owner))?
        .ok_or_else(|| ProgramError::RecoveryConfigNotFound(hex::encode(owner)))
}

fn store_config(txn: &mut dyn LedgerTxn, config: &RecoveryConfig) -> Result<()> {
    warden_ledger::store(txn, &RecordKey::recovery_config(&config.owner), config)?;
    Ok(())
}

pub(crate) fn load_request(
    txn: &mut dyn LedgerTxn,
    owner: &PublicKey,
    request_id: RequestId,
) -> Result<RecoveryRequest> {
    warden_ledger::load(txn, &RecordKey::recovery_request(owner, request_id))?.ok_or_else(|| {
        ProgramError::RecoveryRequestNotFound {
            owner: hex::encode(owner),
            request_id,
        }
    })
}

pub(crate) fn store_request(txn: &mut dyn LedgerTxn, request: &RecoveryRequest) -> Result<()> {
    warden_ledger::store(
        txn,
        &RecordKey::recovery_request(&request.owner, request.request_id),
        request,
    )?;
    Ok(())
}

fn load_requests(txn: &mut dyn LedgerTxn, owner: &PublicKey) -> Result<Vec<RecoveryRequest>> {
    let prefix = RecordKey::recovery_requests_prefix(owner);
    Ok(warden_ledger::scan::<RecoveryRequest>(txn, &prefix)?
        .into_iter()
        .map(|(_, request)| request)
        .collect())
}

fn ensure_no_open_request(
    txn: &mut dyn LedgerTxn,
    owner: &PublicKey,
    current_time: Timestamp,
) -> Result<()> {
    if let Some(open) = load_requests(txn, owner)?
        .iter()
        .find(|r| r.is_open(current_time))
    {
        return Err(GuardianError::ActiveRecoveryExists(open.request_id).into());
    }
    Ok(())
}

fn ensure_owner(config: &RecoveryConfig, caller: &PublicKey) -> Result<()> {
    if caller != &config.owner {
        return Err(GuardianError::NotOwner.into());
    }
    Ok(())
}

impl<S: LedgerStore> Program<S> {
    /// Create the owner's recovery config with an initial guardian set.
    ///
    /// `guardians` may hold fewer than `total_shares` entries; the rest are
    /// added later with [`add_guardian`](Self::add_guardian).
    #[allow(clippy::too_many_arguments)]
    pub fn initialize_recovery_config(
        &self,
        owner: PublicKey,
        threshold: usize,
        total_shares: usize,
        guardians: Vec<GuardianInvite>,
        master_secret_hash: Hash,
        policy: RecoveryPolicy,
        current_time: Timestamp,
    ) -> Result<RecoveryConfig> {
        let config = self.ledger.transact(|txn| -> Result<RecoveryConfig> {
            let key = RecordKey::recovery_config(&owner);
            if txn.get(&key)?.is_some() {
                return Err(ProgramError::RecoveryConfigExists(hex::encode(owner)));
            }

            let mut config = RecoveryConfig::new(
                owner,
                threshold,
                total_shares,
                master_secret_hash,
                policy,
                current_time,
            )?;
            for invite in guardians {
                config.add_guardian(invite, current_time)?;
            }
            store_config(txn, &config)?;

            tracing::info!(
                owner = hex::encode(owner),
                threshold,
                total_shares,
                guardians = config.live_count(),
                "recovery config initialized"
            );
            Ok(config)
        })?;

        for guardian in config.live_guardians() {
            self.emit(
                EventKind::GuardianAdded {
                    owner,
                    guardian: guardian.pubkey,
                    share_index: guardian.share_index,
                },
                current_time,
            );
        }
        Ok(config)
    }

    pub fn add_guardian(
        &self,
        owner: &PublicKey,
        caller: &PublicKey,
        invite: GuardianInvite,
        current_time: Timestamp,
    ) -> Result<()> {
        let (guardian, share_index) = (invite.pubkey, invite.share_index);
        self.ledger.transact(|txn| -> Result<()> {
            let mut config = load_config(txn, owner)?;
            ensure_owner(&config, caller)?;
            ensure_no_open_request(txn, owner, current_time)?;
            config.add_guardian(invite, current_time)?;
            store_config(txn, &config)
        })?;

        self.emit(
            EventKind::GuardianAdded {
                owner: *owner,
                guardian,
                share_index,
            },
            current_time,
        );
        Ok(())
    }

    pub fn accept_guardianship(
        &self,
        owner: &PublicKey,
        guardian: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        self.ledger.transact(|txn| -> Result<()> {
            let mut config = load_config(txn, owner)?;
            config.accept_guardianship(guardian, current_time)?;
            store_config(txn, &config)
        })?;

        self.emit(
            EventKind::GuardianAccepted {
                owner: *owner,
                guardian: *guardian,
            },
            current_time,
        );
        Ok(())
    }

    /// Remove a guardian; the threshold check and the removal share one
    /// transaction.
    pub fn remove_guardian(
        &self,
        owner: &PublicKey,
        caller: &PublicKey,
        guardian: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        self.ledger.transact(|txn| -> Result<()> {
            let mut config = load_config(txn, owner)?;
            ensure_owner(&config, caller)?;
            ensure_no_open_request(txn, owner, current_time)?;
            config.remove_guardian(guardian, current_time)?;
            store_config(txn, &config)
        })?;

        self.emit(
            EventKind::GuardianRemoved {
                owner: *owner,
                guardian: *guardian,
            },
            current_time,
        );
        Ok(())
    }

    pub fn initiate_recovery(
        &self,
        owner: &PublicKey,
        initiator: PublicKey,
        challenge: Challenge,
        new_owner: Option<PublicKey>,
        current_time: Timestamp,
    ) -> Result<RecoveryRequest> {
        let request = self.ledger.transact(|txn| -> Result<RecoveryRequest> {
            let mut config = load_config(txn, owner)?;
            let request =
                recovery::initiate_recovery(&mut config, initiator, challenge, new_owner, current_time)?;
            store_config(txn, &config)?;
            store_request(txn, &request)?;
            Ok(request)
        })?;

        self.emit(
            EventKind::RecoveryInitiated {
                owner: *owner,
                request_id: request.request_id,
                initiator,
                ready_at: request.ready_at,
                expires_at: request.expires_at,
            },
            current_time,
        );
        Ok(request)
    }

    pub fn confirm_participation(
        &self,
        owner: &PublicKey,
        request_id: RequestId,
        guardian: PublicKey,
        current_time: Timestamp,
    ) -> Result<RecoveryRequest> {
        let (request, newly_confirmed) =
            self.ledger.transact(|txn| -> Result<(RecoveryRequest, bool)> {
                let config = load_config(txn, owner)?;
                let mut request = load_request(txn, owner, request_id)?;
                let before = request.participants.len();
                recovery::confirm_participation(&config, &mut request, guardian, current_time)?;
                store_request(txn, &request)?;
                let newly_confirmed = request.participants.len() > before;
                Ok((request, newly_confirmed))
            })?;

        if newly_confirmed {
            self.emit(
                EventKind::RecoveryConfirmed {
                    owner: *owner,
                    request_id,
                    guardian,
                    participants: request.participants.len(),
                },
                current_time,
            );
        }
        Ok(request)
    }

    pub fn complete_recovery_with_proof(
        &self,
        owner: &PublicKey,
        request_id: RequestId,
        challenge_plaintext: &[u8],
        master_secret_candidate: &[u8],
        current_time: Timestamp,
    ) -> Result<OwnershipTransfer> {
        let transfer = self.ledger.transact(|txn| -> Result<OwnershipTransfer> {
            let config = load_config(txn, owner)?;
            let mut request = load_request(txn, owner, request_id)?;
            let transfer = recovery::complete_with_proof(
                &config,
                &mut request,
                challenge_plaintext,
                master_secret_candidate,
                current_time,
            )?;
            store_request(txn, &request)?;
            Ok(transfer)
        })?;

        self.emit(
            EventKind::RecoveryCompleted {
                owner: *owner,
                request_id,
                new_owner: transfer.new_owner,
            },
            current_time,
        );
        Ok(transfer)
    }

    pub fn cancel_recovery(
        &self,
        owner: &PublicKey,
        request_id: RequestId,
        caller: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        self.ledger.transact(|txn| -> Result<()> {
            let mut request = load_request(txn, owner, request_id)?;
            recovery::cancel_recovery(&mut request, caller, current_time)?;
            store_request(txn, &request)
        })?;

        self.emit(
            EventKind::RecoveryCancelled {
                owner: *owner,
                request_id,
            },
            current_time,
        );
        Ok(())
    }

    /// Persist the `Expired` status of a request past its deadline.
    pub fn expire_recovery(
        &self,
        owner: &PublicKey,
        request_id: RequestId,
        current_time: Timestamp,
    ) -> Result<()> {
        self.ledger.transact(|txn| -> Result<()> {
            let mut request = load_request(txn, owner, request_id)?;
            recovery::expire_recovery(&mut request, current_time)?;
            store_request(txn, &request)
        })?;

        self.emit(
            EventKind::RecoveryExpired {
                owner: *owner,
                request_id,
            },
            current_time,
        );
        Ok(())
    }

    pub fn recovery_config(&self, owner: &PublicKey) -> Result<RecoveryConfig> {
        self.ledger
            .transact(|txn| -> Result<RecoveryConfig> { load_config(txn, owner) })
    }

    /// A request as stored. Use [`RecoveryRequest::effective_status`] for
    /// the status at a given time.
    pub fn recovery_request(
        &self,
        owner: &PublicKey,
        request_id: RequestId,
    ) -> Result<RecoveryRequest> {
        self.ledger
            .transact(|txn| -> Result<RecoveryRequest> { load_request(txn, owner, request_id) })
    }

    /// Every request for `owner`, oldest first.
    pub fn recovery_requests(&self, owner: &PublicKey) -> Result<Vec<RecoveryRequest>> {
        self.ledger
            .transact(|txn| -> Result<Vec<RecoveryRequest>> { load_requests(txn, owner) })
    }

    /// Audit a share a guardian presents against its stored commitment.
    pub fn verify_share_commitment(
        &self,
        owner: &PublicKey,
        guardian: &PublicKey,
        share: &Share,
    ) -> Result<bool> {
        self.ledger.transact(|txn| -> Result<bool> {
            let config = load_config(txn, owner)?;
            Ok(config.verify_share_commitment(guardian, share)?)
        })
    }
}
