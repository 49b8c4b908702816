//! Emergency access operations.

use warden_emergency::contacts::{AccessLevel, ContactInvite, ContactStatus};
use warden_emergency::monitor::{CountdownState, EmergencyAccess};
use warden_ledger::{LedgerStore, LedgerTxn, RecordKey};
use warden_types::events::EventKind;
use warden_types::{OwnershipTransfer, PublicKey, Timestamp};

use crate::{Program, ProgramError, Result};

pub(crate) fn load_access(txn: &mut dyn LedgerTxn, owner: &PublicKey) -> Result<EmergencyAccess> {
    warden_ledger::load(txn, &RecordKey::emergency_access(owner))?
        .ok_or_else(|| ProgramError::EmergencyAccessNotFound(hex::encode(owner)))
}

pub(crate) fn store_access(txn: &mut dyn LedgerTxn, access: &EmergencyAccess) -> Result<()> {
    warden_ledger::store(txn, &RecordKey::emergency_access(&access.owner), access)?;
    Ok(())
}

/// The event announcing a countdown state change, if `access` moved out of
/// `before`.
pub(crate) fn countdown_event(
    before: CountdownState,
    access: &EmergencyAccess,
) -> Option<EventKind> {
    let owner = access.owner;
    match (before, access.state) {
        (CountdownState::Idle, CountdownState::Counting) => {
            Some(EventKind::EmergencyCountdownStarted {
                owner,
                countdown_started_at: access.countdown_started_at?,
                grace_period_ends: access.grace_deadline()?,
            })
        }
        (CountdownState::Counting, CountdownState::Granted) => {
            Some(EventKind::EmergencyAccessActivated {
                owner,
                contacts_granted: access
                    .contacts
                    .iter()
                    .filter(|c| c.status == ContactStatus::Granted)
                    .count(),
            })
        }
        (CountdownState::Counting, CountdownState::Idle) => {
            Some(EventKind::EmergencyCountdownCancelled { owner })
        }
        (CountdownState::Granted, CountdownState::Idle) => {
            Some(EventKind::EmergencyAccessRevoked { owner })
        }
        _ => None,
    }
}

impl<S: LedgerStore> Program<S> {
    /// Load, mutate and store the owner's emergency access record, then
    /// announce any countdown state change.
    fn with_access<T>(
        &self,
        owner: &PublicKey,
        current_time: Timestamp,
        f: impl FnOnce(&mut EmergencyAccess) -> warden_emergency::Result<T>,
    ) -> Result<T> {
        let (out, event) = self.ledger.transact(|txn| -> Result<(T, Option<EventKind>)> {
            let mut access = load_access(txn, owner)?;
            let before = access.state;
            let out = f(&mut access)?;
            store_access(txn, &access)?;
            Ok((out, countdown_event(before, &access)))
        })?;

        if let Some(event) = event {
            self.emit(event, current_time);
        }
        Ok(out)
    }

    pub fn initialize_emergency_access(
        &self,
        owner: PublicKey,
        inactivity_period_secs: u64,
        grace_period_secs: u64,
        current_time: Timestamp,
    ) -> Result<EmergencyAccess> {
        self.ledger.transact(|txn| -> Result<EmergencyAccess> {
            if txn.get(&RecordKey::emergency_access(&owner))?.is_some() {
                return Err(ProgramError::EmergencyAccessExists(hex::encode(owner)));
            }
            let access = EmergencyAccess::new(
                owner,
                inactivity_period_secs,
                grace_period_secs,
                current_time,
            )?;
            store_access(txn, &access)?;
            Ok(access)
        })
    }

    pub fn record_activity(
        &self,
        owner: &PublicKey,
        caller: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        self.with_access(owner, current_time, |access| {
            access.record_activity(caller, current_time)
        })
    }

    /// Permissionless: succeeds only once the owner has been inactive long enough.
    pub fn start_countdown(&self, owner: &PublicKey, current_time: Timestamp) -> Result<()> {
        self.with_access(owner, current_time, |access| access.start_countdown(current_time))
    }

    pub fn cancel_countdown(
        &self,
        owner: &PublicKey,
        caller: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        self.with_access(owner, current_time, |access| {
            access.cancel_countdown(caller, current_time)
        })
    }

    pub fn add_emergency_contact(
        &self,
        owner: &PublicKey,
        caller: &PublicKey,
        invite: ContactInvite,
        current_time: Timestamp,
    ) -> Result<()> {
        self.with_access(owner, current_time, |access| {
            access.add_contact(caller, invite, current_time)
        })
    }

    pub fn accept_emergency_contact(
        &self,
        owner: &PublicKey,
        contact: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        self.with_access(owner, current_time, |access| {
            access.accept_contact(contact, current_time)
        })
    }

    pub fn revoke_emergency_contact(
        &self,
        owner: &PublicKey,
        caller: &PublicKey,
        contact: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        self.with_access(owner, current_time, |access| {
            access.revoke_contact(caller, contact, current_time)
        })
    }

    /// Permissionless: succeeds only once the grace period is over.
    pub fn activate_emergency_access(&self, owner: &PublicKey, current_time: Timestamp) -> Result<()> {
        self.with_access(owner, current_time, |access| access.activate(current_time))
    }

    pub fn revoke_emergency_access(
        &self,
        owner: &PublicKey,
        caller: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        self.with_access(owner, current_time, |access| access.revoke(caller, current_time))
    }

    pub fn claim_emergency_ownership(
        &self,
        owner: &PublicKey,
        contact: &PublicKey,
        current_time: Timestamp,
    ) -> Result<OwnershipTransfer> {
        let transfer = self.ledger.transact(|txn| -> Result<OwnershipTransfer> {
            let access = load_access(txn, owner)?;
            Ok(access.claim_ownership(contact, current_time)?)
        })?;

        self.emit(
            EventKind::EmergencyOwnershipClaimed {
                owner: *owner,
                new_owner: transfer.new_owner,
            },
            current_time,
        );
        Ok(transfer)
    }

    /// Apply the next countdown transition if it is due at `current_time`.
    pub fn poll_emergency(
        &self,
        owner: &PublicKey,
        current_time: Timestamp,
    ) -> Result<Option<CountdownState>> {
        self.with_access(owner, current_time, |access| access.poll(current_time))
    }

    pub fn emergency_access(&self, owner: &PublicKey) -> Result<EmergencyAccess> {
        self.ledger
            .transact(|txn| -> Result<EmergencyAccess> { load_access(txn, owner) })
    }

    pub fn access_for(&self, owner: &PublicKey, contact: &PublicKey) -> Result<AccessLevel> {
        let access = self.emergency_access(owner)?;
        Ok(access.access_for(contact)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warden_emergency::EmergencyError;
    use warden_ledger::sqlite::SqliteLedger;
    use warden_types::{
        ErrorKind, TransferReason, DEFAULT_GRACE_PERIOD_SECS, DEFAULT_INACTIVITY_PERIOD_SECS,
        SECONDS_PER_DAY,
    };

    use crate::EventLog;

    const OWNER: PublicKey = [0xEE; 32];
    const T0: Timestamp = 1_700_000_000;

    fn day(n: u64) -> Timestamp {
        T0 + n * SECONDS_PER_DAY
    }

    fn setup() -> Program<SqliteLedger> {
        let program = Program::new(SqliteLedger::open_memory().expect("ledger"));
        program
            .initialize_emergency_access(
                OWNER,
                DEFAULT_INACTIVITY_PERIOD_SECS,
                DEFAULT_GRACE_PERIOD_SECS,
                T0,
            )
            .expect("init");
        program
    }

    fn invite(id: u8, access_level: AccessLevel) -> ContactInvite {
        ContactInvite {
            pubkey: [id; 32],
            nickname: None,
            access_level,
            encrypted_key: vec![0x55; 64],
        }
    }

    #[test]
    fn test_initialize_twice_rejected() {
        let program = setup();
        assert!(matches!(
            program.initialize_emergency_access(
                OWNER,
                DEFAULT_INACTIVITY_PERIOD_SECS,
                DEFAULT_GRACE_PERIOD_SECS,
                T0
            ),
            Err(ProgramError::EmergencyAccessExists(_))
        ));
    }

    #[test]
    fn test_invalid_periods_are_config_errors() {
        let program = Program::new(SqliteLedger::open_memory().expect("ledger"));
        let err = program
            .initialize_emergency_access(OWNER, SECONDS_PER_DAY, DEFAULT_GRACE_PERIOD_SECS, T0)
            .expect_err("too short");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(matches!(
            program.emergency_access(&OWNER),
            Err(ProgramError::EmergencyAccessNotFound(_))
        ));
    }

    #[test]
    fn test_countdown_persists_between_calls() {
        let program = setup();
        program.start_countdown(&OWNER, day(91)).expect("start");
        assert_eq!(
            program.emergency_access(&OWNER).expect("get").state,
            CountdownState::Counting
        );

        assert!(matches!(
            program.activate_emergency_access(&OWNER, day(98)),
            Err(ProgramError::Emergency(
                EmergencyError::GracePeriodNotElapsed { remaining_secs: 1 }
            ))
        ));
        program
            .activate_emergency_access(&OWNER, day(98) + 1)
            .expect("activate");
        assert_eq!(
            program.emergency_access(&OWNER).expect("get").state,
            CountdownState::Granted
        );
    }

    #[test]
    fn test_failed_operation_does_not_write() {
        let program = setup();
        let before = program.emergency_access(&OWNER).expect("get");
        assert!(program.record_activity(&OWNER, &[0x01; 32], day(5)).is_err());
        assert_eq!(program.emergency_access(&OWNER).expect("get"), before);
    }

    #[test]
    fn test_claim_ownership_end_to_end() {
        let program = setup();
        program
            .add_emergency_contact(&OWNER, &OWNER, invite(1, AccessLevel::TransferOwnership), T0)
            .expect("add");
        program
            .accept_emergency_contact(&OWNER, &[1; 32], T0 + 10)
            .expect("accept");

        assert!(matches!(
            program.claim_emergency_ownership(&OWNER, &[1; 32], day(50)),
            Err(ProgramError::Emergency(EmergencyError::AccessNotGranted))
        ));

        assert_eq!(
            program.poll_emergency(&OWNER, day(91)).expect("poll"),
            Some(CountdownState::Counting)
        );
        assert_eq!(
            program.poll_emergency(&OWNER, day(98) + 1).expect("poll"),
            Some(CountdownState::Granted)
        );
        assert_eq!(
            program.access_for(&OWNER, &[1; 32]).expect("access"),
            AccessLevel::TransferOwnership
        );

        let transfer = program
            .claim_emergency_ownership(&OWNER, &[1; 32], day(99))
            .expect("claim");
        assert_eq!(transfer.new_owner, [1; 32]);
        assert_eq!(transfer.reason, TransferReason::Emergency);
    }

    #[test]
    fn test_owner_overrides() {
        let program = setup();
        program
            .add_emergency_contact(&OWNER, &OWNER, invite(1, AccessLevel::FullAccess), T0)
            .expect("add");
        program
            .accept_emergency_contact(&OWNER, &[1; 32], T0)
            .expect("accept");

        program.start_countdown(&OWNER, day(91)).expect("start");
        program
            .cancel_countdown(&OWNER, &OWNER, day(92))
            .expect("cancel");
        assert_eq!(program.poll_emergency(&OWNER, day(98)).expect("poll"), None);

        program.poll_emergency(&OWNER, day(300)).expect("start");
        program.poll_emergency(&OWNER, day(308)).expect("grant");
        assert!(matches!(
            program.revoke_emergency_access(&OWNER, &[1; 32], day(300)),
            Err(ProgramError::Emergency(EmergencyError::NotOwner))
        ));
        program
            .revoke_emergency_access(&OWNER, &OWNER, day(308))
            .expect("revoke");
        assert!(program.access_for(&OWNER, &[1; 32]).is_err());

        program
            .revoke_emergency_contact(&OWNER, &OWNER, &[1; 32], day(309))
            .expect("revoke contact");
        assert!(matches!(
            program.access_for(&OWNER, &[1; 32]),
            Err(ProgramError::Emergency(EmergencyError::NotContact))
        ));
        let access = program.emergency_access(&OWNER).expect("get");
        assert_eq!(
            access.contacts.first().and_then(|c| c.revoked_at),
            Some(day(309))
        );
    }

    #[test]
    fn test_countdown_events() {
        let log = Arc::new(EventLog::new());
        let ledger = SqliteLedger::open_memory().expect("ledger");
        let program = Program::with_events(ledger, log.clone());
        program
            .initialize_emergency_access(
                OWNER,
                DEFAULT_INACTIVITY_PERIOD_SECS,
                DEFAULT_GRACE_PERIOD_SECS,
                T0,
            )
            .expect("init");
        program
            .add_emergency_contact(&OWNER, &OWNER, invite(1, AccessLevel::TransferOwnership), T0)
            .expect("add");
        program
            .accept_emergency_contact(&OWNER, &[1; 32], T0)
            .expect("accept");
        assert!(log.drain().is_empty());

        program.poll_emergency(&OWNER, day(91)).expect("start");
        program
            .record_activity(&OWNER, &OWNER, day(92))
            .expect("activity");
        // Polling with nothing due publishes nothing.
        program.poll_emergency(&OWNER, day(93)).expect("idle");
        program.poll_emergency(&OWNER, day(183)).expect("start again");
        program.poll_emergency(&OWNER, day(190) + 1).expect("grant");
        program
            .claim_emergency_ownership(&OWNER, &[1; 32], day(191))
            .expect("claim");

        let events = log.drain();
        assert_eq!(
            events.iter().map(|e| e.timestamp).collect::<Vec<_>>(),
            vec![day(91), day(92), day(183), day(190) + 1, day(191)]
        );
        assert_eq!(
            events.into_iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![
                EventKind::EmergencyCountdownStarted {
                    owner: OWNER,
                    countdown_started_at: day(91),
                    grace_period_ends: day(98),
                },
                EventKind::EmergencyCountdownCancelled { owner: OWNER },
                EventKind::EmergencyCountdownStarted {
                    owner: OWNER,
                    countdown_started_at: day(183),
                    grace_period_ends: day(190),
                },
                EventKind::EmergencyAccessActivated {
                    owner: OWNER,
                    contacts_granted: 1,
                },
                EventKind::EmergencyOwnershipClaimed {
                    owner: OWNER,
                    new_owner: [1; 32],
                },
            ]
        );
    }
}
