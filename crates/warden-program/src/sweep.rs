//! Periodic maintenance.
//!
//! Expiry and countdown transitions are pure functions of stored timestamps,
//! so the sweep only persists what readers would already compute. Each record
//! is decoded and updated in its own transaction; a record that cannot be
//! read or updated is logged, counted and left for the next sweep, and every
//! other record is still processed.

use serde::Serialize;
use warden_emergency::monitor::{CountdownState, EmergencyAccess};
use warden_guardian::recovery::{self, RecoveryRequest, RecoveryStatus};
use warden_ledger::keys::{EMERGENCY_ACCESS_PREFIX, RECOVERY_REQUEST_PREFIX};
use warden_ledger::{LedgerStore, RecordKey};
use warden_types::events::EventKind;
use warden_types::Timestamp;

use crate::emergency::{countdown_event, store_access};
use crate::recovery::store_request;
use crate::{Program, Result};

/// What one sweep changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_requests: usize,
    pub countdowns_started: usize,
    pub access_granted: usize,
    /// Records skipped because they could not be decoded or updated.
    pub failed: usize,
}

impl<S: LedgerStore> Program<S> {
    /// Persist every expiry and countdown transition due at `current_time`.
    ///
    /// Fails only if the ledger cannot be listed; per-record failures are
    /// counted in [`SweepReport::failed`].
    pub fn sweep(&self, current_time: Timestamp) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for key in self.keys_under(RECOVERY_REQUEST_PREFIX)? {
            match self.expire_if_due(&key, current_time) {
                Ok(Some(event)) => {
                    report.expired_requests += 1;
                    self.emit(event, current_time);
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(key = %key, error = %e, "sweep skipped recovery request");
                }
            }
        }

        for key in self.keys_under(EMERGENCY_ACCESS_PREFIX)? {
            match self.poll_if_due(&key, current_time) {
                Ok(Some((after, event))) => {
                    match after {
                        CountdownState::Counting => report.countdowns_started += 1,
                        CountdownState::Granted => report.access_granted += 1,
                        CountdownState::Idle => {}
                    }
                    if let Some(event) = event {
                        self.emit(event, current_time);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(key = %key, error = %e, "sweep skipped emergency access");
                }
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                expired_requests = report.expired_requests,
                countdowns_started = report.countdowns_started,
                access_granted = report.access_granted,
                failed = report.failed,
                "sweep applied transitions"
            );
        }
        Ok(report)
    }

    fn keys_under(&self, prefix: &str) -> Result<Vec<RecordKey>> {
        self.ledger.transact(|txn| -> Result<Vec<RecordKey>> {
            Ok(txn
                .scan_prefix(prefix)?
                .into_iter()
                .map(|(key, _)| RecordKey::from(key))
                .collect())
        })
    }

    /// Persist the expiry of one request if it is past its deadline.
    fn expire_if_due(
        &self,
        key: &RecordKey,
        current_time: Timestamp,
    ) -> Result<Option<EventKind>> {
        self.ledger.transact(|txn| -> Result<Option<EventKind>> {
            let Some(mut request) = warden_ledger::load::<RecoveryRequest>(txn, key)? else {
                return Ok(None);
            };
            if request.status.is_terminal()
                || request.effective_status(current_time) != RecoveryStatus::Expired
            {
                return Ok(None);
            }
            recovery::expire_recovery(&mut request, current_time)?;
            store_request(txn, &request)?;
            Ok(Some(EventKind::RecoveryExpired {
                owner: request.owner,
                request_id: request.request_id,
            }))
        })
    }

    /// Apply the next due countdown transition of one owner.
    fn poll_if_due(
        &self,
        key: &RecordKey,
        current_time: Timestamp,
    ) -> Result<Option<(CountdownState, Option<EventKind>)>> {
        self.ledger
            .transact(|txn| -> Result<Option<(CountdownState, Option<EventKind>)>> {
                let Some(mut access) = warden_ledger::load::<EmergencyAccess>(txn, key)? else {
                    return Ok(None);
                };
                let before = access.state;
                let Some(after) = access.poll(current_time)? else {
                    return Ok(None);
                };
                store_access(txn, &access)?;
                Ok(Some((after, countdown_event(before, &access))))
            })
    }
}
