//! Countdown state machine over owner activity.
//!
//! ```text
//!          start (inactivity elapsed)         grant (grace elapsed)
//!   Idle ─────────────────────────▶ Counting ─────────────────────▶ Granted
//!    ▲                                 │                               │
//!    └────── activity / cancel ────────┘                               │
//!    └──────────────────────────── revoke ─────────────────────────────┘
//! ```
//!
//! ## Timing
//!
//! - Countdown may start once `now - last_activity > inactivity_period`.
//! - The countdown is anchored at the time it was started, so the owner
//!   always gets the full grace period after the countdown is observable.
//! - Access may be granted once `now - countdown_started_at > grace_period`.
//!
//! Every check is a pure function of stored timestamps. [`EmergencyAccess::poll`]
//! applies at most one transition per call and is a no-op when nothing is due.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use warden_types::schema::{RecordKind, Versioned};
use warden_types::{
    PublicKey, Timestamp, MAX_GRACE_PERIOD_SECS, MAX_INACTIVITY_PERIOD_SECS,
    MIN_GRACE_PERIOD_SECS, MIN_INACTIVITY_PERIOD_SECS,
};

use crate::contacts::{ContactStatus, EmergencyContact};
use crate::{EmergencyError, Result};

/// Where the owner is in the inactivity countdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownState {
    /// Owner is active.
    Idle,
    /// Inactivity elapsed; grace period running.
    Counting,
    /// Grace period elapsed; contacts hold access.
    Granted,
}

/// Events that move the countdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownEvent {
    /// Inactivity period elapsed.
    Start,
    /// Grace period elapsed.
    Grant,
    /// Owner activity observed.
    Activity,
    /// Owner stopped a running countdown.
    Cancel,
    /// Owner reclaimed granted access.
    Revoke,
}

impl CountdownState {
    /// The transition table.
    pub fn apply(self, event: CountdownEvent) -> Result<Self> {
        use CountdownEvent as E;
        use CountdownState as S;

        match (self, event) {
            (S::Idle, E::Start) => Ok(S::Counting),
            (S::Counting, E::Grant) => Ok(S::Granted),
            (S::Idle | S::Counting, E::Activity) => Ok(S::Idle),
            // Activity alone does not revoke access once granted.
            (S::Granted, E::Activity) => Ok(S::Granted),
            (S::Counting, E::Cancel) => Ok(S::Idle),
            (S::Granted, E::Revoke) => Ok(S::Idle),
            (from, event) => Err(EmergencyError::InvalidTransition { from, event }),
        }
    }
}

/// The owner's emergency access record.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyAccess {
    #[serde_as(as = "serde_with::Bytes")]
    pub owner: PublicKey,
    pub last_activity: Timestamp,
    pub inactivity_period_secs: u64,
    pub grace_period_secs: u64,
    pub contacts: Vec<EmergencyContact>,
    pub state: CountdownState,
    pub countdown_started_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Versioned for EmergencyAccess {
    const KIND: RecordKind = RecordKind::EmergencyAccess;
    const VERSION: u16 = 1;
}

/// Check inactivity and grace periods are in range.
pub fn validate_periods(inactivity_period_secs: u64, grace_period_secs: u64) -> Result<()> {
    if !(MIN_INACTIVITY_PERIOD_SECS..=MAX_INACTIVITY_PERIOD_SECS).contains(&inactivity_period_secs)
    {
        return Err(EmergencyError::InvalidInactivityPeriod {
            secs: inactivity_period_secs,
            min: MIN_INACTIVITY_PERIOD_SECS,
            max: MAX_INACTIVITY_PERIOD_SECS,
        });
    }
    if !(MIN_GRACE_PERIOD_SECS..=MAX_GRACE_PERIOD_SECS).contains(&grace_period_secs) {
        return Err(EmergencyError::InvalidGracePeriod {
            secs: grace_period_secs,
            min: MIN_GRACE_PERIOD_SECS,
            max: MAX_GRACE_PERIOD_SECS,
        });
    }
    Ok(())
}

impl EmergencyAccess {
    /// Create a record with the owner active as of `current_time`.
    pub fn new(
        owner: PublicKey,
        inactivity_period_secs: u64,
        grace_period_secs: u64,
        current_time: Timestamp,
    ) -> Result<Self> {
        validate_periods(inactivity_period_secs, grace_period_secs)?;

        tracing::info!(
            owner = hex::encode(owner),
            inactivity_period_secs,
            grace_period_secs,
            "emergency access initialized"
        );

        Ok(Self {
            owner,
            last_activity: current_time,
            inactivity_period_secs,
            grace_period_secs,
            contacts: Vec::new(),
            state: CountdownState::Idle,
            countdown_started_at: None,
            created_at: current_time,
        })
    }

    pub(crate) fn ensure_owner(&self, caller: &PublicKey) -> Result<()> {
        if caller != &self.owner {
            return Err(EmergencyError::NotOwner);
        }
        Ok(())
    }

    /// The instant the inactivity period runs out.
    pub fn inactivity_deadline(&self) -> Timestamp {
        self.last_activity.saturating_add(self.inactivity_period_secs)
    }

    /// `now - last_activity > inactivity_period`.
    pub fn inactivity_elapsed(&self, current_time: Timestamp) -> bool {
        current_time.saturating_sub(self.last_activity) > self.inactivity_period_secs
    }

    /// The instant the grace period runs out, if a countdown is running.
    pub fn grace_deadline(&self) -> Option<Timestamp> {
        self.countdown_started_at
            .map(|start| start.saturating_add(self.grace_period_secs))
    }

    /// `now - countdown_started_at > grace_period`.
    pub fn grace_elapsed(&self, current_time: Timestamp) -> bool {
        self.countdown_started_at
            .is_some_and(|start| current_time.saturating_sub(start) > self.grace_period_secs)
    }

    /// Owner activity: refreshes the timestamp and stops a running countdown.
    ///
    /// Granted access is not revoked by activity; the owner must call
    /// [`revoke`](Self::revoke) explicitly.
    pub fn record_activity(&mut self, caller: &PublicKey, current_time: Timestamp) -> Result<()> {
        self.ensure_owner(caller)?;
        let next = self.state.apply(CountdownEvent::Activity)?;

        self.last_activity = self.last_activity.max(current_time);
        if self.state == CountdownState::Counting {
            tracing::info!(
                owner = hex::encode(self.owner),
                "owner activity cancelled emergency countdown"
            );
        }
        if next == CountdownState::Idle {
            self.countdown_started_at = None;
        }
        self.state = next;

        Ok(())
    }

    /// Start the countdown once the owner has been inactive long enough.
    ///
    /// Callable by anyone; the timestamps decide.
    pub fn start_countdown(&mut self, current_time: Timestamp) -> Result<()> {
        let next = self.state.apply(CountdownEvent::Start)?;
        if !self.inactivity_elapsed(current_time) {
            return Err(EmergencyError::InactivityNotElapsed {
                remaining_secs: self
                    .inactivity_deadline()
                    .saturating_sub(current_time)
                    .saturating_add(1),
            });
        }

        self.state = next;
        self.countdown_started_at = Some(current_time);

        tracing::warn!(
            owner = hex::encode(self.owner),
            countdown_started_at = current_time,
            grace_period_ends = self.grace_deadline(),
            "emergency countdown started"
        );

        Ok(())
    }

    /// Grant access to every accepted contact once the grace period is over.
    ///
    /// Callable by anyone; the timestamps decide.
    pub fn activate(&mut self, current_time: Timestamp) -> Result<()> {
        let next = self.state.apply(CountdownEvent::Grant)?;
        if !self.grace_elapsed(current_time) {
            let deadline = self.grace_deadline().unwrap_or(current_time);
            return Err(EmergencyError::GracePeriodNotElapsed {
                remaining_secs: deadline.saturating_sub(current_time).saturating_add(1),
            });
        }

        self.state = next;
        let mut granted = 0usize;
        for contact in &mut self.contacts {
            if contact.status == ContactStatus::Active {
                contact.status = ContactStatus::Granted;
                contact.access_granted_at = Some(current_time);
                granted += 1;
            }
        }

        tracing::warn!(
            owner = hex::encode(self.owner),
            contacts = granted,
            "emergency access granted"
        );

        Ok(())
    }

    /// Owner stops a running countdown.
    pub fn cancel_countdown(&mut self, caller: &PublicKey, current_time: Timestamp) -> Result<()> {
        self.ensure_owner(caller)?;
        self.state = self.state.apply(CountdownEvent::Cancel)?;
        self.countdown_started_at = None;
        self.last_activity = self.last_activity.max(current_time);

        tracing::info!(owner = hex::encode(self.owner), "emergency countdown cancelled");

        Ok(())
    }

    /// Owner reclaims access after it was granted.
    pub fn revoke(&mut self, caller: &PublicKey, current_time: Timestamp) -> Result<()> {
        self.ensure_owner(caller)?;
        self.state = self.state.apply(CountdownEvent::Revoke)?;
        self.countdown_started_at = None;
        self.last_activity = self.last_activity.max(current_time);

        for contact in &mut self.contacts {
            if contact.status == ContactStatus::Granted {
                contact.status = ContactStatus::Active;
                contact.access_granted_at = None;
            }
        }

        tracing::info!(owner = hex::encode(self.owner), "emergency access revoked");

        Ok(())
    }

    /// Apply the next transition if it is due at `current_time`.
    ///
    /// A late poll on an idle record only starts the countdown; access is
    /// granted by a later poll once the grace period has run from that start.
    /// Returns the new state if it changed.
    pub fn poll(&mut self, current_time: Timestamp) -> Result<Option<CountdownState>> {
        match self.state {
            CountdownState::Idle if self.inactivity_elapsed(current_time) => {
                self.start_countdown(current_time)?;
            }
            CountdownState::Counting if self.grace_elapsed(current_time) => {
                self.activate(current_time)?;
            }
            _ => return Ok(None),
        }
        Ok(Some(self.state))
    }
}
