//! Emergency contacts.
//!
//! Contacts are invited by the owner (`Pending`), accept (`Active`), receive
//! access when the countdown completes (`Granted`) and can be revoked by the
//! owner at any point (`Revoked`). Revoked contacts do not count toward the
//! [`MAX_EMERGENCY_CONTACTS`] limit and may be invited again.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use warden_types::{
    OwnershipTransfer, PublicKey, Timestamp, TransferReason, MAX_EMERGENCY_CONTACTS,
    MAX_ENCRYPTED_KEY_BYTES, MAX_NICKNAME_BYTES,
};

use crate::monitor::{CountdownState, EmergencyAccess};
use crate::{EmergencyError, Result};

/// What a contact may do once access is granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Read the vault.
    ViewOnly,
    /// Read and modify the vault.
    FullAccess,
    /// Everything, and may assume the owner role.
    TransferOwnership,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Pending,
    Active,
    Granted,
    Revoked,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    #[serde_as(as = "serde_with::Bytes")]
    pub pubkey: PublicKey,
    #[serde_as(as = "Option<serde_with::Bytes>")]
    pub nickname: Option<Vec<u8>>,
    pub access_level: AccessLevel,
    /// Vault key sealed to this contact by the storage layer.
    #[serde_as(as = "serde_with::Bytes")]
    pub encrypted_key: Vec<u8>,
    pub status: ContactStatus,
    pub added_at: Timestamp,
    pub access_granted_at: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
}

impl EmergencyContact {
    pub fn is_live(&self) -> bool {
        self.status != ContactStatus::Revoked
    }
}

/// Owner-supplied contact details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactInvite {
    pub pubkey: PublicKey,
    pub nickname: Option<Vec<u8>>,
    pub access_level: AccessLevel,
    pub encrypted_key: Vec<u8>,
}

impl ContactInvite {
    fn validate(&self) -> Result<()> {
        if let Some(nickname) = &self.nickname {
            if nickname.len() > MAX_NICKNAME_BYTES {
                return Err(EmergencyError::InvalidNicknameSize {
                    len: nickname.len(),
                    max: MAX_NICKNAME_BYTES,
                });
            }
        }
        if self.encrypted_key.is_empty() || self.encrypted_key.len() > MAX_ENCRYPTED_KEY_BYTES {
            return Err(EmergencyError::InvalidEncryptedKeySize {
                len: self.encrypted_key.len(),
                max: MAX_ENCRYPTED_KEY_BYTES,
            });
        }
        Ok(())
    }
}

impl EmergencyAccess {
    pub fn live_contacts(&self) -> impl Iterator<Item = &EmergencyContact> {
        self.contacts.iter().filter(|c| c.is_live())
    }

    pub fn find_contact(&self, pubkey: &PublicKey) -> Option<&EmergencyContact> {
        self.live_contacts().find(|c| &c.pubkey == pubkey)
    }

    fn find_contact_mut(&mut self, pubkey: &PublicKey) -> Option<&mut EmergencyContact> {
        self.contacts
            .iter_mut()
            .find(|c| c.is_live() && &c.pubkey == pubkey)
    }

    /// Invite a contact.
    ///
    /// A previously revoked record for the same key is replaced.
    pub fn add_contact(
        &mut self,
        caller: &PublicKey,
        invite: ContactInvite,
        current_time: Timestamp,
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        invite.validate()?;

        if self.find_contact(&invite.pubkey).is_some() {
            return Err(EmergencyError::ContactAlreadyExists(hex::encode(
                invite.pubkey,
            )));
        }
        if self.live_contacts().count() >= MAX_EMERGENCY_CONTACTS {
            return Err(EmergencyError::TooManyContacts {
                max: MAX_EMERGENCY_CONTACTS,
            });
        }

        self.contacts.retain(|c| c.pubkey != invite.pubkey);

        tracing::info!(
            owner = hex::encode(self.owner),
            contact = hex::encode(invite.pubkey),
            access_level = ?invite.access_level,
            "emergency contact invited"
        );

        self.contacts.push(EmergencyContact {
            pubkey: invite.pubkey,
            nickname: invite.nickname,
            access_level: invite.access_level,
            encrypted_key: invite.encrypted_key,
            status: ContactStatus::Pending,
            added_at: current_time,
            access_granted_at: None,
            revoked_at: None,
        });
        Ok(())
    }

    /// Contact accepts the invitation.
    ///
    /// If access has already been granted the contact is granted immediately.
    pub fn accept_contact(&mut self, contact: &PublicKey, current_time: Timestamp) -> Result<()> {
        let granted = self.state == CountdownState::Granted;
        let record = self
            .find_contact_mut(contact)
            .ok_or_else(|| EmergencyError::ContactNotFound(hex::encode(contact)))?;

        if record.status != ContactStatus::Pending {
            return Err(EmergencyError::ContactAlreadyAccepted(hex::encode(contact)));
        }

        if granted {
            record.status = ContactStatus::Granted;
            record.access_granted_at = Some(current_time);
        } else {
            record.status = ContactStatus::Active;
        }

        tracing::info!(
            contact = hex::encode(contact),
            status = ?record.status,
            "emergency contact accepted"
        );
        Ok(())
    }

    /// Owner revokes a contact.
    pub fn revoke_contact(
        &mut self,
        caller: &PublicKey,
        contact: &PublicKey,
        current_time: Timestamp,
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        let record = self
            .find_contact_mut(contact)
            .ok_or_else(|| EmergencyError::ContactNotFound(hex::encode(contact)))?;

        record.status = ContactStatus::Revoked;
        record.access_granted_at = None;
        record.revoked_at = Some(current_time);

        tracing::info!(contact = hex::encode(contact), "emergency contact revoked");
        Ok(())
    }

    /// The access level `contact` currently holds, if any.
    pub fn access_for(&self, contact: &PublicKey) -> Result<AccessLevel> {
        let record = self
            .find_contact(contact)
            .ok_or(EmergencyError::NotContact)?;

        if self.state != CountdownState::Granted || record.status != ContactStatus::Granted {
            return Err(EmergencyError::AccessNotGranted);
        }
        Ok(record.access_level)
    }

    /// A `TransferOwnership` contact assumes the owner role.
    pub fn claim_ownership(
        &self,
        contact: &PublicKey,
        current_time: Timestamp,
    ) -> Result<OwnershipTransfer> {
        let level = self.access_for(contact)?;
        if level != AccessLevel::TransferOwnership {
            return Err(EmergencyError::InsufficientAccessLevel(level));
        }

        tracing::warn!(
            owner = hex::encode(self.owner),
            new_owner = hex::encode(contact),
            "emergency ownership transfer authorized"
        );

        Ok(OwnershipTransfer {
            owner: self.owner,
            new_owner: *contact,
            reason: TransferReason::Emergency,
            authorized_at: current_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{DEFAULT_GRACE_PERIOD_SECS, DEFAULT_INACTIVITY_PERIOD_SECS, SECONDS_PER_DAY};

    const OWNER: PublicKey = [0xEE; 32];
    const T0: Timestamp = 1_700_000_000;

    fn access() -> EmergencyAccess {
        EmergencyAccess::new(
            OWNER,
            DEFAULT_INACTIVITY_PERIOD_SECS,
            DEFAULT_GRACE_PERIOD_SECS,
            T0,
        )
        .expect("init")
    }

    fn invite(id: u8, access_level: AccessLevel) -> ContactInvite {
        ContactInvite {
            pubkey: [id; 32],
            nickname: Some(b"sibling".to_vec()),
            access_level,
            encrypted_key: vec![0xAA; 48],
        }
    }

    fn granted_at() -> Timestamp {
        T0 + 100 * SECONDS_PER_DAY
    }

    /// Drive the countdown through to `Granted` at [`granted_at`].
    fn grant(ea: &mut EmergencyAccess) {
        ea.poll(T0 + 91 * SECONDS_PER_DAY).expect("start countdown");
        ea.poll(granted_at()).expect("grant");
        assert_eq!(ea.state, CountdownState::Granted);
    }

    #[test]
    fn test_add_and_accept_contact() {
        let mut ea = access();
        ea.add_contact(&OWNER, invite(1, AccessLevel::ViewOnly), T0)
            .expect("add");
        assert_eq!(
            ea.find_contact(&[1; 32]).map(|c| c.status),
            Some(ContactStatus::Pending)
        );

        ea.accept_contact(&[1; 32], T0 + 1).expect("accept");
        assert_eq!(
            ea.find_contact(&[1; 32]).map(|c| c.status),
            Some(ContactStatus::Active)
        );

        assert!(matches!(
            ea.accept_contact(&[1; 32], T0 + 2),
            Err(EmergencyError::ContactAlreadyAccepted(_))
        ));
    }

    #[test]
    fn test_add_contact_owner_only() {
        let mut ea = access();
        assert!(matches!(
            ea.add_contact(&[9; 32], invite(1, AccessLevel::ViewOnly), T0),
            Err(EmergencyError::NotOwner)
        ));
    }

    #[test]
    fn test_contact_limit() {
        let mut ea = access();
        for id in 1..=5 {
            ea.add_contact(&OWNER, invite(id, AccessLevel::ViewOnly), T0)
                .expect("add");
        }
        assert!(matches!(
            ea.add_contact(&OWNER, invite(6, AccessLevel::ViewOnly), T0),
            Err(EmergencyError::TooManyContacts { max: 5 })
        ));

        ea.revoke_contact(&OWNER, &[3; 32], T0).expect("revoke");
        ea.add_contact(&OWNER, invite(6, AccessLevel::ViewOnly), T0)
            .expect("slot freed by revocation");
    }

    #[test]
    fn test_duplicate_contact_rejected() {
        let mut ea = access();
        ea.add_contact(&OWNER, invite(1, AccessLevel::ViewOnly), T0)
            .expect("add");
        assert!(matches!(
            ea.add_contact(&OWNER, invite(1, AccessLevel::FullAccess), T0),
            Err(EmergencyError::ContactAlreadyExists(_))
        ));
    }

    #[test]
    fn test_reinvite_replaces_revoked_record() {
        let mut ea = access();
        ea.add_contact(&OWNER, invite(1, AccessLevel::ViewOnly), T0)
            .expect("add");
        ea.revoke_contact(&OWNER, &[1; 32], T0).expect("revoke");
        ea.add_contact(&OWNER, invite(1, AccessLevel::FullAccess), T0 + 5)
            .expect("re-add");

        assert_eq!(ea.contacts.len(), 1);
        let contact = ea.find_contact(&[1; 32]).expect("contact");
        assert_eq!(contact.access_level, AccessLevel::FullAccess);
        assert_eq!(contact.added_at, T0 + 5);
        assert_eq!(contact.revoked_at, None);
    }

    #[test]
    fn test_size_limits() {
        let mut ea = access();

        let mut big_nickname = invite(1, AccessLevel::ViewOnly);
        big_nickname.nickname = Some(vec![0; MAX_NICKNAME_BYTES + 1]);
        assert!(matches!(
            ea.add_contact(&OWNER, big_nickname, T0),
            Err(EmergencyError::InvalidNicknameSize { .. })
        ));

        let mut big_key = invite(1, AccessLevel::ViewOnly);
        big_key.encrypted_key = vec![0; MAX_ENCRYPTED_KEY_BYTES + 1];
        assert!(matches!(
            ea.add_contact(&OWNER, big_key, T0),
            Err(EmergencyError::InvalidEncryptedKeySize { .. })
        ));

        let mut empty_key = invite(1, AccessLevel::ViewOnly);
        empty_key.encrypted_key.clear();
        assert!(matches!(
            ea.add_contact(&OWNER, empty_key, T0),
            Err(EmergencyError::InvalidEncryptedKeySize { len: 0, .. })
        ));

        let mut exact = invite(1, AccessLevel::ViewOnly);
        exact.nickname = Some(vec![0; MAX_NICKNAME_BYTES]);
        exact.encrypted_key = vec![0; MAX_ENCRYPTED_KEY_BYTES];
        ea.add_contact(&OWNER, exact, T0).expect("limits inclusive");
    }

    #[test]
    fn test_access_only_after_grant() {
        let mut ea = access();
        ea.add_contact(&OWNER, invite(1, AccessLevel::FullAccess), T0)
            .expect("add");
        ea.accept_contact(&[1; 32], T0).expect("accept");

        assert!(matches!(
            ea.access_for(&[1; 32]),
            Err(EmergencyError::AccessNotGranted)
        ));

        grant(&mut ea);
        assert_eq!(
            ea.access_for(&[1; 32]).expect("granted"),
            AccessLevel::FullAccess
        );
        assert_eq!(
            ea.find_contact(&[1; 32]).and_then(|c| c.access_granted_at),
            Some(granted_at())
        );
    }

    #[test]
    fn test_pending_contact_not_granted() {
        let mut ea = access();
        ea.add_contact(&OWNER, invite(1, AccessLevel::FullAccess), T0)
            .expect("add");
        grant(&mut ea);

        assert!(matches!(
            ea.access_for(&[1; 32]),
            Err(EmergencyError::AccessNotGranted)
        ));

        ea.accept_contact(&[1; 32], granted_at() + 10).expect("accept");
        assert_eq!(
            ea.access_for(&[1; 32]).expect("granted on accept"),
            AccessLevel::FullAccess
        );
    }

    #[test]
    fn test_revoke_restores_contacts() {
        let mut ea = access();
        ea.add_contact(&OWNER, invite(1, AccessLevel::FullAccess), T0)
            .expect("add");
        ea.accept_contact(&[1; 32], T0).expect("accept");
        grant(&mut ea);

        ea.revoke(&OWNER, granted_at() + 1).expect("revoke");
        let contact = ea.find_contact(&[1; 32]).expect("contact");
        assert_eq!(contact.status, ContactStatus::Active);
        assert_eq!(contact.access_granted_at, None);
        assert!(matches!(
            ea.access_for(&[1; 32]),
            Err(EmergencyError::AccessNotGranted)
        ));
    }

    #[test]
    fn test_claim_ownership() {
        let mut ea = access();
        ea.add_contact(&OWNER, invite(1, AccessLevel::TransferOwnership), T0)
            .expect("add");
        ea.add_contact(&OWNER, invite(2, AccessLevel::FullAccess), T0)
            .expect("add");
        ea.accept_contact(&[1; 32], T0).expect("accept");
        ea.accept_contact(&[2; 32], T0).expect("accept");

        assert!(matches!(
            ea.claim_ownership(&[1; 32], T0),
            Err(EmergencyError::AccessNotGranted)
        ));

        grant(&mut ea);

        let transfer = ea
            .claim_ownership(&[1; 32], granted_at() + 1)
            .expect("claim");
        assert_eq!(transfer.owner, OWNER);
        assert_eq!(transfer.new_owner, [1; 32]);
        assert_eq!(transfer.reason, TransferReason::Emergency);

        assert!(matches!(
            ea.claim_ownership(&[2; 32], granted_at() + 1),
            Err(EmergencyError::InsufficientAccessLevel(AccessLevel::FullAccess))
        ));
        assert!(matches!(
            ea.claim_ownership(&[3; 32], granted_at() + 1),
            Err(EmergencyError::NotContact)
        ));
    }

    #[test]
    fn test_revoked_contact_has_no_access() {
        let mut ea = access();
        ea.add_contact(&OWNER, invite(1, AccessLevel::TransferOwnership), T0)
            .expect("add");
        ea.accept_contact(&[1; 32], T0).expect("accept");
        grant(&mut ea);

        ea.revoke_contact(&OWNER, &[1; 32], granted_at() + 5)
            .expect("revoke");
        let record = ea.contacts.first().expect("record kept");
        assert_eq!(record.status, ContactStatus::Revoked);
        assert_eq!(record.revoked_at, Some(granted_at() + 5));
        assert_eq!(record.access_granted_at, None);
        assert!(matches!(
            ea.claim_ownership(&[1; 32], granted_at()),
            Err(EmergencyError::NotContact)
        ));
    }
}
