//! Share commitments.
//!
//! The ledger records `BLAKE3::derive_key("Warden v1 share-commitment", m)`
//! for each guardian, where `m` frames the share index, the share bytes and
//! the guardian's public key with [`encode_multi_field`]. The framing keeps
//! the encoding unambiguous; the context string keeps it apart from every
//! other hash on the ledger. Commitments only audit guardian admission. They
//! are never used to reconstruct or to prove reconstruction.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use warden_crypto::blake3::{self, contexts, encode_multi_field};
use warden_crypto::shamir::Share;
use warden_types::{Hash, PublicKey};

/// A guardian's commitment as published by the owner.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareCommitment {
    #[serde_as(as = "serde_with::Bytes")]
    pub guardian_id: PublicKey,
    #[serde_as(as = "serde_with::Bytes")]
    pub commitment_hash: Hash,
}

impl ShareCommitment {
    pub fn compute(share: &Share, guardian: &PublicKey) -> Self {
        Self {
            guardian_id: *guardian,
            commitment_hash: share_commitment(share, guardian),
        }
    }
}

/// Commitment to `share` as held by `guardian`.
pub fn share_commitment(share: &Share, guardian: &PublicKey) -> Hash {
    let index = [share.index];
    let material = encode_multi_field(&[&index[..], share.data.as_slice(), guardian.as_slice()]);
    blake3::derive_key(contexts::SHARE_COMMITMENT, &material)
}

/// Constant-time check of `share` against a stored commitment.
pub fn verify(share: &Share, guardian: &PublicKey, expected: &Hash) -> bool {
    blake3::ct_eq(&share_commitment(share, guardian), expected)
}
