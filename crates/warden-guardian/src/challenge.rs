//! Challenge sealing and proof verification.
//!
//! The requester proves it reconstructed the master secret without putting
//! the secret or any share on the ledger until completion:
//!
//! 1. [`generate_challenge`] draws a random 32-byte plaintext and seals it
//!    with ChaCha20-Poly1305 under `derive_key("Warden v1 challenge-key", secret)`,
//!    bound to the owner id as associated data. Only the sealed blob and
//!    `derive_key("Warden v1 challenge-hash", plaintext)` are persisted.
//! 2. Off-ledger, the requester reconstructs the secret from shares and
//!    calls [`open_challenge`].
//! 3. [`verify_proof`] checks the presented secret against the stored master
//!    secret hash and the presented plaintext against the challenge hash.
//!    Both checks always run and both comparisons are constant time.
//!
//! [`ProofVersion::V1TwoHash`] is the only proof format. A later revision may
//! bind the challenge to the secret with a keyed commitment instead of two
//! independent hashes; it will get its own version rather than change this one.

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use warden_crypto::blake3::{self, contexts};
use warden_crypto::chacha20;
use warden_types::{Hash, PublicKey};
use zeroize::Zeroizing;

use crate::{GuardianError, Result};

/// Length of the challenge plaintext.
pub const CHALLENGE_PLAINTEXT_LEN: usize = 32;

/// Length of a sealed challenge: nonce, ciphertext and tag.
pub const SEALED_CHALLENGE_LEN: usize =
    chacha20::NONCE_SIZE + CHALLENGE_PLAINTEXT_LEN + chacha20::TAG_SIZE;

/// Proof format of a challenge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofVersion {
    /// Two independent hash checks: master secret and challenge plaintext.
    #[default]
    V1TwoHash,
}

/// The ledger-visible part of a recovery challenge.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde_as(as = "serde_with::Bytes")]
    pub encrypted_challenge: Vec<u8>,
    #[serde_as(as = "serde_with::Bytes")]
    pub challenge_hash: Hash,
    #[serde(default)]
    pub version: ProofVersion,
}

impl Challenge {
    /// Check the sealed blob has the fixed layout.
    pub fn validate(&self) -> Result<()> {
        if self.encrypted_challenge.len() != SEALED_CHALLENGE_LEN {
            return Err(GuardianError::InvalidChallenge(format!(
                "sealed challenge is {} bytes, expected {}",
                self.encrypted_challenge.len(),
                SEALED_CHALLENGE_LEN
            )));
        }
        Ok(())
    }
}

/// `derive_key("Warden v1 master-secret-hash", secret)`.
pub fn master_secret_hash(secret: &[u8]) -> Hash {
    blake3::derive_key(contexts::MASTER_SECRET_HASH, secret)
}

/// `derive_key("Warden v1 challenge-hash", plaintext)`.
pub fn challenge_hash(plaintext: &[u8]) -> Hash {
    blake3::derive_key(contexts::CHALLENGE_HASH, plaintext)
}

fn challenge_key(secret: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(blake3::derive_key(contexts::CHALLENGE_KEY, secret))
}

/// Seal a fresh random challenge for `owner` under `master_secret`.
///
/// Returns the ledger-visible challenge and the plaintext, which the caller
/// discards; it is recoverable only by reconstructing the secret.
pub fn generate_challenge(
    master_secret: &[u8],
    owner: &PublicKey,
) -> Result<(Challenge, Zeroizing<[u8; CHALLENGE_PLAINTEXT_LEN]>)> {
    if master_secret.is_empty() {
        return Err(warden_crypto::CryptoError::EmptySecret.into());
    }

    let mut plaintext = Zeroizing::new([0u8; CHALLENGE_PLAINTEXT_LEN]);
    OsRng.fill_bytes(&mut plaintext[..]);

    let key = challenge_key(master_secret);
    let encrypted_challenge = chacha20::seal(&key, &plaintext[..], owner)?;

    let challenge = Challenge {
        encrypted_challenge,
        challenge_hash: challenge_hash(&plaintext[..]),
        version: ProofVersion::V1TwoHash,
    };
    Ok((challenge, plaintext))
}

/// Decrypt a challenge with a reconstructed secret.
///
/// # Errors
///
/// - [`GuardianError::InvalidChallenge`] if the blob is malformed
/// - [`GuardianError::Crypto`] if the secret or owner is wrong
pub fn open_challenge(
    challenge: &Challenge,
    reconstructed_secret: &[u8],
    owner: &PublicKey,
) -> Result<Zeroizing<[u8; CHALLENGE_PLAINTEXT_LEN]>> {
    challenge.validate()?;

    let key = challenge_key(reconstructed_secret);
    let opened = Zeroizing::new(chacha20::open(&key, &challenge.encrypted_challenge, owner)?);

    let mut plaintext = Zeroizing::new([0u8; CHALLENGE_PLAINTEXT_LEN]);
    if opened.len() != CHALLENGE_PLAINTEXT_LEN {
        return Err(GuardianError::InvalidChallenge(format!(
            "challenge plaintext is {} bytes",
            opened.len()
        )));
    }
    plaintext.copy_from_slice(&opened);
    Ok(plaintext)
}

/// Verify a recovery proof.
///
/// # Errors
///
/// - [`GuardianError::InvalidMasterSecret`] if the secret does not match
/// - [`GuardianError::InvalidProof`] if the plaintext does not match
///
/// Both checks are evaluated before either result is inspected.
pub fn verify_proof(
    challenge: &Challenge,
    stored_master_secret_hash: &Hash,
    challenge_plaintext: &[u8],
    master_secret_candidate: &[u8],
) -> Result<()> {
    match challenge.version {
        ProofVersion::V1TwoHash => {
            let secret_ok = blake3::ct_eq(
                &master_secret_hash(master_secret_candidate),
                stored_master_secret_hash,
            );
            let proof_ok = blake3::ct_eq(
                &challenge_hash(challenge_plaintext),
                &challenge.challenge_hash,
            );

            match (secret_ok, proof_ok) {
                (true, true) => Ok(()),
                (false, _) => Err(GuardianError::InvalidMasterSecret),
                (true, false) => Err(GuardianError::InvalidProof),
            }
        }
    }
}
